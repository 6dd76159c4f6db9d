#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use parley_memory::{
    BackendMode, MemoryConfig, MemoryError, RuntimeSettings, load_runtime_settings_from_paths,
};
use tempfile::TempDir;

fn write_file(path: PathBuf, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, content).expect("write yaml");
}

fn no_env(_: &str) -> Option<String> {
    None
}

fn settings_with(yaml: &str) -> RuntimeSettings {
    let tmp = TempDir::new().expect("tempdir");
    let system = tmp.path().join("packages/conf/settings.yaml");
    write_file(system.clone(), yaml);
    load_runtime_settings_from_paths(&system, &tmp.path().join("missing.yaml"))
}

#[test]
fn merge_user_overrides_system() {
    let tmp = TempDir::new().expect("tempdir");
    let system = tmp.path().join("packages/conf/settings.yaml");
    let user = tmp.path().join(".config/parley/settings.yaml");

    write_file(
        system.clone(),
        r#"
memory:
  window_capacity: 20
  keep_tail: 4
  evict_count: 5
  idle_timeout_secs: 3600
  backend: "memory"
  key_prefix: "system-prefix"
  summary_max_chars: 400
"#,
    );
    write_file(
        user.clone(),
        r#"
memory:
  window_capacity: 12
  key_prefix: "user-prefix"
  summary_async: false
"#,
    );

    let merged = load_runtime_settings_from_paths(&system, &user);
    assert_eq!(merged.memory.window_capacity, Some(12));
    assert_eq!(merged.memory.keep_tail, Some(4));
    assert_eq!(merged.memory.evict_count, Some(5));
    assert_eq!(merged.memory.key_prefix.as_deref(), Some("user-prefix"));
    assert_eq!(merged.memory.summary_async, Some(false));
    assert_eq!(merged.memory.summary_max_chars, Some(400));
    assert_eq!(merged.memory.backend.as_deref(), Some("memory"));
}

#[test]
fn invalid_user_yaml_falls_back_to_system() {
    let tmp = TempDir::new().expect("tempdir");
    let system = tmp.path().join("packages/conf/settings.yaml");
    let user = tmp.path().join(".config/parley/settings.yaml");
    write_file(system.clone(), "memory:\n  window_capacity: 8\n");
    write_file(user.clone(), "memory: [not, a, map\n");

    let merged = load_runtime_settings_from_paths(&system, &user);
    assert_eq!(merged.memory.window_capacity, Some(8));
}

#[test]
fn validated_config_applies_defaults() {
    let settings = settings_with(
        r#"
memory:
  window_capacity: 10
  evict_count: 4
  idle_timeout_secs: 600
"#,
    );
    let config = MemoryConfig::from_settings_with_env(&settings, no_env).expect("config");
    assert_eq!(config.bounds.capacity, 10);
    assert_eq!(config.bounds.keep_tail, 0);
    assert_eq!(config.bounds.evict_count, 4);
    assert_eq!(config.bounds.max_age_ms, None);
    assert_eq!(config.idle_timeout, Duration::from_secs(600));
    assert_eq!(config.backend, BackendMode::Auto);
    assert_eq!(config.key_prefix, "parley:memory");
    assert_eq!(config.retry.attempts, 3);
    assert_eq!(config.retry.timeout, Duration::from_secs(2));
    assert!(config.summary_async);
    assert_eq!(config.summary_max_chars, 480);
    assert_eq!(config.summary_history_max, 8);
    assert_eq!(config.idle_sweep_interval, None);
}

#[test]
fn env_overrides_settings() {
    let settings = settings_with(
        r#"
memory:
  window_capacity: 10
  evict_count: 4
  idle_timeout_secs: 600
  window_max_age_secs: 30
  valkey_url: "redis://settings:6379/0"
"#,
    );
    let env: HashMap<&str, &str> = [
        ("PARLEY_MEMORY_WINDOW_CAPACITY", "6"),
        ("PARLEY_MEMORY_EVICT_COUNT", "2"),
        ("PARLEY_MEMORY_BACKEND", "valkey"),
        ("PARLEY_MEMORY_SUMMARY_ASYNC", "off"),
        ("VALKEY_URL", " redis://env:6379/1 "),
    ]
    .into_iter()
    .collect();
    let config = MemoryConfig::from_settings_with_env(&settings, |name| {
        env.get(name).map(|value| (*value).to_string())
    })
    .expect("config");
    assert_eq!(config.bounds.capacity, 6);
    assert_eq!(config.bounds.evict_count, 2);
    assert_eq!(config.bounds.max_age_ms, Some(30_000));
    assert_eq!(config.backend, BackendMode::Valkey);
    assert_eq!(config.valkey_url.as_deref(), Some("redis://env:6379/1"));
    assert!(!config.summary_async);
}

#[test]
fn missing_required_bounds_are_rejected() {
    let settings = settings_with("memory:\n  window_capacity: 10\n  idle_timeout_secs: 60\n");
    let error = MemoryConfig::from_settings_with_env(&settings, no_env).expect_err("missing");
    assert_eq!(
        error,
        MemoryError::InvalidConfig("memory.evict_count is required".to_string())
    );

    let empty = RuntimeSettings::default();
    assert!(matches!(
        MemoryConfig::from_settings_with_env(&empty, no_env),
        Err(MemoryError::InvalidConfig(_))
    ));
}

#[test]
fn inconsistent_bounds_are_rejected() {
    let cases = [
        "memory:\n  window_capacity: 0\n  evict_count: 1\n  idle_timeout_secs: 60\n",
        "memory:\n  window_capacity: 4\n  evict_count: 5\n  idle_timeout_secs: 60\n",
        "memory:\n  window_capacity: 4\n  keep_tail: 4\n  evict_count: 2\n  idle_timeout_secs: 60\n",
        "memory:\n  window_capacity: 4\n  evict_count: 2\n  idle_timeout_secs: 0\n",
        "memory:\n  window_capacity: 4\n  evict_count: 2\n  idle_timeout_secs: 60\n  durable_attempts: 0\n",
        "memory:\n  window_capacity: 4\n  evict_count: 2\n  idle_timeout_secs: 60\n  backend: \"tape\"\n",
        "memory:\n  window_capacity: 4\n  evict_count: 2\n  idle_timeout_secs: 60\n  backend: \"valkey\"\n",
    ];
    for yaml in cases {
        let settings = settings_with(yaml);
        assert!(
            matches!(
                MemoryConfig::from_settings_with_env(&settings, no_env),
                Err(MemoryError::InvalidConfig(_))
            ),
            "accepted: {yaml}"
        );
    }
}

#[test]
fn malformed_env_number_is_rejected() {
    let settings = settings_with(
        "memory:\n  window_capacity: 4\n  evict_count: 2\n  idle_timeout_secs: 60\n",
    );
    let result = MemoryConfig::from_settings_with_env(&settings, |name| {
        (name == "PARLEY_MEMORY_WINDOW_CAPACITY").then(|| "lots".to_string())
    });
    assert!(matches!(result, Err(MemoryError::InvalidConfig(_))));
}
