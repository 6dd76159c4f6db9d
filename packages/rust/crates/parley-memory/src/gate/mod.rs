//! Session-scoped mutual exclusion.

mod core;
mod local;
mod types;

pub use types::{SessionGate, SessionGuard};
