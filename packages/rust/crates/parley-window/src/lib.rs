//! parley-window: bounded per-session turn window.
//!
//! Ring buffer of recent conversation turns with count/age bounds and idle tracking.
//! Holds only the active tail of a session; full history lives in the durable log.

mod turn;
mod window;

pub use turn::{Role, TurnMetadata, TurnRecord};
pub use window::{OutOfOrderTurn, SessionWindow, WindowBounds};
