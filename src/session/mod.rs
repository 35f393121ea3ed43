//! Session subsystem: manager plus background monitors.

pub mod manager;
mod monitor;

pub use manager::{SessionError, SessionManager};
