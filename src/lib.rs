#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![deny(warnings)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the tento client core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod api;
pub mod events;
pub mod models;
pub mod quiz;
pub mod session;
pub mod settings;
pub mod storage;
pub mod token;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use api::{ApiClient, ApiError, HttpBackend};
pub use events::{AuthEvent, EventBus, ExpiryReason};
pub use models::Session;
pub use quiz::{AttemptState, QuizAttemptSession};
pub use session::SessionManager;
pub use settings::TentoSettings;
