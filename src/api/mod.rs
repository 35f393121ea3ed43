//! Request layer: backend traits, the HTTP implementation, and the
//! authenticated client that drives reactive token renewal.

pub mod backend;
pub mod client;

pub use backend::{ApiError, AuthBackend, HttpBackend, QuizBackend};
pub use client::ApiClient;
