//! Session lifecycle event bus
//!
//! Publish/subscribe channel that decouples session-expiry detection from UI
//! navigation. The session core emits into the bus and holds no reference to
//! any subscriber; subscribers drop their receiver to unregister.

use std::fmt;

use tokio::sync::broadcast;

/// Why a session stopped being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// The stored access token's embedded expiry was already in the past.
    TokenExpired,
    /// Renewal was required but no refresh token exists.
    NoRefreshToken,
    /// The refresh exchange itself failed.
    RefreshFailed,
    /// No user interaction within the configured window.
    Inactivity,
    /// The periodic identity probe was rejected by the server.
    ValidationFailed,
}

impl ExpiryReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TokenExpired => "token-expired",
            Self::NoRefreshToken => "no-refresh-token",
            Self::RefreshFailed => "refresh-failed",
            Self::Inactivity => "inactivity",
            Self::ValidationFailed => "validation-failed",
        }
    }
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle signals observable by the rest of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SessionEstablished,
    Logout,
    TokenRefreshed,
    SessionExpired(ExpiryReason),
}

/// Broadcast bus for [`AuthEvent`]s.
///
/// Cloning the bus shares the underlying channel. Emitting with no live
/// subscribers is a no-op, not an error.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    const DEFAULT_CAPACITY: usize = 16;

    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a subscriber. Dropping the receiver unregisters it.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: AuthEvent) {
        log::debug!("auth event: {event:?}");
        // A send error only means there are no subscribers right now
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_emitted_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(AuthEvent::SessionEstablished);
        bus.emit(AuthEvent::SessionExpired(ExpiryReason::Inactivity));

        assert_eq!(rx.recv().await.unwrap(), AuthEvent::SessionEstablished);
        assert_eq!(
            rx.recv().await.unwrap(),
            AuthEvent::SessionExpired(ExpiryReason::Inactivity)
        );
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.emit(AuthEvent::Logout);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_receiver_unsubscribes() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_expiry_reason_codes() {
        assert_eq!(ExpiryReason::Inactivity.as_str(), "inactivity");
        assert_eq!(ExpiryReason::RefreshFailed.to_string(), "refresh-failed");
    }
}
