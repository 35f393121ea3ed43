//! Background session monitors
//!
//! Three independent loops drive the session lifecycle: proactive token
//! renewal, inactivity timeout, and periodic server-side validation. Each
//! loop holds only a `Weak` reference back to the manager, so dropping the
//! manager (or calling `shutdown`) stops them on every exit path and no
//! expiry signal can fire after teardown.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::manager::SessionManager;
use crate::events::ExpiryReason;

/// How often the inactivity deadline is re-checked.
const INACTIVITY_POLL: Duration = Duration::from_secs(30);

pub(crate) fn spawn_monitors(manager: &Arc<SessionManager>) -> Vec<JoinHandle<()>> {
    let settings = manager.settings();
    let renewal_period = Duration::from_secs(settings.renewal_check_secs.max(1));
    let inactivity_limit = Duration::from_secs(settings.inactivity_timeout_minutes * 60);
    let validation_period = Duration::from_secs(settings.validation_interval_minutes.max(1) * 60);

    vec![
        spawn_renewal(Arc::downgrade(manager), renewal_period),
        spawn_inactivity(Arc::downgrade(manager), inactivity_limit),
        spawn_validation(Arc::downgrade(manager), validation_period),
    ]
}

/// Periodically checks the access token's remaining lifetime and refreshes
/// inside the renewal window.
fn spawn_renewal(manager: Weak<SessionManager>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = delayed_interval(period);
        loop {
            ticker.tick().await;
            let Some(manager) = manager.upgrade() else {
                break;
            };
            manager.renew_if_due().await;
        }
    })
}

/// Expires the session when no user interaction has been recorded for the
/// configured window, independent of token validity.
fn spawn_inactivity(manager: Weak<SessionManager>, limit: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = delayed_interval(INACTIVITY_POLL.min(limit));
        loop {
            ticker.tick().await;
            let Some(manager) = manager.upgrade() else {
                break;
            };
            if manager.is_authenticated() && manager.idle_for() >= limit {
                manager.expire(ExpiryReason::Inactivity);
            }
        }
    })
}

/// Periodically re-confirms the session with a cheap identity lookup.
fn spawn_validation(manager: Weak<SessionManager>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = delayed_interval(period);
        loop {
            ticker.tick().await;
            let Some(manager) = manager.upgrade() else {
                break;
            };
            manager.validate_with_server().await;
        }
    })
}

/// Interval that skips the immediate first tick and does not burst after a
/// stall.
fn delayed_interval(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AuthEvent, EventBus};
    use crate::settings::SessionSettings;
    use crate::storage::MemoryStore;
    use crate::testing::{unexpired_token, MockAuthBackend, TestProfile};

    fn manager(settings: SessionSettings) -> Arc<SessionManager> {
        Arc::new(SessionManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MockAuthBackend::new()),
            EventBus::new(),
            settings,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_monitor_expires_idle_session() {
        let settings = SessionSettings {
            inactivity_timeout_minutes: 1,
            ..SessionSettings::default()
        };
        let manager = manager(settings);
        manager
            .login(&unexpired_token(), "refresh-1", TestProfile::standard())
            .unwrap();
        let mut rx = manager.events().subscribe();
        manager.start_monitors();

        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;

        assert!(!manager.is_authenticated());
        assert_eq!(
            rx.recv().await.unwrap(),
            AuthEvent::SessionExpired(ExpiryReason::Inactivity)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_resets_inactivity_deadline() {
        let settings = SessionSettings {
            inactivity_timeout_minutes: 1,
            ..SessionSettings::default()
        };
        let manager = manager(settings);
        manager
            .login(&unexpired_token(), "refresh-1", TestProfile::standard())
            .unwrap();
        manager.start_monitors();

        // Keep interacting just inside the window
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(45)).await;
            tokio::task::yield_now().await;
            manager.record_activity();
        }

        assert!(manager.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_monitors() {
        let settings = SessionSettings {
            inactivity_timeout_minutes: 1,
            ..SessionSettings::default()
        };
        let manager = manager(settings);
        manager
            .login(&unexpired_token(), "refresh-1", TestProfile::standard())
            .unwrap();
        let mut rx = manager.events().subscribe();
        manager.start_monitors();
        manager.shutdown();

        tokio::time::advance(Duration::from_secs(600)).await;
        tokio::task::yield_now().await;

        // No expiry signal after teardown
        assert!(manager.is_authenticated());
        assert!(rx.try_recv().is_err());
    }
}
