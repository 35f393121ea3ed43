//! Session lifecycle over persistent storage: restore, renewal, logout and
//! the background monitors.

use std::sync::Arc;
use std::time::Duration;

use tento_core::api::ApiClient;
use tento_core::events::{AuthEvent, EventBus, ExpiryReason};
use tento_core::models::RefreshTokenResponse;
use tento_core::session::SessionManager;
use tento_core::settings::SessionSettings;
use tento_core::storage::{FileStore, MemoryStore, SessionStore};
use tento_core::testing::{
    expired_token, quiz_fixture, token_with, unexpired_token, MockAuthBackend, MockQuizBackend,
    TestProfile,
};

fn manager_over(store: Arc<dyn SessionStore>, auth: Arc<MockAuthBackend>) -> Arc<SessionManager> {
    Arc::new(SessionManager::new(
        store,
        auth,
        EventBus::new(),
        SessionSettings::default(),
    ))
}

#[tokio::test]
async fn test_session_survives_restart_via_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    {
        let store = Arc::new(FileStore::new(&path));
        let manager = manager_over(store, Arc::new(MockAuthBackend::new()));
        manager
            .login(&unexpired_token(), "refresh-1", TestProfile::standard())
            .unwrap();
    }

    let store = Arc::new(FileStore::new(&path));
    let manager = manager_over(store, Arc::new(MockAuthBackend::new()));
    let restored = manager.initialize().unwrap().unwrap();

    assert_eq!(restored.user.username, "octocat");
    assert_eq!(restored.refresh_token.as_deref(), Some("refresh-1"));
    assert!(manager.is_authenticated());
}

#[tokio::test]
async fn test_restart_with_expired_token_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    {
        let store = Arc::new(FileStore::new(&path));
        let manager = manager_over(store, Arc::new(MockAuthBackend::new()));
        manager
            .login(&expired_token(), "refresh-1", TestProfile::standard())
            .unwrap();
    }

    let store = Arc::new(FileStore::new(&path));
    let manager = manager_over(store.clone(), Arc::new(MockAuthBackend::new()));
    let restored = manager.initialize().unwrap();

    assert!(restored.is_none());
    assert!(!manager.is_authenticated());
    // The stale credentials are gone from disk as well
    assert!(store.access_token().unwrap().is_none());
    assert!(store.refresh_token().unwrap().is_none());
}

#[tokio::test]
async fn test_oauth_callback_establishes_session() {
    let store = Arc::new(MemoryStore::new());
    let manager = manager_over(store.clone(), Arc::new(MockAuthBackend::new()));
    let mut rx = manager.events().subscribe();

    let session = manager
        .handle_oauth_callback("gh-code", "http://localhost:5173/auth/callback")
        .await
        .unwrap();

    assert_eq!(session.user.username, "octocat");
    assert!(store.access_token().unwrap().is_some());
    assert_eq!(rx.try_recv().unwrap(), AuthEvent::SessionEstablished);
}

#[tokio::test]
async fn test_parallel_requests_share_a_single_refresh() {
    let auth = Arc::new(
        MockAuthBackend::new()
            .with_refresh_response(RefreshTokenResponse {
                token: token_with("renewed", chrono::Utc::now() + chrono::Duration::hours(1)),
                refresh_token: "refresh-2".to_string(),
            })
            .with_refresh_delay(Duration::from_millis(50)),
    );
    let quiz = Arc::new(MockQuizBackend::new(quiz_fixture()).with_unauthorized_calls(8));
    let manager = manager_over(Arc::new(MemoryStore::new()), auth.clone());
    manager
        .login(
            &token_with("original", chrono::Utc::now() + chrono::Duration::hours(1)),
            "refresh-1",
            TestProfile::standard(),
        )
        .unwrap();
    let client = ApiClient::new(manager, quiz);

    // Eight requests all hit a 401 at once; exactly one refresh goes out
    let mut joins = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        joins.push(tokio::spawn(async move {
            client.quiz_for_taking("quiz-1").await
        }));
    }
    for join in joins {
        assert!(join.await.unwrap().is_ok());
    }

    assert_eq!(auth.refresh_calls(), 1);
}

#[tokio::test]
async fn test_logout_clears_locally_and_revokes_in_background() {
    let store = Arc::new(MemoryStore::new());
    let auth = Arc::new(MockAuthBackend::new());
    let manager = manager_over(store.clone(), auth.clone());
    manager
        .login(&unexpired_token(), "refresh-1", TestProfile::standard())
        .unwrap();
    let mut rx = manager.events().subscribe();

    manager.logout();

    // Local teardown is synchronous
    assert!(!manager.is_authenticated());
    assert!(store.access_token().unwrap().is_none());
    assert_eq!(rx.try_recv().unwrap(), AuthEvent::Logout);

    // Server-side revocation follows in the background
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(auth.revoke_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_renewal_monitor_refreshes_proactively() {
    let auth = Arc::new(MockAuthBackend::new().with_refresh_response(
        RefreshTokenResponse {
            token: unexpired_token(),
            refresh_token: "refresh-2".to_string(),
        },
    ));
    let store = Arc::new(MemoryStore::new());
    let manager = Arc::new(SessionManager::new(
        store.clone(),
        auth.clone(),
        EventBus::new(),
        SessionSettings {
            refresh_buffer_minutes: 5,
            renewal_check_secs: 60,
            ..SessionSettings::default()
        },
    ));
    // Token inside the five-minute renewal window but not yet expired
    let near_expiry = token_with("u1", chrono::Utc::now() + chrono::Duration::minutes(4));
    manager
        .login(&near_expiry, "refresh-1", TestProfile::standard())
        .unwrap();
    let mut rx = manager.events().subscribe();
    manager.start_monitors();

    tokio::time::advance(Duration::from_secs(61)).await;
    tokio::task::yield_now().await;

    assert_eq!(auth.refresh_calls(), 1);
    assert_eq!(rx.try_recv().unwrap(), AuthEvent::TokenRefreshed);
    assert_eq!(store.refresh_token().unwrap().as_deref(), Some("refresh-2"));
    assert!(manager.is_authenticated());
    manager.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_failed_proactive_renewal_expires_session() {
    let auth = Arc::new(MockAuthBackend::new().with_refresh_failure());
    let store = Arc::new(MemoryStore::new());
    let manager = Arc::new(SessionManager::new(
        store.clone(),
        auth.clone(),
        EventBus::new(),
        SessionSettings {
            refresh_buffer_minutes: 5,
            renewal_check_secs: 60,
            ..SessionSettings::default()
        },
    ));
    let near_expiry = token_with("u1", chrono::Utc::now() + chrono::Duration::minutes(4));
    manager
        .login(&near_expiry, "refresh-1", TestProfile::standard())
        .unwrap();
    let mut rx = manager.events().subscribe();
    manager.start_monitors();

    tokio::time::advance(Duration::from_secs(61)).await;
    tokio::task::yield_now().await;

    // One failed exchange is terminal: session gone, credentials gone
    assert_eq!(auth.refresh_calls(), 1);
    assert!(!manager.is_authenticated());
    assert!(store.access_token().unwrap().is_none());
    assert!(store.refresh_token().unwrap().is_none());
    assert_eq!(
        rx.try_recv().unwrap(),
        AuthEvent::SessionExpired(ExpiryReason::RefreshFailed)
    );

    // Later ticks find no session and stay quiet
    tokio::time::advance(Duration::from_secs(120)).await;
    tokio::task::yield_now().await;
    assert_eq!(auth.refresh_calls(), 1);
    assert!(rx.try_recv().is_err());
    manager.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_idle_session_expires_and_signal_is_idempotent() {
    let manager = Arc::new(SessionManager::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MockAuthBackend::new()),
        EventBus::new(),
        SessionSettings {
            inactivity_timeout_minutes: 1,
            ..SessionSettings::default()
        },
    ));
    manager
        .login(&unexpired_token(), "refresh-1", TestProfile::standard())
        .unwrap();
    let mut rx = manager.events().subscribe();
    manager.start_monitors();

    // Well past the deadline; several poll ticks fire but only one signal
    tokio::time::advance(Duration::from_secs(300)).await;
    tokio::task::yield_now().await;

    assert!(!manager.is_authenticated());
    assert_eq!(
        rx.try_recv().unwrap(),
        AuthEvent::SessionExpired(ExpiryReason::Inactivity)
    );
    assert!(rx.try_recv().is_err());
    manager.shutdown();
}
