//! Integration tests for login, registration, refresh, logout and restore
//! against the in-memory fake backend.

mod support;

use serde_json::json;
use support::{FakeBackend, alice, harness, harness_with};
use taleweave_protocol::{Credentials, Registration, TokenPair, UserSummary, endpoints};
use taleweave_session::{
    AuthState, LogoutReason, MemoryStorage, RegisterOutcome, Session,
    SessionError, SessionEvent, Storage,
};
use tokio::sync::broadcast;

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

// =========================================================================
// login()
// =========================================================================

#[tokio::test]
async fn test_login_valid_credentials_saves_token_pair() {
    let h = harness();

    let session = h.lifecycle.login(&alice()).await.unwrap();

    assert_eq!(session.access_token(), Some("A1"));
    assert_eq!(session.refresh_token(), Some("R1"));
    assert_eq!(h.lifecycle.state(), AuthState::Authenticated);
    assert!(h.lifecycle.is_authenticated());

    let stored = h.store().load();
    assert_eq!(stored.access_token(), Some("A1"));
    assert_eq!(stored.refresh_token(), Some("R1"));
}

#[tokio::test]
async fn test_login_emits_logged_in_event() {
    let h = harness();
    let mut events = h.lifecycle.events();

    h.lifecycle.login(&alice()).await.unwrap();

    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::LoggedIn {
            username: "alice".into()
        }]
    );
}

#[tokio::test]
async fn test_login_wrong_password_returns_server_message() {
    let h = harness();

    let err = h
        .lifecycle
        .login(&Credentials::new("alice", "wrong"))
        .await
        .unwrap_err();

    match err {
        SessionError::InvalidCredentials(message) => {
            assert_eq!(message, "No active account found with the given credentials");
        }
        other => panic!("expected InvalidCredentials, got {other:?}"),
    }
    assert_eq!(h.lifecycle.state(), AuthState::Unauthenticated);
    assert_eq!(h.store().load(), Session::empty());
}

#[tokio::test]
async fn test_login_forbidden_returns_invalid_credentials() {
    let h = harness();
    h.backend.override_status(endpoints::TOKEN, 403);

    let err = h.lifecycle.login(&alice()).await.unwrap_err();

    match err {
        SessionError::InvalidCredentials(message) => assert_eq!(message, "overridden"),
        other => panic!("expected InvalidCredentials, got {other:?}"),
    }
}

#[tokio::test]
async fn test_login_server_error_passes_through_as_api() {
    let h = harness();
    h.backend.override_status(endpoints::TOKEN, 503);

    let err = h.lifecycle.login(&alice()).await.unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert_eq!(h.lifecycle.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_login_offline_returns_network_error() {
    let h = harness();
    h.backend.set_offline(true);

    let err = h.lifecycle.login(&alice()).await.unwrap_err();

    assert!(matches!(err, SessionError::Network(_)));
    assert!(!h.lifecycle.is_authenticated());
    assert_eq!(h.lifecycle.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_login_failure_while_logged_in_keeps_existing_session() {
    let h = harness();
    h.lifecycle.login(&alice()).await.unwrap();

    let err = h
        .lifecycle
        .login(&Credentials::new("alice", "wrong"))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::InvalidCredentials(_)));
    assert_eq!(h.lifecycle.state(), AuthState::Authenticated);
    assert_eq!(h.store().load().access_token(), Some("A1"));
}

#[tokio::test]
async fn test_login_sends_credentials_without_bearer() {
    let h = harness();

    h.lifecycle.login(&alice()).await.unwrap();

    let requests = h.backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, endpoints::TOKEN);
    assert!(requests[0].bearer.is_none());
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body["username"], "alice");
    assert_eq!(body["password"], "secret");
}

// =========================================================================
// logout()
// =========================================================================

#[tokio::test]
async fn test_login_then_logout_leaves_store_empty() {
    let h = harness();
    h.lifecycle.login(&alice()).await.unwrap();

    h.lifecycle.logout();

    assert_eq!(h.store().load(), Session::empty());
    assert_eq!(h.storage.get(support::STORAGE_KEY).unwrap(), None);
    assert_eq!(h.lifecycle.state(), AuthState::Unauthenticated);
    assert!(h.lifecycle.current_user().is_none());
}

#[tokio::test]
async fn test_logout_emits_user_requested_without_login_required() {
    let h = harness();
    h.lifecycle.login(&alice()).await.unwrap();
    let mut events = h.lifecycle.events();

    h.lifecycle.logout();

    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::LoggedOut {
            reason: LogoutReason::UserRequested
        }]
    );
}

#[tokio::test]
async fn test_logout_when_logged_out_is_harmless() {
    let h = harness();

    h.lifecycle.logout();
    h.lifecycle.logout();

    assert_eq!(h.lifecycle.state(), AuthState::Unauthenticated);
    assert!(h.backend.requests().is_empty(), "logout never calls the server");
}

#[tokio::test]
async fn test_logout_during_pending_login_discards_tokens() {
    let h = harness();
    let hold = h.backend.hold(endpoints::TOKEN);
    let mut events = h.lifecycle.events();

    let credentials = alice();
    let login = h.lifecycle.login(&credentials);
    let logout = async {
        hold.arrived.notified().await;
        h.lifecycle.logout();
        hold.release.notify_one();
    };
    let (result, ()) = tokio::join!(login, logout);

    assert!(matches!(result, Err(SessionError::Unauthenticated)));
    assert_eq!(h.store().load(), Session::empty());
    assert_eq!(h.lifecycle.state(), AuthState::Unauthenticated);
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, SessionEvent::LoggedIn { .. })));
}

#[tokio::test]
async fn test_logout_during_pending_register_discards_tokens() {
    let h = harness();
    let hold = h.backend.hold(endpoints::REGISTER);

    let registration = Registration::new("bob", "bob@example.com", "hunter22");
    let register = h.lifecycle.register(&registration);
    let logout = async {
        hold.arrived.notified().await;
        h.lifecycle.logout();
        hold.release.notify_one();
    };
    let (result, ()) = tokio::join!(register, logout);

    assert!(matches!(result, Err(SessionError::Unauthenticated)));
    assert_eq!(h.store().load(), Session::empty());
    assert_eq!(h.lifecycle.state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_login_after_logout_still_saves_session() {
    let h = harness();
    h.lifecycle.login(&alice()).await.unwrap();
    h.lifecycle.logout();

    h.lifecycle.login(&alice()).await.unwrap();

    assert_eq!(h.store().load().access_token(), Some("A2"));
}

// =========================================================================
// register()
// =========================================================================

#[tokio::test]
async fn test_register_with_tokens_signs_in() {
    let h = harness();
    let mut events = h.lifecycle.events();

    let outcome = h
        .lifecycle
        .register(&Registration::new("bob", "bob@example.com", "hunter22"))
        .await
        .unwrap();

    let session = match outcome {
        RegisterOutcome::SignedIn(session) => session,
        other => panic!("expected SignedIn, got {other:?}"),
    };
    assert_eq!(session.access_token(), Some("A1"));
    assert_eq!(session.user().map(|u| u.username.as_str()), Some("bob"));
    assert_eq!(h.lifecycle.state(), AuthState::Authenticated);
    assert_eq!(
        h.lifecycle.current_user().map(|u| u.username),
        Some("bob".to_string())
    );
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::Registered {
            username: "bob".into(),
            signed_in: true
        }]
    );
}

#[tokio::test]
async fn test_register_without_tokens_creates_account_only() {
    let h = harness();
    h.backend.set_register_auto_login(false);

    let outcome = h
        .lifecycle
        .register(&Registration::new("bob", "bob@example.com", "hunter22"))
        .await
        .unwrap();

    match outcome {
        RegisterOutcome::AccountCreated(Some(user)) => assert_eq!(user.username, "bob"),
        other => panic!("expected AccountCreated, got {other:?}"),
    }
    assert_eq!(h.lifecycle.state(), AuthState::Unauthenticated);
    assert_eq!(h.store().load(), Session::empty());

    // The new account can log in separately.
    let session = h
        .lifecycle
        .login(&Credentials::new("bob", "hunter22"))
        .await
        .unwrap();
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn test_register_taken_username_returns_field_errors() {
    let h = harness();

    let err = h
        .lifecycle
        .register(&Registration::new("alice", "other@example.com", "pw"))
        .await
        .unwrap_err();

    let fields = match err {
        SessionError::Validation(fields) => fields,
        other => panic!("expected Validation, got {other:?}"),
    };
    assert_eq!(
        fields.get("username").map(Vec::as_slice),
        Some(&["A user with that username already exists.".to_string()][..])
    );
    assert_eq!(h.lifecycle.state(), AuthState::Unauthenticated);
    assert_eq!(h.store().load(), Session::empty());
}

#[tokio::test]
async fn test_register_invalid_email_returns_field_errors() {
    let h = harness();

    let err = h
        .lifecycle
        .register(&Registration::new("carol", "not-an-email", "pw"))
        .await
        .unwrap_err();

    match err {
        SessionError::Validation(fields) => assert!(fields.contains_key("email")),
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_register_failure_with_detail_and_message_returns_detail() {
    let h = harness();
    h.backend.override_response(
        endpoints::REGISTER,
        400,
        json!({
            "detail": "UNIQUE constraint failed: auth_user.username",
            "message": "Registration failed"
        }),
    );

    let err = h
        .lifecycle
        .register(&Registration::new("alice", "alice@example.com", "pw"))
        .await
        .unwrap_err();

    match err {
        SessionError::InvalidCredentials(message) => {
            assert_eq!(message, "UNIQUE constraint failed: auth_user.username");
        }
        other => panic!("expected InvalidCredentials, got {other:?}"),
    }
    assert_eq!(h.lifecycle.state(), AuthState::Unauthenticated);
}

// =========================================================================
// refresh()
// =========================================================================

#[tokio::test]
async fn test_refresh_replaces_access_and_keeps_refresh() {
    let h = harness();
    h.lifecycle.login(&alice()).await.unwrap();
    let mut events = h.lifecycle.events();

    let access = h.lifecycle.refresh().await.unwrap();

    assert_eq!(access, "A2");
    let stored = h.store().load();
    assert_eq!(stored.access_token(), Some("A2"));
    assert_eq!(stored.refresh_token(), Some("R1"));
    assert_eq!(h.lifecycle.state(), AuthState::Authenticated);
    assert_eq!(drain(&mut events), vec![SessionEvent::Refreshed]);
}

#[tokio::test]
async fn test_refresh_sends_refresh_token_in_body() {
    let h = harness();
    h.lifecycle.login(&alice()).await.unwrap();

    h.lifecycle.refresh().await.unwrap();

    let refresh = h
        .backend
        .requests()
        .into_iter()
        .find(|r| r.path == endpoints::TOKEN_REFRESH)
        .expect("refresh request should be sent");
    let body: serde_json::Value = serde_json::from_str(&refresh.body).unwrap();
    assert_eq!(body["refresh"], "R1");
    assert!(refresh.bearer.is_none());
}

#[tokio::test]
async fn test_refresh_rejected_clears_session_and_requires_login() {
    let h = harness();
    h.lifecycle.login(&alice()).await.unwrap();
    h.backend.revoke_refresh("R1");
    let mut events = h.lifecycle.events();

    let err = h.lifecycle.refresh().await.unwrap_err();

    assert!(matches!(err, SessionError::SessionExpired));
    assert!(err.requires_login());
    assert_eq!(h.store().load(), Session::empty());
    assert_eq!(h.lifecycle.state(), AuthState::Unauthenticated);
    assert_eq!(
        drain(&mut events),
        vec![
            SessionEvent::LoggedOut {
                reason: LogoutReason::SessionExpired
            },
            SessionEvent::LoginRequired,
        ]
    );
}

#[tokio::test]
async fn test_refresh_network_failure_keeps_session() {
    let h = harness();
    h.lifecycle.login(&alice()).await.unwrap();
    h.backend.set_offline(true);

    let err = h.lifecycle.refresh().await.unwrap_err();

    assert!(matches!(err, SessionError::Network(_)));
    assert_eq!(h.store().load().access_token(), Some("A1"));
    assert_eq!(h.lifecycle.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn test_refresh_server_error_keeps_session() {
    let h = harness();
    h.lifecycle.login(&alice()).await.unwrap();
    h.backend.override_status(endpoints::TOKEN_REFRESH, 502);

    let err = h.lifecycle.refresh().await.unwrap_err();

    assert_eq!(err.status(), Some(502));
    assert!(h.lifecycle.is_authenticated());
    assert_eq!(h.lifecycle.state(), AuthState::Authenticated);
}

#[tokio::test]
async fn test_refresh_without_session_is_unauthenticated() {
    let h = harness();

    let err = h.lifecycle.refresh().await.unwrap_err();

    assert!(matches!(err, SessionError::Unauthenticated));
    assert_eq!(h.backend.refresh_calls(), 0);
}

// =========================================================================
// restore()
// =========================================================================

#[tokio::test]
async fn test_restore_picks_up_saved_session() {
    let storage = MemoryStorage::new();
    let first = harness_with(FakeBackend::new(), storage.clone());
    first.lifecycle.login(&alice()).await.unwrap();
    first
        .lifecycle
        .update_user(UserSummary::new(1, "alice", "alice@example.com"))
        .unwrap();

    // A later run over the same storage.
    let second = harness_with(FakeBackend::new(), storage);
    assert_eq!(second.lifecycle.state(), AuthState::Unauthenticated);

    let state = second.lifecycle.restore();

    assert_eq!(state, AuthState::Authenticated);
    assert_eq!(
        second.lifecycle.current_user().map(|u| u.username),
        Some("alice".to_string())
    );
    assert!(second.backend.requests().is_empty(), "restore is local only");
}

#[tokio::test]
async fn test_restore_corrupt_record_is_unauthenticated() {
    let storage = MemoryStorage::new();
    storage.set(support::STORAGE_KEY, "%%% not a session").unwrap();
    let h = harness_with(FakeBackend::new(), storage);

    assert_eq!(h.lifecycle.restore(), AuthState::Unauthenticated);
    assert_eq!(h.storage.get(support::STORAGE_KEY).unwrap(), None);
}

#[tokio::test]
async fn test_restore_with_nothing_stored_is_unauthenticated() {
    let h = harness();
    assert_eq!(h.lifecycle.restore(), AuthState::Unauthenticated);
}

// =========================================================================
// update_user() / subscribe()
// =========================================================================

#[tokio::test]
async fn test_update_user_replaces_cached_user_and_keeps_tokens() {
    let h = harness();
    h.lifecycle.login(&alice()).await.unwrap();
    let mut user = UserSummary::new(1, "alice", "alice@example.com");
    user.display_name = Some("Alice Liddell".into());

    h.lifecycle.update_user(user.clone()).unwrap();

    assert_eq!(h.lifecycle.current_user(), Some(user));
    assert_eq!(h.store().load().access_token(), Some("A1"));
}

#[tokio::test]
async fn test_update_user_when_logged_out_is_rejected() {
    let h = harness();

    let err = h
        .lifecycle
        .update_user(UserSummary::new(1, "alice", ""))
        .unwrap_err();

    assert!(matches!(err, SessionError::Unauthenticated));
    assert_eq!(h.store().load(), Session::empty());
}

#[tokio::test]
async fn test_subscribe_observes_login_and_logout() {
    let h = harness();
    let mut states = h.lifecycle.subscribe();
    assert_eq!(*states.borrow_and_update(), AuthState::Unauthenticated);

    h.lifecycle.login(&alice()).await.unwrap();
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), AuthState::Authenticated);

    h.lifecycle.logout();
    assert_eq!(*states.borrow_and_update(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_issued_tokens_restore_into_fresh_lifecycle() {
    // Seeding storage directly, as a previous run would have.
    let backend = FakeBackend::new();
    let tokens: TokenPair = backend.issue_tokens("alice");
    let storage = MemoryStorage::new();
    let h = harness_with(backend, storage);
    h.store().save(&Session::new(tokens, None)).unwrap();

    assert_eq!(h.lifecycle.restore(), AuthState::Authenticated);
    assert!(h.lifecycle.current_user().is_none());
}
