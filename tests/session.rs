mod common;

use std::sync::Arc;

use courier_e2e::{
    AuditAction, InMemorySessionStore, SessionStore, UnlockError, UnlockState, VaultPassword,
};

use common::{alice, bob, directory, fast_config, Client, ALICE_PASSWORD, BOB_PASSWORD};

#[tokio::test]
async fn unlock_lifecycle() {
    let dir = directory();
    let client = Client::new(&dir, &fast_config());
    let ctrl = &client.controller;

    assert!(!ctrl.restore_from_session(&alice()).await);
    assert_eq!(ctrl.state(), UnlockState::Locked);
    assert!(ctrl.needs_prompt());

    assert_eq!(ctrl.request_unlock("").await, Err(UnlockError::EmptyPassword));
    assert_eq!(ctrl.request_unlock("wrong").await, Err(UnlockError::WrongPassword));
    assert_eq!(
        ctrl.last_error().map(|e| e.to_string()),
        Some("incorrect password, please try again".to_string())
    );
    ctrl.request_unlock(ALICE_PASSWORD).await.unwrap();
    assert!(ctrl.is_ready());
    assert_eq!(ctrl.last_error(), None);
    assert!(client.sessions.contains(&alice()));

    let actions = client.audit.actions();
    assert!(actions.contains(&AuditAction::UnlockFailed));
    assert!(actions.contains(&AuditAction::UnlockSucceeded));
}

#[tokio::test]
async fn reload_restores_without_prompt() {
    let dir = directory();
    let config = fast_config();
    let first = Client::new(&dir, &config);
    first.controller.switch_identity(&alice()).unwrap();
    first.controller.request_unlock(ALICE_PASSWORD).await.unwrap();

    let reloaded = Client::with_sessions(&dir, &config, first.sessions.clone());
    assert!(reloaded.controller.restore_from_session(&alice()).await);
    assert!(!reloaded.controller.needs_prompt());
}

#[tokio::test]
async fn session_isolation_after_reset() {
    let dir = directory();
    let config = fast_config();
    let sessions = Arc::new(InMemorySessionStore::from_config(&config));
    // Stale entry for bob left over from an earlier vault.
    sessions.set(&bob(), VaultPassword::new(ALICE_PASSWORD));
    let client = Client::with_sessions(&dir, &config, sessions);

    client.controller.switch_identity(&alice()).unwrap();
    client.controller.request_unlock(ALICE_PASSWORD).await.unwrap();
    client.controller.reset();
    assert!(!client.sessions.contains(&alice()));

    // Only bob's own slot is consulted, and its stale entry is dropped.
    assert!(!client.controller.restore_from_session(&bob()).await);
    assert!(!client.sessions.contains(&bob()));
    assert_eq!(client.controller.active_identity(), Some(bob()));

    client.controller.request_unlock(BOB_PASSWORD).await.unwrap();
    assert!(client.controller.is_ready());
    assert!(!client.sessions.contains(&alice()));
}

#[tokio::test]
async fn custom_prefix_namespaces_cache() {
    let dir = directory();
    let mut config = fast_config();
    config.session_key_prefix = "vault_pw:".into();
    let client = Client::new(&dir, &config);
    client.controller.switch_identity(&alice()).unwrap();
    client.controller.request_unlock(ALICE_PASSWORD).await.unwrap();
    assert_eq!(client.sessions.keys(), vec!["vault_pw:alice".to_string()]);
}

#[tokio::test]
async fn logout_then_login_as_other_user() {
    let dir = directory();
    let client = Client::new(&dir, &fast_config());
    client.controller.switch_identity(&alice()).unwrap();
    client.controller.request_unlock(ALICE_PASSWORD).await.unwrap();

    client.controller.logout();
    assert_eq!(client.controller.active_identity(), None);
    assert!(client.sessions.keys().is_empty());
    assert_eq!(
        client.controller.request_unlock(ALICE_PASSWORD).await,
        Err(UnlockError::NoActiveIdentity)
    );

    assert!(!client.controller.restore_from_session(&bob()).await);
    client.controller.request_unlock(BOB_PASSWORD).await.unwrap();
    assert_eq!(
        client.controller.unlocked_key().unwrap().identity(),
        &bob()
    );
}
