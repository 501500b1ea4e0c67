//! Session unlock: gates every encryption operation on the user supplying
//! the vault password once per session.
//!
//! State machine:
//!
//! ```text
//! Locked --request_unlock--> Verifying --ok--> Unlocked
//!                                |
//!                                +--fail / cancel--> Locked
//! Unlocked --reset / logout / identity switch--> Locked
//! ```
//!
//! A verified password is cached in a [`SessionStore`] under
//! `<prefix><identity>` so later controllers in the same session can
//! restore without prompting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde::{Deserialize, Serialize};

use crate::asymmetric::PrivateKey;
use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::config::CourierConfig;
use crate::directory::KeyDirectory;
use crate::error::UnlockError;
use crate::types::{AccountKeys, Identity, VaultPassword};
use crate::vault::PrivateKeyVault;

// ---------------------------------------------------------------------------
// Session password cache
// ---------------------------------------------------------------------------

/// Session-scoped password cache, keyed by identity.
///
/// Implementations must not persist entries beyond the application session.
pub trait SessionStore: Send + Sync {
    fn get(&self, identity: &Identity) -> Option<VaultPassword>;
    fn set(&self, identity: &Identity, password: VaultPassword);
    fn clear(&self, identity: &Identity);
}

/// Storage key for an identity's cached password.
pub fn session_key(prefix: &str, identity: &Identity) -> String {
    format!("{}{}", prefix, identity)
}

/// In-memory session store; lives as long as the process.
pub struct InMemorySessionStore {
    prefix: String,
    entries: RwLock<HashMap<String, VaultPassword>>,
}

impl InMemorySessionStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &CourierConfig) -> Self {
        Self::new(config.session_key_prefix.clone())
    }

    /// Raw keys currently held, for inspection.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&session_key(&self.prefix, identity))
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::from_config(&CourierConfig::default())
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, identity: &Identity) -> Option<VaultPassword> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&session_key(&self.prefix, identity))
            .cloned()
    }

    fn set(&self, identity: &Identity, password: VaultPassword) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_key(&self.prefix, identity), password);
    }

    fn clear(&self, identity: &Identity) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&session_key(&self.prefix, identity));
    }
}

// ---------------------------------------------------------------------------
// Controller state
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnlockState {
    Locked,
    Verifying,
    Unlocked,
}

impl std::fmt::Display for UnlockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locked => write!(f, "locked"),
            Self::Verifying => write!(f, "verifying"),
            Self::Unlocked => write!(f, "unlocked"),
        }
    }
}

/// Key material available while the controller is `Unlocked`.
pub struct UnlockedKey {
    identity: Identity,
    public_key_pem: String,
    private_key: PrivateKey,
}

impl UnlockedKey {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

impl std::fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("identity", &self.identity)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

struct Inner {
    state: UnlockState,
    account: Option<AccountKeys>,
    unlocked: Option<Arc<UnlockedKey>>,
    last_error: Option<UnlockError>,
    /// Bumped on every reset, cancel and identity switch. A verification
    /// that finishes under an older epoch is discarded.
    epoch: u64,
}

enum Attempt {
    Prompt,
    Restore,
}

/// Returns the controller to `Locked` if a verification future is dropped
/// before it completes.
struct VerifyGuard<'a> {
    inner: &'a Mutex<Inner>,
    epoch: u64,
    armed: bool,
}

impl VerifyGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for VerifyGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.epoch == self.epoch && inner.state == UnlockState::Verifying {
            inner.state = UnlockState::Locked;
            tracing::debug!("unlock attempt dropped, back to locked");
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct UnlockController {
    directory: Arc<dyn KeyDirectory>,
    sessions: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditSink>,
    vault: PrivateKeyVault,
    inner: Mutex<Inner>,
}

impl UnlockController {
    pub fn new(
        directory: Arc<dyn KeyDirectory>,
        sessions: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
        config: &CourierConfig,
    ) -> Self {
        Self {
            directory,
            sessions,
            audit,
            vault: PrivateKeyVault::new(config.vault.clone()),
            inner: Mutex::new(Inner {
                state: UnlockState::Locked,
                account: None,
                unlocked: None,
                last_error: None,
                epoch: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    pub fn state(&self) -> UnlockState {
        self.lock().state
    }

    /// True only while `Unlocked`.
    pub fn is_ready(&self) -> bool {
        self.state() == UnlockState::Unlocked
    }

    /// Whether a password prompt should be on screen.
    pub fn needs_prompt(&self) -> bool {
        let inner = self.lock();
        inner.account.is_some() && inner.state == UnlockState::Locked
    }

    pub fn active_identity(&self) -> Option<Identity> {
        self.lock().account.as_ref().map(|a| a.identity.clone())
    }

    /// The user-visible error from the last prompt submission.
    pub fn last_error(&self) -> Option<UnlockError> {
        self.lock().last_error.clone()
    }

    /// Called when the user edits the password field.
    pub fn clear_error(&self) {
        self.lock().last_error = None;
    }

    /// The unwrapped key, if and only if the controller is `Unlocked`.
    pub fn unlocked_key(&self) -> Option<Arc<UnlockedKey>> {
        let inner = self.lock();
        match inner.state {
            UnlockState::Unlocked => inner.unlocked.clone(),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Identity lifecycle
    // -----------------------------------------------------------------------

    /// Make `identity` the active account. Switching away from another
    /// identity resets it first, clearing its cached password. The previous
    /// account is dropped even if `identity` cannot be looked up.
    pub fn switch_identity(&self, identity: &Identity) -> Result<(), UnlockError> {
        {
            let mut inner = self.lock();
            if inner.account.as_ref().map(|a| &a.identity) == Some(identity) {
                return Ok(());
            }
            match inner.account.take() {
                Some(previous) => self.reset_locked(&mut inner, &previous.identity),
                None => {
                    inner.epoch += 1;
                    inner.state = UnlockState::Locked;
                    inner.unlocked = None;
                    inner.last_error = None;
                }
            }
        }

        let account = self
            .directory
            .account(identity)?
            .ok_or_else(|| UnlockError::UnknownIdentity(identity.clone()))?;

        let mut inner = self.lock();
        // A concurrent switch may have landed while the lock was released.
        if let Some(other) = inner.account.take() {
            self.reset_locked(&mut inner, &other.identity);
        }
        tracing::debug!(identity = %identity, "active identity set");
        inner.account = Some(account);
        Ok(())
    }

    /// On startup for `identity`: unlock from a cached password without
    /// prompting. A stale cached password is removed and `false` returned.
    pub async fn restore_from_session(&self, identity: &Identity) -> bool {
        if let Err(e) = self.switch_identity(identity) {
            tracing::warn!(identity = %identity, error = %e, "cannot restore session");
            return false;
        }
        if self.is_ready() {
            return true;
        }
        let Some(password) = self.sessions.get(identity) else {
            return false;
        };

        match self.verify(password, Attempt::Restore).await {
            Ok(()) => {
                self.audit
                    .record(AuditEvent::new(Some(identity), AuditAction::SessionRestored));
                true
            }
            Err(UnlockError::Busy) | Err(UnlockError::Cancelled) => false,
            Err(e) => {
                // Keep the entry if a newer attempt already replaced it.
                if self.active_identity().as_ref() == Some(identity) && !self.is_ready() {
                    self.sessions.clear(identity);
                }
                tracing::info!(identity = %identity, "cached vault password rejected");
                self.audit.record(
                    AuditEvent::new(Some(identity), AuditAction::SessionRestoreFailed)
                        .with_detail(e.to_string())
                        .with_failure(),
                );
                false
            }
        }
    }

    /// Submit a password from the prompt.
    ///
    /// Blank passwords are rejected without attempting an unwrap. Every
    /// unwrap failure is reported as `WrongPassword`. Calling this while
    /// already `Unlocked` is a no-op: the password is not checked and no
    /// audit event is recorded.
    pub async fn request_unlock(
        &self,
        password: impl Into<VaultPassword>,
    ) -> Result<(), UnlockError> {
        let password = password.into();
        let identity = self.active_identity();

        if self.is_ready() {
            tracing::debug!("unlock requested while already unlocked");
            return Ok(());
        }

        if password.is_blank() {
            self.lock().last_error = Some(UnlockError::EmptyPassword);
            self.audit.record(
                AuditEvent::new(
                    identity.as_ref(),
                    AuditAction::UnlockRejected {
                        reason: "empty password".into(),
                    },
                )
                .with_failure(),
            );
            return Err(UnlockError::EmptyPassword);
        }

        let result = self.verify(password, Attempt::Prompt).await;
        match &result {
            Ok(()) => {
                self.audit
                    .record(AuditEvent::new(identity.as_ref(), AuditAction::UnlockSucceeded));
            }
            Err(UnlockError::WrongPassword) => {
                self.audit.record(
                    AuditEvent::new(identity.as_ref(), AuditAction::UnlockFailed).with_failure(),
                );
            }
            Err(e) => {
                self.audit.record(
                    AuditEvent::new(
                        identity.as_ref(),
                        AuditAction::UnlockRejected {
                            reason: e.to_string(),
                        },
                    )
                    .with_failure(),
                );
            }
        }
        result
    }

    /// Lock and forget the cached password for the active identity.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let identity = inner.account.as_ref().map(|a| a.identity.clone());
        match identity {
            Some(identity) => self.reset_locked(&mut inner, &identity),
            None => {
                inner.epoch += 1;
                inner.state = UnlockState::Locked;
                inner.unlocked = None;
                inner.last_error = None;
            }
        }
    }

    /// `reset` plus dropping the active account.
    pub fn logout(&self) {
        let mut inner = self.lock();
        if let Some(account) = inner.account.take() {
            self.reset_locked(&mut inner, &account.identity);
            tracing::info!(identity = %account.identity, "logged out");
        }
    }

    /// The user dismissed the prompt. An in-flight verification is
    /// abandoned; an `Unlocked` controller is left alone.
    pub fn cancel_prompt(&self) {
        let mut inner = self.lock();
        if inner.state == UnlockState::Unlocked {
            return;
        }
        inner.epoch += 1;
        inner.state = UnlockState::Locked;
        inner.last_error = None;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Caller holds the state lock, so the cache is cleared before any
    /// later verification can observe it.
    fn reset_locked(&self, inner: &mut Inner, identity: &Identity) {
        inner.epoch += 1;
        inner.state = UnlockState::Locked;
        inner.unlocked = None;
        inner.last_error = None;
        self.sessions.clear(identity);
        self.audit
            .record(AuditEvent::new(Some(identity), AuditAction::SessionReset));
        tracing::debug!(identity = %identity, "session reset");
    }

    async fn verify(&self, password: VaultPassword, attempt: Attempt) -> Result<(), UnlockError> {
        let (account, epoch) = {
            let mut inner = self.lock();
            let Some(account) = inner.account.clone() else {
                return Err(self.fail(&mut inner, &attempt, UnlockError::NoActiveIdentity));
            };
            match inner.state {
                UnlockState::Unlocked => return Ok(()),
                UnlockState::Verifying => return Err(UnlockError::Busy),
                UnlockState::Locked => {}
            }
            if account.wrapped_private_key.is_empty() {
                return Err(self.fail(&mut inner, &attempt, UnlockError::MissingPrivateKey));
            }
            inner.state = UnlockState::Verifying;
            inner.last_error = None;
            (account, inner.epoch)
        };

        let mut guard = VerifyGuard {
            inner: &self.inner,
            epoch,
            armed: true,
        };
        let vault = self.vault.clone();
        let wrapped = account.wrapped_private_key.clone();
        let candidate = password.clone();
        let outcome =
            tokio::task::spawn_blocking(move || vault.unwrap_key(&wrapped, &candidate)).await;
        guard.disarm();

        let mut inner = self.lock();
        if inner.epoch != epoch {
            tracing::debug!(identity = %account.identity, "stale unlock attempt discarded");
            return Err(UnlockError::Cancelled);
        }
        match outcome {
            Ok(Ok((_pem, private_key))) => {
                inner.state = UnlockState::Unlocked;
                inner.unlocked = Some(Arc::new(UnlockedKey {
                    identity: account.identity.clone(),
                    public_key_pem: account.public_key_pem.clone(),
                    private_key,
                }));
                self.sessions.set(&account.identity, password);
                tracing::info!(identity = %account.identity, "vault unlocked");
                Ok(())
            }
            Ok(Err(_)) | Err(_) => {
                inner.state = UnlockState::Locked;
                inner.unlocked = None;
                Err(self.fail(&mut inner, &attempt, UnlockError::WrongPassword))
            }
        }
    }

    /// Restores never surface an error to the prompt.
    fn fail(&self, inner: &mut Inner, attempt: &Attempt, err: UnlockError) -> UnlockError {
        if matches!(attempt, Attempt::Prompt) {
            inner.last_error = Some(err.clone());
        }
        err
    }
}
