//! Identity/auth provider seam: where account key material comes from.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::DirectoryError;
use crate::types::{AccountKeys, Identity};

/// Source of key material for the signed-in user and their correspondents.
///
/// Implement this over your auth API. `InMemoryDirectory` covers tests and
/// tooling.
pub trait KeyDirectory: Send + Sync {
    /// Public key plus wrapped private key for an account we can sign in as.
    fn account(&self, identity: &Identity) -> Result<Option<AccountKeys>, DirectoryError>;
    /// SPKI PEM public key of any identity.
    fn public_key(&self, identity: &Identity) -> Result<Option<String>, DirectoryError>;
}

/// In-memory directory (for testing and ephemeral use).
pub struct InMemoryDirectory {
    accounts: RwLock<HashMap<Identity, AccountKeys>>,
    public_keys: RwLock<HashMap<Identity, String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            public_keys: RwLock::new(HashMap::new()),
        }
    }

    /// Register a full account; its public key becomes discoverable too.
    pub fn insert_account(&self, account: AccountKeys) {
        self.public_keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(account.identity.clone(), account.public_key_pem.clone());
        self.accounts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(account.identity.clone(), account);
    }

    /// Register only a correspondent's public key.
    pub fn insert_public_key(&self, identity: Identity, public_key_pem: impl Into<String>) {
        self.public_keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identity, public_key_pem.into());
    }

    pub fn remove(&self, identity: &Identity) {
        self.accounts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(identity);
        self.public_keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(identity);
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyDirectory for InMemoryDirectory {
    fn account(&self, identity: &Identity) -> Result<Option<AccountKeys>, DirectoryError> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| DirectoryError("account table poisoned".into()))?;
        Ok(accounts.get(identity).cloned())
    }

    fn public_key(&self, identity: &Identity) -> Result<Option<String>, DirectoryError> {
        let keys = self
            .public_keys
            .read()
            .map_err(|_| DirectoryError("public key table poisoned".into()))?;
        Ok(keys.get(identity).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WrappedPrivateKey;

    #[test]
    fn account_exposes_public_key() {
        let dir = InMemoryDirectory::new();
        let alice = Identity::new("alice");
        dir.insert_account(AccountKeys {
            identity: alice.clone(),
            public_key_pem: "PEM-A".into(),
            wrapped_private_key: WrappedPrivateKey::new("blob"),
        });
        assert_eq!(dir.public_key(&alice).unwrap().as_deref(), Some("PEM-A"));
        assert!(dir.account(&alice).unwrap().is_some());
    }

    #[test]
    fn peer_only_has_no_account() {
        let dir = InMemoryDirectory::new();
        let bob = Identity::new("bob");
        dir.insert_public_key(bob.clone(), "PEM-B");
        assert!(dir.account(&bob).unwrap().is_none());
        assert_eq!(dir.public_key(&bob).unwrap().as_deref(), Some("PEM-B"));
        dir.remove(&bob);
        assert!(dir.public_key(&bob).unwrap().is_none());
    }
}
