//! Shared fixtures. RSA keys are generated once per test binary.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use courier_e2e::{
    generate_key_pair, AccountKeys, CourierConfig, Identity, InMemoryAuditSink,
    InMemoryDirectory, InMemorySessionStore, KeyPair, Messenger, PrivateKeyVault,
    UnlockController, VaultConfig, VaultPassword,
};

pub const ALICE_PASSWORD: &str = "correct-password";
pub const BOB_PASSWORD: &str = "bob-password";

fn pairs() -> &'static [KeyPair; 3] {
    static PAIRS: OnceLock<[KeyPair; 3]> = OnceLock::new();
    PAIRS.get_or_init(|| {
        [
            generate_key_pair(2048).expect("keygen"),
            generate_key_pair(2048).expect("keygen"),
            generate_key_pair(2048).expect("keygen"),
        ]
    })
}

pub fn alice_keys() -> &'static KeyPair {
    &pairs()[0]
}

pub fn bob_keys() -> &'static KeyPair {
    &pairs()[1]
}

/// Unrelated third party.
pub fn carol_keys() -> &'static KeyPair {
    &pairs()[2]
}

pub fn alice() -> Identity {
    Identity::new("alice")
}

pub fn bob() -> Identity {
    Identity::new("bob")
}

pub fn carol() -> Identity {
    Identity::new("carol")
}

pub fn fast_config() -> CourierConfig {
    CourierConfig {
        vault: VaultConfig::insecure_fast(),
        ..CourierConfig::default()
    }
}

pub fn account(identity: Identity, keys: &KeyPair, password: &str) -> AccountKeys {
    let vault = PrivateKeyVault::new(VaultConfig::insecure_fast());
    AccountKeys {
        identity,
        public_key_pem: keys.public_key_pem.clone(),
        wrapped_private_key: vault
            .wrap(&keys.private_key_pem, &VaultPassword::new(password))
            .expect("wrap"),
    }
}

/// Directory with alice and bob registered. Carol is unknown.
pub fn directory() -> Arc<InMemoryDirectory> {
    let dir = Arc::new(InMemoryDirectory::new());
    dir.insert_account(account(alice(), alice_keys(), ALICE_PASSWORD));
    dir.insert_account(account(bob(), bob_keys(), BOB_PASSWORD));
    dir
}

/// One client session: its own password cache, controller and messenger.
pub struct Client {
    pub sessions: Arc<InMemorySessionStore>,
    pub audit: Arc<InMemoryAuditSink>,
    pub controller: Arc<UnlockController>,
    pub messenger: Messenger,
}

impl Client {
    pub fn new(directory: &Arc<InMemoryDirectory>, config: &CourierConfig) -> Self {
        Self::with_sessions(
            directory,
            config,
            Arc::new(InMemorySessionStore::from_config(config)),
        )
    }

    /// A client sharing an existing session cache (e.g. a page reload).
    pub fn with_sessions(
        directory: &Arc<InMemoryDirectory>,
        config: &CourierConfig,
        sessions: Arc<InMemorySessionStore>,
    ) -> Self {
        let audit = Arc::new(InMemoryAuditSink::new());
        let controller = Arc::new(UnlockController::new(
            directory.clone(),
            sessions.clone(),
            audit.clone(),
            config,
        ));
        let messenger = Messenger::new(controller.clone(), directory.clone(), audit.clone(), config);
        Self {
            sessions,
            audit,
            controller,
            messenger,
        }
    }
}
