//! # Courier E2E
//!
//! End-to-end encryption core for one-to-one direct messages.
//!
//! ## Quick Start
//!
//! ```rust
//! use courier_e2e::{generate_key_pair, EnvelopeCodec, Identity, MessageEnvelope};
//!
//! let alice = generate_key_pair(2048).unwrap();
//! let bob = generate_key_pair(2048).unwrap();
//!
//! let codec = EnvelopeCodec::new();
//! let envelope = codec
//!     .seal("hello", &Identity::new("alice"), &alice.public_key_pem, &bob.public_key_pem)
//!     .unwrap();
//!
//! // Over the wire and back.
//! let received = MessageEnvelope::from_json(&envelope.to_json().unwrap()).unwrap();
//! let text = codec
//!     .open(&received, &bob.private_key_pem, &Identity::new("bob"))
//!     .unwrap();
//! assert_eq!(text, "hello");
//! ```
//!
//! ## Security Properties
//!
//! - **Hybrid encryption**: fresh AES-256-CBC key and IV per message, wrapped
//!   with RSA-OAEP (SHA-256) for both correspondents
//! - **Uniform errors**: wrong key, bad padding and corrupted input produce
//!   the same error value
//! - **Password vault**: private keys at rest are PBKDF2-HMAC-SHA256 +
//!   AES-256-GCM wrapped
//! - **Fail closed**: unencrypted sending is an explicit, flagged,
//!   opt-in mode
//!
//! ## What's NOT Provided
//!
//! - Transport, retries or delivery receipts
//! - Key rotation
//! - Group messaging
//! - Forward secrecy

#![deny(unsafe_code)]

pub mod asymmetric;
pub mod audit;
pub mod config;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod messenger;
pub mod session;
pub mod symmetric;
pub mod types;
pub mod vault;

pub use asymmetric::{
    decrypt_with_private_key, encrypt_with_public_key, generate_key_pair,
    generate_key_pair_async, PrivateKey, PublicKey,
};
pub use audit::{AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use config::{CourierConfig, VaultConfig};
pub use directory::{InMemoryDirectory, KeyDirectory};
pub use envelope::{EnvelopeCodec, MessageEnvelope};
pub use error::{
    ConfigError, DecryptionError, DirectoryError, EncryptionError, EnvelopeError,
    InvalidKeyLength, KeyGenerationError, RegistrationError, SealError, UnlockError,
    WrongPasswordError,
};
pub use messenger::{MessageBody, Messenger, RenderedMessage};
pub use session::{InMemorySessionStore, SessionStore, UnlockController, UnlockState, UnlockedKey};
pub use symmetric::{AesKey, Iv};
pub use types::{AccountKeys, Identity, KeyPair, VaultPassword, WrappedPrivateKey};
pub use vault::{register, PrivateKeyVault, Registration, VaultInfo};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
