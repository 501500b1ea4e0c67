//! Error types for the E2E core.
//!
//! Decrypt-side failures are deliberately uniform: wrong key, wrong
//! password, bad padding and corrupted input all surface as the same value
//! so callers cannot build an oracle out of them.

use core::fmt;

use crate::types::Identity;

// ---------------------------------------------------------------------------
// Primitive errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptionError;

impl fmt::Display for DecryptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decryption failed")
    }
}

impl std::error::Error for DecryptionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyGenerationError;

impl fmt::Display for KeyGenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key generation failed")
    }
}

impl std::error::Error for KeyGenerationError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionError {
    /// The public key PEM could not be parsed.
    InvalidKey,
    /// Input exceeds the OAEP capacity of the key.
    PlaintextTooLarge { len: usize, max: usize },
}

impl fmt::Display for EncryptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid public key"),
            Self::PlaintextTooLarge { len, max } => {
                write!(f, "plaintext too large: {} bytes (max {})", len, max)
            }
        }
    }
}

impl std::error::Error for EncryptionError {}

/// Contract violation: symmetric key or IV of the wrong size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidKeyLength {
    pub what: &'static str,
    pub expected: usize,
    pub actual: usize,
}

impl fmt::Display for InvalidKeyLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} length: expected {} bytes, got {}",
            self.what, self.expected, self.actual
        )
    }
}

impl std::error::Error for InvalidKeyLength {}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrongPasswordError;

impl fmt::Display for WrongPasswordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "incorrect password")
    }
}

impl std::error::Error for WrongPasswordError {}

/// Vault boundary: every decrypt failure reads as a wrong password.
impl From<DecryptionError> for WrongPasswordError {
    fn from(_: DecryptionError) -> Self {
        WrongPasswordError
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    EmptyPassword,
    KeyGeneration,
    Encryption(EncryptionError),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPassword => write!(f, "password cannot be empty"),
            Self::KeyGeneration => write!(f, "key generation failed"),
            Self::Encryption(e) => write!(f, "key wrapping failed: {}", e),
        }
    }
}

impl std::error::Error for RegistrationError {}

impl From<KeyGenerationError> for RegistrationError {
    fn from(_: KeyGenerationError) -> Self {
        Self::KeyGeneration
    }
}

impl From<EncryptionError> for RegistrationError {
    fn from(e: EncryptionError) -> Self {
        Self::Encryption(e)
    }
}

// ---------------------------------------------------------------------------
// Session unlock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockError {
    /// Rejected locally; no unwrap was attempted.
    EmptyPassword,
    /// Generic failure for any unwrap problem.
    WrongPassword,
    /// Another unlock for this identity is in flight.
    Busy,
    /// The attempt was superseded by a reset, cancel or identity switch.
    Cancelled,
    NoActiveIdentity,
    /// The account record carries no wrapped private key.
    MissingPrivateKey,
    UnknownIdentity(Identity),
    Directory(String),
}

impl fmt::Display for UnlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPassword => write!(f, "password cannot be empty"),
            Self::WrongPassword => write!(f, "incorrect password, please try again"),
            Self::Busy => write!(f, "an unlock attempt is already in progress"),
            Self::Cancelled => write!(f, "unlock attempt was cancelled"),
            Self::NoActiveIdentity => write!(f, "no active identity"),
            Self::MissingPrivateKey => write!(f, "private key not found"),
            Self::UnknownIdentity(id) => write!(f, "unknown identity: {}", id),
            Self::Directory(msg) => write!(f, "directory error: {}", msg),
        }
    }
}

impl std::error::Error for UnlockError {}

impl From<WrongPasswordError> for UnlockError {
    fn from(_: WrongPasswordError) -> Self {
        Self::WrongPassword
    }
}

impl From<DirectoryError> for UnlockError {
    fn from(e: DirectoryError) -> Self {
        Self::Directory(e.0)
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeError {
    /// A required field is absent or structurally invalid.
    Malformed(&'static str),
    /// Uniform decrypt failure.
    Decryption,
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(field) => write!(f, "malformed envelope: {}", field),
            Self::Decryption => write!(f, "message could not be decrypted"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl From<DecryptionError> for EnvelopeError {
    fn from(_: DecryptionError) -> Self {
        Self::Decryption
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SealError {
    VaultLocked,
    PeerKeyUnavailable(Identity),
    /// Unencrypted send was requested but is disabled by configuration.
    FallbackDisabled,
    Encryption(EncryptionError),
    Directory(String),
}

impl fmt::Display for SealError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VaultLocked => write!(f, "vault is locked"),
            Self::PeerKeyUnavailable(id) => write!(f, "no public key for {}", id),
            Self::FallbackDisabled => write!(f, "unencrypted sending is disabled"),
            Self::Encryption(e) => write!(f, "encryption failed: {}", e),
            Self::Directory(msg) => write!(f, "directory error: {}", msg),
        }
    }
}

impl std::error::Error for SealError {}

impl From<EncryptionError> for SealError {
    fn from(e: EncryptionError) -> Self {
        Self::Encryption(e)
    }
}

impl From<DirectoryError> for SealError {
    fn from(e: DirectoryError) -> Self {
        Self::Directory(e.0)
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Failure reported by a `KeyDirectory` implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryError(pub String);

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for DirectoryError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}
