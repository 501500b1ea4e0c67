//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Smallest RSA modulus accepted for new keypairs.
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// PBKDF2 round bounds accepted when reading a vault header.
pub const MIN_KDF_ITERATIONS: u32 = 1_000;
pub const MAX_KDF_ITERATIONS: u32 = 10_000_000;

/// Rounds below this log a warning when wrapping.
pub const RECOMMENDED_KDF_ITERATIONS: u32 = 310_000;

/// Password vault settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// PBKDF2-HMAC-SHA256 rounds used for new wraps.
    pub kdf_iterations: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: RECOMMENDED_KDF_ITERATIONS,
        }
    }
}

impl VaultConfig {
    /// Fast settings for tests. Never use in production.
    pub fn insecure_fast() -> Self {
        Self {
            kdf_iterations: MIN_KDF_ITERATIONS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub rsa_key_bits: usize,
    pub vault: VaultConfig,
    /// Session store key prefix; the identity is appended.
    pub session_key_prefix: String,
    /// Allow explicitly flagged unencrypted sends when keys are missing.
    pub allow_unencrypted_fallback: bool,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            rsa_key_bits: MIN_RSA_KEY_BITS,
            vault: VaultConfig::default(),
            session_key_prefix: "e2e_password_".into(),
            allow_unencrypted_fallback: false,
        }
    }
}

impl CourierConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|e| ConfigError(format!("parse: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rsa_key_bits < MIN_RSA_KEY_BITS {
            return Err(ConfigError(format!(
                "rsa_key_bits {} is below minimum {}",
                self.rsa_key_bits, MIN_RSA_KEY_BITS
            )));
        }
        if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&self.vault.kdf_iterations) {
            return Err(ConfigError(format!(
                "vault.kdf_iterations {} outside [{}, {}]",
                self.vault.kdf_iterations, MIN_KDF_ITERATIONS, MAX_KDF_ITERATIONS
            )));
        }
        if self.session_key_prefix.is_empty() {
            return Err(ConfigError("session_key_prefix must not be empty".into()));
        }
        Ok(())
    }
}
