//! Password vault for the RSA private key.
//!
//! Format (v1), standard base64 of:
//!   version[1] || kdf[1] || iterations[4, BE] || salt[16]
//!   || nonce[12] || aead_ct[16+]
//!
//! key = PBKDF2-HMAC-SHA256(password, salt, iterations, 32)
//! aead_ct = AES-256-GCM(key, nonce, pem, aad = version..salt)
//!
//! The server stores this string but can do nothing with it. Every unwrap
//! failure, whether a bad header, a bad tag or an unparsable PEM, reads as
//! `WrongPasswordError`.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::asymmetric::{self, PrivateKey};
use crate::config::{
    CourierConfig, VaultConfig, MAX_KDF_ITERATIONS, MIN_KDF_ITERATIONS, RECOMMENDED_KDF_ITERATIONS,
};
use crate::error::{DecryptionError, EncryptionError, RegistrationError, WrongPasswordError};
use crate::types::{VaultPassword, WrappedPrivateKey};

/// Version byte for v1.
pub const VAULT_VERSION: u8 = 0x01;

/// KDF identifiers (on-wire).
pub const KDF_PBKDF2_HMAC_SHA256: u8 = 0x01;

pub const SALT_BYTES: usize = 16;
pub const NONCE_BYTES: usize = 12;
pub const AEAD_TAG_BYTES: usize = 16;
pub const DERIVED_KEY_BYTES: usize = 32;

/// Header size: version + kdf + iterations(u32) + salt
pub const HEADER_BYTES: usize = 1 + 1 + 4 + SALT_BYTES; // 22

/// Minimum decoded size: header + nonce + tag
pub const MIN_WRAPPED_BYTES: usize = HEADER_BYTES + NONCE_BYTES + AEAD_TAG_BYTES; // 50

// ---------------------------------------------------------------------------
// Wire layout
// ---------------------------------------------------------------------------

/// Borrowed view of a decoded vault blob.
#[derive(Debug, Clone, Copy)]
struct VaultComponents<'a> {
    iterations: u32,
    header: &'a [u8],
    salt: &'a [u8; SALT_BYTES],
    nonce: &'a [u8; NONCE_BYTES],
    aead_ciphertext: &'a [u8],
}

fn decode_vault(data: &[u8]) -> Result<VaultComponents<'_>, DecryptionError> {
    if data.len() < MIN_WRAPPED_BYTES {
        return Err(DecryptionError);
    }
    if data[0] != VAULT_VERSION || data[1] != KDF_PBKDF2_HMAC_SHA256 {
        return Err(DecryptionError);
    }

    let iterations = u32::from_be_bytes([data[2], data[3], data[4], data[5]]);
    if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&iterations) {
        return Err(DecryptionError);
    }

    let salt: &[u8; SALT_BYTES] = data[6..HEADER_BYTES]
        .try_into()
        .map_err(|_| DecryptionError)?;
    let nonce_end = HEADER_BYTES + NONCE_BYTES;
    let nonce: &[u8; NONCE_BYTES] = data[HEADER_BYTES..nonce_end]
        .try_into()
        .map_err(|_| DecryptionError)?;

    Ok(VaultComponents {
        iterations,
        header: &data[..HEADER_BYTES],
        salt,
        nonce,
        aead_ciphertext: &data[nonce_end..],
    })
}

fn encode_header(iterations: u32, salt: &[u8; SALT_BYTES]) -> [u8; HEADER_BYTES] {
    let mut out = [0u8; HEADER_BYTES];
    out[0] = VAULT_VERSION;
    out[1] = KDF_PBKDF2_HMAC_SHA256;
    out[2..6].copy_from_slice(&iterations.to_be_bytes());
    out[6..].copy_from_slice(salt);
    out
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; DERIVED_KEY_BYTES]> {
    let mut key = Zeroizing::new([0u8; DERIVED_KEY_BYTES]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key[..]);
    key
}

/// Header metadata of a wrapped key. Reading it needs no password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultInfo {
    pub version: u8,
    pub kdf: u8,
    pub iterations: u32,
    pub total_bytes: usize,
    pub ciphertext_bytes: usize,
}

/// Parse the header of a wrapped key without attempting to open it.
pub fn inspect(wrapped: &WrappedPrivateKey) -> Result<VaultInfo, DecryptionError> {
    let data = STANDARD
        .decode(wrapped.as_str().trim())
        .map_err(|_| DecryptionError)?;
    let parts = decode_vault(&data)?;
    Ok(VaultInfo {
        version: VAULT_VERSION,
        kdf: KDF_PBKDF2_HMAC_SHA256,
        iterations: parts.iterations,
        total_bytes: data.len(),
        ciphertext_bytes: parts.aead_ciphertext.len(),
    })
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Wraps and unwraps private keys under a user password.
#[derive(Clone, Debug, Default)]
pub struct PrivateKeyVault {
    config: VaultConfig,
}

impl PrivateKeyVault {
    pub fn new(config: VaultConfig) -> Self {
        if config.kdf_iterations < RECOMMENDED_KDF_ITERATIONS {
            tracing::warn!(
                iterations = config.kdf_iterations,
                recommended = RECOMMENDED_KDF_ITERATIONS,
                "vault kdf iterations below recommended value"
            );
        }
        Self { config }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Encrypt a PKCS#8 PEM private key under `password`.
    ///
    /// The PEM is parsed first; anything that is not a private key is
    /// refused with `EncryptionError::InvalidKey`.
    pub fn wrap(
        &self,
        private_key_pem: &str,
        password: &VaultPassword,
    ) -> Result<WrappedPrivateKey, EncryptionError> {
        PrivateKey::from_pem(private_key_pem).map_err(|_| EncryptionError::InvalidKey)?;

        let iterations = self
            .config
            .kdf_iterations
            .clamp(MIN_KDF_ITERATIONS, MAX_KDF_ITERATIONS);
        let mut salt = [0u8; SALT_BYTES];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);

        let header = encode_header(iterations, &salt);
        let key = derive_key(password.expose(), &salt, iterations);
        let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| EncryptionError::InvalidKey)?;
        let aead_ct = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: private_key_pem.as_bytes(),
                    aad: &header,
                },
            )
            .map_err(|_| EncryptionError::InvalidKey)?;

        let mut out = Vec::with_capacity(HEADER_BYTES + NONCE_BYTES + aead_ct.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&aead_ct);
        Ok(WrappedPrivateKey::new(STANDARD.encode(out)))
    }

    /// Recover the PEM. Any failure is `WrongPasswordError`.
    pub fn unwrap(
        &self,
        wrapped: &WrappedPrivateKey,
        password: &VaultPassword,
    ) -> Result<Zeroizing<String>, WrongPasswordError> {
        self.unwrap_inner(wrapped, password).map(|(pem, _)| pem)
    }

    /// Like [`unwrap`](Self::unwrap) but also returns the parsed key.
    pub fn unwrap_key(
        &self,
        wrapped: &WrappedPrivateKey,
        password: &VaultPassword,
    ) -> Result<(Zeroizing<String>, PrivateKey), WrongPasswordError> {
        self.unwrap_inner(wrapped, password)
    }

    /// Re-encrypt under a new password with fresh salt and nonce.
    pub fn rewrap(
        &self,
        wrapped: &WrappedPrivateKey,
        old_password: &VaultPassword,
        new_password: &VaultPassword,
    ) -> Result<WrappedPrivateKey, WrongPasswordError> {
        let pem = self.unwrap(wrapped, old_password)?;
        self.wrap(&pem, new_password).map_err(|_| WrongPasswordError)
    }

    fn unwrap_inner(
        &self,
        wrapped: &WrappedPrivateKey,
        password: &VaultPassword,
    ) -> Result<(Zeroizing<String>, PrivateKey), WrongPasswordError> {
        let data = STANDARD
            .decode(wrapped.as_str().trim())
            .map_err(|_| WrongPasswordError)?;
        let parts = decode_vault(&data)?;

        let key = derive_key(password.expose(), parts.salt, parts.iterations);
        let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| WrongPasswordError)?;
        let plain = Zeroizing::new(
            cipher
                .decrypt(
                    Nonce::from_slice(parts.nonce),
                    Payload {
                        msg: parts.aead_ciphertext,
                        aad: parts.header,
                    },
                )
                .map_err(|_| WrongPasswordError)?,
        );

        let pem = Zeroizing::new(
            core::str::from_utf8(&plain)
                .map_err(|_| WrongPasswordError)?
                .to_owned(),
        );
        let parsed = PrivateKey::from_pem(&pem)?;
        Ok((pem, parsed))
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Public half plus vault blob, ready to store on the account record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub public_key_pem: String,
    pub wrapped_private_key: WrappedPrivateKey,
}

/// Generate a keypair for a new account and wrap its private key.
///
/// Key generation failure aborts registration; it is not retried.
pub async fn register(
    password: &VaultPassword,
    config: &CourierConfig,
) -> Result<Registration, RegistrationError> {
    if password.is_blank() {
        return Err(RegistrationError::EmptyPassword);
    }
    let key_pair = asymmetric::generate_key_pair_async(config.rsa_key_bits)
        .await
        .map_err(|e| {
            tracing::warn!("keypair generation failed during registration");
            RegistrationError::from(e)
        })?;

    let vault = PrivateKeyVault::new(config.vault.clone());
    let wrapped_private_key = vault.wrap(&key_pair.private_key_pem, password)?;
    Ok(Registration {
        public_key_pem: key_pair.public_key_pem,
        wrapped_private_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KeyPair;
    use std::sync::OnceLock;

    fn key_pair() -> &'static KeyPair {
        static KP: OnceLock<KeyPair> = OnceLock::new();
        KP.get_or_init(|| asymmetric::generate_key_pair(2048).expect("keygen"))
    }

    fn vault() -> PrivateKeyVault {
        PrivateKeyVault::new(VaultConfig::insecure_fast())
    }

    fn raw(wrapped: &WrappedPrivateKey) -> Vec<u8> {
        STANDARD.decode(wrapped.as_str()).unwrap()
    }

    #[test]
    fn roundtrip() {
        let v = vault();
        let pw = VaultPassword::new("correct-password");
        let wrapped = v.wrap(&key_pair().private_key_pem, &pw).unwrap();
        let pem = v.unwrap(&wrapped, &pw).unwrap();
        assert_eq!(pem.as_str(), key_pair().private_key_pem.as_str());
    }

    #[test]
    fn wrong_password() {
        let v = vault();
        let wrapped = v
            .wrap(&key_pair().private_key_pem, &VaultPassword::new("pw1"))
            .unwrap();
        assert_eq!(
            v.unwrap(&wrapped, &VaultPassword::new("pw2")),
            Err(WrongPasswordError)
        );
    }

    #[test]
    fn header_layout() {
        let v = vault();
        let wrapped = v
            .wrap(&key_pair().private_key_pem, &VaultPassword::new("pw"))
            .unwrap();
        let data = raw(&wrapped);
        assert_eq!(data[0], VAULT_VERSION);
        assert_eq!(data[1], KDF_PBKDF2_HMAC_SHA256);
        assert_eq!(
            u32::from_be_bytes([data[2], data[3], data[4], data[5]]),
            MIN_KDF_ITERATIONS
        );
        assert!(data.len() >= MIN_WRAPPED_BYTES);
    }

    #[test]
    fn salt_and_nonce_are_fresh() {
        let v = vault();
        let pw = VaultPassword::new("pw");
        let a = v.wrap(&key_pair().private_key_pem, &pw).unwrap();
        let b = v.wrap(&key_pair().private_key_pem, &pw).unwrap();
        assert_ne!(a, b);
        assert_ne!(raw(&a)[6..HEADER_BYTES], raw(&b)[6..HEADER_BYTES]);
    }

    #[test]
    fn tampering_reads_as_wrong_password() {
        let v = vault();
        let pw = VaultPassword::new("pw");
        let wrapped = v.wrap(&key_pair().private_key_pem, &pw).unwrap();
        let data = raw(&wrapped);

        // iterations field is authenticated
        let mut iters = data.clone();
        iters[5] ^= 0x01;
        // body
        let mut body = data.clone();
        let last = body.len() - 1;
        body[last] ^= 0x01;
        // version
        let mut version = data.clone();
        version[0] = 0x02;

        for bad in [iters, body, version, data[..20].to_vec()] {
            let w = WrappedPrivateKey::new(STANDARD.encode(bad));
            assert_eq!(v.unwrap(&w, &pw), Err(WrongPasswordError));
        }
        assert_eq!(
            v.unwrap(&WrappedPrivateKey::new("not base64 at all!"), &pw),
            Err(WrongPasswordError)
        );
        assert_eq!(v.unwrap(&WrappedPrivateKey::new(""), &pw), Err(WrongPasswordError));
    }

    #[test]
    fn inspect_reads_header_only() {
        let v = vault();
        let wrapped = v
            .wrap(&key_pair().private_key_pem, &VaultPassword::new("pw"))
            .unwrap();
        let info = inspect(&wrapped).unwrap();
        assert_eq!(info.version, VAULT_VERSION);
        assert_eq!(info.iterations, MIN_KDF_ITERATIONS);
        assert_eq!(info.total_bytes, raw(&wrapped).len());
        assert_eq!(info.ciphertext_bytes, info.total_bytes - HEADER_BYTES - NONCE_BYTES);
        assert!(inspect(&WrappedPrivateKey::new("AAAA")).is_err());
    }

    #[test]
    fn out_of_range_iterations_rejected() {
        let v = vault();
        let pw = VaultPassword::new("pw");
        let wrapped = v.wrap(&key_pair().private_key_pem, &pw).unwrap();
        let mut data = raw(&wrapped);
        data[2..6].copy_from_slice(&u32::MAX.to_be_bytes());
        let w = WrappedPrivateKey::new(STANDARD.encode(data));
        assert_eq!(v.unwrap(&w, &pw), Err(WrongPasswordError));
    }

    #[test]
    fn non_key_pem_refused_on_wrap() {
        let v = vault();
        assert_eq!(
            v.wrap("just some text", &VaultPassword::new("pw")),
            Err(EncryptionError::InvalidKey)
        );
    }

    #[test]
    fn rewrap_changes_password() {
        let v = vault();
        let old = VaultPassword::new("old");
        let new = VaultPassword::new("new");
        let wrapped = v.wrap(&key_pair().private_key_pem, &old).unwrap();
        let rewrapped = v.rewrap(&wrapped, &old, &new).unwrap();
        assert!(v.unwrap(&rewrapped, &old).is_err());
        assert_eq!(
            v.unwrap(&rewrapped, &new).unwrap().as_str(),
            key_pair().private_key_pem.as_str()
        );
        assert_eq!(v.rewrap(&wrapped, &new, &old), Err(WrongPasswordError));
    }

    #[tokio::test]
    async fn register_rejects_blank_password() {
        let cfg = CourierConfig::default();
        assert_eq!(
            register(&VaultPassword::new("  "), &cfg).await,
            Err(RegistrationError::EmptyPassword)
        );
    }

    #[tokio::test]
    async fn register_produces_unlockable_vault() {
        let cfg = CourierConfig {
            vault: VaultConfig::insecure_fast(),
            ..CourierConfig::default()
        };
        let pw = VaultPassword::new("correct-password");
        let reg = register(&pw, &cfg).await.unwrap();
        let v = PrivateKeyVault::new(cfg.vault.clone());
        let (_, sk) = v.unwrap_key(&reg.wrapped_private_key, &pw).unwrap();
        assert_eq!(
            sk.public_key(),
            asymmetric::PublicKey::from_pem(&reg.public_key_pem).unwrap()
        );
    }
}
