//! AES-256-CBC with PKCS#7 padding for message bodies.
//!
//! Ciphertext travels as standard base64; the IV travels separately as hex.
//! Encryption is deterministic for a given (plaintext, key, iv); freshness
//! comes from the caller drawing a new key and IV per message.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand_core::{OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{DecryptionError, InvalidKeyLength};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const AES_KEY_BYTES: usize = 32;
pub const IV_BYTES: usize = 16;

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

/// 256-bit AES key. Zeroed on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AesKey([u8; AES_KEY_BYTES]);

impl AesKey {
    pub fn generate() -> Self {
        let mut key = [0u8; AES_KEY_BYTES];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; AES_KEY_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; AES_KEY_BYTES] {
        &self.0
    }
}

impl TryFrom<&[u8]> for AesKey {
    type Error = InvalidKeyLength;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; AES_KEY_BYTES] = bytes.try_into().map_err(|_| InvalidKeyLength {
            what: "aes key",
            expected: AES_KEY_BYTES,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl core::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("AesKey(<redacted>)")
    }
}

/// 128-bit CBC initialization vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Iv([u8; IV_BYTES]);

impl Iv {
    pub fn generate() -> Self {
        let mut iv = [0u8; IV_BYTES];
        OsRng.fill_bytes(&mut iv);
        Self(iv)
    }

    pub fn from_bytes(bytes: [u8; IV_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IV_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the 32-character hex form used on the wire.
    pub fn from_hex(s: &str) -> Result<Self, InvalidKeyLength> {
        let bytes = hex::decode(s.trim()).map_err(|_| InvalidKeyLength {
            what: "iv",
            expected: IV_BYTES,
            actual: s.trim().len() / 2,
        })?;
        Self::try_from(bytes.as_slice())
    }
}

impl TryFrom<&[u8]> for Iv {
    type Error = InvalidKeyLength;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; IV_BYTES] = bytes.try_into().map_err(|_| InvalidKeyLength {
            what: "iv",
            expected: IV_BYTES,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

/// Fresh random key and IV for one message.
pub fn generate_key_and_iv() -> (AesKey, Iv) {
    (AesKey::generate(), Iv::generate())
}

// ---------------------------------------------------------------------------
// Cipher
// ---------------------------------------------------------------------------

fn encryptor(key: &AesKey, iv: &Iv) -> Aes256CbcEnc {
    Aes256CbcEnc::new(
        GenericArray::from_slice(key.as_bytes()),
        GenericArray::from_slice(iv.as_bytes()),
    )
}

fn decryptor(key: &AesKey, iv: &Iv) -> Aes256CbcDec {
    Aes256CbcDec::new(
        GenericArray::from_slice(key.as_bytes()),
        GenericArray::from_slice(iv.as_bytes()),
    )
}

/// Encrypt UTF-8 text; returns base64 ciphertext.
pub fn encrypt(plaintext: &str, key: &AesKey, iv: &Iv) -> String {
    let ct = encryptor(key, iv).encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    STANDARD.encode(ct)
}

/// Inverse of [`encrypt`]. Bad base64, bad padding and invalid UTF-8 after
/// unpadding are all the same `DecryptionError`.
pub fn decrypt(ciphertext_b64: &str, key: &AesKey, iv: &Iv) -> Result<String, DecryptionError> {
    let ct = STANDARD
        .decode(ciphertext_b64.trim())
        .map_err(|_| DecryptionError)?;
    let pt = Zeroizing::new(
        decryptor(key, iv)
            .decrypt_padded_vec_mut::<Pkcs7>(&ct)
            .map_err(|_| DecryptionError)?,
    );
    core::str::from_utf8(&pt)
        .map(str::to_owned)
        .map_err(|_| DecryptionError)
}
