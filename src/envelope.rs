//! Hybrid message envelope and its JSON wire shape.
//!
//! Wire shape:
//! ```text
//! {
//!   "message": "<base64 AES-256-CBC ciphertext>",
//!   "encrypted_key_sender": "<base64 RSA-OAEP wrapped AES key>",
//!   "encrypted_key_receiver": "<base64 RSA-OAEP wrapped AES key>",
//!   "iv": "<hex, 16 bytes>",
//!   "created_by": "<sender identity>"
//! }
//! ```
//!
//! One AES key per envelope, wrapped twice: once for the recipient and once
//! for the sender so they can read their own history. An empty `iv` marks an
//! unencrypted message; such envelopes are displayed verbatim and never
//! opened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::asymmetric::{PrivateKey, PublicKey};
use crate::error::{DecryptionError, EncryptionError, EnvelopeError};
use crate::symmetric::{self, AesKey, Iv};
use crate::types::Identity;

/// One message as exchanged over the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Server-assigned id, present on messages loaded from history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "message", default)]
    pub ciphertext: String,
    #[serde(rename = "encrypted_key_sender", default)]
    pub encrypted_key_for_sender: String,
    #[serde(rename = "encrypted_key_receiver", default)]
    pub encrypted_key_for_recipient: String,
    #[serde(default)]
    pub iv: String,
    #[serde(rename = "created_by")]
    pub sender: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl MessageEnvelope {
    /// False for the degraded, unencrypted variant.
    pub fn is_encrypted(&self) -> bool {
        !self.iv.trim().is_empty()
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(|_| EnvelopeError::Malformed("json"))
    }

    pub fn from_json(json: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(json).map_err(|_| EnvelopeError::Malformed("json"))
    }
}

/// Seals and opens envelopes.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self
    }

    /// Encrypt `plaintext` with a fresh AES key and IV, and wrap that key
    /// for both the sender and the recipient.
    pub fn seal(
        &self,
        plaintext: &str,
        sender: &Identity,
        sender_public_key_pem: &str,
        recipient_public_key_pem: &str,
    ) -> Result<MessageEnvelope, EncryptionError> {
        let sender_pk = PublicKey::from_pem(sender_public_key_pem)?;
        let recipient_pk = PublicKey::from_pem(recipient_public_key_pem)?;
        self.seal_with_keys(plaintext, sender, &sender_pk, &recipient_pk)
    }

    pub fn seal_with_keys(
        &self,
        plaintext: &str,
        sender: &Identity,
        sender_pk: &PublicKey,
        recipient_pk: &PublicKey,
    ) -> Result<MessageEnvelope, EncryptionError> {
        let (key, iv) = symmetric::generate_key_and_iv();
        let ciphertext = symmetric::encrypt(plaintext, &key, &iv);
        let encrypted_key_for_sender = sender_pk.encrypt(key.as_bytes())?;
        let encrypted_key_for_recipient = recipient_pk.encrypt(key.as_bytes())?;

        tracing::debug!(sender = %sender, "sealed envelope");
        Ok(MessageEnvelope {
            id: None,
            ciphertext,
            encrypted_key_for_sender,
            encrypted_key_for_recipient,
            iv: iv.to_hex(),
            sender: sender.clone(),
            created_at: Some(Utc::now()),
        })
    }

    /// The explicitly flagged unencrypted variant: all key fields empty.
    pub fn unencrypted(&self, plaintext: &str, sender: &Identity) -> MessageEnvelope {
        MessageEnvelope {
            id: None,
            ciphertext: plaintext.to_owned(),
            encrypted_key_for_sender: String::new(),
            encrypted_key_for_recipient: String::new(),
            iv: String::new(),
            sender: sender.clone(),
            created_at: Some(Utc::now()),
        }
    }

    /// Decrypt with the caller's own private key. The wrapped key copy is
    /// chosen by whether `own_identity` sent the message.
    pub fn open(
        &self,
        envelope: &MessageEnvelope,
        own_private_key_pem: &str,
        own_identity: &Identity,
    ) -> Result<String, EnvelopeError> {
        // Check structure before touching the key so a protocol mismatch is
        // never reported as a decryption failure.
        let (wrapped_key, iv) = Self::parts_for(envelope, own_identity)?;
        let sk = PrivateKey::from_pem(own_private_key_pem)?;
        Self::decrypt_parts(envelope, wrapped_key, &iv, &sk)
    }

    pub fn open_with_key(
        &self,
        envelope: &MessageEnvelope,
        own_private_key: &PrivateKey,
        own_identity: &Identity,
    ) -> Result<String, EnvelopeError> {
        let (wrapped_key, iv) = Self::parts_for(envelope, own_identity)?;
        Self::decrypt_parts(envelope, wrapped_key, &iv, own_private_key)
    }

    fn parts_for<'a>(
        envelope: &'a MessageEnvelope,
        own_identity: &Identity,
    ) -> Result<(&'a str, Iv), EnvelopeError> {
        if envelope.iv.trim().is_empty() {
            return Err(EnvelopeError::Malformed("iv"));
        }
        let iv = Iv::from_hex(&envelope.iv).map_err(|_| EnvelopeError::Malformed("iv"))?;

        let (field, wrapped_key) = if &envelope.sender == own_identity {
            ("encrypted_key_sender", envelope.encrypted_key_for_sender.as_str())
        } else {
            ("encrypted_key_receiver", envelope.encrypted_key_for_recipient.as_str())
        };
        if wrapped_key.trim().is_empty() {
            return Err(EnvelopeError::Malformed(field));
        }
        if envelope.ciphertext.trim().is_empty() {
            return Err(EnvelopeError::Malformed("message"));
        }
        Ok((wrapped_key, iv))
    }

    fn decrypt_parts(
        envelope: &MessageEnvelope,
        wrapped_key: &str,
        iv: &Iv,
        sk: &PrivateKey,
    ) -> Result<String, EnvelopeError> {
        let raw_key = sk.decrypt(wrapped_key)?;
        let key = AesKey::try_from(raw_key.as_slice()).map_err(|_| DecryptionError)?;
        Ok(symmetric::decrypt(&envelope.ciphertext, &key, iv)?)
    }
}
