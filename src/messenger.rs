//! Send and display path on top of the unlock controller.
//!
//! Each inbound envelope renders independently: one message that cannot be
//! opened becomes a placeholder and never blocks the rest of a history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::{AuditAction, AuditEvent, AuditSink};
use crate::config::CourierConfig;
use crate::directory::KeyDirectory;
use crate::envelope::{EnvelopeCodec, MessageEnvelope};
use crate::error::{EnvelopeError, SealError};
use crate::session::UnlockController;
use crate::types::Identity;

pub const UNDECRYPTABLE_PLACEHOLDER: &str = "[message could not be decrypted]";
pub const MALFORMED_PLACEHOLDER: &str = "[unsupported message format]";
pub const LOCKED_PLACEHOLDER: &str = "[encrypted message]";

/// What the UI shows for one message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum MessageBody {
    Decrypted(String),
    /// Sent in the flagged unencrypted mode; shown verbatim.
    Unencrypted(String),
    Undecryptable,
    /// Protocol or version mismatch, not a key problem.
    Malformed,
    /// Encrypted, and the vault is not unlocked yet.
    AwaitingUnlock,
}

impl MessageBody {
    pub fn display_text(&self) -> &str {
        match self {
            Self::Decrypted(text) | Self::Unencrypted(text) => text,
            Self::Undecryptable => UNDECRYPTABLE_PLACEHOLDER,
            Self::Malformed => MALFORMED_PLACEHOLDER,
            Self::AwaitingUnlock => LOCKED_PLACEHOLDER,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        !matches!(self, Self::Decrypted(_) | Self::Unencrypted(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub id: Option<String>,
    pub sender: Identity,
    pub created_at: Option<DateTime<Utc>>,
    /// Sent by the active identity.
    pub is_own: bool,
    pub body: MessageBody,
}

pub struct Messenger {
    controller: Arc<UnlockController>,
    directory: Arc<dyn KeyDirectory>,
    audit: Arc<dyn AuditSink>,
    codec: EnvelopeCodec,
    allow_unencrypted_fallback: bool,
}

impl Messenger {
    pub fn new(
        controller: Arc<UnlockController>,
        directory: Arc<dyn KeyDirectory>,
        audit: Arc<dyn AuditSink>,
        config: &CourierConfig,
    ) -> Self {
        Self {
            controller,
            directory,
            audit,
            codec: EnvelopeCodec::new(),
            allow_unencrypted_fallback: config.allow_unencrypted_fallback,
        }
    }

    pub fn controller(&self) -> &Arc<UnlockController> {
        &self.controller
    }

    // -----------------------------------------------------------------------
    // Send
    // -----------------------------------------------------------------------

    /// Seal `plaintext` for `recipient` with the unlocked key.
    pub fn compose(
        &self,
        recipient: &Identity,
        plaintext: &str,
    ) -> Result<MessageEnvelope, SealError> {
        let key = self.controller.unlocked_key().ok_or(SealError::VaultLocked)?;
        let recipient_pem = self
            .directory
            .public_key(recipient)?
            .ok_or_else(|| SealError::PeerKeyUnavailable(recipient.clone()))?;

        let envelope =
            self.codec
                .seal(plaintext, key.identity(), key.public_key_pem(), &recipient_pem)?;
        self.audit.record(
            AuditEvent::new(Some(key.identity()), AuditAction::EnvelopeSealed)
                .with_detail(format!("to {}", recipient)),
        );
        Ok(envelope)
    }

    /// Build the flagged unencrypted variant. Refused unless enabled in
    /// configuration.
    pub fn compose_unencrypted(
        &self,
        sender: &Identity,
        plaintext: &str,
    ) -> Result<MessageEnvelope, SealError> {
        if !self.allow_unencrypted_fallback {
            return Err(SealError::FallbackDisabled);
        }
        tracing::warn!(sender = %sender, "sending unencrypted message");
        self.audit
            .record(AuditEvent::new(Some(sender), AuditAction::UnencryptedSent));
        Ok(self.codec.unencrypted(plaintext, sender))
    }

    /// `compose`, falling back to the unencrypted variant when the vault is
    /// locked or the peer has no key, if fallback is enabled. Otherwise the
    /// original error is returned.
    pub fn compose_or_fallback(
        &self,
        recipient: &Identity,
        plaintext: &str,
    ) -> Result<MessageEnvelope, SealError> {
        match self.compose(recipient, plaintext) {
            Err(SealError::VaultLocked) | Err(SealError::PeerKeyUnavailable(_))
                if self.allow_unencrypted_fallback =>
            {
                let sender = self
                    .controller
                    .active_identity()
                    .ok_or(SealError::VaultLocked)?;
                self.compose_unencrypted(&sender, plaintext)
            }
            other => other,
        }
    }

    // -----------------------------------------------------------------------
    // Receive
    // -----------------------------------------------------------------------

    pub fn render(&self, envelope: &MessageEnvelope) -> RenderedMessage {
        let own = self.controller.active_identity();
        RenderedMessage {
            id: envelope.id.clone(),
            sender: envelope.sender.clone(),
            created_at: envelope.created_at,
            is_own: own.as_ref() == Some(&envelope.sender),
            body: self.render_body(envelope),
        }
    }

    /// Render a batch, oldest first. Messages without a timestamp keep
    /// their relative order and sort before timestamped ones.
    pub fn render_history(&self, envelopes: &[MessageEnvelope]) -> Vec<RenderedMessage> {
        let mut rendered: Vec<RenderedMessage> = envelopes.iter().map(|e| self.render(e)).collect();
        rendered.sort_by_key(|m| m.created_at);
        rendered
    }

    /// Chat-list preview text for a message.
    pub fn preview(&self, envelope: &MessageEnvelope) -> String {
        self.render_body(envelope).display_text().to_owned()
    }

    fn render_body(&self, envelope: &MessageEnvelope) -> MessageBody {
        if !envelope.is_encrypted() {
            return MessageBody::Unencrypted(envelope.ciphertext.clone());
        }
        let Some(key) = self.controller.unlocked_key() else {
            return MessageBody::AwaitingUnlock;
        };

        match self
            .codec
            .open_with_key(envelope, key.private_key(), key.identity())
        {
            Ok(text) => {
                self.audit.record(
                    AuditEvent::new(Some(key.identity()), AuditAction::EnvelopeOpened)
                        .with_detail(format!("from {}", envelope.sender)),
                );
                MessageBody::Decrypted(text)
            }
            Err(e) => {
                tracing::debug!(sender = %envelope.sender, error = %e, "envelope not opened");
                self.audit.record(
                    AuditEvent::new(
                        Some(key.identity()),
                        AuditAction::EnvelopeRejected {
                            reason: e.to_string(),
                        },
                    )
                    .with_failure(),
                );
                match e {
                    EnvelopeError::Malformed(_) => MessageBody::Malformed,
                    EnvelopeError::Decryption => MessageBody::Undecryptable,
                }
            }
        }
    }
}
