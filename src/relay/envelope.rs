//! Relay state machine
//!
//! Each stage is its own type and only the previous stage can produce it, so
//! an envelope cannot be co-signed without passing validation first:
//!
//! `Received -> Decoded -> Validated -> CoSigned -> Submitted`
//!
//! A rejection consumes the envelope; nothing about a refused envelope
//! survives past the transition that refused it.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};

use crate::relay::errors::{RejectReason, RelayError};
use crate::relay::validator::{decode_envelope, validate, InstructionWhitelist, Validation};
use crate::tx_builder::apply_signature;
use crate::wallet::AuthorityKeypair;

/// Stage labels for logs and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStage {
    Received,
    Decoded,
    Validated,
    CoSigned,
    Submitted,
    Rejected,
}

impl RelayStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Decoded => "decoded",
            Self::Validated => "validated",
            Self::CoSigned => "co_signed",
            Self::Submitted => "submitted",
            Self::Rejected => "rejected",
        }
    }
}

/// Raw bytes as they arrived
#[derive(Debug)]
pub struct Received {
    bytes: Vec<u8>,
}

impl Received {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Base64 that does not decode is a malformed envelope
    pub fn from_base64(encoded: &str) -> Result<Self, RejectReason> {
        BASE64
            .decode(encoded.trim())
            .map(Self::from_bytes)
            .map_err(|e| RejectReason::MalformedEnvelope(format!("invalid base64: {e}")))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn decode(self) -> Result<Decoded, RejectReason> {
        decode_envelope(&self.bytes).map(|tx| Decoded { tx })
    }
}

/// Structurally sound, not yet trusted
#[derive(Debug)]
pub struct Decoded {
    tx: VersionedTransaction,
}

impl Decoded {
    pub fn transaction(&self) -> &VersionedTransaction {
        &self.tx
    }

    /// Fee payer, the first static key
    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.tx.message.static_account_keys().first()
    }

    pub fn validate(
        self,
        whitelist: &InstructionWhitelist,
        privileged: &Pubkey,
    ) -> Result<Validated, RejectReason> {
        let validation = validate(&self.tx, whitelist, privileged)?;
        Ok(Validated {
            tx: self.tx,
            validation,
        })
    }
}

/// Only allowed instructions target the program
#[derive(Debug)]
pub struct Validated {
    tx: VersionedTransaction,
    validation: Validation,
}

impl Validated {
    pub fn matched(&self) -> &[String] {
        &self.validation.matched
    }

    /// Add the privileged signature in its slot. The message bytes and every
    /// other signature are left as they were.
    pub fn co_sign(mut self, authority: &AuthorityKeypair) -> Result<CoSigned, RelayError> {
        let position = apply_signature(&mut self.tx, authority.signer())
            .map_err(|e| RelayError::Internal(e.to_string()))?;
        if position != self.validation.signer_position {
            return Err(RelayError::Internal(format!(
                "signed slot {position}, validation expected {}",
                self.validation.signer_position
            )));
        }
        Ok(CoSigned {
            tx: self.tx,
            matched: self.validation.matched,
        })
    }
}

/// Carries the privileged signature; ready to submit
#[derive(Debug)]
pub struct CoSigned {
    tx: VersionedTransaction,
    matched: Vec<String>,
}

impl CoSigned {
    pub fn transaction(&self) -> &VersionedTransaction {
        &self.tx
    }

    pub fn matched(&self) -> &[String] {
        &self.matched
    }

    /// Transaction id: the fee payer's signature
    pub fn signature(&self) -> Signature {
        self.tx.signatures.first().copied().unwrap_or_default()
    }

    pub fn into_submitted(self, signature: Signature, confirmed: bool) -> Submitted {
        Submitted {
            signature,
            confirmed,
            matched: self.matched,
        }
    }
}

/// Accepted by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub signature: Signature,
    /// Whether confirmation was observed before returning
    pub confirmed: bool,
    pub matched: Vec<String>,
}
