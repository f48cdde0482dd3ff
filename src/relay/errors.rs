//! Relay outcomes that are not a landed signature
//!
//! Rejection reasons are specific so audit logs say exactly why an envelope
//! was refused. HTTP responses collapse them into one coarse message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use thiserror::Error;

use crate::discriminator::Discriminator;
use crate::rpc_manager::RpcManagerError;

/// Message returned for every rejected envelope
pub const COARSE_REJECTION: &str = "Transaction does not contain the correct instruction.";

/// Why an envelope was refused a co-signature
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("no instruction targets the marketplace program")]
    NoMatchingInstruction,

    /// `tag` is `None` when the instruction data was shorter than a tag
    #[error("instruction {index} is not allowed (tag {})", display_tag(.tag))]
    DisallowedInstruction {
        index: usize,
        tag: Option<Discriminator>,
    },

    #[error("envelope does not require the signature of {0}")]
    PrivilegedSignerNotRequired(Pubkey),
}

fn display_tag(tag: &Option<Discriminator>) -> String {
    match tag {
        Some(tag) => hex::encode(tag),
        None => "missing".to_string(),
    }
}

impl RejectReason {
    pub fn category(&self) -> &'static str {
        match self {
            Self::MalformedEnvelope(_) => "malformed_envelope",
            Self::NoMatchingInstruction => "no_matching_instruction",
            Self::DisallowedInstruction { .. } => "disallowed_instruction",
            Self::PrivilegedSignerNotRequired(_) => "privileged_signer_not_required",
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("rejected: {0}")]
    Rejected(#[from] RejectReason),

    /// The ledger refused the transaction. Displays the ledger's message
    /// unchanged.
    #[error("{0}")]
    Ledger(RpcManagerError),

    /// Landed and failed during execution
    #[error("transaction {signature} failed: {reason}")]
    ExecutionFailed { signature: Signature, reason: String },

    /// Sent, but whether it landed is not known. The transaction may still
    /// confirm.
    #[error("submission outcome unknown: {reason}")]
    SubmissionUnknown {
        signature: Option<Signature>,
        reason: String,
    },

    #[error("ledger unreachable: {0}")]
    Transport(RpcManagerError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::Rejected(reason) => reason.category(),
            Self::Ledger(_) => "ledger_rejection",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::SubmissionUnknown { .. } => "submission_unknown",
            Self::Transport(_) => "transport",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Rejected(_) => StatusCode::BAD_REQUEST,
            Self::Ledger(_) | Self::ExecutionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::SubmissionUnknown { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify a failed submission. Exhausted transport errors and timeouts
    /// leave the outcome open; anything the ledger answered is a rejection.
    pub fn from_submission(err: RpcManagerError, signature: Signature) -> Self {
        if err.is_transport() {
            Self::SubmissionUnknown {
                signature: Some(signature),
                reason: err.to_string(),
            }
        } else if matches!(err, RpcManagerError::RpcResponse { .. }) {
            Self::Ledger(err)
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Rejected(_) => json!({ "error": COARSE_REJECTION }),
            Self::Ledger(err) => json!({ "error": err.to_string() }),
            Self::ExecutionFailed { signature, reason } => json!({
                "error": reason,
                "signature": signature.to_string(),
            }),
            Self::SubmissionUnknown { signature, .. } => json!({
                "error": "Transaction submitted but not confirmed; it may still land.",
                "signature": signature.map(|s| s.to_string()),
            }),
            Self::Transport(_) => json!({ "error": "Ledger unavailable." }),
            Self::Internal(_) => json!({ "error": "Failed to send permissioned transaction." }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            RelayError::from(RejectReason::NoMatchingInstruction).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::SubmissionUnknown {
                signature: None,
                reason: "timeout".into()
            }
            .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            RelayError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_submission_classification() {
        let sig = Signature::from([9u8; 64]);
        let timeout = RpcManagerError::Timeout {
            endpoint: "mock".into(),
            operation: "send_transaction",
            timeout_ms: 10,
        };
        assert!(matches!(
            RelayError::from_submission(timeout, sig),
            RelayError::SubmissionUnknown { signature: Some(s), .. } if s == sig
        ));

        let rejected = RpcManagerError::RpcResponse {
            endpoint: "mock".into(),
            message: "Blockhash not found".into(),
            code: Some(-32002),
            logs: vec![],
        };
        let err = RelayError::from_submission(rejected, sig);
        assert_eq!(err.to_string(), "Blockhash not found");
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_disallowed_reason_renders_tag() {
        let reason = RejectReason::DisallowedInstruction {
            index: 2,
            tag: Some([0xab; 8]),
        };
        assert!(reason.to_string().contains("abababababababab"));
        let missing = RejectReason::DisallowedInstruction { index: 0, tag: None };
        assert!(missing.to_string().contains("missing"));
    }
}
