//! Error types for transaction assembly
//!
//! Estimation problems never appear here unless the ledger was unreachable;
//! everything else about an estimate degrades to configured defaults.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::pda::PdaError;
use crate::rpc_manager::RpcManagerError;

/// Error type for all transaction builder operations
#[derive(Error, Debug)]
pub enum TransactionBuilderError {
    /// The validity anchor expired before the envelope was submitted.
    ///
    /// The caller must assemble a new envelope; resubmitting this one
    /// cannot succeed.
    #[error("Validity anchor expired (last valid block height {last_valid_block_height})")]
    StaleAnchor { last_valid_block_height: u64 },

    /// A referenced address lookup table does not exist or is not a table
    #[error("Address lookup table {table} could not be resolved: {reason}")]
    TableResolutionFailed { table: Pubkey, reason: String },

    /// Failed to build an instruction for a specific program
    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild { program: String, reason: String },

    /// Message compilation failed
    #[error("Compile error: {0}")]
    Compile(String),

    /// Failed to sign the transaction
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The key is not among the message's required signers
    #[error("{0} is not a required signer of this transaction")]
    SignerNotRequired(Pubkey),

    /// Configuration or validation error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Address derivation error
    #[error(transparent)]
    Pda(#[from] PdaError),

    /// Ledger communication error
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),

    /// Internal invariant violation or unexpected state
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransactionBuilderError {
    /// Check if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rpc(err) => err.is_retryable(),

            // Re-assembly with a fresh anchor is the remedy, not a retry
            Self::StaleAnchor { .. } => false,
            Self::TableResolutionFailed { .. } => false,
            Self::InstructionBuild { .. } => false,
            Self::Compile(_) => false,
            Self::Signing(_) => false,
            Self::SignerNotRequired(_) => false,
            Self::Configuration(_) => false,
            Self::Pda(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::StaleAnchor { .. } => "stale_anchor",
            Self::TableResolutionFailed { .. } => "table_resolution",
            Self::InstructionBuild { .. } => "instruction",
            Self::Compile(_) => "compile",
            Self::Signing(_) => "signing",
            Self::SignerNotRequired(_) => "signing",
            Self::Configuration(_) => "config",
            Self::Pda(err) => err.category(),
            Self::Rpc(_) => "rpc",
            Self::Internal(_) => "internal",
        }
    }
}

// Convenience constructors for common error scenarios
impl TransactionBuilderError {
    /// Create an instruction build error for a specific program
    pub fn instruction_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn table_missing(table: Pubkey) -> Self {
        Self::TableResolutionFailed {
            table,
            reason: "account not found".to_string(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransactionBuilderError::StaleAnchor {
            last_valid_block_height: 42,
        };
        assert_eq!(
            err.to_string(),
            "Validity anchor expired (last valid block height 42)"
        );

        let err = TransactionBuilderError::instruction_failed("splurge", "name too long");
        assert_eq!(
            err.to_string(),
            "Instruction build error (program=splurge): name too long"
        );
    }

    #[test]
    fn test_error_retryability() {
        let transport = RpcManagerError::Transport {
            endpoint: "test".to_string(),
            message: "reset".to_string(),
        };
        assert!(TransactionBuilderError::Rpc(transport).is_retryable());

        assert!(!TransactionBuilderError::StaleAnchor {
            last_valid_block_height: 1
        }
        .is_retryable());
        assert!(!TransactionBuilderError::table_missing(Pubkey::new_unique()).is_retryable());
        assert!(!TransactionBuilderError::Signing("test".to_string()).is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            TransactionBuilderError::table_missing(Pubkey::new_unique()).category(),
            "table_resolution"
        );
        assert_eq!(
            TransactionBuilderError::from(PdaError::NoViableBump).category(),
            "derivation"
        );
        assert_eq!(
            TransactionBuilderError::internal("test").category(),
            "internal"
        );
    }
}
