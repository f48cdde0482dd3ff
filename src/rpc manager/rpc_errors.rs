use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_rpc_client_api::request::{RpcError, RpcResponseErrorData};
use thiserror::Error;

/// Errors raised while talking to the ledger
#[derive(Debug, Clone, Error)]
pub enum RpcManagerError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// The call did not complete within its deadline
    #[error("Timeout after {timeout_ms}ms during {operation} (endpoint: {endpoint})")]
    Timeout {
        endpoint: String,
        operation: &'static str,
        timeout_ms: u64,
    },

    /// The ledger answered and refused the request. `message` is the
    /// ledger's own text, unmodified.
    #[error("{message}")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
        logs: Vec<String>,
    },

    #[error("Account not found: {account}")]
    AccountNotFound { account: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type RpcResult<T> = Result<T, RpcManagerError>;

impl RpcManagerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcManagerError::Transport { .. } => true,
            RpcManagerError::Timeout { .. } => true,

            // Server-side failures of the RPC node itself, not of the request
            RpcManagerError::RpcResponse { code, .. } => {
                matches!(code, Some(c) if (500..600).contains(c))
            }

            RpcManagerError::AccountNotFound { .. } => false,
            RpcManagerError::Configuration(_) => false,
            RpcManagerError::Internal(_) => false,
        }
    }

    /// True when the ledger could not be reached at all
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RpcManagerError::Transport { .. } | RpcManagerError::Timeout { .. }
        )
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            RpcManagerError::Transport { .. } => "transport",
            RpcManagerError::Timeout { .. } => "timeout",
            RpcManagerError::RpcResponse { .. } => "ledger_rejection",
            RpcManagerError::AccountNotFound { .. } => "account_not_found",
            RpcManagerError::Configuration(_) => "configuration",
            RpcManagerError::Internal(_) => "internal",
        }
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcManagerError::Transport { endpoint, .. } => Some(endpoint),
            RpcManagerError::Timeout { endpoint, .. } => Some(endpoint),
            RpcManagerError::RpcResponse { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }

    /// Ledger message plus any program logs, for pattern checks
    pub fn ledger_text(&self) -> Option<String> {
        match self {
            RpcManagerError::RpcResponse { message, logs, .. } => {
                let mut text = message.clone();
                for line in logs {
                    text.push('\n');
                    text.push_str(line);
                }
                Some(text)
            }
            _ => None,
        }
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        match err.kind() {
            ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => RpcManagerError::Transport {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            },
            ClientErrorKind::RpcError(RpcError::RpcResponseError {
                code,
                message,
                data,
            }) => {
                let logs = match data {
                    RpcResponseErrorData::SendTransactionPreflightFailure(sim) => {
                        sim.logs.clone().unwrap_or_default()
                    }
                    _ => Vec::new(),
                };
                RpcManagerError::RpcResponse {
                    endpoint: endpoint.to_string(),
                    message: message.clone(),
                    code: Some(*code),
                    logs,
                }
            }
            ClientErrorKind::RpcError(RpcError::RpcRequestError(message)) => {
                RpcManagerError::Transport {
                    endpoint: endpoint.to_string(),
                    message: message.clone(),
                }
            }
            _ => RpcManagerError::RpcResponse {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
                code: None,
                logs: Vec::new(),
            },
        }
    }
}
