//! RPC Manager Module
//!
//! Ledger access for every other component: the `LedgerClient` seam, its
//! JSON-RPC implementation, error classification and bounded retry.

pub mod ledger;
pub mod retry;
pub mod rpc_client;
pub mod rpc_config;
pub mod rpc_errors;

// Re-exports for convenience
pub use ledger::{
    AccountFilter, LedgerClient, SignatureOutcome, SimulationOutcome, ValidityAnchor,
};
pub use retry::{retry_with_backoff, RetryConfig};
pub use rpc_client::SolanaLedgerClient;
pub use rpc_config::LedgerEndpointConfig;
pub use rpc_errors::{RpcManagerError, RpcResult};
