use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use std::str::FromStr;
use std::time::Duration;

use super::rpc_errors::RpcManagerError;

/// Connection settings for the ledger RPC endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEndpointConfig {
    /// The RPC endpoint URL
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Per-call deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Commitment used for reads, simulation and confirmation
    /// (`processed`, `confirmed` or `finalized`)
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

fn default_rpc_url() -> String {
    "https://api.devnet.solana.com".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

impl Default for LedgerEndpointConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            timeout_ms: default_timeout_ms(),
            commitment: default_commitment(),
        }
    }
}

impl LedgerEndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn commitment_config(&self) -> Result<CommitmentConfig, RpcManagerError> {
        let commitment = CommitmentLevel::from_str(&self.commitment).map_err(|_| {
            RpcManagerError::Configuration(format!(
                "Unknown commitment level: {}",
                self.commitment
            ))
        })?;
        Ok(CommitmentConfig { commitment })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), RpcManagerError> {
        if self.rpc_url.is_empty() {
            return Err(RpcManagerError::Configuration(
                "rpc_url must not be empty".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(RpcManagerError::Configuration(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.commitment_config().map(|_| ())
    }
}
