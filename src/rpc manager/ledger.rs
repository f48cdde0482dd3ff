//! The ledger as seen by this crate: a handful of read endpoints plus one
//! submission endpoint. Every component takes an implementation of
//! [`LedgerClient`] explicitly so tests can substitute a double.

use async_trait::async_trait;
use solana_sdk::{
    account::Account, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};

use super::rpc_errors::RpcResult;

/// Recent-validity anchor bounding how long an envelope may be submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityAnchor {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Server-side account filter for [`LedgerClient::get_program_accounts`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    /// Exact account data length
    DataSize(u64),
    /// Raw bytes expected at `offset` within the account data
    Memcmp { offset: usize, bytes: Vec<u8> },
}

impl AccountFilter {
    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            AccountFilter::DataSize(size) => data.len() as u64 == *size,
            AccountFilter::Memcmp { offset, bytes } => data
                .get(*offset..offset.saturating_add(bytes.len()))
                .map(|window| window == bytes.as_slice())
                .unwrap_or(false),
        }
    }
}

/// Dry-run result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub units_consumed: Option<u64>,
    /// Execution error reported by the ledger, if any
    pub err: Option<String>,
    pub logs: Vec<String>,
}

/// Where a submitted signature stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureOutcome {
    /// Unknown to the ledger or below the configured commitment
    Pending,
    Confirmed,
    /// Landed but failed during execution
    Failed(String),
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Endpoint label for logs and errors
    fn endpoint(&self) -> &str;

    async fn get_account(&self, address: &Pubkey) -> RpcResult<Option<Account>>;

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: Vec<AccountFilter>,
    ) -> RpcResult<Vec<(Pubkey, Account)>>;

    /// Simulate without signature verification, replacing the blockhash
    async fn simulate(&self, tx: &VersionedTransaction) -> RpcResult<SimulationOutcome>;

    /// Per-slot priority fees (micro-lamports per compute unit) recently paid
    /// by transactions that wrote to `accounts`, or across the ledger when
    /// `accounts` is empty
    async fn recent_prioritization_fees(&self, accounts: &[Pubkey]) -> RpcResult<Vec<u64>>;

    async fn latest_blockhash(&self) -> RpcResult<ValidityAnchor>;

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> RpcResult<bool>;

    async fn send_transaction(&self, tx: &VersionedTransaction) -> RpcResult<Signature>;

    async fn signature_status(&self, signature: &Signature) -> RpcResult<SignatureOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memcmp_filter_matches_window() {
        let data = [0u8, 1, 2, 3, 4, 5];
        let filter = AccountFilter::Memcmp {
            offset: 2,
            bytes: vec![2, 3],
        };
        assert!(filter.matches(&data));

        let past_end = AccountFilter::Memcmp {
            offset: 5,
            bytes: vec![5, 6],
        };
        assert!(!past_end.matches(&data));
    }

    #[test]
    fn data_size_filter() {
        assert!(AccountFilter::DataSize(3).matches(&[1, 2, 3]));
        assert!(!AccountFilter::DataSize(4).matches(&[1, 2, 3]));
    }
}
