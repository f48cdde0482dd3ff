//! `LedgerClient` over the Solana JSON-RPC API

use async_trait::async_trait;
use solana_account_decoder::UiAccountEncoding;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::{
    config::{RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcSimulateTransactionConfig},
    filter::{Memcmp, RpcFilterType},
};
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey,
    signature::Signature, transaction::VersionedTransaction,
};
use solana_transaction_status::TransactionStatus;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::ledger::{AccountFilter, LedgerClient, SignatureOutcome, SimulationOutcome, ValidityAnchor};
use super::rpc_config::LedgerEndpointConfig;
use super::rpc_errors::{RpcManagerError, RpcResult};

/// Ledger collaborator backed by a nonblocking `RpcClient`.
///
/// Every call is bounded by `timeout`; exceeding it yields
/// [`RpcManagerError::Timeout`].
#[derive(Clone)]
pub struct SolanaLedgerClient {
    client: Arc<RpcClient>,
    endpoint: String,
    timeout: Duration,
    commitment: CommitmentConfig,
}

impl std::fmt::Debug for SolanaLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaLedgerClient")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("commitment", &self.commitment.commitment)
            .finish()
    }
}

impl SolanaLedgerClient {
    pub fn new(config: &LedgerEndpointConfig) -> RpcResult<Self> {
        config.validate()?;
        let commitment = config.commitment_config()?;
        let client = RpcClient::new_with_timeout_and_commitment(
            config.rpc_url.clone(),
            config.timeout(),
            commitment,
        );
        Ok(Self {
            client: Arc::new(client),
            endpoint: config.rpc_url.clone(),
            timeout: config.timeout(),
            commitment,
        })
    }

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> RpcResult<T>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        trace!(operation, endpoint = %self.endpoint, "Ledger call");
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                let err = RpcManagerError::from_client_error(err, &self.endpoint);
                debug!(operation, error = %err, "Ledger call failed");
                Err(err)
            }
            Err(_) => Err(RpcManagerError::Timeout {
                endpoint: self.endpoint.clone(),
                operation,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

fn to_rpc_filter(filter: AccountFilter) -> RpcFilterType {
    match filter {
        AccountFilter::DataSize(size) => RpcFilterType::DataSize(size),
        AccountFilter::Memcmp { offset, bytes } => {
            RpcFilterType::Memcmp(Memcmp::new_raw_bytes(offset, bytes))
        }
    }
}

#[async_trait]
impl LedgerClient for SolanaLedgerClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_account(&self, address: &Pubkey) -> RpcResult<Option<Account>> {
        let response = self
            .timed(
                "get_account",
                self.client
                    .get_account_with_commitment(address, self.commitment),
            )
            .await?;
        Ok(response.value)
    }

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: Vec<AccountFilter>,
    ) -> RpcResult<Vec<(Pubkey, Account)>> {
        let config = RpcProgramAccountsConfig {
            filters: Some(filters.into_iter().map(to_rpc_filter).collect()),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(self.commitment),
                ..Default::default()
            },
            ..Default::default()
        };
        self.timed(
            "get_program_accounts",
            self.client
                .get_program_accounts_with_config(program_id, config),
        )
        .await
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> RpcResult<SimulationOutcome> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(self.commitment),
            ..Default::default()
        };
        let response = self
            .timed(
                "simulate",
                self.client.simulate_transaction_with_config(tx, config),
            )
            .await?;
        let value = response.value;
        Ok(SimulationOutcome {
            units_consumed: value.units_consumed,
            err: value.err.map(|err| format!("{err:?}")),
            logs: value.logs.unwrap_or_default(),
        })
    }

    async fn recent_prioritization_fees(&self, accounts: &[Pubkey]) -> RpcResult<Vec<u64>> {
        let fees = self
            .timed(
                "recent_prioritization_fees",
                self.client.get_recent_prioritization_fees(accounts),
            )
            .await?;
        Ok(fees.into_iter().map(|fee| fee.prioritization_fee).collect())
    }

    async fn latest_blockhash(&self) -> RpcResult<ValidityAnchor> {
        let (blockhash, last_valid_block_height) = self
            .timed(
                "latest_blockhash",
                self.client
                    .get_latest_blockhash_with_commitment(self.commitment),
            )
            .await?;
        Ok(ValidityAnchor {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> RpcResult<bool> {
        self.timed(
            "is_blockhash_valid",
            self.client.is_blockhash_valid(blockhash, self.commitment),
        )
        .await
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> RpcResult<Signature> {
        self.timed("send_transaction", self.client.send_transaction(tx))
            .await
    }

    async fn signature_status(&self, signature: &Signature) -> RpcResult<SignatureOutcome> {
        let response = self
            .timed(
                "signature_status",
                self.client.get_signature_statuses(&[*signature]),
            )
            .await?;

        let status = response.value.into_iter().next().flatten();
        Ok(signature_outcome(status.as_ref(), self.commitment))
    }
}

/// Map a status entry to an outcome at `commitment`. No entry means the
/// ledger has not seen the signature yet.
fn signature_outcome(
    status: Option<&TransactionStatus>,
    commitment: CommitmentConfig,
) -> SignatureOutcome {
    match status {
        None => SignatureOutcome::Pending,
        Some(status) => match &status.err {
            Some(err) => SignatureOutcome::Failed(format!("{err:?}")),
            None if status.satisfies_commitment(commitment) => SignatureOutcome::Confirmed,
            None => SignatureOutcome::Pending,
        },
    }
}
