//! Test doubles
//!
//! [`MockLedger`] is an in-memory [`LedgerClient`] with scripted answers for
//! simulation, fee sampling and submission. It makes no network calls and is
//! deterministic apart from the unique blockhash it starts with. Public so
//! integration tests and benches can use it.

use async_trait::async_trait;
use solana_sdk::{
    account::Account, address_lookup_table, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::accounts::{Order, OrderStatus};
use crate::discriminator::account_tag;
use crate::rpc_manager::{
    AccountFilter, LedgerClient, RpcManagerError, RpcResult, SignatureOutcome, SimulationOutcome,
    ValidityAnchor,
};

const MOCK_ENDPOINT: &str = "mock://ledger";

#[derive(Debug)]
struct LedgerState {
    accounts: BTreeMap<Pubkey, Account>,
    simulation: RpcResult<SimulationOutcome>,
    fees: RpcResult<Vec<u64>>,
    anchor: ValidityAnchor,
    expired: HashSet<Hash>,
    send_failures: VecDeque<RpcManagerError>,
    signature_status: RpcResult<SignatureOutcome>,
    simulated: Vec<VersionedTransaction>,
    fee_requests: Vec<Vec<Pubkey>>,
    sent: Vec<VersionedTransaction>,
    send_attempts: usize,
}

/// In-memory ledger with scripted responses
#[derive(Debug)]
pub struct MockLedger {
    state: Mutex<LedgerState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// Simulation succeeds with 200k units, the fee window is empty, every
    /// submission is accepted and confirms immediately.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                accounts: BTreeMap::new(),
                simulation: Ok(SimulationOutcome {
                    units_consumed: Some(200_000),
                    err: None,
                    logs: Vec::new(),
                }),
                fees: Ok(Vec::new()),
                anchor: ValidityAnchor {
                    blockhash: Hash::new_unique(),
                    last_valid_block_height: 1_000,
                },
                expired: HashSet::new(),
                send_failures: VecDeque::new(),
                signature_status: Ok(SignatureOutcome::Confirmed),
                simulated: Vec::new(),
                fee_requests: Vec::new(),
                sent: Vec::new(),
                send_attempts: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn put_account(&self, address: Pubkey, account: Account) {
        self.state().accounts.insert(address, account);
    }

    pub fn set_simulation(&self, outcome: SimulationOutcome) {
        self.state().simulation = Ok(outcome);
    }

    pub fn fail_simulation(&self, err: RpcManagerError) {
        self.state().simulation = Err(err);
    }

    pub fn set_prioritization_fees(&self, fees: Vec<u64>) {
        self.state().fees = Ok(fees);
    }

    pub fn fail_prioritization_fees(&self, err: RpcManagerError) {
        self.state().fees = Err(err);
    }

    /// Anchor returned by `latest_blockhash`
    pub fn anchor(&self) -> ValidityAnchor {
        self.state().anchor
    }

    /// Replace the current anchor with a fresh one
    pub fn advance_blockhash(&self) -> ValidityAnchor {
        let mut state = self.state();
        state.anchor = ValidityAnchor {
            blockhash: Hash::new_unique(),
            last_valid_block_height: state.anchor.last_valid_block_height + 150,
        };
        state.anchor
    }

    /// Make `blockhash` report as no longer valid
    pub fn expire_blockhash(&self, blockhash: Hash) {
        self.state().expired.insert(blockhash);
    }

    /// Queue errors returned by the next submissions, in order. Once the
    /// queue drains, submissions succeed again.
    pub fn fail_sends(&self, errors: impl IntoIterator<Item = RpcManagerError>) {
        self.state().send_failures.extend(errors);
    }

    pub fn set_signature_status(&self, outcome: SignatureOutcome) {
        self.state().signature_status = Ok(outcome);
    }

    pub fn fail_signature_status(&self, err: RpcManagerError) {
        self.state().signature_status = Err(err);
    }

    pub fn simulated_transactions(&self) -> Vec<VersionedTransaction> {
        self.state().simulated.clone()
    }

    /// Account scopes passed to each fee sample, in call order
    pub fn fee_sample_requests(&self) -> Vec<Vec<Pubkey>> {
        self.state().fee_requests.clone()
    }

    /// Transactions the ledger accepted
    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        self.state().sent.clone()
    }

    /// Submission calls, including failed ones
    pub fn send_attempts(&self) -> usize {
        self.state().send_attempts
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn endpoint(&self) -> &str {
        MOCK_ENDPOINT
    }

    async fn get_account(&self, address: &Pubkey) -> RpcResult<Option<Account>> {
        Ok(self.state().accounts.get(address).cloned())
    }

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: Vec<AccountFilter>,
    ) -> RpcResult<Vec<(Pubkey, Account)>> {
        Ok(self
            .state()
            .accounts
            .iter()
            .filter(|(_, account)| account.owner == *program_id)
            .filter(|(_, account)| filters.iter().all(|f| f.matches(&account.data)))
            .map(|(key, account)| (*key, account.clone()))
            .collect())
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> RpcResult<SimulationOutcome> {
        let mut state = self.state();
        state.simulated.push(tx.clone());
        state.simulation.clone()
    }

    async fn recent_prioritization_fees(&self, accounts: &[Pubkey]) -> RpcResult<Vec<u64>> {
        let mut state = self.state();
        state.fee_requests.push(accounts.to_vec());
        state.fees.clone()
    }

    async fn latest_blockhash(&self) -> RpcResult<ValidityAnchor> {
        Ok(self.state().anchor)
    }

    async fn is_blockhash_valid(&self, blockhash: &Hash) -> RpcResult<bool> {
        Ok(!self.state().expired.contains(blockhash))
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> RpcResult<Signature> {
        let mut state = self.state();
        state.send_attempts += 1;
        if let Some(err) = state.send_failures.pop_front() {
            return Err(err);
        }
        let signature = tx.signatures.first().copied().ok_or_else(|| {
            RpcManagerError::RpcResponse {
                endpoint: MOCK_ENDPOINT.to_string(),
                message: "Transaction has no signatures".to_string(),
                code: Some(-32602),
                logs: Vec::new(),
            }
        })?;
        state.sent.push(tx.clone());
        Ok(signature)
    }

    async fn signature_status(&self, _signature: &Signature) -> RpcResult<SignatureOutcome> {
        self.state().signature_status.clone()
    }
}

/// Account holding an active lookup table with `addresses`
pub fn lookup_table_account(addresses: &[Pubkey]) -> Account {
    // ProgramState::LookupTable, deactivation slot, last extended slot,
    // start index, Some(authority), padding
    let mut data = Vec::with_capacity(56 + addresses.len() * 32);
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&u64::MAX.to_le_bytes());
    data.extend_from_slice(&0u64.to_le_bytes());
    data.push(0);
    data.push(1);
    data.extend_from_slice(Pubkey::new_unique().as_ref());
    data.extend_from_slice(&0u16.to_le_bytes());
    for address in addresses {
        data.extend_from_slice(address.as_ref());
    }

    Account {
        lamports: 1_000_000,
        data,
        owner: address_lookup_table::program::id(),
        executable: false,
        rent_epoch: 0,
    }
}

/// Task queue account with `bitmap` at the default layout offsets
pub fn task_queue_account(bitmap: &[u8], capacity: u16, owner: &Pubkey) -> Account {
    let mut data = vec![0u8; 143];
    data[124..126].copy_from_slice(&capacity.to_le_bytes());
    data.extend_from_slice(&(bitmap.len() as u32).to_le_bytes());
    data.extend_from_slice(bitmap);

    Account {
        lamports: 1_000_000,
        data,
        owner: *owner,
        executable: false,
        rent_epoch: 0,
    }
}

/// Order account data as the marketplace program lays it out
pub fn order_account(order: &Order, program_id: &Pubkey) -> Account {
    let mut data = account_tag("Order").to_vec();
    data.extend_from_slice(order.shopper.as_ref());
    data.extend_from_slice(order.item.as_ref());
    data.extend_from_slice(&order.timestamp.to_le_bytes());
    data.push(match order.status {
        OrderStatus::Pending => 0,
        OrderStatus::Shipping => 1,
        OrderStatus::Cancelled => 2,
        OrderStatus::Completed => 3,
    });
    data.extend_from_slice(&order.amount.to_le_bytes());
    data.extend_from_slice(&order.payment_subtotal.to_le_bytes());
    data.extend_from_slice(&order.platform_fee.to_le_bytes());
    data.extend_from_slice(order.payment_mint.as_ref());
    data.push(order.bump);

    Account {
        lamports: 1_000_000,
        data,
        owner: *program_id,
        executable: false,
        rent_epoch: 0,
    }
}
