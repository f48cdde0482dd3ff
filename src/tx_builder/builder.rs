//! Core transaction assembly

use futures::future::try_join_all;
use solana_sdk::{
    address_lookup_table::{self, state::AddressLookupTable, AddressLookupTableAccount},
    instruction::Instruction,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::metrics::{metrics, Timer};
use crate::rpc_manager::LedgerClient;
use crate::tx_builder::context::BuildContext;
use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::instructions::{plan_instructions, InstructionPlan};
use crate::tx_builder::output::TxBuildOutput;
use crate::tx_builder::simulate::{BudgetConfig, ResourceBudget, ResourceEstimator};

/// Assembles versioned transactions against the ledger
#[derive(Clone)]
pub struct TxBuilder {
    ledger: Arc<dyn LedgerClient>,
    estimator: ResourceEstimator,
}

impl TxBuilder {
    pub fn new(ledger: Arc<dyn LedgerClient>, budget_config: BudgetConfig) -> Self {
        let estimator = ResourceEstimator::new(Arc::clone(&ledger), budget_config);
        Self { ledger, estimator }
    }

    pub fn estimator(&self) -> &ResourceEstimator {
        &self.estimator
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Fetch and decode each lookup table, preserving order.
    ///
    /// A missing account or one that does not hold a lookup table fails
    /// with [`TransactionBuilderError::TableResolutionFailed`].
    pub async fn resolve_lookup_tables(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>, TransactionBuilderError> {
        try_join_all(addresses.iter().map(|key| self.resolve_lookup_table(*key))).await
    }

    async fn resolve_lookup_table(
        &self,
        key: Pubkey,
    ) -> Result<AddressLookupTableAccount, TransactionBuilderError> {
        let account = self
            .ledger
            .get_account(&key)
            .await?
            .ok_or_else(|| TransactionBuilderError::table_missing(key))?;

        if account.owner != address_lookup_table::program::id() {
            return Err(TransactionBuilderError::TableResolutionFailed {
                table: key,
                reason: format!("account is owned by {}", account.owner),
            });
        }

        let table = AddressLookupTable::deserialize(&account.data).map_err(|e| {
            TransactionBuilderError::TableResolutionFailed {
                table: key,
                reason: e.to_string(),
            }
        })?;

        debug!(table = %key, addresses = table.addresses.len(), "Resolved lookup table");
        Ok(AddressLookupTableAccount {
            key,
            addresses: table.addresses.to_vec(),
        })
    }

    /// Fetch a fresh validity anchor and pair it with `lookup_tables`
    pub async fn fetch_context(
        &self,
        lookup_tables: Vec<AddressLookupTableAccount>,
    ) -> Result<BuildContext, TransactionBuilderError> {
        let anchor = self.ledger.latest_blockhash().await?;
        Ok(BuildContext::new(anchor, lookup_tables))
    }

    /// Compile a plan into an unsigned envelope.
    ///
    /// Pure: the same plan, payer and context always produce the same bytes.
    /// Addresses present in a lookup table are referenced by index; the rest
    /// are embedded.
    pub fn compile(
        plan: &InstructionPlan,
        payer: &Pubkey,
        context: &BuildContext,
        budget: ResourceBudget,
    ) -> Result<TxBuildOutput, TransactionBuilderError> {
        let message = v0::Message::try_compile(
            payer,
            &plan.instructions,
            &context.lookup_tables,
            context.anchor.blockhash,
        )
        .map_err(|e| TransactionBuilderError::Compile(e.to_string()))?;

        let signatures = vec![Signature::default(); message.header.num_required_signatures as usize];
        let tx = VersionedTransaction {
            signatures,
            message: VersionedMessage::V0(message),
        };
        Ok(TxBuildOutput::new(tx, context.anchor, budget))
    }

    /// Prepend the budget, fetch an anchor and compile.
    pub async fn assemble(
        &self,
        instructions: &[Instruction],
        payer: &Pubkey,
        lookup_tables: &[Pubkey],
        budget: ResourceBudget,
    ) -> Result<TxBuildOutput, TransactionBuilderError> {
        let timer = Timer::start();
        let plan = plan_instructions(&budget, instructions)?;
        let tables = self.resolve_lookup_tables(lookup_tables).await?;
        let context = self.fetch_context(tables).await?;

        let output = Self::compile(&plan, payer, &context, budget)?;
        timer.observe_duration(&metrics().assembly_latency);
        info!(
            payer = %payer,
            instructions = instructions.len(),
            compute_unit_limit = budget.compute_unit_limit,
            compute_unit_price = budget.compute_unit_price,
            last_valid_block_height = output.anchor.last_valid_block_height,
            "Assembled transaction"
        );
        Ok(output)
    }

    /// Estimate a budget, then assemble with it.
    pub async fn estimate_and_assemble(
        &self,
        instructions: &[Instruction],
        payer: &Pubkey,
        lookup_tables: &[Pubkey],
    ) -> Result<TxBuildOutput, TransactionBuilderError> {
        let tables = self.resolve_lookup_tables(lookup_tables).await?;
        let budget = self.estimator.estimate(instructions, payer, &tables).await?;

        let timer = Timer::start();
        let plan = plan_instructions(&budget, instructions)?;
        let context = self.fetch_context(tables).await?;
        let output = Self::compile(&plan, payer, &context, budget)?;
        timer.observe_duration(&metrics().assembly_latency);
        Ok(output)
    }

    /// Fail with [`TransactionBuilderError::StaleAnchor`] once the envelope's
    /// anchor is no longer accepted by the ledger.
    pub async fn ensure_fresh(&self, output: &TxBuildOutput) -> Result<(), TransactionBuilderError> {
        if self.ledger.is_blockhash_valid(&output.anchor.blockhash).await? {
            Ok(())
        } else {
            Err(TransactionBuilderError::StaleAnchor {
                last_valid_block_height: output.anchor.last_valid_block_height,
            })
        }
    }
}
