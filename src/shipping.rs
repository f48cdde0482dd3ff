//! Shipping an order with a scheduled completion task
//!
//! The slot id read from the queue bitmap is only a proposal. If the ledger
//! says the task account already exists, the slot is re-derived once from a
//! fresh bitmap that skips the id that just failed.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tracing::{info, warn};

use crate::instructions::{InstructionBuilder, OrderAccounts, ShipmentSchedule};
use crate::metrics::metrics;
use crate::relay::{PermissionedRelay, Received, RelayError, Submitted};
use crate::task_queue::{is_slot_conflict, TaskQueueError, TaskSlotAllocator};
use crate::tx_builder::{TransactionBuilderError, TxBuilder};

#[derive(Error, Debug)]
pub enum ShippingError {
    #[error(transparent)]
    TaskQueue(#[from] TaskQueueError),

    #[error(transparent)]
    Build(#[from] TransactionBuilderError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Builds and relays `ship_order` transactions paid for by the admin
pub struct Shipper<'a> {
    pub builder: &'a TxBuilder,
    pub instructions: &'a InstructionBuilder,
    pub allocator: &'a TaskSlotAllocator,
    pub relay: &'a PermissionedRelay,
    pub task_queue: Pubkey,
    pub lookup_tables: &'a [Pubkey],
}

impl Shipper<'_> {
    /// Ship `accounts.order`, retrying once with a new slot on a slot conflict.
    pub async fn ship_order_with_slot(
        &self,
        accounts: &OrderAccounts,
    ) -> Result<Submitted, ShippingError> {
        let admin = self.relay.authority();
        let mut excluded = Vec::new();

        for attempt in 0..2 {
            let slot = self
                .allocator
                .allocate_excluding(&self.task_queue, &admin, 1, &excluded)
                .await?
                .into_iter()
                .next()
                .ok_or(TaskQueueError::RegistryExhausted {
                    requested: 1,
                    available: 0,
                })?;

            let ix = self.instructions.ship_order(
                accounts,
                &ShipmentSchedule {
                    task_queue: self.task_queue,
                    task_queue_program: *self.allocator.addresses().program_id(),
                    slot,
                },
            )?;
            let output = self
                .builder
                .estimate_and_assemble(&[ix], &admin, self.lookup_tables)
                .await?;

            let co_signed = self
                .relay
                .prepare(Received::from_bytes(output.serialize()?))?;
            match self.relay.submit(co_signed).await {
                Ok(submitted) => {
                    info!(order = %accounts.order, task_id = slot.id, "Order shipped");
                    return Ok(submitted);
                }
                Err(RelayError::Ledger(err)) if attempt == 0 && is_slot_conflict(&err) => {
                    metrics().task_slot_conflicts_total.inc();
                    warn!(task_id = slot.id, "Task slot already claimed, retrying with a fresh slot");
                    excluded.push(slot.id);
                }
                Err(err) => return Err(err.into()),
            }
        }

        // The second attempt either returned or surfaced its error
        Err(RelayError::Internal("slot retry loop exited without a result".into()).into())
    }
}
