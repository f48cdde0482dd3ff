//! Task-slot allocation for the scheduled-execution queue
//!
//! The queue account carries a bitmap where bit `i` set means task id `i` is
//! taken. Bits are read least-significant first within each byte, so id
//! `n` lives at byte `n / 8`, bit `n % 8`. The lowest free ids are
//! proposed; the ledger enforces the actual claim and may reject it if
//! another caller got there first.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::constants::{TASK_QUEUE_AUTHORITY_SEED, TASK_SEED};
use crate::pda::{derive, PdaError, Seeds};
use crate::rpc_manager::{LedgerClient, RpcManagerError};

#[derive(Error, Debug)]
pub enum TaskQueueError {
    /// Fewer free slots than requested. Surface as "scheduling capacity
    /// full"; retrying immediately will not help.
    #[error("Scheduling capacity full: requested {requested} slot(s), {available} free")]
    RegistryExhausted { requested: usize, available: usize },

    #[error("Malformed task queue account: {0}")]
    MalformedRegistry(String),

    #[error("Task queue {0} not found")]
    QueueNotFound(Pubkey),

    #[error(transparent)]
    Pda(#[from] PdaError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),
}

impl TaskQueueError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::RegistryExhausted { .. } => "registry_exhausted",
            Self::MalformedRegistry(_) => "malformed_registry",
            Self::QueueNotFound(_) => "queue_not_found",
            Self::Pda(err) => err.category(),
            Self::Rpc(_) => "rpc",
        }
    }
}

/// Byte offsets of the fields read from the queue account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQueueLayout {
    /// Offset of the little-endian `u16` slot capacity
    #[serde(default = "default_capacity_offset")]
    pub capacity_offset: usize,

    /// Offset of the bitmap's `u32` length prefix
    #[serde(default = "default_bitmap_offset")]
    pub bitmap_offset: usize,
}

// tag(8) config(32) id(4) update_authority(32) reserved(32)
// min_crank_reward(8) uncollected_protocol_fees(8)
fn default_capacity_offset() -> usize {
    124
}

// capacity(2) created_at(8) updated_at(8) bump(1)
fn default_bitmap_offset() -> usize {
    143
}

impl Default for TaskQueueLayout {
    fn default() -> Self {
        Self {
            capacity_offset: default_capacity_offset(),
            bitmap_offset: default_bitmap_offset(),
        }
    }
}

impl TaskQueueLayout {
    /// Occupancy bitmap, truncated to the queue's capacity
    pub fn read_registry<'a>(&self, data: &'a [u8]) -> Result<Registry<'a>, TaskQueueError> {
        let capacity = read_u16(data, self.capacity_offset)
            .ok_or_else(|| TaskQueueError::MalformedRegistry("capacity out of bounds".into()))?;
        let len = read_u32(data, self.bitmap_offset).ok_or_else(|| {
            TaskQueueError::MalformedRegistry("bitmap length out of bounds".into())
        })? as usize;

        let start = self.bitmap_offset + 4;
        let bitmap = data.get(start..start + len).ok_or_else(|| {
            TaskQueueError::MalformedRegistry(format!(
                "bitmap of {len} bytes exceeds account data ({} bytes)",
                data.len()
            ))
        })?;

        Ok(Registry {
            bitmap,
            capacity: usize::from(capacity),
        })
    }
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    Some(u32::from_le_bytes(buf))
}

/// Borrowed occupancy bitmap with an id ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registry<'a> {
    pub bitmap: &'a [u8],
    pub capacity: usize,
}

impl Registry<'_> {
    /// Lowest `count` free ids below the capacity
    pub fn next_free_slots(&self, count: usize) -> Result<Vec<u16>, TaskQueueError> {
        next_free_slots_excluding(self.bitmap, count, self.capacity, &[])
    }
}

/// Lowest-index-first scan for `count` unset bits.
///
/// Never returns a partial result: if fewer than `count` slots are free the
/// call fails with [`TaskQueueError::RegistryExhausted`].
pub fn next_free_slots(bitmap: &[u8], count: usize) -> Result<Vec<u16>, TaskQueueError> {
    next_free_slots_excluding(bitmap, count, bitmap.len() * 8, &[])
}

/// Like [`next_free_slots`], also skipping ids in `excluded` and any id at
/// or above `capacity`.
pub fn next_free_slots_excluding(
    bitmap: &[u8],
    count: usize,
    capacity: usize,
    excluded: &[u16],
) -> Result<Vec<u16>, TaskQueueError> {
    let limit = capacity
        .min(bitmap.len() * 8)
        .min(usize::from(u16::MAX) + 1);

    let free = (0..limit)
        .filter(|id| bitmap[id / 8] & (1 << (id % 8)) == 0)
        // limit is at most u16::MAX + 1, so every id fits
        .map(|id| id as u16)
        .filter(|id| !excluded.contains(id));

    let slots: Vec<u16> = free.clone().take(count).collect();
    if slots.len() < count {
        return Err(TaskQueueError::RegistryExhausted {
            requested: count,
            available: free.count(),
        });
    }
    Ok(slots)
}

/// A proposed task slot with the accounts the scheduling instruction needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSlot {
    pub id: u16,
    /// Task account for this id under the queue
    pub task: Pubkey,
    /// Permission account of the submitting authority on the queue
    pub queue_authority: Pubkey,
}

/// Address derivation under the task-queue program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskQueueAddresses {
    program_id: Pubkey,
}

impl TaskQueueAddresses {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn task(&self, queue: &Pubkey, id: u16) -> Result<(Pubkey, u8), PdaError> {
        derive(
            &self.program_id,
            &Seeds::new().with(TASK_SEED).with_key(queue).with_u16_le(id),
        )
    }

    pub fn queue_authority(
        &self,
        queue: &Pubkey,
        authority: &Pubkey,
    ) -> Result<(Pubkey, u8), PdaError> {
        derive(
            &self.program_id,
            &Seeds::new()
                .with(TASK_QUEUE_AUTHORITY_SEED)
                .with_key(queue)
                .with_key(authority),
        )
    }

    pub fn slot(&self, queue: &Pubkey, authority: &Pubkey, id: u16) -> Result<TaskSlot, PdaError> {
        Ok(TaskSlot {
            id,
            task: self.task(queue, id)?.0,
            queue_authority: self.queue_authority(queue, authority)?.0,
        })
    }
}

/// Reads the queue bitmap from the ledger and proposes free slots
#[derive(Clone)]
pub struct TaskSlotAllocator {
    ledger: Arc<dyn LedgerClient>,
    addresses: TaskQueueAddresses,
    layout: TaskQueueLayout,
}

impl TaskSlotAllocator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        task_queue_program: Pubkey,
        layout: TaskQueueLayout,
    ) -> Self {
        Self {
            ledger,
            addresses: TaskQueueAddresses::new(task_queue_program),
            layout,
        }
    }

    pub fn addresses(&self) -> &TaskQueueAddresses {
        &self.addresses
    }

    /// Fetch the queue account data, checking ownership
    async fn fetch_queue(&self, queue: &Pubkey) -> Result<Vec<u8>, TaskQueueError> {
        let account = self
            .ledger
            .get_account(queue)
            .await?
            .ok_or(TaskQueueError::QueueNotFound(*queue))?;
        if account.owner != *self.addresses.program_id() {
            return Err(TaskQueueError::MalformedRegistry(format!(
                "queue account is owned by {}",
                account.owner
            )));
        }
        Ok(account.data)
    }

    /// Propose the `count` lowest free slots on `queue` for `authority`.
    pub async fn allocate(
        &self,
        queue: &Pubkey,
        authority: &Pubkey,
        count: usize,
    ) -> Result<Vec<TaskSlot>, TaskQueueError> {
        self.allocate_excluding(queue, authority, count, &[]).await
    }

    /// Re-read the bitmap and propose slots, never returning an id in
    /// `excluded`. Used after the ledger rejected a claim on a slot the
    /// stale bitmap still showed as free.
    pub async fn allocate_excluding(
        &self,
        queue: &Pubkey,
        authority: &Pubkey,
        count: usize,
        excluded: &[u16],
    ) -> Result<Vec<TaskSlot>, TaskQueueError> {
        let data = self.fetch_queue(queue).await?;
        let registry = self.layout.read_registry(&data)?;
        let ids = next_free_slots_excluding(registry.bitmap, count, registry.capacity, excluded)?;

        debug!(queue = %queue, ids = ?ids, "Proposed task slots");
        ids.into_iter()
            .map(|id| {
                self.addresses
                    .slot(queue, authority, id)
                    .map_err(TaskQueueError::from)
            })
            .collect()
    }
}

/// Whether a ledger rejection means the task slot was already claimed.
///
/// Creating an account that exists fails with the system program's
/// "already in use" error (custom error 0).
pub fn is_slot_conflict(err: &RpcManagerError) -> bool {
    match err.ledger_text() {
        Some(text) => {
            let text = text.to_lowercase();
            text.contains("already in use") || text.contains("custom program error: 0x0")
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{task_queue_account, MockLedger};
    use proptest::prelude::*;

    fn bits(occupied: &[bool]) -> Vec<u8> {
        let mut bitmap = vec![0u8; occupied.len().div_ceil(8)];
        for (id, taken) in occupied.iter().enumerate() {
            if *taken {
                bitmap[id / 8] |= 1 << (id % 8);
            }
        }
        bitmap
    }

    #[test]
    fn test_lowest_free_slot_first() {
        let bitmap = bits(&[true, true, false, true, false, false, false, false]);
        assert_eq!(next_free_slots(&bitmap, 1).unwrap(), vec![2]);
        assert_eq!(next_free_slots(&bitmap, 2).unwrap(), vec![2, 4]);
    }

    #[test]
    fn test_full_registry_is_exhausted() {
        let bitmap = vec![0xFF; 4];
        assert!(matches!(
            next_free_slots(&bitmap, 1),
            Err(TaskQueueError::RegistryExhausted {
                requested: 1,
                available: 0
            })
        ));
    }

    #[test]
    fn test_never_returns_partial_result() {
        let bitmap = bits(&[true, false, true, true, true, true, true, true]);
        assert!(matches!(
            next_free_slots(&bitmap, 2),
            Err(TaskQueueError::RegistryExhausted {
                requested: 2,
                available: 1
            })
        ));
    }

    #[test]
    fn test_capacity_and_exclusions() {
        let bitmap = vec![0u8; 2];
        assert_eq!(
            next_free_slots_excluding(&bitmap, 2, 16, &[0, 1]).unwrap(),
            vec![2, 3]
        );
        assert!(next_free_slots_excluding(&bitmap, 1, 2, &[0, 1]).is_err());
    }

    #[test]
    fn test_second_byte_bit_order() {
        let mut bitmap = vec![0xFF, 0b0000_0101];
        assert_eq!(next_free_slots(&bitmap, 1).unwrap(), vec![9]);
        bitmap[1] = 0b1111_1110;
        assert_eq!(next_free_slots(&bitmap, 1).unwrap(), vec![8]);
    }

    #[test]
    fn test_read_registry_from_account_layout() {
        let data = task_queue_account(&[0b0000_0011, 0], 10, &Pubkey::new_unique()).data;
        let registry = TaskQueueLayout::default().read_registry(&data).unwrap();
        assert_eq!(registry.capacity, 10);
        assert_eq!(registry.bitmap, &[0b0000_0011, 0]);
        assert_eq!(registry.next_free_slots(1).unwrap(), vec![2]);
    }

    #[test]
    fn test_truncated_account_is_malformed() {
        let data = vec![0u8; 100];
        assert!(matches!(
            TaskQueueLayout::default().read_registry(&data),
            Err(TaskQueueError::MalformedRegistry(_))
        ));
    }

    #[test]
    fn test_task_address_uses_u16_le_id() {
        let program = Pubkey::new_unique();
        let queue = Pubkey::new_unique();
        let addresses = TaskQueueAddresses::new(program);
        let expected =
            Pubkey::find_program_address(&[TASK_SEED, queue.as_ref(), &7u16.to_le_bytes()], &program);
        assert_eq!(addresses.task(&queue, 7).unwrap(), expected);
    }

    #[test]
    fn test_slot_conflict_detection() {
        let conflict = RpcManagerError::RpcResponse {
            endpoint: "mock".into(),
            message: "Transaction simulation failed".into(),
            code: Some(-32002),
            logs: vec!["Allocate: account Address { .. } already in use".into()],
        };
        assert!(is_slot_conflict(&conflict));

        let other = RpcManagerError::RpcResponse {
            endpoint: "mock".into(),
            message: "custom program error: 0x1771".into(),
            code: Some(-32002),
            logs: vec![],
        };
        assert!(!is_slot_conflict(&other));
    }

    #[tokio::test]
    async fn test_allocator_reads_ledger() {
        let program = Pubkey::new_unique();
        let queue = Pubkey::new_unique();
        let authority = Pubkey::new_unique();
        let ledger = Arc::new(MockLedger::new());
        ledger.put_account(queue, task_queue_account(&[0b0000_0001], 8, &program));

        let allocator = TaskSlotAllocator::new(ledger, program, TaskQueueLayout::default());
        let slots = allocator.allocate(&queue, &authority, 2).await.unwrap();
        assert_eq!(slots.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            slots[0].queue_authority,
            allocator
                .addresses()
                .queue_authority(&queue, &authority)
                .unwrap()
                .0
        );

        let retry = allocator
            .allocate_excluding(&queue, &authority, 1, &[1])
            .await
            .unwrap();
        assert_eq!(retry[0].id, 2);
    }

    #[tokio::test]
    async fn test_missing_queue() {
        let ledger = Arc::new(MockLedger::new());
        let allocator =
            TaskSlotAllocator::new(ledger, Pubkey::new_unique(), TaskQueueLayout::default());
        let queue = Pubkey::new_unique();
        assert!(matches!(
            allocator.allocate(&queue, &Pubkey::new_unique(), 1).await,
            Err(TaskQueueError::QueueNotFound(q)) if q == queue
        ));
    }

    proptest! {
        #[test]
        fn free_slots_are_free_sorted_and_lowest(
            bitmap in proptest::collection::vec(any::<u8>(), 1..16),
            count in 1usize..8,
        ) {
            match next_free_slots(&bitmap, count) {
                Ok(ids) => {
                    prop_assert_eq!(ids.len(), count);
                    prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
                    for id in &ids {
                        let id = *id as usize;
                        prop_assert_eq!(bitmap[id / 8] & (1 << (id % 8)), 0);
                    }
                    // Nothing free below the highest returned id was skipped
                    let highest = *ids.last().unwrap() as usize;
                    let free_below = (0..=highest)
                        .filter(|id| bitmap[id / 8] & (1 << (id % 8)) == 0)
                        .count();
                    prop_assert_eq!(free_below, count);
                }
                Err(TaskQueueError::RegistryExhausted { available, .. }) => {
                    let free = bitmap.iter().map(|b| b.count_zeros() as usize).sum::<usize>();
                    prop_assert_eq!(available, free);
                    prop_assert!(free < count);
                }
                Err(other) => prop_assert!(false, "unexpected error {other:?}"),
            }
        }
    }
}
