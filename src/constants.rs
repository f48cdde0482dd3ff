//! Constants shared with the on-chain marketplace and task-queue programs.
//!
//! Keep these stable because they affect address derivation.

use solana_sdk::pubkey::Pubkey;

/// Seed for the singleton configuration / treasury account.
pub const CONFIG_SEED: &[u8] = b"config";

/// Seed for per-authority shopper profiles.
pub const SHOPPER_SEED: &[u8] = b"shopper";

/// Seed for per-authority stores.
pub const STORE_SEED: &[u8] = b"store";

/// Seed for listings, keyed by store address + item name.
pub const ITEM_SEED: &[u8] = b"item";

/// Seed for purchases, keyed by shopper + item + creation timestamp.
pub const ORDER_SEED: &[u8] = b"order";

/// Seed for reviews, keyed by the purchase address.
pub const REVIEW_SEED: &[u8] = b"review";

/// Task-queue program: per-slot task account.
pub const TASK_SEED: &[u8] = b"task";

/// Task-queue program: permission account for an authority on a queue.
pub const TASK_QUEUE_AUTHORITY_SEED: &[u8] = b"task_queue_authority";

pub const MAX_SHOPPER_NAME_LEN: usize = 64;
pub const MAX_STORE_NAME_LEN: usize = 64;
pub const MAX_ITEM_NAME_LEN: usize = 32;

/// Maximum review text length accepted by the program.
pub const MAX_REVIEW_TEXT_LEN: usize = 512;

/// Ledger packing limit for a single seed.
pub const MAX_SEED_LEN: usize = 32;

/// Ledger packing limit for the number of seeds, bump seed included.
pub const MAX_SEEDS: usize = 16;

/// Deployed marketplace program id.
pub const DEFAULT_PROGRAM_ID: &str = "SPLGn8gSbch6dmHL4Z4HBFc2kCbSpFUMxXZPF2XC3Nd";

/// Deployed task-queue (scheduled execution) program id.
pub const DEFAULT_TASK_QUEUE_PROGRAM_ID: &str = "tuktukUrfhXT6ZT77QTU8RQtvgL967uRuVagWF57zVA";

/// Operations that may receive the privileged co-signature.
pub const DEFAULT_ALLOWED_INSTRUCTIONS: &[&str] = &["ship_order", "cancel_order"];

pub fn default_program_id() -> Pubkey {
    DEFAULT_PROGRAM_ID.parse().unwrap_or_default()
}

pub fn default_task_queue_program_id() -> Pubkey {
    DEFAULT_TASK_QUEUE_PROGRAM_ID.parse().unwrap_or_default()
}
