//! Splurge marketplace gateway
//!
//! Client-side plumbing for the Splurge on-ledger marketplace: deterministic
//! account addresses, instruction builders, resource estimation, transaction
//! assembly, task-slot allocation for scheduled order completion, and the
//! permissioned relay that adds the admin co-signature to whitelisted
//! envelopes.

pub mod accounts;
pub mod compat;
pub mod config;
pub mod constants;
pub mod discriminator;
pub mod instructions;
pub mod metrics;
pub mod observability;
pub mod pda;
pub mod relay;
pub mod shipping;
pub mod task_queue;
pub mod test_utils;
pub mod tx_builder;
pub mod wallet;

// Component modules with non-standard paths (directories with spaces)
#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

// Re-export commonly used types
pub use config::Config;
pub use instructions::InstructionBuilder;
pub use pda::{ProgramAddresses, PdaError};
pub use relay::{InstructionWhitelist, PermissionedRelay, RejectReason, RelayError};
pub use rpc_manager::{LedgerClient, RpcManagerError, SolanaLedgerClient};
pub use shipping::{Shipper, ShippingError};
pub use task_queue::{TaskQueueError, TaskSlot, TaskSlotAllocator};
pub use tx_builder::{ResourceEstimator, TransactionBuilderError, TxBuildOutput, TxBuilder};
pub use wallet::AuthorityKeypair;

pub use solana_sdk::{message::VersionedMessage, pubkey::Pubkey, signature::Signature};
