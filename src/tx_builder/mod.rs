//! Transaction assembly
//!
//! Split into focused modules:
//! - **errors**: error taxonomy for assembly
//! - **simulate**: resource estimation (compute ceiling, priority fee)
//! - **instructions**: budget prefix planning and ordering checks
//! - **context**: validity anchor plus resolved lookup tables
//! - **builder**: table resolution, anchor fetch and compilation
//! - **output**: compiled envelope and incremental signing
//!
//! Compilation is deterministic: the same plan compiled against the same
//! context yields byte-identical envelopes. The relay's tag verification
//! relies on this.

pub mod builder;
pub mod context;
pub mod errors;
pub mod instructions;
pub mod output;
pub mod simulate;

pub use builder::TxBuilder;
pub use context::BuildContext;
pub use errors::TransactionBuilderError;
pub use instructions::{plan_instructions, InstructionPlan};
pub use output::{apply_signature, TxBuildOutput};
pub use simulate::{BudgetConfig, EstimateSource, ResourceBudget, ResourceEstimator};
