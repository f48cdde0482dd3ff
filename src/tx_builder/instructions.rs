//! Instruction planning and ordering validation
//!
//! Every assembled transaction has the shape:
//! 1. `set_compute_unit_limit`
//! 2. `set_compute_unit_price`
//! 3. domain instructions, in caller order
//!
//! The ledger applies the budget before executing anything after it, so the
//! two budget instructions always lead.

use crate::tx_builder::errors::TransactionBuilderError;
use crate::tx_builder::simulate::ResourceBudget;
use solana_sdk::{compute_budget::ComputeBudgetInstruction, instruction::Instruction};

/// Ordered instruction list ready for compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionPlan {
    pub instructions: Vec<Instruction>,
}

impl InstructionPlan {
    /// Domain instructions only, without the budget prefix
    pub fn domain_instructions(&self) -> &[Instruction] {
        self.instructions.get(BUDGET_PREFIX_LEN..).unwrap_or(&[])
    }
}

/// Number of budget instructions placed ahead of domain instructions
pub const BUDGET_PREFIX_LEN: usize = 2;

fn is_compute_budget(ix: &Instruction) -> bool {
    ix.program_id == solana_sdk::compute_budget::id()
}

/// Prepend the budget instructions to `domain`.
///
/// Fails if `domain` is empty or already carries compute-budget
/// instructions, which would make the effective budget ambiguous.
pub fn plan_instructions(
    budget: &ResourceBudget,
    domain: &[Instruction],
) -> Result<InstructionPlan, TransactionBuilderError> {
    if domain.is_empty() {
        return Err(TransactionBuilderError::Configuration(
            "Instruction list is empty".to_string(),
        ));
    }
    if domain.iter().any(is_compute_budget) {
        return Err(TransactionBuilderError::Configuration(
            "Domain instructions must not contain compute budget instructions".to_string(),
        ));
    }

    let mut instructions = Vec::with_capacity(domain.len() + BUDGET_PREFIX_LEN);
    instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(
        budget.compute_unit_limit,
    ));
    instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
        budget.compute_unit_price,
    ));
    instructions.extend_from_slice(domain);

    sanity_check_ix_order(&instructions)?;
    Ok(InstructionPlan { instructions })
}

/// Validate instruction ordering (debug/test only)
#[cfg(debug_assertions)]
pub fn sanity_check_ix_order(instructions: &[Instruction]) -> Result<(), TransactionBuilderError> {
    if instructions.len() <= BUDGET_PREFIX_LEN {
        return Err(TransactionBuilderError::Internal(
            "Plan has no domain instructions".to_string(),
        ));
    }
    let (prefix, rest) = instructions.split_at(BUDGET_PREFIX_LEN);
    if !prefix.iter().all(is_compute_budget) {
        return Err(TransactionBuilderError::Internal(
            "Budget instructions must lead the plan".to_string(),
        ));
    }
    if rest.iter().any(is_compute_budget) {
        return Err(TransactionBuilderError::Internal(
            "Budget instruction found after domain instructions".to_string(),
        ));
    }
    Ok(())
}

#[cfg(not(debug_assertions))]
#[inline]
pub fn sanity_check_ix_order(_instructions: &[Instruction]) -> Result<(), TransactionBuilderError> {
    Ok(())
}
