//! Resource estimation: compute-unit ceiling and priority-fee rate
//!
//! Both halves are best-effort. A failed or timed-out simulation and an
//! empty or failed fee sample fall back to configured values. Only an
//! unreachable ledger surfaces as an error.

use serde::{Deserialize, Serialize};
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::Instruction,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::metrics::metrics;
use crate::rpc_manager::{LedgerClient, RpcManagerError, SimulationOutcome};
use crate::tx_builder::errors::TransactionBuilderError;

/// Compute ceiling used for the dry run itself (ledger maximum)
pub const SIMULATION_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;

/// Fallback and clamping constants for resource estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Ceiling used when simulation does not yield a measurement
    #[serde(default = "default_fallback_compute_units")]
    pub fallback_compute_units: u32,

    /// Safety margin added on top of measured consumption, in percent
    #[serde(default = "default_margin_percent")]
    pub margin_percent: u32,

    #[serde(default = "default_min_compute_units")]
    pub min_compute_units: u32,

    #[serde(default = "default_max_compute_units")]
    pub max_compute_units: u32,

    /// Lowest priority-fee rate ever used (micro-lamports per CU)
    #[serde(default = "default_priority_fee_floor")]
    pub priority_fee_floor: u64,

    /// Optional upper bound on the priority-fee rate
    #[serde(default)]
    pub priority_fee_cap: Option<u64>,
}

fn default_fallback_compute_units() -> u32 {
    400_000
}

fn default_margin_percent() -> u32 {
    10
}

fn default_min_compute_units() -> u32 {
    10_000
}

fn default_max_compute_units() -> u32 {
    SIMULATION_COMPUTE_UNIT_LIMIT
}

fn default_priority_fee_floor() -> u64 {
    1_000
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            fallback_compute_units: default_fallback_compute_units(),
            margin_percent: default_margin_percent(),
            min_compute_units: default_min_compute_units(),
            max_compute_units: default_max_compute_units(),
            priority_fee_floor: default_priority_fee_floor(),
            priority_fee_cap: None,
        }
    }
}

impl BudgetConfig {
    pub fn validate(&self) -> Result<(), TransactionBuilderError> {
        if self.min_compute_units > self.max_compute_units {
            return Err(TransactionBuilderError::Configuration(format!(
                "min_compute_units ({}) exceeds max_compute_units ({})",
                self.min_compute_units, self.max_compute_units
            )));
        }
        if self.max_compute_units > SIMULATION_COMPUTE_UNIT_LIMIT {
            return Err(TransactionBuilderError::Configuration(format!(
                "max_compute_units exceeds the ledger limit of {SIMULATION_COMPUTE_UNIT_LIMIT}"
            )));
        }
        if self.fallback_compute_units == 0 {
            return Err(TransactionBuilderError::Configuration(
                "fallback_compute_units must be greater than zero".to_string(),
            ));
        }
        if let Some(cap) = self.priority_fee_cap {
            if cap < self.priority_fee_floor {
                return Err(TransactionBuilderError::Configuration(format!(
                    "priority_fee_cap ({cap}) is below priority_fee_floor ({})",
                    self.priority_fee_floor
                )));
            }
        }
        Ok(())
    }

    /// Apply the safety margin (rounded up) and clamp to the configured range
    pub fn ceiling_from_measurement(&self, units_consumed: u64) -> u32 {
        let margin = 100 + u64::from(self.margin_percent);
        let padded = units_consumed.saturating_mul(margin).div_ceil(100);
        let clamped = padded.clamp(
            u64::from(self.min_compute_units),
            u64::from(self.max_compute_units),
        );
        u32::try_from(clamped).unwrap_or(self.max_compute_units)
    }

    /// Floor of the arithmetic mean, never below the configured floor
    pub fn fee_from_samples(&self, samples: &[u64]) -> Option<u64> {
        if samples.is_empty() {
            return None;
        }
        let sum: u128 = samples.iter().map(|fee| u128::from(*fee)).sum();
        let mean = u64::try_from(sum / samples.len() as u128).unwrap_or(u64::MAX);
        Some(self.bound_fee(mean))
    }

    fn bound_fee(&self, fee: u64) -> u64 {
        let fee = fee.max(self.priority_fee_floor);
        match self.priority_fee_cap {
            Some(cap) => fee.min(cap),
            None => fee,
        }
    }
}

/// Where an estimate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateSource {
    Measured,
    Fallback,
}

/// Compute ceiling and priority-fee rate for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceBudget {
    pub compute_unit_limit: u32,
    /// Micro-lamports per compute unit
    pub compute_unit_price: u64,
    pub compute_source: EstimateSource,
    pub fee_source: EstimateSource,
}

impl ResourceBudget {
    /// Budget made entirely of configured defaults
    pub fn fallback(config: &BudgetConfig) -> Self {
        Self {
            compute_unit_limit: config.fallback_compute_units,
            compute_unit_price: config.bound_fee(config.priority_fee_floor),
            compute_source: EstimateSource::Fallback,
            fee_source: EstimateSource::Fallback,
        }
    }
}

/// Estimates a [`ResourceBudget`] from a dry run and recent fee samples
#[derive(Clone)]
pub struct ResourceEstimator {
    ledger: Arc<dyn LedgerClient>,
    config: BudgetConfig,
}

impl ResourceEstimator {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: BudgetConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    pub async fn estimate(
        &self,
        instructions: &[Instruction],
        payer: &Pubkey,
        tables: &[AddressLookupTableAccount],
    ) -> Result<ResourceBudget, TransactionBuilderError> {
        let simulation_tx = build_simulation_tx(instructions, payer, tables)?;

        // Fee window is ledger-wide, not scoped to the accounts this draft locks
        let (simulated, fees) = tokio::join!(
            self.ledger.simulate(&simulation_tx),
            self.ledger.recent_prioritization_fees(&[]),
        );

        let (compute_unit_limit, compute_source) = self.compute_ceiling(simulated)?;
        let (compute_unit_price, fee_source) = self.priority_fee(fees)?;

        let budget = ResourceBudget {
            compute_unit_limit,
            compute_unit_price,
            compute_source,
            fee_source,
        };
        debug!(
            compute_unit_limit,
            compute_unit_price,
            compute_source = ?compute_source,
            fee_source = ?fee_source,
            "Resource budget estimated"
        );
        Ok(budget)
    }

    fn compute_ceiling(
        &self,
        simulated: Result<SimulationOutcome, RpcManagerError>,
    ) -> Result<(u32, EstimateSource), TransactionBuilderError> {
        match simulated {
            Ok(SimulationOutcome {
                units_consumed: Some(units),
                err: None,
                ..
            }) if units > 0 => Ok((
                self.config.ceiling_from_measurement(units),
                EstimateSource::Measured,
            )),
            Ok(outcome) => {
                debug!(
                    error = ?outcome.err,
                    units_consumed = ?outcome.units_consumed,
                    "Simulation did not produce a usable measurement, using fallback ceiling"
                );
                self.record_fallback("compute_units");
                Ok((self.config.fallback_compute_units, EstimateSource::Fallback))
            }
            Err(err @ RpcManagerError::Transport { .. }) => Err(err.into()),
            Err(err) => {
                warn!(error = %err, "Simulation failed, using fallback ceiling");
                self.record_fallback("compute_units");
                Ok((self.config.fallback_compute_units, EstimateSource::Fallback))
            }
        }
    }

    fn priority_fee(
        &self,
        fees: Result<Vec<u64>, RpcManagerError>,
    ) -> Result<(u64, EstimateSource), TransactionBuilderError> {
        match fees {
            Ok(samples) => match self.config.fee_from_samples(&samples) {
                Some(fee) => Ok((fee, EstimateSource::Measured)),
                None => {
                    debug!("Empty priority fee sample window, using floor");
                    self.record_fallback("priority_fee");
                    Ok((
                        self.config.bound_fee(self.config.priority_fee_floor),
                        EstimateSource::Fallback,
                    ))
                }
            },
            Err(err @ RpcManagerError::Transport { .. }) => Err(err.into()),
            Err(err) => {
                warn!(error = %err, "Priority fee sampling failed, using floor");
                self.record_fallback("priority_fee");
                Ok((
                    self.config.bound_fee(self.config.priority_fee_floor),
                    EstimateSource::Fallback,
                ))
            }
        }
    }

    fn record_fallback(&self, estimate: &str) {
        metrics()
            .estimation_fallbacks_total
            .with_label_values(&[estimate])
            .inc();
    }
}

/// Unsigned dry-run transaction with the maximum compute ceiling prepended.
///
/// The blockhash is a placeholder; the ledger substitutes a current one.
fn build_simulation_tx(
    instructions: &[Instruction],
    payer: &Pubkey,
    tables: &[AddressLookupTableAccount],
) -> Result<VersionedTransaction, TransactionBuilderError> {
    let mut simulation_ixs = Vec::with_capacity(instructions.len() + 1);
    simulation_ixs.push(ComputeBudgetInstruction::set_compute_unit_limit(
        SIMULATION_COMPUTE_UNIT_LIMIT,
    ));
    simulation_ixs.extend_from_slice(instructions);

    let message = v0::Message::try_compile(payer, &simulation_ixs, tables, Hash::default())
        .map_err(|e| TransactionBuilderError::Compile(e.to_string()))?;
    let signatures = vec![Signature::default(); message.header.num_required_signatures as usize];

    Ok(VersionedTransaction {
        signatures,
        message: VersionedMessage::V0(message),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockLedger;
    use solana_sdk::instruction::AccountMeta;

    fn purchase_ix(payer: &Pubkey) -> Instruction {
        Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[0; 12],
            vec![
                AccountMeta::new(*payer, true),
                AccountMeta::new(Pubkey::new_unique(), false),
            ],
        )
    }

    #[test]
    fn test_margin_rounds_up_and_clamps() {
        let config = BudgetConfig::default();
        assert_eq!(config.ceiling_from_measurement(100_000), 110_000);
        assert_eq!(config.ceiling_from_measurement(100_001), 110_002);
        assert_eq!(config.ceiling_from_measurement(1), config.min_compute_units);
        assert_eq!(
            config.ceiling_from_measurement(10_000_000),
            config.max_compute_units
        );
    }

    #[test]
    fn test_fee_is_floored_mean_with_floor() {
        let config = BudgetConfig {
            priority_fee_floor: 100,
            ..Default::default()
        };
        assert_eq!(config.fee_from_samples(&[1_000, 2_001]), Some(1_500));
        assert_eq!(config.fee_from_samples(&[0, 0, 3]), Some(100));
        assert_eq!(config.fee_from_samples(&[]), None);
    }

    #[test]
    fn test_fee_cap() {
        let config = BudgetConfig {
            priority_fee_floor: 10,
            priority_fee_cap: Some(50),
            ..Default::default()
        };
        assert_eq!(config.fee_from_samples(&[1_000]), Some(50));
    }

    #[test]
    fn test_config_validation() {
        assert!(BudgetConfig::default().validate().is_ok());
        let inverted = BudgetConfig {
            min_compute_units: 500_000,
            max_compute_units: 100_000,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[tokio::test]
    async fn test_measured_estimate() {
        let payer = Pubkey::new_unique();
        let ledger = Arc::new(MockLedger::new());
        ledger.set_simulation(SimulationOutcome {
            units_consumed: Some(50_000),
            err: None,
            logs: vec![],
        });
        ledger.set_prioritization_fees(vec![2_000, 4_000]);

        let estimator = ResourceEstimator::new(ledger.clone(), BudgetConfig::default());
        let budget = estimator
            .estimate(&[purchase_ix(&payer)], &payer, &[])
            .await
            .unwrap();

        assert_eq!(budget.compute_unit_limit, 55_000);
        assert_eq!(budget.compute_unit_price, 3_000);
        assert_eq!(budget.compute_source, EstimateSource::Measured);

        // The dry run carried the ledger's maximum ceiling ahead of the domain instruction
        let simulated = ledger.simulated_transactions();
        assert_eq!(simulated.len(), 1);
        assert_eq!(simulated[0].message.instructions().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_simulation_and_empty_fees_fall_back() {
        let payer = Pubkey::new_unique();
        let ledger = Arc::new(MockLedger::new());
        ledger.set_simulation(SimulationOutcome {
            units_consumed: Some(1_200),
            err: Some("SignatureFailure".to_string()),
            logs: vec![],
        });
        ledger.set_prioritization_fees(vec![]);

        let config = BudgetConfig::default();
        let estimator = ResourceEstimator::new(ledger, config.clone());
        let budget = estimator
            .estimate(&[purchase_ix(&payer)], &payer, &[])
            .await
            .unwrap();

        assert_eq!(budget.compute_unit_limit, config.fallback_compute_units);
        assert_eq!(budget.compute_unit_price, config.priority_fee_floor);
        assert_eq!(budget.fee_source, EstimateSource::Fallback);
    }

    #[tokio::test]
    async fn test_timeout_degrades_but_transport_propagates() {
        let payer = Pubkey::new_unique();
        let ledger = Arc::new(MockLedger::new());
        ledger.fail_simulation(RpcManagerError::Timeout {
            endpoint: "mock".to_string(),
            operation: "simulate",
            timeout_ms: 10,
        });
        let estimator = ResourceEstimator::new(ledger.clone(), BudgetConfig::default());
        let budget = estimator
            .estimate(&[purchase_ix(&payer)], &payer, &[])
            .await
            .unwrap();
        assert_eq!(budget.compute_source, EstimateSource::Fallback);

        ledger.fail_simulation(RpcManagerError::Transport {
            endpoint: "mock".to_string(),
            message: "connection refused".to_string(),
        });
        let err = estimator
            .estimate(&[purchase_ix(&payer)], &payer, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, TransactionBuilderError::Rpc(_)));
    }

    #[tokio::test]
    async fn test_fee_window_is_ledger_wide() {
        let payer = Pubkey::new_unique();
        let ledger = Arc::new(MockLedger::new());
        ledger.set_prioritization_fees(vec![5_000]);
        let estimator = ResourceEstimator::new(ledger.clone(), BudgetConfig::default());

        estimator
            .estimate(&[purchase_ix(&payer), purchase_ix(&payer)], &payer, &[])
            .await
            .unwrap();

        let requests = ledger.fee_sample_requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].is_empty());
    }
}
