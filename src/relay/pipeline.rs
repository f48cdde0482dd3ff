//! Permissioned relay: validate, co-sign, submit, confirm
//!
//! Validation is pure and happens once. Only submission is retried, and only
//! on transport failures; whatever the ledger answers is passed back as is.

use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

use crate::compat::count_present_signatures;
use crate::metrics::{metrics, Timer};
use crate::observability::TraceContext;
use crate::relay::envelope::{CoSigned, Received, RelayStage, Submitted};
use crate::relay::errors::{RejectReason, RelayError};
use crate::relay::validator::InstructionWhitelist;
use crate::rpc_manager::{
    retry_with_backoff, LedgerClient, RetryConfig, RpcManagerError, SignatureOutcome,
};
use crate::wallet::AuthorityKeypair;

/// Submission and confirmation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default)]
    pub retry: RetryConfig,

    /// Wait for confirmation before answering
    #[serde(default = "default_await_confirmation")]
    pub await_confirmation: bool,

    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_await_confirmation() -> bool {
    true
}

fn default_confirmation_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            await_confirmation: default_await_confirmation(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// The ledger reports a resubmission of a landed transaction this way
fn is_already_processed(err: &RpcManagerError) -> bool {
    err.ledger_text()
        .map(|text| text.contains("already been processed"))
        .unwrap_or(false)
}

/// Co-signs whitelisted envelopes with the privileged authority
#[derive(Clone)]
pub struct PermissionedRelay {
    ledger: Arc<dyn LedgerClient>,
    whitelist: InstructionWhitelist,
    authority: AuthorityKeypair,
    settings: RelaySettings,
}

impl PermissionedRelay {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        whitelist: InstructionWhitelist,
        authority: AuthorityKeypair,
        settings: RelaySettings,
    ) -> Self {
        Self {
            ledger,
            whitelist,
            authority,
            settings,
        }
    }

    pub fn authority(&self) -> Pubkey {
        self.authority.pubkey()
    }

    pub fn whitelist(&self) -> &InstructionWhitelist {
        &self.whitelist
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Received through CoSigned. No network access.
    pub fn prepare(&self, received: Received) -> Result<CoSigned, RelayError> {
        debug!(stage = RelayStage::Received.as_str(), bytes = received.len());

        let decoded = received.decode()?;
        debug!(
            stage = RelayStage::Decoded.as_str(),
            fee_payer = ?decoded.fee_payer(),
            signatures = count_present_signatures(decoded.transaction()),
        );

        let validated = decoded.validate(&self.whitelist, &self.authority.pubkey())?;
        debug!(
            stage = RelayStage::Validated.as_str(),
            instructions = ?validated.matched(),
        );

        let co_signed = validated.co_sign(&self.authority)?;
        debug!(
            stage = RelayStage::CoSigned.as_str(),
            instructions = ?co_signed.matched(),
            signatures = count_present_signatures(co_signed.transaction()),
            "Envelope co-signed"
        );
        metrics().relay_cosigned_total.inc();
        Ok(co_signed)
    }

    /// Send a co-signed envelope, retrying transport failures with backoff,
    /// then wait for confirmation if configured.
    pub async fn submit(&self, co_signed: CoSigned) -> Result<Submitted, RelayError> {
        let signature = co_signed.signature();
        let tx = co_signed.transaction();

        let sent = retry_with_backoff("send_transaction", &self.settings.retry, |attempt| {
            if attempt > 0 {
                metrics().submission_retries_total.inc();
            }
            self.ledger.send_transaction(tx)
        })
        .await;

        let signature = match sent {
            Ok(sig) => sig,
            Err(err) if is_already_processed(&err) => {
                debug!(signature = %signature, "Transaction already processed by an earlier attempt");
                signature
            }
            Err(err) => {
                let err = RelayError::from_submission(err, signature);
                self.record_outcome(&err);
                return Err(err);
            }
        };

        if !self.settings.await_confirmation {
            metrics()
                .relay_submissions_total
                .with_label_values(&["sent"])
                .inc();
            return Ok(co_signed.into_submitted(signature, false));
        }

        match self.await_confirmation(&signature).await {
            Ok(()) => {
                metrics()
                    .relay_submissions_total
                    .with_label_values(&["confirmed"])
                    .inc();
                Ok(co_signed.into_submitted(signature, true))
            }
            Err(err) => {
                self.record_outcome(&err);
                Err(err)
            }
        }
    }

    /// Poll until confirmed, failed, or the confirmation timeout elapses.
    async fn await_confirmation(&self, signature: &Signature) -> Result<(), RelayError> {
        let deadline = Duration::from_millis(self.settings.confirmation_timeout_ms);
        let poll = Duration::from_millis(self.settings.poll_interval_ms.max(1));

        let polled = tokio::time::timeout(deadline, async {
            let mut interval = tokio::time::interval(poll);
            loop {
                interval.tick().await;
                match self.ledger.signature_status(signature).await {
                    Ok(SignatureOutcome::Confirmed) => return Ok(()),
                    Ok(SignatureOutcome::Failed(reason)) => {
                        return Err(RelayError::ExecutionFailed {
                            signature: *signature,
                            reason,
                        })
                    }
                    Ok(SignatureOutcome::Pending) => {}
                    Err(err) => {
                        debug!(signature = %signature, error = %err, "Status poll failed");
                    }
                }
            }
        })
        .await;

        match polled {
            Ok(result) => result,
            Err(_) => Err(RelayError::SubmissionUnknown {
                signature: Some(*signature),
                reason: format!(
                    "not confirmed within {}ms",
                    self.settings.confirmation_timeout_ms
                ),
            }),
        }
    }

    /// Full pipeline for one base64 envelope.
    pub async fn relay_base64(
        &self,
        encoded: &str,
        trace: &TraceContext,
    ) -> Result<Submitted, RelayError> {
        let span = tracing::info_span!(
            "relay",
            correlation_id = %trace.correlation_id(),
            trace_id = %trace.trace_id(),
            span_id = %trace.span_id(),
        );
        self.relay_inner(encoded, trace).instrument(span).await
    }

    async fn relay_inner(
        &self,
        encoded: &str,
        trace: &TraceContext,
    ) -> Result<Submitted, RelayError> {
        let timer = Timer::start();
        metrics().relay_requests_total.inc();

        let prepared = Received::from_base64(encoded)
            .map_err(RelayError::from)
            .and_then(|received| self.prepare(received));
        let co_signed = match prepared {
            Ok(co_signed) => co_signed,
            Err(err) => {
                if let RelayError::Rejected(reason) = &err {
                    self.record_rejection(reason);
                } else {
                    warn!(error = %err, "Co-signing failed");
                }
                timer.observe_duration(&metrics().relay_latency);
                return Err(err);
            }
        };

        let submission = trace.child_span("submit");
        let span = tracing::debug_span!(
            "submit",
            span_id = %submission.span_id(),
            parent_span_id = ?submission.parent_span_id,
        );
        let result = self.submit(co_signed).instrument(span).await;
        timer.observe_duration(&metrics().relay_latency);
        match &result {
            Ok(submitted) => info!(
                stage = RelayStage::Submitted.as_str(),
                signature = %submitted.signature,
                confirmed = submitted.confirmed,
                instructions = ?submitted.matched,
                "Permissioned transaction submitted"
            ),
            Err(err) => warn!(
                category = err.category(),
                error = %err,
                "Permissioned transaction not landed"
            ),
        }
        result
    }

    fn record_rejection(&self, reason: &RejectReason) {
        warn!(
            stage = RelayStage::Rejected.as_str(),
            reason = reason.category(),
            detail = %reason,
            "Envelope rejected"
        );
        metrics()
            .relay_rejections_total
            .with_label_values(&[reason.category()])
            .inc();
    }

    fn record_outcome(&self, err: &RelayError) {
        let outcome = match err {
            RelayError::Ledger(_) => "ledger_rejected",
            RelayError::ExecutionFailed { .. } => "execution_failed",
            RelayError::SubmissionUnknown { .. } => "unknown",
            _ => "error",
        };
        metrics()
            .relay_submissions_total
            .with_label_values(&[outcome])
            .inc();
    }
}
