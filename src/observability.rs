//! Request correlation and tracing setup

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Correlation ID for tracking one request across components
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Trace identifiers for one operation and its children.
///
/// A relay request opens a root context; assembly and submission open child
/// spans that share its `trace_id` and `correlation_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub correlation_id: CorrelationId,
    pub parent_span_id: Option<String>,
    pub operation: String,
    /// Creation time, Unix seconds
    pub timestamp: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl TraceContext {
    pub fn new(operation: &str) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            span_id: Uuid::new_v4().to_string(),
            correlation_id: CorrelationId::new(),
            parent_span_id: None,
            operation: operation.to_string(),
            timestamp: unix_now(),
        }
    }

    /// Root context reusing a caller-supplied correlation id (for example
    /// an `x-request-id` header)
    pub fn with_correlation_id(operation: &str, correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            ..Self::new(operation)
        }
    }

    pub fn child_span(&self, operation: &str) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: Uuid::new_v4().to_string(),
            correlation_id: self.correlation_id.clone(),
            parent_span_id: Some(self.span_id.clone()),
            operation: operation.to_string(),
            timestamp: unix_now(),
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new("default")
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing(verbose: bool, json: bool) -> anyhow::Result<()> {
    let default_filter = if verbose {
        "splurge_gateway=debug,splurge_relay=debug,tower_http=debug,info"
    } else {
        "splurge_gateway=info,splurge_relay=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_span_shares_trace() {
        let root = TraceContext::new("relay");
        let child = root.child_span("submit");

        assert_eq!(child.trace_id(), root.trace_id());
        assert_eq!(child.correlation_id(), root.correlation_id());
        assert_eq!(child.parent_span_id.as_deref(), Some(root.span_id()));
        assert_ne!(child.span_id(), root.span_id());
    }

    #[test]
    fn test_supplied_correlation_id_is_kept() {
        let ctx = TraceContext::with_correlation_id("relay", "req-42".into());
        assert_eq!(ctx.correlation_id().as_str(), "req-42");
        assert_eq!(ctx.operation, "relay");
        assert!(ctx.timestamp > 0);
    }
}
