//! Configuration loading for the gateway and the relay binary
//!
//! Settings come from a TOML file. Secrets and endpoints can be overridden
//! from the environment (a `.env` file is honoured):
//! `SPLURGE_RPC_URL`, `SPLURGE_ADMIN_KEYPAIR`, `SPLURGE_BIND_ADDR`,
//! `SPLURGE_PROGRAM_ID`.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::constants::{
    DEFAULT_ALLOWED_INSTRUCTIONS, DEFAULT_PROGRAM_ID, DEFAULT_TASK_QUEUE_PROGRAM_ID,
};
use crate::instructions::KNOWN_INSTRUCTIONS;
use crate::relay::{InstructionWhitelist, RelaySettings};
use crate::rpc_manager::LedgerEndpointConfig;
use crate::task_queue::TaskQueueLayout;
use crate::tx_builder::BudgetConfig;
use crate::wallet::AuthorityKeypair;

pub const ENV_RPC_URL: &str = "SPLURGE_RPC_URL";
/// JSON byte array of the admin keypair; takes precedence over the path
pub const ENV_ADMIN_KEYPAIR: &str = "SPLURGE_ADMIN_KEYPAIR";
pub const ENV_BIND_ADDR: &str = "SPLURGE_BIND_ADDR";
pub const ENV_PROGRAM_ID: &str = "SPLURGE_PROGRAM_ID";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerEndpointConfig,

    #[serde(default)]
    pub program: ProgramConfig,

    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Marketplace program id (base58)
    #[serde(default = "default_program_id")]
    pub program_id: String,

    /// Scheduled-execution program id (base58)
    #[serde(default = "default_task_queue_program_id")]
    pub task_queue_program_id: String,

    /// Queue used when shipping orders
    #[serde(default)]
    pub task_queue: Option<String>,

    /// Address lookup tables passed to every assembly
    #[serde(default)]
    pub lookup_tables: Vec<String>,

    #[serde(default)]
    pub task_queue_layout: TaskQueueLayout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Instruction names that may receive the admin co-signature
    #[serde(default = "default_allowed_instructions")]
    pub allowed_instructions: Vec<String>,

    /// Path to the admin keypair file
    #[serde(default)]
    pub admin_keypair_path: Option<String>,

    #[serde(flatten)]
    pub settings: RelaySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Serve Prometheus metrics at `/metrics`
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    #[serde(default)]
    pub json_logs: bool,
}

fn default_program_id() -> String {
    DEFAULT_PROGRAM_ID.to_string()
}
fn default_task_queue_program_id() -> String {
    DEFAULT_TASK_QUEUE_PROGRAM_ID.to_string()
}
fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_allowed_instructions() -> Vec<String> {
    DEFAULT_ALLOWED_INSTRUCTIONS
        .iter()
        .map(|name| name.to_string())
        .collect()
}
fn default_true() -> bool {
    true
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            program_id: default_program_id(),
            task_queue_program_id: default_task_queue_program_id(),
            task_queue: None,
            lookup_tables: Vec::new(),
            task_queue_layout: TaskQueueLayout::default(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            allowed_instructions: default_allowed_instructions(),
            admin_keypair_path: None,
            settings: RelaySettings::default(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            json_logs: false,
        }
    }
}

fn parse_pubkey(field: &str, value: &str) -> Result<Pubkey> {
    Pubkey::from_str(value.trim()).map_err(|e| anyhow!("Invalid {field} '{value}': {e}"))
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load a TOML file, apply environment overrides, then validate
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay values returned by `lookup` for the `SPLURGE_*` keys
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_RPC_URL) {
            debug!("RPC URL overridden from environment");
            self.ledger.rpc_url = url;
        }
        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            self.relay.bind_addr = addr;
        }
        if let Some(program) = lookup(ENV_PROGRAM_ID) {
            self.program.program_id = program;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.ledger.validate()?;
        self.budget.validate()?;

        self.program_id()?;
        self.task_queue_program_id()?;
        self.task_queue()?;
        self.lookup_tables()?;
        self.bind_addr()?;

        if self.relay.allowed_instructions.is_empty() {
            return Err(anyhow!("relay.allowed_instructions must not be empty"));
        }
        for name in &self.relay.allowed_instructions {
            if !KNOWN_INSTRUCTIONS.contains(&name.as_str()) {
                return Err(anyhow!(
                    "relay.allowed_instructions contains unknown instruction '{name}'"
                ));
            }
            if !DEFAULT_ALLOWED_INSTRUCTIONS.contains(&name.as_str()) {
                return Err(anyhow!(
                    "relay.allowed_instructions: '{name}' may not be co-signed by the relay"
                ));
            }
        }

        let settings = &self.relay.settings;
        if settings.retry.max_attempts == 0 {
            return Err(anyhow!("relay.retry.max_attempts must be > 0"));
        }
        if settings.confirmation_timeout_ms == 0 {
            return Err(anyhow!("relay.confirmation_timeout_ms must be > 0"));
        }
        if settings.poll_interval_ms == 0 {
            return Err(anyhow!("relay.poll_interval_ms must be > 0"));
        }
        Ok(())
    }

    pub fn program_id(&self) -> Result<Pubkey> {
        parse_pubkey("program.program_id", &self.program.program_id)
    }

    pub fn task_queue_program_id(&self) -> Result<Pubkey> {
        parse_pubkey(
            "program.task_queue_program_id",
            &self.program.task_queue_program_id,
        )
    }

    pub fn task_queue(&self) -> Result<Option<Pubkey>> {
        self.program
            .task_queue
            .as_deref()
            .map(|queue| parse_pubkey("program.task_queue", queue))
            .transpose()
    }

    pub fn lookup_tables(&self) -> Result<Vec<Pubkey>> {
        self.program
            .lookup_tables
            .iter()
            .map(|table| parse_pubkey("program.lookup_tables", table))
            .collect()
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.relay
            .bind_addr
            .parse()
            .map_err(|e| anyhow!("Invalid relay.bind_addr '{}': {e}", self.relay.bind_addr))
    }

    pub fn whitelist(&self) -> Result<InstructionWhitelist> {
        Ok(InstructionWhitelist::new(
            self.program_id()?,
            self.relay.allowed_instructions.iter().cloned(),
        ))
    }

    /// Admin key from `SPLURGE_ADMIN_KEYPAIR` if set, else from the
    /// configured path
    pub fn load_authority(&self) -> Result<AuthorityKeypair> {
        if std::env::var_os(ENV_ADMIN_KEYPAIR).is_some() {
            return AuthorityKeypair::from_json_env(ENV_ADMIN_KEYPAIR);
        }
        let path = self.relay.admin_keypair_path.as_deref().ok_or_else(|| {
            anyhow!("no admin key: set relay.admin_keypair_path or {ENV_ADMIN_KEYPAIR}")
        })?;
        AuthorityKeypair::from_file(path)
    }
}
