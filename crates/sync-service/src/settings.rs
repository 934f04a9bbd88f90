//! Service Configuration
//!
//! Layered loading: an optional TOML file, then `SYNC_`-prefixed
//! environment variables. Rule sets are validated into typed structs
//! here, once, so the evaluation paths never re-check shapes.

use config::{Config, Environment, File};
use fault_sync::{ComplaintMapping, JobSettings, WinnerPolicy};
use rule_engine::RuleConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub name: String,
    /// Seconds between scheduled runs.
    pub interval_secs: u64,
    pub dry_run: bool,
    pub log_level: String,
    /// Prometheus exporter listen address; disabled when unset.
    pub metrics_addr: Option<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "streetlight-fault-sync".to_string(),
            interval_secs: 300,
            dry_run: false,
            log_level: "info".to_string(),
            metrics_addr: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Telemetry source database.
    pub source_url: String,
    /// Incident/checkpoint target database.
    pub target_url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            source_url: "sqlite://data/telemetry.db".to_string(),
            target_url: "sqlite://data/incidents.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Distinguishes checkpoints of deployments sharing a target store.
    pub client_id: String,
    pub lookback_hours: u32,
    pub lease_ttl_secs: u64,
    pub winner_policy: WinnerPolicy,
    pub closed_statuses: Vec<String>,
    /// Debounce state file, shared across runs.
    pub debounce_path: String,
    pub comm_tag: String,
    pub power_tag: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            client_id: "default".to_string(),
            lookback_hours: 24,
            lease_ttl_secs: 1800,
            winner_policy: WinnerPolicy::default(),
            closed_statuses: vec![
                "CLOSED".to_string(),
                "RESOLVED".to_string(),
                "REJECTED".to_string(),
            ],
            debounce_path: "data/fault_state.json".to_string(),
            comm_tag: "Tag8".to_string(),
            power_tag: "Tag16".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub service: ServiceSettings,
    pub database: DatabaseSettings,
    pub sync: SyncSettings,
    pub rules: RuleConfig,
    pub mapping: ComplaintMapping,
}

impl ServiceConfig {
    /// Loads configuration. An explicit path must exist; the default
    /// `sync-config.toml` is optional so the service can start on
    /// defaults plus environment variables.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let file = match path {
            Some(p) => File::with_name(p).required(true),
            None => File::with_name("sync-config").required(false),
        };
        let cfg = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("SYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            run_key: format!("fault-sync-{}", self.sync.client_id),
            lookback_hours: self.sync.lookback_hours,
            closed_statuses: self.sync.closed_statuses.clone(),
            winner_policy: self.sync.winner_policy,
            dry_run: self.service.dry_run,
        }
    }
}
