use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Top-level flowrun configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub flows: FlowsConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Provider name → secret. Values may use `${ENV_VAR}`.
    #[serde(default)]
    pub credentials: HashMap<String, String>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Known provider names, matched case-insensitively.
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
        }
    }
}

fn default_providers() -> Vec<String> {
    ["openai", "anthropic", "gemini", "groq", "ollama"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Which signaler answers status pulls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryBackend {
    /// File-backed; survives restarts.
    #[default]
    Durable,
    /// Hub-backed in-memory map; lost on restart.
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Directory holding one status file per flow.
    #[serde(default = "default_status_dir")]
    pub dir: String,
    #[serde(default)]
    pub query_backend: QueryBackend,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            dir: default_status_dir(),
            query_backend: QueryBackend::default(),
        }
    }
}

fn default_status_dir() -> String {
    ".flowrun/status".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Bounded outbound queue length per observer.
    #[serde(default = "default_observer_queue")]
    pub observer_queue: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            observer_queue: default_observer_queue(),
        }
    }
}

fn default_observer_queue() -> usize {
    crate::hub::DEFAULT_QUEUE_CAPACITY
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowsConfig {
    #[serde(default = "default_flows_dir")]
    pub dir: String,
}

impl Default for FlowsConfig {
    fn default() -> Self {
        Self {
            dir: default_flows_dir(),
        }
    }
}

fn default_flows_dir() -> String {
    ".flowrun/flows".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

fn default_ledger_path() -> String {
    ".flowrun/ledger.jsonl".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// HTTP endpoint of the generation service.
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,
    /// Request timeout. The only timeout applied to a node run.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_endpoint() -> String {
    "http://127.0.0.1:8080/v1/generate".to_string()
}

fn default_generation_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:18790".to_string()
}

/// JSONL lifecycle journal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_journal_dir")]
    pub dir: String,
    /// 1 = flow-level kinds, 2 = + node kinds, 3 = + FLOW_STATUS.
    #[serde(default = "default_journal_level")]
    pub level: u8,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_journal_dir(),
            level: default_journal_level(),
        }
    }
}

fn default_journal_dir() -> String {
    ".flowrun/journal".to_string()
}

fn default_journal_level() -> u8 {
    2
}

impl AppConfig {
    /// Load config from a TOML file.
    ///
    /// `${VAR}` references are replaced with the variable's value before
    /// parsing. A reference to an unset variable is left in the text as
    /// written, so a credential such as `openai = "${OPENAI_API_KEY}"` stays
    /// a placeholder and the credential store reports it as absent.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|_| FlowError::ConfigNotFound(path.display().to_string()))?;
        toml::from_str(&expand_env_vars(&raw))
            .map_err(|e| FlowError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn status_dir(&self) -> PathBuf {
        expand_home(&self.status.dir)
    }

    pub fn flows_dir(&self) -> PathBuf {
        expand_home(&self.flows.dir)
    }

    pub fn ledger_path(&self) -> PathBuf {
        expand_home(&self.ledger.path)
    }

    pub fn journal_dir(&self) -> PathBuf {
        expand_home(&self.journal.dir)
    }
}

/// Expand a leading `~/` to `$HOME`. Other paths are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Substitute `${VAR}` references. Unset variables and an unterminated `${`
/// are copied through unchanged.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let reference = &rest[open..open + 2 + close + 1];
        match std::env::var(&after[..close]) {
            Ok(value) => out.push_str(&value),
            Err(_) => out.push_str(reference),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}
