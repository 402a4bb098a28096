//! Configuration for Depot startup.
//!
//! The file lives at `$DEPOT_CONFIG` or `~/.depot/config.toml`. A missing file
//! is not an error: every setting has a default. String values may reference
//! environment variables as `${NAME}`.
//!
//! ```toml
//! [startup]
//! smooth_progress = true
//! reference_data_ttl_secs = 300
//!
//! [startup.phases.validate]
//! timeout_secs = 30
//!
//! [startup.phases.preload-reference-data]
//! critical = false
//!
//! [validation]
//! check_timeout_secs = 10
//! required_settings = ["database.connection_string", "fleet.depot_name"]
//!
//! [database]
//! connection_string = "${DEPOT_DATABASE_URL}"
//!
//! [license]
//! key = "${DEPOT_LICENSE_KEY}"
//! ```

mod provider;

pub use provider::{ConfigProvider, MapConfig, env_override_name};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "DEPOT_CONFIG";

const DEFAULT_REFERENCE_DATA_TTL_SECS: u64 = 300;
const DEFAULT_PROGRESS_STEP: u8 = 2;
const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 15;

#[derive(Default, Deserialize)]
pub struct DepotConfig {
    #[serde(default)]
    pub startup: StartupConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    pub database: Option<DatabaseConfig>,
    pub license: Option<LicenseConfig>,
    /// Raw document, kept for dotted-key lookups through [`ConfigProvider`].
    #[serde(skip)]
    raw: toml::Table,
}

// The raw document may hold literal secrets, so it is left out.
impl std::fmt::Debug for DepotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepotConfig")
            .field("startup", &self.startup)
            .field("validation", &self.validation)
            .field("database", &self.database)
            .field("license", &self.license)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// `[startup]`: progress presentation, reference-data TTL and per-phase
/// overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct StartupConfig {
    /// Interpolate progress between phase boundaries instead of jumping.
    #[serde(default)]
    pub smooth_progress: bool,
    #[serde(default = "default_progress_step")]
    pub progress_step: u8,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    #[serde(default = "default_reference_data_ttl_secs")]
    pub reference_data_ttl_secs: u64,
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseConfig>,
}

const fn default_progress_step() -> u8 {
    DEFAULT_PROGRESS_STEP
}

const fn default_progress_interval_ms() -> u64 {
    DEFAULT_PROGRESS_INTERVAL_MS
}

const fn default_reference_data_ttl_secs() -> u64 {
    DEFAULT_REFERENCE_DATA_TTL_SECS
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            smooth_progress: false,
            progress_step: DEFAULT_PROGRESS_STEP,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            reference_data_ttl_secs: DEFAULT_REFERENCE_DATA_TTL_SECS,
            phases: BTreeMap::new(),
        }
    }
}

impl StartupConfig {
    #[must_use]
    pub fn reference_data_ttl(&self) -> Duration {
        Duration::from_secs(self.reference_data_ttl_secs)
    }

    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    #[must_use]
    pub fn phase(&self, name: &str) -> Option<&PhaseConfig> {
        self.phases.get(name)
    }
}

/// `[startup.phases.<name>]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhaseConfig {
    pub timeout_secs: Option<u64>,
    /// Overrides the phase's built-in criticality.
    pub critical: Option<bool>,
}

impl PhaseConfig {
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// `[validation]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidationConfig {
    /// Per-check deadline. Checks that exceed it fail.
    pub check_timeout_secs: Option<u64>,
    /// Dotted keys that must resolve to a non-blank value.
    #[serde(default)]
    pub required_settings: Vec<String>,
}

impl ValidationConfig {
    #[must_use]
    pub fn check_timeout(&self) -> Option<Duration> {
        self.check_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Default, Deserialize)]
pub struct DatabaseConfig {
    pub connection_string: Option<String>,
}

// Connection strings routinely carry passwords.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("connection_string", &mask(self.connection_string.as_ref()))
            .finish()
    }
}

#[derive(Default, Deserialize)]
pub struct LicenseConfig {
    pub key: Option<String>,
}

impl std::fmt::Debug for LicenseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseConfig")
            .field("key", &mask(self.key.as_ref()))
            .finish()
    }
}

fn mask(opt: Option<&String>) -> &'static str {
    if opt.is_some() { "[REDACTED]" } else { "None" }
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let var = &after[..close];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

impl DepotConfig {
    /// Load from the default location. `Ok(None)` when there is no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {}: {err}", path.display());
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        Self::parse(&content).map_err(|err| {
            tracing::warn!("Failed to parse config at {}: {err}", path.display());
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    /// Parse a TOML document. Environment references in string values are
    /// expanded before deserialization.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let raw: toml::Table = toml::from_str(content)?;
        let mut expanded = raw.clone();
        expand_table(&mut expanded);
        let mut config: Self = toml::Value::Table(expanded).try_into()?;
        config.raw = raw;
        Ok(config)
    }

    /// Phase timeout from `[startup.phases.<name>]`.
    #[must_use]
    pub fn phase_timeout(&self, name: &str) -> Option<Duration> {
        self.startup.phase(name).and_then(PhaseConfig::timeout)
    }

    #[must_use]
    pub fn phase_critical(&self, name: &str) -> Option<bool> {
        self.startup.phase(name).and_then(|phase| phase.critical)
    }

    fn lookup(&self, key: &str) -> Option<&toml::Value> {
        let mut parts = key.split('.');
        let mut value = self.raw.get(parts.next()?)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }
        Some(value)
    }
}

impl ConfigProvider for DepotConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.get_raw(key).map(|value| expand_env_vars(&value))
    }

    /// `DEPOT_<KEY>` in the environment wins over the file.
    fn get_raw(&self, key: &str) -> Option<String> {
        if let Ok(value) = env::var(env_override_name(key)) {
            return Some(value);
        }
        match self.lookup(key)? {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Table(_) | toml::Value::Array(_) => None,
            other => Some(other.to_string()),
        }
    }
}

fn expand_table(table: &mut toml::Table) {
    for (_, value) in table.iter_mut() {
        expand_value(value);
    }
}

fn expand_value(value: &mut toml::Value) {
    match value {
        toml::Value::String(s) if s.contains("${") => *s = expand_env_vars(s),
        toml::Value::Table(table) => expand_table(table),
        toml::Value::Array(items) => items.iter_mut().for_each(expand_value),
        _ => {}
    }
}

pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".depot").join("config.toml"))
}
