//! Layered runtime configuration: a config file, then `CONTINUITY_`
//! environment variables, then explicit CLI overrides, each taking
//! priority over the last. Resolved once per process invocation; never
//! part of the persisted state document.
//!
//! # Example
//!
//! ```
//! use sentinel_config::{resolve, ConfigOverrides};
//! use std::path::Path;
//!
//! let config = resolve(Path::new("."), &ConfigOverrides::default()).expect("resolve config");
//! println!("state dir: {}", config.state_dir.display());
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "sentinel.toml";
pub const ENV_PREFIX: &str = "CONTINUITY_";

/// Resolved configuration a process actually runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub state_dir: PathBuf,
    pub policy_dir: PathBuf,
    pub lock_timeout: Duration,
    pub adapter_timeout: Duration,
    pub mock_mode: bool,
    pub log_verbosity: LogVerbosity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("./state"),
            policy_dir: PathBuf::from("./policy"),
            lock_timeout: Duration::from_secs(30),
            adapter_timeout: Duration::from_secs(10),
            mock_mode: false,
            log_verbosity: LogVerbosity::Normal,
        }
    }
}

/// CLI verbosity, one level per flag occurrence (`-v`, `-vv`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogVerbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Debug,
}

impl std::str::FromStr for LogVerbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quiet" => Ok(Self::Quiet),
            "normal" => Ok(Self::Normal),
            "verbose" => Ok(Self::Verbose),
            "debug" => Ok(Self::Debug),
            other => Err(format!("unknown log verbosity `{other}`")),
        }
    }
}

/// On-disk / on-the-wire shape of `sentinel.toml`. Every field is
/// optional so a file only needs to name what it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_verbosity: Option<LogVerbosity>,
}

/// Explicit CLI-flag overrides, highest priority layer.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub state_dir: Option<PathBuf>,
    pub policy_dir: Option<PathBuf>,
    pub lock_timeout_secs: Option<u64>,
    pub adapter_timeout_secs: Option<u64>,
    pub mock_mode: Option<bool>,
    pub log_verbosity: Option<LogVerbosity>,
}

/// Read `sentinel.toml` from `dir` if present; `Ok(None)` if it's
/// simply absent.
pub fn load_file(dir: &Path) -> Result<Option<ConfigFile>> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let file: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    Ok(Some(file))
}

/// Read `CONTINUITY_*` overrides from the process environment.
fn env_overrides() -> ConfigFile {
    ConfigFile {
        state_dir: std::env::var(format!("{ENV_PREFIX}STATE_DIR")).ok().map(PathBuf::from),
        policy_dir: std::env::var(format!("{ENV_PREFIX}POLICY_DIR")).ok().map(PathBuf::from),
        lock_timeout_secs: std::env::var(format!("{ENV_PREFIX}LOCK_TIMEOUT_SECS"))
            .ok()
            .and_then(|v| v.parse().ok()),
        adapter_timeout_secs: std::env::var(format!("{ENV_PREFIX}ADAPTER_TIMEOUT_SECS"))
            .ok()
            .and_then(|v| v.parse().ok()),
        mock_mode: std::env::var(format!("{ENV_PREFIX}MOCK_MODE")).ok().and_then(|v| v.parse().ok()),
        log_verbosity: std::env::var(format!("{ENV_PREFIX}LOG_VERBOSITY"))
            .ok()
            .and_then(|v| v.parse().ok()),
    }
}

/// Resolve the final `Config` for `dir`: file, then environment, then
/// `overrides`, falling back to [`Config::default`] for anything none
/// of the three layers named.
pub fn resolve(dir: &Path, overrides: &ConfigOverrides) -> Result<Config> {
    let file = load_file(dir)?.unwrap_or_default();
    let env = env_overrides();
    let defaults = Config::default();

    Ok(Config {
        state_dir: overrides
            .state_dir
            .clone()
            .or(env.state_dir)
            .or(file.state_dir)
            .unwrap_or(defaults.state_dir),
        policy_dir: overrides
            .policy_dir
            .clone()
            .or(env.policy_dir)
            .or(file.policy_dir)
            .unwrap_or(defaults.policy_dir),
        lock_timeout: Duration::from_secs(
            overrides
                .lock_timeout_secs
                .or(env.lock_timeout_secs)
                .or(file.lock_timeout_secs)
                .unwrap_or(defaults.lock_timeout.as_secs()),
        ),
        adapter_timeout: Duration::from_secs(
            overrides
                .adapter_timeout_secs
                .or(env.adapter_timeout_secs)
                .or(file.adapter_timeout_secs)
                .unwrap_or(defaults.adapter_timeout.as_secs()),
        ),
        mock_mode: overrides.mock_mode.or(env.mock_mode).or(file.mock_mode).unwrap_or(defaults.mock_mode),
        log_verbosity: overrides
            .log_verbosity
            .or(env.log_verbosity)
            .or(file.log_verbosity)
            .unwrap_or(defaults.log_verbosity),
    })
}
