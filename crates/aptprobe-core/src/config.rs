use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "APTPROBE_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Top-level configuration for aptprobe front-ends.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProbeConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Monitoring thresholds used by `aptprobe check`
    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which simulation the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpgradeMode {
    #[default]
    Upgrade,
    DistUpgrade,
}

impl UpgradeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            UpgradeMode::Upgrade => "upgrade",
            UpgradeMode::DistUpgrade => "dist-upgrade",
        }
    }
}

impl fmt::Display for UpgradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpgradeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upgrade" => Ok(UpgradeMode::Upgrade),
            "dist-upgrade" | "full-upgrade" => Ok(UpgradeMode::DistUpgrade),
            other => Err(ConfigError::ValidationError(format!(
                "Invalid upgrade mode: {}. Must be one of: upgrade, dist-upgrade",
                other
            ))),
        }
    }
}

/// Dependency engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Program used to run the upgrade simulation
    #[serde(default = "default_apt_get")]
    pub apt_get: String,

    /// Program used to load and dump the APT configuration
    #[serde(default = "default_apt_config")]
    pub apt_config: String,

    #[serde(default)]
    pub upgrade_mode: UpgradeMode,

    /// Root of the file system to inspect (becomes the `Dir` option)
    #[serde(default)]
    pub root_filesystem: Option<PathBuf>,

    /// Engine options applied before first use, e.g. `"APT::Default-Release" = "stable"`
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            apt_get: default_apt_get(),
            apt_config: default_apt_config(),
            upgrade_mode: UpgradeMode::default(),
            root_filesystem: None,
            options: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Options in the order they should reach the engine: `Dir` first so
    /// explicit options can still override it.
    pub fn engine_options(&self) -> Vec<(String, String)> {
        let mut options = Vec::with_capacity(self.options.len() + 1);
        if let Some(root) = &self.root_filesystem {
            options.push(("Dir".to_string(), root.display().to_string()));
        }
        options.extend(self.options.iter().map(|(k, v)| (k.clone(), v.clone())));
        options
    }
}

/// Thresholds in hours; `None` disables the corresponding level
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CheckConfig {
    #[serde(default)]
    pub update_warning_hours: Option<u64>,
    #[serde(default)]
    pub update_critical_hours: Option<u64>,
    #[serde(default)]
    pub reboot_warning_hours: Option<u64>,
    #[serde(default)]
    pub reboot_critical_hours: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// pretty, compact, json
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_apt_get() -> String {
    "apt-get".to_string()
}
fn default_apt_config() -> String {
    "apt-config".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Loads [`ProbeConfig`] with smart defaults.
pub struct ConfigManager {
    config: ProbeConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables
    /// 2. Config file (explicit path, `./.aptprobe.toml`, `~/.aptprobe/config.toml`)
    /// 3. Defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, config_path) = Self::load_config_file(explicit_path)?;
        Self::finish_load(config, config_path)
    }

    /// Like [`load`](Self::load), but never searches the working or home
    /// directory: only `explicit_path` is read, if given. For embedders
    /// whose working directory belongs to someone else.
    pub fn load_without_search(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, config_path) = match explicit_path {
            Some(path) => Self::load_config_file(Some(path))?,
            None => (ProbeConfig::default(), None),
        };
        Self::finish_load(config, config_path)
    }

    fn finish_load(
        config: ProbeConfig,
        config_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config)?;
        Self::validate_config(&config)?;

        match &config_path {
            Some(path) => info!("Loaded configuration from {}", path.display()),
            None => debug!("No config file found, using defaults"),
        }
        debug!(
            "Engine: apt-get={} apt-config={} mode={}",
            config.engine.apt_get, config.engine.apt_config, config.engine.upgrade_mode
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Wrap an already-built configuration after validating it.
    pub fn from_config(config: ProbeConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn load_config_file(
        explicit_path: Option<&Path>,
    ) -> Result<(ProbeConfig, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            let config = Self::read_toml_file(path)?;
            return Ok((config, Some(path.to_path_buf())));
        }

        let local_config = Path::new(".aptprobe.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aptprobe").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((ProbeConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<ProbeConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        Self::parse_toml(&content)
    }

    pub fn parse_toml(content: &str) -> Result<ProbeConfig, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(config: ProbeConfig) -> Result<ProbeConfig, ConfigError> {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(mut config: ProbeConfig, lookup: F) -> Result<ProbeConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(program) = lookup("APTPROBE_APT_GET") {
            config.engine.apt_get = program;
        }
        if let Some(program) = lookup("APTPROBE_APT_CONFIG") {
            config.engine.apt_config = program;
        }
        if let Some(mode) = lookup("APTPROBE_UPGRADE_MODE") {
            config.engine.upgrade_mode = mode.parse()?;
        }
        if let Some(root) = lookup("APTPROBE_ROOT") {
            config.engine.root_filesystem = Some(PathBuf::from(root));
        }
        if let Some(level) = lookup("APTPROBE_LOG_LEVEL").or_else(|| lookup("RUST_LOG")) {
            // RUST_LOG may be a full filter directive; only adopt plain levels
            if is_log_level(&level) {
                config.logging.level = level;
            }
        }
        Ok(config)
    }

    fn validate_config(config: &ProbeConfig) -> Result<(), ConfigError> {
        if config.engine.apt_get.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "engine.apt_get must not be empty".to_string(),
            ));
        }
        if config.engine.apt_config.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "engine.apt_config must not be empty".to_string(),
            ));
        }
        if config.engine.options.keys().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "engine.options contains an empty option name".to_string(),
            ));
        }

        if !is_log_level(&config.logging.level) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                config.logging.level
            )));
        }
        match config.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, compact, json",
                    other
                )))
            }
        }

        let check = &config.check;
        for (name, warning, critical) in [
            ("update", check.update_warning_hours, check.update_critical_hours),
            ("reboot", check.reboot_warning_hours, check.reboot_critical_hours),
        ] {
            if let (Some(warning), Some(critical)) = (warning, critical) {
                if critical < warning {
                    return Err(ConfigError::ValidationError(format!(
                        "{} critical threshold ({}h) is below the warning threshold ({}h)",
                        name, critical, warning
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ProbeConfig {
        &mut self.config
    }

    pub fn into_config(self) -> ProbeConfig {
        self.config
    }

    /// Path of the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn to_toml(config: &ProbeConfig) -> Result<String, ConfigError> {
        toml::to_string_pretty(config).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Write a default config file, creating parent directories.
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let toml_str = Self::to_toml(&ProbeConfig::default())?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

fn is_log_level(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}
