//! Simulator configuration types.
//!
//! - `SimConfig` - Main configuration loaded from `fab_sim.toml`
//! - `EquipmentConfig` - One simulated equipment instance
//! - `MonitorConfig` / `ViewerConfig` - Poller timing and viewer socket

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fab_common::config::{ConfigError, SharedConfig};
use fab_common::consts::{
    DEFAULT_BANK_SIZE, DEFAULT_MAX_BACKOFF_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SIM_INTERVAL_MS,
    DEFAULT_VIEWER_SOCKET,
};
use fab_common::layout::{LayoutError, RegisterLayout, builtin_layout};
use fab_monitor::PollerConfig;
use serde::{Deserialize, Serialize};

fn default_bank_size() -> usize {
    DEFAULT_BANK_SIZE
}

fn default_sim_interval_ms() -> u64 {
    DEFAULT_SIM_INTERVAL_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

fn default_socket_path() -> PathBuf {
    PathBuf::from(DEFAULT_VIEWER_SOCKET)
}

fn default_true() -> bool {
    true
}

/// Main configuration loaded from `fab_sim.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Service identity and log level.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Simulated equipment instances.
    #[serde(default)]
    pub equipment: Vec<EquipmentConfig>,

    /// Poller timing, shared by every instance.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Live viewer socket.
    #[serde(default)]
    pub viewer: ViewerConfig,
}

/// One simulated equipment instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EquipmentConfig {
    /// Instance name, unique within the file.
    pub name: String,

    /// Built-in layout id, e.g. `gas_cabinet/v1`.
    #[serde(default)]
    pub layout: Option<String>,

    /// Layout TOML file (relative to the config file's directory).
    #[serde(default)]
    pub layout_file: Option<PathBuf>,

    /// Register bank size in words.
    #[serde(default = "default_bank_size")]
    pub bank_size: usize,

    /// Simulator settings.
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Per-instance simulator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatorConfig {
    /// Period between generated states.
    #[serde(default = "default_sim_interval_ms")]
    pub update_interval_ms: u64,

    /// Fixed RNG seed. Random if omitted.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Poller timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Delay between successful poll cycles.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Ceiling for the backoff after failed cycles.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

/// Live viewer socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewerConfig {
    /// Serve the socket at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Unix socket path.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: DEFAULT_SIM_INTERVAL_MS,
            seed: None,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket_path: default_socket_path(),
        }
    }
}

impl MonitorConfig {
    /// Poller timing as durations.
    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

impl SimConfig {
    /// Single instance of a built-in layout with default settings.
    pub fn single(layout_id: &str) -> Self {
        let name = layout_id.replace('/', "-");
        Self {
            shared: SharedConfig::default(),
            equipment: vec![EquipmentConfig {
                name,
                layout: Some(layout_id.to_string()),
                layout_file: None,
                bank_size: DEFAULT_BANK_SIZE,
                simulator: SimulatorConfig::default(),
            }],
            monitor: MonitorConfig::default(),
            viewer: ViewerConfig::default(),
        }
    }

    /// Validate the simulator configuration.
    ///
    /// # Validation Rules
    /// 1. `[shared]` passes its own validation
    /// 2. At least one `[[equipment]]` entry
    /// 3. Equipment names are non-empty and unique
    /// 4. Exactly one of `layout` / `layout_file` per equipment
    /// 5. Built-in layout ids exist and fit in `bank_size`
    /// 6. All intervals > 0, `max_backoff_ms` >= `poll_interval_ms`
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.equipment.is_empty() {
            return Err(invalid("at least one [[equipment]] entry is required"));
        }

        let mut names = HashSet::new();
        for eq in &self.equipment {
            if eq.name.trim().is_empty() {
                return Err(invalid("equipment name cannot be empty"));
            }
            if !names.insert(eq.name.as_str()) {
                return Err(invalid(format!("duplicate equipment name '{}'", eq.name)));
            }
            match (&eq.layout, &eq.layout_file) {
                (Some(_), Some(_)) => {
                    return Err(invalid(format!(
                        "equipment '{}': set either layout or layout_file, not both",
                        eq.name
                    )));
                }
                (None, None) => {
                    return Err(invalid(format!(
                        "equipment '{}': layout or layout_file is required",
                        eq.name
                    )));
                }
                (Some(id), None) => {
                    let layout = builtin_layout(id)
                        .map_err(|e| invalid(format!("equipment '{}': {e}", eq.name)))?;
                    eq.check_bank(&layout)?;
                }
                (None, Some(_)) => {}
            }
            if eq.simulator.update_interval_ms == 0 {
                return Err(invalid(format!(
                    "equipment '{}': update_interval_ms must be greater than 0",
                    eq.name
                )));
            }
        }

        if self.monitor.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be greater than 0"));
        }
        if self.monitor.max_backoff_ms < self.monitor.poll_interval_ms {
            return Err(invalid(format!(
                "max_backoff_ms ({}) is below poll_interval_ms ({})",
                self.monitor.max_backoff_ms, self.monitor.poll_interval_ms
            )));
        }
        Ok(())
    }
}

impl EquipmentConfig {
    /// Resolve the layout, reading `layout_file` relative to `config_dir`.
    pub fn load_layout(&self, config_dir: &Path) -> Result<RegisterLayout, LayoutError> {
        match (&self.layout, &self.layout_file) {
            (Some(id), _) => builtin_layout(id),
            (None, Some(file)) => RegisterLayout::load(&config_dir.join(file)),
            (None, None) => Err(LayoutError::Parse(format!(
                "equipment '{}' names no layout",
                self.name
            ))),
        }
    }

    /// Whether the bank holds every word `layout` maps.
    pub fn check_bank(&self, layout: &RegisterLayout) -> Result<(), ConfigError> {
        if self.bank_size < layout.required_len() {
            return Err(invalid(format!(
                "equipment '{}': bank_size {} is smaller than layout {} ({} words)",
                self.name,
                self.bank_size,
                layout.id(),
                layout.required_len()
            )));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fab_common::config::ConfigLoader;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[shared]
log_level = "debug"
service_name = "fab-sim-test"

[[equipment]]
name = "gc-01"
layout = "gas_cabinet/v1"

[equipment.simulator]
update_interval_ms = 250
seed = 7

[[equipment]]
name = "st-01"
layout = "stocker/v1"
bank_size = 150

[monitor]
poll_interval_ms = 100
max_backoff_ms = 1600

[viewer]
socket_path = "/tmp/fab-test.sock"
"#;

    #[test]
    fn test_load_sample() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{SAMPLE}").unwrap();
        let config = SimConfig::load(file.path()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.equipment.len(), 2);
        assert_eq!(config.equipment[0].bank_size, DEFAULT_BANK_SIZE);
        assert_eq!(config.equipment[0].simulator.seed, Some(7));
        assert_eq!(
            config.equipment[1].simulator.update_interval_ms,
            DEFAULT_SIM_INTERVAL_MS
        );
        assert_eq!(
            config.monitor.poller().poll_interval,
            Duration::from_millis(100)
        );
        assert!(config.viewer.enabled);
    }

    fn base() -> SimConfig {
        SimConfig::parse(SAMPLE).unwrap()
    }

    fn rejected(config: &SimConfig) -> String {
        match config.validate() {
            Err(ConfigError::ValidationError(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config = base();
        config.equipment[1].name = "gc-01".to_string();
        assert!(rejected(&config).contains("duplicate"));
    }

    #[test]
    fn test_layout_source_must_be_exclusive() {
        let mut config = base();
        config.equipment[0].layout_file = Some(PathBuf::from("x.toml"));
        assert!(rejected(&config).contains("not both"));

        config.equipment[0].layout = None;
        config.equipment[0].layout_file = None;
        assert!(rejected(&config).contains("required"));
    }

    #[test]
    fn test_small_bank_rejected() {
        let mut config = base();
        config.equipment[1].bank_size = 100;
        assert!(rejected(&config).contains("bank_size"));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut config = base();
        config.monitor.poll_interval_ms = 0;
        assert!(rejected(&config).contains("poll_interval_ms"));

        let mut config = base();
        config.equipment[0].simulator.update_interval_ms = 0;
        assert!(rejected(&config).contains("update_interval_ms"));
    }

    #[test]
    fn test_unknown_layout_rejected() {
        let mut config = base();
        config.equipment[0].layout = Some("gas_cabinet/v9".to_string());
        assert!(rejected(&config).contains("gc-01"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = SimConfig::parse("[monitor]\npoll_every = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = SimConfig::parse(include_str!("../../config/fab_sim.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.equipment.len(), 3);
    }

    #[test]
    fn test_single_quick_start() {
        let config = SimConfig::single("stocker/v1");
        config.validate().unwrap();
        assert_eq!(config.equipment[0].name, "stocker-v1");
    }
}
