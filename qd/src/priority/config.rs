//! Discipline configuration

use std::fs;
use std::path::Path;
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::divider::DividerKind;

/// Discipline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisciplineConfig {
    /// Number of handlers reading the output, the in-flight ceiling
    #[serde(rename = "handlers-quantity", default = "default_handlers_quantity")]
    pub handlers_quantity: u64,

    /// Built-in divider used for strategic and tactic allocation
    #[serde(default)]
    pub divider: DividerKind,

    /// Pause between cycles that dispatched nothing, in microseconds
    #[serde(rename = "idle-delay-us", default = "default_idle_delay_us")]
    pub idle_delay_us: u64,

    /// Tick period used when waiting on capacity-one inputs, in microseconds
    #[serde(rename = "interrupt-interval-us", default = "default_interrupt_interval_us")]
    pub interrupt_interval_us: u64,
}

fn default_handlers_quantity() -> u64 {
    8
}

fn default_idle_delay_us() -> u64 {
    1000
}

fn default_interrupt_interval_us() -> u64 {
    1000
}

impl Default for DisciplineConfig {
    fn default() -> Self {
        Self {
            handlers_quantity: default_handlers_quantity(),
            divider: DividerKind::default(),
            idle_delay_us: default_idle_delay_us(),
            interrupt_interval_us: default_interrupt_interval_us(),
        }
    }
}

impl DisciplineConfig {
    /// Get the idle delay as a Duration
    pub fn idle_delay(&self) -> Duration {
        Duration::from_micros(self.idle_delay_us)
    }

    /// Get the interrupt interval as a Duration
    ///
    /// Clamped to at least one microsecond, zero periods are not accepted by timers.
    pub fn interrupt_interval(&self) -> Duration {
        Duration::from_micros(self.interrupt_interval_us.max(1))
    }

    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        debug!(path = %path.as_ref().display(), "DisciplineConfig::load_from_file: called");
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
