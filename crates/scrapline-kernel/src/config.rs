//! Configuration for the Scrapline kernel

use serde::{Deserialize, Serialize};

/// Main kernel configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Weighbridge reconciliation settings
    #[serde(default)]
    pub weighbridge: WeighbridgeConfig,

    /// Gate-pass issuance settings
    #[serde(default)]
    pub gate_pass: GatePassConfig,

    /// Timestamp freshness settings
    #[serde(default)]
    pub chronology: ChronologyConfig,

    /// Values stamped into evidence metadata
    #[serde(default)]
    pub system: SystemConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeighbridgeConfig {
    /// Discrepancy above which the tare record waits for a supervisor
    #[serde(default = "default_discrepancy_threshold")]
    pub discrepancy_threshold_percent: f64,

    /// Reference tare-to-gross ratio the discrepancy is measured against
    #[serde(default = "default_reference_ratio")]
    pub reference_tare_ratio: f64,
}

impl Default for WeighbridgeConfig {
    fn default() -> Self {
        Self {
            discrepancy_threshold_percent: default_discrepancy_threshold(),
            reference_tare_ratio: default_reference_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatePassConfig {
    #[serde(default = "default_validity_hours")]
    pub default_validity_hours: i64,

    #[serde(default = "default_max_validity_hours")]
    pub max_validity_hours: i64,
}

impl Default for GatePassConfig {
    fn default() -> Self {
        Self {
            default_validity_hours: default_validity_hours(),
            max_validity_hours: default_max_validity_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChronologyConfig {
    /// How far in the past a proposed timestamp may lie
    #[serde(default = "default_backdating_tolerance")]
    pub backdating_tolerance_secs: i64,
}

impl Default for ChronologyConfig {
    fn default() -> Self {
        Self {
            backdating_tolerance_secs: default_backdating_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default = "default_environment")]
    pub environment: String,

    /// Zone name recorded as `captureInfo.timezone`
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            environment: default_environment(),
            timezone: default_timezone(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_discrepancy_threshold() -> f64 {
    5.0
}

fn default_reference_ratio() -> f64 {
    0.5
}

fn default_validity_hours() -> i64 {
    24
}

fn default_max_validity_hours() -> i64 {
    72
}

fn default_backdating_tolerance() -> i64 {
    5 * 60
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl KernelConfig {
    /// Load configuration from an optional file plus `SCRAPLINE_*` environment variables.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `SCRAPLINE_WEIGHBRIDGE__DISCREPANCY_THRESHOLD_PERCENT=3.5`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&KernelConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SCRAPLINE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
