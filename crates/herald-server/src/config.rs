//! Demo configuration.
//!
//! Configuration can be loaded from:
//! - A file named with `--config <path>`
//! - `herald.toml`, `/etc/herald/herald.toml` or `~/.config/herald/herald.toml`
//! - Environment variables (`HERALD_HOST`, `HERALD_PORT`) for the defaults

use anyhow::{bail, Context, Result};
use herald::{PublisherConfig, SubscriberConfig, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths searched when no `--config` argument is given.
const CONFIG_PATHS: [&str; 3] = [
    "herald.toml",
    "/etc/herald/herald.toml",
    "~/.config/herald/herald.toml",
];

/// Demo configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Publisher settings.
    #[serde(default = "default_publisher")]
    pub publisher: PublisherConfig,

    /// Subscriber settings.
    #[serde(default)]
    pub subscriber: SubscriberConfig,

    /// Demo loop settings.
    #[serde(default)]
    pub demo: DemoConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Demo loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Delay between demo publishes, in milliseconds.
    #[serde(default = "default_publish_interval")]
    pub publish_interval_ms: u64,

    /// Publisher the demo subscriber connects to.
    #[serde(default = "default_publisher_addr")]
    pub publisher_addr: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Exporter port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_host() -> String {
    std::env::var("HERALD_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("HERALD_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

fn default_publisher() -> PublisherConfig {
    PublisherConfig {
        host: default_host(),
        ..PublisherConfig::with_port(default_port())
    }
}

fn default_publish_interval() -> u64 {
    500
}

fn default_publisher_addr() -> String {
    format!("{}:{}", default_host(), default_port())
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            publisher: default_publisher(),
            subscriber: SubscriberConfig::default(),
            demo: DemoConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: default_publish_interval(),
            publisher_addr: default_publisher_addr(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration for this process.
    ///
    /// Uses the file named by `--config` if present, otherwise the first
    /// default path that exists, otherwise defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `--config` has no value, or the chosen file
    /// cannot be read or parsed.
    pub fn load() -> Result<Self> {
        if let Some(path) = config_arg(std::env::args().skip(1))? {
            return Self::from_file(path);
        }

        for path in &CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

/// Find `--config <path>` or `--config=<path>` among the arguments.
fn config_arg(args: impl IntoIterator<Item = String>) -> Result<Option<PathBuf>> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return match args.next() {
                Some(path) => Ok(Some(expand(&path))),
                None => bail!("--config requires a path"),
            };
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Ok(Some(expand(path)));
        }
    }
    Ok(None)
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
