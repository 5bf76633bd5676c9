//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct GarageSection {
    /// Garage hardware host; the port is fixed by the protocol
    #[serde(default = "default_garage_host")]
    pub host: String,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for GarageSection {
    fn default() -> Self {
        Self { host: default_garage_host(), capacity: default_capacity() }
    }
}

fn default_garage_host() -> String {
    "127.0.0.1".to_string()
}

fn default_capacity() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct KioskSection {
    /// Depth of the kiosk event channel
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for KioskSection {
    fn default() -> Self {
        Self { queue_depth: default_queue_depth() }
    }
}

fn default_queue_depth() -> usize {
    16
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AllocatorSection {
    /// Assign the lowest free spot instead of packing upward
    #[serde(default)]
    pub first_free_scan: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressSection {
    /// File path for exit receipts (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressSection {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "receipts.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub garage: GarageSection,
    #[serde(default)]
    pub kiosk: KioskSection,
    #[serde(default)]
    pub allocator: AllocatorSection,
    #[serde(default)]
    pub egress: EgressSection,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    garage_host: String,
    capacity: usize,
    kiosk_queue_depth: usize,
    first_free_scan: bool,
    egress_file: String,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            garage_host: default_garage_host(),
            capacity: default_capacity(),
            kiosk_queue_depth: default_queue_depth(),
            first_free_scan: false,
            egress_file: default_egress_file(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        // Check for --config argument
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        // Default to dev.toml
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            garage_host: toml_config.garage.host,
            capacity: toml_config.garage.capacity,
            kiosk_queue_depth: toml_config.kiosk.queue_depth,
            first_free_scan: toml_config.allocator.first_free_scan,
            egress_file: toml_config.egress.file,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn garage_host(&self) -> &str {
        &self.garage_host
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn kiosk_queue_depth(&self) -> usize {
        self.kiosk_queue_depth
    }

    pub fn first_free_scan(&self) -> bool {
        self.first_free_scan
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.garage_host(), "127.0.0.1");
        assert_eq!(config.capacity(), 4);
        assert_eq!(config.kiosk_queue_depth(), 16);
        assert!(!config.first_free_scan());
        assert_eq!(config.egress_file(), "receipts.jsonl");
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["garage-control".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "garage-control".to_string(),
            "--config".to_string(),
            "config/site.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/site.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["garage-control".to_string(), "--config=config/site.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/site.toml");
    }

    #[test]
    fn test_empty_toml_uses_section_defaults() {
        let toml_config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(toml_config.garage.host, "127.0.0.1");
        assert_eq!(toml_config.garage.capacity, 4);
        assert_eq!(toml_config.egress.file, "receipts.jsonl");
        assert!(!toml_config.allocator.first_free_scan);
    }
}
