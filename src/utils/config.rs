// src/utils/config.rs
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use config::{Config as ConfigLib, Environment, File};

use crate::core::{
    matching::MatchingConfig,
    ocr::OcrConfig,
    verification::DecisionConfig,
};
use crate::utils::error::{NodeError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub matching: MatchingConfig,
    pub decision: DecisionConfig,
    pub ocr: OcrConfig,
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_dir: Option<String>,
    pub data_dir: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_dir: None,
            data_dir: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
    pub encryption_key: String,
    pub compression_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "data/verification-db".to_string(),
            encryption_key: String::new(),
            compression_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 86_400,
        }
    }
}

impl Config {
    /// Loads `config/default`, then `config/local`, then `APP__*` environment
    /// overrides (e.g. `APP__DECISION__APPROVE_THRESHOLD=90`).
    pub fn new() -> Result<Self> {
        Self::load_from(Path::new("config"))
    }

    pub fn load_from(dir: &Path) -> Result<Self> {
        let config = ConfigLib::builder()
            .add_source(File::from(dir.join("default")).required(false))
            .add_source(File::from(dir.join("local")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.port == 0 {
            return Err(NodeError::Config("Invalid port number".into()));
        }

        if self.storage.path.is_empty() {
            return Err(NodeError::Config("storage.path must be set".into()));
        }
        if self.storage.encryption_key.is_empty() {
            return Err(NodeError::Config("storage.encryption_key must be set".into()));
        }

        self.matching.validate().map_err(NodeError::Config)?;
        self.decision.validate().map_err(NodeError::Config)?;
        self.ocr.validate().map_err(NodeError::Config)?;

        if self.sweeper.enabled && self.sweeper.interval_secs == 0 {
            return Err(NodeError::Config(
                "sweeper.interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn get_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweeper.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.storage.encryption_key = "test-secret".into();
        config
    }

    #[test]
    fn test_defaults_are_valid_once_key_is_set() {
        assert!(Config::default().validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_decision_defaults() {
        let config = Config::default();
        assert_eq!(config.decision.approve_threshold, 85);
        assert_eq!(config.decision.reject_floor, 50);
        assert_eq!(config.decision.max_automatic_attempts, 3);
        assert_eq!(config.decision.grant_validity_days, 365);
        assert_eq!(config.decision.reverification_warning_days, 30);
    }

    #[test]
    fn test_rejects_weights_not_summing_to_one() {
        let mut config = valid_config();
        config.matching.weights.name = 0.9;
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));
    }

    #[test]
    fn test_rejects_floor_above_threshold() {
        let mut config = valid_config();
        config.decision.reject_floor = 90;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            "[storage]\nencryption_key = \"from-file\"\n\n[decision]\napprove_threshold = 90\n\n[matching.weights]\nname = 0.4\ninstitution = 0.2\nprogram = 0.15\nstart_year = 0.125\nend_year = 0.125"
        )
        .unwrap();

        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.storage.encryption_key, "from-file");
        assert_eq!(config.decision.approve_threshold, 90);
        assert_eq!(config.decision.reject_floor, 50);
        assert!((config.matching.weights.name - 0.4).abs() < f64::EPSILON);
    }
}
