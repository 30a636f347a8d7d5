//! Configuration for the table, oracle funding, storage and simulator.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

use crate::table::types::{Amount, PAYOUT_MULTIPLIER};

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("configuration is logically inconsistent: {0}")]
    LogicalInconsistency(String),
    #[error("missing required configuration: {0}")]
    MissingRequired(String),
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),
    #[error("failed to save configuration: {0}")]
    SaveFailed(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CroupierConfig {
    pub table: TableSettings,
    pub oracle: OracleSettings,
    pub storage: StorageSettings,
    pub simulation: SimulationSettings,
}

/// Table policy knobs applied by the simulator at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    /// Per-(round, bettor, number) cumulative stake ceiling.
    pub max_bet_per_number: Amount,
    /// Asset minted into engine custody before play starts.
    pub house_float: Amount,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            max_bet_per_number: 1_000,
            house_float: 100_000,
        }
    }
}

/// Oracle fee model and the engine's gas funding.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    /// Fee the oracle debits per randomness request.
    pub request_fee: Amount,
    /// Gas-funding deposit the simulator pushes to the oracle up front.
    pub gas_deposit: Amount,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            request_fee: 0,
            gas_deposit: 1_000,
        }
    }
}

/// RocksDB tuning for the write-through store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    pub max_write_buffer_number: i32,
    pub target_file_size_mb: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_directory: "./croupier_data".to_string(),
            write_buffer_size_mb: 128,
            max_write_buffer_number: 4,
            target_file_size_mb: 128,
        }
    }
}

/// Parameters for `croupier-sim` runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub rounds: u64,
    pub bettors: usize,
    /// Asset minted per bettor at startup.
    pub bankroll: Amount,
    /// Upper bound on entries per bet batch.
    pub max_entries_per_bet: usize,
    /// Seed for the bettors' behavior; runs with equal seeds bet alike.
    pub seed: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            rounds: 10,
            bettors: 4,
            bankroll: 10_000,
            max_entries_per_bet: 3,
            seed: 42,
        }
    }
}

impl CroupierConfig {
    /// Configuration sized for sustained high-volume play.
    pub fn high_volume() -> Self {
        Self {
            table: TableSettings {
                max_bet_per_number: 10_000,
                house_float: 10_000_000,
            },
            oracle: OracleSettings {
                request_fee: 0,
                gas_deposit: 10_000,
            },
            storage: StorageSettings {
                write_buffer_size_mb: 512,
                max_write_buffer_number: 8,
                target_file_size_mb: 256,
                ..Default::default()
            },
            simulation: SimulationSettings {
                rounds: 100,
                bettors: 16,
                bankroll: 100_000,
                max_entries_per_bet: 5,
                ..Default::default()
            },
        }
    }

    /// Conservative production defaults with a metered oracle.
    pub fn production() -> Self {
        Self {
            table: TableSettings {
                max_bet_per_number: 1_000,
                house_float: 1_000_000,
            },
            oracle: OracleSettings {
                request_fee: 10,
                gas_deposit: 10_000,
            },
            storage: StorageSettings {
                write_buffer_size_mb: 256,
                max_write_buffer_number: 6,
                target_file_size_mb: 256,
                ..Default::default()
            },
            simulation: SimulationSettings::default(),
        }
    }

    /// Validate for logical consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_exposure = self
            .table
            .max_bet_per_number
            .checked_mul(PAYOUT_MULTIPLIER)
            .ok_or_else(|| {
                ConfigError::InvalidValue("max_bet_per_number * 36 overflows".to_string())
            })?;
        if self.table.house_float < max_exposure {
            return Err(ConfigError::LogicalInconsistency(format!(
                "house_float {} cannot cover a single max bet at 36x ({})",
                self.table.house_float, max_exposure
            )));
        }

        if self.oracle.request_fee > 0 && self.oracle.gas_deposit < self.oracle.request_fee {
            return Err(ConfigError::LogicalInconsistency(
                "gas_deposit cannot fund even one randomness request".to_string(),
            ));
        }

        if self.storage.data_directory.is_empty() {
            return Err(ConfigError::MissingRequired(
                "storage.data_directory".to_string(),
            ));
        }
        if self.storage.write_buffer_size_mb == 0 {
            return Err(ConfigError::InvalidValue(
                "write_buffer_size_mb must be > 0".to_string(),
            ));
        }
        if self.storage.max_write_buffer_number <= 0 {
            return Err(ConfigError::InvalidValue(
                "max_write_buffer_number must be > 0".to_string(),
            ));
        }

        if self.simulation.rounds == 0 {
            return Err(ConfigError::InvalidValue(
                "simulation.rounds must be > 0".to_string(),
            ));
        }
        if self.simulation.bettors == 0 {
            return Err(ConfigError::InvalidValue(
                "simulation.bettors must be > 0".to_string(),
            ));
        }
        if self.simulation.max_entries_per_bet == 0 {
            return Err(ConfigError::InvalidValue(
                "simulation.max_entries_per_bet must be > 0".to_string(),
            ));
        }
        if self.simulation.bankroll == 0 {
            return Err(ConfigError::InvalidValue(
                "simulation.bankroll must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Loads a config from an optional TOML file, then environment overrides.
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    pub fn load(&self) -> Result<CroupierConfig, ConfigError> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            CroupierConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<CroupierConfig, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::LoadFailed(format!("failed to parse TOML: {}", e)))
    }

    fn apply_env_overrides(&self, config: &mut CroupierConfig) -> Result<(), ConfigError> {
        if let Ok(value) = env::var("CROUPIER_MAX_BET") {
            config.table.max_bet_per_number = parse_env("CROUPIER_MAX_BET", &value)?;
        }
        if let Ok(value) = env::var("CROUPIER_HOUSE_FLOAT") {
            config.table.house_float = parse_env("CROUPIER_HOUSE_FLOAT", &value)?;
        }
        if let Ok(value) = env::var("CROUPIER_REQUEST_FEE") {
            config.oracle.request_fee = parse_env("CROUPIER_REQUEST_FEE", &value)?;
        }
        if let Ok(value) = env::var("CROUPIER_DATA_DIR") {
            config.storage.data_directory = value;
        }
        if let Ok(value) = env::var("CROUPIER_SIM_ROUNDS") {
            config.simulation.rounds = parse_env("CROUPIER_SIM_ROUNDS", &value)?;
        }
        if let Ok(value) = env::var("CROUPIER_SIM_BETTORS") {
            config.simulation.bettors = parse_env("CROUPIER_SIM_BETTORS", &value)?;
        }
        if let Ok(value) = env::var("CROUPIER_SIM_SEED") {
            config.simulation.seed = parse_env("CROUPIER_SIM_SEED", &value)?;
        }
        Ok(())
    }

    /// Write a config out as pretty TOML.
    pub fn save(&self, config: &CroupierConfig, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::SaveFailed(format!("failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigError::SaveFailed(format!("failed to write {}: {}", path, e)))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| {
        ConfigError::InvalidValue(format!("{} has unparseable value {:?}", name, value))
    })
}
