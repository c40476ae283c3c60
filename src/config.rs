/// Analysis configuration loader - parses analysis.toml
///
/// Separates tunable settings from code: pollution index weights, which
/// pollutant (if any) is allocated to counties, CSO table codes, cache and
/// output directories, and extra county aliases. Every field has a default,
/// so a partial file (or none at all) is valid.
///
/// Weights are validated at load time. A malformed weighting is a
/// pre-flight failure: nothing downstream of the pollution index can be
/// trusted without it.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::counties::AliasTable;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "analysis.toml";

/// Tolerance when checking that weights sum to one.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("pollution index needs at least one weighted pollutant")]
    EmptyWeights,

    #[error("weight for '{pollutant}' must be a finite non-negative number, got {weight}")]
    InvalidWeight { pollutant: String, weight: f64 },

    #[error("pollution index weights must sum to 1, got {sum}")]
    WeightSum { sum: f64 },

    #[error("alias '{alias}' targets '{target}', which is not a county")]
    UnknownAliasTarget { alias: String, target: String },
}

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub pollution_index: PollutionIndexConfig,
    pub emissions: EmissionsConfig,
    pub collection: CollectionConfig,
    pub output: OutputConfig,
    /// Extra `alias = "Canonical County"` entries for the name normalizer.
    pub aliases: BTreeMap<String, String>,
}

/// Pollutant weights for the composite pollution index.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollutionIndexConfig {
    /// Pollutant label (as reported by the dataset) → weight.
    pub weights: BTreeMap<String, f64>,
}

impl Default for PollutionIndexConfig {
    fn default() -> Self {
        let weights = [
            ("CO2", 0.4),
            ("NOx", 0.2),
            ("SO2", 0.1),
            ("PM2.5", 0.2),
            ("PM10", 0.1),
        ]
        .into_iter()
        .map(|(p, w)| (p.to_string(), w))
        .collect();
        Self { weights }
    }
}

impl PollutionIndexConfig {
    /// Weights must be non-empty, finite, non-negative and sum to 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.weights.is_empty() {
            return Err(ConfigError::EmptyWeights);
        }
        for (pollutant, &weight) in &self.weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    pollutant: pollutant.clone(),
                    weight,
                });
            }
        }
        let sum: f64 = self.weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum { sum });
        }
        Ok(())
    }
}

/// Which national figure gets spread across counties.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmissionsConfig {
    /// Allocate a single pollutant. When unset, the sum over all
    /// pollutants for the year is allocated.
    pub allocated_pollutant: Option<String>,
}

/// A census table and the year it describes.
#[derive(Debug, Clone, Deserialize)]
pub struct CensusTable {
    pub year: i32,
    pub table: String,
}

/// CSO PxStat collection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub base_url: String,
    pub pollution_table: String,
    pub water_table: String,
    pub census: Vec<CensusTable>,
    /// Statistic label kept from census tables.
    pub population_statistic: String,
    pub timeout_secs: u64,
    pub workers: usize,
    pub cache_dir: PathBuf,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ws.cso.ie/public/api.restful/PxStat.Data.Cube_API.ReadDataset"
                .to_string(),
            pollution_table: "EAA20".to_string(),
            water_table: "EPA02".to_string(),
            census: vec![
                CensusTable { year: 2011, table: "E2011".to_string() },
                CensusTable { year: 2016, table: "E2016".to_string() },
                CensusTable { year: 2022, table: "G0420".to_string() },
            ],
            population_statistic: "Population".to_string(),
            timeout_secs: 60,
            workers: 4,
            cache_dir: PathBuf::from("data/cache"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("output") }
    }
}

impl AnalysisConfig {
    /// Pre-flight checks: weights and alias targets.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pollution_index.validate()?;
        self.alias_table()?;
        Ok(())
    }

    /// Built-in aliases extended with the configured ones.
    pub fn alias_table(&self) -> Result<AliasTable, ConfigError> {
        AliasTable::builtin().extended(&self.aliases)
    }
}

/// Parses and validates configuration from a TOML string.
pub fn parse_config(contents: &str) -> Result<AnalysisConfig, ConfigError> {
    let config: AnalysisConfig = toml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

/// Loads and validates configuration from a file.
pub fn load_config(path: &Path) -> Result<AnalysisConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents)
}

/// Loads `path` when given, else `analysis.toml` when present, else defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<AnalysisConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_config(Path::new(DEFAULT_CONFIG_PATH)),
        None => {
            log::info!("No {} found, using default configuration", DEFAULT_CONFIG_PATH);
            let config = AnalysisConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}
