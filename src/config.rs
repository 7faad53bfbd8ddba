//! Pipeline configuration
//!
//! Resolution order, highest first:
//! 1. Command-line flags
//! 2. TOML config file
//! 3. Compiled defaults

use crate::classifier::AwardCatalog;
use crate::location::LocationNormalizer;
use crate::overrides::OverrideRegistry;
use crate::parser::{Dialect, NoticeParser};
use crate::repair::RepairStrategy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding `<awardNum>.html` source documents
    pub source_dir: PathBuf,

    /// One JSON record per identifier, reports under `reports/`
    pub output_dir: PathBuf,

    /// Pre-repair copies, one subdirectory per run
    pub backup_dir: PathBuf,

    pub override_file: Option<PathBuf>,

    /// CSV (`awardNum,location`) taken from the yearly listing page
    pub listing_file: Option<PathBuf>,

    /// JSON award catalog replacing the built-in one
    pub catalog_file: Option<PathBuf>,

    pub repair: bool,
    pub repair_strategy: RepairStrategy,

    pub dialect: Dialect,

    /// Extra location synonyms: variant -> canonical name
    pub locations: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            source_dir: PathBuf::from("html"),
            output_dir: PathBuf::from("output"),
            backup_dir: PathBuf::from("backups"),
            override_file: None,
            listing_file: None,
            catalog_file: None,
            repair: true,
            repair_strategy: RepairStrategy::Full,
            dialect: Dialect::default(),
            locations: BTreeMap::new(),
        }
    }
}

/// Flags that win over the file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub source_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub override_file: Option<PathBuf>,
    pub no_repair: bool,
    pub repair_strategy: Option<RepairStrategy>,
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file: {:?}", path.as_ref()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML config")
    }

    /// File if given, defaults otherwise, then CLI flags on top
    pub fn resolve(path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(cli);
        Ok(config)
    }

    pub fn apply(&mut self, cli: &CliOverrides) {
        if let Some(dir) = &cli.source_dir {
            self.source_dir = dir.clone();
        }
        if let Some(dir) = &cli.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(dir) = &cli.backup_dir {
            self.backup_dir = dir.clone();
        }
        if let Some(file) = &cli.override_file {
            self.override_file = Some(file.clone());
        }
        if cli.no_repair {
            self.repair = false;
        }
        if let Some(strategy) = cli.repair_strategy {
            self.repair_strategy = strategy;
        }
    }

    pub fn catalog(&self) -> Result<AwardCatalog> {
        let base = match &self.catalog_file {
            Some(path) => AwardCatalog::from_file(path)?,
            None => AwardCatalog::default(),
        };
        Ok(self.dialect.extend_catalog(base))
    }

    pub fn normalizer(&self) -> LocationNormalizer {
        LocationNormalizer::with_synonyms(self.locations.clone())
    }

    /// Loading errors fail the run before any identifier is touched
    pub fn overrides(&self) -> Result<OverrideRegistry> {
        match &self.override_file {
            Some(path) => OverrideRegistry::from_file(path),
            None => Ok(OverrideRegistry::new()),
        }
    }

    pub fn parser(&self) -> Result<NoticeParser> {
        NoticeParser::new(self.dialect.clone(), self.catalog()?, self.normalizer())
    }
}
