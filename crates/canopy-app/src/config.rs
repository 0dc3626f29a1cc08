//! File-backed configuration for the `canopy` binary.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use canopy_core::{EvolverConfig, SpeciesCatalog};
use serde::{Deserialize, Serialize};

use crate::scheduler::SchedulerConfig;

/// Everything one optimization needs. Missing sections fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub evolver: EvolverConfig,
    pub catalog: SpeciesCatalog,
}

impl AppConfig {
    /// Read a JSON config file and validate every section.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler
            .validate()
            .context("invalid scheduler section")?;
        self.evolver.validate().context("invalid evolver section")?;
        Ok(())
    }
}
