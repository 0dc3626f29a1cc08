//! Core types shared across the canopy workspace.

use canopy_index::IndexError;
use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod engine;
pub mod evolve;
pub mod fitness;
pub mod planting;
pub mod run;
pub mod scenario;
pub mod shade;
pub mod species;
pub mod tree;

pub use engine::{Forest, YearSummary};
pub use evolve::{
    EvolverConfig, EvolverError, GenerationOutcome, GenerationSummary, Population,
    ScenarioEvolver,
};
pub use fitness::{biodiversity_index, carbon_content, run_fitness};
pub use run::{Run, RunId, YearlyData};
pub use scenario::{Scenario, ScenarioError, ScenarioRanges, SpeciesMix};
pub use shade::{AnalyticOverlap, RasterShadeMap, ShadeModel};
pub use species::{CatalogError, Species, SpeciesCatalog};
pub use tree::Tree;

/// Replace NaN and infinities with zero.
#[inline]
pub(crate) fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

#[inline]
pub(crate) fn clamp01(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Selects how per-tree shade intensity is estimated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShadeMethod {
    /// Pairwise canopy lens-overlap approximation.
    #[default]
    Analytic,
    /// Accumulated-opacity bitmap sampled under each canopy.
    Raster,
}

/// Errors that can occur while constructing or advancing a forest stand.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("tree references unknown species `{0}`")]
    UnknownSpecies(String),
    #[error("overlap resolution did not settle after {passes} passes")]
    OverlapUnresolved { passes: usize },
    #[error("spatial index error: {0}")]
    Index(#[from] IndexError),
}

/// Static configuration for a simulated plot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Width of the plot in world units.
    pub plot_width: f32,
    /// Height of the plot in world units.
    pub plot_height: f32,
    /// Global multiplier applied to every species' yearly growth.
    pub growth_multiplier: f32,
    /// Stem age before a tree can drop seed.
    pub min_reproductive_age: u32,
    /// Upper bound of the random delay added to the reproductive age.
    pub reproductive_age_jitter: f32,
    /// Seedling count scale per mature tree.
    pub max_seedlings: f32,
    /// Seed scatter distance as a multiple of the parent radius.
    pub seed_distance_multiplier: f32,
    /// Neighbors younger than this fraction of a tree's stem age cast no shade on it.
    pub shader_age_ratio: f32,
    /// Health regained each year a tree is not over-shaded.
    pub health_recovery: f32,
    /// Stem-age exponent damping the shade penalty on older trees.
    pub shade_age_exponent: f32,
    /// Minimum stem age before a tree may be coppiced.
    pub min_coppice_age: u32,
    /// Radius below which food trees yield nothing.
    pub min_food_radius: f32,
    /// Carbon per cubic unit of canopy radius.
    pub carbon_scale: f64,
    /// Exponent steepening the species evenness index.
    pub biodiversity_exponent: f64,
    /// Lower bound of the per-tree size multiplier.
    pub size_multiplier_min: f32,
    /// Upper bound of the per-tree size multiplier.
    pub size_multiplier_max: f32,
    /// Relaxation passes applied after each planting batch.
    pub declutter_passes: usize,
    /// Nearest neighbors considered by each relaxation step.
    pub declutter_neighbors: usize,
    /// Neighbors further than this are ignored while decluttering.
    pub declutter_cutoff: f32,
    /// Upper bound on plant/declutter/prune rounds when filling a plot.
    pub max_planting_rounds: usize,
    /// Upper bound on strict overlap resolution passes.
    pub max_overlap_passes: usize,
    /// Shade estimation strategy.
    pub shade_method: ShadeMethod,
    /// Whether crowded trees are coppiced each year.
    pub selective_harvesting: bool,
    /// Whether food-producing species are harvested each year.
    pub food_harvest: bool,
    /// Optional RNG seed for reproducible stands.
    pub rng_seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            plot_width: 612.0,
            plot_height: 176.0,
            growth_multiplier: 1.0,
            min_reproductive_age: 10,
            reproductive_age_jitter: 3.0,
            max_seedlings: 2.0,
            seed_distance_multiplier: 4.0,
            shader_age_ratio: 0.75,
            health_recovery: 0.3,
            shade_age_exponent: 0.8,
            min_coppice_age: 5,
            min_food_radius: 5.0,
            carbon_scale: 0.01,
            biodiversity_exponent: 4.0,
            size_multiplier_min: 0.5,
            size_multiplier_max: 1.0,
            declutter_passes: 50,
            declutter_neighbors: 2,
            declutter_cutoff: 50.0,
            max_planting_rounds: 20,
            max_overlap_passes: 10_000,
            shade_method: ShadeMethod::Analytic,
            selective_harvesting: true,
            food_harvest: true,
            rng_seed: None,
        }
    }
}

impl SimulationConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.plot_width.is_finite() && self.plot_width > 0.0)
            || !(self.plot_height.is_finite() && self.plot_height > 0.0)
        {
            return Err(SimulationError::InvalidConfig(
                "plot dimensions must be positive",
            ));
        }
        let non_negative = |value: f32| value.is_finite() && value >= 0.0;
        if !non_negative(self.growth_multiplier)
            || !non_negative(self.reproductive_age_jitter)
            || !non_negative(self.max_seedlings)
            || !non_negative(self.seed_distance_multiplier)
            || !non_negative(self.health_recovery)
            || !non_negative(self.shade_age_exponent)
            || !non_negative(self.min_food_radius)
            || !non_negative(self.declutter_cutoff)
            || !(self.carbon_scale.is_finite() && self.carbon_scale >= 0.0)
            || !(self.biodiversity_exponent.is_finite() && self.biodiversity_exponent > 0.0)
        {
            return Err(SimulationError::InvalidConfig(
                "growth, seeding, health, carbon and declutter parameters must be finite and non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.shader_age_ratio) {
            return Err(SimulationError::InvalidConfig(
                "shader_age_ratio must lie in [0, 1]",
            ));
        }
        if !(self.size_multiplier_min > 0.0 && self.size_multiplier_max.is_finite())
            || self.size_multiplier_min > self.size_multiplier_max
        {
            return Err(SimulationError::InvalidConfig(
                "size multiplier range must be positive and ordered",
            ));
        }
        if self.max_planting_rounds == 0 || self.max_overlap_passes == 0 {
            return Err(SimulationError::InvalidConfig(
                "planting rounds and overlap passes must be non-zero",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }

    /// Whether a point lies on the plot (edges inclusive).
    #[must_use]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        (0.0..=self.plot_width).contains(&x) && (0.0..=self.plot_height).contains(&y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_size_range() {
        let config = SimulationConfig {
            size_multiplier_min: 0.9,
            size_multiplier_max: 0.6,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimulationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_nan_parameters() {
        let configs = [
            SimulationConfig {
                growth_multiplier: f32::NAN,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                health_recovery: f32::NAN,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                carbon_scale: f64::NAN,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                shader_age_ratio: f32::NAN,
                ..SimulationConfig::default()
            },
            SimulationConfig {
                size_multiplier_min: f32::NAN,
                ..SimulationConfig::default()
            },
        ];
        for config in configs {
            assert!(matches!(
                config.validate(),
                Err(SimulationError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn plot_contains_is_edge_inclusive() {
        let config = SimulationConfig::default();
        assert!(config.contains(0.0, 0.0));
        assert!(config.contains(612.0, 176.0));
        assert!(!config.contains(-0.1, 10.0));
        assert!(!config.contains(10.0, 176.5));
    }

    #[test]
    fn degenerate_numbers_are_coerced() {
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(f64::INFINITY), 0.0);
        assert_eq!(finite_or_zero(2.5), 2.5);
        assert_eq!(clamp01(f32::NAN), 0.0);
        assert_eq!(clamp01(1.7), 1.0);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"shade_method":"raster","rng_seed":7}"#).expect("json");
        assert_eq!(config.shade_method, ShadeMethod::Raster);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.plot_width, 612.0);
    }
}
