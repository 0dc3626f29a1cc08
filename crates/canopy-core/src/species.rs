//! Static tree species parameters.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a species catalog is malformed.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("species catalog is empty")]
    Empty,
    #[error("duplicate species id `{0}`")]
    DuplicateId(String),
    #[error("species `{id}`: {reason}")]
    InvalidSpecies { id: String, reason: &'static str },
}

/// Immutable per-species growth parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Species {
    pub id: String,
    pub color: String,
    pub growth_rate: f32,
    pub max_radius: f32,
    /// Shade fraction tolerated before health declines, in [0, 1].
    pub shade_tolerance: f32,
    /// Maximum stem age in years.
    pub lifespan: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_productivity: Option<f32>,
}

impl Species {
    fn validate(&self) -> Result<(), CatalogError> {
        let invalid = |reason| CatalogError::InvalidSpecies {
            id: self.id.clone(),
            reason,
        };
        if self.id.is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if !(self.growth_rate.is_finite() && self.growth_rate >= 0.0) {
            return Err(invalid("growth rate must be non-negative"));
        }
        if !(self.max_radius.is_finite() && self.max_radius > 0.0) {
            return Err(invalid("max radius must be positive"));
        }
        if !(0.0..=1.0).contains(&self.shade_tolerance) {
            return Err(invalid("shade tolerance must lie in [0, 1]"));
        }
        if self.lifespan == 0 {
            return Err(invalid("lifespan must be non-zero"));
        }
        if let Some(food) = self.food_productivity
            && !(food.is_finite() && food >= 0.0)
        {
            return Err(invalid("food productivity must be non-negative"));
        }
        Ok(())
    }
}

/// Validated, ordered table of species. Order defines the probability vector layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Vec<Species>", into = "Vec<Species>")]
pub struct SpeciesCatalog {
    species: Vec<Species>,
}

impl SpeciesCatalog {
    /// Build a catalog, rejecting empty tables, duplicate ids and out-of-range parameters.
    pub fn new(species: Vec<Species>) -> Result<Self, CatalogError> {
        if species.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::with_capacity(species.len());
        for entry in &species {
            entry.validate()?;
            if !seen.insert(entry.id.as_str()) {
                return Err(CatalogError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(Self { species })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.species.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Species> {
        self.species.iter()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Species> {
        self.species.get(index)
    }

    /// Position of `id` within the catalog.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.species.iter().position(|species| species.id == id)
    }

    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<&Species> {
        self.species.iter().find(|species| species.id == id)
    }

    /// Largest mature radius of any species.
    #[must_use]
    pub fn max_radius(&self) -> f32 {
        self.species
            .iter()
            .map(|species| species.max_radius)
            .fold(0.0, f32::max)
    }
}

impl TryFrom<Vec<Species>> for SpeciesCatalog {
    type Error = CatalogError;

    fn try_from(species: Vec<Species>) -> Result<Self, Self::Error> {
        Self::new(species)
    }
}

impl From<SpeciesCatalog> for Vec<Species> {
    fn from(catalog: SpeciesCatalog) -> Self {
        catalog.species
    }
}

fn species(
    id: &str,
    color: &str,
    growth_rate: f32,
    max_radius: f32,
    shade_tolerance: f32,
    lifespan: u32,
    food_productivity: Option<f32>,
) -> Species {
    Species {
        id: id.to_owned(),
        color: color.to_owned(),
        growth_rate,
        max_radius,
        shade_tolerance,
        lifespan,
        food_productivity,
    }
}

impl Default for SpeciesCatalog {
    /// Temperate broadleaf mix used when no catalog is supplied.
    fn default() -> Self {
        Self {
            species: vec![
                species("oak", "#ff0000", 0.7, 100.0, 0.43, 200, Some(0.002)),
                species("maple", "#663399", 0.9, 80.0, 0.45, 400, None),
                species("hickory", "#008080", 0.8, 60.0, 0.5, 500, Some(0.004)),
                species("ash", "#ffff00", 0.85, 40.0, 0.5, 150, None),
                species("linden", "#008000", 0.8, 80.0, 0.5, 150, None),
                species("beech", "#ffa500", 0.7, 70.0, 0.5, 300, None),
                species("hazel", "#2196f3", 1.0, 15.0, 0.55, 80, Some(0.05)),
            ],
        }
    }
}
