//! Planting and harvesting strategies (the evolvable genome).

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::species::{Species, SpeciesCatalog};

/// Allowed deviation of a probability vector's sum from 1.
pub const PROBABILITY_TOLERANCE: f32 = 1e-4;

/// Configuration errors detected before a scenario is simulated.
#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("expected {expected} species probabilities, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("probability for `{species}` must be finite and non-negative, got {value}")]
    InvalidProbability { species: String, value: f32 },
    #[error("species probabilities sum to {0}, expected 1")]
    Unnormalized(f32),
    #[error("species probabilities are all zero")]
    AllZero,
    #[error("species `{0}` is not in the catalog")]
    UnknownSpecies(String),
    #[error("species `{0}` has no probability assigned")]
    MissingSpecies(String),
    #[error("coppice chance must lie in [0, 1], got {0}")]
    CoppiceChance(f32),
    #[error("{0} must be finite and non-negative")]
    NegativeParameter(&'static str),
}

/// Per-species planting probabilities, stored in catalog order.
///
/// Only constructible against a catalog; serialized as a bare float array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SpeciesMix(Vec<f32>);

impl SpeciesMix {
    /// Build from `(species id, weight)` pairs covering every catalog species exactly once.
    /// Weights are renormalized to sum to 1.
    pub fn from_weights<'a>(
        catalog: &SpeciesCatalog,
        weights: impl IntoIterator<Item = (&'a str, f32)>,
    ) -> Result<Self, ScenarioError> {
        let mut slots: Vec<Option<f32>> = vec![None; catalog.len()];
        for (id, weight) in weights {
            let index = catalog
                .index_of(id)
                .ok_or_else(|| ScenarioError::UnknownSpecies(id.to_owned()))?;
            slots[index] = Some(weight);
        }
        let mut values = Vec::with_capacity(slots.len());
        for (slot, species) in slots.into_iter().zip(catalog.iter()) {
            values.push(slot.ok_or_else(|| ScenarioError::MissingSpecies(species.id.clone()))?);
        }
        Self::from_probabilities(catalog, values)
    }

    /// Build from a catalog-ordered weight vector, renormalizing it.
    pub fn from_probabilities(
        catalog: &SpeciesCatalog,
        weights: Vec<f32>,
    ) -> Result<Self, ScenarioError> {
        check_weights(catalog, &weights)?;
        let sum: f32 = weights.iter().sum();
        if sum <= 0.0 {
            return Err(ScenarioError::AllZero);
        }
        Ok(Self(weights.into_iter().map(|w| w / sum).collect()))
    }

    /// Equal probability for every species.
    #[must_use]
    pub fn uniform(catalog: &SpeciesCatalog) -> Self {
        let n = catalog.len().max(1);
        Self(vec![1.0 / n as f32; n])
    }

    /// Renormalize raw weights produced by genetic operators.
    /// Degenerate vectors (all zero or non-finite) fall back to uniform.
    pub(crate) fn normalized(weights: Vec<f32>) -> Self {
        let cleaned: Vec<f32> = weights
            .into_iter()
            .map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
            .collect();
        let sum: f32 = cleaned.iter().sum();
        if sum > 0.0 && sum.is_finite() {
            Self(cleaned.into_iter().map(|w| w / sum).collect())
        } else {
            let n = cleaned.len().max(1);
            Self(vec![1.0 / n as f32; n])
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn sum(&self) -> f32 {
        self.0.iter().sum()
    }

    /// Probability of the species with `id`.
    #[must_use]
    pub fn probability(&self, catalog: &SpeciesCatalog, id: &str) -> Option<f32> {
        catalog
            .index_of(id)
            .and_then(|index| self.0.get(index).copied())
    }

    /// Pair each catalog species with its probability.
    pub fn iter_with<'c>(
        &'c self,
        catalog: &'c SpeciesCatalog,
    ) -> impl Iterator<Item = (&'c Species, f32)> + 'c {
        catalog.iter().zip(self.0.iter().copied())
    }

    /// Draw a catalog index according to the probabilities.
    pub fn sample_index<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let draw: f32 = rng.random();
        let mut cumulative = 0.0;
        let mut last_positive = 0;
        for (index, &probability) in self.0.iter().enumerate() {
            if probability > 0.0 {
                last_positive = index;
            }
            cumulative += probability;
            if draw < cumulative {
                return index;
            }
        }
        last_positive
    }

    /// Check against `catalog`: matching length, finite non-negative entries summing to 1.
    pub fn validate(&self, catalog: &SpeciesCatalog) -> Result<(), ScenarioError> {
        check_weights(catalog, &self.0)?;
        let sum = self.sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(ScenarioError::Unnormalized(sum));
        }
        Ok(())
    }
}

fn check_weights(catalog: &SpeciesCatalog, weights: &[f32]) -> Result<(), ScenarioError> {
    if weights.len() != catalog.len() {
        return Err(ScenarioError::LengthMismatch {
            expected: catalog.len(),
            actual: weights.len(),
        });
    }
    for (species, &value) in catalog.iter().zip(weights) {
        if !(value.is_finite() && value >= 0.0) {
            return Err(ScenarioError::InvalidProbability {
                species: species.id.clone(),
                value,
            });
        }
    }
    Ok(())
}

/// Uniform sampling bounds for freshly generated scenarios.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScenarioRanges {
    pub num_trees: (u32, u32),
    pub declustering_strength: (f32, f32),
    pub coppice_chance: (f32, f32),
    pub coppice_min_radius: (f32, f32),
    pub coppice_radius_spread: (f32, f32),
}

impl Default for ScenarioRanges {
    fn default() -> Self {
        Self {
            num_trees: (100, 200),
            declustering_strength: (0.0, 1.0),
            coppice_chance: (0.0, 0.2),
            coppice_min_radius: (5.0, 15.0),
            coppice_radius_spread: (2.0, 15.0),
        }
    }
}

impl ScenarioRanges {
    pub(crate) fn is_valid(&self) -> bool {
        let ordered = |(lo, hi): (f32, f32)| lo.is_finite() && hi.is_finite() && 0.0 <= lo && lo <= hi;
        self.num_trees.0 <= self.num_trees.1
            && ordered(self.declustering_strength)
            && ordered(self.coppice_chance)
            && self.coppice_chance.1 <= 1.0
            && ordered(self.coppice_min_radius)
            && ordered(self.coppice_radius_spread)
    }
}

fn sample_span<R: Rng + ?Sized>(rng: &mut R, (lo, hi): (f32, f32)) -> f32 {
    if hi > lo { rng.random_range(lo..hi) } else { lo }
}

/// Evolvable planting/harvesting strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub species_probabilities: SpeciesMix,
    /// Initial planting density.
    pub num_trees: u32,
    pub declustering_strength: f32,
    /// Smallest radius eligible for coppicing.
    pub coppice_min_radius: f32,
    /// Fraction of eligible crowded trees coppiced per year.
    pub coppice_chance: f32,
    /// Width of the eligible radius window above the minimum.
    pub coppice_radius_spread: f32,
}

impl Scenario {
    /// Draw a scenario uniformly at random within `ranges`.
    pub fn random<R: Rng + ?Sized>(
        catalog: &SpeciesCatalog,
        ranges: &ScenarioRanges,
        rng: &mut R,
    ) -> Self {
        let weights: Vec<f32> = (0..catalog.len())
            .map(|_| (rng.random::<f32>() * 1.2 - 0.2).max(0.0))
            .collect();
        let (min_trees, max_trees) = ranges.num_trees;
        Self {
            species_probabilities: SpeciesMix::normalized(weights),
            num_trees: rng.random_range(min_trees..=max_trees.max(min_trees)),
            declustering_strength: sample_span(rng, ranges.declustering_strength),
            coppice_chance: sample_span(rng, ranges.coppice_chance),
            coppice_min_radius: sample_span(rng, ranges.coppice_min_radius),
            coppice_radius_spread: sample_span(rng, ranges.coppice_radius_spread),
        }
    }

    /// Upper edge of the coppice radius window.
    #[must_use]
    pub fn coppice_max_radius(&self) -> f32 {
        self.coppice_min_radius + self.coppice_radius_spread
    }

    /// Reject scenarios that must never be simulated.
    pub fn validate(&self, catalog: &SpeciesCatalog) -> Result<(), ScenarioError> {
        self.species_probabilities.validate(catalog)?;
        self.check_scalars()
    }

    /// Validate, renormalizing a probability vector that is merely off-sum.
    pub fn validated(mut self, catalog: &SpeciesCatalog) -> Result<Self, ScenarioError> {
        if let Err(ScenarioError::Unnormalized(sum)) =
            self.species_probabilities.validate(catalog)
        {
            tracing::debug!(sum, "renormalizing scenario species probabilities");
            self.species_probabilities =
                SpeciesMix::from_probabilities(catalog, self.species_probabilities.0.clone())?;
        }
        self.validate(catalog)?;
        Ok(self)
    }

    fn check_scalars(&self) -> Result<(), ScenarioError> {
        if !(0.0..=1.0).contains(&self.coppice_chance) {
            return Err(ScenarioError::CoppiceChance(self.coppice_chance));
        }
        let non_negative = |value: f32| value.is_finite() && value >= 0.0;
        if !non_negative(self.declustering_strength) {
            return Err(ScenarioError::NegativeParameter("declustering strength"));
        }
        if !non_negative(self.coppice_min_radius) {
            return Err(ScenarioError::NegativeParameter("coppice min radius"));
        }
        if !non_negative(self.coppice_radius_spread) {
            return Err(ScenarioError::NegativeParameter("coppice radius spread"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn assert_normalized(mix: &SpeciesMix) {
        assert!((mix.sum() - 1.0).abs() <= PROBABILITY_TOLERANCE, "sum {}", mix.sum());
    }

    #[test]
    fn weights_are_keyed_by_species_id() {
        let catalog = SpeciesCatalog::default();
        let weights: Vec<(&str, f32)> = catalog
            .iter()
            .map(|species| (species.id.as_str(), if species.id == "hazel" { 3.0 } else { 1.0 }))
            .collect();
        let mix = SpeciesMix::from_weights(&catalog, weights).expect("mix");
        assert_normalized(&mix);
        let hazel = mix.probability(&catalog, "hazel").expect("hazel");
        let oak = mix.probability(&catalog, "oak").expect("oak");
        assert!((hazel - 3.0 * oak).abs() < 1e-6);
    }

    #[test]
    fn incomplete_or_unknown_weights_are_rejected() {
        let catalog = SpeciesCatalog::default();
        assert_eq!(
            SpeciesMix::from_weights(&catalog, [("oak", 1.0)]),
            Err(ScenarioError::MissingSpecies("maple".into()))
        );
        assert_eq!(
            SpeciesMix::from_weights(&catalog, [("teak", 1.0)]),
            Err(ScenarioError::UnknownSpecies("teak".into()))
        );
    }

    #[test]
    fn degenerate_weights_fall_back_to_uniform() {
        let mix = SpeciesMix::normalized(vec![0.0, f32::NAN, -1.0]);
        assert_eq!(mix.as_slice(), &[1.0 / 3.0; 3]);
    }

    #[test]
    fn sampling_never_picks_zero_probability_species() {
        let catalog = SpeciesCatalog::default();
        let mut weights = vec![0.0; catalog.len()];
        weights[2] = 1.0;
        weights[5] = 1.0;
        let mix = SpeciesMix::from_probabilities(&catalog, weights).expect("mix");
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..500 {
            let index = mix.sample_index(&mut rng);
            assert!(index == 2 || index == 5);
        }
    }

    #[test]
    fn random_scenarios_are_valid() {
        let catalog = SpeciesCatalog::default();
        let ranges = ScenarioRanges::default();
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..200 {
            let scenario = Scenario::random(&catalog, &ranges, &mut rng);
            scenario.validate(&catalog).expect("valid scenario");
            assert!((100..=200).contains(&scenario.num_trees));
            assert!(scenario.coppice_chance < 0.2);
        }
    }

    #[test]
    fn malformed_scenarios_are_rejected_or_normalized() {
        let catalog = SpeciesCatalog::default();
        let mut scenario = Scenario::random(
            &catalog,
            &ScenarioRanges::default(),
            &mut SmallRng::seed_from_u64(5),
        );
        scenario.coppice_chance = -0.1;
        assert_eq!(
            scenario.validate(&catalog),
            Err(ScenarioError::CoppiceChance(-0.1))
        );

        scenario.coppice_chance = 0.1;
        scenario.species_probabilities = SpeciesMix(vec![2.0; catalog.len()]);
        assert!(matches!(
            scenario.validate(&catalog),
            Err(ScenarioError::Unnormalized(_))
        ));
        let fixed = scenario.clone().validated(&catalog).expect("normalized");
        assert_normalized(&fixed.species_probabilities);

        scenario.species_probabilities = SpeciesMix(vec![1.0]);
        assert!(matches!(
            scenario.validated(&catalog),
            Err(ScenarioError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn wire_format_uses_a_float_array() {
        let catalog = SpeciesCatalog::default();
        let scenario = Scenario {
            species_probabilities: SpeciesMix::uniform(&catalog),
            num_trees: 120,
            declustering_strength: 0.5,
            coppice_min_radius: 8.0,
            coppice_chance: 0.1,
            coppice_radius_spread: 4.0,
        };
        let json = serde_json::to_value(&scenario).expect("json");
        assert_eq!(json["speciesProbabilities"].as_array().map(Vec::len), Some(7));
        assert_eq!(json["numTrees"], 120);
        let back: Scenario = serde_json::from_value(json).expect("scenario");
        assert_eq!(back, scenario);
    }
}
