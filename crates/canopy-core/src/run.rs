//! Run records exchanged between workers, the scheduler and the evolver.

use serde::{Deserialize, Serialize};

use crate::scenario::Scenario;
use crate::tree::Tree;

/// Stable identifier of a run; unique across generations within one optimizer.
pub type RunId = u64;

/// Per-year metric series. Index `n` holds the state after year `n`; index 0 is the planted stand.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct YearlyData {
    pub carbon: Vec<f64>,
    pub trees: Vec<u32>,
    pub biodiversity: Vec<f64>,
    pub food: Vec<f64>,
}

impl YearlyData {
    /// Years recorded after the initial sample.
    #[must_use]
    pub fn years(&self) -> usize {
        self.carbon.len().saturating_sub(1)
    }

    /// Mean biodiversity over the simulated years (the planted sample alone if none ran), 0 when empty.
    #[must_use]
    pub fn average_biodiversity(&self) -> f64 {
        let samples = match self.biodiversity.get(1..) {
            Some(simulated) if !simulated.is_empty() => simulated,
            _ => &self.biodiversity[..],
        };
        if samples.is_empty() {
            return 0.0;
        }
        crate::finite_or_zero(samples.iter().sum::<f64>() / samples.len() as f64)
    }

    pub(crate) fn push(&mut self, carbon: f64, trees: u32, biodiversity: f64, food: f64) {
        self.carbon.push(crate::finite_or_zero(carbon));
        self.trees.push(trees);
        self.biodiversity.push(crate::finite_or_zero(biodiversity));
        self.food.push(crate::finite_or_zero(food));
    }
}

/// One full simulation of a scenario, partial while `is_complete` is false.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: RunId,
    pub scenario: Scenario,
    pub yearly_data: YearlyData,
    pub trees: Vec<Tree>,
    pub dead_trees: Vec<Tree>,
    pub initial_trees: Vec<Tree>,
    pub fitness: f64,
    pub carbon: f64,
    pub average_biodiversity: f64,
    pub food: f64,
    pub is_allocated: bool,
    pub is_complete: bool,
}

impl Run {
    /// Unevaluated run awaiting dispatch.
    #[must_use]
    pub fn pending(id: RunId, scenario: Scenario) -> Self {
        Self {
            id,
            scenario,
            yearly_data: YearlyData::default(),
            trees: Vec::new(),
            dead_trees: Vec::new(),
            initial_trees: Vec::new(),
            fitness: 0.0,
            carbon: 0.0,
            average_biodiversity: 0.0,
            food: 0.0,
            is_allocated: false,
            is_complete: false,
        }
    }

    /// Copy without tree sets, for archives and progress streams.
    #[must_use]
    pub fn without_trees(&self) -> Self {
        Self {
            trees: Vec::new(),
            dead_trees: Vec::new(),
            initial_trees: Vec::new(),
            ..self.clone()
        }
    }

    /// Carbon gained per simulated year.
    #[must_use]
    pub fn carbon_per_year(&self) -> f64 {
        let years = self.yearly_data.years().max(1);
        crate::finite_or_zero(self.carbon / years as f64)
    }

    /// Last recorded carbon sample.
    #[must_use]
    pub fn final_carbon(&self) -> f64 {
        self.yearly_data.carbon.last().copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{ScenarioRanges, Scenario};
    use crate::species::SpeciesCatalog;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn scenario() -> Scenario {
        Scenario::random(
            &SpeciesCatalog::default(),
            &ScenarioRanges::default(),
            &mut SmallRng::seed_from_u64(1),
        )
    }

    #[test]
    fn metrics_never_store_non_finite_values() {
        let mut data = YearlyData::default();
        data.push(f64::NAN, 0, f64::INFINITY, 1.0);
        assert_eq!(data.carbon, vec![0.0]);
        assert_eq!(data.biodiversity, vec![0.0]);
        assert_eq!(data.average_biodiversity(), 0.0);
        assert_eq!(YearlyData::default().average_biodiversity(), 0.0);
        data.push(1.0, 1, 0.5, 1.0);
        data.push(1.0, 1, 1.0, 1.0);
        assert_eq!(data.average_biodiversity(), 0.75);
    }

    #[test]
    fn record_uses_camel_case_wire_names() {
        let mut run = Run::pending(4, scenario());
        run.is_allocated = true;
        let json = serde_json::to_value(&run).expect("json");
        assert_eq!(json["isAllocated"], true);
        assert_eq!(json["averageBiodiversity"], 0.0);
        assert!(json["yearlyData"]["carbon"].is_array());
        assert!(json["initialTrees"].is_array());
    }

    #[test]
    fn carbon_per_year_handles_empty_series() {
        let mut run = Run::pending(1, scenario());
        run.carbon = 50.0;
        assert_eq!(run.carbon_per_year(), 50.0);
        run.yearly_data.carbon = vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(run.carbon_per_year(), 10.0);
        assert_eq!(run.final_carbon(), 50.0);
    }
}
