//! Year-by-year simulation of a single planted stand.

use canopy_index::{NeighborhoodIndex, UniformGridIndex};
use rand::Rng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::fitness::{biodiversity_index, carbon_content, run_fitness};
use crate::planting::{declutter, plant_until, prune_out_of_bounds};
use crate::run::{Run, RunId, YearlyData};
use crate::scenario::Scenario;
use crate::shade::{ShadeModel, model_for};
use crate::species::{Species, SpeciesCatalog};
use crate::tree::{Tree, positions};
use crate::{SimulationConfig, SimulationError};

/// Metrics and event counts produced by one simulated year.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct YearSummary {
    pub year: u32,
    /// Dead-carbon bank plus carbon held by living canopies.
    pub carbon: f64,
    pub tree_count: usize,
    pub biodiversity: f64,
    /// Food harvested during this year only.
    pub food_harvested: f64,
    /// Cumulative food harvested since planting.
    pub food_total: f64,
    pub coppiced: usize,
    pub deaths: usize,
    pub seedlings: usize,
    pub pruned: usize,
}

/// Mutable state of one stand. Owned by exactly one worker while it runs.
pub struct Forest {
    config: SimulationConfig,
    catalog: SpeciesCatalog,
    scenario: Scenario,
    rng: SmallRng,
    trees: Vec<Tree>,
    initial_trees: Vec<Tree>,
    dead_trees: Vec<Tree>,
    dead_carbon: f64,
    food_total: f64,
    year: u32,
    yearly: YearlyData,
    shade: Box<dyn ShadeModel>,
    index: UniformGridIndex,
}

impl std::fmt::Debug for Forest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forest")
            .field("year", &self.year)
            .field("trees", &self.trees.len())
            .field("dead_carbon", &self.dead_carbon)
            .field("food_total", &self.food_total)
            .field("shade", &self.shade.name())
            .finish()
    }
}

impl Forest {
    /// Validate inputs and plant the scenario's initial stand.
    pub fn new(
        config: SimulationConfig,
        catalog: SpeciesCatalog,
        scenario: Scenario,
    ) -> Result<Self, SimulationError> {
        let mut forest = Self::empty(config, catalog, scenario)?;
        let mut trees = Vec::with_capacity(forest.scenario.num_trees as usize);
        plant_until(
            &mut trees,
            forest.scenario.num_trees as usize,
            &forest.scenario,
            &forest.catalog,
            &forest.config,
            &mut forest.rng,
        )?;
        forest.seed_stand(trees);
        Ok(forest)
    }

    /// Start from an explicit stand instead of random planting.
    pub fn with_initial_trees(
        config: SimulationConfig,
        catalog: SpeciesCatalog,
        scenario: Scenario,
        trees: Vec<Tree>,
    ) -> Result<Self, SimulationError> {
        let mut forest = Self::empty(config, catalog, scenario)?;
        if let Some(tree) = trees
            .iter()
            .find(|tree| forest.catalog.by_id(&tree.species_id).is_none())
        {
            return Err(SimulationError::UnknownSpecies(tree.species_id.clone()));
        }
        forest.seed_stand(trees);
        Ok(forest)
    }

    fn empty(
        config: SimulationConfig,
        catalog: SpeciesCatalog,
        scenario: Scenario,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let scenario = scenario.validated(&catalog)?;
        let rng = config.seeded_rng();
        let shade = model_for(&config);
        let index = UniformGridIndex::new(
            config.declutter_cutoff.max(1.0),
            config.plot_width,
            config.plot_height,
        );
        Ok(Self {
            config,
            catalog,
            scenario,
            rng,
            trees: Vec::new(),
            initial_trees: Vec::new(),
            dead_trees: Vec::new(),
            dead_carbon: 0.0,
            food_total: 0.0,
            year: 0,
            yearly: YearlyData::default(),
            shade,
            index,
        })
    }

    fn seed_stand(&mut self, trees: Vec<Tree>) {
        self.initial_trees = trees.clone();
        self.trees = trees;
        let (carbon, count, biodiversity) = self.stand_metrics();
        self.yearly.push(carbon, count as u32, biodiversity, self.food_total);
    }

    #[must_use]
    pub fn year(&self) -> u32 {
        self.year
    }

    #[must_use]
    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    #[must_use]
    pub fn initial_trees(&self) -> &[Tree] {
        &self.initial_trees
    }

    #[must_use]
    pub fn dead_trees(&self) -> &[Tree] {
        &self.dead_trees
    }

    /// Carbon credited from dead and coppiced canopies. Never decreases.
    #[must_use]
    pub fn dead_carbon(&self) -> f64 {
        self.dead_carbon
    }

    #[must_use]
    pub fn food_total(&self) -> f64 {
        self.food_total
    }

    #[must_use]
    pub fn yearly_data(&self) -> &YearlyData {
        &self.yearly
    }

    #[must_use]
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub fn shade_model(&self) -> &'static str {
        self.shade.name()
    }

    fn species_for(&self, tree: &Tree) -> Result<&Species, SimulationError> {
        self.catalog
            .by_id(&tree.species_id)
            .ok_or_else(|| SimulationError::UnknownSpecies(tree.species_id.clone()))
    }

    /// Advance the stand by one year.
    pub fn step(&mut self) -> Result<YearSummary, SimulationError> {
        let coppiced = if self.config.selective_harvesting {
            self.stage_selective_harvest()?
        } else {
            0
        };
        let food_harvested = if self.config.food_harvest {
            self.stage_food_harvest()?
        } else {
            0.0
        };
        self.stage_canopy()?;
        let deaths = self.stage_mortality()?;
        let seedlings = self.stage_seed_dispersal()?;
        let pruned = self.stage_boundary_prune();

        self.year += 1;
        let (carbon, tree_count, biodiversity) = self.stand_metrics();
        self.yearly
            .push(carbon, tree_count as u32, biodiversity, self.food_total);
        Ok(YearSummary {
            year: self.year,
            carbon,
            tree_count,
            biodiversity,
            food_harvested,
            food_total: self.food_total,
            coppiced,
            deaths,
            seedlings,
            pruned,
        })
    }

    /// Advance `years` years, returning the last summary.
    pub fn run_years(&mut self, years: u32) -> Result<Option<YearSummary>, SimulationError> {
        let mut last = None;
        for _ in 0..years {
            last = Some(self.step()?);
        }
        Ok(last)
    }

    fn stage_selective_harvest(&mut self) -> Result<usize, SimulationError> {
        if self.scenario.coppice_chance <= 0.0 || self.trees.len() < 2 {
            return Ok(0);
        }
        let min_radius = self.scenario.coppice_min_radius;
        let max_radius = self.scenario.coppice_max_radius();
        self.index.rebuild(&positions(&self.trees))?;
        let mut eligible: Vec<usize> = self
            .trees
            .iter()
            .enumerate()
            .filter(|(idx, tree)| {
                tree.radius >= min_radius
                    && tree.radius <= max_radius
                    && tree.stem_age >= self.config.min_coppice_age
                    && !self.index.nearest(*idx, 1, tree.radius / 4.0).is_empty()
            })
            .map(|(idx, _)| idx)
            .collect();
        let quota = (eligible.len() as f32 * self.scenario.coppice_chance).floor() as usize;
        if quota == 0 {
            return Ok(0);
        }
        eligible.shuffle(&mut self.rng);
        for &idx in eligible.iter().take(quota) {
            let tree = &mut self.trees[idx];
            self.dead_carbon += carbon_content(tree.radius, self.config.carbon_scale);
            tree.radius = 0.0;
            tree.stem_age = 0;
        }
        Ok(quota)
    }

    fn stage_food_harvest(&mut self) -> Result<f64, SimulationError> {
        let mut harvested = 0.0;
        for tree in &self.trees {
            let species = self.species_for(tree)?;
            if let Some(productivity) = species.food_productivity {
                let usable = (tree.radius - self.config.min_food_radius).max(0.0);
                harvested += f64::from(productivity) * f64::from(usable * usable);
            }
        }
        let harvested = crate::finite_or_zero(harvested);
        self.food_total += harvested;
        Ok(harvested)
    }

    fn stage_canopy(&mut self) -> Result<(), SimulationError> {
        self.shade.prepare(&self.trees)?;
        let model = self.shade.as_ref();
        let trees = &self.trees;
        let shade: Vec<f32> = (0..trees.len())
            .into_par_iter()
            .map(|idx| model.shade_intensity(idx, trees))
            .collect();

        let config = &self.config;
        for (tree, shade) in self.trees.iter_mut().zip(shade) {
            let species = self
                .catalog
                .by_id(&tree.species_id)
                .ok_or_else(|| SimulationError::UnknownSpecies(tree.species_id.clone()))?;
            tree.age += 1;
            tree.stem_age += 1;
            if shade > species.shade_tolerance {
                let damping = (tree.stem_age as f32).powf(config.shade_age_exponent);
                tree.health -= (shade - species.shade_tolerance) / damping;
            } else {
                tree.health = (tree.health + config.health_recovery).min(1.0);
            }
            let ceiling = species.max_radius * tree.size_multiplier;
            let growth = species.growth_rate
                * config.growth_multiplier
                * tree.size_multiplier
                * (1.0 - shade);
            if tree.radius < ceiling {
                tree.radius = (tree.radius + growth.max(0.0)).min(ceiling);
            }
        }
        Ok(())
    }

    fn stage_mortality(&mut self) -> Result<usize, SimulationError> {
        let mut survivors = Vec::with_capacity(self.trees.len());
        let mut deaths = 0;
        for mut tree in std::mem::take(&mut self.trees) {
            let lifespan = self.species_for(&tree)?.lifespan;
            if tree.health < 0.0 || tree.stem_age > lifespan {
                self.dead_carbon += carbon_content(tree.radius, self.config.carbon_scale);
                tree.is_dead = true;
                self.dead_trees.push(tree);
                deaths += 1;
            } else {
                survivors.push(tree);
            }
        }
        self.trees = survivors;
        Ok(deaths)
    }

    fn stage_seed_dispersal(&mut self) -> Result<usize, SimulationError> {
        let config = &self.config;
        let rng = &mut self.rng;
        let mut seedlings = Vec::new();
        for tree in &self.trees {
            let threshold =
                config.min_reproductive_age as f32 + rng.random::<f32>() * config.reproductive_age_jitter;
            if (tree.stem_age as f32) < threshold {
                continue;
            }
            let count = (rng.random::<f32>() * config.max_seedlings * (tree.stem_age as f32).sqrt()
                / 3.0)
                .round() as usize;
            let scatter = config.seed_distance_multiplier * tree.radius;
            for _ in 0..count {
                let x = tree.x + (rng.random::<f32>() - 0.5) * scatter;
                let y = tree.y + (rng.random::<f32>() - 0.5) * scatter;
                seedlings.push(tree.seedling_at(x, y));
            }
        }
        let added = seedlings.len();
        if added > 0 {
            self.trees.extend(seedlings);
            declutter(
                &mut self.trees,
                &self.catalog,
                self.scenario.declustering_strength,
                &self.config,
                &mut self.rng,
            )?;
        }
        Ok(added)
    }

    fn stage_boundary_prune(&mut self) -> usize {
        prune_out_of_bounds(&mut self.trees, &self.config)
    }

    fn stand_metrics(&self) -> (f64, usize, f64) {
        let living: f64 = self
            .trees
            .iter()
            .map(|tree| carbon_content(tree.radius, self.config.carbon_scale))
            .sum();
        let carbon = crate::finite_or_zero(self.dead_carbon + living);
        let biodiversity =
            biodiversity_index(&self.trees, &self.catalog, self.config.biodiversity_exponent);
        (carbon, self.trees.len(), biodiversity)
    }

    /// Snapshot as an in-progress run record. Tree sets are included only when requested.
    #[must_use]
    pub fn progress(&self, id: RunId, include_trees: bool) -> Run {
        let mut run = Run::pending(id, self.scenario.clone());
        run.yearly_data = self.yearly.clone();
        run.carbon = self.yearly.carbon.last().copied().unwrap_or(0.0);
        run.food = self.food_total;
        run.average_biodiversity = self.yearly.average_biodiversity();
        run.is_allocated = true;
        if include_trees {
            run.trees = self.trees.clone();
        }
        run
    }

    /// Consume the stand into a completed, scored run.
    #[must_use]
    pub fn into_run(self, id: RunId) -> Run {
        let average_biodiversity = self.yearly.average_biodiversity();
        let carbon = self.yearly.carbon.last().copied().unwrap_or(0.0);
        Run {
            id,
            fitness: run_fitness(average_biodiversity, carbon, self.food_total),
            carbon,
            average_biodiversity,
            food: self.food_total,
            scenario: self.scenario,
            yearly_data: self.yearly,
            trees: self.trees,
            dead_trees: self.dead_trees,
            initial_trees: self.initial_trees,
            is_allocated: true,
            is_complete: true,
        }
    }
}
