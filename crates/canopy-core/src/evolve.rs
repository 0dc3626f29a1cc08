//! Genetic search over planting scenarios.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::run::{Run, RunId};
use crate::scenario::{Scenario, ScenarioRanges, SpeciesMix};
use crate::species::SpeciesCatalog;

/// Errors surfaced by the evolver.
#[derive(Debug, Error, PartialEq)]
pub enum EvolverError {
    #[error("invalid evolver configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("run {0} is not part of the current generation")]
    UnknownRun(RunId),
    #[error("generation still has {pending} incomplete runs")]
    GenerationIncomplete { pending: usize },
    #[error("no generation has been started")]
    Inactive,
}

/// Genetic algorithm parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvolverConfig {
    pub population_size: usize,
    pub num_elites: usize,
    /// Share of non-elite slots filled by crossover children.
    pub crossover_fraction: f32,
    /// Share of non-elite slots filled by fresh random scenarios.
    pub random_fraction: f32,
    /// Generation budget; the search finishes after this many generations.
    pub max_generations: u32,
    /// Carry elites' completed run data forward instead of re-simulating them.
    pub preserve_elite_run_data: bool,
    pub ranges: ScenarioRanges,
    pub rng_seed: Option<u64>,
}

impl Default for EvolverConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            num_elites: 2,
            crossover_fraction: 0.7,
            random_fraction: 0.1,
            max_generations: 20,
            preserve_elite_run_data: true,
            ranges: ScenarioRanges::default(),
            rng_seed: None,
        }
    }
}

impl EvolverConfig {
    pub fn validate(&self) -> Result<(), EvolverError> {
        if self.population_size == 0 {
            return Err(EvolverError::InvalidConfig(
                "population_size must be non-zero",
            ));
        }
        if self.num_elites > self.population_size {
            return Err(EvolverError::InvalidConfig(
                "num_elites cannot exceed population_size",
            ));
        }
        let fraction = |value: f32| (0.0..=1.0).contains(&value);
        if !fraction(self.crossover_fraction)
            || !fraction(self.random_fraction)
            || self.crossover_fraction + self.random_fraction > 1.0
        {
            return Err(EvolverError::InvalidConfig(
                "crossover and random fractions must lie in [0, 1] and sum to at most 1",
            ));
        }
        if self.max_generations == 0 {
            return Err(EvolverError::InvalidConfig(
                "max_generations must be non-zero",
            ));
        }
        if !self.ranges.is_valid() {
            return Err(EvolverError::InvalidConfig(
                "scenario ranges must be ordered and non-negative",
            ));
        }
        Ok(())
    }

    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::seed_from_u64(rand::random()),
        }
    }
}

/// Runs evaluated together before the evolver produces the next generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Population {
    /// 1-based generation index.
    pub generation: u32,
    pub runs: Vec<Run>,
}

impl Population {
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Every run has reached its terminal year.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.runs.iter().all(|run| run.is_complete)
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.runs.iter().filter(|run| run.is_complete).count()
    }

    #[must_use]
    pub fn unallocated(&self) -> usize {
        self.runs.iter().filter(|run| !run.is_allocated).count()
    }

    #[must_use]
    pub fn get(&self, id: RunId) -> Option<&Run> {
        self.runs.iter().find(|run| run.id == id)
    }

    pub fn get_mut(&mut self, id: RunId) -> Option<&mut Run> {
        self.runs.iter_mut().find(|run| run.id == id)
    }

    /// Mark the first unallocated run as allocated and return it.
    pub fn allocate_next(&mut self) -> Option<&Run> {
        let run = self.runs.iter_mut().find(|run| !run.is_allocated)?;
        run.is_allocated = true;
        Some(run)
    }

    /// Replace the stored run carrying the same id.
    pub fn record(&mut self, run: Run) -> Result<(), EvolverError> {
        let slot = self
            .get_mut(run.id)
            .ok_or(EvolverError::UnknownRun(run.id))?;
        *slot = run;
        Ok(())
    }

    /// Highest-fitness run; ties keep the earliest.
    #[must_use]
    pub fn best(&self) -> Option<&Run> {
        self.runs
            .iter()
            .rev()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
    }

    /// Runs ordered by ascending fitness.
    fn ranked(&self) -> Vec<&Run> {
        let mut ranked: Vec<&Run> = self.runs.iter().collect();
        ranked.sort_by(|a, b| a.fitness.total_cmp(&b.fitness));
        ranked
    }
}

/// Archived outcome of one completed generation. Tree sets are dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationSummary {
    pub generation: u32,
    pub best_fitness: f64,
    pub best_run_id: Option<RunId>,
    pub runs: Vec<Run>,
}

/// What follows a concluded generation.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Continue(Population),
    Finished,
}

/// Generation bookkeeping plus the selection, crossover and mutation operators.
#[derive(Debug)]
pub struct ScenarioEvolver {
    config: EvolverConfig,
    catalog: SpeciesCatalog,
    rng: SmallRng,
    generation: u32,
    next_run_id: RunId,
    best: Option<Run>,
    archive: Vec<GenerationSummary>,
}

impl ScenarioEvolver {
    pub fn new(config: EvolverConfig, catalog: SpeciesCatalog) -> Result<Self, EvolverError> {
        config.validate()?;
        let rng = config.seeded_rng();
        Ok(Self {
            config,
            catalog,
            rng,
            generation: 0,
            next_run_id: 1,
            best: None,
            archive: Vec::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &EvolverConfig {
        &self.config
    }

    #[must_use]
    pub fn catalog(&self) -> &SpeciesCatalog {
        &self.catalog
    }

    /// Current generation index, 0 before `start`.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Best run seen across all concluded generations.
    #[must_use]
    pub fn best_run(&self) -> Option<&Run> {
        self.best.as_ref()
    }

    #[must_use]
    pub fn archive(&self) -> &[GenerationSummary] {
        &self.archive
    }

    #[must_use]
    pub fn best_fitness_by_generation(&self) -> Vec<f64> {
        self.archive.iter().map(|summary| summary.best_fitness).collect()
    }

    /// Ratio of the latest best fitness to the first generation's, 0 when undefined.
    ///
    /// `current` supplies the in-flight generation when the budget is not yet spent.
    #[must_use]
    pub fn fitness_improvement(&self, current: Option<&Population>) -> f64 {
        let Some(first) = self.archive.first().map(|summary| summary.best_fitness) else {
            return 0.0;
        };
        let latest = match current {
            Some(population) if self.archive.len() < self.config.max_generations as usize => {
                population.best().map_or(0.0, |run| run.fitness)
            }
            _ => self.archive.last().map_or(0.0, |summary| summary.best_fitness),
        };
        if first > 0.0 && latest > 0.0 {
            latest / first
        } else {
            0.0
        }
    }

    /// Forget all generations. Run ids keep increasing so stale events never alias new runs.
    pub fn reset(&mut self) {
        self.generation = 0;
        self.best = None;
        self.archive.clear();
    }

    fn pending_run(&mut self, scenario: Scenario) -> Run {
        let id = self.next_run_id;
        self.next_run_id += 1;
        Run::pending(id, scenario)
    }

    fn random_scenario(&mut self) -> Scenario {
        Scenario::random(&self.catalog, &self.config.ranges, &mut self.rng)
    }

    /// Begin generation 1 with uniformly random scenarios.
    pub fn start(&mut self) -> Population {
        self.reset();
        self.generation = 1;
        let runs = (0..self.config.population_size)
            .map(|_| {
                let scenario = self.random_scenario();
                self.pending_run(scenario)
            })
            .collect();
        Population {
            generation: self.generation,
            runs,
        }
    }

    /// Fold a fully evaluated generation into the best-ever run and the archive.
    pub fn conclude(&mut self, population: &Population) -> Result<GenerationSummary, EvolverError> {
        if self.generation == 0 {
            return Err(EvolverError::Inactive);
        }
        let pending = population.len() - population.completed();
        if pending > 0 {
            return Err(EvolverError::GenerationIncomplete { pending });
        }
        let best = population.best();
        let best_fitness = best.map_or(0.0, |run| run.fitness);
        if let Some(candidate) = best
            && candidate.fitness > self.best.as_ref().map_or(0.0, |run| run.fitness)
        {
            self.best = Some(candidate.clone());
        }
        let summary = GenerationSummary {
            generation: population.generation,
            best_fitness,
            best_run_id: best.map(|run| run.id),
            runs: population.runs.iter().map(Run::without_trees).collect(),
        };
        self.archive.push(summary.clone());
        Ok(summary)
    }

    /// Conclude `population` and either stop at the generation budget or breed the next one.
    pub fn advance(&mut self, population: &Population) -> Result<GenerationOutcome, EvolverError> {
        self.conclude(population)?;
        if self.generation >= self.config.max_generations {
            return Ok(GenerationOutcome::Finished);
        }
        Ok(GenerationOutcome::Continue(self.evolve(population)))
    }

    /// Breed the next generation from a ranked population.
    pub fn evolve(&mut self, population: &Population) -> Population {
        let ranked = population.ranked();
        let size = self.config.population_size;
        let elites: Vec<&Run> = ranked
            .iter()
            .rev()
            .take(self.config.num_elites)
            .copied()
            .collect();
        let open = size - elites.len();
        let crossovers = (open as f32 * self.config.crossover_fraction).floor() as usize;
        let randoms = (open as f32 * self.config.random_fraction).floor() as usize;
        let mutants = open - crossovers - randoms;

        let mut runs = Vec::with_capacity(size);
        for elite in &elites {
            if self.config.preserve_elite_run_data {
                runs.push((*elite).clone());
            } else {
                let scenario = elite.scenario.clone();
                runs.push(self.pending_run(scenario));
            }
        }
        for _ in 0..crossovers {
            let first = self.select_parent(&ranked);
            let second = self.select_parent(&ranked);
            let child = match (first, second) {
                (Some(a), Some(b)) => self.crossover(&a.scenario, &b.scenario),
                _ => self.random_scenario(),
            };
            runs.push(self.pending_run(child));
        }
        for _ in 0..randoms {
            let scenario = self.random_scenario();
            runs.push(self.pending_run(scenario));
        }
        for _ in 0..mutants {
            let parent = if elites.is_empty() {
                self.select_parent(&ranked)
            } else {
                Some(elites[self.rng.random_range(0..elites.len())])
            };
            let mutant = match parent {
                Some(parent) => self.mutate(&parent.scenario),
                None => self.random_scenario(),
            };
            runs.push(self.pending_run(mutant));
        }

        self.generation += 1;
        tracing::debug!(
            generation = self.generation,
            elites = elites.len(),
            crossovers,
            randoms,
            mutants,
            "bred generation"
        );
        Population {
            generation: self.generation,
            runs,
        }
    }

    /// Rank-biased pick from an ascending-sorted population.
    fn select_parent<'a>(&mut self, ranked: &[&'a Run]) -> Option<&'a Run> {
        if ranked.is_empty() {
            return None;
        }
        let draw = self.rng.random::<f64>().cbrt();
        let index = ((draw * ranked.len() as f64).floor() as usize).min(ranked.len() - 1);
        Some(ranked[index])
    }

    /// Cubic noise in `[0, 2]` concentrated around 1.
    fn mutation_multiplier(&mut self) -> f32 {
        let centered = (self.rng.random::<f32>() - 0.5) * 2.0;
        centered * centered * centered + 1.0
    }

    fn crossover(&mut self, a: &Scenario, b: &Scenario) -> Scenario {
        let rng = &mut self.rng;
        let mut from_a = || rng.random_bool(0.5);
        let weights: Vec<f32> = a
            .species_probabilities
            .as_slice()
            .iter()
            .zip(b.species_probabilities.as_slice())
            .map(|(&x, &y)| if from_a() { x } else { y })
            .collect();
        let child = Scenario {
            species_probabilities: SpeciesMix::normalized(weights),
            num_trees: if from_a() { a.num_trees } else { b.num_trees },
            declustering_strength: if from_a() {
                a.declustering_strength
            } else {
                b.declustering_strength
            },
            coppice_min_radius: if from_a() {
                a.coppice_min_radius
            } else {
                b.coppice_min_radius
            },
            coppice_chance: if from_a() {
                a.coppice_chance
            } else {
                b.coppice_chance
            },
            coppice_radius_spread: if from_a() {
                a.coppice_radius_spread
            } else {
                b.coppice_radius_spread
            },
        };
        self.mutate(&child)
    }

    fn mutate(&mut self, parent: &Scenario) -> Scenario {
        let num_trees = (parent.num_trees as f32 * self.mutation_multiplier())
            .round()
            .max(1.0) as u32;
        let declustering_strength = parent.declustering_strength * self.mutation_multiplier();
        let coppice_min_radius = parent.coppice_min_radius * self.mutation_multiplier();
        let coppice_chance = (parent.coppice_chance * self.mutation_multiplier()).min(1.0);
        let coppice_radius_spread = parent.coppice_radius_spread * self.mutation_multiplier();
        let weights: Vec<f32> = parent
            .species_probabilities
            .as_slice()
            .iter()
            .map(|&p| p * self.mutation_multiplier())
            .collect();
        Scenario {
            species_probabilities: SpeciesMix::normalized(weights),
            num_trees,
            declustering_strength,
            coppice_min_radius,
            coppice_chance,
            coppice_radius_spread,
        }
    }
}
