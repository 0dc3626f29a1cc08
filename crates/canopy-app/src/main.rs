use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use canopy_app::{
    AppConfig, RunScheduler, SchedulerEvent, SchedulerObserver, WorkerPool, pool::scheduler_inbox,
};
use canopy_core::{Forest, GenerationSummary, Run, Scenario, ScenarioEvolver, ShadeMethod};
use clap::{Parser, Subcommand, ValueEnum};
use rand::{SeedableRng, rngs::SmallRng};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "canopy",
    version,
    about = "Simulate forest stands and evolve planting scenarios"
)]
struct Cli {
    /// JSON configuration file; omitted sections use defaults.
    #[arg(long, global = true, env = "CANOPY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate a single scenario and print its run record.
    Simulate {
        /// Scenario JSON file; a random scenario is drawn when omitted.
        #[arg(long)]
        scenario: Option<PathBuf>,
        #[arg(long)]
        years: Option<u32>,
        #[arg(long, env = "CANOPY_SEED")]
        seed: Option<u64>,
        #[arg(long, value_enum)]
        shade: Option<ShadeArg>,
        /// Disable coppicing of crowded trees.
        #[arg(long)]
        no_harvest: bool,
        /// Write the run here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run the genetic optimizer across a pool of simulation workers.
    Optimize {
        #[arg(long, env = "CANOPY_WORKERS")]
        workers: Option<usize>,
        #[arg(long)]
        generations: Option<u32>,
        #[arg(long)]
        population: Option<usize>,
        #[arg(long)]
        years: Option<u32>,
        #[arg(long, env = "CANOPY_SEED")]
        seed: Option<u64>,
        #[arg(long, value_enum)]
        shade: Option<ShadeArg>,
        /// Stream full tree sets with every update (forces one worker).
        #[arg(long)]
        live: bool,
        /// Write the optimization report here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the species catalog in effect.
    Catalog,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ShadeArg {
    Analytic,
    Raster,
}

impl From<ShadeArg> for ShadeMethod {
    fn from(value: ShadeArg) -> Self {
        match value {
            ShadeArg::Analytic => ShadeMethod::Analytic,
            ShadeArg::Raster => ShadeMethod::Raster,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Command::Simulate {
            scenario,
            years,
            seed,
            shade,
            no_harvest,
            output,
        } => {
            let mut config = config;
            if let Some(seed) = seed {
                config.scheduler.simulation.rng_seed = Some(seed);
            }
            if let Some(shade) = shade {
                config.scheduler.simulation.shade_method = shade.into();
            }
            if no_harvest {
                config.scheduler.simulation.selective_harvesting = false;
            }
            let years = years.unwrap_or(config.scheduler.years_per_run);
            let run = simulate(&config, scenario.as_deref(), years)?;
            write_json(&run, output.as_deref())
        }
        Command::Optimize {
            workers,
            generations,
            population,
            years,
            seed,
            shade,
            live,
            output,
        } => {
            let mut config = config;
            if let Some(workers) = workers {
                config.scheduler.workers = workers;
            }
            if let Some(generations) = generations {
                config.evolver.max_generations = generations;
            }
            if let Some(population) = population {
                config.evolver.population_size = population;
            }
            if let Some(years) = years {
                config.scheduler.years_per_run = years;
            }
            if let Some(seed) = seed {
                config.scheduler.simulation.rng_seed = Some(seed);
                config.evolver.rng_seed = Some(seed);
            }
            if let Some(shade) = shade {
                config.scheduler.simulation.shade_method = shade.into();
            }
            config.scheduler.live_updates |= live;
            config.validate()?;
            let report = optimize(config)?;
            write_json(&report, output.as_deref())
        }
        Command::Catalog => write_json(&config.catalog, None),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn simulate(config: &AppConfig, scenario: Option<&Path>, years: u32) -> Result<Run> {
    let simulation = config.scheduler.simulation.clone();
    let scenario = match scenario {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read scenario {}", path.display()))?;
            let scenario: Scenario = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse scenario {}", path.display()))?;
            scenario.validated(&config.catalog)?
        }
        None => {
            let seed = simulation.rng_seed.unwrap_or_else(rand::random);
            let mut rng = SmallRng::seed_from_u64(seed);
            Scenario::random(&config.catalog, &config.evolver.ranges, &mut rng)
        }
    };
    info!(
        trees = scenario.num_trees,
        years,
        shade = ?simulation.shade_method,
        "simulating scenario"
    );
    let mut forest = Forest::new(simulation, config.catalog.clone(), scenario)?;
    for _ in 0..years {
        let summary = forest.step()?;
        debug!(
            year = summary.year,
            carbon = summary.carbon,
            trees = summary.tree_count,
            biodiversity = summary.biodiversity,
            food = summary.food_total,
            "year complete"
        );
    }
    let run = forest.into_run(1);
    info!(
        fitness = run.fitness,
        carbon = run.carbon,
        food = run.food,
        biodiversity = run.average_biodiversity,
        "simulation finished"
    );
    Ok(run)
}

/// Logs scheduler progress.
struct LogObserver;

impl SchedulerObserver for LogObserver {
    fn on_event(&mut self, event: &SchedulerEvent) {
        match event {
            SchedulerEvent::WorkersReady => info!("all workers ready"),
            SchedulerEvent::RunUpdated { run_id, year } => debug!(run_id, year, "run progress"),
            SchedulerEvent::RunCompleted { run_id, fitness } => {
                debug!(run_id, fitness, "run completed");
            }
            SchedulerEvent::RunFailed { run_id, reason } => warn!(run_id, %reason, "run failed"),
            SchedulerEvent::GenerationCompleted(summary) => info!(
                generation = summary.generation,
                best_fitness = summary.best_fitness,
                "generation complete"
            ),
            SchedulerEvent::SimulationFinished { best, elapsed } => info!(
                best_fitness = best.as_ref().map_or(0.0, |run| run.fitness),
                elapsed_ms = elapsed.as_millis() as u64,
                "optimization finished"
            ),
            SchedulerEvent::Stalled { generation, runs } => {
                warn!(generation, ?runs, "optimization stalled");
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeReport {
    best: Option<Run>,
    best_fitness_by_generation: Vec<f64>,
    fitness_improvement: f64,
    elapsed_ms: u128,
    generations: Vec<GenerationSummary>,
}

fn optimize(config: AppConfig) -> Result<OptimizeReport> {
    let AppConfig {
        scheduler: scheduler_config,
        evolver: evolver_config,
        catalog,
    } = config;
    let evolver = ScenarioEvolver::new(evolver_config, catalog)?;
    let (events, inbox) = scheduler_inbox();
    let pool = WorkerPool::spawn(scheduler_config.effective_workers(), &events)
        .context("failed to spawn simulation workers")?;
    drop(events);

    let mut scheduler =
        RunScheduler::new(scheduler_config, evolver, pool)?.with_observer(LogObserver);
    scheduler.ping_workers()?;
    let Some(best) = scheduler.run_to_completion(&inbox)? else {
        bail!("optimization was reset before finishing");
    };

    Ok(OptimizeReport {
        best: Some(best),
        best_fitness_by_generation: scheduler.best_fitness_by_generation(),
        fitness_improvement: scheduler.fitness_improvement(),
        elapsed_ms: scheduler.elapsed().map_or(0, |elapsed| elapsed.as_millis()),
        generations: scheduler.evolver().archive().to_vec(),
    })
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "wrote output");
        }
        None => println!("{json}"),
    }
    Ok(())
}
