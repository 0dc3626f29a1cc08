use canopy_app::{
    ControlCommand, RunScheduler, SchedulerConfig, SchedulerInput, SchedulerStatus, WorkerPool,
    pool::scheduler_inbox,
};
use canopy_core::{EvolverConfig, ScenarioEvolver, ScenarioRanges, SimulationConfig, SpeciesCatalog};

fn small_evolver() -> ScenarioEvolver {
    ScenarioEvolver::new(
        EvolverConfig {
            population_size: 4,
            num_elites: 1,
            max_generations: 2,
            ranges: ScenarioRanges {
                num_trees: (10, 20),
                ..ScenarioRanges::default()
            },
            rng_seed: Some(11),
            ..EvolverConfig::default()
        },
        SpeciesCatalog::default(),
    )
    .expect("evolver")
}

fn small_config() -> SchedulerConfig {
    SchedulerConfig {
        workers: 2,
        years_per_run: 3,
        stall_timeout_ms: 20_000,
        simulation: SimulationConfig {
            rng_seed: Some(5),
            ..SimulationConfig::default()
        },
        ..SchedulerConfig::default()
    }
}

#[test]
fn threaded_pool_completes_every_generation() {
    let (events, inbox) = scheduler_inbox();
    let pool = WorkerPool::spawn(2, &events).expect("spawn workers");
    let mut scheduler = RunScheduler::new(small_config(), small_evolver(), pool).expect("scheduler");
    scheduler.ping_workers().expect("ping");

    let best = scheduler
        .run_to_completion(&inbox)
        .expect("optimization")
        .expect("best run");

    assert_eq!(scheduler.status(), SchedulerStatus::Complete);
    let history = scheduler.best_fitness_by_generation();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|fitness| fitness.is_finite() && *fitness >= 0.0));
    assert!(scheduler.all_workers_ready());
    assert_eq!(best.yearly_data.years(), 3);
    assert!(best.is_complete);
    for summary in scheduler.evolver().archive() {
        assert_eq!(summary.runs.len(), 4);
        assert!(summary.runs.iter().all(|run| run.is_complete));
        assert!(summary.runs.iter().all(|run| run.trees.is_empty()));
    }
}

#[test]
fn pause_and_resume_through_the_inbox() {
    let (events, inbox) = scheduler_inbox();
    let pool = WorkerPool::spawn(2, &events).expect("spawn workers");
    let mut scheduler = RunScheduler::new(small_config(), small_evolver(), pool).expect("scheduler");
    scheduler.start().expect("start");
    events
        .send(SchedulerInput::Control(ControlCommand::Pause))
        .expect("send pause");
    events
        .send(SchedulerInput::Control(ControlCommand::Resume))
        .expect("send resume");

    let best = scheduler.run_to_completion(&inbox).expect("optimization");
    assert!(best.is_some());
    assert_eq!(scheduler.status(), SchedulerStatus::Complete);
}

#[test]
fn reset_ends_the_drive_loop_without_a_result() {
    let (events, inbox) = scheduler_inbox();
    let pool = WorkerPool::spawn(1, &events).expect("spawn workers");
    let config = SchedulerConfig {
        workers: 1,
        ..small_config()
    };
    let mut scheduler = RunScheduler::new(config, small_evolver(), pool).expect("scheduler");
    scheduler.start().expect("start");
    events
        .send(SchedulerInput::Control(ControlCommand::Reset))
        .expect("send reset");

    let best = scheduler.run_to_completion(&inbox).expect("reset is not an error");
    assert!(best.is_none());
    assert_eq!(scheduler.status(), SchedulerStatus::Idle);
    assert!(scheduler.population().is_empty());
}
