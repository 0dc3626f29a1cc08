//! Planting-time placement: random sowing, bounded decluttering and strict overlap resolution.

use canopy_index::{NeighborhoodIndex, UniformGridIndex};
use rand::Rng;
use tracing::{debug, warn};

use crate::scenario::Scenario;
use crate::species::SpeciesCatalog;
use crate::tree::{Tree, positions};
use crate::{SimulationConfig, SimulationError};

/// Plant saplings until the stand holds `target` trees or the round budget is spent.
///
/// Each round sows the shortfall at random positions, declutters the whole stand
/// and prunes anything pushed off the plot.
pub fn plant_until<R: Rng + ?Sized>(
    trees: &mut Vec<Tree>,
    target: usize,
    scenario: &Scenario,
    catalog: &SpeciesCatalog,
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<(), SimulationError> {
    for round in 0..config.max_planting_rounds {
        let remaining = target.saturating_sub(trees.len());
        if remaining == 0 {
            return Ok(());
        }
        for _ in 0..remaining {
            trees.push(random_sapling(scenario, catalog, config, rng)?);
        }
        declutter(
            trees,
            catalog,
            scenario.declustering_strength,
            config,
            rng,
        )?;
        let pruned = prune_out_of_bounds(trees, config);
        debug!(round, planted = remaining, pruned, total = trees.len(), "planting round");
    }
    if trees.len() < target {
        warn!(
            planted = trees.len(),
            target,
            rounds = config.max_planting_rounds,
            "planting round budget exhausted before reaching target"
        );
    }
    Ok(())
}

fn random_sapling<R: Rng + ?Sized>(
    scenario: &Scenario,
    catalog: &SpeciesCatalog,
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<Tree, SimulationError> {
    let index = scenario.species_probabilities.sample_index(rng);
    let species = catalog
        .get(index)
        .ok_or(SimulationError::InvalidConfig("species index outside catalog"))?;
    let size_multiplier =
        rng.random_range(config.size_multiplier_min..=config.size_multiplier_max);
    Ok(Tree::sapling(
        rng.random::<f32>() * config.plot_width,
        rng.random::<f32>() * config.plot_height,
        species.id.as_str(),
        species.color.as_str(),
        size_multiplier,
    ))
}

pub(crate) fn mature_radii(
    trees: &[Tree],
    catalog: &SpeciesCatalog,
) -> Result<Vec<f32>, SimulationError> {
    trees
        .iter()
        .map(|tree| {
            catalog
                .by_id(&tree.species_id)
                .map(|species| species.max_radius)
                .ok_or_else(|| SimulationError::UnknownSpecies(tree.species_id.clone()))
        })
        .collect()
}

fn random_unit<R: Rng + ?Sized>(rng: &mut R) -> (f32, f32) {
    let angle = rng.random::<f32>() * std::f32::consts::TAU;
    (angle.cos(), angle.sin())
}

/// Bounded repulsion relaxation over the whole stand.
///
/// Every tree is pushed away from its nearest neighbors by the amount their
/// mature canopies would overlap, scaled by `strength`. Runs a fixed number of passes
/// and does not guarantee an overlap-free result.
pub fn declutter<R: Rng + ?Sized>(
    trees: &mut [Tree],
    catalog: &SpeciesCatalog,
    strength: f32,
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<(), SimulationError> {
    if strength <= 0.0 || trees.len() < 2 {
        return Ok(());
    }
    let mature = mature_radii(trees, catalog)?;
    let mut index = UniformGridIndex::new(
        config.declutter_cutoff.max(1.0),
        config.plot_width,
        config.plot_height,
    );
    for _ in 0..config.declutter_passes {
        index.rebuild(&positions(trees))?;
        for subject in 0..trees.len() {
            let near = index.nearest(subject, config.declutter_neighbors, config.declutter_cutoff);
            for (other, _) in near {
                let dx = trees[other].x - trees[subject].x;
                let dy = trees[other].y - trees[subject].y;
                let distance = (dx * dx + dy * dy).sqrt();
                let repulsion = (mature[subject] + mature[other] - distance) * strength;
                if repulsion <= 0.0 {
                    continue;
                }
                let (ux, uy) = if distance > f32::EPSILON {
                    (dx / distance, dy / distance)
                } else {
                    random_unit(rng)
                };
                trees[subject].x -= ux * repulsion;
                trees[subject].y -= uy * repulsion;
            }
        }
    }
    Ok(())
}

/// Drop trees positioned outside the plot. Returns how many were removed.
pub fn prune_out_of_bounds(trees: &mut Vec<Tree>, config: &SimulationConfig) -> usize {
    let before = trees.len();
    trees.retain(|tree| config.contains(tree.x, tree.y));
    before - trees.len()
}

fn overlapping_pairs(trees: &[Tree], index: &UniformGridIndex) -> Vec<(usize, usize)> {
    let largest = trees.iter().map(|tree| tree.radius).fold(0.0, f32::max);
    let mut pairs = Vec::new();
    for (subject, tree) in trees.iter().enumerate() {
        let reach = tree.radius + largest;
        if reach <= 0.0 {
            continue;
        }
        index.neighbors_within(subject, reach * reach, &mut |other, dist_sq| {
            let sum = tree.radius + trees[other].radius;
            if dist_sq.0.sqrt() < sum {
                pairs.push((subject, other));
            }
        });
    }
    pairs.sort_unstable();
    pairs
}

/// Push overlapping canopies apart one unit at a time until none overlap.
///
/// Trees pushed off the plot are pruned after every pass. Returns the number of
/// passes taken; a stand without overlaps is left untouched.
pub fn resolve_overlaps<R: Rng + ?Sized>(
    trees: &mut Vec<Tree>,
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<usize, SimulationError> {
    let mut index = UniformGridIndex::new(
        config.declutter_cutoff.max(1.0),
        config.plot_width,
        config.plot_height,
    );
    let mut passes = 0;
    loop {
        index.rebuild(&positions(trees))?;
        let pairs = overlapping_pairs(trees, &index);
        if pairs.is_empty() {
            return Ok(passes);
        }
        if passes == config.max_overlap_passes {
            return Err(SimulationError::OverlapUnresolved { passes });
        }
        for (subject, other) in pairs {
            let dx = trees[other].x - trees[subject].x;
            let dy = trees[other].y - trees[subject].y;
            let distance = (dx * dx + dy * dy).sqrt();
            let (ux, uy) = if distance > f32::EPSILON {
                (dx / distance, dy / distance)
            } else {
                random_unit(rng)
            };
            trees[subject].x -= ux;
            trees[subject].y -= uy;
        }
        prune_out_of_bounds(trees, config);
        passes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{ScenarioRanges, SpeciesMix};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn scenario(catalog: &SpeciesCatalog, num_trees: u32, strength: f32) -> Scenario {
        Scenario {
            species_probabilities: SpeciesMix::uniform(catalog),
            num_trees,
            declustering_strength: strength,
            coppice_min_radius: 10.0,
            coppice_chance: 0.0,
            coppice_radius_spread: 5.0,
        }
    }

    fn sized(x: f32, y: f32, radius: f32) -> Tree {
        let mut tree = Tree::sapling(x, y, "hazel", "#000", 1.0);
        tree.radius = radius;
        tree
    }

    #[test]
    fn planting_fills_the_target_inside_the_plot() {
        let catalog = SpeciesCatalog::default();
        let config = SimulationConfig::default();
        let mut rng = SmallRng::seed_from_u64(9);
        let mut trees = Vec::new();
        plant_until(&mut trees, 150, &scenario(&catalog, 150, 0.01), &catalog, &config, &mut rng)
            .expect("plant");
        assert_eq!(trees.len(), 150);
        assert!(trees.iter().all(|tree| config.contains(tree.x, tree.y)));
        assert!(trees.iter().all(|tree| tree.radius == 0.0 && tree.health == 1.0));
    }

    #[test]
    fn random_scenario_planting_is_deterministic() {
        let catalog = SpeciesCatalog::default();
        let config = SimulationConfig::default();
        let plant = || {
            let mut rng = SmallRng::seed_from_u64(21);
            let scenario = Scenario::random(&catalog, &ScenarioRanges::default(), &mut rng);
            let mut trees = Vec::new();
            plant_until(&mut trees, scenario.num_trees as usize, &scenario, &catalog, &config, &mut rng)
                .expect("plant");
            trees
        };
        assert_eq!(plant(), plant());
    }

    #[test]
    fn declutter_spreads_crowded_trees_apart() {
        let catalog = SpeciesCatalog::default();
        let config = SimulationConfig::default();
        let mut trees = vec![sized(300.0, 88.0, 0.0), sized(305.0, 88.0, 0.0)];
        let before = trees[0].distance_to(&trees[1]);
        declutter(&mut trees, &catalog, 0.1, &config, &mut SmallRng::seed_from_u64(1))
            .expect("declutter");
        assert!(trees[0].distance_to(&trees[1]) > before);
    }

    #[test]
    fn declutter_moves_established_trees_too() {
        let catalog = SpeciesCatalog::default();
        let config = SimulationConfig::default();
        let mut trees = vec![
            sized(100.0, 88.0, 0.0),
            sized(500.0, 88.0, 0.0),
            sized(101.0, 88.0, 0.0),
        ];
        declutter(&mut trees, &catalog, 0.1, &config, &mut SmallRng::seed_from_u64(1))
            .expect("declutter");
        assert!(trees[0].x < 100.0, "established tree stayed put");
        assert!(trees[2].x > 101.0);
        assert!(trees[0].distance_to(&trees[2]) > 1.0);
    }

    #[test]
    fn unknown_species_is_reported() {
        let catalog = SpeciesCatalog::default();
        let config = SimulationConfig::default();
        let mut trees = vec![sized(1.0, 1.0, 0.0), Tree::sapling(2.0, 2.0, "teak", "#000", 1.0)];
        assert!(matches!(
            declutter(&mut trees, &catalog, 0.5, &config, &mut SmallRng::seed_from_u64(1)),
            Err(SimulationError::UnknownSpecies(id)) if id == "teak"
        ));
    }

    #[test]
    fn overlap_resolution_separates_canopies() {
        let config = SimulationConfig::default();
        let mut trees = vec![sized(300.0, 88.0, 5.0), sized(306.0, 88.0, 5.0), sized(300.0, 95.0, 4.0)];
        let passes = resolve_overlaps(&mut trees, &config, &mut SmallRng::seed_from_u64(2))
            .expect("resolve");
        assert!(passes > 0);
        for (i, a) in trees.iter().enumerate() {
            for b in &trees[i + 1..] {
                assert!(!a.overlaps(b));
            }
        }
    }

    #[test]
    fn overlap_resolution_gives_up_after_the_pass_budget() {
        let config = SimulationConfig {
            max_overlap_passes: 1,
            ..SimulationConfig::default()
        };
        let mut trees = vec![sized(300.0, 88.0, 20.0), sized(301.0, 88.0, 20.0)];
        assert!(matches!(
            resolve_overlaps(&mut trees, &config, &mut SmallRng::seed_from_u64(2)),
            Err(SimulationError::OverlapUnresolved { passes: 1 })
        ));
    }

    #[test]
    fn pruning_drops_only_trees_off_the_plot() {
        let config = SimulationConfig::default();
        let mut trees = vec![sized(-1.0, 5.0, 0.0), sized(10.0, 5.0, 0.0), sized(10.0, 177.0, 0.0)];
        assert_eq!(prune_out_of_bounds(&mut trees, &config), 2);
        assert_eq!(trees.len(), 1);
    }
}
