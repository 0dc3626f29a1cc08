//! Placeholder carbon, evenness and fitness formulas.

use crate::finite_or_zero;
use crate::species::SpeciesCatalog;
use crate::tree::Tree;

/// Divisor keeping fitness values in a readable range.
pub const FITNESS_SCALE: f64 = 1.0e6;

/// Carbon stored in a canopy of the given radius.
#[must_use]
pub fn carbon_content(radius: f32, scale: f64) -> f64 {
    let radius = f64::from(radius.max(0.0));
    finite_or_zero(radius * radius * radius * scale)
}

/// Species evenness of the living stand in `(0, 1]`, or 0 for an empty stand.
///
/// Sums the absolute deviation of each catalog species' share from `1 / catalog.len()`
/// and maps it through `(1 / (deviation + 1)) ^ exponent`.
#[must_use]
pub fn biodiversity_index(trees: &[Tree], catalog: &SpeciesCatalog, exponent: f64) -> f64 {
    let living = trees.iter().filter(|tree| !tree.is_dead).count();
    if living == 0 || catalog.is_empty() {
        return 0.0;
    }
    let mut counts = vec![0usize; catalog.len()];
    for tree in trees.iter().filter(|tree| !tree.is_dead) {
        if let Some(index) = catalog.index_of(&tree.species_id) {
            counts[index] += 1;
        }
    }
    let target = 1.0 / catalog.len() as f64;
    let deviation: f64 = counts
        .iter()
        .map(|&count| (count as f64 / living as f64 - target).abs())
        .sum();
    finite_or_zero((1.0 / (deviation + 1.0)).powf(exponent))
}

/// Terminal score: mean biodiversity × final carbon × √food, scaled down.
///
/// Coerces NaN, infinities and negatives to 0.
#[must_use]
pub fn run_fitness(average_biodiversity: f64, final_carbon: f64, total_food: f64) -> f64 {
    if !(total_food > 0.0) {
        return 0.0;
    }
    let fitness = average_biodiversity * final_carbon * total_food.sqrt() / FITNESS_SCALE;
    if fitness.is_finite() && fitness > 0.0 {
        fitness
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stand(ids: &[&str]) -> Vec<Tree> {
        ids.iter()
            .map(|id| Tree::sapling(0.0, 0.0, *id, "#000", 1.0))
            .collect()
    }

    #[test]
    fn carbon_grows_with_the_cube_of_radius() {
        assert_eq!(carbon_content(10.0, 0.01), 10.0);
        assert_eq!(carbon_content(-3.0, 0.01), 0.0);
        assert!(carbon_content(6.0, 1.0) > carbon_content(5.0, 1.0));
    }

    #[test]
    fn evenness_peaks_when_every_species_is_equally_present() {
        let catalog = SpeciesCatalog::default();
        let ids: Vec<&str> = catalog.iter().map(|species| species.id.as_str()).collect();
        let even = biodiversity_index(&stand(&ids), &catalog, 4.0);
        assert!((even - 1.0).abs() < 1e-9);
        let skewed = biodiversity_index(&stand(&["oak", "oak", "oak", "maple"]), &catalog, 4.0);
        assert!(skewed < even);
        assert!(skewed > 0.0);
    }

    #[test]
    fn empty_stand_has_zero_biodiversity() {
        let catalog = SpeciesCatalog::default();
        assert_eq!(biodiversity_index(&[], &catalog, 4.0), 0.0);
        let mut dead = stand(&["oak"]);
        dead[0].is_dead = true;
        assert_eq!(biodiversity_index(&dead, &catalog, 4.0), 0.0);
    }

    #[test]
    fn fitness_is_never_negative_or_nan() {
        assert_eq!(run_fitness(0.5, 1000.0, 0.0), 0.0);
        assert_eq!(run_fitness(0.0, 0.0, 4.0), 0.0);
        assert_eq!(run_fitness(f64::NAN, 10.0, 4.0), 0.0);
        assert_eq!(run_fitness(0.5, -10.0, 4.0), 0.0);
        assert_eq!(run_fitness(0.5, 1.0e6, f64::NAN), 0.0);
        assert_eq!(run_fitness(0.5, 1.0e6, 4.0), 1.0);
    }
}
