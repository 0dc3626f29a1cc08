//! Individual trees on the plot.

use serde::{Deserialize, Serialize};

/// One tree. `stem_age` restarts when coppiced; `age` never does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tree {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub species_id: String,
    pub color: String,
    pub age: u32,
    pub stem_age: u32,
    /// Fraction of the species' maximum radius this individual can reach.
    pub size_multiplier: f32,
    /// At most 1; the tree dies once this drops below 0.
    pub health: f32,
    #[serde(default)]
    pub is_dead: bool,
}

impl Tree {
    /// A freshly planted tree with no canopy yet.
    #[must_use]
    pub fn sapling(
        x: f32,
        y: f32,
        species_id: impl Into<String>,
        color: impl Into<String>,
        size_multiplier: f32,
    ) -> Self {
        Self {
            x,
            y,
            radius: 0.0,
            species_id: species_id.into(),
            color: color.into(),
            age: 0,
            stem_age: 0,
            size_multiplier,
            health: 1.0,
            is_dead: false,
        }
    }

    /// Seedling dropped by this tree at the given position.
    #[must_use]
    pub fn seedling_at(&self, x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            radius: 0.0,
            age: 0,
            stem_age: 0,
            health: 1.0,
            is_dead: false,
            species_id: self.species_id.clone(),
            color: self.color.clone(),
            size_multiplier: self.size_multiplier,
        }
    }

    #[must_use]
    pub fn distance_to(&self, other: &Tree) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    #[must_use]
    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    /// Whether the two canopies intersect.
    #[must_use]
    pub fn overlaps(&self, other: &Tree) -> bool {
        self.distance_to(other) < self.radius + other.radius
    }

    /// Canopy area.
    #[must_use]
    pub fn area(&self) -> f32 {
        std::f32::consts::PI * self.radius * self.radius
    }
}

pub(crate) fn positions(trees: &[Tree]) -> Vec<(f32, f32)> {
    trees.iter().map(Tree::position).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seedling_inherits_lineage_but_resets_growth() {
        let mut parent = Tree::sapling(10.0, 10.0, "oak", "#f00", 0.8);
        parent.radius = 12.0;
        parent.age = 40;
        parent.stem_age = 30;
        parent.health = 0.4;
        let child = parent.seedling_at(14.0, 9.0);
        assert_eq!(child.species_id, "oak");
        assert_eq!(child.size_multiplier, 0.8);
        assert_eq!((child.radius, child.age, child.stem_age), (0.0, 0, 0));
        assert_eq!(child.health, 1.0);
    }

    #[test]
    fn overlap_requires_canopies_to_intersect() {
        let mut a = Tree::sapling(0.0, 0.0, "a", "#000", 1.0);
        let mut b = Tree::sapling(10.0, 0.0, "a", "#000", 1.0);
        a.radius = 5.0;
        b.radius = 5.0;
        assert!(!a.overlaps(&b));
        b.radius = 5.5;
        assert!(a.overlaps(&b));
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let tree = Tree::sapling(1.0, 2.0, "oak", "#f00", 0.5);
        let json = serde_json::to_value(&tree).expect("json");
        assert_eq!(json["speciesId"], "oak");
        assert_eq!(json["stemAge"], 0);
        assert_eq!(json["sizeMultiplier"], 0.5);
    }
}
