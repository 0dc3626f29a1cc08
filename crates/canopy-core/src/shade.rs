//! Interchangeable estimators of how much of a canopy is shaded by its neighbors.

use canopy_index::{IndexError, NeighborhoodIndex, UniformGridIndex};

use crate::tree::{Tree, positions};
use crate::{ShadeMethod, SimulationConfig, clamp01};

/// Lens-area factor applied to the squared overlap chord.
pub const OVERLAP_FACTOR: f32 = 0.433;
/// Opacity each canopy stamps onto the raster.
pub const CANOPY_ALPHA: f32 = 0.1;

/// Shade estimation contract shared by the analytic and raster methods.
///
/// `prepare` is called once per year with the living stand; `shade_intensity`
/// is then queried for each tree (possibly in parallel) and returns a value in `[0, 1]`.
pub trait ShadeModel: Send + Sync {
    fn name(&self) -> &'static str;

    fn prepare(&mut self, trees: &[Tree]) -> Result<(), IndexError>;

    fn shade_intensity(&self, subject: usize, trees: &[Tree]) -> f32;
}

/// Construct the model selected by `config.shade_method`.
#[must_use]
pub fn model_for(config: &SimulationConfig) -> Box<dyn ShadeModel> {
    match config.shade_method {
        ShadeMethod::Analytic => Box::new(AnalyticOverlap::new(config)),
        ShadeMethod::Raster => Box::new(RasterShadeMap::new(config)),
    }
}

/// Pairwise canopy-overlap approximation backed by a bucket grid.
#[derive(Debug, Clone)]
pub struct AnalyticOverlap {
    shader_age_ratio: f32,
    index: UniformGridIndex,
    largest_radius: f32,
}

impl AnalyticOverlap {
    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            shader_age_ratio: config.shader_age_ratio,
            index: UniformGridIndex::new(
                config.declutter_cutoff.max(1.0),
                config.plot_width,
                config.plot_height,
            ),
            largest_radius: 0.0,
        }
    }
}

impl ShadeModel for AnalyticOverlap {
    fn name(&self) -> &'static str {
        "analytic"
    }

    fn prepare(&mut self, trees: &[Tree]) -> Result<(), IndexError> {
        self.largest_radius = trees.iter().map(|tree| tree.radius).fold(0.0, f32::max);
        self.index.rebuild(&positions(trees))
    }

    fn shade_intensity(&self, subject: usize, trees: &[Tree]) -> f32 {
        let Some(tree) = trees.get(subject) else {
            return 0.0;
        };
        let reach = tree.radius + self.largest_radius;
        if reach <= 0.0 {
            return 0.0;
        }
        let min_shader_age = self.shader_age_ratio * tree.stem_age as f32;
        let mut overlap_area = 0.0;
        let mut overlapping = false;
        self.index
            .neighbors_within(subject, reach * reach, &mut |other, dist_sq| {
                let shader = &trees[other];
                let chord = tree.radius + shader.radius - dist_sq.0.sqrt();
                if chord > 0.0 && shader.stem_age as f32 > min_shader_age {
                    overlapping = true;
                    overlap_area += OVERLAP_FACTOR * chord * chord * 2.0;
                }
            });
        let own_area = tree.area();
        if own_area > 0.0 {
            clamp01(overlap_area / own_area)
        } else if overlapping {
            1.0
        } else {
            0.0
        }
    }
}

/// Accumulated-opacity bitmap with one pixel per world unit.
#[derive(Debug, Clone)]
pub struct RasterShadeMap {
    width: usize,
    height: usize,
    alpha: Vec<f32>,
}

impl RasterShadeMap {
    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        let width = config.plot_width.ceil().max(1.0) as usize;
        let height = config.plot_height.ceil().max(1.0) as usize;
        Self {
            width,
            height,
            alpha: vec![0.0; width * height],
        }
    }

    /// Pixel bounds `(x0, x1, y0, y1)` (inclusive) covered by a disc.
    fn footprint(&self, tree: &Tree) -> Option<(usize, usize, usize, usize)> {
        let clamp_x = |v: f32| v.floor().clamp(0.0, (self.width - 1) as f32) as usize;
        let clamp_y = |v: f32| v.floor().clamp(0.0, (self.height - 1) as f32) as usize;
        if tree.x + tree.radius < 0.0
            || tree.y + tree.radius < 0.0
            || tree.x - tree.radius > self.width as f32
            || tree.y - tree.radius > self.height as f32
        {
            return None;
        }
        Some((
            clamp_x(tree.x - tree.radius),
            clamp_x(tree.x + tree.radius),
            clamp_y(tree.y - tree.radius),
            clamp_y(tree.y + tree.radius),
        ))
    }

    fn covers(tree: &Tree, px: usize, py: usize) -> bool {
        let dx = px as f32 + 0.5 - tree.x;
        let dy = py as f32 + 0.5 - tree.y;
        dx * dx + dy * dy <= tree.radius * tree.radius
    }

    fn pixel_sun(alpha: f32) -> f32 {
        CANOPY_ALPHA - (alpha - CANOPY_ALPHA).clamp(0.0, CANOPY_ALPHA)
    }

    /// Accumulated opacity at a world position.
    #[must_use]
    pub fn opacity_at(&self, x: f32, y: f32) -> f32 {
        if !(x >= 0.0 && y >= 0.0) {
            return 0.0;
        }
        let (px, py) = (x as usize, y as usize);
        if px >= self.width || py >= self.height {
            return 0.0;
        }
        self.alpha[py * self.width + px]
    }
}

impl ShadeModel for RasterShadeMap {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn prepare(&mut self, trees: &[Tree]) -> Result<(), IndexError> {
        self.alpha.fill(0.0);
        for tree in trees.iter().filter(|tree| tree.radius > 0.0) {
            let Some((x0, x1, y0, y1)) = self.footprint(tree) else {
                continue;
            };
            for py in y0..=y1 {
                for px in x0..=x1 {
                    if Self::covers(tree, px, py) {
                        let pixel = &mut self.alpha[py * self.width + px];
                        *pixel += CANOPY_ALPHA * (1.0 - *pixel);
                    }
                }
            }
        }
        Ok(())
    }

    fn shade_intensity(&self, subject: usize, trees: &[Tree]) -> f32 {
        let Some(tree) = trees.get(subject) else {
            return 0.0;
        };
        let mut sun = 0.0;
        let mut samples = 0usize;
        if let Some((x0, x1, y0, y1)) = self.footprint(tree) {
            for py in y0..=y1 {
                for px in x0..=x1 {
                    if Self::covers(tree, px, py) {
                        sun += Self::pixel_sun(self.alpha[py * self.width + px]);
                        samples += 1;
                    }
                }
            }
        }
        if samples == 0 {
            sun = Self::pixel_sun(self.opacity_at(tree.x, tree.y));
            samples = 1;
        }
        let sun = clamp01(sun / samples as f32 / CANOPY_ALPHA);
        1.0 - sun
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(x: f32, y: f32, radius: f32, stem_age: u32) -> Tree {
        let mut tree = Tree::sapling(x, y, "a", "#000", 1.0);
        tree.radius = radius;
        tree.stem_age = stem_age;
        tree.age = stem_age;
        tree
    }

    fn shade_all(model: &mut dyn ShadeModel, trees: &[Tree]) -> Vec<f32> {
        model.prepare(trees).expect("prepare");
        (0..trees.len())
            .map(|idx| model.shade_intensity(idx, trees))
            .collect()
    }

    #[test]
    fn lone_tree_is_unshaded_by_both_methods() {
        let config = SimulationConfig::default();
        let trees = vec![tree(100.0, 80.0, 10.0, 10)];
        assert_eq!(shade_all(&mut AnalyticOverlap::new(&config), &trees), vec![0.0]);
        let raster = shade_all(&mut RasterShadeMap::new(&config), &trees);
        assert!(raster[0].abs() < 1e-4);
    }

    #[test]
    fn analytic_overlap_uses_lens_approximation() {
        let config = SimulationConfig::default();
        let trees = vec![tree(100.0, 80.0, 10.0, 10), tree(115.0, 80.0, 10.0, 10)];
        let shade = shade_all(&mut AnalyticOverlap::new(&config), &trees);
        let expected = OVERLAP_FACTOR * 25.0 * 2.0 / (std::f32::consts::PI * 100.0);
        assert!((shade[0] - expected).abs() < 1e-5);
        assert!((shade[1] - expected).abs() < 1e-5);
    }

    #[test]
    fn young_neighbors_cast_no_shade() {
        let config = SimulationConfig::default();
        let trees = vec![tree(100.0, 80.0, 10.0, 20), tree(105.0, 80.0, 10.0, 10)];
        let shade = shade_all(&mut AnalyticOverlap::new(&config), &trees);
        assert_eq!(shade[0], 0.0);
        assert!(shade[1] > 0.0 && shade[1] <= 1.0);
    }

    #[test]
    fn raster_shade_rises_under_a_neighbor() {
        let config = SimulationConfig {
            shade_method: ShadeMethod::Raster,
            ..SimulationConfig::default()
        };
        let trees = vec![tree(100.0, 80.0, 10.0, 10), tree(104.0, 80.0, 10.0, 10)];
        let mut model = model_for(&config);
        assert_eq!(model.name(), "raster");
        let shade = shade_all(model.as_mut(), &trees);
        assert!(shade[0] > 0.3 && shade[0] < 1.0, "shade {}", shade[0]);
    }

    #[test]
    fn canopy_less_seedling_shade_depends_on_method() {
        let config = SimulationConfig::default();
        let trees = vec![tree(100.0, 80.0, 10.0, 10), tree(102.0, 80.0, 0.0, 0)];
        let analytic = shade_all(&mut AnalyticOverlap::new(&config), &trees);
        assert_eq!(analytic[1], 1.0);
        let raster = shade_all(&mut RasterShadeMap::new(&config), &trees);
        assert!(raster[1].abs() < 1e-4);
    }
}
