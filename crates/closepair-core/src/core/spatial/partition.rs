use super::distance::DistanceMode;
use super::grid::RadiusTieredGrid;
use crate::core::models::object::Sphere;
use serde::Deserialize;
use tracing::trace;

/// Tuning of the radius-band decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct PartitionConfig {
    /// Bands with fewer members than this are merged into a neighbour.
    pub min_grid_size: usize,
    /// Cell size as a multiple of the largest radius in the band.
    pub cell_scale: f64,
    /// Lower bound on the cell size of any band.
    pub min_cell_size: f64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            min_grid_size: 20,
            cell_scale: 1.6,
            min_cell_size: 1.0,
        }
    }
}

impl PartitionConfig {
    pub fn cell_size_for(&self, max_radius: f64) -> f64 {
        self.min_cell_size.max(self.cell_scale * max_radius)
    }
}

/// A radius-homogeneous subset of objects.
///
/// `low` is the lower cut of the first merged bin (exclusive, except for the
/// zero bin) and `high` the upper cut of the last one (inclusive).
#[derive(Debug, Clone, PartialEq)]
pub struct RadiusBand {
    pub low: f64,
    pub high: f64,
    /// Indices of the member objects, in ascending order.
    pub members: Vec<usize>,
    /// Largest effective radius among the members.
    pub max_radius: f64,
    pub cell_size: f64,
}

/// One band together with the grid built over its members.
#[derive(Debug, Clone)]
pub struct BandGrid {
    pub band: RadiusBand,
    pub grid: RadiusTieredGrid,
}

/// The per-band grids covering a whole set of spheres.
///
/// Every object appears in exactly one band.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub bands: Vec<BandGrid>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Total number of objects across all bands.
    pub fn object_count(&self) -> usize {
        self.bands.iter().map(|b| b.band.members.len()).sum()
    }
}

/// Splits a set of spheres into power-of-two radius bands and grids them.
#[derive(Debug, Clone, Copy)]
pub struct GridPartitioner {
    config: PartitionConfig,
    mode: DistanceMode,
}

impl GridPartitioner {
    pub fn new(config: PartitionConfig, mode: DistanceMode) -> Self {
        Self { config, mode }
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Computes the band decomposition of `spheres` without building grids.
    pub fn bands(&self, spheres: &[Sphere]) -> Vec<RadiusBand> {
        if spheres.is_empty() {
            return Vec::new();
        }

        let radii: Vec<f64> = spheres
            .iter()
            .map(|s| self.mode.effective_radius(s.radius))
            .collect();
        let max_radius = radii.iter().copied().fold(0.0, f64::max);
        let min_nonzero = radii
            .iter()
            .copied()
            .filter(|&r| r > 0.0)
            .fold(f64::INFINITY, f64::min);

        if !min_nonzero.is_finite() {
            return vec![RadiusBand {
                low: 0.0,
                high: 0.0,
                members: (0..spheres.len()).collect(),
                max_radius: 0.0,
                cell_size: self.config.cell_size_for(0.0),
            }];
        }

        let cuts = doubling_cuts(min_nonzero, max_radius);
        let mut bins: Vec<Vec<usize>> = vec![Vec::new(); cuts.len()];
        for (index, &radius) in radii.iter().enumerate() {
            let bin = cuts.partition_point(|&cut| cut < radius).min(cuts.len() - 1);
            bins[bin].push(index);
        }

        self.merge_bins(&cuts, bins, &radii)
    }

    /// Builds the full partition: one grid per band, sized to the band.
    pub fn partition(&self, spheres: &[Sphere]) -> Partition {
        let bands = self
            .bands(spheres)
            .into_iter()
            .map(|band| {
                let grid = RadiusTieredGrid::build(
                    band.members.iter().map(|&i| (i, spheres[i].center)),
                    band.cell_size,
                );
                BandGrid { band, grid }
            })
            .collect::<Vec<_>>();
        trace!(
            objects = spheres.len(),
            bands = bands.len(),
            "Partitioned objects into radius bands."
        );
        Partition { bands }
    }

    fn merge_bins(&self, cuts: &[f64], bins: Vec<Vec<usize>>, radii: &[f64]) -> Vec<RadiusBand> {
        let mut bands: Vec<RadiusBand> = Vec::new();
        let mut pending: Option<RadiusBand> = None;

        for (bin, members) in bins.into_iter().enumerate() {
            if members.is_empty() {
                continue;
            }
            let low = if bin == 0 { 0.0 } else { cuts[bin - 1] };
            let band = pending.get_or_insert_with(|| RadiusBand {
                low,
                high: cuts[bin],
                members: Vec::new(),
                max_radius: 0.0,
                cell_size: 0.0,
            });
            band.high = cuts[bin];
            band.members.extend(members);

            if band.members.len() >= self.config.min_grid_size {
                if let Some(done) = pending.take() {
                    bands.push(done);
                }
            }
        }

        if let Some(tail) = pending {
            match bands.last_mut() {
                Some(last) => {
                    last.high = tail.high;
                    last.members.extend(tail.members);
                }
                None => bands.push(tail),
            }
        }

        for band in &mut bands {
            band.members.sort_unstable();
            band.max_radius = band.members.iter().map(|&i| radii[i]).fold(0.0, f64::max);
            band.cell_size = self.config.cell_size_for(band.max_radius);
        }
        bands
    }
}

/// Upper cuts `0, 2m, 4m, 8m, ...`, stopping at the first cut not below `max_radius`.
fn doubling_cuts(min_nonzero: f64, max_radius: f64) -> Vec<f64> {
    let mut cuts = vec![0.0];
    let mut cut = 2.0 * min_nonzero;
    loop {
        cuts.push(cut);
        if cut >= max_radius || !cut.is_finite() {
            break;
        }
        cut *= 2.0;
    }
    cuts
}
