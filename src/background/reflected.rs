//! Reflected-region background estimation.
//!
//! OFF regions are copies of the ON region rotated about the pointing
//! direction, so they sit at the same field-of-view offset and see the same
//! acceptance. Placement is a pure function of the geometry:
//! - [`ReflectedRegionsFinder`] steps around the full circle by a fixed angle
//! - [`WobbleRegionsFinder`] spaces `n` regions evenly between the ON positions
//!
//! Candidates overlapping the ON region, an exclusion region or an already
//! placed OFF region are skipped.

use serde::{Deserialize, Serialize};

use crate::domain::{CircleRegion, EnergyAxis, Event, SkyCoord, solid_angle};
use crate::error::AnalysisError;

/// Places OFF regions for one ON region.
pub trait RegionFinder {
    fn find(&self, on: &CircleRegion, pointing: &SkyCoord, exclusions: &[CircleRegion]) -> Vec<CircleRegion>;
}

/// Rotation-step finder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReflectedRegionsFinder {
    /// Rotation step between candidates (deg).
    pub angle_increment_deg: f64,
    /// Extra clearance required between a candidate and the ON region (deg).
    pub min_distance_input_deg: f64,
    pub max_region_number: usize,
}

impl Default for ReflectedRegionsFinder {
    fn default() -> Self {
        Self {
            angle_increment_deg: 0.1,
            min_distance_input_deg: 0.1,
            max_region_number: 10_000,
        }
    }
}

impl RegionFinder for ReflectedRegionsFinder {
    fn find(&self, on: &CircleRegion, pointing: &SkyCoord, exclusions: &[CircleRegion]) -> Vec<CircleRegion> {
        if !(self.angle_increment_deg > 0.0) {
            return Vec::new();
        }
        let angles = (1..)
            .map(|k| k as f64 * self.angle_increment_deg)
            .take_while(|a| *a < 360.0);
        place(on, pointing, exclusions, angles, self.min_distance_input_deg, self.max_region_number)
    }
}

/// Evenly spaced finder: `n` regions at `360° · k / (n + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WobbleRegionsFinder {
    pub n_off_regions: usize,
}

impl RegionFinder for WobbleRegionsFinder {
    fn find(&self, on: &CircleRegion, pointing: &SkyCoord, exclusions: &[CircleRegion]) -> Vec<CircleRegion> {
        let n = self.n_off_regions;
        let angles = (1..=n).map(move |k| 360.0 * k as f64 / (n + 1) as f64);
        place(on, pointing, exclusions, angles, 0.0, n)
    }
}

fn place(
    on: &CircleRegion,
    pointing: &SkyCoord,
    exclusions: &[CircleRegion],
    angles: impl Iterator<Item = f64>,
    min_distance: f64,
    max_regions: usize,
) -> Vec<CircleRegion> {
    let mut placed: Vec<CircleRegion> = Vec::new();
    for angle in angles {
        if placed.len() >= max_regions {
            break;
        }
        let candidate = CircleRegion::new(on.center.rotate_about(pointing, angle), on.radius);

        if candidate.center.separation(&on.center) < 2.0 * on.radius + min_distance {
            continue;
        }
        if exclusions.iter().any(|ex| ex.overlaps(&candidate)) {
            continue;
        }
        if placed.iter().any(|r| r.overlaps(&candidate)) {
            continue;
        }
        placed.push(candidate);
    }
    placed
}

/// Finder selection for a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum FinderConfig {
    Reflected(ReflectedRegionsFinder),
    Wobble(WobbleRegionsFinder),
}

impl Default for FinderConfig {
    fn default() -> Self {
        FinderConfig::Wobble(WobbleRegionsFinder { n_off_regions: 1 })
    }
}

impl RegionFinder for FinderConfig {
    fn find(&self, on: &CircleRegion, pointing: &SkyCoord, exclusions: &[CircleRegion]) -> Vec<CircleRegion> {
        match self {
            FinderConfig::Reflected(f) => f.find(on, pointing, exclusions),
            FinderConfig::Wobble(f) => f.find(on, pointing, exclusions),
        }
    }
}

/// OFF-region measurement for one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundEstimate {
    pub off_regions: Vec<CircleRegion>,
    /// OFF counts per reco bin, summed over regions.
    pub counts_off: Vec<f64>,
    /// ON solid angle over total OFF solid angle, per reco bin.
    pub alpha: Vec<f64>,
}

pub struct ReflectedRegionsBackgroundEstimator<'a, F: RegionFinder> {
    pub finder: &'a F,
    pub exclusions: &'a [CircleRegion],
}

impl<'a, F: RegionFinder> ReflectedRegionsBackgroundEstimator<'a, F> {
    pub fn new(finder: &'a F, exclusions: &'a [CircleRegion]) -> Self {
        Self { finder, exclusions }
    }

    /// Place OFF regions and count OFF events.
    ///
    /// `on_radii` holds the ON radius per reco bin (constant for a circular ON
    /// region, `rad_max(E)` for a point-like one); OFF regions use the same
    /// per-bin radius. Placement uses the largest radius.
    pub fn run(
        &self,
        obs_id: &str,
        on_center: &SkyCoord,
        on_radii: &[f64],
        pointing: &SkyCoord,
        events: &[Event],
        axis: &EnergyAxis,
    ) -> Result<BackgroundEstimate, AnalysisError> {
        let max_radius = on_radii.iter().copied().fold(0.0_f64, f64::max);
        if !(max_radius > 0.0) {
            return Err(AnalysisError::InsufficientBackgroundRegions {
                obs_id: obs_id.to_string(),
                reason: "ON region has zero size".to_string(),
            });
        }

        let on = CircleRegion::new(*on_center, max_radius);
        let off_regions = self.finder.find(&on, pointing, self.exclusions);
        if off_regions.is_empty() {
            let offset = pointing.separation(on_center);
            return Err(AnalysisError::InsufficientBackgroundRegions {
                obs_id: obs_id.to_string(),
                reason: format!(
                    "no OFF region fits (ON offset {offset:.3} deg, radius {max_radius:.3} deg, {} exclusion(s))",
                    self.exclusions.len()
                ),
            });
        }

        let mut counts_off = vec![0.0; axis.nbin()];
        for event in events {
            let Some(j) = axis.bin_of(event.energy) else {
                continue;
            };
            if off_regions
                .iter()
                .any(|r| r.center.separation(&event.position) < on_radii[j])
            {
                counts_off[j] += 1.0;
            }
        }

        let alpha = on_radii
            .iter()
            .map(|r| solid_angle(*r) / (off_regions.len() as f64 * solid_angle(*r)))
            .collect();

        Ok(BackgroundEstimate {
            off_regions,
            counts_off,
            alpha,
        })
    }
}
