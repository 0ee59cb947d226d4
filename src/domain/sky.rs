//! Sky positions and circular regions.
//!
//! Positions are (lon, lat) pairs in degrees on the celestial sphere (RA/Dec
//! for the ICRS frame used throughout). Angles returned by this module are
//! degrees.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// A position on the sky (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyCoord {
    pub lon: f64,
    pub lat: f64,
}

impl SkyCoord {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Great-circle separation (Vincenty formula, stable at all distances).
    pub fn separation(&self, other: &SkyCoord) -> f64 {
        let (l1, b1) = (self.lon.to_radians(), self.lat.to_radians());
        let (l2, b2) = (other.lon.to_radians(), other.lat.to_radians());
        let dl = l2 - l1;

        let num1 = b2.cos() * dl.sin();
        let num2 = b1.cos() * b2.sin() - b1.sin() * b2.cos() * dl.cos();
        let denom = b1.sin() * b2.sin() + b1.cos() * b2.cos() * dl.cos();
        num1.hypot(num2).atan2(denom).to_degrees()
    }

    /// Position angle of `other` as seen from `self`, east of north.
    pub fn position_angle(&self, other: &SkyCoord) -> f64 {
        let (l1, b1) = (self.lon.to_radians(), self.lat.to_radians());
        let (l2, b2) = (other.lon.to_radians(), other.lat.to_radians());
        let dl = l2 - l1;

        let x = b2.sin() * b1.cos() - b2.cos() * b1.sin() * dl.cos();
        let y = dl.sin() * b2.cos();
        y.atan2(x).to_degrees()
    }

    /// Point at angular distance `separation` along position angle `position_angle`.
    pub fn offset_by(&self, position_angle: f64, separation: f64) -> SkyCoord {
        let lat = self.lat.to_radians();
        let pa = position_angle.to_radians();
        let sep = separation.to_radians();

        let cos_a = sep.cos();
        let sin_a = sep.sin();
        let cos_c = lat.sin();
        let sin_c = lat.cos();

        let cos_b = cos_c * cos_a + sin_c * sin_a * pa.cos();
        let xsin_a = sin_a * pa.sin() * sin_c;
        let xcos_a = cos_a - cos_b * cos_c;

        let dlon = if sin_c < 1e-12 {
            // At a pole every direction is "south"; fall back to the PA itself.
            PI / 2.0 + cos_c * (PI / 2.0 - pa)
        } else {
            xsin_a.atan2(xcos_a)
        };

        SkyCoord {
            lon: wrap_degrees(self.lon + dlon.to_degrees()),
            lat: cos_b.clamp(-1.0, 1.0).asin().to_degrees(),
        }
    }

    /// Rotate this position about `center` by `angle` degrees (east of north).
    ///
    /// The separation from `center` is preserved.
    pub fn rotate_about(&self, center: &SkyCoord, angle: f64) -> SkyCoord {
        let sep = center.separation(self);
        let pa = center.position_angle(self);
        center.offset_by(pa + angle, sep)
    }
}

fn wrap_degrees(lon: f64) -> f64 {
    let wrapped = lon.rem_euclid(360.0);
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Circular sky region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleRegion {
    pub center: SkyCoord,
    /// Radius in degrees.
    pub radius: f64,
}

impl CircleRegion {
    pub fn new(center: SkyCoord, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn contains(&self, position: &SkyCoord) -> bool {
        self.center.separation(position) < self.radius
    }

    /// Two circles overlap when their centres are closer than the sum of radii.
    /// Touching circles do not overlap.
    pub fn overlaps(&self, other: &CircleRegion) -> bool {
        self.center.separation(&other.center) < self.radius + other.radius
    }

    /// Solid angle in steradians.
    pub fn solid_angle(&self) -> f64 {
        solid_angle(self.radius)
    }
}

/// Solid angle (sr) of a spherical cap with the given radius (degrees).
pub fn solid_angle(radius: f64) -> f64 {
    2.0 * PI * (1.0 - radius.to_radians().cos())
}

/// The ON (source extraction) region of a spectral geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OnRegion {
    /// Zero-extent region; its effective radius is the instrument's
    /// energy-dependent `rad_max` cut.
    Point { center: SkyCoord },
    /// Fixed-radius circle.
    Circle { region: CircleRegion },
}

impl OnRegion {
    pub fn center(&self) -> SkyCoord {
        match self {
            OnRegion::Point { center } => *center,
            OnRegion::Circle { region } => region.center,
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, OnRegion::Point { .. })
    }
}
