//! Observations: event lists plus the response tables they were recorded with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::irf::{EffectiveArea2D, EnergyDispersion2D, RadMax2D};
use crate::domain::sky::SkyCoord;
use crate::domain::types::IrfKind;
use crate::error::AnalysisError;

/// One reconstructed gamma-like event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Seconds since the observation start.
    pub time: f64,
    /// Reconstructed energy (TeV).
    pub energy: f64,
    pub position: SkyCoord,
}

/// Instrument response bundle; any component may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Irfs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aeff: Option<EffectiveArea2D>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edisp: Option<EnergyDispersion2D>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rad_max: Option<RadMax2D>,
}

impl Irfs {
    pub fn has(&self, kind: IrfKind) -> bool {
        match kind {
            IrfKind::Aeff => self.aeff.is_some(),
            IrfKind::Edisp => self.edisp.is_some(),
            IrfKind::RadMax => self.rad_max.is_some(),
        }
    }

    /// Components present in this bundle, in canonical order.
    pub fn components(&self) -> Vec<IrfKind> {
        IrfKind::ALL.into_iter().filter(|k| self.has(*k)).collect()
    }

    /// Check that every present table matches its node axes.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if let Some(aeff) = &self.aeff {
            aeff.validate()?;
        }
        if let Some(edisp) = &self.edisp {
            edisp.validate()?;
        }
        if let Some(rad_max) = &self.rad_max {
            rad_max.validate()?;
        }
        Ok(())
    }
}

/// A single pointing of the telescope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub obs_id: String,
    pub pointing: SkyCoord,
    /// Live time (s).
    pub livetime: f64,
    pub tstart: DateTime<Utc>,
    pub tstop: DateTime<Utc>,
    pub events: Vec<Event>,
    pub irfs: Irfs,
}

impl Observation {
    /// Required components this observation does not carry.
    pub fn missing_components(&self, required: &[IrfKind]) -> Vec<IrfKind> {
        required
            .iter()
            .copied()
            .filter(|k| !self.irfs.has(*k))
            .collect()
    }

    /// Angular distance (deg) of `position` from the pointing.
    pub fn offset_of(&self, position: &SkyCoord) -> f64 {
        self.pointing.separation(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn missing_components_lists_absent_tables() {
        let obs = Observation {
            obs_id: "5029749".to_string(),
            pointing: SkyCoord::new(83.63, 22.41),
            livetime: 1200.0,
            tstart: Utc.with_ymd_and_hms(2013, 11, 29, 23, 0, 0).unwrap(),
            tstop: Utc.with_ymd_and_hms(2013, 11, 29, 23, 20, 0).unwrap(),
            events: Vec::new(),
            irfs: Irfs {
                aeff: Some(EffectiveArea2D {
                    energy_true: vec![0.01, 100.0],
                    offset: vec![0.0],
                    data: vec![vec![1e4, 1e4]],
                }),
                edisp: None,
                rad_max: None,
            },
        };
        assert_eq!(
            obs.missing_components(&IrfKind::ALL),
            vec![IrfKind::Edisp, IrfKind::RadMax]
        );
        assert!(obs.missing_components(&[IrfKind::Aeff]).is_empty());
        assert_eq!(obs.irfs.components(), vec![IrfKind::Aeff]);
        obs.irfs.validate().unwrap();
    }

    #[test]
    fn table_shape_mismatch_fails_validation() {
        let irfs = Irfs {
            aeff: Some(EffectiveArea2D {
                energy_true: vec![0.01, 100.0],
                offset: vec![0.0, 1.0],
                data: vec![vec![1e4, 1e4]],
            }),
            edisp: None,
            rad_max: Some(RadMax2D::constant(0.1)),
        };
        assert!(matches!(irfs.validate(), Err(AnalysisError::InvalidInput(_))));
    }
}
