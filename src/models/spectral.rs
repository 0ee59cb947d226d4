//! Spectral model catalogue.
//!
//! Every model is a differential flux `dN/dE` in `cm-2 s-1 TeV-1` as a
//! function of energy in TeV. Parameters are passed in canonical units and in
//! the order given by [`SpectralKind::parameter_names`].
//!
//! Also provides the fixed Crab reference shapes used to convert
//! normalization-type flux-point tables into differential fluxes.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::models::units::Unit;

/// Simpson intervals per unit of `ln E` for numerical band integrals.
const SIMPSON_INTERVALS_PER_E_FOLD: f64 = 32.0;

/// Fewest Simpson intervals used for any band.
const SIMPSON_MIN_INTERVALS: usize = 8;

/// One erg in TeV.
const ERG_TO_TEV: f64 = 0.624151;

/// A named, optionally bounded model parameter.
///
/// `min`/`max` are expressed in the parameter's own unit, like `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Unit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<f64>,
}

impl Parameter {
    pub fn new(name: &str, value: f64, unit: Unit) -> Self {
        Self {
            name: name.to_string(),
            value,
            unit,
            min: None,
            max: None,
            frozen: false,
            error: None,
        }
    }

    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn bounded(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Value converted to canonical units.
    pub fn canonical(&self) -> f64 {
        self.value * self.unit.factor()
    }

    /// `(min, max)` in the parameter's unit; open sides are infinite.
    pub fn bounds(&self) -> (f64, f64) {
        (
            self.min.unwrap_or(f64::NEG_INFINITY),
            self.max.unwrap_or(f64::INFINITY),
        )
    }

    /// Reject non-finite values, inverted bounds and values outside bounds.
    pub fn validate(&self, qualified_name: &str) -> Result<(), AnalysisError> {
        let fail = |reason: String| AnalysisError::InvalidParameterBounds {
            parameter: qualified_name.to_string(),
            reason,
        };
        if !self.value.is_finite() {
            return Err(fail(format!("value {} is not finite", self.value)));
        }
        if self.min.is_some_and(|v| v.is_nan()) || self.max.is_some_and(|v| v.is_nan()) {
            return Err(fail("bound is NaN".to_string()));
        }
        let (lo, hi) = self.bounds();
        if lo > hi {
            return Err(fail(format!("min {lo} > max {hi}")));
        }
        if self.value < lo || self.value > hi {
            return Err(fail(format!("value {} outside [{lo}, {hi}]", self.value)));
        }
        Ok(())
    }
}

/// Spectral model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpectralKind {
    /// `A (E/E0)^-Γ`
    #[serde(rename = "PowerLawSpectralModel")]
    PowerLaw,
    /// `A (E/E0)^(-α - β ln(E/E0))`
    #[serde(rename = "LogParabolaSpectralModel")]
    LogParabola,
    /// `A (E/E0)^-Γ exp(-(λE)^α)`
    #[serde(rename = "ExpCutoffPowerLawSpectralModel")]
    ExpCutoffPowerLaw,
    /// Energy-independent `dN/dE`.
    #[serde(rename = "ConstantSpectralModel")]
    Constant,
}

impl SpectralKind {
    pub fn parameter_names(self) -> &'static [&'static str] {
        match self {
            SpectralKind::PowerLaw => &["index", "amplitude", "reference"],
            SpectralKind::LogParabola => &["amplitude", "reference", "alpha", "beta"],
            SpectralKind::ExpCutoffPowerLaw => &["index", "amplitude", "reference", "lambda_", "alpha"],
            SpectralKind::Constant => &["const"],
        }
    }

    /// Conventional starting parameters.
    pub fn default_parameters(self) -> Vec<Parameter> {
        let amplitude = Parameter::new("amplitude", 1e-12, Unit::FluxPerTeV);
        let reference = Parameter::new("reference", 1.0, Unit::TeV).frozen();
        match self {
            SpectralKind::PowerLaw => vec![
                Parameter::new("index", 2.0, Unit::Dimensionless),
                amplitude,
                reference,
            ],
            SpectralKind::LogParabola => vec![
                amplitude,
                reference,
                Parameter::new("alpha", 2.0, Unit::Dimensionless),
                Parameter::new("beta", 1.0, Unit::Dimensionless),
            ],
            SpectralKind::ExpCutoffPowerLaw => vec![
                Parameter::new("index", 1.5, Unit::Dimensionless),
                amplitude,
                reference,
                Parameter::new("lambda_", 0.1, Unit::PerTeV),
                Parameter::new("alpha", 1.0, Unit::Dimensionless).frozen(),
            ],
            SpectralKind::Constant => vec![Parameter::new("const", 1e-12, Unit::FluxPerTeV)],
        }
    }

    /// Reorder `params` into this kind's canonical order.
    ///
    /// Fails on missing or unknown parameter names.
    pub fn arrange(self, params: Vec<Parameter>) -> Result<Vec<Parameter>, AnalysisError> {
        let names = self.parameter_names();
        if let Some(extra) = params.iter().find(|p| !names.contains(&p.name.as_str())) {
            return Err(AnalysisError::InvalidInput(format!(
                "{self:?} has no parameter '{}'",
                extra.name
            )));
        }
        let mut slots: Vec<Option<Parameter>> = vec![None; names.len()];
        for p in params {
            if let Some(pos) = names.iter().position(|n| *n == p.name) {
                slots[pos] = Some(p);
            }
        }
        slots
            .into_iter()
            .zip(names.iter())
            .map(|(slot, name)| {
                slot.ok_or_else(|| {
                    AnalysisError::InvalidInput(format!("{self:?} is missing parameter '{name}'"))
                })
            })
            .collect()
    }

    /// Differential flux at `energy` (TeV).
    pub fn dnde(self, p: &[f64], energy: f64) -> f64 {
        match self {
            SpectralKind::PowerLaw => p[1] * (energy / p[2]).powf(-p[0]),
            SpectralKind::LogParabola => {
                let x = energy / p[1];
                p[0] * x.powf(-p[2] - p[3] * x.ln())
            }
            SpectralKind::ExpCutoffPowerLaw => {
                p[1] * (energy / p[2]).powf(-p[0]) * (-(p[3] * energy).powf(p[4])).exp()
            }
            SpectralKind::Constant => p[0],
        }
    }

    /// Integral of `dnde` over `[e_lo, e_hi]` (cm-2 s-1).
    pub fn integral(self, p: &[f64], e_lo: f64, e_hi: f64) -> f64 {
        match self {
            SpectralKind::PowerLaw => {
                let (index, amplitude, reference) = (p[0], p[1], p[2]);
                if (index - 1.0).abs() < 1e-9 {
                    amplitude * reference * (e_hi / e_lo).ln()
                } else {
                    let g = 1.0 - index;
                    amplitude * reference / g * ((e_hi / reference).powf(g) - (e_lo / reference).powf(g))
                }
            }
            SpectralKind::Constant => p[0] * (e_hi - e_lo),
            _ => integrate_log(|e| self.dnde(p, e), e_lo, e_hi),
        }
    }
}

/// Simpson's rule in `ln E`: `∫ f(E) dE = ∫ f(e^u) e^u du`.
pub fn integrate_log<F: Fn(f64) -> f64>(f: F, e_lo: f64, e_hi: f64) -> f64 {
    if e_hi <= e_lo {
        return 0.0;
    }
    let (u0, u1) = (e_lo.ln(), e_hi.ln());
    let wanted = ((u1 - u0) * SIMPSON_INTERVALS_PER_E_FOLD).ceil() as usize;
    // Simpson needs an even count.
    let n = wanted.max(SIMPSON_MIN_INTERVALS).next_multiple_of(2);
    let h = (u1 - u0) / n as f64;
    let g = |u: f64| {
        let e = u.exp();
        f(e) * e
    };
    let mut acc = g(u0) + g(u1);
    for k in 1..n {
        let w = if k % 2 == 1 { 4.0 } else { 2.0 };
        acc += w * g(u0 + h * k as f64);
    }
    acc * h / 3.0
}

/// Fixed published Crab spectra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ReferenceShape {
    /// HEGRA power law.
    #[serde(rename = "hegra")]
    #[value(name = "hegra")]
    CrabHegra,
    /// MAGIC log-parabola.
    #[serde(rename = "magic_lp")]
    #[value(name = "magic_lp")]
    CrabMagicLp,
    /// Meyer et al. (2010) log-polynomial fit in `E² dN/dE`.
    #[serde(rename = "meyer")]
    #[value(name = "meyer")]
    CrabMeyer,
}

impl ReferenceShape {
    const MEYER_COEFFICIENTS: [f64; 6] = [-0.00449161, 0.0, 0.0473174, -0.179475, -0.53616, -10.2144];

    pub fn dnde(self, energy: f64) -> f64 {
        match self {
            ReferenceShape::CrabHegra => SpectralKind::PowerLaw.dnde(&[2.62, 2.83e-11, 1.0], energy),
            ReferenceShape::CrabMagicLp => SpectralKind::LogParabola.dnde(
                &[3.23e-11, 1.0, 2.47, 0.24 / std::f64::consts::LN_10],
                energy,
            ),
            ReferenceShape::CrabMeyer => {
                let x = energy.log10();
                let log_e2dnde = Self::MEYER_COEFFICIENTS
                    .iter()
                    .fold(0.0, |acc, c| acc * x + c);
                10f64.powf(log_e2dnde) * ERG_TO_TEV / (energy * energy)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_law_integral_matches_numeric() {
        let p = [2.5, 3e-11, 1.0];
        let analytic = SpectralKind::PowerLaw.integral(&p, 0.1, 10.0);
        let numeric = integrate_log(|e| SpectralKind::PowerLaw.dnde(&p, e), 0.1, 10.0);
        assert!(((analytic - numeric) / analytic).abs() < 1e-6);

        // A narrow band is no less accurate.
        let analytic = SpectralKind::PowerLaw.integral(&p, 1.0, 1.1);
        let numeric = integrate_log(|e| SpectralKind::PowerLaw.dnde(&p, e), 1.0, 1.1);
        assert!(((analytic - numeric) / analytic).abs() < 1e-8);
    }

    #[test]
    fn log_parabola_reduces_to_power_law_without_curvature() {
        let lp = SpectralKind::LogParabola.dnde(&[1e-11, 0.5, 2.3, 0.0], 3.0);
        let pl = SpectralKind::PowerLaw.dnde(&[2.3, 1e-11, 0.5], 3.0);
        assert!(((lp - pl) / pl).abs() < 1e-12);
    }

    #[test]
    fn arrange_reorders_and_rejects_unknown() {
        let mut params = SpectralKind::LogParabola.default_parameters();
        params.reverse();
        let arranged = SpectralKind::LogParabola.arrange(params).unwrap();
        let names: Vec<&str> = arranged.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["amplitude", "reference", "alpha", "beta"]);

        let bad = vec![Parameter::new("gamma", 1.0, Unit::Dimensionless)];
        assert!(SpectralKind::Constant.arrange(bad).is_err());
    }

    #[test]
    fn meyer_crab_at_one_tev() {
        // E² dN/dE(1 TeV) = 10^-10.2144 erg cm-2 s-1
        let expected = 10f64.powf(-10.2144) * ERG_TO_TEV;
        let got = ReferenceShape::CrabMeyer.dnde(1.0);
        assert!(((got - expected) / expected).abs() < 1e-12);
        // Comparable to the HEGRA power law at 1 TeV.
        let hegra = ReferenceShape::CrabHegra.dnde(1.0);
        assert!(got / hegra > 0.5 && got / hegra < 2.0);
    }

    #[test]
    fn bounds_validation() {
        let p = Parameter::new("alpha", 5.0, Unit::Dimensionless).bounded(Some(1.0), Some(4.0));
        assert!(p.validate("crab.alpha").is_err());
        let q = Parameter::new("beta", 0.2, Unit::Dimensionless).bounded(Some(1.0), Some(0.0));
        assert!(q.validate("crab.beta").is_err());
    }
}
