//! Parameter units.
//!
//! Internally energies are TeV and differential fluxes `cm-2 s-1 TeV-1`.
//! Parameters keep the unit they were written with; evaluation converts to
//! the canonical unit with [`Unit::factor`].

use serde::{Deserialize, Serialize};

/// Units accepted on spectral parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Unit {
    #[default]
    Dimensionless,
    KeV,
    MeV,
    GeV,
    TeV,
    PerGeV,
    PerTeV,
    FluxPerMeV,
    FluxPerGeV,
    FluxPerTeV,
}

impl Unit {
    const TABLE: [(Unit, &'static str); 10] = [
        (Unit::Dimensionless, ""),
        (Unit::KeV, "keV"),
        (Unit::MeV, "MeV"),
        (Unit::GeV, "GeV"),
        (Unit::TeV, "TeV"),
        (Unit::PerGeV, "GeV-1"),
        (Unit::PerTeV, "TeV-1"),
        (Unit::FluxPerMeV, "cm-2 s-1 MeV-1"),
        (Unit::FluxPerGeV, "cm-2 s-1 GeV-1"),
        (Unit::FluxPerTeV, "cm-2 s-1 TeV-1"),
    ];

    /// Multiply a value in this unit by this factor to get canonical units.
    pub fn factor(self) -> f64 {
        match self {
            Unit::Dimensionless | Unit::TeV | Unit::PerTeV | Unit::FluxPerTeV => 1.0,
            Unit::KeV => 1e-9,
            Unit::MeV => 1e-6,
            Unit::GeV => 1e-3,
            Unit::PerGeV => 1e3,
            Unit::FluxPerMeV => 1e6,
            Unit::FluxPerGeV => 1e3,
        }
    }

    pub fn as_str(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(u, _)| *u == self)
            .map(|(_, s)| *s)
            .unwrap_or("")
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        Self::TABLE
            .iter()
            .find(|(_, label)| *label == normalized)
            .map(|(u, _)| *u)
            .ok_or_else(|| format!("unsupported unit '{s}'"))
    }
}

impl TryFrom<String> for Unit {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Unit> for String {
    fn from(value: Unit) -> Self {
        value.as_str().to_string()
    }
}
