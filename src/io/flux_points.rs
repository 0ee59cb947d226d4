//! Flux-point tables (CSV).
//!
//! Two input flavours are accepted:
//! - `dnde` tables: `e_ref, e_min, e_max, dnde, dnde_errn, dnde_errp, is_ul, dnde_ul`
//! - `norm` tables: the same with `norm*` columns, converted to `dnde` with a
//!   reference shape evaluated at `e_ref`
//!
//! Energies are TeV, fluxes cm-2 s-1 TeV-1. Headers are case-insensitive.
//! Bad rows are skipped and reported, not fatal. A literal `NaN` marks a
//! quantity that could not be estimated, as in tables this module writes;
//! such rows are kept and left out of the statistic.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;

use csv::StringRecord;

use crate::datasets::{FluxPointRow, FluxPointsDataset};
use crate::error::AnalysisError;
use crate::estimators::FluxPoints;
use crate::models::ReferenceShape;

/// A row-level problem encountered while reading a table.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct FluxPointTable {
    pub dataset: FluxPointsDataset,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Flavour {
    Dnde,
    Norm(ReferenceShape),
}

/// Read a flux-point table into a named dataset.
///
/// `reference` is only needed for `norm` tables.
pub fn read_flux_points_table(
    path: &Path,
    name: &str,
    reference: Option<ReferenceShape>,
) -> Result<FluxPointTable, AnalysisError> {
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);
    let headers = reader.headers().map_err(|e| AnalysisError::parse(path, e))?.clone();
    let header_map = build_header_map(&headers);

    let flavour = if header_map.contains_key("dnde") {
        Flavour::Dnde
    } else if header_map.contains_key("norm") {
        let shape = reference.ok_or_else(|| {
            AnalysisError::parse(path, "`norm` table given without a reference spectral shape")
        })?;
        Flavour::Norm(shape)
    } else {
        return Err(AnalysisError::parse(path, "missing required column: `dnde` or `norm`"));
    };
    if !header_map.contains_key("e_ref") && !(header_map.contains_key("e_min") && header_map.contains_key("e_max")) {
        return Err(AnalysisError::parse(path, "missing energy columns: `e_ref` or `e_min` + `e_max`"));
    }

    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_row(&record, &header_map, flavour));
        match parsed {
            Ok(row) => rows.push(row),
            Err(message) => {
                log::warn!("{}:{line}: {message}", path.display());
                row_errors.push(RowError { line, message });
            }
        }
    }
    if rows.is_empty() {
        return Err(AnalysisError::InvalidInput(format!(
            "flux-point table '{}' has no valid rows",
            path.display()
        )));
    }

    let mut dataset = FluxPointsDataset::new(name, rows);
    if let Flavour::Norm(shape) = flavour {
        dataset.reference = Some(shape);
    }
    log::info!(
        "loaded {} flux point(s) for {name} from {} ({} skipped)",
        dataset.rows.len(),
        path.display(),
        row_errors.len()
    );
    Ok(FluxPointTable {
        dataset,
        row_errors,
        rows_read,
    })
}

/// Write estimated flux points; parent directories are created and an
/// existing file is replaced.
pub fn write_flux_points_csv(path: &Path, points: &FluxPoints) -> Result<(), AnalysisError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| AnalysisError::parse(path, e))?;
    for p in &points.points {
        writer.serialize(p).map_err(|e| AnalysisError::parse(path, e))?;
    }
    writer.flush().map_err(|e| AnalysisError::io(path, e))?;
    log::info!("wrote {} flux point(s) for '{}' to {}", points.points.len(), points.source, path.display());
    Ok(())
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase(), idx))
        .collect()
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>, flavour: Flavour) -> Result<FluxPointRow, String> {
    let cell = |name: &str| parse_cell(get_optional(record, header_map, name), name);
    let finite = |name: &str| cell(name).map(|v| v.filter(|x| x.is_finite()));

    let e_min = finite("e_min")?;
    let e_max = finite("e_max")?;
    let e_ref = match (finite("e_ref")?, e_min, e_max) {
        (Some(e), _, _) => e,
        (None, Some(lo), Some(hi)) => (lo * hi).sqrt(),
        _ => return Err("Missing/invalid energy: need `e_ref` or `e_min` + `e_max`.".to_string()),
    };
    if e_ref <= 0.0 {
        return Err(format!("Non-positive reference energy {e_ref}."));
    }
    let e_min = e_min.unwrap_or(e_ref);
    let e_max = e_max.unwrap_or(e_ref);
    let flag = |name: &str| {
        get_optional(record, header_map, name)
            .map(|s| parse_bool(s, name))
            .transpose()
            .map(|b| b.unwrap_or(false))
    };
    let unconstrained = flag("unconstrained")?;
    let is_ul = flag("is_ul")? || unconstrained;

    let (prefix, scale) = match flavour {
        Flavour::Dnde => ("dnde", 1.0),
        Flavour::Norm(shape) => ("norm", shape.dnde(e_ref)),
    };
    let value = cell(prefix)?;
    let err = cell(&format!("{prefix}_err"))?;
    let errn = cell(&format!("{prefix}_errn"))?.or(err);
    let errp = cell(&format!("{prefix}_errp"))?.or(err);
    let ul = cell(&format!("{prefix}_ul"))?;

    // An explicit NaN marks a quantity that could not be estimated; only a
    // blank or negative entry is malformed.
    let usable_error = |e: Option<f64>| e.is_some_and(|e| e.is_nan() || (e.is_finite() && e > 0.0));
    if is_ul && !unconstrained {
        if ul.is_none_or(|u| u.is_infinite() || u < 0.0) {
            return Err(format!("Upper-limit row without a valid `{prefix}_ul`."));
        }
    } else if !is_ul {
        if !value.is_some_and(f64::is_finite) {
            return Err(format!("Missing/invalid `{prefix}` value."));
        }
        if !(usable_error(errn) && usable_error(errp)) {
            return Err(format!("Missing/invalid `{prefix}` errors (must be > 0 or NaN)."));
        }
    }

    let scaled = |v: Option<f64>| v.map_or(f64::NAN, |v| v * scale);
    Ok(FluxPointRow {
        e_ref,
        e_min,
        e_max,
        dnde: scaled(value),
        dnde_errn: scaled(errn),
        dnde_errp: scaled(errp),
        is_ul,
        dnde_ul: scaled(ul),
    })
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

/// Blank cells are `None`; `NaN` parses as NaN; anything else non-numeric is an error.
fn parse_cell(s: Option<&str>, name: &str) -> Result<Option<f64>, String> {
    match s {
        None => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("Invalid `{name}` value '{s}'.")),
    }
}

fn parse_bool(s: &str, name: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("Invalid `{name}` value '{other}'.")),
    }
}
