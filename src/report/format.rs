//! Formatted terminal output.
//!
//! Formatting lives in one place so:
//! - the reduction/fitting code stays free of presentation concerns
//! - output changes are localized

use crate::datasets::{Background, Dataset, Datasets};
use crate::estimators::FluxPoints;
use crate::fit::FitResult;

/// One line per dataset of the joint collection.
pub fn format_datasets(datasets: &Datasets) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<24} {:<12} {:>6} {:>10} {:>10}\n",
        "dataset", "kind", "bins", "counts", "excess"
    ));
    out.push_str(&format!("{:-<24} {:-<12} {:->6} {:->10} {:->10}\n", "", "", "", "", ""));
    for d in datasets {
        let used = d.mask().iter().filter(|m| **m).count();
        let (counts, excess) = match d {
            Dataset::Spectrum(s) => {
                let mask = s.mask();
                let counts: f64 = s.counts.iter().zip(&mask).filter(|(_, m)| **m).map(|(c, _)| c).sum();
                let excess = match s.background {
                    Background::None => String::new(),
                    _ => format!("{:.1}", s.excess().iter().zip(&mask).filter(|(_, m)| **m).map(|(e, _)| e).sum::<f64>()),
                };
                (format!("{counts:.0}"), excess)
            }
            Dataset::FluxPoints(_) => (String::new(), String::new()),
        };
        out.push_str(
            format!(
                "{:<24} {:<12} {:>6} {:>10} {:>10}",
                truncate(d.name(), 24),
                d.kind_label(),
                used,
                counts,
                excess
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Convergence, statistic and per-dataset breakdown.
pub fn format_fit_summary(result: &FitResult) -> String {
    let mut out = String::new();
    out.push_str("=== jsed - joint likelihood fit ===\n");
    out.push_str(&format!(
        "Status: {} ({})\n",
        if result.converged { "converged" } else { "NOT converged" },
        result.message
    ));
    out.push_str(&format!(
        "Iterations: {} | evaluations: {}\n",
        result.n_iter, result.n_fev
    ));
    out.push_str(&format!("Total stat (-2 ln L): {:.4}\n", result.total_stat));
    for d in &result.datasets {
        out.push_str(&format!("  {:<24} {:>12.4}\n", truncate(&d.name, 24), d.stat_sum));
    }
    if result.covariance.is_none() {
        out.push_str("Covariance: unavailable (singular Hessian)\n");
    }
    out
}

pub fn format_parameter_table(result: &FitResult) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<36} {:>13} {:>11} {:<16} {:>9} {:>9}",
            "parameter", "value", "error", "unit", "min", "max"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(&format!("{:-<36} {:->13} {:->11} {:-<16} {:->9} {:->9}\n", "", "", "", "", "", ""));
    for p in &result.parameters {
        out.push_str(
            format!(
                "{:<36} {:>13.5e} {:>11} {:<16} {:>9} {:>9}",
                truncate(&p.name, 36),
                p.value,
                p.error.map(|e| format!("{e:.3e}")).unwrap_or_else(|| "-".to_string()),
                p.unit.as_str(),
                fmt_bound(p.min),
                fmt_bound(p.max),
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Flux points of one job; upper limits show the limit instead of errors.
pub fn format_flux_points(label: &str, points: &FluxPoints) -> String {
    let mut out = String::new();
    out.push_str(&format!("Flux points [{label}] for {}:\n", points.source));
    out.push_str(&format!(
        "{:>9} {:>9} {:>11} {:>11} {:>11} {:>8} {:<3}\n",
        "e_min", "e_max", "dnde", "errn", "errp", "ts", "ul"
    ));
    for p in &points.points {
        let line = if p.unconstrained {
            format!("{:>9.4} {:>9.4} {:>11} {:>11} {:>11} {:>8} {:<3}", p.e_min, p.e_max, "-", "-", "-", "-", "n/a")
        } else if p.is_ul {
            format!(
                "{:>9.4} {:>9.4} {:>11} {:>11} {:>11} {:>8.2} {:<3}",
                p.e_min,
                p.e_max,
                format!("<{:.3e}", p.dnde_ul),
                "",
                "",
                p.ts,
                "yes"
            )
        } else {
            format!(
                "{:>9.4} {:>9.4} {:>11.3e} {:>11.3e} {:>11.3e} {:>8.2} {:<3}",
                p.e_min, p.e_max, p.dnde, p.dnde_errn, p.dnde_errp, p.ts, "no"
            )
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn fmt_bound(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.3}"),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::FluxPoint;
    use crate::fit::{DatasetStat, FittedParameter};
    use crate::models::Unit;

    fn result(converged: bool) -> FitResult {
        FitResult {
            parameters: vec![
                FittedParameter {
                    name: "Crab Nebula.amplitude".to_string(),
                    value: 3.2e-11,
                    unit: Unit::FluxPerTeV,
                    error: Some(1.1e-12),
                    min: None,
                    max: None,
                },
                FittedParameter {
                    name: "Crab Nebula.alpha".to_string(),
                    value: 2.47,
                    unit: Unit::Dimensionless,
                    error: None,
                    min: Some(1.0),
                    max: Some(4.0),
                },
            ],
            covariance: None,
            converged,
            message: "simplex size below tolerance".to_string(),
            n_iter: 120,
            n_fev: 240,
            total_stat: 42.5,
            datasets: vec![DatasetStat {
                name: "HAWC".to_string(),
                stat_sum: 3.25,
                stat_per_bin: vec![3.25],
            }],
        }
    }

    #[test]
    fn summary_reports_status_and_breakdown() {
        let text = format_fit_summary(&result(false));
        assert!(text.contains("NOT converged"));
        assert!(text.contains("42.5000"));
        assert!(text.contains("HAWC"));
        assert!(text.contains("unavailable"));
    }

    #[test]
    fn parameter_table_lists_every_parameter() {
        let text = format_parameter_table(&result(true));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("Crab Nebula.amplitude"));
        assert!(lines[2].contains("cm-2 s-1 TeV-1"));
        assert!(lines[3].contains("4.000"));
    }

    #[test]
    fn upper_limits_show_the_limit() {
        let mut p = FluxPoint {
            e_ref: 1.0,
            e_min: 0.5,
            e_max: 2.0,
            norm: 0.1,
            norm_errp: 0.2,
            norm_errn: 0.1,
            norm_ul: 0.6,
            ts: 1.2,
            sqrt_ts: 1.2f64.sqrt(),
            is_ul: true,
            dnde: 1e-12,
            dnde_errp: 2e-12,
            dnde_errn: 1e-12,
            dnde_ul: 6e-12,
            e2dnde: 1e-12,
            e2dnde_errp: 2e-12,
            e2dnde_errn: 1e-12,
            e2dnde_ul: 6e-12,
            npred: 3.0,
            counts: 4.0,
            unconstrained: false,
        };
        let text = format_flux_points("magic", &FluxPoints {
            source: "crab".to_string(),
            points: vec![p.clone()],
        });
        assert!(text.contains("<6.000e-12"));
        assert!(text.contains("yes"));

        p.unconstrained = true;
        let text = format_flux_points("magic", &FluxPoints {
            source: "crab".to_string(),
            points: vec![p],
        });
        assert!(text.contains("n/a"));
    }
}
