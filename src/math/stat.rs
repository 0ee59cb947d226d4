//! Poisson and Gaussian fit statistics.
//!
//! Every statistic here is on the `-2 ln L` scale, so:
//! - a test statistic is a plain difference of two statistic values
//! - a 1σ profile interval is where the statistic rises by 1
//!
//! `wstat` includes the goodness-of-fit terms, which makes each bin a deviance
//! against the saturated model: it is zero for a perfect match and never
//! negative.

/// Predicted counts below this are truncated before taking logs.
pub const TRUNCATION_VALUE: f64 = 1e-25;

/// Cash statistic for one bin with observed `n_on` and predicted `mu_on`.
///
/// An empty bin with no prediction contributes exactly zero.
pub fn cash(n_on: f64, mu_on: f64) -> f64 {
    if n_on == 0.0 {
        return 2.0 * mu_on.max(0.0);
    }
    let mu = if mu_on <= TRUNCATION_VALUE { TRUNCATION_VALUE } else { mu_on };
    2.0 * (mu - n_on * mu.ln())
}

/// Closed-form profile of the background nuisance in the ON/OFF likelihood.
///
/// ON ~ Poisson(mu_sig + alpha * b), OFF ~ Poisson(b); returns the `b` that
/// maximizes the likelihood for fixed `mu_sig`.
pub fn wstat_mu_bkg(n_on: f64, n_off: f64, alpha: f64, mu_sig: f64) -> f64 {
    let c = alpha * (n_on + n_off) - (1.0 + alpha) * mu_sig;
    let disc = c * c + 4.0 * alpha * (alpha + 1.0) * n_off * mu_sig;
    let d = disc.max(0.0).sqrt();
    ((c + d) / (2.0 * alpha * (alpha + 1.0))).max(0.0)
}

/// WStat for one bin: Poisson ON/OFF likelihood with the background profiled out.
///
/// `alpha` must be > 0 and `mu_sig` >= 0.
pub fn wstat(n_on: f64, n_off: f64, alpha: f64, mu_sig: f64) -> f64 {
    let mu_sig = mu_sig.max(0.0);
    let mu_bkg = wstat_mu_bkg(n_on, n_off, alpha, mu_sig);

    let term1 = mu_sig + (1.0 + alpha) * mu_bkg;
    let term2 = if n_on == 0.0 {
        0.0
    } else {
        -n_on * (mu_sig + alpha * mu_bkg).max(TRUNCATION_VALUE).ln()
    };
    let term3 = if n_off == 0.0 {
        0.0
    } else {
        -n_off * mu_bkg.max(TRUNCATION_VALUE).ln()
    };

    2.0 * (term1 + term2 + term3) + wstat_gof_terms(n_on, n_off)
}

/// Saturated-model terms that turn `wstat` into a deviance.
fn wstat_gof_terms(n_on: f64, n_off: f64) -> f64 {
    let mut term = 0.0;
    if n_on > 0.0 {
        term += -n_on * (1.0 - n_on.ln());
    }
    if n_off > 0.0 {
        term += -n_off * (1.0 - n_off.ln());
    }
    2.0 * term
}

/// Gaussian chi-square term with asymmetric errors.
///
/// The error on the side of the model is used: `errn` when the model is
/// below the data, `errp` when above.
pub fn chi2_asymmetric(data: f64, model: f64, errn: f64, errp: f64) -> f64 {
    let sigma = if model < data { errn } else { errp };
    if !(sigma.is_finite() && sigma > 0.0) {
        return 0.0;
    }
    let r = (data - model) / sigma;
    r * r
}

/// One-sided penalty for an upper limit: zero while the model stays below it.
pub fn chi2_upper_limit(limit: f64, model: f64, sigma: f64) -> f64 {
    if model <= limit || !(sigma.is_finite() && sigma > 0.0) {
        return 0.0;
    }
    let r = (model - limit) / sigma;
    r * r
}
