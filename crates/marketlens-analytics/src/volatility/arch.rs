//! ARCH-family conditional-variance models fitted by maximum likelihood.
//!
//! Each family is a closed variant: adding one means adding an enum arm and
//! its recursion, nothing else. Returns enter scaled (x100 upstream) and the
//! fit works in those units throughout.

use marketlens_core::{AnalysisError, ArchModelKind, DistributionKind};
use statrs::function::gamma::ln_gamma;
use tracing::info;

use crate::cancel::CancelFlag;
use crate::rolling::{mean, variance};
use crate::volatility::simplex::{minimize, SimplexOptions, SimplexResult};

const MIN_OMEGA: f64 = 1e-12;
const MIN_SIGMA2: f64 = 1e-12;
const MAX_PERSISTENCE: f64 = 0.999;
const FIGARCH_TRUNCATION: usize = 1_000;

/// Fitted conditional-volatility path plus the one-step-ahead forecast.
///
/// `conditional` is aligned one-to-one with the training returns;
/// `forecast` is the trailing value with no observed bar yet.
#[derive(Debug, Clone)]
pub struct VarianceFit {
    pub conditional: Vec<f64>,
    pub forecast: f64,
    pub log_likelihood: f64,
}

/// Fit the requested family/distribution to the (scaled) return series.
pub fn fit(
    kind: ArchModelKind,
    dist: DistributionKind,
    returns: &[f64],
    cancel: &CancelFlag,
) -> Result<VarianceFit, AnalysisError> {
    let sample_var = variance(returns, 1);
    if !sample_var.is_finite() || sample_var <= MIN_SIGMA2 {
        return Err(AnalysisError::model_fit(format!(
            "degenerate input: return series variance {sample_var} cannot identify a {kind} model"
        )));
    }

    // Pre-sample variance proxy, fixed across objective evaluations.
    let sample_mean = mean(returns);
    let backcast = mean(
        &returns
            .iter()
            .map(|r| (r - sample_mean).powi(2))
            .collect::<Vec<_>>(),
    );

    let x0 = initial_params(kind, dist, sample_mean, sample_var);
    let objective = |params: &[f64]| negative_log_likelihood(kind, dist, params, returns, backcast);

    let SimplexResult {
        x: params,
        fx,
        iterations,
        converged,
    } = minimize(objective, &x0, SimplexOptions::default(), cancel)?;

    if !converged {
        return Err(AnalysisError::model_fit(format!(
            "{kind} optimizer did not converge within {iterations} iterations"
        )));
    }
    if !fx.is_finite() || fx >= f64::MAX / 8.0 {
        return Err(AnalysisError::model_fit(format!(
            "{kind} likelihood is undefined over the feasible region"
        )));
    }

    let eps: Vec<f64> = returns.iter().map(|r| r - params[0]).collect();
    let (sigma2, forecast2) = sigma2_path(kind, &params, &eps, backcast).ok_or_else(|| {
        AnalysisError::model_fit(format!("{kind} solution left the feasible region"))
    })?;

    let conditional: Vec<f64> = sigma2.iter().map(|s2| s2.sqrt()).collect();
    let forecast = forecast2.sqrt();
    if conditional.iter().any(|v| !v.is_finite()) || !forecast.is_finite() {
        return Err(AnalysisError::model_fit(format!(
            "{kind} produced a non-finite volatility path"
        )));
    }

    info!(model = %kind, distribution = %dist, iterations, log_likelihood = -fx, "variance model fitted");
    Ok(VarianceFit {
        conditional,
        forecast,
        log_likelihood: -fx,
    })
}

fn initial_params(
    kind: ArchModelKind,
    dist: DistributionKind,
    sample_mean: f64,
    sample_var: f64,
) -> Vec<f64> {
    let mut params = match kind {
        // [mu, omega, alpha, beta]
        ArchModelKind::Garch => vec![sample_mean, 0.1 * sample_var, 0.1, 0.8],
        // [mu, omega, alpha, gamma, beta]
        ArchModelKind::Egarch => vec![sample_mean, 0.1 * sample_var.ln(), 0.2, 0.0, 0.9],
        // [mu, omega, phi, d, beta]
        ArchModelKind::Figarch => vec![sample_mean, 0.1 * sample_var, 0.2, 0.4, 0.4],
    };
    match dist {
        DistributionKind::Normal => {}
        DistributionKind::StudentsT => params.push(8.0),
        DistributionKind::Ged => params.push(1.5),
    }
    params
}

fn negative_log_likelihood(
    kind: ArchModelKind,
    dist: DistributionKind,
    params: &[f64],
    returns: &[f64],
    backcast: f64,
) -> f64 {
    if params.iter().any(|p| !p.is_finite()) {
        return f64::INFINITY;
    }
    let Some(shape) = dist_shape(dist, params) else {
        return f64::INFINITY;
    };

    let eps: Vec<f64> = returns.iter().map(|r| r - params[0]).collect();
    let Some((sigma2, _)) = sigma2_path(kind, params, &eps, backcast) else {
        return f64::INFINITY;
    };

    let mut ll = 0.0;
    for (e, s2) in eps.iter().zip(sigma2.iter()) {
        if !s2.is_finite() || *s2 <= MIN_SIGMA2 {
            return f64::INFINITY;
        }
        ll += log_density(dist, *e, *s2, shape);
    }
    if ll.is_finite() {
        -ll
    } else {
        f64::INFINITY
    }
}

/// Conditional-variance recursion per family. Returns the in-sample path and
/// the one-step-ahead forecast variance, or `None` when the parameter vector
/// is infeasible.
fn sigma2_path(
    kind: ArchModelKind,
    params: &[f64],
    eps: &[f64],
    backcast: f64,
) -> Option<(Vec<f64>, f64)> {
    match kind {
        ArchModelKind::Garch => garch_path(params, eps, backcast),
        ArchModelKind::Egarch => egarch_path(params, eps, backcast),
        ArchModelKind::Figarch => figarch_path(params, eps, backcast),
    }
}

fn garch_path(params: &[f64], eps: &[f64], backcast: f64) -> Option<(Vec<f64>, f64)> {
    let (omega, alpha, beta) = (params[1], params[2], params[3]);
    if omega < MIN_OMEGA || alpha < 0.0 || beta < 0.0 || alpha + beta > MAX_PERSISTENCE {
        return None;
    }

    let mut sigma2 = Vec::with_capacity(eps.len());
    let mut prev_s2 = backcast;
    let mut prev_eps2 = backcast;
    for e in eps {
        let s2 = omega + alpha * prev_eps2 + beta * prev_s2;
        sigma2.push(s2);
        prev_s2 = s2;
        prev_eps2 = e * e;
    }
    let forecast = omega + alpha * prev_eps2 + beta * prev_s2;
    Some((sigma2, forecast))
}

fn egarch_path(params: &[f64], eps: &[f64], backcast: f64) -> Option<(Vec<f64>, f64)> {
    let (omega, alpha, gamma, beta) = (params[1], params[2], params[3], params[4]);
    if beta.abs() > MAX_PERSISTENCE || alpha.abs() > 5.0 || gamma.abs() > 5.0 {
        return None;
    }

    // Expected |z| under the standard normal; kept fixed across distributions.
    let abs_z_mean = (2.0 / std::f64::consts::PI).sqrt();

    let mut sigma2 = Vec::with_capacity(eps.len());
    let mut prev_ln_s2 = backcast.max(MIN_SIGMA2).ln();
    let mut prev_z: Option<f64> = None;
    for e in eps {
        let ln_s2 = match prev_z {
            Some(z) => omega + alpha * (z.abs() - abs_z_mean) + gamma * z + beta * prev_ln_s2,
            None => prev_ln_s2,
        };
        if !ln_s2.is_finite() || ln_s2.abs() > 700.0 {
            return None;
        }
        let s2 = ln_s2.exp();
        sigma2.push(s2);
        prev_ln_s2 = ln_s2;
        prev_z = Some(e / s2.sqrt());
    }

    let forecast = match prev_z {
        Some(z) => {
            let ln_s2 = omega + alpha * (z.abs() - abs_z_mean) + gamma * z + beta * prev_ln_s2;
            if !ln_s2.is_finite() || ln_s2.abs() > 700.0 {
                return None;
            }
            ln_s2.exp()
        }
        None => prev_ln_s2.exp(),
    };
    Some((sigma2, forecast))
}

fn figarch_path(params: &[f64], eps: &[f64], backcast: f64) -> Option<(Vec<f64>, f64)> {
    let (omega, phi, d, beta) = (params[1], params[2], params[3], params[4]);
    let feasible = omega >= MIN_OMEGA
        && (0.0..=0.99).contains(&d)
        && phi >= 0.0
        && phi <= (1.0 - d) / 2.0
        && beta >= 0.0
        && beta <= phi + d;
    if !feasible {
        return None;
    }

    // Baillie–Bollerslev–Mikkelsen ARCH(inf) weights, truncated.
    let truncation = FIGARCH_TRUNCATION.min(eps.len().max(1));
    let mut lambda = Vec::with_capacity(truncation);
    let mut delta = d;
    lambda.push(phi - beta + d);
    for k in 2..=truncation {
        let next_delta = delta * (k as f64 - 1.0 - d) / k as f64;
        lambda.push(beta * lambda[k - 2] + (next_delta - phi * delta));
        delta = next_delta;
    }
    if lambda.iter().any(|w| *w < -1e-12) {
        return None;
    }

    let base = omega / (1.0 - beta);
    let eps2_at = |t: isize| -> f64 {
        if t < 0 {
            backcast
        } else {
            eps[t as usize].powi(2)
        }
    };

    let mut sigma2 = Vec::with_capacity(eps.len());
    for t in 0..=eps.len() {
        let mut s2 = base;
        for (k, weight) in lambda.iter().enumerate() {
            s2 += weight * eps2_at(t as isize - 1 - k as isize);
        }
        sigma2.push(s2);
    }
    let forecast = sigma2.pop()?;
    Some((sigma2, forecast))
}

/// Extract and bound-check the distribution shape parameter, if any.
fn dist_shape(dist: DistributionKind, params: &[f64]) -> Option<f64> {
    match dist {
        DistributionKind::Normal => Some(0.0),
        DistributionKind::StudentsT => {
            let nu = *params.last()?;
            ((2.05..=200.0).contains(&nu)).then_some(nu)
        }
        DistributionKind::Ged => {
            let nu = *params.last()?;
            ((0.5..=10.0).contains(&nu)).then_some(nu)
        }
    }
}

fn log_density(dist: DistributionKind, eps: f64, sigma2: f64, shape: f64) -> f64 {
    let z2 = eps * eps / sigma2;
    match dist {
        DistributionKind::Normal => {
            -0.5 * ((2.0 * std::f64::consts::PI).ln() + sigma2.ln() + z2)
        }
        DistributionKind::StudentsT => {
            let nu = shape;
            ln_gamma((nu + 1.0) / 2.0)
                - ln_gamma(nu / 2.0)
                - 0.5 * (std::f64::consts::PI * (nu - 2.0)).ln()
                - 0.5 * sigma2.ln()
                - (nu + 1.0) / 2.0 * (1.0 + z2 / (nu - 2.0)).ln()
        }
        DistributionKind::Ged => {
            let nu = shape;
            let lambda2 = (-2.0 / nu * 2.0_f64.ln() + ln_gamma(1.0 / nu) - ln_gamma(3.0 / nu)).exp();
            let lambda = lambda2.sqrt();
            let z_abs = (eps / (sigma2.sqrt() * lambda)).abs();
            nu.ln() - lambda.ln() - (1.0 + 1.0 / nu) * 2.0_f64.ln() - ln_gamma(1.0 / nu)
                - 0.5 * z_abs.powf(nu)
                - 0.5 * sigma2.ln()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random GARCH-like series, scaled by 100.
    fn synthetic_returns(n: usize) -> Vec<f64> {
        let mut state = 0x9e37_79b9_u64;
        let mut sigma2 = 1.0_f64;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let uniform = (state >> 11) as f64 / (1_u64 << 53) as f64;
            // Crude normal via sum of uniforms is enough for fit smoke input.
            let mut z = 0.0;
            for shift in 0..12 {
                let bits = state.rotate_left(shift * 5);
                z += (bits >> 11) as f64 / (1_u64 << 53) as f64;
            }
            z -= 6.0;
            let r = z * sigma2.sqrt();
            sigma2 = 0.05 + 0.08 * r * r + 0.85 * sigma2;
            out.push(r + 0.02 * (uniform - 0.5));
        }
        out
    }

    #[test]
    fn garch_path_matches_hand_recursion() {
        let eps = [1.0, -2.0, 0.5];
        let params = [0.0, 0.1, 0.2, 0.7];
        let backcast = 1.5;
        let (sigma2, forecast) = garch_path(&params, &eps, backcast).expect("feasible");

        let s0 = 0.1 + 0.2 * 1.5 + 0.7 * 1.5;
        let s1 = 0.1 + 0.2 * 1.0 + 0.7 * s0;
        let s2 = 0.1 + 0.2 * 4.0 + 0.7 * s1;
        assert!((sigma2[0] - s0).abs() < 1e-12);
        assert!((sigma2[1] - s1).abs() < 1e-12);
        assert!((sigma2[2] - s2).abs() < 1e-12);
        assert!((forecast - (0.1 + 0.2 * 0.25 + 0.7 * s2)).abs() < 1e-12);
    }

    #[test]
    fn garch_rejects_explosive_persistence() {
        assert!(garch_path(&[0.0, 0.1, 0.6, 0.6], &[1.0], 1.0).is_none());
    }

    #[test]
    fn egarch_path_matches_hand_recursion() {
        let eps = [1.0, -0.5];
        let params = [0.0, 0.1, 0.2, -0.1, 0.9];
        let (sigma2, forecast) = egarch_path(&params, &eps, 1.0).expect("feasible");

        // First step has no lagged shock: ln s2 = ln(backcast) = 0.
        assert!((sigma2[0] - 1.0).abs() < 1e-12);

        let abs_z_mean = (2.0 / std::f64::consts::PI).sqrt();
        let ln_s1 = 0.1 + 0.2 * (1.0 - abs_z_mean) - 0.1 * 1.0;
        assert!((sigma2[1] - ln_s1.exp()).abs() < 1e-12);

        let z1 = -0.5 / sigma2[1].sqrt();
        let ln_forecast = 0.1 + 0.2 * (z1.abs() - abs_z_mean) - 0.1 * z1 + 0.9 * ln_s1;
        assert!((forecast - ln_forecast.exp()).abs() < 1e-12);
    }

    #[test]
    fn figarch_weights_stay_nonnegative_on_feasible_params() {
        let eps = vec![0.5; 50];
        let (sigma2, forecast) = figarch_path(&[0.0, 0.1, 0.2, 0.4, 0.4], &eps, 0.25)
            .expect("feasible");
        assert_eq!(sigma2.len(), 50);
        assert!(sigma2.iter().all(|s2| *s2 > 0.0));
        assert!(forecast > 0.0);
    }

    #[test]
    fn fit_recovers_a_volatility_path() {
        let returns = synthetic_returns(300);
        let fitted = fit(
            ArchModelKind::Garch,
            DistributionKind::Normal,
            &returns,
            &CancelFlag::new(),
        )
        .expect("must fit");

        assert_eq!(fitted.conditional.len(), returns.len());
        assert!(fitted.forecast > 0.0);
        assert!(fitted.conditional.iter().all(|v| v.is_finite() && *v > 0.0));
    }

    #[test]
    fn degenerate_series_fails_cleanly() {
        let constant = vec![0.0; 100];
        let err = fit(
            ArchModelKind::Garch,
            DistributionKind::Normal,
            &constant,
            &CancelFlag::new(),
        )
        .expect_err("must fail");
        assert!(matches!(err, AnalysisError::ModelFitFailure { .. }));
    }

    #[test]
    fn student_t_likelihood_needs_valid_shape() {
        assert!(dist_shape(DistributionKind::StudentsT, &[0.0, 1.9]).is_none());
        assert!(dist_shape(DistributionKind::StudentsT, &[0.0, 8.0]).is_some());
    }
}
