//! Nelder-Mead simplex minimizer used by the variance-model likelihood fits.

use marketlens_core::AnalysisError;

use crate::cancel::CancelFlag;

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct SimplexOptions {
    pub max_iter: usize,
    pub f_tol: f64,
    pub x_tol: f64,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            max_iter: 5_000,
            f_tol: 1e-6,
            x_tol: 1e-6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimplexResult {
    pub x: Vec<f64>,
    pub fx: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimize `objective` starting from `x0`.
///
/// The objective may return non-finite values for infeasible points; those
/// rank as worst and the simplex moves away from them. Cancellation is
/// honored at iteration boundaries.
pub fn minimize(
    objective: impl Fn(&[f64]) -> f64,
    x0: &[f64],
    options: SimplexOptions,
    cancel: &CancelFlag,
) -> Result<SimplexResult, AnalysisError> {
    let dim = x0.len();
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
    simplex.push(x0.to_vec());
    for i in 0..dim {
        let mut vertex = x0.to_vec();
        if vertex[i] != 0.0 {
            vertex[i] *= 1.05;
        } else {
            vertex[i] = 0.000_25;
        }
        simplex.push(vertex);
    }

    let mut values: Vec<f64> = simplex.iter().map(|v| penalized(&objective, v)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < options.max_iter {
        if cancel.is_cancelled() {
            return Err(AnalysisError::model_fit("fit cancelled by caller"));
        }
        iterations += 1;

        sort_simplex(&mut simplex, &mut values);
        if spread(&values) <= options.f_tol && diameter(&simplex) <= options.x_tol {
            converged = true;
            break;
        }

        let centroid = centroid_excluding_worst(&simplex);
        let worst = simplex.len() - 1;

        let reflected = blend(&centroid, &simplex[worst], 1.0 + REFLECT, -REFLECT);
        let f_reflected = penalized(&objective, &reflected);

        if f_reflected < values[0] {
            let expanded = blend(&centroid, &simplex[worst], 1.0 + EXPAND, -EXPAND);
            let f_expanded = penalized(&objective, &expanded);
            if f_expanded < f_reflected {
                simplex[worst] = expanded;
                values[worst] = f_expanded;
            } else {
                simplex[worst] = reflected;
                values[worst] = f_reflected;
            }
        } else if f_reflected < values[worst - 1] {
            simplex[worst] = reflected;
            values[worst] = f_reflected;
        } else {
            let contracted = blend(&centroid, &simplex[worst], 1.0 - CONTRACT, CONTRACT);
            let f_contracted = penalized(&objective, &contracted);
            if f_contracted < values[worst] {
                simplex[worst] = contracted;
                values[worst] = f_contracted;
            } else {
                shrink_towards_best(&mut simplex);
                for (vertex, value) in simplex.iter().zip(values.iter_mut()).skip(1) {
                    *value = penalized(&objective, vertex);
                }
            }
        }
    }

    sort_simplex(&mut simplex, &mut values);
    Ok(SimplexResult {
        x: simplex.swap_remove(0),
        fx: values[0],
        iterations,
        converged,
    })
}

fn penalized(objective: &impl Fn(&[f64]) -> f64, x: &[f64]) -> f64 {
    let value = objective(x);
    if value.is_finite() {
        value
    } else {
        f64::MAX / 4.0
    }
}

fn sort_simplex(simplex: &mut [Vec<f64>], values: &mut [f64]) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let sorted_simplex: Vec<Vec<f64>> = order.iter().map(|&i| simplex[i].clone()).collect();
    let sorted_values: Vec<f64> = order.iter().map(|&i| values[i]).collect();
    simplex.clone_from_slice(&sorted_simplex);
    values.copy_from_slice(&sorted_values);
}

fn spread(values: &[f64]) -> f64 {
    values
        .iter()
        .map(|v| (v - values[0]).abs())
        .fold(0.0, f64::max)
}

fn diameter(simplex: &[Vec<f64>]) -> f64 {
    simplex[1..]
        .iter()
        .flat_map(|vertex| {
            vertex
                .iter()
                .zip(simplex[0].iter())
                .map(|(a, b)| (a - b).abs())
        })
        .fold(0.0, f64::max)
}

fn centroid_excluding_worst(simplex: &[Vec<f64>]) -> Vec<f64> {
    let dim = simplex[0].len();
    let count = (simplex.len() - 1) as f64;
    let mut centroid = vec![0.0; dim];
    for vertex in &simplex[..simplex.len() - 1] {
        for (c, v) in centroid.iter_mut().zip(vertex.iter()) {
            *c += v / count;
        }
    }
    centroid
}

fn blend(a: &[f64], b: &[f64], wa: f64, wb: f64) -> Vec<f64> {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| wa * x + wb * y)
        .collect()
}

fn shrink_towards_best(simplex: &mut [Vec<f64>]) {
    let best = simplex[0].clone();
    for vertex in simplex.iter_mut().skip(1) {
        for (v, b) in vertex.iter_mut().zip(best.iter()) {
            *v = b + SHRINK * (*v - b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimizes_quadratic_bowl() {
        let result = minimize(
            |x| (x[0] - 3.0).powi(2) + (x[1] + 1.0).powi(2),
            &[0.0, 0.0],
            SimplexOptions::default(),
            &CancelFlag::new(),
        )
        .expect("must minimize");

        assert!(result.converged);
        assert!((result.x[0] - 3.0).abs() < 1e-4);
        assert!((result.x[1] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn escapes_infeasible_regions() {
        // Objective undefined for x < 0; minimum at x = 2.
        let result = minimize(
            |x| {
                if x[0] < 0.0 {
                    f64::INFINITY
                } else {
                    (x[0] - 2.0).powi(2)
                }
            },
            &[5.0],
            SimplexOptions::default(),
            &CancelFlag::new(),
        )
        .expect("must minimize");

        assert!((result.x[0] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn cancellation_aborts_the_fit() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = minimize(
            |x| x[0].powi(2),
            &[1.0],
            SimplexOptions::default(),
            &cancel,
        )
        .expect_err("must abort");
        assert!(matches!(err, AnalysisError::ModelFitFailure { .. }));
    }
}
