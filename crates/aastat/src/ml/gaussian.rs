//! Levenberg-Marquardt least squares fit of `a·exp(-(x-x0)²/(2σ²))`

use super::gauss::Gauss;
use super::matrix::Matrix;
use serde::Serialize;

const MAX_ITERATIONS: usize = 200;
const MAX_LAMBDA: f64 = 1e10;
const RELATIVE_TOLERANCE: f64 = 1e-10;

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Gaussian {
    pub height: f64,
    pub center: f64,
    pub sigma: f64,
}

impl Gaussian {
    pub fn eval(&self, x: f64) -> f64 {
        let z = (x - self.center) / self.sigma;
        self.height * (-0.5 * z * z).exp()
    }

    /// Partial derivatives with respect to (height, center, sigma)
    fn gradient(&self, x: f64) -> [f64; 3] {
        let d = x - self.center;
        let s2 = self.sigma * self.sigma;
        let e = (-0.5 * d * d / s2).exp();
        [
            e,
            self.height * e * d / s2,
            self.height * e * d * d / (s2 * self.sigma),
        ]
    }

    fn step(&self, delta: &[f64]) -> Gaussian {
        Gaussian {
            height: self.height + delta[0],
            center: self.center + delta[1],
            sigma: self.sigma + delta[2],
        }
    }

    fn is_finite(&self) -> bool {
        self.height.is_finite() && self.center.is_finite() && self.sigma.is_finite()
    }
}

/// Optimized parameters and their standard errors
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct GaussianFit {
    pub params: Gaussian,
    pub errors: Gaussian,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FitError {
    /// Fewer points than the 4 needed for a residual variance
    TooFewPoints,
    /// All weights are zero, no initial guess can be made
    EmptyData,
    NoConvergence,
    NonFinite,
    NonPositiveSigma,
    /// `JᵀJ` could not be inverted, or its inverse has a non-positive diagonal
    Singular,
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitError::TooFewPoints => f.write_str("too few points"),
            FitError::EmptyData => f.write_str("no signal in window"),
            FitError::NoConvergence => f.write_str("did not converge"),
            FitError::NonFinite => f.write_str("non-finite parameters"),
            FitError::NonPositiveSigma => f.write_str("sigma is not positive"),
            FitError::Singular => f.write_str("singular normal equations"),
        }
    }
}

/// Weighted mean and standard deviation of `xs`, height at the point closest to the mean
pub fn initial_guess(xs: &[f64], ys: &[f64]) -> Option<Gaussian> {
    let total = ys.iter().sum::<f64>();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    let center = xs.iter().zip(ys).map(|(x, y)| x * y).sum::<f64>() / total;
    let var = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| y * (x - center).powi(2))
        .sum::<f64>()
        / total;
    let height = xs
        .iter()
        .zip(ys)
        .min_by(|a, b| (a.0 - center).abs().total_cmp(&(b.0 - center).abs()))
        .map(|(_, y)| *y)?;

    // A window with every count in a single bin still needs a nonzero width
    let spacing = match xs {
        [a, b, ..] => (b - a).abs(),
        _ => 1.0,
    };
    Some(Gaussian {
        height,
        center,
        sigma: var.sqrt().max(0.5 * spacing),
    })
}

fn sum_squares(model: &Gaussian, xs: &[f64], ys: &[f64]) -> f64 {
    xs.iter()
        .zip(ys)
        .map(|(x, y)| (y - model.eval(*x)).powi(2))
        .sum()
}

/// Build `JᵀJ` and `Jᵀr` for the current parameters
fn normal_equations(model: &Gaussian, xs: &[f64], ys: &[f64]) -> (Matrix, Vec<f64>) {
    let mut jtj = Matrix::zeros(3, 3);
    let mut jtr = vec![0.0; 3];
    for (x, y) in xs.iter().zip(ys) {
        let g = model.gradient(*x);
        let r = y - model.eval(*x);
        for i in 0..3 {
            jtr[i] += g[i] * r;
            for j in 0..3 {
                jtj[(i, j)] += g[i] * g[j];
            }
        }
    }
    (jtj, jtr)
}

/// Fit a Gaussian to `(xs, ys)` starting from `guess`
pub fn fit(xs: &[f64], ys: &[f64], guess: Gaussian) -> Result<GaussianFit, FitError> {
    if xs.len() != ys.len() || xs.len() <= 3 {
        return Err(FitError::TooFewPoints);
    }

    let mut model = guess;
    let mut ssr = sum_squares(&model, xs, ys);
    let mut lambda = 1e-3;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < MAX_ITERATIONS {
        iterations += 1;
        let (jtj, jtr) = normal_equations(&model, xs, ys);

        // Marquardt scaling of the diagonal
        let mut damped = jtj.clone();
        for i in 0..3 {
            damped[(i, i)] += lambda * jtj[(i, i)].max(f64::EPSILON);
        }

        let delta = match Gauss::solve(damped, Matrix::col_vector(jtr)) {
            Some(delta) => (0..delta.rows).map(|i| delta[(i, 0)]).collect::<Vec<_>>(),
            None => {
                lambda *= 10.0;
                if lambda > MAX_LAMBDA {
                    return Err(FitError::Singular);
                }
                continue;
            }
        };

        let candidate = model.step(&delta);
        let candidate_ssr = sum_squares(&candidate, xs, ys);
        if candidate.is_finite() && candidate_ssr.is_finite() && candidate_ssr <= ssr {
            let improvement = ssr - candidate_ssr;
            model = candidate;
            ssr = candidate_ssr;
            lambda = (lambda / 10.0).max(1e-12);
            if improvement <= RELATIVE_TOLERANCE * ssr.max(f64::MIN_POSITIVE) {
                converged = true;
                break;
            }
        } else {
            lambda *= 10.0;
            // No step in any direction reduces the residual, we are at a minimum
            if lambda > MAX_LAMBDA {
                converged = true;
                break;
            }
        }
    }

    if !converged {
        return Err(FitError::NoConvergence);
    }
    if !model.is_finite() || !ssr.is_finite() {
        return Err(FitError::NonFinite);
    }

    // σ only enters the model squared
    model.sigma = model.sigma.abs();
    if model.sigma <= 0.0 {
        return Err(FitError::NonPositiveSigma);
    }

    let (jtj, _) = normal_equations(&model, xs, ys);
    let inverse = Gauss::invert(jtj).ok_or(FitError::Singular)?;
    let variance = ssr / (xs.len() - 3) as f64;
    let diagonal = inverse.diagonal();
    if diagonal.iter().any(|d| !(*d > 0.0)) {
        return Err(FitError::Singular);
    }
    let errors = diagonal
        .iter()
        .map(|d| (d * variance).sqrt())
        .collect::<Vec<_>>();

    Ok(GaussianFit {
        params: model,
        errors: Gaussian {
            height: errors[0],
            center: errors[1],
            sigma: errors[2],
        },
    })
}
