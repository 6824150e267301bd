//! Laplace approximation utilities.
//!
//! The posterior is approximated by a Gaussian centred at the mode `x_hat` with
//! covariance `H^-1`, where `H` is the Hessian of `NLL` at `x_hat`. The same
//! quantities give the Laplace estimate of the marginal likelihood:
//!
//! `Z = ∫ exp(-NLL(x)) dx ≈ exp(-NLL(x_hat)) * (2π)^(d/2) * |H|^(-1/2)`

use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use sk_core::traits::LogDensityModel;
use sk_core::{Chain, Error, Result, Trace};

/// Gaussian approximation of a posterior.
#[derive(Debug, Clone)]
pub struct LaplaceApproximation {
    /// Posterior mode.
    pub mode: Vec<f64>,
    /// Covariance `H^-1`.
    pub covariance: DMatrix<f64>,
    /// `log |H|`; `None` when built from stored moments.
    pub log_det_hessian: Option<f64>,
    /// `log Z` under the Laplace approximation; `None` when built from stored moments.
    pub log_marginal: Option<f64>,
    /// Any `S` with `S S^T = covariance`.
    scale: DMatrix<f64>,
}

fn compute_hessian<M: LogDensityModel + ?Sized>(model: &M, params: &[f64]) -> Result<DMatrix<f64>> {
    let n = params.len();
    let mut hessian = DMatrix::zeros(n, n);
    let mut work = params.to_vec();
    for j in 0..n {
        let eps = 1e-4 * params[j].abs().max(1.0);

        work[j] = params[j] + eps;
        let grad_plus = model.grad_nll(&work)?;
        work[j] = params[j] - eps;
        let grad_minus = model.grad_nll(&work)?;
        work[j] = params[j];

        for i in 0..n {
            hessian[(i, j)] = (grad_plus[i] - grad_minus[i]) / (2.0 * eps);
        }
    }

    // Symmetrise: H = (H + H^T)/2.
    let ht = hessian.transpose();
    Ok((&hessian + &ht) * 0.5)
}

/// Lower Cholesky factor of a symmetric matrix, with diagonal jitter for
/// numerically indefinite input.
fn cholesky_pd(h: &DMatrix<f64>, what: &str) -> Result<DMatrix<f64>> {
    let n = h.nrows();
    if n != h.ncols() {
        return Err(Error::Validation(format!("{what} must be square")));
    }

    let max_abs_diag = (0..n).map(|i| h[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);

    let mut jitter = 1e-10 * max_abs_diag;
    for attempt in 0..15 {
        let mut h_try = h.clone();
        if attempt > 0 {
            for i in 0..n {
                h_try[(i, i)] += jitter;
            }
        }

        if let Some(chol) = nalgebra::linalg::Cholesky::new(h_try) {
            let l = chol.l();
            if (0..n).any(|i| !l[(i, i)].is_finite() || l[(i, i)] <= 0.0) {
                return Err(Error::Computation(format!(
                    "non-finite/negative Cholesky diagonal in {what}"
                )));
            }
            if attempt > 0 {
                log::debug!("{what} needed diagonal jitter {jitter:e}");
            }
            return Ok(l);
        }

        jitter *= 10.0;
    }

    Err(Error::Computation(format!("{what} is not positive definite")))
}

fn log_det_from_cholesky(l: &DMatrix<f64>) -> f64 {
    2.0 * (0..l.nrows()).map(|i| l[(i, i)].ln()).sum::<f64>()
}

/// Laplace approximation of `model` at `mode`.
pub fn laplace_at_mode<M: LogDensityModel + ?Sized>(
    model: &M,
    mode: &[f64],
) -> Result<LaplaceApproximation> {
    if mode.len() != model.dim() {
        return Err(Error::Validation(format!(
            "mode has {} entries, model has {} parameters",
            mode.len(),
            model.dim()
        )));
    }

    let nll = model.nll(mode)?;
    if !nll.is_finite() {
        return Err(Error::Computation("nll at mode must be finite".to_string()));
    }

    let h = compute_hessian(model, mode)?;
    let l = cholesky_pd(&h, "Hessian")?;
    let log_det = log_det_from_cholesky(&l);

    // H = L L^T  =>  H^-1 = U U^T with U = L^-T.
    let n = mode.len();
    let scale = l
        .transpose()
        .solve_upper_triangular(&DMatrix::identity(n, n))
        .ok_or_else(|| Error::Computation("singular Cholesky factor".to_string()))?;
    let covariance = &scale * scale.transpose();

    let d = n as f64;
    let log2pi = (2.0 * std::f64::consts::PI).ln();
    let log_marginal = -nll + 0.5 * d * log2pi - 0.5 * log_det;

    Ok(LaplaceApproximation {
        mode: mode.to_vec(),
        covariance,
        log_det_hessian: Some(log_det),
        log_marginal: Some(log_marginal),
        scale,
    })
}

impl LaplaceApproximation {
    /// Rebuild from a stored mode and covariance.
    pub fn from_moments(mode: Vec<f64>, covariance: DMatrix<f64>) -> Result<Self> {
        let n = mode.len();
        if covariance.nrows() != n || covariance.ncols() != n {
            return Err(Error::Validation(format!(
                "covariance is {}x{}, expected {n}x{n}",
                covariance.nrows(),
                covariance.ncols()
            )));
        }
        if mode.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
            return Err(Error::Validation("mode and covariance must be finite".to_string()));
        }
        let scale = cholesky_pd(&covariance, "covariance")?;
        Ok(Self { mode, covariance, log_det_hessian: None, log_marginal: None, scale })
    }

    /// Number of parameters.
    pub fn dim(&self) -> usize {
        self.mode.len()
    }

    /// Marginal standard deviations.
    pub fn std_devs(&self) -> Vec<f64> {
        (0..self.dim()).map(|i| self.covariance[(i, i)].max(0.0).sqrt()).collect()
    }

    /// One draw from `N(mode, covariance)`.
    pub fn sample<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let z = DVector::from_iterator(self.dim(), (0..self.dim()).map(|_| StandardNormal.sample(rng)));
        let x = &self.scale * z;
        self.mode.iter().zip(x.iter()).map(|(m, dx)| m + dx).collect()
    }

    /// Independent draws arranged as `chains` chains of `samples` draws each.
    ///
    /// Chain `k` is seeded with `seed + k`, so results do not depend on thread count.
    pub fn draw_chains(
        &self,
        param_names: Vec<String>,
        chains: usize,
        samples: usize,
        seed: u64,
    ) -> Result<Trace> {
        if param_names.len() != self.dim() {
            return Err(Error::Validation(format!(
                "{} parameter names for {} parameters",
                param_names.len(),
                self.dim()
            )));
        }
        let chains: Vec<Chain> = (0..chains)
            .into_par_iter()
            .map(|chain_id| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(chain_id as u64));
                let draws = (0..samples).map(|_| self.sample(&mut rng)).collect();
                Chain { draws, ..Default::default() }
            })
            .collect();
        Ok(Trace { param_names, chains })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Independent Gaussian with sds 2 and 0.5, centred at (1, -1).
    struct Diag;

    impl LogDensityModel for Diag {
        fn dim(&self) -> usize {
            2
        }
        fn parameter_names(&self) -> Vec<String> {
            vec!["a".into(), "b".into()]
        }
        fn nll(&self, p: &[f64]) -> Result<f64> {
            Ok(0.5 * ((p[0] - 1.0) / 2.0).powi(2) + 0.5 * ((p[1] + 1.0) / 0.5).powi(2))
        }
        fn grad_nll(&self, p: &[f64]) -> Result<Vec<f64>> {
            Ok(vec![(p[0] - 1.0) / 4.0, (p[1] + 1.0) / 0.25])
        }
    }

    #[test]
    fn test_covariance_is_inverse_hessian() {
        let lap = laplace_at_mode(&Diag, &[1.0, -1.0]).unwrap();
        assert_relative_eq!(lap.covariance[(0, 0)], 4.0, epsilon = 1e-6);
        assert_relative_eq!(lap.covariance[(1, 1)], 0.25, epsilon = 1e-6);
        assert_relative_eq!(lap.covariance[(0, 1)], 0.0, epsilon = 1e-8);
        assert_relative_eq!(lap.std_devs()[0], 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_log_marginal_of_gaussian_is_exact() {
        // Z = 2π * 2 * 0.5 for an unnormalised Gaussian with sds 2 and 0.5.
        let lap = laplace_at_mode(&Diag, &[1.0, -1.0]).unwrap();
        let expected = (2.0 * std::f64::consts::PI).ln();
        assert_relative_eq!(lap.log_marginal.unwrap(), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_draw_chains_moments_and_determinism() {
        let lap = laplace_at_mode(&Diag, &[1.0, -1.0]).unwrap();
        let names = Diag.parameter_names();
        let t1 = lap.draw_chains(names.clone(), 4, 2000, 11).unwrap();
        let t2 = lap.draw_chains(names, 4, 2000, 11).unwrap();
        assert_eq!(t1, t2);
        assert_eq!(t1.chains.len(), 4);
        assert_eq!(t1.total_draws(), 8000);
        assert_relative_eq!(t1.param_mean(0), 1.0, epsilon = 0.1);
        assert_relative_eq!(t1.param_mean(1), -1.0, epsilon = 0.05);
        assert_relative_eq!(t1.param_sd(0), 2.0, epsilon = 0.1);
        assert_relative_eq!(t1.param_sd(1), 0.5, epsilon = 0.05);
    }

    #[test]
    fn test_from_moments_round_trip() {
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 0.3, 0.3, 2.0]);
        let lap = LaplaceApproximation::from_moments(vec![0.0, 1.0], cov.clone()).unwrap();
        assert_eq!(lap.covariance, cov);
        assert!(lap.log_marginal.is_none());

        let bad = DMatrix::from_row_slice(1, 1, &[1.0]);
        assert!(LaplaceApproximation::from_moments(vec![0.0, 1.0], bad).is_err());
    }

    #[test]
    fn test_wrong_name_count_rejected() {
        let lap = laplace_at_mode(&Diag, &[1.0, -1.0]).unwrap();
        assert!(lap.draw_chains(vec!["a".into()], 1, 1, 0).is_err());
    }
}
