//! Normal distribution utilities.

use sk_core::{Error, Result};

/// Natural log of `sqrt(2π)`.
pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

fn check_sigma(sigma: f64) -> Result<()> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(Error::Validation(format!("sigma must be finite and > 0, got {}", sigma)));
    }
    Ok(())
}

/// Log-PDF of `N(mu, sigma)` at `x`.
///
/// `log p(x) = -0.5 * ((x-mu)/sigma)^2 - ln(sigma) - ln(sqrt(2π))`
pub fn logpdf(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    check_sigma(sigma)?;
    let z = (x - mu) / sigma;
    Ok(-0.5 * z * z - sigma.ln() - LN_SQRT_2PI)
}

/// `d/dmu logpdf(x; mu, sigma)`.
pub fn dlogpdf_dmu(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    check_sigma(sigma)?;
    Ok((x - mu) / (sigma * sigma))
}

/// Sum of independent `N(0, sigma)` log-densities over `xs` (a shrinkage prior).
pub fn iid_logpdf(xs: &[f64], sigma: f64) -> Result<f64> {
    check_sigma(sigma)?;
    let ss: f64 = xs.iter().map(|&x| x * x).sum();
    Ok(-0.5 * ss / (sigma * sigma) - xs.len() as f64 * (sigma.ln() + LN_SQRT_2PI))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_standard_at_zero() {
        assert_relative_eq!(logpdf(0.0, 0.0, 1.0).unwrap(), -LN_SQRT_2PI, epsilon = 1e-12);
    }

    #[test]
    fn test_iid_matches_sum_of_logpdf() {
        let xs = [0.3, -1.2, 2.5];
        let sum: f64 = xs.iter().map(|&x| logpdf(x, 0.0, 2.0).unwrap()).sum();
        assert_relative_eq!(iid_logpdf(&xs, 2.0).unwrap(), sum, epsilon = 1e-12);
    }

    #[test]
    fn test_derivative_vs_finite_diff() {
        let (x, mu, s) = (1.3, 0.4, 0.7);
        let eps = 1e-6;
        let fd = (logpdf(x, mu + eps, s).unwrap() - logpdf(x, mu - eps, s).unwrap()) / (2.0 * eps);
        assert_relative_eq!(dlogpdf_dmu(x, mu, s).unwrap(), fd, epsilon = 1e-6);
    }

    #[test]
    fn test_invalid_sigma() {
        assert!(logpdf(0.0, 0.0, 0.0).is_err());
        assert!(iid_logpdf(&[1.0], -1.0).is_err());
    }
}
