//! Bernoulli distribution parameterised by its logit.

use crate::math::{log1pexp, sigmoid};
use sk_core::{Error, Result};

/// Log-PMF of `Bernoulli(sigmoid(eta))` at `k ∈ {0, 1}`.
///
/// `log p(k) = k * eta - log(1 + exp(eta))`
pub fn logpmf_logit(k: f64, eta: f64) -> Result<f64> {
    if k != 0.0 && k != 1.0 {
        return Err(Error::Validation(format!("k must be 0 or 1, got {}", k)));
    }
    Ok(k * eta - log1pexp(eta))
}

/// `d/deta logpmf_logit(k; eta) = k - sigmoid(eta)`.
pub fn dlogpmf_deta(k: f64, eta: f64) -> f64 {
    k - sigmoid(eta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_matches_probability_form() {
        let eta: f64 = 0.7;
        let p = 1.0 / (1.0 + (-eta).exp());
        assert_relative_eq!(logpmf_logit(1.0, eta).unwrap(), p.ln(), epsilon = 1e-12);
        assert_relative_eq!(logpmf_logit(0.0, eta).unwrap(), (1.0 - p).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_extreme_logits_stay_finite() {
        assert!(logpmf_logit(0.0, 800.0).unwrap().is_finite());
        assert!(logpmf_logit(1.0, -800.0).unwrap().is_finite());
    }

    #[test]
    fn test_invalid_outcome() {
        assert!(logpmf_logit(2.0, 0.0).is_err());
        assert!(logpmf_logit(0.5, 0.0).is_err());
    }
}
