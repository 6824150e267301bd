//! Poisson distribution parameterised by its log-rate.

use crate::math::{exp_clamped, ln_factorial};
use sk_core::{Error, Result};

/// Log-PMF of `Poisson(exp(eta))` at count `k`.
///
/// `log p(k) = k * eta - exp(eta) - ln(k!)`
pub fn logpmf_log_rate(k: f64, eta: f64) -> Result<f64> {
    if k < 0.0 || k.fract() != 0.0 || !k.is_finite() {
        return Err(Error::Validation(format!("k must be a non-negative integer, got {}", k)));
    }
    Ok(k * eta - exp_clamped(eta) - ln_factorial(k))
}

/// `d/deta logpmf_log_rate(k; eta) = k - exp(eta)`.
pub fn dlogpmf_deta(k: f64, eta: f64) -> f64 {
    k - exp_clamped(eta)
}
