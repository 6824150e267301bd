//! Common data types for skstan

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::backend::BackendName;
use crate::{Error, Result};

/// Regression family (link + likelihood).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Gaussian likelihood, identity link.
    Linear,
    /// Bernoulli likelihood, logit link.
    Logistic,
    /// Poisson likelihood, log link.
    Poisson,
}

impl Family {
    /// All families, in declaration order.
    pub const ALL: [Family; 3] = [Family::Linear, Family::Logistic, Family::Poisson];

    /// Short lowercase name (`"linear"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Linear => "linear",
            Family::Logistic => "logistic",
            Family::Poisson => "poisson",
        }
    }

    /// Canonical persisted-model name (`"linear_regression"`, ...).
    pub fn model_name(&self) -> &'static str {
        match self {
            Family::Linear => "linear_regression",
            Family::Logistic => "logistic_regression",
            Family::Poisson => "poisson_regression",
        }
    }

    /// Check that labels are admissible for this family.
    pub fn validate_labels(&self, y: &[f64]) -> Result<()> {
        for (i, &v) in y.iter().enumerate() {
            if !v.is_finite() {
                return Err(Error::Validation(format!("y[{i}] is not finite")));
            }
            match self {
                Family::Linear => {}
                Family::Logistic if v != 0.0 && v != 1.0 => {
                    return Err(Error::Validation(format!(
                        "logistic labels must be 0/1, y[{i}] = {v}"
                    )));
                }
                Family::Poisson if v < 0.0 || v.fract() != 0.0 => {
                    return Err(Error::Validation(format!(
                        "poisson labels must be non-negative integers, y[{i}] = {v}"
                    )));
                }
                // Stan `int` data is 32-bit.
                Family::Poisson if v > f64::from(i32::MAX) => {
                    return Err(Error::Validation(format!(
                        "poisson label y[{i}] = {v} exceeds the largest count ({})",
                        i32::MAX
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linear" | "linear_regression" => Ok(Family::Linear),
            "logistic" | "logistic_regression" => Ok(Family::Logistic),
            "poisson" | "poisson_regression" => Ok(Family::Poisson),
            other => Err(Error::Validation(format!("unknown regression family '{other}'"))),
        }
    }
}

/// Hyperparameters shared by all backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// Prior scale of every coefficient: `beta_j ~ Normal(0, shrinkage)`.
    pub shrinkage: f64,
    /// Number of chains.
    pub chains: usize,
    /// Warmup iterations per chain (ignored by approximate backends).
    pub warmup: usize,
    /// Post-warmup draws per chain.
    pub samples: usize,
    /// Base RNG seed.
    pub seed: u64,
    /// Fit an intercept `alpha` in addition to the coefficients.
    pub include_intercept: bool,
    /// Observation noise sigma of the linear model.
    pub noise_scale: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            shrinkage: 10.0,
            chains: 4,
            warmup: 1000,
            samples: 1000,
            seed: 42,
            include_intercept: true,
            noise_scale: 1.0,
        }
    }
}

impl Hyperparameters {
    /// Reject values no backend can work with.
    pub fn validate(&self) -> Result<()> {
        if !self.shrinkage.is_finite() || self.shrinkage <= 0.0 {
            return Err(Error::Validation(format!(
                "shrinkage must be finite and > 0, got {}",
                self.shrinkage
            )));
        }
        if !self.noise_scale.is_finite() || self.noise_scale <= 0.0 {
            return Err(Error::Validation(format!(
                "noise_scale must be finite and > 0, got {}",
                self.noise_scale
            )));
        }
        if self.chains == 0 {
            return Err(Error::Validation("chains must be >= 1".to_string()));
        }
        if self.samples == 0 {
            return Err(Error::Validation("samples must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Draws of one chain, one row per draw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    /// Parameter draws (`draws[t][param]`).
    pub draws: Vec<Vec<f64>>,
    /// Divergence flag per draw (empty if the backend does not report it).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub divergences: Vec<bool>,
    /// Log density per draw (`lp__`), if reported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log_density: Vec<f64>,
}

/// Multi-chain draws with parameter names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Parameter names, one per column of every draw.
    pub param_names: Vec<String>,
    /// Individual chains.
    pub chains: Vec<Chain>,
}

impl Trace {
    /// Total number of draws across all chains.
    pub fn total_draws(&self) -> usize {
        self.chains.iter().map(|c| c.draws.len()).sum()
    }

    /// Index of a parameter by name.
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.param_names.iter().position(|n| n == name)
    }

    /// Draws for a single parameter (index) across all chains.
    pub fn param_draws(&self, param_idx: usize) -> Vec<Vec<f64>> {
        self.chains.iter().map(|c| c.draws.iter().map(|d| d[param_idx]).collect()).collect()
    }

    /// Mean of a parameter across all draws and chains.
    pub fn param_mean(&self, param_idx: usize) -> f64 {
        let n = self.total_draws();
        if n == 0 {
            return f64::NAN;
        }
        let sum: f64 =
            self.chains.iter().flat_map(|c| c.draws.iter()).map(|d| d[param_idx]).sum();
        sum / n as f64
    }

    /// Sample standard deviation of a parameter across all draws and chains.
    pub fn param_sd(&self, param_idx: usize) -> f64 {
        let n = self.total_draws();
        if n < 2 {
            return f64::NAN;
        }
        let mean = self.param_mean(param_idx);
        let ss: f64 = self
            .chains
            .iter()
            .flat_map(|c| c.draws.iter())
            .map(|d| (d[param_idx] - mean).powi(2))
            .sum();
        (ss / (n as f64 - 1.0)).sqrt()
    }

    /// Posterior mean of every parameter.
    pub fn mean_vector(&self) -> Vec<f64> {
        (0..self.param_names.len()).map(|i| self.param_mean(i)).collect()
    }
}

/// Output of [`crate::RegressionModel::fit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Backend that produced the fit.
    pub backend: BackendName,
    /// Regression family.
    pub family: Family,
    /// Parameter names (`alpha`, `beta.1`, ...).
    pub parameter_names: Vec<String>,
    /// Hyperparameters the model was fitted with.
    pub hyperparameters: Hyperparameters,
    /// Posterior mode, when the backend computes one.
    pub mode: Option<Vec<f64>>,
    /// Posterior covariance (row-major), when the backend computes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covariance: Option<Vec<Vec<f64>>>,
    /// Posterior draws (exact for samplers, approximate otherwise).
    pub trace: Trace,
    /// Whether the backend reported success of its own procedure.
    pub converged: bool,
    /// Free-form backend message (termination reason, CmdStan output path, ...).
    pub message: String,
}

impl FitResult {
    /// Posterior point estimate: the mode if available, else the draw mean.
    pub fn point_estimate(&self) -> Vec<f64> {
        self.mode.clone().unwrap_or_else(|| self.trace.mean_vector())
    }

    /// Split a parameter vector into `(intercept, coefficients)`.
    ///
    /// The intercept is `0.0` when the fit has no `alpha` parameter.
    pub fn split_intercept(&self, params: &[f64]) -> (f64, Vec<f64>) {
        match (self.parameter_names.first().map(String::as_str), params.split_first()) {
            (Some("alpha"), Some((&alpha, beta))) => (alpha, beta.to_vec()),
            _ => (0.0, params.to_vec()),
        }
    }

    /// Number of coefficients (parameters other than the intercept).
    pub fn n_features(&self) -> usize {
        let intercept = self.parameter_names.first().is_some_and(|n| n == "alpha");
        self.parameter_names.len() - usize::from(intercept)
    }
}

/// Parameter names for `n_features` coefficients (Stan-style `beta.<j>`).
pub fn parameter_names(n_features: usize, include_intercept: bool) -> Vec<String> {
    let mut out = Vec::with_capacity(n_features + usize::from(include_intercept));
    if include_intercept {
        out.push("alpha".to_string());
    }
    for j in 0..n_features {
        out.push(format!("beta.{}", j + 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_chain_trace() -> Trace {
        Trace {
            param_names: vec!["alpha".into(), "beta.1".into()],
            chains: vec![
                Chain { draws: vec![vec![1.0, 10.0], vec![3.0, 10.0]], ..Default::default() },
                Chain { draws: vec![vec![5.0, 10.0]], ..Default::default() },
            ],
        }
    }

    #[test]
    fn test_trace_moments() {
        let t = two_chain_trace();
        assert_eq!(t.total_draws(), 3);
        assert_relative_eq!(t.param_mean(0), 3.0);
        assert_relative_eq!(t.param_sd(0), 2.0);
        assert_relative_eq!(t.param_sd(1), 0.0);
        assert_eq!(t.param_draws(0), vec![vec![1.0, 3.0], vec![5.0]]);
        assert_eq!(t.param_index("beta.1"), Some(1));
    }

    #[test]
    fn test_family_parse_and_names() {
        assert_eq!("Logistic".parse::<Family>().unwrap(), Family::Logistic);
        assert_eq!("poisson_regression".parse::<Family>().unwrap(), Family::Poisson);
        assert!("gamma".parse::<Family>().is_err());
        assert_eq!(Family::Linear.model_name(), "linear_regression");
    }

    #[test]
    fn test_family_label_validation() {
        assert!(Family::Logistic.validate_labels(&[0.0, 1.0]).is_ok());
        assert!(Family::Logistic.validate_labels(&[0.5]).is_err());
        assert!(Family::Poisson.validate_labels(&[0.0, 3.0]).is_ok());
        assert!(Family::Poisson.validate_labels(&[-1.0]).is_err());
        assert!(Family::Poisson.validate_labels(&[1.5]).is_err());
        assert!(Family::Poisson.validate_labels(&[f64::from(i32::MAX)]).is_ok());
        assert!(matches!(
            Family::Poisson.validate_labels(&[1e20]),
            Err(Error::Validation(_))
        ));
        assert!(Family::Linear.validate_labels(&[f64::NAN]).is_err());
    }

    #[test]
    fn test_hyperparameters_validation() {
        assert!(Hyperparameters::default().validate().is_ok());
        let bad = Hyperparameters { shrinkage: 0.0, ..Default::default() };
        assert!(bad.validate().is_err());
        let bad = Hyperparameters { chains: 0, ..Default::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_parameter_names_and_split() {
        let names = parameter_names(2, true);
        assert_eq!(names, vec!["alpha", "beta.1", "beta.2"]);
        let fit = FitResult {
            backend: BackendName::TFP,
            family: Family::Linear,
            parameter_names: names,
            hyperparameters: Hyperparameters::default(),
            mode: Some(vec![0.5, 1.0, 2.0]),
            covariance: None,
            trace: Trace::default(),
            converged: true,
            message: String::new(),
        };
        let (a, b) = fit.split_intercept(&fit.point_estimate());
        assert_relative_eq!(a, 0.5);
        assert_eq!(b, vec![1.0, 2.0]);
        assert_eq!(fit.n_features(), 2);
    }
}
