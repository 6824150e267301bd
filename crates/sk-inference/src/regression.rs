//! Generative regression models.
//!
//! Every family shares the coefficient prior and differs in the outcome likelihood:
//!
//! ```text
//! alpha, beta_j ~ Normal(0, shrinkage)
//! eta_i = alpha + x_i · beta
//! linear:   y_i ~ Normal(eta_i, noise_scale)
//! logistic: y_i ~ Bernoulli(sigmoid(eta_i))
//! poisson:  y_i ~ Poisson(exp(eta_i))
//! ```
//!
//! [`JointDistribution`] binds a [`GlmSpec`] to a feature matrix (samples are rows).
//! Conditioning it on outcomes yields a [`ConditionedGlm`], a
//! [`LogDensityModel`] ready for MAP optimisation.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Bernoulli, Distribution, Normal, Poisson};
use sk_core::traits::LogDensityModel;
use sk_core::types::parameter_names;
use sk_core::{Error, Family, Hyperparameters, LogJointFn, Result};
use sk_prob::math::{exp_clamped, sigmoid};
use sk_prob::{bernoulli, normal, poisson};

/// Largest Poisson rate drawn by [`JointDistribution::sample`].
const MAX_POISSON_RATE: f64 = 1e12;

/// Family plus the hyperparameters that enter the density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlmSpec {
    /// Likelihood / link.
    pub family: Family,
    /// Prior sigma of intercept and coefficients.
    pub shrinkage: f64,
    /// Observation sigma (linear family only).
    pub noise_scale: f64,
    /// Whether `params[0]` is an intercept.
    pub include_intercept: bool,
}

impl GlmSpec {
    /// Build from shared hyperparameters.
    pub fn new(family: Family, hyper: &Hyperparameters) -> Result<Self> {
        hyper.validate()?;
        Ok(Self {
            family,
            shrinkage: hyper.shrinkage,
            noise_scale: hyper.noise_scale,
            include_intercept: hyper.include_intercept,
        })
    }

    /// Number of parameters for `n_features` columns.
    pub fn dim(&self, n_features: usize) -> usize {
        n_features + usize::from(self.include_intercept)
    }

    /// Human-readable model statement.
    pub fn describe(&self) -> String {
        let likelihood = match self.family {
            Family::Linear => format!("Normal(eta, {})", self.noise_scale),
            Family::Logistic => "Bernoulli(sigmoid(eta))".to_string(),
            Family::Poisson => "Poisson(exp(eta))".to_string(),
        };
        let eta = if self.include_intercept { "alpha + x·beta" } else { "x·beta" };
        format!(
            "{} regression: coefficients ~ Normal(0, {}); eta = {}; y ~ {}",
            self.family, self.shrinkage, eta, likelihood
        )
    }

    fn check(&self, x: &DMatrix<f64>, params: &[f64]) -> Result<()> {
        let d = self.dim(x.ncols());
        if params.len() != d {
            return Err(Error::Validation(format!(
                "expected {} parameters, got {}",
                d,
                params.len()
            )));
        }
        if params.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation("params must contain only finite values".to_string()));
        }
        Ok(())
    }

    fn check_outcomes(&self, x: &DMatrix<f64>, y: &[f64]) -> Result<()> {
        if y.len() != x.nrows() {
            return Err(Error::Validation(format!(
                "y has wrong length: expected n={}, got {}",
                x.nrows(),
                y.len()
            )));
        }
        self.family.validate_labels(y)
    }

    fn split<'p>(&self, params: &'p [f64]) -> (f64, &'p [f64]) {
        match params.split_first() {
            Some((&alpha, beta)) if self.include_intercept => (alpha, beta),
            _ => (0.0, params),
        }
    }

    /// Linear predictor `eta = alpha + X beta`.
    pub fn linear_predictor(&self, x: &DMatrix<f64>, params: &[f64]) -> Result<DVector<f64>> {
        self.check(x, params)?;
        let (alpha, beta) = self.split(params);
        let mut eta = x * DVector::from_column_slice(beta);
        eta.add_scalar_mut(alpha);
        Ok(eta)
    }

    /// Inverse link applied to one linear predictor value.
    pub fn inverse_link(&self, eta: f64) -> f64 {
        match self.family {
            Family::Linear => eta,
            Family::Logistic => sigmoid(eta),
            Family::Poisson => exp_clamped(eta),
        }
    }

    /// Log-prior of all parameters.
    pub fn log_prior(&self, params: &[f64]) -> Result<f64> {
        normal::iid_logpdf(params, self.shrinkage)
    }

    /// Log-likelihood of `y` given `x` and `params`.
    pub fn log_likelihood(&self, x: &DMatrix<f64>, params: &[f64], y: &[f64]) -> Result<f64> {
        self.check_outcomes(x, y)?;
        let eta = self.linear_predictor(x, params)?;
        let mut ll = 0.0;
        for (&yi, &ei) in y.iter().zip(eta.iter()) {
            ll += match self.family {
                Family::Linear => normal::logpdf(yi, ei, self.noise_scale)?,
                Family::Logistic => bernoulli::logpmf_logit(yi, ei)?,
                Family::Poisson => poisson::logpmf_log_rate(yi, ei)?,
            };
        }
        Ok(ll)
    }

    /// Log-joint `log p(params) + log p(y | x, params)`.
    pub fn log_prob(&self, x: &DMatrix<f64>, params: &[f64], y: &[f64]) -> Result<f64> {
        Ok(self.log_prior(params)? + self.log_likelihood(x, params, y)?)
    }

    /// Gradient of [`GlmSpec::log_prob`] with respect to `params`.
    pub fn grad_log_prob(&self, x: &DMatrix<f64>, params: &[f64], y: &[f64]) -> Result<Vec<f64>> {
        self.check_outcomes(x, y)?;
        let eta = self.linear_predictor(x, params)?;

        // d loglik / d eta_i
        let mut resid = DVector::zeros(y.len());
        for (i, (&yi, &ei)) in y.iter().zip(eta.iter()).enumerate() {
            resid[i] = match self.family {
                Family::Linear => normal::dlogpdf_dmu(yi, ei, self.noise_scale)?,
                Family::Logistic => bernoulli::dlogpmf_deta(yi, ei),
                Family::Poisson => poisson::dlogpmf_deta(yi, ei),
            };
        }

        let inv_var = 1.0 / (self.shrinkage * self.shrinkage);
        let grad_beta = x.tr_mul(&resid);
        let mut grad = Vec::with_capacity(params.len());
        if self.include_intercept {
            grad.push(resid.sum());
        }
        grad.extend(grad_beta.iter().copied());
        for (g, &p) in grad.iter_mut().zip(params) {
            *g -= p * inv_var;
        }
        Ok(grad)
    }
}

fn validate_features(x: &DMatrix<f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(Error::Validation("X must have at least 1 sample row".to_string()));
    }
    if x.ncols() == 0 {
        return Err(Error::Validation("X must have at least 1 feature column".to_string()));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation("X must contain only finite values".to_string()));
    }
    Ok(())
}

/// A generative model over a fixed feature matrix.
#[derive(Debug, Clone)]
pub struct JointDistribution {
    spec: GlmSpec,
    features: DMatrix<f64>,
}

impl JointDistribution {
    /// Bind `spec` to `features` (`n_samples × n_features`).
    pub fn new(spec: GlmSpec, features: DMatrix<f64>) -> Result<Self> {
        validate_features(&features)?;
        Ok(Self { spec, features })
    }

    /// Underlying spec.
    pub fn spec(&self) -> &GlmSpec {
        &self.spec
    }

    /// Bound feature matrix.
    pub fn features(&self) -> &DMatrix<f64> {
        &self.features
    }

    /// Number of parameters.
    pub fn dim(&self) -> usize {
        self.spec.dim(self.features.ncols())
    }

    /// Parameter names (`alpha`, `beta.1`, ...).
    pub fn parameter_names(&self) -> Vec<String> {
        parameter_names(self.features.ncols(), self.spec.include_intercept)
    }

    /// `log p(params, outcomes)`.
    pub fn log_prob(&self, params: &[f64], outcomes: &[f64]) -> Result<f64> {
        self.spec.log_prob(&self.features, params, outcomes)
    }

    /// Expected outcome per sample under `params`.
    pub fn mean_response(&self, params: &[f64]) -> Result<Vec<f64>> {
        let eta = self.spec.linear_predictor(&self.features, params)?;
        Ok(eta.iter().map(|&e| self.spec.inverse_link(e)).collect())
    }

    /// Draw `(params, outcomes)` from the prior predictive distribution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<(Vec<f64>, Vec<f64>)> {
        let prior = Normal::new(0.0, self.spec.shrinkage)
            .map_err(|e| Error::Computation(format!("prior: {e}")))?;
        let params: Vec<f64> = (0..self.dim()).map(|_| prior.sample(rng)).collect();
        let means = self.mean_response(&params)?;

        let mut outcomes = Vec::with_capacity(means.len());
        for mu in means {
            let y = match self.spec.family {
                Family::Linear => Normal::new(mu, self.spec.noise_scale)
                    .map_err(|e| Error::Computation(format!("likelihood: {e}")))?
                    .sample(rng),
                Family::Logistic => {
                    let b = Bernoulli::new(mu)
                        .map_err(|e| Error::Computation(format!("likelihood: {e}")))?;
                    if b.sample(rng) { 1.0 } else { 0.0 }
                }
                Family::Poisson => Poisson::new(mu.clamp(f64::MIN_POSITIVE, MAX_POISSON_RATE))
                    .map_err(|e| Error::Computation(format!("likelihood: {e}")))?
                    .sample(rng),
            };
            outcomes.push(y);
        }
        Ok((params, outcomes))
    }

    /// Condition on observed outcomes.
    pub fn condition(self, outcomes: &[f64]) -> Result<ConditionedGlm> {
        self.spec.check_outcomes(&self.features, outcomes)?;
        Ok(ConditionedGlm { joint: self, outcomes: outcomes.to_vec() })
    }
}

/// Unnormalised posterior `p(params | y, X)` as a negative log-density.
#[derive(Debug, Clone)]
pub struct ConditionedGlm {
    joint: JointDistribution,
    outcomes: Vec<f64>,
}

impl ConditionedGlm {
    /// The generative model this posterior was conditioned from.
    pub fn joint(&self) -> &JointDistribution {
        &self.joint
    }
}

impl LogDensityModel for ConditionedGlm {
    fn dim(&self) -> usize {
        self.joint.dim()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.joint.parameter_names()
    }

    fn nll(&self, params: &[f64]) -> Result<f64> {
        Ok(-self.joint.log_prob(params, &self.outcomes)?)
    }

    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
        let g = self.joint.spec.grad_log_prob(&self.joint.features, params, &self.outcomes)?;
        Ok(g.into_iter().map(|v| -v).collect())
    }
}

/// Log-joint function of the generative model described by `spec`.
pub fn make_log_joint_fn(spec: GlmSpec) -> LogJointFn {
    LogJointFn::new(spec.describe(), move |features, params, outcomes| {
        validate_features(features)?;
        spec.log_prob(features, params, outcomes)
    })
}
