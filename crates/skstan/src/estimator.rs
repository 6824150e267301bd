//! Backend-agnostic estimator shared by the family-specific types.

use std::path::PathBuf;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use sk_backend::BackendRegistry;
use sk_core::context;
use sk_core::{
    Backend, BackendName, Context, Error, Family, FitResult, Hyperparameters, LogJointFn,
    Regressor, Result,
};
use sk_inference::{FitSummary, GlmSpec, summarize};

/// Regression estimator: configure, `fit`, then query.
///
/// The backend is the explicit [`Estimator::backend`] override if set, else the
/// context's (`skstan.json`, default `stan`).
#[derive(Debug, Clone)]
pub struct Estimator {
    family: Family,
    hyper: Hyperparameters,
    backend: Option<BackendName>,
    context: Option<Arc<Context>>,
    registry: Option<BackendRegistry>,
    fitted: Option<FitResult>,
}

impl Estimator {
    /// Unfitted estimator for `family` with default hyperparameters.
    pub fn new(family: Family) -> Self {
        Self {
            family,
            hyper: Hyperparameters::default(),
            backend: None,
            context: None,
            registry: None,
            fitted: None,
        }
    }

    /// Regression family.
    pub fn family(&self) -> Family {
        self.family
    }

    /// Current hyperparameters.
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyper
    }

    /// Replace all hyperparameters.
    pub fn with_hyperparameters(mut self, hyper: Hyperparameters) -> Self {
        self.hyper = hyper;
        self
    }

    /// Prior scale of the coefficients.
    pub fn shrinkage(mut self, shrinkage: f64) -> Self {
        self.hyper.shrinkage = shrinkage;
        self
    }

    /// Number of chains.
    pub fn chains(mut self, chains: usize) -> Self {
        self.hyper.chains = chains;
        self
    }

    /// Warmup iterations per chain.
    pub fn warmup(mut self, warmup: usize) -> Self {
        self.hyper.warmup = warmup;
        self
    }

    /// Draws per chain.
    pub fn samples(mut self, samples: usize) -> Self {
        self.hyper.samples = samples;
        self
    }

    /// Base RNG seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.hyper.seed = seed;
        self
    }

    /// Fit an intercept.
    pub fn include_intercept(mut self, include: bool) -> Self {
        self.hyper.include_intercept = include;
        self
    }

    /// Observation noise sigma (linear family).
    pub fn noise_scale(mut self, sigma: f64) -> Self {
        self.hyper.noise_scale = sigma;
        self
    }

    /// Use `backend` regardless of the context's selection.
    pub fn backend(mut self, backend: BackendName) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use `ctx` instead of the process-wide context.
    pub fn context(mut self, ctx: Context) -> Self {
        self.context = Some(Arc::new(ctx));
        self
    }

    /// Dispatch through `registry` instead of the default backends.
    pub fn registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    fn resolve(&self, name: Option<&BackendName>) -> Result<Arc<dyn Backend>> {
        let ctx = self.context.clone().unwrap_or_else(context::global);
        let registry = match &self.registry {
            Some(r) => r.clone(),
            None => BackendRegistry::with_defaults(&ctx),
        };
        let name = name.or(self.backend.as_ref()).unwrap_or(ctx.backend());
        log::debug!("{} regression using backend '{name}'", self.family);
        registry.get(name)
    }

    /// The backend this estimator dispatches to.
    pub fn selected_backend(&self) -> Result<Arc<dyn Backend>> {
        self.resolve(None)
    }

    /// Backend model for this family and hyperparameters.
    pub fn regressor(&self) -> Result<Box<dyn Regressor>> {
        self.selected_backend()?.regressor(self.family, &self.hyper)
    }

    /// Log-joint function of the backend's generative model.
    pub fn log_joint_fn(&self) -> Result<LogJointFn> {
        self.regressor()?.log_joint_fn()
    }

    /// Fit on `x` (`n_samples × n_features`) and `y` (`n_samples`).
    ///
    /// On error the estimator keeps its previous state.
    pub fn fit(&mut self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<&FitResult> {
        if x.nrows() != y.len() {
            return Err(Error::Validation(format!(
                "X has {} sample rows but y has {} labels; samples must be rows \
                 (see transpose_features)",
                x.nrows(),
                y.len()
            )));
        }
        let fit = self.regressor()?.fit(x, y)?;
        if !fit.converged {
            log::warn!("{} backend did not report convergence: {}", fit.backend, fit.message);
        }
        Ok(self.fitted.insert(fit))
    }

    /// Whether [`Estimator::fit`] has succeeded.
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Full fit result.
    pub fn fit_result(&self) -> Result<&FitResult> {
        self.fitted.as_ref().ok_or_else(|| {
            Error::NotFitted(format!("call fit before using this {} regression", self.family))
        })
    }

    /// Point estimate of the intercept (`0.0` without one).
    pub fn intercept(&self) -> Result<f64> {
        let fit = self.fit_result()?;
        Ok(fit.split_intercept(&fit.point_estimate()).0)
    }

    /// Point estimates of the coefficients, one per feature.
    pub fn coefficients(&self) -> Result<Vec<f64>> {
        let fit = self.fit_result()?;
        Ok(fit.split_intercept(&fit.point_estimate()).1)
    }

    /// Expected outcome for each row of `x` at the point estimate.
    pub fn predict(&self, x: &DMatrix<f64>) -> Result<DVector<f64>> {
        let fit = self.fit_result()?;
        let (alpha, beta) = fit.split_intercept(&fit.point_estimate());
        if x.ncols() != beta.len() {
            return Err(Error::Validation(format!(
                "model was fitted on {} features, X has {}",
                beta.len(),
                x.ncols()
            )));
        }
        let spec = GlmSpec::new(self.family, &fit.hyperparameters)?;
        let mut eta = x * DVector::from_vec(beta);
        eta.add_scalar_mut(alpha);
        Ok(eta.map(|e| spec.inverse_link(e)))
    }

    /// Posterior summary (mean, sd, quantiles, R-hat, ESS per parameter).
    pub fn summary(&self) -> Result<FitSummary> {
        Ok(summarize(&self.fit_result()?.trace))
    }

    /// Persist the fit with the backend that produced it.
    pub fn save(&self, name: &str) -> Result<PathBuf> {
        let fit = self.fit_result()?;
        let path = self.resolve(Some(&fit.backend))?.save_fit(name, fit)?;
        log::info!("saved {} model '{name}' to {}", fit.backend, path.display());
        Ok(path)
    }
}

/// Transpose a feature-major matrix (`n_features × n_samples`) into the
/// samples-as-rows layout every estimator expects.
pub fn transpose_features(x: &DMatrix<f64>) -> DMatrix<f64> {
    x.transpose()
}
