use nalgebra::{DMatrix, DVector};
use sk_core::{
    BackendName, Family, FitResult, Hyperparameters, LogJointFn, RegressionModel, Regressor,
    Result,
};
use sk_inference::{
    GlmSpec, JointDistribution, LbfgsOptimizer, OptimizerConfig, laplace_at_mode,
    make_log_joint_fn,
};

/// One regression family as a joint distribution, fitted by MAP + Laplace.
#[derive(Debug, Clone)]
pub struct TfpRegression {
    spec: GlmSpec,
    hyper: Hyperparameters,
    optimizer: OptimizerConfig,
}

impl TfpRegression {
    /// Model for `family` with default optimizer settings.
    pub fn new(family: Family, hyper: Hyperparameters) -> Result<Self> {
        Self::with_optimizer(family, hyper, OptimizerConfig::default())
    }

    /// Model for `family` with explicit optimizer settings.
    pub fn with_optimizer(
        family: Family,
        hyper: Hyperparameters,
        optimizer: OptimizerConfig,
    ) -> Result<Self> {
        let spec = GlmSpec::new(family, &hyper)?;
        Ok(Self { spec, hyper, optimizer })
    }

    /// Generative model parameters.
    pub fn spec(&self) -> &GlmSpec {
        &self.spec
    }
}

impl Regressor for TfpRegression {
    fn family(&self) -> Family {
        self.spec.family
    }

    fn backend(&self) -> BackendName {
        BackendName::TFP
    }

    fn log_joint_fn(&self) -> Result<LogJointFn> {
        Ok(make_log_joint_fn(self.spec))
    }

    fn fit(&self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<FitResult> {
        let joint = self.posterior_distribution(x)?;
        let names = joint.parameter_names();
        let posterior = joint.condition(y.as_slice())?;

        let opt = LbfgsOptimizer::new(self.optimizer.clone()).find_mode(&posterior)?;
        log::info!("{} regression MAP: {opt}", self.spec.family);
        let laplace = laplace_at_mode(&posterior, &opt.parameters)?;
        let trace = laplace.draw_chains(
            names.clone(),
            self.hyper.chains,
            self.hyper.samples,
            self.hyper.seed,
        )?;

        let covariance =
            laplace.covariance.row_iter().map(|r| r.iter().copied().collect()).collect();
        Ok(FitResult {
            backend: BackendName::TFP,
            family: self.spec.family,
            parameter_names: names,
            hyperparameters: self.hyper.clone(),
            mode: Some(opt.parameters),
            covariance: Some(covariance),
            trace,
            converged: opt.converged,
            message: opt.message,
        })
    }
}

impl RegressionModel for TfpRegression {
    type Posterior = JointDistribution;

    fn posterior_distribution(&self, features: &DMatrix<f64>) -> Result<JointDistribution> {
        JointDistribution::new(self.spec, features.clone())
    }
}
