//! Joint-distribution backend.
//!
//! Each family is a generative model (`coefficients ~ Normal(0, shrinkage)`,
//! outcomes from the family likelihood). `fit` hands the conditioned log-joint to
//! argmin L-BFGS and summarises the posterior with a Laplace approximation; the
//! reported draws come from that Gaussian.

mod artifact;
mod model;

use std::path::{Path, PathBuf};

use sk_core::{
    Backend, BackendName, Context, Family, FitResult, Hyperparameters, ModelLoader, Regressor,
    Result,
};
use sk_inference::OptimizerConfig;

pub use artifact::{SCHEMA_VERSION, TfpModel, TfpModelArtifact, TfpModelLoader};
pub use model::TfpRegression;

/// The `tfp` backend.
#[derive(Debug, Clone)]
pub struct TfpBackend {
    loader: TfpModelLoader,
    optimizer: OptimizerConfig,
}

impl TfpBackend {
    /// Backend persisting models under `model_dir`.
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self { loader: TfpModelLoader::new(model_dir), optimizer: OptimizerConfig::default() }
    }

    /// Backend configured from a resolved context: models under `<model_dir>/tfp`.
    pub fn from_context(ctx: &Context) -> Self {
        Self::new(ctx.backend_model_dir(&BackendName::TFP))
    }

    /// Override optimizer settings.
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Artifact loader.
    pub fn loader(&self) -> &TfpModelLoader {
        &self.loader
    }
}

impl Backend for TfpBackend {
    fn name(&self) -> BackendName {
        BackendName::TFP
    }

    fn regressor(&self, family: Family, hyper: &Hyperparameters) -> Result<Box<dyn Regressor>> {
        let model = TfpRegression::with_optimizer(family, hyper.clone(), self.optimizer.clone())?;
        Ok(Box::new(model))
    }

    fn model_dir(&self) -> &Path {
        self.loader.base_dir()
    }

    fn available_models(&self) -> Result<Vec<String>> {
        self.loader.available_models()
    }

    fn save_fit(&self, name: &str, fit: &FitResult) -> Result<PathBuf> {
        self.loader.save_model(name, &TfpModel::from_fit(name, fit)?)
    }
}
