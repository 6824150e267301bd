//! Core traits for skstan
//!
//! This module defines the trait-based architecture that enables
//! dependency inversion: the estimators in `skstan` do not depend on
//! concrete statistical backends (CmdStan, Laplace), only on these seams.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::{DMatrix, DVector};

use crate::backend::BackendName;
use crate::types::{Family, FitResult, Hyperparameters};
use crate::{Error, Result};

/// Differentiable negative log-density over an unconstrained parameter vector.
pub trait LogDensityModel: Send + Sync {
    /// Number of parameters
    fn dim(&self) -> usize;

    /// Parameter names
    fn parameter_names(&self) -> Vec<String>;

    /// Starting point for optimizers.
    fn parameter_init(&self) -> Vec<f64> {
        vec![0.0; self.dim()]
    }

    /// Negative log-density at `params`.
    fn nll(&self, params: &[f64]) -> Result<f64>;

    /// Gradient of [`LogDensityModel::nll`].
    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>>;
}

type LogJointInner = dyn Fn(&DMatrix<f64>, &[f64], &[f64]) -> Result<f64> + Send + Sync;

/// Log-joint density `log p(params, outcomes | features)` of a generative model.
pub struct LogJointFn {
    label: String,
    inner: Box<LogJointInner>,
}

impl LogJointFn {
    /// Wrap a closure `(features, params, outcomes) -> log p`.
    pub fn new<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&DMatrix<f64>, &[f64], &[f64]) -> Result<f64> + Send + Sync + 'static,
    {
        Self { label: label.into(), inner: Box::new(f) }
    }

    /// Evaluate the log-joint.
    pub fn call(&self, features: &DMatrix<f64>, params: &[f64], outcomes: &[f64]) -> Result<f64> {
        (self.inner)(features, params, outcomes)
    }

    /// Human-readable description of the generative model.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for LogJointFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogJointFn").field("label", &self.label).finish_non_exhaustive()
    }
}

/// Object-safe face of a regression model: what a backend hands out.
///
/// `x` is `n_samples × n_features` (samples are rows) and `y` holds one label per
/// sample, for every backend.
pub trait Regressor: Send + Sync {
    /// Regression family.
    fn family(&self) -> Family;

    /// Backend implementing this model.
    fn backend(&self) -> BackendName;

    /// Log-joint function derived from the model's posterior distribution.
    ///
    /// Fails with [`Error::UnsupportedModel`] when the backend cannot build it.
    fn log_joint_fn(&self) -> Result<LogJointFn>;

    /// Fit by delegating to the backend's statistical library.
    fn fit(&self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<FitResult>;
}

/// A regression variant of one backend.
///
/// `posterior_distribution` has no default body, so a variant that forgets it is
/// rejected by the compiler:
///
/// ```compile_fail
/// use nalgebra::{DMatrix, DVector};
/// use sk_core::{BackendName, Family, FitResult, LogJointFn, RegressionModel, Regressor, Result};
///
/// struct Incomplete;
///
/// impl Regressor for Incomplete {
///     fn family(&self) -> Family { Family::Linear }
///     fn backend(&self) -> BackendName { BackendName::STAN }
///     fn log_joint_fn(&self) -> Result<LogJointFn> { unimplemented!() }
///     fn fit(&self, _: &DMatrix<f64>, _: &DVector<f64>) -> Result<FitResult> { unimplemented!() }
/// }
///
/// impl RegressionModel for Incomplete {
///     type Posterior = ();
/// }
/// ```
///
/// Adding the method is all it takes:
///
/// ```
/// use nalgebra::{DMatrix, DVector};
/// use sk_core::{BackendName, Family, FitResult, LogJointFn, RegressionModel, Regressor, Result};
///
/// struct Complete;
///
/// impl Regressor for Complete {
///     fn family(&self) -> Family { Family::Linear }
///     fn backend(&self) -> BackendName { BackendName::STAN }
///     fn log_joint_fn(&self) -> Result<LogJointFn> { unimplemented!() }
///     fn fit(&self, _: &DMatrix<f64>, _: &DVector<f64>) -> Result<FitResult> { unimplemented!() }
/// }
///
/// impl RegressionModel for Complete {
///     type Posterior = ();
///
///     fn posterior_distribution(&self, _: &DMatrix<f64>) -> Result<()> { Ok(()) }
/// }
///
/// assert!(Complete.posterior_distribution(&DMatrix::zeros(1, 1)).is_ok());
/// ```
pub trait RegressionModel: Regressor {
    /// Backend-specific description of the generative model over given features.
    type Posterior;

    /// Build the posterior distribution (generative model) for `features`.
    fn posterior_distribution(&self, features: &DMatrix<f64>) -> Result<Self::Posterior>;
}

/// A named, swappable set of regression implementations.
pub trait Backend: Send + Sync {
    /// Registry key.
    fn name(&self) -> BackendName;

    /// Build the model for `family` with the given hyperparameters.
    fn regressor(&self, family: Family, hyper: &Hyperparameters) -> Result<Box<dyn Regressor>>;

    /// Base directory of this backend's persisted models.
    fn model_dir(&self) -> &Path;

    /// Names of persisted models found under [`Backend::model_dir`].
    fn available_models(&self) -> Result<Vec<String>>;

    /// Persist a fit under [`Backend::model_dir`] as `name`, returning the artifact path.
    fn save_fit(&self, name: &str, fit: &FitResult) -> Result<PathBuf>;
}

/// Loads persisted model artifacts stored as `<base_dir>/<name>.<extension>`.
pub trait ModelLoader: Send + Sync {
    /// Deserialized handle.
    type Model;

    /// Directory searched for artifacts.
    fn base_dir(&self) -> &Path;

    /// Artifact file extension, without the dot.
    fn extension(&self) -> &str;

    /// Deserialize the artifact for `name`.
    ///
    /// Missing artifact: [`Error::ModelNotFound`]. Corrupt or incompatible
    /// artifact: [`Error::Deserialization`].
    fn load_model(&self, name: &str) -> Result<Self::Model>;

    /// Path an artifact for `name` would have. Names that would leave
    /// `base_dir` are reported as not found.
    fn model_path(&self, name: &str) -> Result<PathBuf> {
        let path = self.base_dir().join(format!("{}.{}", name, self.extension()));
        let escapes = name.is_empty() || name.contains(['/', '\\']) || name.contains("..");
        if escapes {
            return Err(Error::ModelNotFound { name: name.to_string(), path });
        }
        Ok(path)
    }

    /// Path of an existing artifact for `name`.
    fn locate(&self, name: &str) -> Result<PathBuf> {
        let path = self.model_path(name)?;
        if !path.is_file() {
            return Err(Error::ModelNotFound { name: name.to_string(), path });
        }
        Ok(path)
    }

    /// Model names with an artifact in `base_dir`, sorted. A missing directory is empty.
    fn available_models(&self) -> Result<Vec<String>> {
        let dir = self.base_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension()) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
