//! Persisted Laplace-approximation models: `<base_dir>/<name>.json`.

use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use sk_core::{Error, Family, FitResult, Hyperparameters, ModelLoader, Result, Trace};
use sk_inference::{GlmSpec, JointDistribution, LaplaceApproximation};

/// Artifact schema written by this version.
pub const SCHEMA_VERSION: &str = "1.0";

fn default_noise_scale() -> f64 {
    Hyperparameters::default().noise_scale
}

/// On-disk form of a [`TfpModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfpModelArtifact {
    /// `"<major>.<minor>"`; only the major version must match.
    pub schema_version: String,
    /// Model name.
    pub name: String,
    /// Regression family.
    pub family: Family,
    /// Prior scale used for the fit.
    pub shrinkage: f64,
    /// Observation noise of the linear family.
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f64,
    /// Parameter names; an intercept is present iff the first is `alpha`.
    pub parameter_names: Vec<String>,
    /// Posterior mode.
    pub mode: Vec<f64>,
    /// Posterior covariance, row-major.
    pub covariance: Vec<Vec<f64>>,
}

/// A fitted model summarised by a Gaussian posterior.
#[derive(Debug, Clone)]
pub struct TfpModel {
    /// Model name.
    pub name: String,
    /// Generative model the posterior belongs to.
    pub spec: GlmSpec,
    /// Parameter names.
    pub parameter_names: Vec<String>,
    /// Posterior approximation.
    pub posterior: LaplaceApproximation,
}

fn schema_major(version: &str) -> Option<&str> {
    version.split('.').next().filter(|m| !m.is_empty())
}

fn empirical_covariance(trace: &Trace) -> Result<DMatrix<f64>> {
    let d = trace.param_names.len();
    let n = trace.total_draws();
    if n < 2 {
        return Err(Error::Validation(format!(
            "need at least 2 draws to estimate a covariance, got {n}"
        )));
    }
    let mean = DVector::from_vec(trace.mean_vector());
    let mut cov = DMatrix::zeros(d, d);
    for draw in trace.chains.iter().flat_map(|c| c.draws.iter()) {
        let dx = DVector::from_column_slice(draw) - &mean;
        cov += &dx * dx.transpose();
    }
    Ok(cov / (n as f64 - 1.0))
}

impl TfpModel {
    /// Summarise any fit as a Gaussian: its point estimate plus its covariance
    /// (reported by the backend, else estimated from the draws).
    pub fn from_fit(name: &str, fit: &FitResult) -> Result<Self> {
        let include_intercept = fit.parameter_names.first().is_some_and(|n| n == "alpha");
        let hyper = Hyperparameters { include_intercept, ..fit.hyperparameters.clone() };
        let spec = GlmSpec::new(fit.family, &hyper)?;
        let covariance = match &fit.covariance {
            Some(rows) => matrix_from_rows(rows, fit.parameter_names.len())?,
            None => empirical_covariance(&fit.trace)?,
        };
        let posterior = LaplaceApproximation::from_moments(fit.point_estimate(), covariance)?;
        Ok(Self {
            name: name.to_string(),
            spec,
            parameter_names: fit.parameter_names.clone(),
            posterior,
        })
    }

    /// Regression family.
    pub fn family(&self) -> Family {
        self.spec.family
    }

    /// Expected outcome per row of `x` at the posterior mode.
    pub fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        JointDistribution::new(self.spec, x.clone())?.mean_response(&self.posterior.mode)
    }

    /// Serializable form.
    pub fn to_artifact(&self) -> TfpModelArtifact {
        let cov = &self.posterior.covariance;
        TfpModelArtifact {
            schema_version: SCHEMA_VERSION.to_string(),
            name: self.name.clone(),
            family: self.spec.family,
            shrinkage: self.spec.shrinkage,
            noise_scale: self.spec.noise_scale,
            parameter_names: self.parameter_names.clone(),
            mode: self.posterior.mode.clone(),
            covariance: cov.row_iter().map(|r| r.iter().copied().collect()).collect(),
        }
    }

    /// Rebuild from an artifact, checking schema and shapes.
    pub fn from_artifact(artifact: TfpModelArtifact) -> Result<Self> {
        let expected = schema_major(SCHEMA_VERSION);
        if schema_major(&artifact.schema_version) != expected {
            return Err(Error::Validation(format!(
                "incompatible schema_version '{}' (supported: {SCHEMA_VERSION})",
                artifact.schema_version
            )));
        }
        let d = artifact.parameter_names.len();
        if artifact.mode.len() != d {
            return Err(Error::Validation(format!(
                "mode has {} entries for {d} parameters",
                artifact.mode.len()
            )));
        }
        let include_intercept = artifact.parameter_names.first().is_some_and(|n| n == "alpha");
        let hyper = Hyperparameters {
            shrinkage: artifact.shrinkage,
            noise_scale: artifact.noise_scale,
            include_intercept,
            ..Default::default()
        };
        let spec = GlmSpec::new(artifact.family, &hyper)?;
        let covariance = matrix_from_rows(&artifact.covariance, d)?;
        let posterior = LaplaceApproximation::from_moments(artifact.mode, covariance)?;
        Ok(Self {
            name: artifact.name,
            spec,
            parameter_names: artifact.parameter_names,
            posterior,
        })
    }
}

fn matrix_from_rows(rows: &[Vec<f64>], d: usize) -> Result<DMatrix<f64>> {
    if rows.len() != d || rows.iter().any(|r| r.len() != d) {
        return Err(Error::Validation(format!("covariance must be {d}x{d}")));
    }
    Ok(DMatrix::from_fn(d, d, |i, j| rows[i][j]))
}

/// Loads and saves [`TfpModel`] artifacts under an injected base directory.
#[derive(Debug, Clone)]
pub struct TfpModelLoader {
    base_dir: PathBuf,
}

impl TfpModelLoader {
    /// Artifact extension.
    pub const EXTENSION: &'static str = "json";

    /// Loader rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    /// Write `model` as `<base_dir>/<name>.json` (pretty JSON), creating the directory.
    pub fn save_model(&self, name: &str, model: &TfpModel) -> Result<PathBuf> {
        let path = self.model_path(name)?;
        let mut artifact = model.to_artifact();
        artifact.name = name.to_string();
        fs::create_dir_all(&self.base_dir)?;
        fs::write(&path, serde_json::to_string_pretty(&artifact)?)?;
        log::debug!("wrote tfp model {}", path.display());
        Ok(path)
    }
}

impl ModelLoader for TfpModelLoader {
    type Model = TfpModel;

    fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn extension(&self) -> &str {
        Self::EXTENSION
    }

    fn load_model(&self, name: &str) -> Result<TfpModel> {
        let path = self.locate(name)?;
        let corrupt = |reason: String| Error::Deserialization { path: path.clone(), reason };
        let bytes = fs::read(&path).map_err(|e| corrupt(e.to_string()))?;
        let artifact: TfpModelArtifact =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        let model = TfpModel::from_artifact(artifact).map_err(|e| corrupt(e.to_string()))?;
        log::debug!("loaded tfp model '{name}' from {}", path.display());
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sk_core::{BackendName, Chain};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn tmp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let mut p = std::env::temp_dir();
        p.push(format!("skstan_tfp_artifact_{}_{}_{}", std::process::id(), nanos, tag));
        fs::create_dir_all(&p).unwrap();
        p
    }

    fn artifact() -> TfpModelArtifact {
        TfpModelArtifact {
            schema_version: SCHEMA_VERSION.to_string(),
            name: "m".into(),
            family: Family::Linear,
            shrinkage: 10.0,
            noise_scale: 1.0,
            parameter_names: vec!["alpha".into(), "beta.1".into()],
            mode: vec![1.0, 2.0],
            covariance: vec![vec![0.1, 0.0], vec![0.0, 0.2]],
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tmp_dir("save");
        let loader = TfpModelLoader::new(&dir);
        let model = TfpModel::from_artifact(artifact()).unwrap();
        let path = loader.save_model("saved", &model).unwrap();
        assert_eq!(path, dir.join("saved.json"));

        let loaded = loader.load_model("saved").unwrap();
        assert_eq!(loaded.name, "saved");
        assert_eq!(loaded.posterior.mode, vec![1.0, 2.0]);
        assert_eq!(loaded.family(), Family::Linear);
        assert!(loaded.spec.include_intercept);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_major_version_mismatch() {
        let dir = tmp_dir("version");
        let mut a = artifact();
        a.schema_version = "2.0".into();
        fs::write(dir.join("future.json"), serde_json::to_string(&a).unwrap()).unwrap();
        let err = TfpModelLoader::new(&dir).load_model("future").unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }), "got {err:?}");

        a.schema_version = "1.7".into();
        fs::write(dir.join("minor.json"), serde_json::to_string(&a).unwrap()).unwrap();
        assert!(TfpModelLoader::new(&dir).load_model("minor").is_ok());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_and_missing() {
        let dir = tmp_dir("corrupt");
        fs::write(dir.join("bad.json"), "{ not json").unwrap();
        let loader = TfpModelLoader::new(&dir);
        assert!(matches!(loader.load_model("bad"), Err(Error::Deserialization { .. })));
        assert!(matches!(loader.load_model("nonexistent_model"), Err(Error::ModelNotFound { .. })));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut a = artifact();
        a.covariance = vec![vec![1.0]];
        assert!(TfpModel::from_artifact(a).is_err());
        let mut a = artifact();
        a.mode = vec![1.0];
        assert!(TfpModel::from_artifact(a).is_err());
    }

    #[test]
    fn test_from_fit_estimates_covariance_from_draws() {
        let fit = FitResult {
            backend: BackendName::STAN,
            family: Family::Poisson,
            parameter_names: vec!["beta.1".into()],
            hyperparameters: Hyperparameters::default(),
            mode: None,
            covariance: None,
            trace: Trace {
                param_names: vec!["beta.1".into()],
                chains: vec![Chain {
                    draws: vec![vec![1.0], vec![2.0], vec![3.0]],
                    ..Default::default()
                }],
            },
            converged: true,
            message: String::new(),
        };
        let model = TfpModel::from_fit("from_stan", &fit).unwrap();
        assert!(!model.spec.include_intercept);
        assert_relative_eq!(model.posterior.mode[0], 2.0);
        assert_relative_eq!(model.posterior.covariance[(0, 0)], 1.0);

        let x = DMatrix::from_row_slice(2, 1, &[0.0, 1.0]);
        let pred = model.predict(&x).unwrap();
        assert_relative_eq!(pred[0], 1.0);
        assert_relative_eq!(pred[1], 2.0_f64.exp(), max_relative = 1e-12);
    }
}
