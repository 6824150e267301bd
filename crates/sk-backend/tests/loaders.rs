//! Persisted-model loading against the shared fixtures.

use std::path::PathBuf;

use nalgebra::DMatrix;
use sk_backend::{StanModelLoader, TfpModelLoader};
use sk_core::{Error, Family, ModelLoader};

fn fixtures(backend: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures/models").join(backend)
}

#[test]
fn stan_loader_loads_fixture_program() {
    let loader = StanModelLoader::new(fixtures("stan"));
    let model = loader.load_model("linear_regression").unwrap();
    assert_eq!(model.name, "linear_regression");
    assert!(model.code.contains("y ~ normal(alpha + x * beta, sigma);"));
    assert!(model.executable.is_none());
    assert_eq!(loader.available_models().unwrap(), vec!["linear_regression"]);
}

#[test]
fn tfp_loader_loads_fixture_artifact() {
    let loader = TfpModelLoader::new(fixtures("tfp"));
    let model = loader.load_model("linear_regression").unwrap();
    assert_eq!(model.family(), Family::Linear);
    assert_eq!(model.parameter_names, vec!["alpha", "beta.1", "beta.2"]);

    let x = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
    let pred = model.predict(&x).unwrap();
    assert!((pred[0] - 1.5).abs() < 1e-12);
    assert!((pred[1] + 1.5).abs() < 1e-12);
}

#[test]
fn nonexistent_model_is_model_not_found_only() {
    let stan = StanModelLoader::new(fixtures("stan")).load_model("nonexistent_model");
    assert!(matches!(stan, Err(Error::ModelNotFound { .. })));
    let tfp = TfpModelLoader::new(fixtures("tfp")).load_model("nonexistent_model");
    assert!(matches!(tfp, Err(Error::ModelNotFound { .. })));
}

#[test]
fn injected_base_dir_changes_resolution() {
    let here = StanModelLoader::new(fixtures("stan"));
    let elsewhere = StanModelLoader::new(fixtures("tfp"));
    assert!(here.load_model("linear_regression").is_ok());
    // Same name, different directory: only a .json lives there.
    assert!(matches!(
        elsewhere.load_model("linear_regression"),
        Err(Error::ModelNotFound { .. })
    ));
    assert_eq!(
        elsewhere.model_path("linear_regression").unwrap(),
        fixtures("tfp").join("linear_regression.stan")
    );
}
