//! Estimator round trips through the tfp backend.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal as RandNormal, Poisson};
use sk_backend::TfpModelLoader;
use sk_core::ModelLoader;
use skstan::{
    BackendName, Context, Error, LinearRegression, LogisticRegression, PoissonRegression,
    transpose_features,
};

fn tmp_home(tag: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("skstan_estimators_{}_{}_{}", std::process::id(), nanos, tag));
    fs::create_dir_all(&p).unwrap();
    p
}

fn tfp_context(home: &PathBuf) -> Context {
    fs::write(home.join("skstan.json"), r#"{"backend": "tfp"}"#).unwrap();
    Context::from_home(home)
}

fn design(n: usize, seed: u64) -> DMatrix<f64> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let eps = RandNormal::new(0.0, 1.0).unwrap();
    DMatrix::from_fn(n, 2, |_, _| eps.sample(&mut rng))
}

#[test]
fn linear_fit_predict_save() {
    let home = tmp_home("linear");
    let x = design(200, 1);
    let mut rng = rand::rngs::StdRng::seed_from_u64(2);
    let noise = RandNormal::new(0.0, 1.0).unwrap();
    let y = DVector::from_fn(200, |i, _| 0.5 + x[(i, 0)] - 2.0 * x[(i, 1)] + noise.sample(&mut rng));

    let mut glm = LinearRegression::new().context(tfp_context(&home)).chains(2).samples(300);
    let fit = glm.fit(&x, &y).unwrap();
    assert_eq!(fit.backend, BackendName::TFP);

    let beta = glm.coefficients().unwrap();
    assert!((glm.intercept().unwrap() - 0.5).abs() < 0.3);
    assert!((beta[0] - 1.0).abs() < 0.3);
    assert!((beta[1] + 2.0).abs() < 0.3);

    let pred = glm.predict(&DMatrix::from_row_slice(1, 2, &[1.0, 1.0])).unwrap();
    assert!((pred[0] + 0.5).abs() < 0.5);
    assert!(matches!(glm.predict(&DMatrix::zeros(1, 3)), Err(Error::Validation(_))));

    let summary = glm.summary().unwrap();
    assert_eq!(summary.params.len(), 3);
    assert_eq!(summary.total_draws, 600);

    let path = glm.save("my_linear").unwrap();
    assert_eq!(path, home.join("models/tfp/my_linear.json"));
    let loaded = TfpModelLoader::new(home.join("models/tfp")).load_model("my_linear").unwrap();
    assert_eq!(loaded.parameter_names, vec!["alpha", "beta.1", "beta.2"]);

    fs::remove_dir_all(&home).ok();
}

#[test]
fn poisson_predictions_are_rates() {
    let home = tmp_home("poisson");
    let x = design(300, 3);
    let mut rng = rand::rngs::StdRng::seed_from_u64(4);
    let y = DVector::from_fn(300, |i, _| {
        let rate = (0.2 + 0.3 * x[(i, 0)] - 0.2 * x[(i, 1)]).exp();
        Poisson::new(rate).unwrap().sample(&mut rng)
    });

    let mut glm = PoissonRegression::new().context(tfp_context(&home)).samples(100);
    glm.fit(&x, &y).unwrap();
    let pred = glm.predict(&x).unwrap();
    assert!(pred.iter().all(|&r| r > 0.0));
    fs::remove_dir_all(&home).ok();
}

#[test]
fn logistic_feature_major_input_via_transpose() {
    let home = tmp_home("logistic");
    // Two samples with five features each, supplied feature-major.
    let feature_major =
        DMatrix::from_row_slice(5, 2, &[1.0, 6.0, 2.0, 5.0, 5.0, 1.0, 3.0, 1.0, 2.0, 1.0]);
    let y = DVector::from_vec(vec![1.0, 0.0]);

    let mut glm = LogisticRegression::new().context(tfp_context(&home)).samples(50);
    assert!(matches!(glm.fit(&feature_major, &y), Err(Error::Validation(_))));

    let x = transpose_features(&feature_major);
    glm.fit(&x, &y).unwrap();
    let p = glm.predict(&x).unwrap();
    assert!(p[0] > 0.5 && p[1] < 0.5, "{p}");
    fs::remove_dir_all(&home).ok();
}

#[test]
fn invalid_labels_rejected_before_fitting() {
    let home = tmp_home("labels");
    let mut glm = LogisticRegression::new().context(tfp_context(&home));
    let x = DMatrix::from_row_slice(2, 1, &[1.0, 2.0]);
    let y = DVector::from_vec(vec![0.0, 2.0]);
    assert!(glm.fit(&x, &y).is_err());
    assert!(!glm.is_fitted());
    fs::remove_dir_all(&home).ok();
}
