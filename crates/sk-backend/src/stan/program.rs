//! Stan programs for the regression families and their CmdStan data files.

use nalgebra::DMatrix;
use serde_json::{Value, json};
use sk_core::types::parameter_names;
use sk_core::{Error, Family, Hyperparameters, Result};

/// Stan source of the model for `family`.
///
/// Prior scale and observation noise are data, so one compiled executable serves
/// every hyperparameter setting.
pub fn render_program(family: Family, include_intercept: bool) -> String {
    let y_decl = match family {
        Family::Linear => "vector[N] y;",
        Family::Logistic => "array[N] int<lower=0, upper=1> y;",
        Family::Poisson => "array[N] int<lower=0> y;",
    };
    let eta = if include_intercept { "alpha + x * beta" } else { "x * beta" };
    let likelihood = match family {
        Family::Linear => format!("y ~ normal({eta}, sigma);"),
        Family::Logistic => format!("y ~ bernoulli_logit({eta});"),
        Family::Poisson => format!("y ~ poisson_log({eta});"),
    };

    let mut out = String::new();
    out.push_str("data {\n");
    out.push_str("  int<lower=0> N;\n");
    out.push_str("  int<lower=0> K;\n");
    out.push_str("  matrix[N, K] x;\n");
    out.push_str(&format!("  {y_decl}\n"));
    out.push_str("  real<lower=0> shrinkage;\n");
    if family == Family::Linear {
        out.push_str("  real<lower=0> sigma;\n");
    }
    out.push_str("}\n");
    out.push_str("parameters {\n");
    if include_intercept {
        out.push_str("  real alpha;\n");
    }
    out.push_str("  vector[K] beta;\n");
    out.push_str("}\n");
    out.push_str("model {\n");
    if include_intercept {
        out.push_str("  alpha ~ normal(0, shrinkage);\n");
    }
    out.push_str("  beta ~ normal(0, shrinkage);\n");
    out.push_str(&format!("  {likelihood}\n"));
    out.push_str("}\n");
    out
}

/// Canonical persisted name of the program for `family`.
pub fn program_name(family: Family, include_intercept: bool) -> String {
    if include_intercept {
        family.model_name().to_string()
    } else {
        format!("{}_no_intercept", family.model_name())
    }
}

/// The Stan view of a regression model bound to a feature matrix.
#[derive(Debug, Clone)]
pub struct StanProgram {
    family: Family,
    hyper: Hyperparameters,
    features: DMatrix<f64>,
}

impl StanProgram {
    /// Bind `features` (`n_samples × n_features`).
    pub fn new(family: Family, hyper: Hyperparameters, features: DMatrix<f64>) -> Result<Self> {
        hyper.validate()?;
        if features.nrows() == 0 || features.ncols() == 0 {
            return Err(Error::Validation(format!(
                "X must be non-empty, got {}x{}",
                features.nrows(),
                features.ncols()
            )));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation("X must contain only finite values".to_string()));
        }
        Ok(Self { family, hyper, features })
    }

    /// Regression family.
    pub fn family(&self) -> Family {
        self.family
    }

    /// Persisted name (`linear_regression`, ...).
    pub fn name(&self) -> String {
        program_name(self.family, self.hyper.include_intercept)
    }

    /// Stan source.
    pub fn code(&self) -> String {
        render_program(self.family, self.hyper.include_intercept)
    }

    /// Parameter names as they appear in CmdStan CSV output.
    pub fn parameter_names(&self) -> Vec<String> {
        parameter_names(self.features.ncols(), self.hyper.include_intercept)
    }

    /// Bound feature matrix.
    pub fn features(&self) -> &DMatrix<f64> {
        &self.features
    }

    /// CmdStan JSON data for outcomes `y`.
    pub fn data_json(&self, y: &[f64]) -> Result<Value> {
        if y.len() != self.features.nrows() {
            return Err(Error::Validation(format!(
                "y has wrong length: expected n={}, got {}",
                self.features.nrows(),
                y.len()
            )));
        }
        self.family.validate_labels(y)?;

        let x: Vec<Vec<f64>> = self
            .features
            .row_iter()
            .map(|row| row.iter().copied().collect())
            .collect();
        let y: Value = match self.family {
            Family::Linear => json!(y),
            // Labels were validated as integral above.
            Family::Logistic | Family::Poisson => {
                json!(y.iter().map(|&v| v as i32).collect::<Vec<_>>())
            }
        };

        let mut data = json!({
            "N": self.features.nrows(),
            "K": self.features.ncols(),
            "x": x,
            "y": y,
            "shrinkage": self.hyper.shrinkage,
        });
        if self.family == Family::Linear {
            data["sigma"] = json!(self.hyper.noise_scale);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(family: Family) -> StanProgram {
        let x = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 5.0, 6.0, 5.0, 1.0]);
        StanProgram::new(family, Hyperparameters::default(), x).unwrap()
    }

    #[test]
    fn test_render_has_blocks_and_likelihood() {
        let code = render_program(Family::Logistic, true);
        assert!(code.contains("data {"));
        assert!(code.contains("parameters {"));
        assert!(code.contains("model {"));
        assert!(code.contains("y ~ bernoulli_logit(alpha + x * beta);"));
        assert!(!code.contains("sigma"));

        let code = render_program(Family::Poisson, false);
        assert!(code.contains("y ~ poisson_log(x * beta);"));
        assert!(!code.contains("alpha"));
    }

    #[test]
    fn test_data_json_layout() {
        let data = program(Family::Linear).data_json(&[1.5, -0.5]).unwrap();
        assert_eq!(data["N"], 2);
        assert_eq!(data["K"], 3);
        assert_eq!(data["x"][1], json!([6.0, 5.0, 1.0]));
        assert_eq!(data["sigma"], 1.0);
        assert_eq!(data["shrinkage"], 10.0);
    }

    #[test]
    fn test_integer_labels_for_discrete_families() {
        let data = program(Family::Poisson).data_json(&[3.0, 0.0]).unwrap();
        assert_eq!(data["y"], json!([3, 0]));
        assert!(data.get("sigma").is_none());
        assert!(program(Family::Logistic).data_json(&[2.0, 0.0]).is_err());
        assert!(program(Family::Poisson).data_json(&[1e20, 0.0]).is_err());
    }

    #[test]
    fn test_length_mismatch() {
        assert!(program(Family::Linear).data_json(&[1.0]).is_err());
    }

    #[test]
    fn test_names() {
        let p = program(Family::Linear);
        assert_eq!(p.name(), "linear_regression");
        assert_eq!(p.parameter_names(), vec!["alpha", "beta.1", "beta.2", "beta.3"]);
        assert_eq!(program_name(Family::Poisson, false), "poisson_regression_no_intercept");
    }
}
