//! # skstan
//!
//! Scikit-learn style Bayesian regression over swappable statistical backends.
//!
//! ```no_run
//! use nalgebra::{DMatrix, DVector};
//! use skstan::LinearRegression;
//!
//! let x = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
//! let y = DVector::from_vec(vec![1.1, 1.9, 3.2]);
//! let mut glm = LinearRegression::new().shrinkage(10.0).chains(8);
//! glm.fit(&x, &y)?;
//! println!("{}", glm.summary()?);
//! # Ok::<(), skstan::Error>(())
//! ```
//!
//! The backend comes from `<SKSTAN_HOME>/skstan.json` (`{"backend": "tfp"}`),
//! defaulting to `stan`, and can be overridden per estimator.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod estimator;

use std::ops::{Deref, DerefMut};

pub use estimator::{Estimator, transpose_features};
pub use sk_backend::BackendRegistry;
pub use sk_core::{BackendName, Context, Error, Family, FitResult, Hyperparameters, Result};
pub use sk_inference::FitSummary;

macro_rules! family_estimator {
    ($(#[$doc:meta])* $name:ident, $family:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(Estimator);

        impl $name {
            /// Unfitted estimator with default hyperparameters.
            pub fn new() -> Self {
                Self(Estimator::new($family))
            }

            /// Prior scale of the coefficients.
            pub fn shrinkage(self, shrinkage: f64) -> Self {
                Self(self.0.shrinkage(shrinkage))
            }

            /// Number of chains.
            pub fn chains(self, chains: usize) -> Self {
                Self(self.0.chains(chains))
            }

            /// Warmup iterations per chain.
            pub fn warmup(self, warmup: usize) -> Self {
                Self(self.0.warmup(warmup))
            }

            /// Draws per chain.
            pub fn samples(self, samples: usize) -> Self {
                Self(self.0.samples(samples))
            }

            /// Base RNG seed.
            pub fn seed(self, seed: u64) -> Self {
                Self(self.0.seed(seed))
            }

            /// Fit an intercept.
            pub fn include_intercept(self, include: bool) -> Self {
                Self(self.0.include_intercept(include))
            }

            /// Use `backend` regardless of the context's selection.
            pub fn backend(self, backend: BackendName) -> Self {
                Self(self.0.backend(backend))
            }

            /// Use `ctx` instead of the process-wide context.
            pub fn context(self, ctx: Context) -> Self {
                Self(self.0.context(ctx))
            }

            /// Dispatch through `registry` instead of the default backends.
            pub fn registry(self, registry: BackendRegistry) -> Self {
                Self(self.0.registry(registry))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Deref for $name {
            type Target = Estimator;

            fn deref(&self) -> &Estimator {
                &self.0
            }
        }

        impl DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Estimator {
                &mut self.0
            }
        }
    };
}

family_estimator!(
    /// Bayesian linear regression: `y ~ Normal(alpha + X beta, noise_scale)`.
    LinearRegression,
    Family::Linear
);

impl LinearRegression {
    /// Observation noise sigma.
    pub fn noise_scale(self, sigma: f64) -> Self {
        Self(self.0.noise_scale(sigma))
    }
}

family_estimator!(
    /// Bayesian logistic regression: `y ~ Bernoulli(sigmoid(alpha + X beta))`.
    LogisticRegression,
    Family::Logistic
);

family_estimator!(
    /// Bayesian Poisson regression: `y ~ Poisson(exp(alpha + X beta))`.
    PoissonRegression,
    Family::Poisson
);

/// Estimator for a family chosen at runtime.
pub fn estimator_for(family: Family) -> Estimator {
    Estimator::new(family)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_types() {
        assert_eq!(LinearRegression::new().family(), Family::Linear);
        assert_eq!(LogisticRegression::default().family(), Family::Logistic);
        assert_eq!(PoissonRegression::new().family(), Family::Poisson);
        assert_eq!(estimator_for(Family::Poisson).family(), Family::Poisson);
    }

    #[test]
    fn test_setters_forward() {
        let glm = LinearRegression::new().shrinkage(10.0).chains(8).noise_scale(2.0);
        assert_eq!(glm.hyperparameters().chains, 8);
        assert_eq!(glm.hyperparameters().noise_scale, 2.0);
    }
}
