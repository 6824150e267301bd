//! # sk-inference
//!
//! Model-side plumbing shared by the skstan backends.
//!
//! This crate provides:
//! - generative GLM specifications with log-joint densities ([`regression`])
//! - an argmin L-BFGS wrapper ([`optimizer`])
//! - a Laplace approximation around the posterior mode ([`laplace`])
//! - MCMC diagnostics over a [`sk_core::Trace`] ([`diagnostics`])
//!
//! No sampler lives here: exact sampling is the job of the external CmdStan
//! executable driven by `sk-backend`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// MCMC diagnostics: split R-hat, bulk ESS, per-parameter summaries.
pub mod diagnostics;
/// Laplace (Gaussian) approximation at a posterior mode.
pub mod laplace;
/// Generic numerical optimizer (argmin L-BFGS backend).
pub mod optimizer;
/// Generative regression models: priors, likelihoods, log-joint functions.
pub mod regression;

pub use diagnostics::{FitSummary, ParamSummary, summarize};
pub use laplace::{LaplaceApproximation, laplace_at_mode};
pub use optimizer::{
    LbfgsOptimizer, NllObjective, ObjectiveFunction, OptimizationResult, OptimizerConfig,
};
pub use regression::{ConditionedGlm, GlmSpec, JointDistribution, make_log_joint_fn};
