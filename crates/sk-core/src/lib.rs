//! # sk-core
//!
//! Core types and traits for skstan.
//!
//! This crate defines:
//! - the error taxonomy shared by every crate ([`Error`], [`Result`])
//! - home-directory and `skstan.json` resolution ([`config`])
//! - the process context selecting the active backend ([`context`])
//! - the backend-facing traits ([`RegressionModel`], [`Regressor`], [`ModelLoader`],
//!   [`LogDensityModel`])
//! - fit/trace result types ([`FitResult`], [`Trace`])
//!
//! ## Architecture
//!
//! High-level estimators (`skstan`) depend on the traits defined here, NOT on
//! concrete backends (`sk-backend`). Backends are looked up by [`BackendName`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod traits;
pub mod types;

pub use backend::BackendName;
pub use config::Config;
pub use context::Context;
pub use error::{Error, Result};
pub use traits::{Backend, LogDensityModel, LogJointFn, ModelLoader, RegressionModel, Regressor};
pub use types::{Chain, Family, FitResult, Hyperparameters, Trace};

/// skstan version string (from `Cargo.toml`).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
