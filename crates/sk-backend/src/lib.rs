//! # sk-backend
//!
//! Concrete statistical backends for skstan.
//!
//! - [`stan`]: renders Stan programs and drives an external CmdStan installation,
//!   one process per chain.
//! - [`tfp`]: joint-distribution models fitted by MAP + Laplace approximation.
//! - [`registry`]: name → backend dispatch.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod registry;
pub mod stan;
pub mod tfp;

pub use registry::BackendRegistry;
pub use stan::{CmdStan, StanBackend, StanModel, StanModelLoader, StanProgram, StanRegression};
pub use tfp::{TfpBackend, TfpModel, TfpModelArtifact, TfpModelLoader, TfpRegression};

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fresh, unique directory name under `parent` for one run.
pub(crate) fn unique_dir(parent: &std::path::Path, tag: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
    parent.join(format!("{tag}-{}-{nanos}", std::process::id()))
}
