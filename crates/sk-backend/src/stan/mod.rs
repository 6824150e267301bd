//! CmdStan backend.
//!
//! Sampling happens in external CmdStan processes. This module renders the Stan
//! program for a family, compiles it once through the CmdStan makefile, writes the
//! JSON data file, runs one process per chain and reads the CSV draws back.
//!
//! Persisted programs live at `<model_dir>/<name>.stan`, with the compiled
//! executable (if any) next to them as `<model_dir>/<name>`.

mod cmdstan;
mod loader;
mod model;
pub mod output;
mod program;

use std::path::{Path, PathBuf};

use sk_core::{
    Backend, BackendName, Context, Family, FitResult, Hyperparameters, ModelLoader, Regressor,
    Result,
};

pub use cmdstan::{CmdStan, SampleArgs};
pub use loader::{StanModel, StanModelLoader, executable_for};
pub use model::StanRegression;
pub use program::{StanProgram, program_name, render_program};

/// The `stan` backend.
#[derive(Debug, Clone)]
pub struct StanBackend {
    loader: StanModelLoader,
    cmdstan: Option<CmdStan>,
    run_dir: PathBuf,
}

impl StanBackend {
    /// Backend with explicit model directory, CmdStan install and run directory.
    pub fn new(
        model_dir: impl Into<PathBuf>,
        cmdstan: Option<CmdStan>,
        run_dir: impl Into<PathBuf>,
    ) -> Self {
        Self { loader: StanModelLoader::new(model_dir), cmdstan, run_dir: run_dir.into() }
    }

    /// Backend configured from a resolved context: models under
    /// `<model_dir>/stan`, runs under `<home>/runs`.
    pub fn from_context(ctx: &Context) -> Self {
        Self::new(
            ctx.backend_model_dir(&BackendName::STAN),
            ctx.cmdstan_dir().map(CmdStan::new),
            ctx.home().join("runs"),
        )
    }

    /// Program loader.
    pub fn loader(&self) -> &StanModelLoader {
        &self.loader
    }

    /// Configured CmdStan installation.
    pub fn cmdstan(&self) -> Option<&CmdStan> {
        self.cmdstan.as_ref()
    }
}

impl Backend for StanBackend {
    fn name(&self) -> BackendName {
        BackendName::STAN
    }

    fn regressor(&self, family: Family, hyper: &Hyperparameters) -> Result<Box<dyn Regressor>> {
        let model = StanRegression::new(
            family,
            hyper.clone(),
            self.loader.clone(),
            self.cmdstan.clone(),
            self.run_dir.clone(),
        )?;
        Ok(Box::new(model))
    }

    fn model_dir(&self) -> &Path {
        self.loader.base_dir()
    }

    fn available_models(&self) -> Result<Vec<String>> {
        self.loader.available_models()
    }

    /// Saves the Stan program that produced `fit`; draws stay in the run directory.
    fn save_fit(&self, name: &str, fit: &FitResult) -> Result<PathBuf> {
        let include_intercept = fit.parameter_names.first().is_some_and(|n| n == "alpha");
        self.loader.save_program(name, &render_program(fit.family, include_intercept))
    }
}
