use std::fs;
use std::path::PathBuf;

use nalgebra::{DMatrix, DVector};
use sk_core::{
    BackendName, Error, Family, FitResult, Hyperparameters, LogJointFn, ModelLoader,
    RegressionModel, Regressor, Result,
};
use sk_inference::diagnostics::summarize;

use crate::stan::cmdstan::{CmdStan, SampleArgs};
use crate::stan::loader::StanModelLoader;
use crate::stan::output::read_trace;
use crate::stan::program::StanProgram;
use crate::unique_dir;

/// R-hat above which a CmdStan run is reported as not converged.
const RHAT_CONVERGED: f64 = 1.1;

/// One regression family fitted by CmdStan.
#[derive(Debug, Clone)]
pub struct StanRegression {
    family: Family,
    hyper: Hyperparameters,
    loader: StanModelLoader,
    cmdstan: Option<CmdStan>,
    run_dir: PathBuf,
}

impl StanRegression {
    /// Model for `family`. Programs are looked up (and saved) through `loader`;
    /// `cmdstan` compiles programs that have no executable yet.
    pub fn new(
        family: Family,
        hyper: Hyperparameters,
        loader: StanModelLoader,
        cmdstan: Option<CmdStan>,
        run_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        hyper.validate()?;
        Ok(Self { family, hyper, loader, cmdstan, run_dir: run_dir.into() })
    }

    /// Hyperparameters.
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyper
    }

    /// Executable for `program`: the persisted one if compiled, else compiled now.
    fn executable(&self, program: &StanProgram) -> Result<PathBuf> {
        let name = program.name();
        let stan_file = match self.loader.load_model(&name) {
            Ok(model) => {
                if let Some(exe) = model.executable {
                    log::debug!("using compiled Stan model {}", exe.display());
                    return Ok(exe);
                }
                model.path
            }
            Err(Error::ModelNotFound { .. }) => self.loader.save_program(&name, &program.code())?,
            Err(e) => return Err(e),
        };
        match &self.cmdstan {
            Some(cmdstan) => cmdstan.compile(&stan_file),
            None => Err(Error::Backend {
                backend: BackendName::STAN.to_string(),
                message: format!(
                    "{} is not compiled and no CmdStan installation is configured \
                     (set `cmdstan` in skstan.json or $CMDSTAN)",
                    stan_file.display()
                ),
            }),
        }
    }
}

impl Regressor for StanRegression {
    fn family(&self) -> Family {
        self.family
    }

    fn backend(&self) -> BackendName {
        BackendName::STAN
    }

    fn log_joint_fn(&self) -> Result<LogJointFn> {
        Err(Error::UnsupportedModel(format!(
            "the stan backend cannot build a log-joint function for {} regression: \
             CmdStan exposes no in-process log density",
            self.family
        )))
    }

    fn fit(&self, x: &DMatrix<f64>, y: &DVector<f64>) -> Result<FitResult> {
        let program = self.posterior_distribution(x)?;
        let data = program.data_json(y.as_slice())?;
        let exe = self.executable(&program)?;

        let run_dir = unique_dir(&self.run_dir, &program.name());
        fs::create_dir_all(&run_dir)?;
        let data_file = run_dir.join("data.json");
        fs::write(&data_file, serde_json::to_vec(&data)?)?;

        let args = SampleArgs {
            chains: self.hyper.chains,
            warmup: self.hyper.warmup,
            samples: self.hyper.samples,
            seed: self.hyper.seed,
        };
        log::info!(
            "sampling {} regression: {} chains x {} draws ({})",
            self.family,
            args.chains,
            args.samples,
            run_dir.display()
        );
        let csvs = CmdStan::sample(&exe, &data_file, &run_dir, &args)?;
        let trace = read_trace(&csvs)?;

        let expected = program.parameter_names();
        if trace.param_names != expected {
            log::warn!(
                "CmdStan reported parameters {:?}, expected {:?}",
                trace.param_names,
                expected
            );
        }

        let max_r_hat = summarize(&trace).max_r_hat();
        let converged = max_r_hat.is_nan() || max_r_hat < RHAT_CONVERGED;
        Ok(FitResult {
            backend: BackendName::STAN,
            family: self.family,
            parameter_names: trace.param_names.clone(),
            hyperparameters: self.hyper.clone(),
            mode: None,
            covariance: None,
            trace,
            converged,
            message: format!("CmdStan output in {}", run_dir.display()),
        })
    }
}

impl RegressionModel for StanRegression {
    type Posterior = StanProgram;

    fn posterior_distribution(&self, features: &DMatrix<f64>) -> Result<StanProgram> {
        StanProgram::new(self.family, self.hyper.clone(), features.clone())
    }
}
