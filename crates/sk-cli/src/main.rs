//! skstan CLI

mod input;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use sk_backend::TfpModelLoader;
use sk_core::{BackendName, Context, Family, ModelLoader};
use skstan::{BackendRegistry, Estimator, estimator_for};

use crate::input::Dataset;

#[derive(Parser)]
#[command(name = "skstan")]
#[command(about = "skstan - Bayesian regression over Stan and Laplace backends")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// skstan home directory (overrides $SKSTAN_HOME and ~/.skstan)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Backend to use instead of the one named in skstan.json
    #[arg(long, global = true)]
    backend: Option<BackendName>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved home directory, config and backend
    Config,

    /// Fit a regression model to a JSON data file
    Fit {
        /// Input data: {"x": [[...], ...], "y": [...]}, one row per sample
        #[arg(short, long)]
        input: PathBuf,

        /// Regression family (linear, logistic, poisson)
        #[arg(long, default_value = "linear")]
        family: Family,

        /// Prior scale of the coefficients
        #[arg(long, default_value = "10.0")]
        shrinkage: f64,

        /// Number of chains
        #[arg(long, default_value = "4")]
        chains: usize,

        /// Warmup iterations per chain
        #[arg(long, default_value = "1000")]
        warmup: usize,

        /// Draws per chain
        #[arg(long, default_value = "1000")]
        samples: usize,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Fit without an intercept
        #[arg(long)]
        no_intercept: bool,

        /// Persist the fit under this model name
        #[arg(long)]
        save: Option<String>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Predict with a persisted tfp model
    Predict {
        /// Model name under <model_dir>/tfp
        #[arg(short, long)]
        model: String,

        /// Input data: {"x": [[...], ...]}, one row per sample
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List persisted models of a backend
    Models,

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = || resolve_context(cli.home.as_deref(), cli.backend.clone());

    match cli.command {
        Commands::Config => cmd_config(&ctx()?),
        Commands::Fit {
            input,
            family,
            shrinkage,
            chains,
            warmup,
            samples,
            seed,
            no_intercept,
            save,
            output,
        } => {
            let est = estimator_for(family)
                .shrinkage(shrinkage)
                .chains(chains)
                .warmup(warmup)
                .samples(samples)
                .seed(seed)
                .include_intercept(!no_intercept)
                .context(ctx()?);
            cmd_fit(est, &input, save.as_deref(), output.as_ref())
        }
        Commands::Predict { model, input, output } => {
            cmd_predict(&ctx()?, &model, &input, output.as_ref())
        }
        Commands::Models => cmd_models(&ctx()?),
        Commands::Version => {
            println!("skstan {}", sk_core::VERSION);
            Ok(())
        }
    }
}

fn resolve_context(home: Option<&Path>, backend: Option<BackendName>) -> Result<Context> {
    let ctx = match home {
        Some(home) => Context::try_from_home(home)?,
        None => Context::try_resolve()?,
    };
    Ok(match backend {
        Some(name) => ctx.with_backend(name),
        None => ctx,
    })
}

fn cmd_config(ctx: &Context) -> Result<()> {
    let registry = BackendRegistry::with_defaults(ctx);
    let output_json = serde_json::json!({
        "home": ctx.home(),
        "config_path": ctx.config_path(),
        "config": ctx.config(),
        "backend": ctx.backend(),
        "backends": registry.names(),
        "model_dir": ctx.model_dir(),
        "cmdstan": ctx.cmdstan_dir(),
    });
    write_json(None, output_json)
}

fn cmd_fit(
    mut est: Estimator,
    input: &Path,
    save: Option<&str>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let data = Dataset::load(input)?;
    let fit = est.fit(&data.x, data.labels()?).context("fit failed")?;
    tracing::info!(backend = %fit.backend, converged = fit.converged, "fit complete");
    let (backend, family, names, mode, converged, message) = (
        fit.backend.clone(),
        fit.family,
        fit.parameter_names.clone(),
        fit.mode.clone(),
        fit.converged,
        fit.message.clone(),
    );

    let summary = est.summary()?;
    let saved = match save {
        Some(name) => Some(est.save(name)?),
        None => None,
    };

    let output_json = serde_json::json!({
        "backend": backend,
        "family": family,
        "parameter_names": names,
        "mode": mode,
        "mean": summary.params.iter().map(|p| p.mean).collect::<Vec<_>>(),
        "sd": summary.params.iter().map(|p| p.sd).collect::<Vec<_>>(),
        "r_hat": summary.params.iter().map(|p| p.r_hat).collect::<Vec<_>>(),
        "ess_bulk": summary.params.iter().map(|p| p.ess_bulk).collect::<Vec<_>>(),
        "n_chains": summary.n_chains,
        "total_draws": summary.total_draws,
        "converged": converged,
        "message": message,
        "saved": saved,
    });
    write_json(output, output_json)
}

fn cmd_predict(ctx: &Context, name: &str, input: &Path, output: Option<&PathBuf>) -> Result<()> {
    let loader = TfpModelLoader::new(ctx.backend_model_dir(&BackendName::TFP));
    let model = loader.load_model(name)?;
    let data = Dataset::load(input)?;
    let predictions = model.predict(&data.x)?;
    tracing::info!(model = name, n = predictions.len(), "prediction complete");

    let output_json = serde_json::json!({
        "model": name,
        "family": model.family(),
        "parameter_names": model.parameter_names,
        "mode": model.posterior.mode,
        "predictions": predictions,
    });
    write_json(output, output_json)
}

fn cmd_models(ctx: &Context) -> Result<()> {
    let registry = BackendRegistry::with_defaults(ctx);
    let backend = registry.current()?;
    let output_json = serde_json::json!({
        "backend": backend.name(),
        "model_dir": backend.model_dir(),
        "models": backend.available_models()?,
    });
    write_json(None, output_json)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
