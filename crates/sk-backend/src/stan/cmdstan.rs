//! Process boundary to a CmdStan installation.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rayon::prelude::*;
use sk_core::{BackendName, Error, Result};

use crate::stan::loader::executable_for;

/// Sampler settings forwarded on the CmdStan command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleArgs {
    /// Number of chains (one process each).
    pub chains: usize,
    /// `num_warmup`.
    pub warmup: usize,
    /// `num_samples`.
    pub samples: usize,
    /// `random seed`, shared by all chains; CmdStan offsets streams by `id`.
    pub seed: u64,
}

fn backend_error(message: impl Into<String>) -> Error {
    Error::Backend { backend: BackendName::STAN.to_string(), message: message.into() }
}

fn check_output(what: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = if stderr.trim().is_empty() { stdout } else { stderr };
    Err(backend_error(format!("{what} failed ({}): {}", output.status, detail.trim())))
}

/// A CmdStan installation directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdStan {
    dir: PathBuf,
}

impl CmdStan {
    /// Installation rooted at `dir` (the directory holding CmdStan's `makefile`).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Installation directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Compile `stan_file` with `make`, returning the executable path.
    pub fn compile(&self, stan_file: &Path) -> Result<PathBuf> {
        if !self.dir.is_dir() {
            return Err(backend_error(format!(
                "CmdStan directory {} does not exist",
                self.dir.display()
            )));
        }
        let exe = executable_for(stan_file);
        log::info!("compiling {} with CmdStan at {}", stan_file.display(), self.dir.display());
        let output = Command::new("make")
            .arg(&exe)
            .current_dir(&self.dir)
            .output()
            .map_err(|e| backend_error(format!("failed to run make: {e}")))?;
        check_output("make", &output)?;
        if !exe.is_file() {
            return Err(backend_error(format!(
                "make succeeded but {} was not produced",
                exe.display()
            )));
        }
        Ok(exe)
    }

    /// Run one sampling process per chain, in parallel.
    ///
    /// Returns the per-chain output CSV paths in chain order.
    pub fn sample(
        exe: &Path,
        data_file: &Path,
        output_dir: &Path,
        args: &SampleArgs,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir)?;
        (1..=args.chains)
            .into_par_iter()
            .map(|chain_id| {
                let csv = output_dir.join(format!("output_{chain_id}.csv"));
                log::debug!("chain {chain_id}: {} -> {}", exe.display(), csv.display());
                let output = Command::new(exe)
                    .arg("sample")
                    .arg(format!("num_warmup={}", args.warmup))
                    .arg(format!("num_samples={}", args.samples))
                    .arg(format!("id={chain_id}"))
                    .arg("data")
                    .arg(format!("file={}", data_file.display()))
                    .arg("random")
                    .arg(format!("seed={}", args.seed))
                    .arg("output")
                    .arg(format!("file={}", csv.display()))
                    .output()
                    .map_err(|e| backend_error(format!("failed to launch {}: {e}", exe.display())))?;
                check_output(&format!("chain {chain_id}"), &output)?;
                if !csv.is_file() {
                    return Err(backend_error(format!(
                        "chain {chain_id} produced no output at {}",
                        csv.display()
                    )));
                }
                Ok(csv)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_install_is_backend_error() {
        let cmdstan = CmdStan::new("/no/such/cmdstan");
        let err = cmdstan.compile(Path::new("/tmp/x.stan")).unwrap_err();
        assert!(matches!(err, Error::Backend { .. }), "got {err:?}");
        assert!(err.to_string().starts_with("stan backend error"));
    }

    #[test]
    fn test_missing_executable_is_backend_error() {
        let args = SampleArgs { chains: 2, warmup: 10, samples: 10, seed: 1 };
        let out = std::env::temp_dir().join(format!("skstan_cmdstan_{}", std::process::id()));
        let err = CmdStan::sample(Path::new("/no/such/exe"), Path::new("d.json"), &out, &args)
            .unwrap_err();
        assert!(matches!(err, Error::Backend { .. }));
        fs::remove_dir_all(&out).ok();
    }
}
