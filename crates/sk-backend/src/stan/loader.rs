//! Persisted Stan programs: `<base_dir>/<name>.stan`, optionally compiled to
//! `<base_dir>/<name>` by CmdStan.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sk_core::{Error, ModelLoader, Result};

/// A Stan program loaded from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StanModel {
    /// Model name (file stem).
    pub name: String,
    /// Path of the `.stan` file.
    pub path: PathBuf,
    /// Program text.
    pub code: String,
    /// Compiled executable next to the program, if present.
    pub executable: Option<PathBuf>,
}

/// Path of the executable CmdStan builds from `stan_file`.
pub fn executable_for(stan_file: &Path) -> PathBuf {
    let exe = stan_file.with_extension("");
    if cfg!(windows) { exe.with_extension("exe") } else { exe }
}

fn has_model_block(code: &str) -> bool {
    code.lines().any(|l| {
        let l = l.trim_start();
        l.starts_with("model") && l["model".len()..].trim_start().starts_with('{')
    })
}

/// Loads `.stan` programs from an injected base directory.
#[derive(Debug, Clone)]
pub struct StanModelLoader {
    base_dir: PathBuf,
}

impl StanModelLoader {
    /// Artifact extension.
    pub const EXTENSION: &'static str = "stan";

    /// Loader rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    /// Write `code` as `<base_dir>/<name>.stan`, creating the directory.
    pub fn save_program(&self, name: &str, code: &str) -> Result<PathBuf> {
        let path = self.model_path(name)?;
        fs::create_dir_all(&self.base_dir)?;
        fs::write(&path, code)?;
        log::debug!("wrote Stan program {}", path.display());
        Ok(path)
    }
}

impl ModelLoader for StanModelLoader {
    type Model = StanModel;

    fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn extension(&self) -> &str {
        Self::EXTENSION
    }

    fn load_model(&self, name: &str) -> Result<StanModel> {
        let path = self.locate(name)?;
        let code = fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                Error::ModelNotFound { name: name.to_string(), path: path.clone() }
            }
            _ => Error::Deserialization { path: path.clone(), reason: e.to_string() },
        })?;
        if !has_model_block(&code) {
            return Err(Error::Deserialization {
                path,
                reason: "not a Stan program: no `model` block".to_string(),
            });
        }
        let executable = Some(executable_for(&path)).filter(|p| p.is_file());
        log::debug!("loaded Stan model '{name}' from {}", path.display());
        Ok(StanModel { name: name.to_string(), path, code, executable })
    }
}
