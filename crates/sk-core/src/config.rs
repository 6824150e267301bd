//! Home-directory and `skstan.json` resolution.
//!
//! Lookup order for the skstan home directory:
//! 1. `$SKSTAN_HOME`, used verbatim (no existence check)
//! 2. `<user home>/.skstan` if the user home is writable
//! 3. the fixed temporary directory (`/tmp` on unix)
//!
//! The optional config file lives at `<home>/skstan.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Environment variable overriding the home directory.
pub const SKSTAN_HOME_ENV: &str = "SKSTAN_HOME";
/// Directory created under the user home.
pub const SKSTAN_DIR: &str = ".skstan";
/// Config file name inside the home directory.
pub const CONFIG_FILE: &str = "skstan.json";
/// Environment variable naming a CmdStan installation.
pub const CMDSTAN_ENV: &str = "CMDSTAN";

/// Config key selecting the backend.
pub const KEY_BACKEND: &str = "backend";
/// Config key naming a CmdStan installation.
pub const KEY_CMDSTAN: &str = "cmdstan";
/// Config key overriding `<home>/models`.
pub const KEY_MODEL_DIR: &str = "model_dir";

/// Directory used when the user home is missing or not writable.
pub fn fallback_dir() -> PathBuf {
    if cfg!(unix) { PathBuf::from("/tmp") } else { std::env::temp_dir() }
}

/// Whether `dir` is an existing directory the current process may write to.
///
/// Asks the kernel (`access(2)` with `W_OK`), so ownership and the effective
/// uid are taken into account, not just the mode bits.
#[cfg(unix)]
pub fn has_write_permission(dir: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    if !dir.is_dir() {
        return false;
    }
    let Ok(c_path) = CString::new(dir.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a NUL-terminated string that outlives the call.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

/// Whether `dir` is an existing directory whose permissions allow writing.
#[cfg(not(unix))]
pub fn has_write_permission(dir: &Path) -> bool {
    fs::metadata(dir).map(|m| m.is_dir() && !m.permissions().readonly()).unwrap_or(false)
}

/// Resolve the skstan home directory from the process environment.
///
/// Never fails: falls through to [`fallback_dir`].
pub fn resolve_home_dir() -> PathBuf {
    let env_value = std::env::var_os(SKSTAN_HOME_ENV).map(PathBuf::from);
    resolve_home_dir_with(env_value, dirs::home_dir())
}

/// Pure core of [`resolve_home_dir`] with the environment lookups injected.
pub fn resolve_home_dir_with(env_value: Option<PathBuf>, user_home: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = env_value {
        return dir;
    }
    match user_home {
        Some(home) if has_write_permission(&home) => home.join(SKSTAN_DIR),
        Some(home) => {
            log::debug!("home directory {} is not writable; using fallback", home.display());
            fallback_dir()
        }
        None => fallback_dir(),
    }
}

/// Path of the config file inside `dir`.
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Parsed `skstan.json`: a string-keyed mapping of JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    values: Map<String, Value>,
}

impl Config {
    /// Wrap an already-parsed JSON object.
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Parse a config document. The top level must be a JSON object.
    pub fn from_json_str(s: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(s)? {
            Value::Object(values) => Ok(Self { values }),
            other => Err(Error::Validation(format!(
                "config must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Non-empty string value for `key`; any other JSON type yields `None`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
    }

    /// The `backend` entry, if present and a non-empty string.
    pub fn backend(&self) -> Option<&str> {
        self.get_str(KEY_BACKEND)
    }

    /// The `cmdstan` entry as a path.
    pub fn cmdstan(&self) -> Option<PathBuf> {
        self.get_str(KEY_CMDSTAN).map(PathBuf::from)
    }

    /// The `model_dir` entry as a path.
    pub fn model_dir(&self) -> Option<PathBuf> {
        self.get_str(KEY_MODEL_DIR).map(PathBuf::from)
    }

    /// All keys present in the file.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Set a key (used when building contexts programmatically).
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Load `<dir>/skstan.json`.
///
/// Returns `Ok(None)` when the file does not exist. A file that exists but cannot
/// be read or parsed yields [`Error::ConfigLoad`].
pub fn load_config(dir: &Path) -> Result<Option<Config>> {
    let path = config_path(dir);
    if !path.is_file() {
        log::debug!("no config file at {}", path.display());
        return Ok(None);
    }
    let text = fs::read_to_string(&path)
        .map_err(|e| Error::ConfigLoad { path: path.clone(), reason: e.to_string() })?;
    let config = Config::from_json_str(&text)
        .map_err(|e| Error::ConfigLoad { path: path.clone(), reason: e.to_string() })?;
    log::debug!("loaded config from {}", path.display());
    Ok(Some(config))
}
