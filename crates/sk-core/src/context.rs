//! Process context: resolved home directory, config and active backend.
//!
//! A [`Context`] is resolved once and then read-only. Code that needs one takes it
//! as a parameter; the lazily-initialised global in this module exists for the
//! façade's convenience constructors and can be replaced or reset (tests).

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::backend::BackendName;
use crate::config::{self, Config};
use crate::Result;

/// Pick the active backend from an (optional) config.
///
/// Absent config, a missing `backend` key, or a value that is not a non-empty
/// string all resolve to [`BackendName::DEFAULT`].
pub fn current_backend(config: Option<&Config>) -> BackendName {
    match config.and_then(Config::backend) {
        Some(name) => BackendName::new(name).unwrap_or_default(),
        None => {
            if let Some(raw) = config.and_then(|c| c.get(config::KEY_BACKEND)) {
                log::warn!("ignoring non-string backend entry {raw}; using '{}'", BackendName::DEFAULT);
            }
            BackendName::DEFAULT
        }
    }
}

/// Resolved skstan environment.
#[derive(Debug, Clone)]
pub struct Context {
    home: PathBuf,
    config: Option<Config>,
    backend: BackendName,
    cmdstan: Option<PathBuf>,
}

impl Context {
    /// Resolve from the process environment.
    ///
    /// A malformed `skstan.json` is logged and ignored: the default backend is used.
    pub fn resolve() -> Self {
        Self::from_home(config::resolve_home_dir())
    }

    /// Resolve from the process environment, failing on a malformed config file.
    pub fn try_resolve() -> Result<Self> {
        Self::try_from_home(config::resolve_home_dir())
    }

    /// Resolve config and backend for an explicit home directory (fail fast).
    pub fn try_from_home(home: impl Into<PathBuf>) -> Result<Self> {
        let home = home.into();
        let config = config::load_config(&home)?;
        Ok(Self::builder().home(home).maybe_config(config).build())
    }

    /// Resolve config and backend for an explicit home directory (log-and-default).
    pub fn from_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let config = match config::load_config(&home) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("{e}; falling back to default backend '{}'", BackendName::DEFAULT);
                None
            }
        };
        Self::builder().home(home).maybe_config(config).build()
    }

    /// Start building a context from explicit values.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Home directory (root for config and persisted models).
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Loaded config, if a config file was present.
    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    /// Location of the config file for this home.
    pub fn config_path(&self) -> PathBuf {
        config::config_path(&self.home)
    }

    /// Active backend.
    pub fn backend(&self) -> &BackendName {
        &self.backend
    }

    /// Copy of this context with a different active backend.
    pub fn with_backend(mut self, backend: BackendName) -> Self {
        self.backend = backend;
        self
    }

    /// Root of persisted models: config `model_dir`, else `<home>/models`.
    pub fn model_dir(&self) -> PathBuf {
        self.config
            .as_ref()
            .and_then(Config::model_dir)
            .unwrap_or_else(|| self.home.join("models"))
    }

    /// Default base directory of persisted models for one backend.
    pub fn backend_model_dir(&self, backend: &BackendName) -> PathBuf {
        self.model_dir().join(backend.as_str())
    }

    /// CmdStan installation: config `cmdstan`, else `$CMDSTAN`.
    pub fn cmdstan_dir(&self) -> Option<&Path> {
        self.cmdstan.as_deref()
    }
}

/// Builder for [`Context`].
#[derive(Debug, Default)]
pub struct ContextBuilder {
    home: Option<PathBuf>,
    config: Option<Config>,
    backend: Option<BackendName>,
    cmdstan: Option<PathBuf>,
}

impl ContextBuilder {
    /// Home directory. Defaults to [`config::fallback_dir`].
    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Config contents.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    fn maybe_config(mut self, config: Option<Config>) -> Self {
        self.config = config;
        self
    }

    /// Force the backend instead of reading it from the config.
    pub fn backend(mut self, backend: BackendName) -> Self {
        self.backend = Some(backend);
        self
    }

    /// CmdStan installation directory.
    pub fn cmdstan(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cmdstan = Some(dir.into());
        self
    }

    /// Finish. The backend comes from the explicit override, else the config.
    pub fn build(self) -> Context {
        let backend = self.backend.unwrap_or_else(|| current_backend(self.config.as_ref()));
        let cmdstan = self
            .cmdstan
            .or_else(|| self.config.as_ref().and_then(Config::cmdstan))
            .or_else(|| std::env::var_os(config::CMDSTAN_ENV).map(PathBuf::from));
        Context {
            home: self.home.unwrap_or_else(config::fallback_dir),
            config: self.config,
            backend,
            cmdstan,
        }
    }
}

static GLOBAL: RwLock<Option<Arc<Context>>> = RwLock::new(None);

/// Process-wide context, resolved on first use.
pub fn global() -> Arc<Context> {
    if let Some(ctx) = GLOBAL.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        return Arc::clone(ctx);
    }
    let mut slot = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    let ctx = slot.get_or_insert_with(|| {
        let ctx = Context::resolve();
        log::info!("skstan home {} (backend '{}')", ctx.home().display(), ctx.backend());
        Arc::new(ctx)
    });
    Arc::clone(ctx)
}

/// Replace the process-wide context.
pub fn set_global(ctx: Context) {
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(ctx));
}

/// Drop the cached context; the next [`global`] call resolves again.
pub fn reset_global() {
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn tmp_home(tag: &str) -> PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let mut p = std::env::temp_dir();
        p.push(format!("skstan_ctx_{}_{}_{}", std::process::id(), nanos, tag));
        fs::create_dir_all(&p).unwrap();
        p
    }

    #[test]
    fn test_no_config_file_means_stan() {
        let home = tmp_home("nofile");
        let ctx = Context::from_home(&home);
        assert!(ctx.config().is_none());
        assert_eq!(ctx.backend().as_str(), "stan");
        fs::remove_dir_all(&home).ok();
    }

    #[test]
    fn test_config_without_backend_key_means_stan() {
        let home = tmp_home("nokey");
        fs::write(home.join("skstan.json"), r#"{"other": 1}"#).unwrap();
        let ctx = Context::from_home(&home);
        assert!(ctx.config().is_some());
        assert_eq!(ctx.backend(), &BackendName::STAN);
        fs::remove_dir_all(&home).ok();
    }

    #[test]
    fn test_config_backend_is_used_exactly() {
        let home = tmp_home("key");
        fs::write(home.join("skstan.json"), r#"{"backend": "my-backend"}"#).unwrap();
        let ctx = Context::from_home(&home);
        assert_eq!(ctx.backend().as_str(), "my-backend");
        fs::remove_dir_all(&home).ok();
    }

    #[test]
    fn test_malformed_config_logs_and_defaults() {
        let home = tmp_home("bad");
        fs::write(home.join("skstan.json"), "not json").unwrap();
        let ctx = Context::from_home(&home);
        assert!(ctx.config().is_none());
        assert_eq!(ctx.backend(), &BackendName::STAN);
        fs::remove_dir_all(&home).ok();
    }

    #[test]
    fn test_try_from_home_fails_fast() {
        let home = tmp_home("strict");
        fs::write(home.join("skstan.json"), "[]").unwrap();
        let err = Context::try_from_home(&home).unwrap_err();
        assert!(matches!(err, crate::Error::ConfigLoad { .. }), "got {err:?}");
        fs::remove_dir_all(&home).ok();
    }

    #[test]
    fn test_current_backend_wrong_type_defaults() {
        let cfg = Config::from_json_str(r#"{"backend": ["tfp"]}"#).unwrap();
        assert_eq!(current_backend(Some(&cfg)), BackendName::STAN);
        assert_eq!(current_backend(None), BackendName::STAN);
    }

    #[test]
    fn test_model_dir_override() {
        let mut cfg = Config::default();
        cfg.insert("model_dir", serde_json::json!("/srv/models"));
        let ctx = Context::builder().home("/h").config(cfg).build();
        assert_eq!(ctx.model_dir(), PathBuf::from("/srv/models"));
        assert_eq!(ctx.backend_model_dir(&BackendName::TFP), PathBuf::from("/srv/models/tfp"));

        let ctx = Context::builder().home("/h").build();
        assert_eq!(ctx.model_dir(), PathBuf::from("/h/models"));
    }

    #[test]
    fn test_builder_backend_override_wins() {
        let cfg = Config::from_json_str(r#"{"backend": "stan"}"#).unwrap();
        let ctx = Context::builder().config(cfg).backend(BackendName::TFP).build();
        assert_eq!(ctx.backend(), &BackendName::TFP);
    }

    #[test]
    fn test_global_set_and_reset() {
        set_global(Context::builder().home("/pinned").backend(BackendName::TFP).build());
        assert_eq!(global().home(), Path::new("/pinned"));
        assert_eq!(global().backend(), &BackendName::TFP);
        reset_global();
        set_global(Context::builder().home("/other").build());
        assert_eq!(global().home(), Path::new("/other"));
        reset_global();
    }
}
