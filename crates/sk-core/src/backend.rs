//! Backend identifiers.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Name of a statistical backend (`"stan"`, `"tfp"`, ...).
///
/// Names are free-form so that third-party backends can be registered; the two
/// built-in names are available as [`BackendName::STAN`] and [`BackendName::TFP`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendName(Cow<'static, str>);

impl BackendName {
    /// CmdStan sampler backend.
    pub const STAN: BackendName = BackendName(Cow::Borrowed("stan"));
    /// Tensor-probability (Laplace approximation) backend.
    pub const TFP: BackendName = BackendName(Cow::Borrowed("tfp"));

    /// Backend used when the config file does not name one.
    pub const DEFAULT: BackendName = Self::STAN;

    /// Build a name from any string, rejecting empty/blank values.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Validation("backend name must be non-empty".to_string()));
        }
        Ok(Self(Cow::Owned(name)))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BackendName {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for BackendName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BackendName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for BackendName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_stan() {
        assert_eq!(BackendName::default(), BackendName::STAN);
        assert_eq!(BackendName::default().as_str(), "stan");
    }

    #[test]
    fn test_owned_equals_borrowed() {
        let parsed: BackendName = "tfp".parse().unwrap();
        assert_eq!(parsed, BackendName::TFP);
    }

    #[test]
    fn test_blank_rejected() {
        assert!(BackendName::new("  ").is_err());
    }

    #[test]
    fn test_serde_is_plain_string() {
        let json = serde_json::to_string(&BackendName::TFP).unwrap();
        assert_eq!(json, "\"tfp\"");
        let back: BackendName = serde_json::from_str("\"custom\"").unwrap();
        assert_eq!(back.as_str(), "custom");
    }
}
