//! Tree Options
//!
//! Options are fixed when a tree is built and threaded through every node.
//! They can be written by hand or loaded from JSON:
//!
//! ```json
//! { "permissive": false, "mode": "spa", "escapeHatch": "$" }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ReifyError, Result};

/// How computed values are evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Incremental: computeds are memoized and invalidated by their dependencies.
    #[default]
    Spa,

    /// Stateless: every read of a computed re-runs its function.
    Ssr,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Spa => "spa",
            Mode::Ssr => "ssr",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ReifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "spa" => Ok(Mode::Spa),
            "ssr" => Ok(Mode::Ssr),
            other => Err(ReifyError::InvalidOptions(format!(
                "unknown mode `{other}`, expected `spa` or `ssr`"
            ))),
        }
    }
}

/// Construction options for a reactive tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Options {
    /// Allow keys that were absent from the initial shape to be added later.
    pub permissive: bool,

    /// Evaluation mode for computeds.
    pub mode: Mode,

    /// Prefix that exposes the underlying signal or computed of a key.
    /// An empty prefix disables the escape hatch.
    pub escape_hatch: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            permissive: false,
            mode: Mode::Spa,
            escape_hatch: "$".to_string(),
        }
    }
}

impl Options {
    /// Parse options from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ReifyError::InvalidOptions(e.to_string()))
    }

    pub fn with_permissive(mut self, permissive: bool) -> Self {
        self.permissive = permissive;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_escape_hatch(mut self, prefix: impl Into<String>) -> Self {
        self.escape_hatch = prefix.into();
        self
    }

    /// Strip the escape prefix from `key`, if the key uses it.
    ///
    /// A key made only of the prefix is an ordinary key.
    pub(crate) fn escaped<'k>(&self, key: &'k str) -> Option<&'k str> {
        if self.escape_hatch.is_empty() {
            return None;
        }
        key.strip_prefix(self.escape_hatch.as_str())
            .filter(|rest| !rest.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_strict_spa_dollar() {
        let options = Options::default();
        assert!(!options.permissive);
        assert_eq!(options.mode, Mode::Spa);
        assert_eq!(options.escape_hatch, "$");
    }

    #[test]
    fn options_load_from_json() {
        let options = Options::from_json(r#"{"mode":"ssr","escapeHatch":"@"}"#).unwrap();
        assert_eq!(options.mode, Mode::Ssr);
        assert_eq!(options.escape_hatch, "@");
        assert!(!options.permissive);

        let err = Options::from_json(r#"{"mode":"isr"}"#).unwrap_err();
        assert!(matches!(err, ReifyError::InvalidOptions(_)));
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("SSR".parse::<Mode>().unwrap(), Mode::Ssr);
        assert!("static".parse::<Mode>().is_err());
    }

    #[test]
    fn escape_prefix_matching() {
        let options = Options::default();
        assert_eq!(options.escaped("$count"), Some("count"));
        assert_eq!(options.escaped("count"), None);
        assert_eq!(options.escaped("$"), None);

        let disabled = Options::default().with_escape_hatch("");
        assert_eq!(disabled.escaped("$count"), None);
    }
}
