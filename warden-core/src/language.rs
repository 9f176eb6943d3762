//! Interpreter languages supported by the execution pools.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A language with a dedicated interpreter pool.
///
/// The language of an execution context is fixed at creation and never
/// changes for the lifetime of the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
}

impl Language {
    /// All supported languages, in pool pre-warm order.
    pub const ALL: [Language; 3] = [Language::Python, Language::JavaScript, Language::TypeScript];

    /// The lowercase wire name (`python`, `javascript`, `typescript`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }

    /// Prefix used in environment variable overrides, e.g. `PYTHON_POOL_MIN_SIZE`.
    #[must_use]
    pub fn env_prefix(self) -> &'static str {
        match self {
            Language::Python => "PYTHON",
            Language::JavaScript => "JAVASCRIPT",
            Language::TypeScript => "TYPESCRIPT",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown language name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unsupported language '{0}'; expected python, javascript, or typescript")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Language::Python),
            "javascript" => Ok(Language::JavaScript),
            "typescript" => Ok(Language::TypeScript),
            other => Err(UnknownLanguage(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_round_trips_through_str() {
        for lang in Language::ALL {
            let parsed: Language = match lang.as_str().parse() {
                Ok(l) => l,
                Err(e) => panic!("failed to parse {lang}: {e}"),
            };
            assert_eq!(parsed, lang);
        }
    }

    #[test]
    fn language_rejects_unknown_name() {
        let err = "ruby".parse::<Language>();
        assert!(err.is_err(), "ruby is not a supported language");
    }

    #[test]
    fn language_serde_uses_lowercase() {
        let json = match serde_json::to_string(&Language::TypeScript) {
            Ok(s) => s,
            Err(e) => panic!("serialization failed: {e}"),
        };
        assert_eq!(json, "\"typescript\"");
    }
}
