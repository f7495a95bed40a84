//! braid configuration (`braid.toml`).
//!
//! Typed configuration for embedders, parsed from TOML. Missing fields use
//! sensible defaults; a missing file is all defaults (no error).
//!
//! ```toml
//! [merge]
//! max_parallel = 8
//! batch_timeout_secs = 300
//! escalation = true
//!
//! [analyzer]
//! languages = ["rust", "python", "typescript", "javascript", "go"]
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::analyze::{ALL_LANGUAGES, SemanticAnalyzer, SourceLanguage};
use crate::merge::runner::RunnerLimits;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level braid configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BraidConfig {
    /// Merge runner settings.
    #[serde(default)]
    pub merge: MergeSettings,

    /// Semantic analyzer settings.
    #[serde(default)]
    pub analyzer: AnalyzerSettings,
}

impl BraidConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError {
            path: Some(path.to_path_buf()),
            message: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError {
            path: Some(path.to_path_buf()),
            message: e.to_string(),
        })
    }

    /// Runner limits derived from the merge settings.
    #[must_use]
    pub const fn runner_limits(&self) -> RunnerLimits {
        RunnerLimits {
            max_parallel: self.merge.max_parallel,
            batch_timeout: Duration::from_secs(self.merge.batch_timeout_secs),
        }
    }

    /// An analyzer restricted to the configured languages.
    #[must_use]
    pub fn semantic_analyzer(&self) -> SemanticAnalyzer {
        SemanticAnalyzer::with_languages(
            self.analyzer
                .languages
                .iter()
                .copied()
                .map(SourceLanguage::from)
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// MergeSettings
// ---------------------------------------------------------------------------

/// Merge runner behaviour.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeSettings {
    /// Maximum concurrent per-file merge attempts (default: 8).
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Wall-clock deadline for a whole merge batch, in seconds
    /// (default: 300).
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,

    /// Whether conflicting files may escalate to the external resolver
    /// (default: true). When disabled, conflicts fail per file instead.
    #[serde(default = "default_escalation")]
    pub escalation: bool,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            batch_timeout_secs: default_batch_timeout_secs(),
            escalation: default_escalation(),
        }
    }
}

const fn default_max_parallel() -> usize {
    8
}

const fn default_batch_timeout_secs() -> u64 {
    300
}

const fn default_escalation() -> bool {
    true
}

// ---------------------------------------------------------------------------
// AnalyzerSettings
// ---------------------------------------------------------------------------

/// Semantic analyzer language selection.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzerSettings {
    /// Languages the analyzer handles. Files outside the set analyze to
    /// zero changes.
    #[serde(default = "default_languages")]
    pub languages: Vec<ConfigLanguage>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            languages: default_languages(),
        }
    }
}

fn default_languages() -> Vec<ConfigLanguage> {
    ALL_LANGUAGES.iter().copied().map(Into::into).collect()
}

/// TOML-facing language name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigLanguage {
    Rust,
    Python,
    Typescript,
    Javascript,
    Go,
}

impl From<ConfigLanguage> for SourceLanguage {
    fn from(lang: ConfigLanguage) -> Self {
        match lang {
            ConfigLanguage::Rust => Self::Rust,
            ConfigLanguage::Python => Self::Python,
            ConfigLanguage::Typescript => Self::TypeScript,
            ConfigLanguage::Javascript => Self::JavaScript,
            ConfigLanguage::Go => Self::Go,
        }
    }
}

impl From<SourceLanguage> for ConfigLanguage {
    fn from(lang: SourceLanguage) -> Self {
        match lang {
            SourceLanguage::Rust => Self::Rust,
            SourceLanguage::Python => Self::Python,
            SourceLanguage::TypeScript => Self::Typescript,
            SourceLanguage::JavaScript => Self::Javascript,
            SourceLanguage::Go => Self::Go,
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration file could not be loaded or parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    /// Path of the offending file, when known.
    pub path: Option<PathBuf>,
    /// Human-readable description of the problem.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "config error in '{}': {}", path.display(), self.message),
            None => write!(f, "config error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let config = BraidConfig::load_from(Path::new("/nonexistent/braid.toml")).unwrap();
        assert_eq!(config.merge.max_parallel, 8);
        assert_eq!(config.merge.batch_timeout_secs, 300);
        assert!(config.merge.escalation);
        assert_eq!(config.analyzer.languages.len(), 5);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: BraidConfig = toml::from_str(
            r#"
            [merge]
            max_parallel = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.merge.max_parallel, 2);
        assert_eq!(config.merge.batch_timeout_secs, 300);
        assert!(config.merge.escalation);
    }

    #[test]
    fn languages_parse_kebab_case() {
        let config: BraidConfig = toml::from_str(
            r#"
            [analyzer]
            languages = ["rust", "typescript"]
            "#,
        )
        .unwrap();
        assert_eq!(
            config.analyzer.languages,
            vec![ConfigLanguage::Rust, ConfigLanguage::Typescript]
        );
        let analyzer = config.semantic_analyzer();
        assert!(analyzer.is_supported(Path::new("a.rs")));
        assert!(!analyzer.is_supported(Path::new("a.py")));
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<BraidConfig, _> = toml::from_str(
            r#"
            [merge]
            max_parallell = 4
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn runner_limits_conversion() {
        let config: BraidConfig = toml::from_str(
            r#"
            [merge]
            max_parallel = 3
            batch_timeout_secs = 10
            "#,
        )
        .unwrap();
        let limits = config.runner_limits();
        assert_eq!(limits.max_parallel, 3);
        assert_eq!(limits.batch_timeout, Duration::from_secs(10));
    }

    #[test]
    fn parse_error_names_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("braid.toml");
        std::fs::write(&path, "not [valid toml").expect("write");
        let err = BraidConfig::load_from(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(format!("{err}").contains("braid.toml"));
    }
}
