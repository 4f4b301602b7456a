//! Configuration loading from environment.
//!
//! Reads engine tuning from environment variables and supports replacing the
//! built-in pattern library with a JSON rule file.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MlrError, Result};
use crate::patterns::{
    default_pattern_configs, PatternConfig, PatternLibrary, BUILTIN_LIBRARY_VERSION,
};

/// Characters of context captured on each side of a claim.
pub const DEFAULT_CONTEXT_WINDOW: usize = 50;

/// Time budget for a single collaborator call.
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 2_000;

/// Lifetime of cached brand rule and guideline lookups.
pub const DEFAULT_PROVIDER_CACHE_TTL_SECS: u64 = 600;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Characters captured on each side of a match for `surroundingContext`.
    pub context_window_chars: usize,
    /// Run pattern scans and section checks on the rayon pool.
    pub parallel_scan: bool,
    /// Per-call timeout for brand rule and guideline collaborators.
    pub provider_timeout_ms: u64,
    /// TTL for the collaborator cache.
    pub provider_cache_ttl_secs: u64,
    /// Version tag reported with every result.
    pub library_version: String,
    /// Rules to compile into the pattern library.
    pub patterns: Vec<PatternConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_window_chars: DEFAULT_CONTEXT_WINDOW,
            parallel_scan: true,
            provider_timeout_ms: DEFAULT_PROVIDER_TIMEOUT_MS,
            provider_cache_ttl_secs: DEFAULT_PROVIDER_CACHE_TTL_SECS,
            library_version: BUILTIN_LIBRARY_VERSION.to_string(),
            patterns: default_pattern_configs(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `MLR_CONTEXT_WINDOW`: context characters per side (default: 50)
    /// - `MLR_PARALLEL_SCAN`: `true`/`false` (default: true)
    /// - `MLR_PROVIDER_TIMEOUT_MS`: collaborator timeout (default: 2000)
    /// - `MLR_PROVIDER_CACHE_TTL_SECS`: collaborator cache TTL (default: 600)
    /// - `MLR_PATTERNS_PATH`: JSON file with an array of pattern configs
    /// - `MLR_PATTERNS_VERSION`: version tag for a pattern file (default: file name)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let context_window_chars =
            parse_env("MLR_CONTEXT_WINDOW").unwrap_or(defaults.context_window_chars);
        let parallel_scan = parse_env("MLR_PARALLEL_SCAN").unwrap_or(defaults.parallel_scan);
        let provider_timeout_ms =
            parse_env("MLR_PROVIDER_TIMEOUT_MS").unwrap_or(defaults.provider_timeout_ms);
        let provider_cache_ttl_secs =
            parse_env("MLR_PROVIDER_CACHE_TTL_SECS").unwrap_or(defaults.provider_cache_ttl_secs);

        let (library_version, patterns) = match env::var("MLR_PATTERNS_PATH") {
            Ok(path) => {
                let patterns = load_patterns_from_file(Path::new(&path))?;
                let version = env::var("MLR_PATTERNS_VERSION").unwrap_or_else(|_| {
                    Path::new(&path)
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.clone())
                });
                (version, patterns)
            }
            Err(_) => (defaults.library_version, defaults.patterns),
        };

        Ok(Self {
            context_window_chars,
            parallel_scan,
            provider_timeout_ms,
            provider_cache_ttl_secs,
            library_version,
            patterns,
        })
    }

    /// Compile the configured patterns. Fails if any pattern is invalid.
    pub fn build_library(&self) -> Result<PatternLibrary> {
        PatternLibrary::from_configs(self.library_version.clone(), &self.patterns)
    }

    pub fn provider_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.provider_timeout_ms)
    }
}

/// Load patterns from a JSON file.
pub fn load_patterns_from_file(path: &Path) -> Result<Vec<PatternConfig>> {
    let content = fs::read_to_string(path)
        .map_err(|e| MlrError::Config(format!("Failed to read patterns file: {}", e)))?;

    serde_json::from_str(&content)
        .map_err(|e| MlrError::Config(format!("Failed to parse patterns file: {}", e)))
}

/// Parse an environment variable, ignoring unset or malformed values.
fn parse_env<T: std::str::FromStr>(var_name: &str) -> Option<T> {
    let raw = env::var(var_name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = var_name, value = %raw, "Ignoring malformed configuration value");
            None
        }
    }
}


#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any numeric value set in the environment is read back unchanged.
        #[test]
        fn prop_numeric_env_values_are_applied(value in 0u64..1_000_000) {
            use std::env;

            let var_name = format!("TEST_MLR_PROP_NUM_{}", rand::random::<u32>());
            env::set_var(&var_name, value.to_string());
            let parsed = super::parse_env::<u64>(&var_name);
            env::remove_var(&var_name);

            prop_assert_eq!(parsed, Some(value));
        }
    }
}
