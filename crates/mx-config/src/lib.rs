//! # mx-config
//!
//! Options management for mx.
//!
//! Loads options from:
//! 1. `~/.mx/config.toml` (global)
//! 2. `.mx/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! Command-line flags are layered on top by the binary. There is no global
//! instance: the loaded [`Options`] is handed to whoever owns the process
//! lifecycle.

pub mod logging;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variables consulted by [`Options::apply_env_overrides`].
pub const ENV_QUIET: &str = "MX_QUIET";
pub const ENV_VERBOSE: &str = "MX_VERBOSE";
pub const ENV_VERY_VERBOSE: &str = "MX_VERY_VERBOSE";
pub const ENV_WARN: &str = "MX_WARN";
pub const ENV_CPU_COUNT: &str = "MX_CPU_COUNT";
pub const ENV_KILL_WITH_SIGQUIT: &str = "MX_KILL_WITH_SIGQUIT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Process-wide options record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Suppress all normal output
    pub quiet: bool,
    /// Enable verbose output
    pub verbose: bool,
    /// Enable very verbose output (implies `verbose`)
    pub very_verbose: bool,
    /// Emit warnings
    pub warn: bool,
    /// Upper bound on the number of CPUs to use (None = all)
    pub cpu_count: Option<usize>,
    /// Send SIGQUIT to Java subprocesses before tearing them down on abort
    pub kill_with_sigquit: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            quiet: false,
            verbose: false,
            very_verbose: false,
            warn: true,
            cpu_count: None,
            kill_with_sigquit: false,
        }
    }
}

/// One layer of a config file. Only fields present in the file override
/// the layer below.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OptionsLayer {
    quiet: Option<bool>,
    verbose: Option<bool>,
    very_verbose: Option<bool>,
    warn: Option<bool>,
    cpu_count: Option<usize>,
    kill_with_sigquit: Option<bool>,
}

impl OptionsLayer {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply(self, options: &mut Options) {
        if let Some(v) = self.quiet {
            options.quiet = v;
        }
        if let Some(v) = self.verbose {
            options.verbose = v;
        }
        if let Some(v) = self.very_verbose {
            options.very_verbose = v;
        }
        if let Some(v) = self.warn {
            options.warn = v;
        }
        if let Some(v) = self.cpu_count {
            options.cpu_count = Some(v);
        }
        if let Some(v) = self.kill_with_sigquit {
            options.kill_with_sigquit = v;
        }
    }
}

impl Options {
    /// Load options from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let mut options = Self::load_from(global.as_deref(), &Self::project_config_path())?;
        options.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(options.normalized())
    }

    /// Load the two file layers. Missing files are skipped.
    pub fn load_from(global: Option<&Path>, project: &Path) -> Result<Self, ConfigError> {
        let mut options = Options::default();

        // 1. Global config (~/.mx/config.toml)
        if let Some(global_path) = global {
            if global_path.exists() {
                debug!("Loading global options from {:?}", global_path);
                OptionsLayer::read(global_path)?.apply(&mut options);
            }
        }

        // 2. Project config (.mx/config.toml) - overrides global
        if project.exists() {
            debug!("Loading project options from {:?}", project);
            OptionsLayer::read(project)?.apply(&mut options);
        }

        Ok(options.normalized())
    }

    /// Global config path: ~/.mx/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".mx/config.toml"))
    }

    /// Project config path: .mx/config.toml
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".mx/config.toml")
    }

    /// Apply environment variable overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let flag = |key: &str| lookup(key).and_then(|v| parse_flag(&v));

        if let Some(v) = flag(ENV_QUIET) {
            self.quiet = v;
        }
        if let Some(v) = flag(ENV_VERBOSE) {
            self.verbose = v;
        }
        if let Some(v) = flag(ENV_VERY_VERBOSE) {
            self.very_verbose = v;
        }
        if let Some(v) = flag(ENV_WARN) {
            self.warn = v;
        }
        if let Some(v) = flag(ENV_KILL_WITH_SIGQUIT) {
            self.kill_with_sigquit = v;
        }
        if let Some(count) = lookup(ENV_CPU_COUNT) {
            match count.trim().parse() {
                Ok(n) => self.cpu_count = Some(n),
                Err(_) => debug!("Ignoring invalid {}={:?}", ENV_CPU_COUNT, count),
            }
        }
    }

    /// Very verbose implies verbose.
    pub fn normalized(mut self) -> Self {
        if self.very_verbose {
            self.verbose = true;
        }
        self
    }

    /// Generate default options TOML string
    pub fn default_toml() -> String {
        Options::default().to_toml()
    }

    /// Render these options as TOML
    pub fn to_toml(&self) -> String {
        // A flat struct of bools and an optional integer always serializes.
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Parse a boolean flag from an environment value.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_options() {
        let options = Options::default();
        assert!(!options.quiet);
        assert!(!options.verbose);
        assert!(options.warn);
        assert_eq!(options.cpu_count, None);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Options::default_toml();
        assert!(toml_str.contains("quiet = false"));
        assert!(toml_str.contains("warn = true"));
        assert!(!toml_str.contains("cpu_count"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_VERBOSE, "yes"),
            (ENV_WARN, "0"),
            (ENV_CPU_COUNT, "3"),
            (ENV_KILL_WITH_SIGQUIT, "maybe"),
        ]
        .into_iter()
        .collect();

        let mut options = Options::default();
        options.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert!(options.verbose);
        assert!(!options.warn);
        assert_eq!(options.cpu_count, Some(3));
        // unparseable flags leave the value alone
        assert!(!options.kill_with_sigquit);
    }

    #[test]
    fn test_invalid_cpu_count_is_ignored() {
        let mut options = Options::default();
        options.apply_env_overrides(|k| (k == ENV_CPU_COUNT).then(|| "lots".to_string()));
        assert_eq!(options.cpu_count, None);
    }

    #[test]
    fn test_very_verbose_implies_verbose() {
        let options = Options {
            very_verbose: true,
            ..Options::default()
        }
        .normalized();
        assert!(options.verbose);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("2"), None);
    }
}
