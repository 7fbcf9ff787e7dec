//! Tweaker Configuration Management
//!
//! Loads `tweaker.cfg`, a plain `key = value` file:
//!
//! ```text
//! # where the scripts live
//! scriptsdir = scripts
//! execute = true
//! debug = false
//! ignorebracketerrors = legacy.zs, oldpack/items.zs
//! brackets = item, liquid, ore
//! loader = tweaker
//! loglevel = info
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tweaker_core::{BuildSettings, Result, TweakerError};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_FILE: &str = "tweaker.cfg";

/// Complete tweaker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TweakerConfig {
    /// Script root directories (from "scriptsdir" option, comma separated)
    pub scripts_dirs: Vec<PathBuf>,
    /// Run compiled groups (from "execute" option)
    pub execute: bool,
    /// Emit debug artifacts (from "debug" option)
    pub debug: bool,
    /// Units whose bracket errors are tolerated (from "ignorebracketerrors" option)
    pub ignore_bracket_errors: Vec<String>,
    /// Bracket namespaces resolved by the script environment (from "brackets" option)
    pub bracket_namespaces: Vec<String>,
    /// Loader name matched against `#loader` directives (from "loader" option)
    pub loader: String,
    /// Default log filter (from "loglevel" option)
    pub log_level: String,
}

impl Default for TweakerConfig {
    fn default() -> Self {
        Self {
            scripts_dirs: vec![PathBuf::from("scripts")],
            execute: true,
            debug: false,
            ignore_bracket_errors: vec![],
            bracket_namespaces: vec!["item".into(), "liquid".into(), "ore".into()],
            loader: "tweaker".into(),
            log_level: "info".into(),
        }
    }
}

impl TweakerConfig {
    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            TweakerError::Config(format!("could not read {}: {}", path.display(), e))
        })?;
        Ok(Self::parse(&content))
    }

    /// Load `tweaker.cfg` from the working directory, or the defaults when
    /// it does not exist
    pub fn load_default() -> Result<Self> {
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::load_from_file(DEFAULT_CONFIG_FILE)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration file content
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                config.parse_option(key.trim(), value.trim());
            }
        }

        config
    }

    fn parse_option(&mut self, key: &str, value: &str) {
        match key.to_ascii_lowercase().as_str() {
            "scriptsdir" => {
                self.scripts_dirs = split_list(value).into_iter().map(PathBuf::from).collect();
            }
            "execute" => self.execute = parse_bool(key, value, true),
            "debug" => self.debug = parse_bool(key, value, false),
            "ignorebracketerrors" => self.ignore_bracket_errors = split_list(value),
            "brackets" => self.bracket_namespaces = split_list(value),
            "loader" if !value.is_empty() => self.loader = value.into(),
            "loglevel" if !value.is_empty() => self.log_level = value.into(),
            _ => {
                tracing::debug!("Unknown config option: {} = {}", key, value);
            }
        }
    }

    /// Build settings handed to the orchestrator
    pub fn build_settings(&self) -> BuildSettings {
        let mut settings = BuildSettings::new();
        if self.debug {
            settings.enable_debug();
        }
        for unit in &self.ignore_bracket_errors {
            settings.suppress_bracket_errors(unit.clone());
        }
        settings
    }

    /// Display configuration summary
    pub fn display(&self) {
        tracing::info!("Tweaker configuration:");
        for dir in &self.scripts_dirs {
            tracing::info!("  Scripts: {}", dir.display());
        }
        tracing::info!("  Execute: {}", self.execute);
        tracing::info!("  Debug: {}", self.debug);
        tracing::info!("  Loader: {}", self.loader);
        tracing::info!("  Bracket namespaces: {}", self.bracket_namespaces.join(", "));
        if !self.ignore_bracket_errors.is_empty() {
            tracing::info!(
                "  Ignoring bracket errors in: {}",
                self.ignore_bracket_errors.join(", ")
            );
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(key: &str, value: &str, default: bool) -> bool {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => true,
        "false" | "no" | "off" | "0" => false,
        _ => {
            tracing::warn!("Invalid value for {}: {} (using {})", key, value, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TweakerConfig::default();
        assert_eq!(config.scripts_dirs, vec![PathBuf::from("scripts")]);
        assert!(config.execute);
        assert!(!config.debug);
        assert_eq!(config.loader, "tweaker");
    }

    #[test]
    fn test_parse_simple_config() {
        let config_text = r#"
# comment
scriptsdir = scripts, packs/extra
execute = no
debug = true
ignorebracketerrors = a.zs, sub/b.zs,
brackets = item
loader = preinit
"#;
        let config = TweakerConfig::parse(config_text);
        assert_eq!(
            config.scripts_dirs,
            vec![PathBuf::from("scripts"), PathBuf::from("packs/extra")]
        );
        assert!(!config.execute);
        assert!(config.debug);
        assert_eq!(config.ignore_bracket_errors, vec!["a.zs", "sub/b.zs"]);
        assert_eq!(config.bracket_namespaces, vec!["item"]);
        assert_eq!(config.loader, "preinit");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = TweakerConfig::parse("execute = maybe\nloader =\nunknown = 1\nnot a pair");
        assert_eq!(config, TweakerConfig::default());
    }

    #[test]
    fn test_build_settings() {
        let config = TweakerConfig::parse("debug = on\nignorebracketerrors = x.zs");
        let settings = config.build_settings();
        assert!(settings.debug());
        assert!(settings.ignores_bracket_errors("x.zs"));
        assert!(!settings.ignores_bracket_errors("y.zs"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tweaker.cfg");
        fs::write(&path, "loglevel = debug\n").unwrap();

        let config = TweakerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.log_level, "debug");

        let missing = TweakerConfig::load_from_file(dir.path().join("missing.cfg"));
        assert!(matches!(missing, Err(TweakerError::Config(_))));
    }
}
