//! # Configuration Management
//!
//! This module loads `departure-board.toml` and turns it into a validated
//! [`Config`]. The file is parsed into a raw serde structure first and then
//! checked field by field, so a bad stop list, an empty SSID, or a broken
//! direction pattern is reported once at boot with a message naming the
//! offending entry instead of surfacing mid-cycle.
//!
//! ```toml
//! stop_ids = ["900100003"]
//! text_cleanup_phrases = ["S+U ", " (Berlin)"]
//! max_fetch_duration_minutes = 50
//!
//! [network]
//! ssid = "home"
//! key = "secret"
//!
//! [[line_direction_rules]]
//! line_name = "M10"
//! direction_pattern = "Warschauer"
//! exception_pattern = "Nordbahnhof"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "departure-board.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid pattern {pattern:?} for line {line}: {source}")]
    Pattern {
        line: String,
        pattern: String,
        source: regex::Error,
    },
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    stop_ids: Vec<String>,
    #[serde(default)]
    line_direction_rules: Vec<RawRule>,
    #[serde(default)]
    text_cleanup_phrases: Vec<String>,
    network: NetworkCredentials,
    max_fetch_duration_minutes: u32,
    #[serde(default)]
    paths: PathsConfig,
    #[serde(default)]
    display: DisplayConfig,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    line_name: String,
    direction_pattern: String,
    exception_pattern: Option<String>,
}

/// Wi-Fi credentials.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct NetworkCredentials {
    pub ssid: String,
    #[serde(default)]
    pub key: String,
}

/// Which departures of a line to show. Patterns match from the start of
/// the direction text.
#[derive(Clone, Debug)]
pub struct LineDirectionRule {
    pub line_name: String,
    pub direction: Regex,
    pub exception: Option<Regex>,
}

impl LineDirectionRule {
    pub fn matches(&self, line_name: &str, direction: &str) -> bool {
        line_name == self.line_name
            && self.direction.is_match(direction)
            && !self
                .exception
                .as_ref()
                .is_some_and(|except| except.is_match(direction))
    }
}

/// Files the board reads and writes.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Durable state surviving deep sleep
    pub cache: PathBuf,
    /// Unhandled errors are appended here before a reset
    pub error_log: PathBuf,
    pub regular_font: PathBuf,
    pub condensed_font: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache: PathBuf::from("cache.json"),
            error_log: PathBuf::from("error.log"),
            regular_font: PathBuf::from("fonts/regular.json"),
            condensed_font: PathBuf::from("fonts/condensed.json"),
        }
    }
}

/// Panel geometry and where host builds put rendered frames.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub frame_output: PathBuf,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 800,  // Inkplate 6
            height: 600, // Inkplate 6
            frame_output: PathBuf::from("frame.pbm"),
        }
    }
}

/// Validated board configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub stop_ids: Vec<String>,
    pub line_direction_rules: Vec<LineDirectionRule>,
    pub text_cleanup_phrases: Vec<String>,
    pub network: NetworkCredentials,
    pub max_fetch_duration_minutes: u32,
    pub paths: PathsConfig,
    pub display: DisplayConfig,
}

impl Config {
    /// Load configuration from specified path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&contents)?;
        info!(
            "loaded configuration for {} stop(s), {} line rule(s)",
            config.stop_ids.len(),
            config.line_direction_rules.len()
        );
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents)?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.stop_ids.is_empty() {
            return Err(ConfigError::Invalid("stop_ids must not be empty".into()));
        }
        if let Some(blank) = raw.stop_ids.iter().position(|s| s.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("stop_ids[{blank}] is blank")));
        }
        if raw.network.ssid.is_empty() {
            return Err(ConfigError::Invalid("network.ssid must not be empty".into()));
        }
        if raw.max_fetch_duration_minutes == 0 {
            return Err(ConfigError::Invalid(
                "max_fetch_duration_minutes must be positive".into(),
            ));
        }
        if raw.display.width == 0 || raw.display.height == 0 {
            return Err(ConfigError::Invalid(
                "display width and height must be positive".into(),
            ));
        }
        if let Some(empty) = raw.text_cleanup_phrases.iter().position(|p| p.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "text_cleanup_phrases[{empty}] is empty"
            )));
        }

        let line_direction_rules = raw
            .line_direction_rules
            .into_iter()
            .map(compile_rule)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            stop_ids: raw.stop_ids,
            line_direction_rules,
            text_cleanup_phrases: raw.text_cleanup_phrases,
            network: raw.network,
            max_fetch_duration_minutes: raw.max_fetch_duration_minutes,
            paths: raw.paths,
            display: raw.display,
        })
    }
}

fn compile_rule(raw: RawRule) -> Result<LineDirectionRule, ConfigError> {
    if raw.line_name.is_empty() {
        return Err(ConfigError::Invalid(
            "line_direction_rules entry with empty line_name".into(),
        ));
    }

    let compile = |pattern: &str| {
        // anchored at the start, unanchored at the end
        Regex::new(&format!("^(?:{pattern})")).map_err(|source| ConfigError::Pattern {
            line: raw.line_name.clone(),
            pattern: pattern.to_string(),
            source,
        })
    };

    let direction = compile(&raw.direction_pattern)?;
    let exception = raw.exception_pattern.as_deref().map(compile).transpose()?;

    Ok(LineDirectionRule {
        line_name: raw.line_name,
        direction,
        exception,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
stop_ids = ["900100003", "900120005"]
text_cleanup_phrases = ["S+U ", " (Berlin)"]
max_fetch_duration_minutes = 50

[network]
ssid = "home"
key = "secret"

[[line_direction_rules]]
line_name = "M10"
direction_pattern = "S\\+U Warschauer"

[[line_direction_rules]]
line_name = "U8"
direction_pattern = "S\\+U Wittenau|Paracelsus"
exception_pattern = "Paracelsus-Bad"
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.stop_ids, vec!["900100003", "900120005"]);
        assert_eq!(config.network.ssid, "home");
        assert_eq!(config.max_fetch_duration_minutes, 50);
        assert_eq!(config.line_direction_rules.len(), 2);
        assert_eq!(config.paths.cache, PathBuf::from("cache.json"));
        assert_eq!(config.display.width, 800);
    }

    #[test]
    fn test_rules_match_from_start() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let m10 = &config.line_direction_rules[0];
        assert!(m10.matches("M10", "S+U Warschauer Str."));
        assert!(!m10.matches("M10", "Nordbahnhof via S+U Warschauer"));
        assert!(!m10.matches("M1", "S+U Warschauer Str."));
    }

    #[test]
    fn test_exception_pattern() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let u8 = &config.line_direction_rules[1];
        assert!(u8.matches("U8", "Paracelsus-Str."));
        assert!(!u8.matches("U8", "Paracelsus-Bad"));
        assert!(u8.matches("U8", "S+U Wittenau"));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let err = Config::from_toml("stop_ids = [\"1\"]\nmax_fetch_duration_minutes = 5\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("network"));
    }

    #[test]
    fn test_empty_stops_rejected() {
        let toml = SAMPLE.replace(r#"["900100003", "900120005"]"#, "[]");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("stop_ids"));
    }

    #[test]
    fn test_bad_pattern_names_line() {
        let toml = SAMPLE.replace(r#"S\\+U Warschauer"#, "(unclosed");
        match Config::from_toml(&toml).unwrap_err() {
            ConfigError::Pattern { line, .. } => assert_eq!(line, "M10"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = Config::from_toml(include_str!("../departure-board.toml")).unwrap();
        assert_eq!(config.stop_ids.len(), 2);
        assert!(config.line_direction_rules[1].matches("U2", "S+U Pankow"));
        assert!(!config.line_direction_rules[1].matches("U2", "Ruhleben"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let err = Config::load_from_path("/nonexistent/path").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
