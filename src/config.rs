use clap::Parser;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const APP_DIR: &str = "session-beacon";

/// Course ids end up as a URL path segment
static RE_COURSE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No course id given. Pass --course or set course_id in the config file.")]
    MissingCourse,

    #[error("Invalid course id '{0}': only letters, digits, '-' and '_' are allowed")]
    InvalidCourse(String),

    #[error("No session source. Pass --api or --file.")]
    MissingSource,
}

/// Command line flags; each one falls back to an environment variable
#[derive(Debug, Parser, Default)]
#[command(name = "session-beacon", version, about = "Shows the live, upcoming or recent session of a course")]
pub struct Cli {
    /// Course to watch
    #[arg(long = "course", env = "SESSION_BEACON_COURSE")]
    pub course_id: Option<String>,

    /// Base URL of the platform API, e.g. https://lms.example.com/api
    #[arg(long = "api", env = "SESSION_BEACON_API")]
    pub api_base_url: Option<String>,

    /// Bearer token for the API
    #[arg(long, env = "SESSION_BEACON_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Read sessions from a JSON file instead of the API
    #[arg(long = "file", env = "SESSION_BEACON_FILE")]
    pub sessions_file: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long, env = "SESSION_BEACON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the current evaluation as JSON and exit
    #[arg(long)]
    pub once: bool,

    /// Evaluate at this RFC 3339 instant instead of now
    #[arg(long, value_parser = parse_instant)]
    pub at: Option<chrono::DateTime<chrono::Utc>>,
}

fn parse_instant(s: &str) -> Result<chrono::DateTime<chrono::Utc>, String> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

/// Settings stored on disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub course_id: Option<String>,
    pub token: Option<String>,
    pub sessions_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

/// Where sessions come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSource {
    Api { base_url: String, token: Option<String> },
    File(PathBuf),
}

/// Validated runtime settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub course_id: String,
    pub source: SessionSource,
    pub log_file: PathBuf,
}

/// Returns the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.json"))
}

/// Returns the default log file location
pub fn default_log_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("session-beacon.log")
}

impl Config {
    /// Loads a config file, returning defaults if it is missing or unreadable
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring malformed config file");
                    Self::default()
                }
            },
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no config file");
                Self::default()
            }
        }
    }

    /// Command line values win over file values
    pub fn merge(mut self, cli: &Cli) -> Self {
        if cli.course_id.is_some() {
            self.course_id = cli.course_id.clone();
        }
        if cli.api_base_url.is_some() {
            self.api_base_url = cli.api_base_url.clone();
        }
        if cli.token.is_some() {
            self.token = cli.token.clone();
        }
        if cli.sessions_file.is_some() {
            self.sessions_file = cli.sessions_file.clone();
        }
        self
    }

    /// A sessions file takes precedence over the API when both are set
    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        let course_id = self
            .course_id
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(ConfigError::MissingCourse)?;
        if !RE_COURSE_ID.is_match(&course_id) {
            return Err(ConfigError::InvalidCourse(course_id));
        }

        let source = match (self.sessions_file, self.api_base_url) {
            (Some(path), _) => SessionSource::File(path),
            (None, Some(base_url)) if !base_url.trim().is_empty() => SessionSource::Api {
                base_url,
                token: self.token.filter(|t| !t.is_empty()),
            },
            _ => return Err(ConfigError::MissingSource),
        };

        Ok(Settings {
            course_id,
            source,
            log_file: self.log_file.unwrap_or_else(default_log_path),
        })
    }
}
