//! Startup configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dungeon_dispatch::DispatcherConfig;
use dungeon_session::domain::state_machine::{DEFAULT_MAX_HISTORY, StorySettings};

use crate::error::AppError;

/// Everything the server needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// The only room name commands are accepted from.
    pub channel: String,
    /// Role required for admin commands.
    pub admin_role: String,
    /// Bound on a single generation call.
    pub generation_timeout: Duration,
    /// Shell command that runs one generation job.
    pub engine_command: String,
    /// Opening context for new stories.
    pub story_context: String,
    /// Where saved stories are written.
    pub storage_dir: PathBuf,
    /// Whether stories may be saved and loaded.
    pub upload_enabled: bool,
    /// Recent turns included in each generation prompt.
    pub max_history: usize,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is missing or malformed.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is missing or malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let engine_command = lookup("DUNGEON_ENGINE_CMD")
            .filter(|cmd| !cmd.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config("DUNGEON_ENGINE_CMD environment variable must be set".into())
            })?;

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&lookup, "PORT", 3000)?,
            channel: lookup("DUNGEON_CHANNEL").unwrap_or_else(|| "active-investigations".into()),
            admin_role: lookup("DUNGEON_ADMIN_ROLE").unwrap_or_else(|| "chief".into()),
            generation_timeout: Duration::from_secs(parsed(&lookup, "DUNGEON_TIMEOUT_SECS", 180)?),
            engine_command,
            story_context: lookup("DUNGEON_STORY_CONTEXT").unwrap_or_default(),
            storage_dir: lookup("DUNGEON_STORAGE_DIR")
                .map_or_else(|| PathBuf::from("./saves"), PathBuf::from),
            upload_enabled: match lookup("DUNGEON_UPLOADS") {
                Some(raw) => parse_flag("DUNGEON_UPLOADS", &raw)?,
                None => true,
            },
            max_history: parsed(&lookup, "DUNGEON_MAX_HISTORY", DEFAULT_MAX_HISTORY)?,
        })
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `host` and `port` do not form one.
    pub fn addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }

    /// Dispatcher tunables derived from this configuration.
    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            generation_timeout: self.generation_timeout,
            story: StorySettings {
                context: self.story_context.clone(),
                upload_enabled: self.upload_enabled,
                max_history: self.max_history,
            },
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} must be a valid number: {e}"))),
        None => Ok(default),
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::Config(format!("{key} must be true or false, got {other:?}"))),
    }
}
