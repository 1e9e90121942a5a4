use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Errors that can occur when loading configuration or credentials.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

/// One configured chat command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommandSpec {
    /// Literal token the first word of a message must match.
    #[serde(rename = "command", default)]
    pub trigger: String,
    #[serde(rename = "case-insensitive", default)]
    pub case_insensitive: bool,
    /// Callers allowed to run the command. Empty means everyone.
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub executable: String,
    /// Argument template; `$name` and `$message` are substituted per call.
    #[serde(default)]
    pub args: Vec<String>,
    /// Relay captured stdout back to the channel.
    #[serde(default)]
    pub output: bool,
    /// Reload the configuration instead of running a program.
    #[serde(rename = "reloadConfig", default)]
    pub reload_config: bool,
    /// Seconds between successful invocations. Zero or negative disables it.
    #[serde(rename = "timeout", default)]
    pub cooldown_secs: i64,
}

impl CommandSpec {
    /// Whether `token` selects this command.
    pub fn matches(&self, token: &str) -> bool {
        self.trigger == token
            || (self.case_insensitive && self.trigger.to_lowercase() == token.to_lowercase())
    }
}

/// Channels to join and commands to serve, loaded once per session epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Config = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (i, command) in self.commands.iter().enumerate() {
            if command.trigger.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "commands[{i}]: \"command\" must not be empty"
                )));
            }
            // An empty executable surfaces as a spawn error when the command runs.
            if !command.reload_config && command.executable.is_empty() {
                warn!("commands[{i}] ({}): no \"executable\", it will fail when used", command.trigger);
            }
        }
        Ok(())
    }
}

/// Chat login, read from the credential file.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let credentials: Credentials = read_json(path.as_ref())?;
        if credentials.username.is_empty() {
            return Err(ConfigError::Validation("username is required".into()));
        }
        if credentials.password.is_empty() {
            return Err(ConfigError::Validation("password is required".into()));
        }
        Ok(credentials)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadFile { path: path.to_path_buf(), source: e })?;
    serde_json::from_str(&content)
        .map_err(|e| ConfigError::ParseJson { path: path.to_path_buf(), source: e })
}
