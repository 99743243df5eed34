//! Configuration for lc.
//!
//! The configuration lives in `<config dir>/lc/config.yaml`.  Every key is
//! optional; missing keys take the defaults below.  The conversation history
//! is stored next to it in `conversation_memory.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default OpenAI-compatible base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model used when no override is given.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default number of turns (user + assistant pairs) kept in memory.
pub const DEFAULT_MAX_HISTORY: usize = 10;

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional Linux command-line assistant named lc. \
Your task is to answer users' questions about Linux commands, operations, and issues. \
Please follow these guidelines:

  1. Answer user questions directly, without using any Markdown formatting or text formatting (such as bold, italics, etc.).
  2. Keep answers concise and clear, suitable for display on a command-line interface.
  3. If the user provides command examples, carefully analyze and explain the role of each part.
  4. If errors or problems are encountered, provide possible causes and solutions.
  5. Use clear steps or numbered lists to explain complex processes.
  6. If you need to display code or commands, write them directly without using code block formatting.
  7. Avoid using emojis or other special characters that may display abnormally on the command line.
  8. If the user's question is unclear, politely request more information.
  9. Provide practical advice, including command best practices and security precautions.
  10. If the user requests an operation that may be risky, remind them of the potential consequences.
  11. Pay attention to the user's questions and requests, which are always in the Query. Please be sure to check them. The content in the Input is background or reference information.

  Remember, you must check the requirements in the received Query and the information in the Input, \
and your response will be displayed directly on the command-line interface, so keep the format simple and the content clear.";

const CONFIG_DIR_NAME: &str = "lc";
const CONFIG_FILE_NAME: &str = "config.yaml";
const MEMORY_FILE_NAME: &str = "conversation_memory.json";

/// Keys accepted by [`Config::set_value`].
pub const CONFIG_KEYS: &[&str] = &[
    "openai_api_key",
    "openai_base_url",
    "default_model",
    "system_prompt",
    "max_history",
    "use_system_prompt",
];

/// Resolved on-disk locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    dir: PathBuf,
}

impl Paths {
    /// Locate `<user config dir>/lc`.
    pub fn discover() -> Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| Error::config("Failed to determine config directory", None))?;
        Ok(Self::in_dir(base.join(CONFIG_DIR_NAME)))
    }

    /// Use an explicit directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The lc directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `config.yaml`.
    pub fn config_file(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE_NAME)
    }

    /// Path of the conversation history file.
    pub fn memory_file(&self) -> PathBuf {
        self.dir.join(MEMORY_FILE_NAME)
    }
}

/// User configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bearer token sent with every request.
    pub openai_api_key: String,

    /// Base URL of the OpenAI-compatible API.
    pub openai_base_url: String,

    /// Model used when no override is given.
    pub default_model: String,

    /// System prompt prepended to every request.
    pub system_prompt: String,

    /// History capacity in turns.
    pub max_history: usize,

    /// Whether the system prompt is sent at all.
    pub use_system_prompt: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_history: DEFAULT_MAX_HISTORY,
            use_system_prompt: true,
        }
    }
}

impl Config {
    /// Load the configuration at `path`.
    ///
    /// A missing file yields the defaults.  A file that cannot be parsed is
    /// reported with a warning and the defaults are used instead.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(Error::io(
                    format!("failed to read config file {}", path.display()),
                    err,
                ));
            }
        };
        Ok(Self::parse(&contents).unwrap_or_else(|err| {
            log::warn!("error loading config {}: {err}; using default configuration", path.display());
            Self::default()
        }))
    }

    /// Parse YAML configuration text.  An empty document yields the defaults.
    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Write the configuration to `path`, creating its directory.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                Error::io(
                    format!("failed to create config directory {}", parent.display()),
                    err,
                )
            })?;
        }
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml).map_err(|err| {
            Error::io(format!("failed to write config file {}", path.display()), err)
        })
    }

    /// Overwrite `path` with the default configuration.
    pub fn reset(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// Set one key from its textual value.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "openai_api_key" => self.openai_api_key = value.to_string(),
            "openai_base_url" => self.openai_base_url = value.to_string(),
            "default_model" => self.default_model = value.to_string(),
            "system_prompt" => self.system_prompt = value.to_string(),
            "max_history" => {
                self.max_history = value.trim().parse().map_err(|_| {
                    Error::config(
                        format!("max_history must be a non-negative integer, got {value:?}"),
                        Some(key.to_string()),
                    )
                })?;
            }
            "use_system_prompt" => {
                self.use_system_prompt = match value.trim() {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    _ => {
                        return Err(Error::config(
                            "use_system_prompt must be true/false or 1/0",
                            Some(key.to_string()),
                        ));
                    }
                };
            }
            _ => {
                return Err(Error::config(
                    format!(
                        "Unknown config key (valid keys: {})",
                        CONFIG_KEYS.join(", ")
                    ),
                    Some(key.to_string()),
                ));
            }
        }
        Ok(())
    }

    /// The API key, falling back to `OPENAI_API_KEY` when none is configured.
    pub fn api_key(&self) -> String {
        self.resolve_api_key(env_api_key())
    }

    fn resolve_api_key(&self, from_env: Option<String>) -> String {
        if self.openai_api_key.is_empty() {
            from_env.unwrap_or_default()
        } else {
            self.openai_api_key.clone()
        }
    }

    /// Human-readable summary; the API key is never shown.
    pub fn summary(&self) -> String {
        self.summary_with(env_api_key())
    }

    fn summary_with(&self, from_env: Option<String>) -> String {
        let api_key = if !self.openai_api_key.is_empty() {
            "[HIDDEN]".to_string()
        } else if from_env.is_some() {
            format!("[HIDDEN] (from {API_KEY_ENV})")
        } else {
            "[NOT SET]".to_string()
        };
        let system_prompt = if self.system_prompt.chars().count() > 50 {
            let head: String = self.system_prompt.chars().take(47).collect();
            format!("{head}...")
        } else {
            self.system_prompt.clone()
        };
        format!(
            "Current Configuration:\n  \
             openai_api_key: {api_key}\n  \
             openai_base_url: {}\n  \
             default_model: {}\n  \
             max_history: {}\n  \
             use_system_prompt: {}\n  \
             system_prompt: {system_prompt}\n",
            self.openai_base_url, self.default_model, self.max_history, self.use_system_prompt,
        )
    }
}

/// A non-empty `OPENAI_API_KEY` from the environment.
fn env_api_key() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty())
}

/// Split a `key=value` argument at the first `=`.
pub fn parse_assignment(arg: &str) -> Result<(&str, &str)> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(Error::config(
            "Invalid set format. Use: --set key=value",
            None,
        )),
    }
}
