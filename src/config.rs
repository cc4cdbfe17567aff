//! Configuration system for the offload engine
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (OFFLOAD_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Execution pool and task retention settings
    pub engine: EngineSettings,

    /// C interpreter settings
    pub interpreter: InterpreterSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Execution pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Maximum concurrently running async tasks (0 = number of CPUs)
    pub max_concurrent_tasks: usize,

    /// Finished tasks kept for polling before the oldest is evicted
    pub max_finished_tasks: usize,

    /// Recent executions kept for the metrics view (0 = disabled)
    pub call_log_size: usize,
}

/// C interpreter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterSettings {
    /// Interpreter binary; the synthesized program is piped to it
    pub command: String,

    /// Extra arguments passed to the interpreter
    #[serde(default)]
    pub args: Vec<String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            interpreter: InterpreterSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 0, // Auto-detect
            max_finished_tasks: 256,
            call_log_size: 256,
        }
    }
}

impl Default for InterpreterSettings {
    fn default() -> Self {
        Self {
            command: "cling".to_string(),
            args: vec![],
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl EngineSettings {
    /// The pool size after resolving the auto-detect sentinel
    pub fn effective_concurrency(&self) -> usize {
        if self.max_concurrent_tasks == 0 {
            num_cpus::get()
        } else {
            self.max_concurrent_tasks
        }
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        let config_file = Self::find_config_file(config_path)?;
        if let Some(path) = config_file {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: format!("{}: {}", path.display(), e),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let expanded = shellexpand::tilde(path);
            let path = PathBuf::from(expanded.as_ref());
            if path.exists() {
                return Ok(Some(path));
            } else {
                return Err(Error::config_not_found(path));
            }
        }

        // OFFLOAD_CONFIG points at a file directly
        if let Ok(env_path) = std::env::var("OFFLOAD_CONFIG") {
            let expanded = shellexpand::tilde(&env_path);
            let path = PathBuf::from(expanded.as_ref());
            if path.exists() {
                return Ok(Some(path));
            } else {
                return Err(Error::config_not_found(path));
            }
        }

        // Search in standard locations
        let search_paths = [
            // Current directory
            PathBuf::from("offload-engine.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("offload-engine").join("config.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".offload-engine").join("config.toml"))
                .unwrap_or_default(),
            // System config (Linux)
            PathBuf::from("/etc/offload-engine/config.toml"),
        ];

        for path in &search_paths {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Engine settings
        if let Ok(val) = std::env::var("OFFLOAD_MAX_CONCURRENT_TASKS") {
            if let Ok(n) = val.parse() {
                self.engine.max_concurrent_tasks = n;
            }
        }
        if let Ok(val) = std::env::var("OFFLOAD_MAX_FINISHED_TASKS") {
            if let Ok(n) = val.parse() {
                self.engine.max_finished_tasks = n;
            }
        }
        if let Ok(val) = std::env::var("OFFLOAD_CALL_LOG_SIZE") {
            if let Ok(n) = val.parse() {
                self.engine.call_log_size = n;
            }
        }

        // Interpreter settings
        if let Ok(val) = std::env::var("OFFLOAD_INTERPRETER") {
            self.interpreter.command = val;
        }
        if let Ok(val) = std::env::var("OFFLOAD_INTERPRETER_ARGS") {
            self.interpreter.args = val.split_whitespace().map(String::from).collect();
        }

        // Logging settings
        if let Ok(val) = std::env::var("OFFLOAD_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("OFFLOAD_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("OFFLOAD_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        self.interpreter.command = expand_path(&self.interpreter.command);

        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.interpreter.command.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "interpreter.command",
                "interpreter command cannot be empty",
            ));
        }

        if self.engine.max_finished_tasks == 0 {
            return Err(Error::config_field_invalid(
                "engine.max_finished_tasks",
                "at least one finished task must be retained for polling",
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<()> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".offload-engine")
                .join("config.toml")
        });

    // Check if file exists
    if config_path.exists() && !force {
        return Err(Error::config_validation(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    // Create parent directories
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    // Generate default config with comments
    let config_content = generate_default_config();

    // Write the file
    fs::write(&config_path, config_content).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    println!("Configuration file created: {}", config_path.display());
    Ok(())
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# Offload Engine Configuration
# https://github.com/cognit/offload-engine

[engine]
# Maximum concurrently running async tasks (0 = number of CPUs)
max_concurrent_tasks = 0

# Finished tasks kept for polling before the oldest is evicted
max_finished_tasks = 256

# Recent executions kept for the metrics view (0 = disabled)
call_log_size = 256

[interpreter]
# Interpreter binary; the synthesized C program is piped to its stdin
command = "cling"

# Extra arguments passed to the interpreter
args = []

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.offload-engine/logs/engine.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
