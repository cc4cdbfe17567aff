//! Error types for the offload engine
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Error context and chaining
//! - Exit codes for CLI and status codes for the ingress

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Request errors (3xx)
    DecodeFailed = 300,
    UnsupportedLanguage = 301,
    NotCallable = 302,

    // Execution errors (4xx)
    SignatureMismatch = 400,
    SubprocessFailed = 401,
    ResultParseFailed = 402,
    ExecutionFailed = 403,

    // Task errors (5xx)
    TaskNotFound = 500,
    TaskFailed = 501,

    // Internal errors (9xx)
    InternalError = 900,
    SerializationError = 901,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Request errors
            400..=499 => 40, // Execution errors
            500..=599 => 50, // Task errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    // ─────────────────────────────────────────────────────────────
    // Request Errors (rejected before any executor runs)
    // ─────────────────────────────────────────────────────────────

    /// Payload decode error
    #[error("Failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    /// Requested language is not supported
    #[error("Unsupported language: {lang}. Supported languages: PY, C")]
    UnsupportedLanguage { lang: String },

    /// Decoded PY payload is not a callable closure
    #[error("Decoded function is not callable: got {got}")]
    NotCallable { got: String },

    // ─────────────────────────────────────────────────────────────
    // Execution Errors (captured into the execution record)
    // ─────────────────────────────────────────────────────────────

    /// Request params do not match the function signature
    #[error("Signature mismatch: {message}")]
    SignatureMismatch { message: String },

    /// C interpreter subprocess failed
    #[error("Interpreter subprocess failed: {message}")]
    Subprocess {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Interpreter output could not be parsed as the declared OUT type
    #[error("Failed to parse interpreter result: {message}")]
    ResultParse { message: String },

    /// Generic execution error (closure evaluation failures land here)
    #[error("Execution error: {0}")]
    Execution(String),

    // ─────────────────────────────────────────────────────────────
    // Task Errors
    // ─────────────────────────────────────────────────────────────

    /// Task id is unknown (never submitted, or evicted)
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// Task infrastructure failure (worker panic, pool shut down)
    #[error("Task {task_id} failed: {message}")]
    TaskFailed { task_id: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Value serialization error
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization {
            message: e.to_string(),
        }
    }
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,

            Error::Decode { .. } => ErrorCode::DecodeFailed,
            Error::UnsupportedLanguage { .. } => ErrorCode::UnsupportedLanguage,
            Error::NotCallable { .. } => ErrorCode::NotCallable,

            Error::SignatureMismatch { .. } => ErrorCode::SignatureMismatch,
            Error::Subprocess { .. } => ErrorCode::SubprocessFailed,
            Error::ResultParse { .. } => ErrorCode::ResultParseFailed,
            Error::Execution(_) => ErrorCode::ExecutionFailed,

            Error::TaskNotFound { .. } => ErrorCode::TaskNotFound,
            Error::TaskFailed { .. } => ErrorCode::TaskFailed,

            Error::Serialization { .. } => ErrorCode::SerializationError,
            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::IoRead { .. }
                | Error::IoWrite { .. }
                | Error::Subprocess { .. }
        )
    }

    /// Check if the error is fatal (engine should exit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::Internal(_)
        )
    }

    /// Status code for an ingress reply carrying this error
    ///
    /// Request errors are the client's fault (400), unknown task ids map
    /// to 404, everything else is an engine-side failure (500).
    pub fn ingress_code(&self) -> u16 {
        match self.code() {
            ErrorCode::DecodeFailed
            | ErrorCode::UnsupportedLanguage
            | ErrorCode::NotCallable => 400,
            ErrorCode::TaskNotFound => 404,
            _ => 500,
        }
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'offload-engine config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'offload-engine config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values. See documentation for valid options."
            ),

            Error::Decode { .. } => Some(
                "Payloads must be base64 over the engine's canonical value form. Re-serialize on the client side."
            ),
            Error::UnsupportedLanguage { .. } => Some(
                "Check the 'lang' field of the request. Only PY and C executors are available."
            ),
            Error::NotCallable { .. } => Some(
                "The PY payload decoded to a plain value. Serialize a closure, not its result."
            ),

            Error::SignatureMismatch { .. } => Some(
                "Each param descriptor must match the function signature on type, name and IN/OUT mode."
            ),
            Error::Subprocess { .. } => Some(
                "Check that the configured C interpreter is installed and on PATH ('cling' by default)."
            ),
            Error::ResultParse { .. } => Some(
                "The interpreter output did not end with a value of the declared OUT type."
            ),

            Error::TaskNotFound { .. } => Some(
                "The task may have finished and been evicted. Poll sooner, or raise 'max_finished_tasks' in config."
            ),

            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        let code = self.code();
        format!("[{}] {}", code.as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a decode error
    pub fn decode(what: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Decode {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported language error
    pub fn unsupported_language(lang: impl Into<String>) -> Self {
        Error::UnsupportedLanguage { lang: lang.into() }
    }

    /// Create a not-callable error
    pub fn not_callable(got: impl Into<String>) -> Self {
        Error::NotCallable { got: got.into() }
    }

    /// Create a signature mismatch error
    pub fn signature_mismatch(message: impl Into<String>) -> Self {
        Error::SignatureMismatch {
            message: message.into(),
        }
    }

    /// Create a subprocess error
    pub fn subprocess(message: impl Into<String>) -> Self {
        Error::Subprocess {
            message: message.into(),
            source: None,
        }
    }

    /// Create a subprocess error wrapping an IO error
    pub fn subprocess_io(message: impl Into<String>, source: std::io::Error) -> Self {
        Error::Subprocess {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a result parse error
    pub fn result_parse(message: impl Into<String>) -> Self {
        Error::ResultParse {
            message: message.into(),
        }
    }

    /// Create a task not found error
    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        Error::TaskNotFound {
            task_id: task_id.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
