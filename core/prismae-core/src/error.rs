//! Error types for prismae-core operations.
//! Keep CoreFfiError minimal and stable to avoid breaking FFI clients.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// FFI-Compatible Error (for Swift/Kotlin)
// ═══════════════════════════════════════════════════════════════════════════════

/// FFI-safe error type for use across language boundaries.
///
/// `Auth` carries a message that is safe to show to the user verbatim;
/// `General` is for everything else.
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CoreFfiError {
    #[error("{message}")]
    Auth { message: String },

    #[error("{message}")]
    General { message: String },
}

impl From<String> for CoreFfiError {
    fn from(message: String) -> Self {
        CoreFfiError::General { message }
    }
}

impl From<&str> for CoreFfiError {
    fn from(message: &str) -> Self {
        CoreFfiError::General {
            message: message.to_string(),
        }
    }
}

impl From<CoreError> for CoreFfiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Auth(auth) => CoreFfiError::Auth {
                message: auth.to_string(),
            },
            other => CoreFfiError::General {
                message: other.to_string(),
            },
        }
    }
}

impl From<AuthError> for CoreFfiError {
    fn from(err: AuthError) -> Self {
        CoreFfiError::Auth {
            message: err.to_string(),
        }
    }
}

impl From<AnalysisError> for CoreFfiError {
    fn from(err: AnalysisError) -> Self {
        CoreFfiError::General {
            message: err.to_string(),
        }
    }
}

// Required so foreign implementations of exported traits can fail.
impl From<uniffi::UnexpectedUniFFICallbackError> for CoreFfiError {
    fn from(err: uniffi::UnexpectedUniFFICallbackError) -> Self {
        CoreFfiError::General { message: err.reason }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authentication Errors (user-facing)
// ═══════════════════════════════════════════════════════════════════════════════

/// Closed set of authentication failures.
///
/// The `Display` text is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Incorrect email or password.")]
    InvalidCredentials,

    #[error("Please confirm your email address before signing in.")]
    EmailNotConfirmed,

    #[error("An account with this email already exists.")]
    EmailAlreadyRegistered,

    #[error("Password is too weak. Use at least 8 characters.")]
    WeakPassword,

    #[error("Too many attempts. Please wait a moment and try again.")]
    RateLimited,

    #[error("You are not signed in.")]
    SessionMissing,

    #[error("Sign in with this provider failed. Please try again.")]
    InvalidIdToken,

    #[error("Unable to reach the server. Check your connection and try again.")]
    Network { details: String },

    #[error("Something went wrong: {message}")]
    Server { message: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Analysis Proxy Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Failures returned by the food analysis proxy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Nothing to analyze")]
    EmptyInput,

    #[error("Rate limit reached. Try again later.")]
    RateLimited,

    #[error("Analysis service rejected the request credentials")]
    Unauthorized,

    #[error("Food analysis is not available in your region. {suggestion}")]
    GeoRestricted { suggestion: String },

    #[error("Analysis API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Analysis request failed: {0}")]
    Network(String),

    #[error("Analysis response could not be decoded: {0}")]
    Decode(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Internal Error (for Rust-only use)
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur in prismae-core operations.
///
/// This is the rich error type used internally in Rust code.
/// For FFI boundaries, use `CoreFfiError` instead.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    // ─────────────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("No signed-in user")]
    NotAuthenticated,

    #[error("{0}")]
    AccountDeletion(String),

    // ─────────────────────────────────────────────────────────────────────
    // Remote Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("HTTP request failed: {context}: {message}")]
    Http {
        context: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CoreError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CoreError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        CoreError::Json {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn http(
        context: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        CoreError::Http {
            context: context.into(),
            status,
            message: message.into(),
        }
    }

    /// HTTP status code attached to a remote failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            CoreError::Http { status, .. } => *status,
            _ => None,
        }
    }
}

/// Convenience type alias for Results using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

// Conversion for string error compatibility
impl From<CoreError> for String {
    fn from(err: CoreError) -> String {
        err.to_string()
    }
}
