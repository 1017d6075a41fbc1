//! Centralized error types for the persona streaming engine.
//!
//! One `thiserror`-derived enum per failure domain, a `code()` for
//! machine-readable identification, and a top-level enum aggregating them.

use thiserror::Error;

/// Errors from [`crate::connect::connect_with_retry`].
#[derive(Debug, Error, Clone)]
pub enum ConnectError {
    /// Transient network failure — the supervisor retries these.
    #[error("connection attempt failed: {0}")]
    Transient(String),

    /// Non-retryable failure (protocol mismatch, auth rejection, etc).
    #[error("fatal connection error: {0}")]
    Fatal(String),
}

impl ConnectError {
    /// Whether the connect supervisor should retry after this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Machine-readable codes the server attaches to `ErrorResponse` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorCode {
    NoBackendServerAvailable,
    FailedCreateModel,
    InvalidPersonaIdConfiguration,
    FrameSizeTooBig,
    InvalidInteractionId,
    /// A code the engine doesn't recognize. Treated as survivable.
    Unknown(&'static str),
}

impl ServerErrorCode {
    /// Parses the wire `payload.code` string into a known variant.
    #[must_use]
    pub fn parse(code: &str) -> Self {
        match code {
            "NO_BACKEND_SERVER_AVAILABLE" => Self::NoBackendServerAvailable,
            "FAILED_CREATE_MODEL" => Self::FailedCreateModel,
            "INVALID_PERSONA_ID_CONFIGURATION" => Self::InvalidPersonaIdConfiguration,
            "FRAME_SIZE_TOO_BIG" => Self::FrameSizeTooBig,
            "INVALID_INTERACTION_ID" => Self::InvalidInteractionId,
            _ => Self::Unknown("unrecognized_server_error_code"),
        }
    }

    /// Whether this error code is fatal to the session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoBackendServerAvailable
                | Self::FailedCreateModel
                | Self::InvalidPersonaIdConfiguration
        )
    }

    /// Machine-readable code string, for logging.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::NoBackendServerAvailable => "NO_BACKEND_SERVER_AVAILABLE",
            Self::FailedCreateModel => "FAILED_CREATE_MODEL",
            Self::InvalidPersonaIdConfiguration => "INVALID_PERSONA_ID_CONFIGURATION",
            Self::FrameSizeTooBig => "FRAME_SIZE_TOO_BIG",
            Self::InvalidInteractionId => "INVALID_INTERACTION_ID",
            Self::Unknown(s) => s,
        }
    }
}

/// Application-wide error type for the persona streaming engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Connection could not be established (after exhausting retries, or a
    /// fatal error on the first attempt).
    #[error("connection failed: {0}")]
    Connect(#[from] ConnectError),

    /// A fatal `ErrorResponse` was received from the server.
    #[error("fatal server error: {0}")]
    ServerFatal(String),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Returns a machine-readable error code, useful for callers building
    /// their own telemetry.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connect(ConnectError::Transient(_)) => "connect_transient",
            Self::Connect(ConnectError::Fatal(_)) => "connect_fatal",
            Self::ServerFatal(_) => "server_fatal",
            Self::Config(_) => "invalid_configuration",
        }
    }
}

/// Convenient `Result` alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
