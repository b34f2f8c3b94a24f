//! Workspace-wide error type.
//!
//! A single `thiserror`-derived enum carries every failure mode named in
//! the error handling design: transport, method, arguments, backend,
//! security and internal errors all map to a named variant here rather
//! than an ad hoc `String` or `anyhow::Error`.

use thiserror::Error;

/// Result alias used by every crate in the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The aggregating proxy's error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Wrapped I/O failure.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON encode/decode failure.
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A backend subprocess could not be spawned.
    #[error("failed to spawn backend '{id}': {message}")]
    BackendSpawn { id: String, message: String },

    /// A backend's MCP handshake failed.
    #[error("handshake with backend '{id}' failed: {message}")]
    BackendHandshake { id: String, message: String },

    /// A backend connection is not in a usable state.
    #[error("backend '{id}' is not connected")]
    BackendNotConnected { id: String },

    /// No such backend is defined.
    #[error("unknown backend '{id}'")]
    BackendUnknown { id: String },

    /// Transport-level failure talking to a backend (pipe closed, decode failure, …).
    #[error("transport error with backend '{id}': {message}")]
    BackendTransport { id: String, message: String },

    /// A backend request exceeded its deadline.
    #[error("request to backend '{id}' timed out after {timeout_secs}s")]
    BackendTimeout { id: String, timeout_secs: u64 },

    /// A backend returned an MCP-shaped error for a call.
    #[error("backend '{id}' returned an error: {message}")]
    BackendCall { id: String, message: String },

    /// No profile matched and no default profile is configured.
    #[error("no profile matched and no default profile is configured")]
    ProfileNotFound,

    /// Referenced profile does not exist.
    #[error("unknown profile '{name}'")]
    ProfileUnknown { name: String },

    /// A namespaced identifier was malformed (missing the `::` separator).
    #[error("malformed namespaced identifier '{value}'")]
    MalformedNamespacedId { value: String },

    /// The security sandbox blocked a call.
    #[error("Security: {message}")]
    Security { rule: String, message: String },

    /// Requested resource, tool, prompt or session does not exist.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Caller-supplied arguments were invalid or missing.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Unexpected internal failure that does not fit another variant.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Construct a [`Error::Config`] with no source error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Construct a [`Error::Internal`].
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Construct a [`Error::NotFound`].
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Construct a [`Error::InvalidArgument`].
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Map this error to the JSON-RPC error code the HTTP boundary should
    /// report, per the error handling design's kind table.
    #[must_use]
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            Self::Json { .. } => -32700,
            Self::MalformedNamespacedId { .. }
            | Self::InvalidArgument { .. }
            | Self::ProfileUnknown { .. } => -32602,
            Self::Security { .. } => -32000,
            Self::NotFound { .. } | Self::BackendUnknown { .. } | Self::ProfileNotFound => -32601,
            Self::BackendSpawn { .. }
            | Self::BackendHandshake { .. }
            | Self::BackendNotConnected { .. }
            | Self::BackendTransport { .. }
            | Self::BackendTimeout { .. }
            | Self::BackendCall { .. } => -32603,
            Self::Io { .. } | Self::Config { .. } | Self::Internal { .. } => -32603,
        }
    }
}
