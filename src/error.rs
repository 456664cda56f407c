//! Error types for the RPC core.
//!
//! A single [`RpcError`] enum covers every failure the dispatcher can
//! produce. Each variant maps onto a numeric wire code via
//! [`RpcError::code`], so errors raised locally and errors reported by a
//! remote peer reach callbacks in the same shape ([`CallError`]).

use core::fmt;

// ---------------------------------------------------------------------------
// Wire error codes
// ---------------------------------------------------------------------------

pub const CODE_BAD_ARGUMENTS: i32 = 400;
pub const CODE_METHOD_NOT_FOUND: i32 = 404;
pub const CODE_TIMED_OUT: i32 = 408;
pub const CODE_REGISTRATION_CONFLICT: i32 = 409;
pub const CODE_NO_PEER_CONFIGURED: i32 = 412;
pub const CODE_CODEC: i32 = 500;
pub const CODE_ABANDONED: i32 = 503;

// ---------------------------------------------------------------------------
// Core error
// ---------------------------------------------------------------------------

/// Every fallible operation in the RPC core funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// A method with this name is already registered. Fatal at startup.
    RegistrationConflict(String),
    /// No handler is registered under this name.
    MethodNotFound(String),
    /// The request arguments did not match the method's argument shape.
    BadArguments(String),
    /// Outbound call with neither an explicit nor a default destination.
    NoPeerConfigured,
    /// No response arrived within the configured call timeout.
    TimedOut,
    /// The channel carrying the call closed before a response arrived.
    Abandoned,
    /// A frame could not be encoded or decoded.
    Codec(String),
}

impl RpcError {
    /// Numeric code carried in error responses and callbacks.
    pub const fn code(&self) -> i32 {
        match self {
            Self::RegistrationConflict(_) => CODE_REGISTRATION_CONFLICT,
            Self::MethodNotFound(_) => CODE_METHOD_NOT_FOUND,
            Self::BadArguments(_) => CODE_BAD_ARGUMENTS,
            Self::NoPeerConfigured => CODE_NO_PEER_CONFIGURED,
            Self::TimedOut => CODE_TIMED_OUT,
            Self::Abandoned => CODE_ABANDONED,
            Self::Codec(_) => CODE_CODEC,
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistrationConflict(name) => write!(f, "method '{name}' already registered"),
            Self::MethodNotFound(name) => write!(f, "No handler for {name}"),
            Self::BadArguments(msg) => write!(f, "bad arguments: {msg}"),
            Self::NoPeerConfigured => write!(f, "peer address not configured"),
            Self::TimedOut => write!(f, "timed out waiting for response"),
            Self::Abandoned => write!(f, "channel closed before response"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
        }
    }
}

impl std::error::Error for RpcError {}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Callback-facing error
// ---------------------------------------------------------------------------

/// Error half of a call outcome: a code plus a human-readable message.
///
/// Remote error responses are delivered verbatim; local failures
/// (no peer, timeout, abandoned) are converted from [`RpcError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    pub code: i32,
    pub message: String,
}

impl CallError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

impl std::error::Error for CallError {}

impl From<RpcError> for CallError {
    fn from(e: RpcError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, RpcError>;
