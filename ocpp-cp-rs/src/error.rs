//! Error taxonomy for the charge point engine
//!
//! Covers the failure classes a caller can observe: networking, timeouts,
//! malformed frames, CSMS-side errors, protocol rejections, offline-deferred
//! operations and configuration violations.

use serde_json::Value;
use thiserror::Error;

use crate::types::{AuthorizationStatus, RegistrationStatus};

/// OCPP error codes carried in CALLERROR frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    PropertyConstraintViolation,
    OccurenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
}

/// Errors produced by the engine
#[derive(Debug, Error)]
pub enum OcppError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid message format")]
    InvalidFormat,

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("unknown message type: {0}")]
    UnknownMessageType(i64),

    #[error("CSMS error: {code:?} - {description}")]
    Remote {
        code: ErrorCode,
        description: String,
        details: Value,
    },

    #[error("timeout waiting for response")]
    Timeout,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("offline, operation not attempted")]
    Offline,

    #[error("boot notification not accepted: {0:?}")]
    BootRejected(RegistrationStatus),

    #[error("authorization failed: {0:?}")]
    AuthorizationFailed(AuthorizationStatus),

    #[error("session not found")]
    SessionNotFound,

    #[error("no transaction active on session")]
    NoTransaction,

    #[error("configuration key {0} is read-only")]
    ReadOnlyKey(&'static str),

    #[error("invalid value {value:?} for configuration key {key}")]
    InvalidKeyValue { key: &'static str, value: String },
}
