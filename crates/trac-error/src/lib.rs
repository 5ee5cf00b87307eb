// SPDX-License-Identifier: Apache-2.0
//! Unified error taxonomy with stable error kinds for the TRAC metadata
//! catalog.
//!
//! Every catalog error carries an [`ErrorKind`] (a machine-readable, stable
//! string tag), a human-readable message, an optional cause chain, and a
//! structured list of per-failure [`ErrorDetail`]s locating each problem
//! inside the offending request.  Use the builder returned by
//! [`TracError::new`] to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Machine-readable, stable error kind.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The shape of one request is wrong (static validation).
    InputValidation,
    /// A new object version is not compatible with its prior version.
    VersionValidation,
    /// References point outside the known metadata or platform resources.
    ConsistencyValidation,
    /// A selector resolved to no stored row.
    NotFound,
    /// A selector's declared object type disagreed with the stored type.
    WrongType,
    /// A uniqueness constraint was violated during a write; the losing
    /// writer of a same-id race sees this as its version being superseded.
    Duplicate,
    /// Configuration or secrets were unavailable or malformed at startup.
    ConfigLoad,
    /// Unmapped engine error, plugin contract violation, invariant breach.
    Internal,
}

impl ErrorKind {
    /// Stable `&'static str` representation of the kind (e.g.
    /// `"INPUT_VALIDATION"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputValidation => "INPUT_VALIDATION",
            Self::VersionValidation => "VERSION_VALIDATION",
            Self::ConsistencyValidation => "CONSISTENCY_VALIDATION",
            Self::NotFound => "NOT_FOUND",
            Self::WrongType => "WRONG_TYPE",
            Self::Duplicate => "DUPLICATE",
            Self::ConfigLoad => "CONFIG_LOAD",
            Self::Internal => "INTERNAL",
        }
    }

    /// The user-visible status this kind maps to at the API boundary.
    pub fn status(&self) -> Status {
        match self {
            Self::InputValidation => Status::InvalidArgument,
            Self::VersionValidation | Self::ConsistencyValidation => Status::FailedPrecondition,
            Self::NotFound | Self::WrongType => Status::NotFound,
            Self::Duplicate => Status::AlreadyExists,
            Self::ConfigLoad | Self::Internal => Status::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// User-visible status code family, mirroring the RPC status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// The request was malformed.
    InvalidArgument,
    /// The request was well-formed but conflicts with stored state.
    FailedPrecondition,
    /// The referenced item does not exist.
    NotFound,
    /// The item being created already exists (or was superseded).
    AlreadyExists,
    /// An unexpected server-side failure.
    Internal,
}

impl Status {
    /// Equivalent HTTP status code for the gateway rendering of the API.
    pub fn http_code(&self) -> u16 {
        match self {
            Self::InvalidArgument => 400,
            Self::FailedPrecondition => 412,
            Self::NotFound => 404,
            Self::AlreadyExists => 409,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorDetail
// ---------------------------------------------------------------------------

/// One located failure inside a request.
///
/// `location` is the dot-joined path from the request root to the offending
/// field (list indices and map keys included), e.g.
/// `tagUpdates.2.attrName`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Path from the request root to the failing field.
    pub location: String,
    /// Human-readable description of the failure.
    pub message: String,
}

impl ErrorDetail {
    /// Create a new detail entry.
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.location, self.message)
        }
    }
}

// ---------------------------------------------------------------------------
// TracError
// ---------------------------------------------------------------------------

/// Unified catalog error.
///
/// Carries a stable [`ErrorKind`], a human-readable message, an optional
/// source error for cause-chaining, and the structured detail list that the
/// API surfaces to clients.
///
/// # Builder usage
///
/// ```
/// use trac_error::{ErrorKind, TracError};
///
/// let err = TracError::new(ErrorKind::InputValidation, "validation failed")
///     .with_detail("objectType", "object type must be specified")
///     .with_detail("tagUpdates.0.attrName", "attribute name is reserved");
/// assert_eq!(err.details.len(), 2);
/// ```
pub struct TracError {
    /// Machine-readable error kind.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Per-failure locations and messages.
    pub details: Vec<ErrorDetail>,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TracError {
    /// Create a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: Vec::new(),
            source: None,
        }
    }

    /// Attach one located failure to the detail list.
    pub fn with_detail(mut self, location: impl Into<String>, message: impl Into<String>) -> Self {
        self.details.push(ErrorDetail::new(location, message));
        self
    }

    /// Attach a batch of located failures.
    pub fn with_details(mut self, details: impl IntoIterator<Item = ErrorDetail>) -> Self {
        self.details.extend(details);
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.kind.status()`.
    pub fn status(&self) -> Status {
        self.kind.status()
    }
}

impl fmt::Debug for TracError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("TracError");
        d.field("kind", &self.kind);
        d.field("message", &self.message);
        if !self.details.is_empty() {
            d.field("details", &self.details);
        }
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        d.finish()
    }
}

impl fmt::Display for TracError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)?;
        for detail in &self.details {
            write!(f, "; {detail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TracError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Convenience alias used across the catalog crates.
pub type Result<T> = std::result::Result<T, TracError>;

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`TracError`] (without the opaque source).
///
/// This is the error body the gateway writes to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TracErrorDto {
    /// Error kind.
    pub kind: ErrorKind,
    /// User-visible status derived from the kind.
    pub status: Status,
    /// Human-readable message.
    pub message: String,
    /// Per-failure locations and messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
}

impl From<&TracError> for TracErrorDto {
    fn from(err: &TracError) -> Self {
        Self {
            kind: err.kind,
            status: err.status(),
            message: err.message.clone(),
            details: err.details.clone(),
        }
    }
}

impl From<TracErrorDto> for TracError {
    fn from(dto: TracErrorDto) -> Self {
        Self {
            kind: dto.kind,
            message: dto.message,
            details: dto.details,
            source: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
