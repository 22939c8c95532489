use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Raw numeric error code from the `ErrorNumber` field of an Alpaca response.
///
/// The Alpaca specification reserves `0x400..0x500` for standard conditions
/// and `0x500..=0xFFF` for driver-specific faults. Codes outside both ranges
/// are preserved as-is and classified as [`ErrorKind::Unspecified`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(i32);

/// The starting value for driver-specific error numbers.
const DRIVER_BASE: i32 = 0x500;
/// The maximum value for driver-specific error numbers.
const DRIVER_MAX: i32 = 0xFFF;

impl ErrorCode {
    /// Success.
    pub const OK: Self = Self(0);
    /// Property or method not implemented.
    pub const NOT_IMPLEMENTED: Self = Self(0x400);
    /// Invalid value.
    pub const INVALID_VALUE: Self = Self(0x401);
    /// A value has not been set.
    pub const VALUE_NOT_SET: Self = Self(0x402);
    /// The communications channel is not connected.
    pub const NOT_CONNECTED: Self = Self(0x407);
    /// The attempted operation is invalid because the mount is currently in a Parked state.
    pub const INVALID_WHILE_PARKED: Self = Self(0x408);
    /// The attempted operation is invalid because the mount is currently in a Slaved state.
    pub const INVALID_WHILE_SLAVED: Self = Self(0x409);
    /// The requested operation can not be undertaken at this time.
    pub const INVALID_OPERATION: Self = Self(0x40B);
    /// The requested action is not implemented in this driver.
    pub const ACTION_NOT_IMPLEMENTED: Self = Self(0x40C);

    /// Wrap a raw `ErrorNumber` value.
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Get the raw error code.
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Whether this code reports success.
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Classify this code into the closed set of error kinds.
    ///
    /// Total over all inputs: every unassigned or out-of-range code falls
    /// through to [`ErrorKind::Unspecified`].
    pub const fn kind(self) -> ErrorKind {
        match self.0 {
            0x400 => ErrorKind::NotImplemented,
            0x401 => ErrorKind::InvalidValue,
            0x402 => ErrorKind::ValueNotSet,
            0x407 => ErrorKind::NotConnected,
            0x408 => ErrorKind::InvalidWhileParked,
            0x409 => ErrorKind::InvalidWhileSlaved,
            0x40B => ErrorKind::InvalidOperation,
            0x40C => ErrorKind::ActionNotImplemented,
            DRIVER_BASE..=DRIVER_MAX => ErrorKind::Driver,
            _ => ErrorKind::Unspecified,
        }
    }

    /// Get the zero-based driver-specific error code.
    ///
    /// Returns `None` if this code is not in the driver-reserved range.
    pub const fn driver_code(self) -> Option<i32> {
        match self.0 {
            DRIVER_BASE..=DRIVER_MAX => Some(self.0 - DRIVER_BASE),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#X}", self.0)
    }
}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ErrorKind::Driver => write!(f, "DRIVER({:#X})", self.0),
            ErrorKind::Unspecified => write!(f, "{:#X}", self.0),
            kind => write!(f, "{kind:?}"),
        }
    }
}

/// Closed classification of Alpaca protocol errors.
///
/// One variant per reserved standard code, plus [`ErrorKind::Driver`] for the
/// driver-specific block and [`ErrorKind::Unspecified`] for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Property or method not implemented (`0x400`).
    NotImplemented,
    /// Invalid value (`0x401`).
    InvalidValue,
    /// A value has not been set (`0x402`).
    ValueNotSet,
    /// The communications channel is not connected (`0x407`).
    NotConnected,
    /// Operation invalid while the mount is parked (`0x408`).
    InvalidWhileParked,
    /// Operation invalid while the mount is slaved (`0x409`).
    InvalidWhileSlaved,
    /// The requested operation can not be undertaken at this time (`0x40B`).
    InvalidOperation,
    /// The requested custom action is not implemented (`0x40C`).
    ActionNotImplemented,
    /// Driver-specific fault (`0x500..=0xFFF`), reported verbatim.
    Driver,
    /// A code outside both reserved ranges; preserved, never discarded.
    Unspecified,
}

/// Protocol-level error reported by a device or its driver.
///
/// Carries the raw code and the server-supplied message unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (Error Code: {code})")]
pub struct DeviceError {
    /// Error number from the response envelope.
    pub code: ErrorCode,
    /// Error message from the response envelope.
    pub message: String,
}

impl DeviceError {
    /// Create a new `DeviceError` from the given error code and message.
    pub fn new(code: ErrorCode, message: impl fmt::Display) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }

    /// Classify the error code; see [`ErrorCode::kind`].
    pub const fn kind(&self) -> ErrorKind {
        self.code.kind()
    }
}

/// Failure below the Alpaca protocol layer.
///
/// Distinct from [`DeviceError`]: the request never produced a well-formed
/// protocol response. None of these are retried by the library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The request did not complete within the configured deadline.
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),
    /// Connection-level failure (refused, reset, DNS, TLS, ...).
    #[error(transparent)]
    Http(reqwest::Error),
    /// The server answered with a non-success HTTP status.
    #[error("{url} returned HTTP status {status}")]
    Status {
        /// HTTP status code of the response.
        status: reqwest::StatusCode,
        /// URL the request was sent to.
        url: reqwest::Url,
    },
    /// The response body was not declared as JSON.
    #[error("expected a JSON response, got {content_type}")]
    UnexpectedContentType {
        /// The `Content-Type` the server sent, or `(none)`.
        content_type: String,
    },
    /// The response body could not be parsed as an Alpaca envelope.
    #[error("malformed Alpaca response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
    /// The base URL or the member path could not form a valid request URL.
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else {
            Self::Http(err)
        }
    }
}

/// Any failure of an Alpaca client call.
#[derive(Debug, Error)]
pub enum Error {
    /// The device or its driver reported a protocol-level error.
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// The request failed below the protocol layer.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// The protocol error, if this is one.
    pub const fn as_device_error(&self) -> Option<&DeviceError> {
        match self {
            Self::Device(err) => Some(err),
            Self::Transport(_) => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.into())
    }
}

/// Result type for all Alpaca client calls.
pub type Result<T, E = Error> = std::result::Result<T, E>;
