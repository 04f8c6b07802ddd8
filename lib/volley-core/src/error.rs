//! Error types for volley.

use derive_more::{Display, Error, From};

use crate::StatusError;

/// Main error type for volley operations.
///
/// Every payload is owned text, so the error is cheap to clone. An
/// [`Outcome`](crate::Outcome) hands out its error as often as it is asked.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error, From)]
pub enum Error {
    /// The server answered with a non-success status.
    #[display("{_0}")]
    #[from]
    Status(#[error(not(source))] StatusError),

    /// A non-success status that produced no structured error (streaming mode).
    #[display("{status} while accessing {url}: {body}")]
    #[from(skip)]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// URL that was requested.
        url: String,
        /// Body text captured for diagnostics.
        body: String,
    },

    /// The base address or request URI could not be parsed.
    #[display("invalid URL: {_0}")]
    #[from(skip)]
    InvalidUrl(#[error(not(source))] String),

    /// The HTTP verb is not a standard method.
    #[display("invalid HTTP method: {_0}")]
    #[from(skip)]
    InvalidMethod(#[error(not(source))] String),

    /// A header name or value is not valid HTTP.
    #[display("invalid header: {_0}")]
    #[from(skip)]
    InvalidHeader(#[error(not(source))] String),

    /// The value handed to the body provider has an unsupported type.
    #[display("unknown type used for body: {_0}")]
    #[from(skip)]
    UnknownBodyType(#[error(not(source))] String),

    /// Reading a body file or stream failed.
    #[display("I/O error: {_0}")]
    #[from(skip)]
    Io(#[error(not(source))] String),

    /// The wire-level request could not be assembled.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// The peer reset the connection while the request was in flight.
    #[display("connection reset: {_0}")]
    #[from(skip)]
    ConnectionReset(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Transport-level timeout.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// The caller's cancellation token fired.
    #[display("request cancelled")]
    #[from(skip)]
    Cancelled,

    /// The response body stream broke, most likely on a closed connection.
    #[display(
        "stream error {_0} when reading response body, may be caused by closed connection. Please retry."
    )]
    #[from(skip)]
    StreamRead(#[error(not(source))] String),

    /// Any other failure while reading the response body.
    #[display("unexpected error {_0} when reading response body. Please retry.")]
    #[from(skip)]
    UnexpectedRead(#[error(not(source))] String),

    /// Decoding was requested on an empty body.
    #[display("0-length response")]
    #[from(skip)]
    EmptyResponse,

    /// The `Content-Type` header is not a valid media type.
    #[display("invalid media type: {_0}")]
    #[from(skip)]
    InvalidMediaType(#[error(not(source))] String),

    /// No decoding strategy is registered for the media type.
    #[display("unsupported media type: {_0}")]
    #[from(skip)]
    UnsupportedMediaType(#[error(not(source))] String),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// YAML deserialization error.
    #[display("YAML deserialization error: {_0}")]
    #[from(skip)]
    YamlDeserialization(#[error(not(source))] String),

    /// XML deserialization error.
    #[display("XML deserialization error: {_0}")]
    #[from(skip)]
    XmlDeserialization(#[error(not(source))] String),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a connection-reset error.
    #[must_use]
    pub fn connection_reset(message: impl Into<String>) -> Self {
        Self::ConnectionReset(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this is a connection error (reset included).
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::ConnectionReset(_))
    }

    /// Returns `true` if the peer reset the connection.
    #[must_use]
    pub const fn is_connection_reset(&self) -> bool {
        matches!(self, Self::ConnectionReset(_))
    }

    /// Returns `true` if the caller cancelled the request.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the structured status error, if any.
    #[must_use]
    pub const fn status_error(&self) -> Option<&StatusError> {
        match self {
            Self::Status(err) => Some(err),
            _ => None,
        }
    }
}
