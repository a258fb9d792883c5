//! Error handling for FlockGate
//!
//! Provides error types for every layer of the gateway:
//! - Connection errors (serial port open/read failures)
//! - Decode errors (malformed NMEA or detector lines)
//! - Store errors (lookups against the detection store)
//! - Subscribe errors (terminal group requests)
//! - Publish errors (a single subscriber delivery failure)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Raised when a serial port cannot be opened or stops answering. Inside the
/// background workers these are converted into state transitions and events;
/// they are only returned to callers from a manual `connect`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// No port has been assigned to the role
    #[error("No port assigned to {role}")]
    NoPortAssigned {
        /// The device role without a port.
        role: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },
}

/// Decode error type
///
/// A line from one of the devices could not be turned into a structured
/// value. These are dropped by the read loops; the absence of a downstream
/// event is the only visible effect.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The line was empty after trimming
    #[error("Empty line")]
    EmptyLine,

    /// The sentence framing or one of its fields did not parse
    #[error("Malformed sentence: {0}")]
    Malformed(String),

    /// The sentence type is not decoded
    #[error("Unsupported sentence: {0}")]
    UnsupportedSentence(String),

    /// Not enough comma separated fields
    #[error("Expected at least {expected} fields, got {actual}")]
    TooFewFields {
        /// Minimum field count.
        expected: usize,
        /// Field count found.
        actual: usize,
    },

    /// A required field was empty
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// A field did not hold a valid number
    #[error("Invalid value for {field}: {value:?}")]
    InvalidNumber {
        /// The field being converted.
        field: &'static str,
        /// The raw text of the field.
        value: String,
    },

    /// The line is not a JSON object
    #[error("Not a JSON object: {0}")]
    NotJson(String),

    /// JSON object without a `detection_method` field
    #[error("JSON record has no detection_method")]
    MissingDetectionMethod,
}

/// Detection store error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No detection with this id
    #[error("Detection not found: {id}")]
    NotFound {
        /// The id that was requested.
        id: u64,
    },
}

/// Subscription error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    /// The detector is not connected on the requested port
    #[error("Device not connected on {port}. Connect to the sniffer device first.")]
    NotConnected {
        /// The port the subscriber asked for.
        port: String,
    },

    /// The terminal request did not name a port
    #[error("No port specified")]
    NoPortSpecified,

    /// The subscription id is not registered on the bus
    #[error("Unknown subscriber: {0}")]
    UnknownSubscriber(String),
}

/// Delivery failure for a single subscriber
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The subscriber's transport is gone
    #[error("Subscriber transport closed")]
    Closed,

    /// The subscriber rejected the event
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// Main error type for FlockGate
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Decode error
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Subscribe error
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    /// Publish error
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a not-found error from the store
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Store(StoreError::NotFound { .. }))
    }

    /// Check if this is a not-connected error from a terminal request
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Error::Subscribe(SubscribeError::NotConnected { .. }))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
