//! Error types for mining, the wire protocol and the client

use thiserror::Error;

/// Result type for mining operations
pub type MiningResult<T> = std::result::Result<T, MiningError>;

/// Failures raised while loading data, clustering, or persisting a model.
///
/// Every variant is reported back to the requesting client as text; none of
/// them ends the session.
#[derive(Error, Debug)]
pub enum MiningError {
    /// Cluster count outside `1..=tuples`
    #[error("Number of clusters {k} is out of range: expected a value between 1 and {tuples}")]
    OutOfRangeSampleSize { k: i64, tuples: usize },

    /// The query returned no rows
    #[error("Table '{0}' is empty")]
    EmptySet(String),

    /// An aggregate (min/max/distinct) evaluated to null
    #[error("No value computed for column '{column}' of table '{table}'")]
    NoValue { table: String, column: String },

    /// The backing store could not be reached
    #[error("Data source connection error: {0}")]
    Connection(String),

    /// The backing store answered with something unusable
    #[error("Data source error: {0}")]
    DataSource(String),

    /// Bad request parameters
    #[error("Invalid request: {0}")]
    Validation(String),

    /// File system failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted model could not be decoded
    #[error("Corrupt model: {0}")]
    CorruptModel(String),
}

/// Coarse error classes used when logging failed requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    DataSource,
    Io,
}

impl MiningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfRangeSampleSize { .. } | Self::Validation(_) => ErrorKind::Validation,
            Self::EmptySet(_) | Self::NoValue { .. } | Self::Connection(_) | Self::DataSource(_) => {
                ErrorKind::DataSource
            }
            Self::Io(_) | Self::CorruptModel(_) => ErrorKind::Io,
        }
    }
}

impl From<bincode::Error> for MiningError {
    fn from(e: bincode::Error) -> Self {
        Self::CorruptModel(e.to_string())
    }
}

/// Transport-level failures. Fatal to the session that hit them.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("frame of {0} bytes exceeds the size limit")]
    FrameTooLarge(usize),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("expected {expected}, received {found}")]
    UnexpectedFrame {
        expected: &'static str,
        found: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors seen by a client driving the protocol
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server did not acknowledge the request, or the transport broke
    #[error("Communication server error: {0}")]
    Communication(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
