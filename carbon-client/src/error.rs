use std::io;

use thiserror::Error;

/// Errors that could occur while building data points or sending them to a carbon server.
#[derive(Debug, Error)]
pub enum Error {
    /// Connecting to the server, or writing a payload to it, failed.
    ///
    /// A session that was already disconnected also fails this way, with an I/O error of kind
    /// [`io::ErrorKind::NotConnected`].
    #[error("connection to {address} failed: {source}")]
    Connection {
        /// Server address, in the form of `<server>:<port>`.
        address: String,

        /// Underlying I/O error.
        source: io::Error,
    },

    /// A data point was appended without a value.
    #[error("missing value for metric '{metric}'")]
    MissingValue {
        /// Name of the metric the value was missing for.
        metric: String,
    },

    /// A data point was appended with a value that is not a finite floating-point number.
    #[error("value '{value}' for metric '{metric}' is not a finite number")]
    InvalidValue {
        /// Name of the metric the value was given for.
        metric: String,

        /// The offending value, as given.
        value: String,
    },

    /// The batch size for bulk submission was zero.
    #[error("batch size must be greater than zero")]
    InvalidBatchSize,
}

impl Error {
    pub(crate) fn connection(address: String, source: io::Error) -> Self {
        Error::Connection { address, source }
    }

    /// Returns `true` if the error was caused by the network rather than by the input.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }
}
