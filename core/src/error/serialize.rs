//! Contains the error produced when serializing an element.

use std::error::Error;
use std::fmt;
use std::io;

/// Custom error type for element serialization.
#[derive(Debug)]
pub enum SerializeError {
    /// A char outside the basic multilingual plane does not fit one UTF-16 code unit.
    CharRange,
    /// A date-time outside the representable tick range.
    TimeRange,
    /// Element is too large for its length prefix.
    TooLarge,
    /// An underlying IO error (only possible when writing straight to a stream).
    IO(io::Error),
}

impl Error for SerializeError {}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::CharRange => write!(f, "char outside the 16 bit range"),
            Self::TimeRange => write!(f, "date-time outside the tick range"),
            Self::TooLarge => write!(f, "element too large"),
            Self::IO(e) => write!(f, "io: {}", e),
        }
    }
}

impl From<io::Error> for SerializeError {
    fn from(io_err: io::Error) -> Self {
        Self::IO(io_err)
    }
}
