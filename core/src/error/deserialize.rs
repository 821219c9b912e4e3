//! Contains the error produced when deserializing an element from stored bytes.

use std::error::Error;
use std::fmt;
use std::io;

/// Custom error type for element deserialization.
#[derive(Debug)]
pub enum DeserializeError {
    /// A 7 bit encoded length ran past its maximum width.
    InvalidLength,
    /// A sequence carried a negative element count.
    InvalidCount,
    /// Stored string bytes were not valid UTF-8.
    InvalidUtf8,
    /// A stored code unit does not map to a char.
    InvalidChar,
    /// A missing (null) value was read into a type that cannot represent it.
    NullValue,
    /// A date-time outside the representable range.
    TimeRange,
    /// An underlying IO error.
    IO(io::Error),
}

impl Error for DeserializeError {}

impl fmt::Display for DeserializeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::InvalidLength => write!(f, "invalid 7 bit length"),
            Self::InvalidCount => write!(f, "invalid sequence count"),
            Self::InvalidUtf8 => write!(f, "invalid utf-8"),
            Self::InvalidChar => write!(f, "invalid char code unit"),
            Self::NullValue => write!(f, "missing value for a non optional type"),
            Self::TimeRange => write!(f, "date-time outside the tick range"),
            Self::IO(e) => write!(f, "io: {}", e),
        }
    }
}

impl From<io::Error> for DeserializeError {
    fn from(io_err: io::Error) -> Self {
        Self::IO(io_err)
    }
}
