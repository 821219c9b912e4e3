//! Contains the error for inserts and updates.

use crate::error::serialize::SerializeError;
use crate::error::{FetchError, MaintainError, OpenError};
use std::error::Error;
use std::fmt;
use std::io;

/// Custom error type for inserts.
#[derive(Debug)]
pub enum InsertError {
    /// Key is already in the container and overwriting was not requested.
    DuplicateKey,
    /// Error serializing the key.
    SerializeKey(SerializeError),
    /// Error serializing the value.
    SerializeValue(SerializeError),
    /// The lookup probe for the key failed.
    Lookup(FetchError),
    /// Growing the lookup section failed.
    Maintain(MaintainError),
    /// Container opened read-only.
    ReadOnly,
    /// Implicit open of the handle failed.
    Open(OpenError),
    /// An underlying IO error.
    IO(io::Error),
}

impl Error for InsertError {}

impl fmt::Display for InsertError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::DuplicateKey => write!(f, "key is already in the container"),
            Self::SerializeKey(e) => write!(f, "key serialization: {}", e),
            Self::SerializeValue(e) => write!(f, "value serialization: {}", e),
            Self::Lookup(e) => write!(f, "lookup: {}", e),
            Self::Maintain(e) => write!(f, "grow: {}", e),
            Self::ReadOnly => write!(f, "read only"),
            Self::Open(e) => write!(f, "open: {}", e),
            Self::IO(e) => write!(f, "io: {}", e),
        }
    }
}

impl From<io::Error> for InsertError {
    fn from(io_err: io::Error) -> Self {
        Self::IO(io_err)
    }
}

impl From<MaintainError> for InsertError {
    fn from(err: MaintainError) -> Self {
        Self::Maintain(err)
    }
}
