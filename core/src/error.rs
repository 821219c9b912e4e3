//! Implements the errors surfaced by the container operations.  Each public operation family
//! gets its own enum so callers can match on exactly the failures that operation can produce.

pub mod deserialize;
pub mod insert;
pub mod serialize;

use crate::error::deserialize::DeserializeError;
use crate::error::insert::InsertError;
use crate::error::serialize::SerializeError;
use std::error::Error;
use std::fmt;
use std::io;

/// Error loading the fixed header at the front of a container file.
#[derive(Debug)]
pub enum LoadHeaderError {
    /// The file is too small to hold the header and journal.
    TooSmall,
    /// The 16 byte signature did not match the expected file kind.
    InvalidSignature,
    /// An underlying IO error while loading the header.
    IO(io::Error),
}

impl Error for LoadHeaderError {}

impl fmt::Display for LoadHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::TooSmall => write!(f, "file too small for header"),
            Self::InvalidSignature => write!(f, "signature mismatch"),
            Self::IO(e) => write!(f, "io: {}", e),
        }
    }
}

impl From<io::Error> for LoadHeaderError {
    fn from(io_err: io::Error) -> Self {
        Self::IO(io_err)
    }
}

/// Error opening a container file.
#[derive(Debug)]
pub enum OpenError {
    /// The file itself could not be opened.
    FileOpen(io::Error),
    /// The header could not be loaded or validated.
    LoadHeader(LoadHeaderError),
    /// A read-only open found an in-flight journal record it is not allowed to replay.
    JournalPending,
    /// Replaying the in-flight journal record failed.
    Replay(io::Error),
    /// Any other IO error during open.
    IO(io::Error),
}

impl Error for OpenError {}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::FileOpen(e) => write!(f, "open failed: {}", e),
            Self::LoadHeader(e) => write!(f, "header: {}", e),
            Self::JournalPending => write!(f, "journal record pending on a read-only open"),
            Self::Replay(e) => write!(f, "journal replay: {}", e),
            Self::IO(e) => write!(f, "io: {}", e),
        }
    }
}

impl From<io::Error> for OpenError {
    fn from(io_err: io::Error) -> Self {
        Self::IO(io_err)
    }
}

impl From<LoadHeaderError> for OpenError {
    fn from(err: LoadHeaderError) -> Self {
        Self::LoadHeader(err)
    }
}

/// Error reading an entry.
#[derive(Debug)]
pub enum FetchError {
    /// Requested key was not found.
    NotFound,
    /// Error serializing the probe key.
    SerializeKey(SerializeError),
    /// Error deserializing a stored key.
    DeserializeKey(DeserializeError),
    /// Error deserializing the stored value.
    DeserializeValue(DeserializeError),
    /// A lookup rebuild triggered by a degraded probe chain failed.
    Rebuild(MaintainError),
    /// Implicit open of the handle failed.
    Open(OpenError),
    /// An underlying IO error.
    IO(io::Error),
}

impl Error for FetchError {}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::NotFound => write!(f, "not found"),
            Self::SerializeKey(e) => write!(f, "serialize key: {}", e),
            Self::DeserializeKey(e) => write!(f, "deserialize key: {}", e),
            Self::DeserializeValue(e) => write!(f, "deserialize value: {}", e),
            Self::Rebuild(e) => write!(f, "lookup rebuild: {}", e),
            Self::Open(e) => write!(f, "open: {}", e),
            Self::IO(e) => write!(f, "io: {}", e),
        }
    }
}

impl From<io::Error> for FetchError {
    fn from(io_err: io::Error) -> Self {
        Self::IO(io_err)
    }
}

/// Error removing an entry.
#[derive(Debug)]
pub enum RemoveError {
    /// Container opened read-only.
    ReadOnly,
    /// Error serializing the probe key.
    SerializeKey(SerializeError),
    /// The lookup probe for the key failed.
    Lookup(FetchError),
    /// Implicit open of the handle failed.
    Open(OpenError),
    /// An underlying IO error.
    IO(io::Error),
}

impl Error for RemoveError {}

impl fmt::Display for RemoveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::ReadOnly => write!(f, "read only"),
            Self::SerializeKey(e) => write!(f, "serialize key: {}", e),
            Self::Lookup(e) => write!(f, "lookup: {}", e),
            Self::Open(e) => write!(f, "open: {}", e),
            Self::IO(e) => write!(f, "io: {}", e),
        }
    }
}

impl From<io::Error> for RemoveError {
    fn from(io_err: io::Error) -> Self {
        Self::IO(io_err)
    }
}

/// Error from the maintenance operations: compact, clear, growth and lookup rebuilds.
#[derive(Debug)]
pub enum MaintainError {
    /// Container opened read-only.
    ReadOnly,
    /// Implicit open of the handle failed.
    Open(OpenError),
    /// An underlying IO error.
    IO(io::Error),
}

impl Error for MaintainError {}

impl fmt::Display for MaintainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::ReadOnly => write!(f, "read only"),
            Self::Open(e) => write!(f, "open: {}", e),
            Self::IO(e) => write!(f, "io: {}", e),
        }
    }
}

impl From<io::Error> for MaintainError {
    fn from(io_err: io::Error) -> Self {
        Self::IO(io_err)
    }
}

/// Error updating the 16 byte signature tag.
#[derive(Debug)]
pub enum SignatureError {
    /// Signatures hold at most 16 bytes.
    TooLong,
    /// Container opened read-only.
    ReadOnly,
    /// Implicit open of the handle failed.
    Open(OpenError),
    /// An underlying IO error.
    IO(io::Error),
}

impl Error for SignatureError {}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::TooLong => write!(f, "signature longer than 16 bytes"),
            Self::ReadOnly => write!(f, "read only"),
            Self::Open(e) => write!(f, "open: {}", e),
            Self::IO(e) => write!(f, "io: {}", e),
        }
    }
}

impl From<io::Error> for SignatureError {
    fn from(io_err: io::Error) -> Self {
        Self::IO(io_err)
    }
}

/// Error from a bulk set-algebra operation, which composes fetches, inserts and removes.
#[derive(Debug)]
pub enum SetOpError {
    /// Container opened read-only.
    ReadOnly,
    /// A membership probe failed.
    Fetch(FetchError),
    /// Inserting an element failed.
    Insert(InsertError),
    /// Removing an element failed.
    Remove(RemoveError),
    /// Implicit open of the handle failed.
    Open(OpenError),
    /// An underlying IO error.
    IO(io::Error),
}

impl Error for SetOpError {}

impl fmt::Display for SetOpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::ReadOnly => write!(f, "read only"),
            Self::Fetch(e) => write!(f, "fetch: {}", e),
            Self::Insert(e) => write!(f, "insert: {}", e),
            Self::Remove(e) => write!(f, "remove: {}", e),
            Self::Open(e) => write!(f, "open: {}", e),
            Self::IO(e) => write!(f, "io: {}", e),
        }
    }
}

impl From<io::Error> for SetOpError {
    fn from(io_err: io::Error) -> Self {
        Self::IO(io_err)
    }
}

impl From<FetchError> for SetOpError {
    fn from(err: FetchError) -> Self {
        Self::Fetch(err)
    }
}

impl From<InsertError> for SetOpError {
    fn from(err: InsertError) -> Self {
        Self::Insert(err)
    }
}

impl From<RemoveError> for SetOpError {
    fn from(err: RemoveError) -> Self {
        Self::Remove(err)
    }
}
