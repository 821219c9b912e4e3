#![deny(missing_docs)]

//! A file-backed associative container engine: an on-disk open-addressed hash table that can be
//! a key/value dictionary ([`map::FileMap`]) or a key set ([`set::FileSet`]).
//! The engine keeps essentially nothing in memory; every lookup, insert and delete walks a
//! single file through a small page cache, yet the containers behave like their in-memory
//! counterparts and survive arbitrary crashes.
//!
//! Crash safety comes from a single slot journal: each mutation records its intent (guarded by
//! a crc32), performs its writes, then clears the record.  Opening a file with a pending
//! record replays it; every operation is defined so replaying from any intermediate point is
//! safe.
//!
//! Keys hash as the crc32 of their serialized bytes (see
//! <https://github.com/srijs/rust-crc32fast>), never with the runtime's built-in hasher, so an
//! index stays valid across platforms and process restarts.  Keys and values move through the
//! [`element::ElementBytes`] contract; the primitive scalar shapes, strings, date-times, GUIDs
//! and sequences of these are provided.

pub(crate) mod crc;

pub mod comparer;
pub mod config;
pub mod element;
pub mod error;
pub mod map;
pub(crate) mod paged_file;
pub(crate) mod probe;
pub mod set;
pub mod table;
