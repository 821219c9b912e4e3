//! Pluggable key hashing and equality.  The default comparer never deserializes anything: keys
//! hash as the crc32 of their serialized bytes and compare byte for byte against the stored
//! form, which keeps both operations reproducible across platforms and runtimes.  Supplying a
//! custom comparer replaces both the hash and the equality at once, the two must always agree.

use crate::crc;
use crate::error::deserialize::DeserializeError;
use std::io::{ErrorKind, Read};

/// Hash and equality provider for keys.
///
/// `hash` receives both the key and its serialized bytes so implementations can work on either
/// form.  `equals` receives a reader positioned at the first byte of the stored key; it may
/// consume at most that key's bytes.
pub trait KeyComparer<K> {
    /// 32 bit hash of the key.  Must be stable across process restarts, the value is persisted
    /// in every item node.
    fn hash(&self, key: &K, serialized: &[u8]) -> i32;

    /// Compare the probe key against a stored key.
    fn equals(
        &self,
        key: &K,
        serialized: &[u8],
        stored: &mut dyn Read,
    ) -> Result<bool, DeserializeError>;
}

/// Default comparer: crc32 digest and byte-for-byte equality of serialized keys.
///
/// Relies on element encodings being self delimiting (no valid encoding is a strict prefix of
/// another), which every built in [`crate::element::ElementBytes`] implementation guarantees.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteKeyComparer;

impl<K> KeyComparer<K> for ByteKeyComparer {
    fn hash(&self, _key: &K, serialized: &[u8]) -> i32 {
        crc::digest(serialized)
    }

    fn equals(
        &self,
        _key: &K,
        serialized: &[u8],
        stored: &mut dyn Read,
    ) -> Result<bool, DeserializeError> {
        let mut buf = vec![0_u8; serialized.len()];
        match stored.read_exact(&mut buf) {
            Ok(()) => Ok(buf == serialized),
            // Running off the end of the file just means the stored key is shorter.
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(DeserializeError::IO(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementBytes;

    #[test]
    fn test_byte_comparer_equality() {
        let comparer = ByteKeyComparer;
        let mut probe = Vec::new();
        42_u32.write(&mut probe).unwrap();
        let mut stored = Vec::new();
        42_u32.write(&mut stored).unwrap();
        assert!(comparer.equals(&42_u32, &probe, &mut &stored[..]).unwrap());

        let mut other = Vec::new();
        43_u32.write(&mut other).unwrap();
        assert!(!comparer.equals(&42_u32, &probe, &mut &other[..]).unwrap());
    }

    #[test]
    fn test_hash_matches_serialized_digest() {
        // The empty string serializes to its length byte plus the not-missing flag, and the
        // key digest is the crc32 of exactly those bytes.
        let comparer = ByteKeyComparer;
        let empty = String::new();
        let mut bytes = Vec::new();
        empty.write(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0, 0]);
        assert_eq!(
            comparer.hash(&empty, &bytes),
            crc32fast::hash(&[0, 0]) as i32
        );
    }

    #[test]
    fn test_truncated_stored_key_is_unequal() {
        let comparer = ByteKeyComparer;
        let mut probe = Vec::new();
        7_u64.write(&mut probe).unwrap();
        let short = [0_u8; 3];
        assert!(!comparer.equals(&7_u64, &probe, &mut &short[..]).unwrap());
    }
}
