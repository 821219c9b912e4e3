//! Derives the two 64 bit probe functions from a key's 32 bit hash code.  The lookup section is
//! probed with double hashing: the first function picks the home slot and the second supplies the
//! stride for collisions.  Both are built by folding the hash a nibble at a time into small
//! multiplicative hashes so they stay reproducible everywhere.

/// Fold the hash code into a 64 bit value, consuming the low nibble first.
fn fold(hash: i32, seed: u64, mult: u64) -> u64 {
    let bits = hash as u32 as u64;
    let mut acc = seed;
    for i in 0..8 {
        acc = acc.wrapping_mul(mult).wrapping_add((bits >> (i * 4)) & 0xF);
    }
    acc
}

/// First probe function, selects the home slot position.
pub(crate) fn first_hash(hash: i32) -> u64 {
    fold(hash, 17, 23)
}

/// Second probe function, the collision stride.  Forced odd so every slot gets visited when the
/// capacity is a power of two.
pub(crate) fn collision_offset(hash: i32) -> u64 {
    fold(hash, 13, 29) | 1
}

/// Probe position k of the chain for a key, reduced modulo capacity.
pub(crate) fn position(first: u64, offset: u64, k: u64, capacity: u64) -> u64 {
    first.wrapping_add(k.wrapping_mul(offset)) % capacity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_hash() {
        // All nibbles zero just runs the multiplier: 17 * 23^8 and 13 * 29^8 | 1.
        assert_eq!(first_hash(0), 17 * 23_u64.pow(8));
        assert_eq!(collision_offset(0), 13 * 29_u64.pow(8) | 1);
    }

    #[test]
    fn test_offset_always_odd() {
        for hash in [0, 1, -1, 42, i32::MAX, i32::MIN, 0x7070_7070] {
            assert_eq!(collision_offset(hash) & 1, 1, "hash {}", hash);
        }
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(first_hash(0x1234_5678), first_hash(0x1234_5678));
        assert_ne!(first_hash(1), first_hash(2));
    }

    #[test]
    fn test_odd_stride_covers_power_of_two() {
        // With an odd stride and power of two capacity the chain must visit every position.
        let first = first_hash(99);
        let offset = collision_offset(99);
        let capacity = 16_u64;
        let mut seen = [false; 16];
        for k in 0..capacity {
            seen[position(first, offset, k, capacity) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
