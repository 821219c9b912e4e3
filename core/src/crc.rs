//! Wrapper functions for the crc32 codes that guard file records.  Record checksums are always
//! the last four bytes of the record in little endian format.

/// Check a record buffer's crc32.  The last 4 bytes of the buffer are the stored code and the
/// rest of the buffer is checked against it.
pub(crate) fn check_crc(buffer: &[u8]) -> bool {
    if buffer.len() < 5 {
        return false;
    }
    let (body, tail) = buffer.split_at(buffer.len() - 4);
    let mut read_crc = [0_u8; 4];
    read_crc.copy_from_slice(tail);
    crc32fast::hash(body) == u32::from_le_bytes(read_crc)
}

/// Stamp a crc32 code onto a record buffer.  The last four bytes are overwritten with the code
/// of the rest of the buffer.
pub(crate) fn add_crc32(buffer: &mut [u8]) {
    if buffer.len() < 4 {
        return;
    }
    let body_len = buffer.len() - 4;
    let crc = crc32fast::hash(&buffer[..body_len]);
    buffer[body_len..].copy_from_slice(&crc.to_le_bytes());
}

/// One shot digest of a byte slice, reinterpreted as a signed 32 bit value.  Used as the
/// platform stable hash of a serialized key.
pub(crate) fn digest(bytes: &[u8]) -> i32 {
    crc32fast::hash(bytes) as i32
}
