//! Contains the trait keys and values must implement to move between their in memory form and
//! the bytes stored in an item node, plus implementations for the primitive shapes the engine
//! supports out of the box.
//!
//! Scalars are written little endian at fixed width with no framing.  Strings are UTF-8 behind a
//! 7 bit encoded length, with one asymmetry: an empty string is followed by an extra flag byte so
//! that empty and missing can be told apart (see [`Option<String>`]'s implementation).  Sequences
//! are a 32 bit little endian count followed by that many elements.
//!
//! Every encoding here is self delimiting: a reader can always tell where an element ends without
//! outside help, and no valid encoding is a strict prefix of another.  Custom implementations
//! must keep that property, the engine relies on it when comparing stored keys in place.

use crate::error::deserialize::DeserializeError;
use crate::error::serialize::SerializeError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use std::io::{Read, Write};
use uuid::Uuid;

/// .NET style ticks run at 100ns resolution from 0001-01-01T00:00:00.
const TICKS_PER_SECOND: i64 = 10_000_000;
/// Tick count of the unix epoch.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Trait all key and value types must implement to convert to and from stored bytes.
///
/// The pair of functions must round trip, and the encoding must be self delimiting.  Writing
/// happens into a scratch buffer before anything touches the file, so implementations are free
/// to fail part way through.
pub trait ElementBytes<T> {
    /// Serialize the element onto the writer.
    fn write(&self, writer: &mut dyn Write) -> Result<(), SerializeError>;

    /// Read one element back off the reader, consuming exactly the bytes `write` produced.
    fn read(reader: &mut dyn Read) -> Result<T, DeserializeError>;
}

/// Write a length as a 7 bit encoded integer (low 7 bits per byte, high bit means more).
fn write_len7(writer: &mut dyn Write, mut value: u32) -> Result<(), SerializeError> {
    while value >= 0x80 {
        writer.write_u8((value as u8 & 0x7F) | 0x80)?;
        value >>= 7;
    }
    writer.write_u8(value as u8)?;
    Ok(())
}

/// Read a 7 bit encoded length.  More than five bytes means a corrupt stream.
fn read_len7(reader: &mut dyn Read) -> Result<u32, DeserializeError> {
    let mut value = 0_u32;
    for shift in (0..35).step_by(7) {
        let byte = reader.read_u8()?;
        value |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(DeserializeError::InvalidLength)
}

macro_rules! scalar_element {
    ($t:ty, $write:ident, $read:ident) => {
        impl ElementBytes<$t> for $t {
            fn write(&self, writer: &mut dyn Write) -> Result<(), SerializeError> {
                writer.$write::<LittleEndian>(*self)?;
                Ok(())
            }

            fn read(reader: &mut dyn Read) -> Result<$t, DeserializeError> {
                Ok(reader.$read::<LittleEndian>()?)
            }
        }
    };
}

scalar_element!(u16, write_u16, read_u16);
scalar_element!(i16, write_i16, read_i16);
scalar_element!(u32, write_u32, read_u32);
scalar_element!(i32, write_i32, read_i32);
scalar_element!(u64, write_u64, read_u64);
scalar_element!(i64, write_i64, read_i64);
scalar_element!(u128, write_u128, read_u128);
scalar_element!(i128, write_i128, read_i128);
scalar_element!(f32, write_f32, read_f32);
scalar_element!(f64, write_f64, read_f64);

impl ElementBytes<u8> for u8 {
    fn write(&self, writer: &mut dyn Write) -> Result<(), SerializeError> {
        writer.write_u8(*self)?;
        Ok(())
    }

    fn read(reader: &mut dyn Read) -> Result<u8, DeserializeError> {
        Ok(reader.read_u8()?)
    }
}

impl ElementBytes<i8> for i8 {
    fn write(&self, writer: &mut dyn Write) -> Result<(), SerializeError> {
        writer.write_i8(*self)?;
        Ok(())
    }

    fn read(reader: &mut dyn Read) -> Result<i8, DeserializeError> {
        Ok(reader.read_i8()?)
    }
}

impl ElementBytes<bool> for bool {
    fn write(&self, writer: &mut dyn Write) -> Result<(), SerializeError> {
        writer.write_u8(*self as u8)?;
        Ok(())
    }

    fn read(reader: &mut dyn Read) -> Result<bool, DeserializeError> {
        Ok(reader.read_u8()? != 0)
    }
}

/// Stored as a single UTF-16 code unit.  Characters outside the basic multilingual plane do not
/// fit in one unit and are rejected on write.
impl ElementBytes<char> for char {
    fn write(&self, writer: &mut dyn Write) -> Result<(), SerializeError> {
        let code = *self as u32;
        if code > u16::MAX as u32 {
            return Err(SerializeError::CharRange);
        }
        writer.write_u16::<LittleEndian>(code as u16)?;
        Ok(())
    }

    fn read(reader: &mut dyn Read) -> Result<char, DeserializeError> {
        let code = reader.read_u16::<LittleEndian>()? as u32;
        char::from_u32(code).ok_or(DeserializeError::InvalidChar)
    }
}

/// UTF-8 bytes behind a 7 bit encoded length.  An empty string carries one extra flag byte
/// (always zero here) so a reader can distinguish it from a missing string.
impl ElementBytes<String> for String {
    fn write(&self, writer: &mut dyn Write) -> Result<(), SerializeError> {
        let bytes = self.as_bytes();
        if bytes.len() > u32::MAX as usize {
            return Err(SerializeError::TooLarge);
        }
        write_len7(writer, bytes.len() as u32)?;
        writer.write_all(bytes)?;
        if bytes.is_empty() {
            writer.write_u8(0)?;
        }
        Ok(())
    }

    fn read(reader: &mut dyn Read) -> Result<String, DeserializeError> {
        let len = read_len7(reader)? as usize;
        let mut bytes = vec![0_u8; len];
        reader.read_exact(&mut bytes)?;
        if len == 0 && reader.read_u8()? != 0 {
            // The missing-string flag, only Option<String> can represent it.
            return Err(DeserializeError::NullValue);
        }
        String::from_utf8(bytes).map_err(|_| DeserializeError::InvalidUtf8)
    }
}

/// Same wire shape as [`String`] with `None` encoded as an empty string whose flag byte is set.
impl ElementBytes<Option<String>> for Option<String> {
    fn write(&self, writer: &mut dyn Write) -> Result<(), SerializeError> {
        match self {
            Some(s) => s.write(writer),
            None => {
                write_len7(writer, 0)?;
                writer.write_u8(1)?;
                Ok(())
            }
        }
    }

    fn read(reader: &mut dyn Read) -> Result<Option<String>, DeserializeError> {
        let len = read_len7(reader)? as usize;
        let mut bytes = vec![0_u8; len];
        reader.read_exact(&mut bytes)?;
        if len == 0 {
            return if reader.read_u8()? != 0 {
                Ok(None)
            } else {
                Ok(Some(String::new()))
            };
        }
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| DeserializeError::InvalidUtf8)
    }
}

/// One kind byte (written as 1, UTC) followed by 64 bit ticks: 100ns intervals since
/// 0001-01-01T00:00:00.
impl ElementBytes<DateTime<Utc>> for DateTime<Utc> {
    fn write(&self, writer: &mut dyn Write) -> Result<(), SerializeError> {
        let ticks = self
            .timestamp()
            .checked_mul(TICKS_PER_SECOND)
            .and_then(|t| t.checked_add(self.timestamp_subsec_nanos() as i64 / 100))
            .and_then(|t| t.checked_add(UNIX_EPOCH_TICKS))
            .ok_or(SerializeError::TimeRange)?;
        writer.write_u8(1)?;
        writer.write_i64::<LittleEndian>(ticks)?;
        Ok(())
    }

    fn read(reader: &mut dyn Read) -> Result<DateTime<Utc>, DeserializeError> {
        let _kind = reader.read_u8()?;
        let ticks = reader.read_i64::<LittleEndian>()? - UNIX_EPOCH_TICKS;
        let secs = ticks.div_euclid(TICKS_PER_SECOND);
        let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
        DateTime::from_timestamp(secs, nanos).ok_or(DeserializeError::TimeRange)
    }
}

/// Sixteen bytes in RFC-4122 order.
impl ElementBytes<Uuid> for Uuid {
    fn write(&self, writer: &mut dyn Write) -> Result<(), SerializeError> {
        writer.write_all(self.as_bytes())?;
        Ok(())
    }

    fn read(reader: &mut dyn Read) -> Result<Uuid, DeserializeError> {
        let mut bytes = [0_u8; 16];
        reader.read_exact(&mut bytes)?;
        Ok(Uuid::from_bytes(bytes))
    }
}

/// The unit value serializes to nothing.  A hash set stores its keys with unit values.
impl ElementBytes<()> for () {
    fn write(&self, _writer: &mut dyn Write) -> Result<(), SerializeError> {
        Ok(())
    }

    fn read(_reader: &mut dyn Read) -> Result<(), DeserializeError> {
        Ok(())
    }
}

/// Homogeneous sequence: a 32 bit little endian count followed by the elements.
impl<T> ElementBytes<Vec<T>> for Vec<T>
where
    T: ElementBytes<T>,
{
    fn write(&self, writer: &mut dyn Write) -> Result<(), SerializeError> {
        if self.len() > i32::MAX as usize {
            return Err(SerializeError::TooLarge);
        }
        writer.write_i32::<LittleEndian>(self.len() as i32)?;
        for element in self {
            element.write(writer)?;
        }
        Ok(())
    }

    fn read(reader: &mut dyn Read) -> Result<Vec<T>, DeserializeError> {
        let count = reader.read_i32::<LittleEndian>()?;
        if count < 0 {
            return Err(DeserializeError::InvalidCount);
        }
        // Cap the pre-allocation, the count is untrusted until the elements actually parse.
        let mut out = Vec::with_capacity((count as usize).min(1024));
        for _ in 0..count {
            out.push(T::read(reader)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of<T: ElementBytes<T>>(value: &T) -> Vec<u8> {
        let mut buf = Vec::new();
        value.write(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_empty_string_wire_shape() {
        // Empty writes a zero length byte plus the not-missing flag.
        assert_eq!(bytes_of(&String::new()), vec![0, 0]);
        // Missing writes the same length but flips the flag.
        assert_eq!(bytes_of(&None::<String>), vec![0, 1]);
        assert_eq!(
            Option::<String>::read(&mut &[0_u8, 1][..]).unwrap(),
            None::<String>
        );
        assert_eq!(
            Option::<String>::read(&mut &[0_u8, 0][..]).unwrap(),
            Some(String::new())
        );
        // A plain String cannot represent missing.
        assert!(matches!(
            String::read(&mut &[0_u8, 1][..]),
            Err(DeserializeError::NullValue)
        ));
    }

    #[test]
    fn test_nonempty_string_has_no_flag() {
        let buf = bytes_of(&"hi".to_string());
        assert_eq!(buf, vec![2, b'h', b'i']);
        assert_eq!(String::read(&mut &buf[..]).unwrap(), "hi");
    }

    #[test]
    fn test_len7_boundaries() {
        let s = "x".repeat(300);
        let buf = bytes_of(&s);
        // 300 = 0b1_0101100 -> 0xAC 0x02.
        assert_eq!(&buf[..2], &[0xAC, 0x02]);
        assert_eq!(String::read(&mut &buf[..]).unwrap(), s);
    }

    #[test]
    fn test_scalar_widths() {
        assert_eq!(bytes_of(&0x01020304_u32), vec![4, 3, 2, 1]);
        assert_eq!(bytes_of(&true), vec![1]);
        assert_eq!(bytes_of(&1_u128).len(), 16);
        assert_eq!(bytes_of(&1.5_f64).len(), 8);
    }

    #[test]
    fn test_char_is_a_code_unit() {
        assert_eq!(bytes_of(&'A'), vec![0x41, 0]);
        assert!(matches!(
            '😀'.write(&mut Vec::<u8>::new()),
            Err(SerializeError::CharRange)
        ));
    }

    #[test]
    fn test_sequence_count_prefix() {
        let v: Vec<u32> = vec![7, 8];
        let buf = bytes_of(&v);
        assert_eq!(buf, vec![2, 0, 0, 0, 7, 0, 0, 0, 8, 0, 0, 0]);
        assert_eq!(Vec::<u32>::read(&mut &buf[..]).unwrap(), v);
        assert!(matches!(
            Vec::<u32>::read(&mut &[0xFF_u8, 0xFF, 0xFF, 0xFF][..]),
            Err(DeserializeError::InvalidCount)
        ));
    }

    #[test]
    fn test_datetime_round_trip() {
        let unix_epoch = DateTime::from_timestamp(0, 0).unwrap();
        let buf = bytes_of(&unix_epoch);
        assert_eq!(buf.len(), 9);
        assert_eq!(buf[0], 1);
        assert_eq!(DateTime::<Utc>::read(&mut &buf[..]).unwrap(), unix_epoch);

        let later = DateTime::from_timestamp(1_700_000_000, 123_456_700).unwrap();
        let buf = bytes_of(&later);
        assert_eq!(DateTime::<Utc>::read(&mut &buf[..]).unwrap(), later);
    }

    #[test]
    fn test_uuid_rfc4122_order() {
        let id = uuid::uuid!("3165e4f9-203b-4741-a186-ea34659a94b7");
        let buf = bytes_of(&id);
        assert_eq!(buf[..4], [0x31, 0x65, 0xE4, 0xF9]);
        assert_eq!(Uuid::read(&mut &buf[..]).unwrap(), id);
    }
}
