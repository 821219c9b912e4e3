//! On-disk node formats and the fixed layout constants.  The file is laid out as a 48 byte
//! header, a 32 byte journal record, the lookup section and then the item section:
//!
//! ```text
//! bytes  0..15   signature GUID
//! bytes 16..23   count               (i64 le)
//! bytes 24..31   capacity            (i64 le)
//! bytes 32..39   item section offset (i64 le)
//! bytes 40..47   end of file offset  (i64 le)
//! bytes 48..51   journal operation   (i32 le)
//! bytes 52..75   journal arguments   (3 x i64 le)
//! bytes 76..79   journal crc32 over bytes 48..75
//! bytes 80..     lookup slots, then item nodes
//! ```

use crate::crc::{add_crc32, check_crc};
use crate::paged_file::PagedFile;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io;
use std::io::{Read, Seek, SeekFrom, Write};
use uuid::{uuid, Uuid};

/// Size of the fixed header at offset 0.
pub(crate) const HEADER_SIZE: usize = 48;
/// Offset of the journal record.
pub(crate) const JOURNAL_OFFSET: u64 = 48;
/// Size of the journal record.
pub(crate) const JOURNAL_SIZE: usize = 32;
/// Offset of the first lookup slot.
pub(crate) const LOOKUP_SECTION: u64 = 80;
/// Fixed prefix of an item node: lookup back-pointer, next pointer, hash code.
pub(crate) const ITEM_HEAD_SIZE: u64 = 20;
/// Just the two pointers of an item node, the part rewritten when orphans are fused.
pub(crate) const ITEM_LINK_SIZE: u64 = 16;
/// Lookup slot value for a slot that was never occupied.
pub(crate) const NEVER_USED: u64 = 0;
/// Lookup slot value for a slot whose item was deleted.
pub(crate) const TOMBSTONE: u64 = 1;
/// Capacity of a fresh container.
pub(crate) const INITIAL_CAPACITY: u64 = 16;
/// Occupancy ratio that triggers lookup section growth.
pub(crate) const LOAD_FACTOR: f64 = 0.7;

/// Signature of a dictionary file.
const MAP_SIGNATURE: Uuid = uuid!("3165e4f9-203b-4741-a186-ea34659a94b7");
/// Signature of a hash set file.
const SET_SIGNATURE: Uuid = uuid!("6527713f-78ae-43da-8e37-718afed99927");

/// Which of the two container flavors a file holds.  Sets carry a 4 byte marker per lookup
/// slot on top of the item pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TableKind {
    /// Key to value dictionary, 8 byte lookup nodes.
    Map,
    /// Key set, 12 byte lookup nodes (item pointer + marker).
    Set,
}

impl TableKind {
    /// Size in bytes of one lookup slot.
    pub fn node_size(&self) -> u64 {
        match self {
            TableKind::Map => 8,
            TableKind::Set => 12,
        }
    }

    /// Default file signature for this kind, in RFC-4122 byte order.
    pub fn signature(&self) -> [u8; 16] {
        match self {
            TableKind::Map => *MAP_SIGNATURE.as_bytes(),
            TableKind::Set => *SET_SIGNATURE.as_bytes(),
        }
    }
}

/// The fixed header at the front of the file.  Rewritten in place by every mutation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderNode {
    pub signature: [u8; 16],
    pub count: u64,
    pub capacity: u64,
    pub item_section: u64,
    pub eof: u64,
}

impl HeaderNode {
    /// Header of an empty container with the initial capacity.
    pub fn new(signature: [u8; 16], node_size: u64) -> Self {
        let item_section = LOOKUP_SECTION + INITIAL_CAPACITY * node_size;
        Self {
            signature,
            count: 0,
            capacity: INITIAL_CAPACITY,
            item_section,
            eof: item_section,
        }
    }

    /// Load the header from the front of the file.
    pub fn load(file: &mut PagedFile) -> io::Result<Self> {
        let mut buffer = [0_u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buffer)?;
        let mut signature = [0_u8; 16];
        signature.copy_from_slice(&buffer[..16]);
        let mut rest = &buffer[16..];
        Ok(Self {
            signature,
            count: rest.read_u64::<LittleEndian>()?,
            capacity: rest.read_u64::<LittleEndian>()?,
            item_section: rest.read_u64::<LittleEndian>()?,
            eof: rest.read_u64::<LittleEndian>()?,
        })
    }

    /// Write the header back to the front of the file.
    pub fn store(&self, file: &mut PagedFile) -> io::Result<()> {
        let mut buffer = Vec::with_capacity(HEADER_SIZE);
        buffer.extend_from_slice(&self.signature);
        buffer.write_u64::<LittleEndian>(self.count)?;
        buffer.write_u64::<LittleEndian>(self.capacity)?;
        buffer.write_u64::<LittleEndian>(self.item_section)?;
        buffer.write_u64::<LittleEndian>(self.eof)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&buffer)
    }
}

/// Operation codes for the single slot journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JournalOp {
    None,
    Set,
    Delete,
    GrowLookupSection,
    RebuildLookupTable,
    WriteItemNodePointers,
    Truncate,
    Clear,
}

impl JournalOp {
    fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(JournalOp::None),
            1 => Some(JournalOp::Set),
            2 => Some(JournalOp::Delete),
            3 => Some(JournalOp::GrowLookupSection),
            4 => Some(JournalOp::RebuildLookupTable),
            5 => Some(JournalOp::WriteItemNodePointers),
            6 => Some(JournalOp::Truncate),
            7 => Some(JournalOp::Clear),
            _ => None,
        }
    }

    fn as_i32(self) -> i32 {
        match self {
            JournalOp::None => 0,
            JournalOp::Set => 1,
            JournalOp::Delete => 2,
            JournalOp::GrowLookupSection => 3,
            JournalOp::RebuildLookupTable => 4,
            JournalOp::WriteItemNodePointers => 5,
            JournalOp::Truncate => 6,
            JournalOp::Clear => 7,
        }
    }
}

/// The single slot journal record at offset 48.  The meaning of the three argument fields
/// depends on the operation; the crc32 covers the operation and arguments.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JournalNode {
    pub op: JournalOp,
    pub lookup: u64,
    pub item: u64,
    pub sync: u64,
}

impl JournalNode {
    /// The cleared record written after every completed mutation.
    pub fn none() -> Self {
        Self {
            op: JournalOp::None,
            lookup: 0,
            item: 0,
            sync: 0,
        }
    }

    /// Load the journal record.  Returns the record and whether it validated; a corrupt
    /// checksum or unknown operation comes back as a `None` record flagged invalid.
    pub fn load(file: &mut PagedFile) -> io::Result<(Self, bool)> {
        let mut buffer = [0_u8; JOURNAL_SIZE];
        file.seek(SeekFrom::Start(JOURNAL_OFFSET))?;
        file.read_exact(&mut buffer)?;
        if !check_crc(&buffer) {
            return Ok((Self::none(), false));
        }
        let mut rest = &buffer[..];
        let code = rest.read_i32::<LittleEndian>()?;
        let lookup = rest.read_u64::<LittleEndian>()?;
        let item = rest.read_u64::<LittleEndian>()?;
        let sync = rest.read_u64::<LittleEndian>()?;
        match JournalOp::from_i32(code) {
            Some(op) => Ok((Self { op, lookup, item, sync }, true)),
            None => Ok((Self::none(), false)),
        }
    }

    /// Write the journal record with a fresh checksum.
    pub fn store(&self, file: &mut PagedFile) -> io::Result<()> {
        let mut buffer = [0_u8; JOURNAL_SIZE];
        {
            let mut cursor = &mut buffer[..];
            cursor.write_i32::<LittleEndian>(self.op.as_i32())?;
            cursor.write_u64::<LittleEndian>(self.lookup)?;
            cursor.write_u64::<LittleEndian>(self.item)?;
            cursor.write_u64::<LittleEndian>(self.sync)?;
        }
        add_crc32(&mut buffer);
        file.seek(SeekFrom::Start(JOURNAL_OFFSET))?;
        file.write_all(&buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    fn temp_paged(dir: &tempfile::TempDir) -> PagedFile {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.path().join("nodes"))
            .unwrap();
        PagedFile::new(file, 4096, false).unwrap()
    }

    #[test]
    fn test_header_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = temp_paged(&dir);
        let header = HeaderNode {
            signature: TableKind::Map.signature(),
            count: 3,
            capacity: 16,
            item_section: 208,
            eof: 300,
        };
        header.store(&mut file).unwrap();
        let back = HeaderNode::load(&mut file).unwrap();
        assert_eq!(back.signature, header.signature);
        assert_eq!(back.count, 3);
        assert_eq!(back.capacity, 16);
        assert_eq!(back.item_section, 208);
        assert_eq!(back.eof, 300);
    }

    #[test]
    fn test_journal_round_trip_and_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = temp_paged(&dir);
        // Room for header + journal.
        file.set_len(LOOKUP_SECTION).unwrap();
        let record = JournalNode {
            op: JournalOp::Set,
            lookup: 96,
            item: 208,
            sync: 1,
        };
        record.store(&mut file).unwrap();
        let (back, valid) = JournalNode::load(&mut file).unwrap();
        assert!(valid);
        assert_eq!(back.op, JournalOp::Set);
        assert_eq!(back.lookup, 96);
        assert_eq!(back.item, 208);
        assert_eq!(back.sync, 1);

        // Flip a byte inside the record, the load must demote it to None.
        file.seek(SeekFrom::Start(JOURNAL_OFFSET + 10)).unwrap();
        std::io::Write::write_all(&mut file, &[0xFF]).unwrap();
        let (back, valid) = JournalNode::load(&mut file).unwrap();
        assert!(!valid);
        assert_eq!(back.op, JournalOp::None);
    }

    #[test]
    fn test_node_sizes_and_signatures() {
        assert_eq!(TableKind::Map.node_size(), 8);
        assert_eq!(TableKind::Set.node_size(), 12);
        assert_eq!(
            TableKind::Map.signature()[..4],
            [0x31, 0x65, 0xE4, 0xF9]
        );
        assert_ne!(TableKind::Map.signature(), TableKind::Set.signature());
    }
}
