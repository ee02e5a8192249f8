//! On-disk image and journal byte layout (spec §4.6).
//!
//! All multi-byte integers are big-endian; offsets are byte offsets
//! from the start of the file; fields are kept 4-byte aligned. This
//! module only knows how to read/write the layout — `tree.rs` and
//! `builder.rs` own the semantics built on top of it.

use crate::metadata::error::{MetaError, MetaResult};
use byteorder::{BigEndian, ByteOrder};

pub const IMAGE_MAGIC: &[u8; 6] = b"\xda\x1ameta";
pub const JOURNAL_MAGIC: &[u8; 6] = b"\xda\x1ajour";
pub const FORMAT_MAJOR: u8 = 1;
pub const FORMAT_MINOR: u8 = 0;

/// `rotated_flag` value once an image has been superseded (spec §4.6
/// rotation step 5).
pub const ROTATED: u32 = 0xFFFF_FFFF;
pub const NOT_ROTATED: u32 = 0;

/// High bit of a Data entry's `key_id` marks the value as a string list.
pub const LIST_BIT: u32 = 0x8000_0000;

/// `Header` byte layout, fixed 32 bytes:
/// `magic(6) major(1) minor(1) rotated_flag(4) random_tag(4)
///  root_pointer(4) attributes_pointer(4) time_base(8)`.
pub const IMAGE_HEADER_SIZE: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct ImageHeader {
    pub major: u8,
    pub minor: u8,
    pub rotated_flag: u32,
    pub random_tag: u32,
    pub root_pointer: u32,
    pub attributes_pointer: u32,
    pub time_base: u64,
}

impl ImageHeader {
    pub fn parse(bytes: &[u8]) -> MetaResult<Self> {
        if bytes.len() < IMAGE_HEADER_SIZE {
            return Err(MetaError::CorruptImage("truncated header".into()));
        }
        if &bytes[0..6] != IMAGE_MAGIC {
            return Err(MetaError::CorruptImage("bad magic".into()));
        }
        let major = bytes[6];
        let minor = bytes[7];
        let rotated_flag = BigEndian::read_u32(&bytes[8..12]);
        let random_tag = BigEndian::read_u32(&bytes[12..16]);
        let root_pointer = BigEndian::read_u32(&bytes[16..20]);
        let attributes_pointer = BigEndian::read_u32(&bytes[20..24]);
        let time_base = BigEndian::read_u64(&bytes[24..32]);
        if root_pointer as usize >= bytes.len() && root_pointer != 0 {
            return Err(MetaError::CorruptImage("root_pointer out of bounds".into()));
        }
        Ok(ImageHeader {
            major,
            minor,
            rotated_flag,
            random_tag,
            root_pointer,
            attributes_pointer,
            time_base,
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![0u8; IMAGE_HEADER_SIZE];
        out[0..6].copy_from_slice(IMAGE_MAGIC);
        out[6] = self.major;
        out[7] = self.minor;
        BigEndian::write_u32(&mut out[8..12], self.rotated_flag);
        BigEndian::write_u32(&mut out[12..16], self.random_tag);
        BigEndian::write_u32(&mut out[16..20], self.root_pointer);
        BigEndian::write_u32(&mut out[20..24], self.attributes_pointer);
        BigEndian::write_u64(&mut out[24..32], self.time_base);
        out
    }
}

/// Read a NUL-terminated UTF-8 string starting at `offset`.
pub fn read_cstr(bytes: &[u8], offset: usize) -> MetaResult<&str> {
    if offset >= bytes.len() {
        return Err(MetaError::CorruptImage("string offset out of bounds".into()));
    }
    let end = bytes[offset..]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| MetaError::CorruptImage("unterminated string".into()))?;
    std::str::from_utf8(&bytes[offset..offset + end])
        .map_err(|_| MetaError::CorruptImage("non-UTF-8 string".into()))
}

/// Attribute-name interning table: `count:u32` followed by `count`
/// big-endian `u32` offsets to NUL-terminated strings, sorted by name
/// so lookups can binary-search.
pub struct AttributeTable<'a> {
    bytes: &'a [u8],
    base: usize,
    count: u32,
}

impl<'a> AttributeTable<'a> {
    pub fn parse(bytes: &'a [u8], offset: usize) -> MetaResult<Self> {
        if offset == 0 {
            return Ok(AttributeTable { bytes, base: 0, count: 0 });
        }
        if offset + 4 > bytes.len() {
            return Err(MetaError::CorruptImage("attribute table out of bounds".into()));
        }
        let count = BigEndian::read_u32(&bytes[offset..offset + 4]);
        let end = offset + 4 + (count as usize) * 4;
        if end > bytes.len() {
            return Err(MetaError::CorruptImage("attribute table overruns file".into()));
        }
        Ok(AttributeTable {
            bytes,
            base: offset + 4,
            count,
        })
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn name_offset(&self, index: u32) -> u32 {
        let pos = self.base + (index as usize) * 4;
        BigEndian::read_u32(&self.bytes[pos..pos + 4])
    }

    pub fn name_at(&self, index: u32) -> MetaResult<&'a str> {
        read_cstr(self.bytes, self.name_offset(index) as usize)
    }

    /// Binary search for `name`, returning its interned id (the table
    /// index), since the table is kept sorted by name.
    pub fn id_of(&self, name: &str) -> Option<u32> {
        let mut lo = 0i64;
        let mut hi = self.count as i64 - 1;
        while lo <= hi {
            let mid = (lo + hi) / 2;
            let candidate = self.name_at(mid as u32).ok()?;
            match candidate.cmp(name) {
                std::cmp::Ordering::Equal => return Some(mid as u32),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid - 1,
            }
        }
        None
    }
}

/// One decoded `Dir` child record.
#[derive(Debug, Clone)]
pub struct DirChild {
    pub name: String,
    pub children_off: u32,
    pub metadata_off: u32,
    pub mtime_delta: u32,
}

/// Decode a `Dir` node at `offset`: `num_children:u32` followed by that
/// many `{name_off, children_off, metadata_off, mtime_delta}` records.
pub fn read_dir_node(bytes: &[u8], offset: u32) -> MetaResult<Vec<DirChild>> {
    if offset == 0 {
        return Ok(Vec::new());
    }
    let offset = offset as usize;
    if offset + 4 > bytes.len() {
        return Err(MetaError::CorruptImage("dir node out of bounds".into()));
    }
    let n = BigEndian::read_u32(&bytes[offset..offset + 4]) as usize;
    let mut out = Vec::with_capacity(n);
    let mut pos = offset + 4;
    for _ in 0..n {
        if pos + 16 > bytes.len() {
            return Err(MetaError::CorruptImage("dir node record truncated".into()));
        }
        let name_off = BigEndian::read_u32(&bytes[pos..pos + 4]);
        let children_off = BigEndian::read_u32(&bytes[pos + 4..pos + 8]);
        let metadata_off = BigEndian::read_u32(&bytes[pos + 8..pos + 12]);
        let mtime_delta = BigEndian::read_u32(&bytes[pos + 12..pos + 16]);
        out.push(DirChild {
            name: read_cstr(bytes, name_off as usize)?.to_string(),
            children_off,
            metadata_off,
            mtime_delta,
        });
        pos += 16;
    }
    Ok(out)
}

/// One decoded `Data` key record.
#[derive(Debug, Clone)]
pub struct DataKey {
    pub key_id: u32,
    pub is_list: bool,
    pub value_off: u32,
}

/// Decode a `Data` node at `offset`: `num_keys:u32` followed by that
/// many `{key_id (high bit = is-list), value_off}` records.
pub fn read_data_node(bytes: &[u8], offset: u32) -> MetaResult<Vec<DataKey>> {
    if offset == 0 {
        return Ok(Vec::new());
    }
    let offset = offset as usize;
    if offset + 4 > bytes.len() {
        return Err(MetaError::CorruptImage("data node out of bounds".into()));
    }
    let n = BigEndian::read_u32(&bytes[offset..offset + 4]) as usize;
    let mut out = Vec::with_capacity(n);
    let mut pos = offset + 4;
    for _ in 0..n {
        if pos + 8 > bytes.len() {
            return Err(MetaError::CorruptImage("data node record truncated".into()));
        }
        let raw_id = BigEndian::read_u32(&bytes[pos..pos + 4]);
        let value_off = BigEndian::read_u32(&bytes[pos + 4..pos + 8]);
        out.push(DataKey {
            key_id: raw_id & !LIST_BIT,
            is_list: raw_id & LIST_BIT != 0,
            value_off,
        });
        pos += 8;
    }
    Ok(out)
}

/// A string-list value: `count:u32` followed by `count` big-endian
/// `u32` offsets into the string pool, one per element.
pub fn read_string_list(bytes: &[u8], offset: u32) -> MetaResult<Vec<String>> {
    if offset == 0 {
        return Ok(Vec::new());
    }
    let offset = offset as usize;
    if offset + 4 > bytes.len() {
        return Err(MetaError::CorruptImage("string list out of bounds".into()));
    }
    let n = BigEndian::read_u32(&bytes[offset..offset + 4]) as usize;
    let mut out = Vec::with_capacity(n);
    let mut pos = offset + 4;
    for _ in 0..n {
        if pos + 4 > bytes.len() {
            return Err(MetaError::CorruptImage("string list record truncated".into()));
        }
        let str_off = BigEndian::read_u32(&bytes[pos..pos + 4]);
        out.push(read_cstr(bytes, str_off as usize)?.to_string());
        pos += 4;
    }
    Ok(out)
}

/// Round `n` up to the next multiple of 4.
pub fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// The root path has no parent Dir-child record to carry its own
/// `metadata_off`/`children_off` pair (those fields normally live in
/// the *parent's* child record). `root_pointer` instead addresses a
/// small two-field envelope: `{ metadata_off:u32, children_off:u32 }`.
pub fn read_root_entry(bytes: &[u8], offset: u32) -> MetaResult<(u32, u32)> {
    if offset == 0 {
        return Ok((0, 0));
    }
    let offset = offset as usize;
    if offset + 8 > bytes.len() {
        return Err(MetaError::CorruptImage("root entry out of bounds".into()));
    }
    let metadata_off = BigEndian::read_u32(&bytes[offset..offset + 4]);
    let children_off = BigEndian::read_u32(&bytes[offset + 4..offset + 8]);
    Ok((metadata_off, children_off))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrips() {
        let h = ImageHeader {
            major: FORMAT_MAJOR,
            minor: FORMAT_MINOR,
            rotated_flag: NOT_ROTATED,
            random_tag: 0xdead_beef,
            root_pointer: 32,
            attributes_pointer: 0,
            time_base: 1_700_000_000,
        };
        let bytes = h.serialize();
        let parsed = ImageHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.random_tag, 0xdead_beef);
        assert_eq!(parsed.root_pointer, 32);
        assert_eq!(parsed.time_base, 1_700_000_000);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = vec![0u8; IMAGE_HEADER_SIZE];
        bytes[0..6].copy_from_slice(b"XXXXXX");
        assert!(ImageHeader::parse(&bytes).is_err());
    }

    #[test]
    fn align4_rounds_up() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(5), 8);
    }
}
