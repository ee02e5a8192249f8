//! Append-only metadata journal: header, entry framing, CRC validation,
//! and the append/rotation-trigger writer (spec §4.6 "Journal").
//!
//! Entries are appended "record-first-then-increment-count" so a
//! reader that observes `num_entries == K` is guaranteed the first `K`
//! entries are intact (spec §5 "Ordering").

use crate::metadata::error::{MetaError, MetaResult};
use crate::metadata::format::align4;
use byteorder::{BigEndian, ByteOrder};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const JOURNAL_HEADER_SIZE: usize = 20;
/// New journal files are preallocated and zero-filled (spec §4.6).
pub const PREALLOC_SIZE: u32 = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    SetKey = 0,
    SetvKey = 1,
    UnsetKey = 2,
    CopyPath = 3,
    RemovePath = 4,
}

impl EntryType {
    fn from_u8(v: u8) -> MetaResult<Self> {
        Ok(match v {
            0 => EntryType::SetKey,
            1 => EntryType::SetvKey,
            2 => EntryType::UnsetKey,
            3 => EntryType::CopyPath,
            4 => EntryType::RemovePath,
            other => return Err(MetaError::CorruptJournal(format!("unknown entry type {other}"))),
        })
    }
}

/// One journal operation (spec §4.6's `Entry.payload` variants).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalOp {
    SetKey { path: String, key: String, value: String },
    SetvKey { path: String, key: String, values: Vec<String> },
    UnsetKey { path: String, key: String },
    CopyPath { dst: String, src: String },
    RemovePath { path: String },
}

impl JournalOp {
    fn entry_type(&self) -> EntryType {
        match self {
            JournalOp::SetKey { .. } => EntryType::SetKey,
            JournalOp::SetvKey { .. } => EntryType::SetvKey,
            JournalOp::UnsetKey { .. } => EntryType::UnsetKey,
            JournalOp::CopyPath { .. } => EntryType::CopyPath,
            JournalOp::RemovePath { .. } => EntryType::RemovePath,
        }
    }

    fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let push_cstr = |out: &mut Vec<u8>, s: &str| {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        };
        match self {
            JournalOp::SetKey { path, key, value } => {
                push_cstr(&mut out, path);
                push_cstr(&mut out, key);
                push_cstr(&mut out, value);
            }
            JournalOp::SetvKey { path, key, values } => {
                push_cstr(&mut out, path);
                push_cstr(&mut out, key);
                let mut count_buf = [0u8; 4];
                BigEndian::write_u32(&mut count_buf, values.len() as u32);
                out.extend_from_slice(&count_buf);
                for v in values {
                    push_cstr(&mut out, v);
                }
            }
            JournalOp::UnsetKey { path, key } => {
                push_cstr(&mut out, path);
                push_cstr(&mut out, key);
            }
            JournalOp::CopyPath { dst, src } => {
                push_cstr(&mut out, dst);
                push_cstr(&mut out, src);
            }
            JournalOp::RemovePath { path } => {
                push_cstr(&mut out, path);
            }
        }
        out
    }

    fn decode_payload(ty: EntryType, bytes: &[u8]) -> MetaResult<Self> {
        fn read_cstr(bytes: &[u8], pos: &mut usize) -> MetaResult<String> {
            let end = bytes[*pos..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| MetaError::CorruptJournal("unterminated string".into()))?;
            let s = std::str::from_utf8(&bytes[*pos..*pos + end])
                .map_err(|_| MetaError::CorruptJournal("non-UTF-8 payload".into()))?
                .to_string();
            *pos += end + 1;
            Ok(s)
        }
        let mut pos = 0usize;
        Ok(match ty {
            EntryType::SetKey => {
                let path = read_cstr(bytes, &mut pos)?;
                let key = read_cstr(bytes, &mut pos)?;
                let value = read_cstr(bytes, &mut pos)?;
                JournalOp::SetKey { path, key, value }
            }
            EntryType::SetvKey => {
                let path = read_cstr(bytes, &mut pos)?;
                let key = read_cstr(bytes, &mut pos)?;
                if pos + 4 > bytes.len() {
                    return Err(MetaError::CorruptJournal("truncated list count".into()));
                }
                let count = BigEndian::read_u32(&bytes[pos..pos + 4]) as usize;
                pos += 4;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(read_cstr(bytes, &mut pos)?);
                }
                JournalOp::SetvKey { path, key, values }
            }
            EntryType::UnsetKey => {
                let path = read_cstr(bytes, &mut pos)?;
                let key = read_cstr(bytes, &mut pos)?;
                JournalOp::UnsetKey { path, key }
            }
            EntryType::CopyPath => {
                let dst = read_cstr(bytes, &mut pos)?;
                let src = read_cstr(bytes, &mut pos)?;
                JournalOp::CopyPath { dst, src }
            }
            EntryType::RemovePath => {
                let path = read_cstr(bytes, &mut pos)?;
                JournalOp::RemovePath { path }
            }
        })
    }
}

/// A validated journal entry plus its write timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub mtime: u64,
    pub op: JournalOp,
}

/// Serialize one entry to its final on-disk byte form (spec §4.6
/// `Entry` layout): `entry_size, crc32, mtime, type, payload, padding,
/// entry_size` (duplicated).
pub fn encode_entry(op: &JournalOp, mtime: u64) -> Vec<u8> {
    let payload = op.encode_payload();
    let head_len = 4 + 4 + 8 + 1; // entry_size + crc32 + mtime + type
    let unpadded = head_len + payload.len() + 4; // + trailing duplicate entry_size
    let total = align4(unpadded);
    let pad_len = total - unpadded;

    let mut crc_input = Vec::with_capacity(8 + 1 + payload.len() + pad_len);
    let mut mtime_buf = [0u8; 8];
    BigEndian::write_u64(&mut mtime_buf, mtime);
    crc_input.extend_from_slice(&mtime_buf);
    crc_input.push(op.entry_type() as u8);
    crc_input.extend_from_slice(&payload);
    crc_input.resize(crc_input.len() + pad_len, 0);
    let crc = crc32fast::hash(&crc_input);

    let mut out = Vec::with_capacity(total);
    let mut size_buf = [0u8; 4];
    BigEndian::write_u32(&mut size_buf, total as u32);
    out.extend_from_slice(&size_buf);
    let mut crc_buf = [0u8; 4];
    BigEndian::write_u32(&mut crc_buf, crc);
    out.extend_from_slice(&crc_buf);
    out.extend_from_slice(&crc_input);
    out.extend_from_slice(&size_buf);
    out
}

/// Decode and validate one entry starting at `bytes[offset..]`.
/// Returns the entry and its total byte length, or an error describing
/// why validation failed (caller treats this as "valid prefix ends
/// here", per spec §4.6's torn-append failure model).
pub fn decode_entry(bytes: &[u8], offset: usize) -> MetaResult<(JournalEntry, usize)> {
    if offset % 4 != 0 {
        return Err(MetaError::CorruptJournal("misaligned entry".into()));
    }
    if offset + 8 > bytes.len() {
        return Err(MetaError::CorruptJournal("truncated entry header".into()));
    }
    let entry_size = BigEndian::read_u32(&bytes[offset..offset + 4]) as usize;
    if entry_size < 17 || entry_size % 4 != 0 {
        return Err(MetaError::CorruptJournal("implausible entry_size".into()));
    }
    if offset + entry_size > bytes.len() {
        return Err(MetaError::CorruptJournal("entry overruns file".into()));
    }
    let crc_stored = BigEndian::read_u32(&bytes[offset + 4..offset + 8]);
    let body_start = offset + 8;
    let body_end = offset + entry_size - 4;
    if body_end < body_start + 9 {
        return Err(MetaError::CorruptJournal("entry body too short".into()));
    }
    let body = &bytes[body_start..body_end];
    let trailing = BigEndian::read_u32(&bytes[body_end..body_end + 4]);
    if trailing as usize != entry_size {
        return Err(MetaError::CorruptJournal("trailing length mismatch".into()));
    }
    let crc_actual = crc32fast::hash(body);
    if crc_actual != crc_stored {
        return Err(MetaError::CorruptJournal("CRC mismatch".into()));
    }
    let mtime = BigEndian::read_u64(&body[0..8]);
    let ty = EntryType::from_u8(body[8])?;
    let op = JournalOp::decode_payload(ty, &body[9..])?;
    Ok((JournalEntry { mtime, op }, entry_size))
}

#[derive(Debug, Clone, Copy)]
pub struct JournalHeader {
    pub random_tag: u32,
    pub file_size: u32,
    pub num_entries: u32,
}

impl JournalHeader {
    pub fn parse(bytes: &[u8]) -> MetaResult<Self> {
        if bytes.len() < JOURNAL_HEADER_SIZE {
            return Err(MetaError::CorruptJournal("truncated header".into()));
        }
        if &bytes[0..6] != crate::metadata::format::JOURNAL_MAGIC {
            return Err(MetaError::CorruptJournal("bad magic".into()));
        }
        Ok(JournalHeader {
            random_tag: BigEndian::read_u32(&bytes[8..12]),
            file_size: BigEndian::read_u32(&bytes[12..16]),
            num_entries: BigEndian::read_u32(&bytes[16..20]),
        })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = vec![0u8; JOURNAL_HEADER_SIZE];
        out[0..6].copy_from_slice(crate::metadata::format::JOURNAL_MAGIC);
        out[6] = crate::metadata::format::FORMAT_MAJOR;
        out[7] = crate::metadata::format::FORMAT_MINOR;
        BigEndian::write_u32(&mut out[8..12], self.random_tag);
        BigEndian::write_u32(&mut out[12..16], self.file_size);
        BigEndian::write_u32(&mut out[16..20], self.num_entries);
        out
    }
}

/// Compute the journal filename for a given image filename and random
/// tag, per spec §4.6: `<image>-<tag_hex>.log`.
pub fn journal_path_for(image_path: &Path, random_tag: u32) -> PathBuf {
    let mut name = image_path.as_os_str().to_os_string();
    name.push(format!("-{random_tag:08x}.log"));
    PathBuf::from(name)
}

/// Validate a journal file against an image's `random_tag`, returning
/// the valid-prefix entries in file order (oldest first).
pub fn read_and_validate(path: &Path, expected_tag: u32) -> MetaResult<Vec<JournalEntry>> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let header = JournalHeader::parse(&bytes)?;
    if header.random_tag != expected_tag {
        return Err(MetaError::CorruptJournal("random_tag mismatch".into()));
    }
    let mut entries = Vec::new();
    let mut offset = JOURNAL_HEADER_SIZE;
    for _ in 0..header.num_entries {
        match decode_entry(&bytes, offset) {
            Ok((entry, len)) => {
                entries.push(entry);
                offset += len;
            }
            Err(e) => {
                log::warn!("journal entry validation stopped at offset {offset}: {e}");
                break;
            }
        }
    }
    Ok(entries)
}

/// Create a fresh, preallocated journal file with a new random tag
/// (spec §4.6 rotation step 3).
pub fn create_new_journal(path: &Path, random_tag: u32) -> MetaResult<()> {
    let header = JournalHeader {
        random_tag,
        file_size: PREALLOC_SIZE,
        num_entries: 0,
    };
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(&header.serialize())?;
    file.set_len(PREALLOC_SIZE as u64)?;
    file.sync_all()?;
    Ok(())
}

/// A single-writer handle on a live journal file: appends entries in
/// place and reports when rotation should be triggered.
pub struct JournalWriter {
    file: File,
    path: PathBuf,
    random_tag: u32,
    next_offset: u64,
    file_size: u64,
    num_entries: u32,
}

impl JournalWriter {
    pub fn open(path: &Path) -> MetaResult<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut header_bytes = [0u8; JOURNAL_HEADER_SIZE];
        file.read_exact(&mut header_bytes)?;
        let header = JournalHeader::parse(&header_bytes)?;
        // `read_and_validate` already walks the valid-prefix, stopping
        // short of `num_entries` if the last append was torn; trust its
        // count and re-encode each entry to find where it ends rather
        // than trusting `num_entries` blindly or re-decoding from bytes.
        let entries = read_and_validate(path, header.random_tag)?;
        let offset = entries.iter().fold(JOURNAL_HEADER_SIZE as u64, |off, e| {
            off + encode_entry(&e.op, e.mtime).len() as u64
        });
        Ok(JournalWriter {
            file,
            path: path.to_path_buf(),
            random_tag: header.random_tag,
            next_offset: offset,
            file_size: header.file_size as u64,
            num_entries: entries.len() as u32,
        })
    }

    pub fn random_tag(&self) -> u32 {
        self.random_tag
    }

    pub fn num_entries(&self) -> u32 {
        self.num_entries
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry. Returns `Err(MetaError::JournalFull)` if there
    /// isn't room, in which case the caller should rotate (spec §4.6
    /// "Write path" / "Rotation").
    pub fn append(&mut self, op: &JournalOp, mtime: u64) -> MetaResult<()> {
        let bytes = encode_entry(op, mtime);
        if self.next_offset + bytes.len() as u64 > self.file_size {
            return Err(MetaError::JournalFull);
        }
        self.file.seek(SeekFrom::Start(self.next_offset))?;
        self.file.write_all(&bytes)?;
        self.file.sync_data()?;
        self.next_offset += bytes.len() as u64;
        self.num_entries += 1;
        // "record-first-then-increment-count": the entry bytes are
        // durable before num_entries advances, so a reader that sees
        // the new count is guaranteed to see intact bytes.
        self.file.seek(SeekFrom::Start(16))?;
        self.file.write_all(&self.num_entries.to_be_bytes())?;
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_roundtrips() {
        let op = JournalOp::SetKey {
            path: "/a/b".into(),
            key: "color".into(),
            value: "red".into(),
        };
        let bytes = encode_entry(&op, 1_700_000_000);
        assert_eq!(bytes.len() % 4, 0);
        let (decoded, len) = decode_entry(&bytes, 0).unwrap();
        assert_eq!(len, bytes.len());
        assert_eq!(decoded.mtime, 1_700_000_000);
        assert_eq!(decoded.op, op);
    }

    #[test]
    fn setv_roundtrips_list() {
        let op = JournalOp::SetvKey {
            path: "/a/b".into(),
            key: "tags".into(),
            values: vec!["x".into(), "y".into()],
        };
        let bytes = encode_entry(&op, 42);
        let (decoded, _) = decode_entry(&bytes, 0).unwrap();
        assert_eq!(decoded.op, op);
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let op = JournalOp::RemovePath { path: "/x".into() };
        let mut bytes = encode_entry(&op, 1);
        bytes[10] ^= 0xFF; // flip a byte inside the CRC-covered region
        assert!(decode_entry(&bytes, 0).is_err());
    }

    #[test]
    fn journal_path_naming() {
        let p = journal_path_for(Path::new("/var/lib/gvfsd/metadata/root"), 0xdead_beef);
        assert_eq!(p.to_str().unwrap(), "/var/lib/gvfsd/metadata/root-deadbeef.log");
    }
}
