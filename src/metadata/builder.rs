//! In-memory tree builder used by rotation and by `metadata-nautilus`
//! to assemble a fresh static image (spec §4.6, grounded on the
//! original `metabuilder.c`'s `MetaBuilder`/`MetaFile`/`MetaData`
//! split).
//!
//! `MetaBuilder` is the write-side twin of the read-side types in
//! `format.rs`: it holds the whole tree as an ordinary in-memory
//! structure, lets callers mutate it with the same operations the
//! journal records (`set`, `unset`, `copy`, `remove`), and then
//! serializes it to the exact on-disk byte layout in one pass.

use crate::metadata::error::MetaResult;
use crate::metadata::format::{
    align4, AttributeTable, ImageHeader, IMAGE_HEADER_SIZE, LIST_BIT, NOT_ROTATED,
};
use crate::metadata::journal::{JournalEntry, JournalOp};
use byteorder::{BigEndian, ByteOrder};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct MetaData {
    pub is_list: bool,
    pub value: String,
    pub values: Vec<String>,
}

/// One node of the in-memory tree, keyed by name in its parent's
/// `children` map (mirrors `MetaFile` in the original).
#[derive(Debug, Clone, Default)]
pub struct MetaFile {
    pub children: BTreeMap<String, MetaFile>,
    pub last_changed: u64,
    pub data: BTreeMap<String, MetaData>,
}

impl MetaFile {
    fn lookup_child(&mut self, name: &str, create: bool) -> Option<&mut MetaFile> {
        if !self.children.contains_key(name) {
            if !create {
                return None;
            }
            self.children.insert(name.to_string(), MetaFile::default());
        }
        self.children.get_mut(name)
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect()
}

/// The whole tree under construction, plus the `time_t_base` rotation
/// picks for encoding `mtime_delta` fields.
pub struct MetaBuilder {
    pub root: MetaFile,
    pub time_base: u64,
}

impl MetaBuilder {
    pub fn new(time_base: u64) -> Self {
        MetaBuilder {
            root: MetaFile::default(),
            time_base,
        }
    }

    /// Replay a chronologically ordered list of journal entries onto
    /// this tree (used by rotation to merge the old image with its
    /// journal, and directly by a fresh in-memory tree before its
    /// first write).
    pub fn apply(&mut self, entries: &[JournalEntry]) {
        for entry in entries {
            self.apply_one(&entry.op, entry.mtime);
        }
    }

    pub fn apply_one(&mut self, op: &JournalOp, mtime: u64) {
        match op {
            JournalOp::SetKey { path, key, value } => {
                let file = self.lookup(path, true).expect("create=true always succeeds");
                file.last_changed = mtime;
                file.data.insert(
                    key.clone(),
                    MetaData {
                        is_list: false,
                        value: value.clone(),
                        values: Vec::new(),
                    },
                );
            }
            JournalOp::SetvKey { path, key, values } => {
                let file = self.lookup(path, true).expect("create=true always succeeds");
                file.last_changed = mtime;
                file.data.insert(
                    key.clone(),
                    MetaData {
                        is_list: true,
                        value: String::new(),
                        values: values.clone(),
                    },
                );
            }
            JournalOp::UnsetKey { path, key } => {
                if let Some(file) = self.lookup(path, false) {
                    file.data.remove(key);
                    file.last_changed = mtime;
                }
            }
            JournalOp::CopyPath { dst, src } => {
                self.copy(src, dst, mtime);
            }
            JournalOp::RemovePath { path } => {
                self.remove(path, mtime);
            }
        }
    }

    /// Look up a node by path, optionally creating intermediate
    /// directories (mirrors `meta_builder_lookup`).
    pub fn lookup(&mut self, path: &str, create: bool) -> Option<&mut MetaFile> {
        let segments = split_path(path);
        let mut current = &mut self.root;
        for seg in segments {
            current = current.lookup_child(seg, create)?;
        }
        Some(current)
    }

    /// Remove the subtree at `path` entirely (mirrors
    /// `meta_builder_remove`; `mtime` is currently unused since the
    /// parent doesn't persist a tombstone, matching the original).
    pub fn remove(&mut self, path: &str, _mtime: u64) {
        let segments = split_path(path);
        if segments.is_empty() {
            self.root = MetaFile::default();
            return;
        }
        let (last, parents) = segments.split_last().unwrap();
        let mut current = &mut self.root;
        for seg in parents {
            match current.children.get_mut(*seg) {
                Some(c) => current = c,
                None => return,
            }
        }
        current.children.remove(*last);
    }

    /// Deep-copy the subtree at `source` onto `dest`, overwriting
    /// whatever was at `dest` (mirrors `meta_builder_copy`).
    pub fn copy(&mut self, source: &str, dest: &str, mtime: u64) {
        let src_segments = split_path(source);
        let mut cursor = &self.root;
        let mut found = true;
        for seg in &src_segments {
            match cursor.children.get(*seg) {
                Some(c) => cursor = c,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if !found {
            return;
        }
        let cloned = cursor.clone();
        let dest_segments = split_path(dest);
        if dest_segments.is_empty() {
            self.root = cloned;
            self.root.last_changed = mtime;
            return;
        }
        let (last, parents) = dest_segments.split_last().unwrap();
        let mut current = &mut self.root;
        for seg in parents {
            current = current.lookup_child(seg, true).unwrap();
        }
        let mut cloned = cloned;
        cloned.last_changed = mtime;
        current.children.insert(last.to_string(), cloned);
    }

    /// Serialize the whole tree into the exact on-disk image byte
    /// layout described in spec §4.6, returning the finished bytes
    /// ready to be `fsync`'d to a temp file and renamed into place.
    pub fn serialize(&self, random_tag: u32) -> Vec<u8> {
        let mut attr_names: Vec<&str> = Vec::new();
        collect_attribute_names(&self.root, &mut attr_names);
        attr_names.sort_unstable();
        attr_names.dedup();

        let mut arena = Arena::new(IMAGE_HEADER_SIZE);
        let attributes_pointer = arena.write_attribute_table(&attr_names);
        let attr_ids: BTreeMap<&str, u32> = attr_names
            .iter()
            .enumerate()
            .map(|(i, n)| (*n, i as u32))
            .collect();

        let children_off = write_dir(&mut arena, &self.root, &attr_ids, self.time_base);
        let metadata_off = write_metadata(&mut arena, &self.root, &attr_ids);
        let root_pointer = arena.write_root_entry(metadata_off, children_off);

        let header = ImageHeader {
            major: crate::metadata::format::FORMAT_MAJOR,
            minor: crate::metadata::format::FORMAT_MINOR,
            rotated_flag: NOT_ROTATED,
            random_tag,
            root_pointer,
            attributes_pointer,
            time_base: self.time_base,
        };
        let mut out = header.serialize();
        out.extend_from_slice(&arena.buf[IMAGE_HEADER_SIZE..]);
        out
    }
}

fn collect_attribute_names<'a>(file: &'a MetaFile, out: &mut Vec<&'a str>) {
    for key in file.data.keys() {
        out.push(key.as_str());
    }
    for child in file.children.values() {
        collect_attribute_names(child, out);
    }
}

/// A growable output buffer plus a string pool, used to lay out the
/// image's nodes and strings in a single pass.
struct Arena {
    buf: Vec<u8>,
    strings: BTreeMap<String, u32>,
}

impl Arena {
    fn new(header_reserve: usize) -> Self {
        Arena {
            buf: vec![0u8; header_reserve],
            strings: BTreeMap::new(),
        }
    }

    fn intern(&mut self, s: &str) -> u32 {
        if let Some(off) = self.strings.get(s) {
            return *off;
        }
        let off = self.buf.len() as u32;
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        self.strings.insert(s.to_string(), off);
        self.pad_to_align();
        off
    }

    fn pad_to_align(&mut self) {
        let target = align4(self.buf.len());
        self.buf.resize(target, 0);
    }

    fn write_u32(&mut self, v: u32) {
        let mut b = [0u8; 4];
        BigEndian::write_u32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    fn write_attribute_table(&mut self, names: &[&str]) -> u32 {
        if names.is_empty() {
            return 0;
        }
        let name_offsets: Vec<u32> = names.iter().map(|n| self.intern(n)).collect();
        let off = self.buf.len() as u32;
        self.write_u32(names.len() as u32);
        for o in name_offsets {
            self.write_u32(o);
        }
        off
    }

    fn write_root_entry(&mut self, metadata_off: u32, children_off: u32) -> u32 {
        let off = self.buf.len() as u32;
        self.write_u32(metadata_off);
        self.write_u32(children_off);
        off
    }
}

fn write_metadata(arena: &mut Arena, file: &MetaFile, attr_ids: &BTreeMap<&str, u32>) -> u32 {
    if file.data.is_empty() {
        return 0;
    }
    let mut records = Vec::new();
    for (key, data) in &file.data {
        let key_id = attr_ids[key.as_str()];
        let value_off = if data.is_list {
            write_string_list(arena, &data.values)
        } else {
            arena.intern(&data.value)
        };
        let tagged_id = if data.is_list { key_id | LIST_BIT } else { key_id };
        records.push((tagged_id, value_off));
    }
    let off = arena.buf.len() as u32;
    arena.write_u32(records.len() as u32);
    for (id, value_off) in records {
        arena.write_u32(id);
        arena.write_u32(value_off);
    }
    off
}

fn write_string_list(arena: &mut Arena, values: &[String]) -> u32 {
    let offsets: Vec<u32> = values.iter().map(|v| arena.intern(v)).collect();
    let off = arena.buf.len() as u32;
    arena.write_u32(offsets.len() as u32);
    for o in offsets {
        arena.write_u32(o);
    }
    off
}

fn write_dir(
    arena: &mut Arena,
    file: &MetaFile,
    attr_ids: &BTreeMap<&str, u32>,
    time_base: u64,
) -> u32 {
    if file.children.is_empty() {
        return 0;
    }
    let mut records = Vec::new();
    for (name, child) in &file.children {
        let child_children_off = write_dir(arena, child, attr_ids, time_base);
        let child_metadata_off = write_metadata(arena, child, attr_ids);
        let name_off = arena.intern(name);
        let mtime_delta = if child.last_changed == 0 {
            0
        } else {
            child.last_changed.saturating_sub(time_base) as u32
        };
        records.push((name_off, child_children_off, child_metadata_off, mtime_delta));
    }
    let off = arena.buf.len() as u32;
    arena.write_u32(records.len() as u32);
    for (name_off, children_off, metadata_off, mtime_delta) in records {
        arena.write_u32(name_off);
        arena.write_u32(children_off);
        arena.write_u32(metadata_off);
        arena.write_u32(mtime_delta);
    }
    off
}

/// Load a whole tree from a validated image plus its journal, ready
/// for further mutation and re-serialization (spec §4.6 rotation step
/// 1: "merging the old image with all valid journal entries").
pub fn load_from_image(image: &crate::metadata::format::ImageHeader, bytes: &[u8]) -> MetaResult<MetaBuilder> {
    let mut builder = MetaBuilder::new(image.time_base);
    let attrs = AttributeTable::parse(bytes, image.attributes_pointer as usize)?;
    let (root_metadata_off, root_children_off) =
        crate::metadata::format::read_root_entry(bytes, image.root_pointer)?;
    load_data(&mut builder.root, bytes, root_metadata_off, &attrs)?;
    load_children(&mut builder.root, bytes, root_children_off, &attrs, image.time_base)?;
    Ok(builder)
}

fn load_data(
    file: &mut MetaFile,
    bytes: &[u8],
    metadata_off: u32,
    attrs: &AttributeTable<'_>,
) -> MetaResult<()> {
    for rec in crate::metadata::format::read_data_node(bytes, metadata_off)? {
        let key = attrs.name_at(rec.key_id)?.to_string();
        if rec.is_list {
            let values = crate::metadata::format::read_string_list(bytes, rec.value_off)?;
            file.data.insert(key, MetaData { is_list: true, value: String::new(), values });
        } else {
            let value = crate::metadata::format::read_cstr(bytes, rec.value_off as usize)?.to_string();
            file.data.insert(key, MetaData { is_list: false, value, values: Vec::new() });
        }
    }
    Ok(())
}

fn load_children(
    file: &mut MetaFile,
    bytes: &[u8],
    children_off: u32,
    attrs: &AttributeTable<'_>,
    time_base: u64,
) -> MetaResult<()> {
    for child_rec in crate::metadata::format::read_dir_node(bytes, children_off)? {
        let mut child = MetaFile::default();
        child.last_changed = if child_rec.mtime_delta == 0 {
            0
        } else {
            time_base + child_rec.mtime_delta as u64
        };
        load_data(&mut child, bytes, child_rec.metadata_off, attrs)?;
        load_children(&mut child, bytes, child_rec.children_off, attrs, time_base)?;
        file.children.insert(child_rec.name, child);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_lookup_roundtrip() {
        let mut b = MetaBuilder::new(0);
        b.apply_one(
            &JournalOp::SetKey { path: "/a/b".into(), key: "color".into(), value: "red".into() },
            100,
        );
        let file = b.lookup("/a/b", false).unwrap();
        assert_eq!(file.data.get("color").unwrap().value, "red");
    }

    #[test]
    fn remove_drops_subtree() {
        let mut b = MetaBuilder::new(0);
        b.apply_one(
            &JournalOp::SetKey { path: "/a/b".into(), key: "k".into(), value: "v".into() },
            1,
        );
        b.remove("/a", 2);
        assert!(b.lookup("/a/b", false).is_none());
    }

    #[test]
    fn copy_duplicates_descendants() {
        let mut b = MetaBuilder::new(0);
        b.apply_one(
            &JournalOp::SetKey { path: "/src/x".into(), key: "k".into(), value: "v".into() },
            1,
        );
        b.copy("/src", "/dst", 2);
        assert_eq!(b.lookup("/dst/x", false).unwrap().data.get("k").unwrap().value, "v");
        assert_eq!(b.lookup("/src/x", false).unwrap().data.get("k").unwrap().value, "v");
    }

    #[test]
    fn serialize_produces_parseable_header() {
        let mut b = MetaBuilder::new(1_700_000_000);
        b.apply_one(
            &JournalOp::SetKey { path: "/a".into(), key: "color".into(), value: "red".into() },
            1,
        );
        let bytes = b.serialize(0x1234);
        let header = ImageHeader::parse(&bytes).unwrap();
        assert_eq!(header.random_tag, 0x1234);
        assert_eq!(header.rotated_flag, NOT_ROTATED);
    }
}
