//! `MetaTree`: the read/write façade over one on-disk metadata image
//! plus its journal (spec §4.6 "Read path" / "Write path" /
//! "Rotation").
//!
//! Mirrors the original `metatree.c`'s `MetaTree` object. Unlike the
//! original's fine-grained locking, this port guards the whole
//! in-memory view (mapped image + validated journal entries) with a
//! single `Mutex`: the spec already requires a file-level lock for
//! writers and a refresh-on-rotation discipline for readers, and
//! nothing in this crate's usage (CLI tools, a demonstration daemon)
//! needs finer-grained concurrency than that buys.

use crate::metadata::builder::{self, MetaBuilder};
use crate::metadata::error::{MetaError, MetaResult};
use crate::metadata::format::{self, AttributeTable, ImageHeader};
use crate::metadata::journal::{self, JournalEntry, JournalOp, JournalWriter};
use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// A single value read back from the tree: either a plain string or a
/// string list (spec §3 "mapping of attribute-name -> value (string or
/// string list)"). Untagged so a `FileInfo` serialized for an
/// out-of-process caller carries plain JSON strings/arrays rather than
/// an internal `{"String": ...}` wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    String(String),
    StringList(Vec<String>),
}

/// One entry reported by `enumerate_dir`.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub last_changed: u64,
    pub has_children: bool,
    pub has_data: bool,
}

struct TreeInner {
    mmap: Mmap,
    header: ImageHeader,
    /// Validated journal entries, oldest first.
    journal: Vec<JournalEntry>,
    writer: Option<JournalWriter>,
}

/// One mounted metadata tree backed by `<path>` and its sidecar
/// journal `<path>-<tag>.log`.
pub struct MetaTree {
    path: PathBuf,
    inner: Mutex<TreeInner>,
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn split_path(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect()
}

/// `Some(remainder)` (without a leading slash, `""` if equal) when
/// `prefix` is `path` or an ancestor of `path`; spec §4.6's
/// "`path` has `p` as a path prefix" test.
fn prefix_remainder(prefix: &str, path: &str) -> Option<String> {
    let prefix = prefix.trim_end_matches('/');
    let path_trimmed = path.trim_end_matches('/');
    if prefix.is_empty() || prefix == "/" {
        return Some(path_trimmed.trim_start_matches('/').to_string());
    }
    if prefix == path_trimmed {
        return Some(String::new());
    }
    path_trimmed
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|s| s.to_string())
}

fn direct_child_name(parent: &str, candidate: &str) -> Option<String> {
    let rem = prefix_remainder(parent, candidate)?;
    if rem.is_empty() {
        return None;
    }
    Some(rem.split('/').next().unwrap().to_string())
}

fn join_path(base: &str, remainder: &str) -> String {
    if remainder.is_empty() {
        base.to_string()
    } else if base == "/" || base.is_empty() {
        format!("/{remainder}")
    } else {
        format!("{}/{}", base.trim_end_matches('/'), remainder)
    }
}

impl TreeInner {
    fn open(path: &Path, for_write: bool) -> MetaResult<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let header = ImageHeader::parse(&mmap)?;
        let journal_path = journal::journal_path_for(path, header.random_tag);
        let journal = if journal_path.exists() {
            journal::read_and_validate(&journal_path, header.random_tag)?
        } else {
            Vec::new()
        };
        let writer = if for_write {
            if !journal_path.exists() {
                journal::create_new_journal(&journal_path, header.random_tag)?;
            }
            Some(JournalWriter::open(&journal_path)?)
        } else {
            None
        };
        Ok(TreeInner { mmap, header, journal, writer })
    }

    fn is_rotated(&self) -> bool {
        BigEndian::read_u32(&self.mmap[8..12]) != format::NOT_ROTATED
    }
}

impl MetaTree {
    /// Open (or create, if absent) the tree image at `path`.
    pub fn open(path: impl Into<PathBuf>, for_write: bool) -> MetaResult<Self> {
        let path = path.into();
        if !path.exists() {
            create_empty_image(&path)?;
        }
        let inner = TreeInner::open(&path, for_write)?;
        Ok(MetaTree { path, inner: Mutex::new(inner) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort advisory check for whether the tree's directory
    /// sits on an NFS mount, where mmap coherency across clients isn't
    /// guaranteed (spec §4.6 ADD `is_on_nfs`). Reads `/proc/mounts`;
    /// returns `false` if that's unavailable (non-Linux, sandboxed).
    pub fn is_on_nfs(&self) -> bool {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("/"));
        let Ok(dir) = dir.canonicalize() else { return false };
        let Ok(mounts) = std::fs::read_to_string("/proc/mounts") else { return false };
        let mut best: Option<(&str, &str)> = None;
        for line in mounts.lines() {
            let mut parts = line.split_whitespace();
            let (Some(_dev), Some(mountpoint), Some(fstype)) = (parts.next(), parts.next(), parts.next()) else {
                continue;
            };
            if dir.starts_with(mountpoint) {
                let better = match best {
                    Some((mp, _)) => mountpoint.len() > mp.len(),
                    None => true,
                };
                if better {
                    best = Some((mountpoint, fstype));
                }
            }
        }
        matches!(best, Some((_, fstype)) if fstype.starts_with("nfs"))
    }

    /// Refresh: if the mapped image's `rotated_flag` has flipped,
    /// reopen the (now-renamed-over) file and its new journal (spec
    /// §4.6 "Concurrent readers notice rotated_flag != 0...").
    pub fn refresh(&self) -> MetaResult<bool> {
        let mut guard = self.inner.lock().unwrap();
        if !guard.is_rotated() {
            return Ok(false);
        }
        let for_write = guard.writer.is_some();
        *guard = TreeInner::open(&self.path, for_write)?;
        log::debug!("metadata tree {:?} refreshed after rotation", self.path);
        Ok(true)
    }

    fn maybe_refresh(&self) {
        if let Ok(true) = self.refresh() {}
    }

    pub fn lookup_string(&self, path: &str, key: &str) -> MetaResult<Option<String>> {
        match self.resolve_key(path, key)? {
            Some(MetaValue::String(s)) => Ok(Some(s)),
            Some(MetaValue::StringList(_)) | None => Ok(None),
        }
    }

    pub fn lookup_stringv(&self, path: &str, key: &str) -> MetaResult<Option<Vec<String>>> {
        match self.resolve_key(path, key)? {
            Some(MetaValue::StringList(v)) => Ok(Some(v)),
            Some(MetaValue::String(_)) | None => Ok(None),
        }
    }

    /// Core read-path algorithm: walk the journal newest-first,
    /// rewriting the query path on `COPY_PATH` ancestors, and fall
    /// back to the mapped image (spec §4.6 "Read path").
    fn resolve_key(&self, path: &str, key: &str) -> MetaResult<Option<MetaValue>> {
        self.maybe_refresh();
        let guard = self.inner.lock().unwrap();
        let mut query = path.to_string();
        for entry in guard.journal.iter().rev() {
            match &entry.op {
                JournalOp::SetKey { path: p, key: k, value } if p == &query && k == key => {
                    return Ok(Some(MetaValue::String(value.clone())));
                }
                JournalOp::SetvKey { path: p, key: k, values } if p == &query && k == key => {
                    return Ok(Some(MetaValue::StringList(values.clone())));
                }
                JournalOp::UnsetKey { path: p, key: k } if p == &query && k == key => {
                    return Ok(None);
                }
                JournalOp::CopyPath { dst, src } => {
                    if let Some(rest) = prefix_remainder(dst, &query) {
                        query = join_path(src, &rest);
                    }
                }
                JournalOp::RemovePath { path: p } => {
                    if prefix_remainder(p, &query).is_some() {
                        return Ok(None);
                    }
                }
                _ => {}
            }
        }
        image_lookup(&guard.mmap, &guard.header, &query, key)
    }

    pub fn last_changed(&self, path: &str) -> MetaResult<u64> {
        self.maybe_refresh();
        let guard = self.inner.lock().unwrap();
        let mut query = path.to_string();
        for entry in guard.journal.iter().rev() {
            let touches = match &entry.op {
                JournalOp::SetKey { path: p, .. }
                | JournalOp::SetvKey { path: p, .. }
                | JournalOp::UnsetKey { path: p, .. }
                | JournalOp::RemovePath { path: p } => p == &query,
                JournalOp::CopyPath { dst, .. } => dst == &query,
            };
            if touches {
                return Ok(entry.mtime);
            }
            if let JournalOp::CopyPath { dst, src } = &entry.op {
                if let Some(rest) = prefix_remainder(dst, &query) {
                    query = join_path(src, &rest);
                }
            }
        }
        image_last_changed(&guard.mmap, &guard.header, &query)
    }

    pub fn enumerate_keys(&self, path: &str) -> MetaResult<Vec<String>> {
        self.maybe_refresh();
        let guard = self.inner.lock().unwrap();
        let mut seen: std::collections::HashMap<String, bool> = std::collections::HashMap::new();
        let mut query = path.to_string();
        let mut removed = false;
        for entry in guard.journal.iter().rev() {
            match &entry.op {
                JournalOp::SetKey { path: p, key, .. } if p == &query => {
                    seen.entry(key.clone()).or_insert(true);
                }
                JournalOp::SetvKey { path: p, key, .. } if p == &query => {
                    seen.entry(key.clone()).or_insert(true);
                }
                JournalOp::UnsetKey { path: p, key } if p == &query => {
                    seen.entry(key.clone()).or_insert(false);
                }
                JournalOp::CopyPath { dst, src } => {
                    if let Some(rest) = prefix_remainder(dst, &query) {
                        query = join_path(src, &rest);
                    }
                }
                JournalOp::RemovePath { path: p } => {
                    if prefix_remainder(p, &query).is_some() {
                        removed = true;
                        break;
                    }
                }
                _ => {}
            }
        }
        let mut result: Vec<String> = seen.iter().filter(|(_, &set)| set).map(|(k, _)| k.clone()).collect();
        if !removed {
            if let Ok(image_keys) = image_keys(&guard.mmap, &guard.header, &query) {
                for k in image_keys {
                    if !seen.contains_key(&k) {
                        result.push(k);
                    }
                }
            }
        }
        result.sort();
        result.dedup();
        Ok(result)
    }

    pub fn enumerate_dir(&self, path: &str) -> MetaResult<Vec<DirEntry>> {
        self.maybe_refresh();
        let guard = self.inner.lock().unwrap();
        let mut exists: std::collections::BTreeMap<String, bool> = std::collections::BTreeMap::new();
        for entry in &guard.journal {
            match &entry.op {
                JournalOp::SetKey { path: p, .. }
                | JournalOp::SetvKey { path: p, .. }
                | JournalOp::UnsetKey { path: p, .. } => {
                    if let Some(child) = direct_child_name(path, p) {
                        exists.insert(child, true);
                    }
                }
                JournalOp::CopyPath { dst, .. } => {
                    if let Some(child) = direct_child_name(path, dst) {
                        exists.insert(child, true);
                    }
                }
                JournalOp::RemovePath { path: p } => {
                    if let Some(child) = direct_child_name(path, p) {
                        exists.insert(child, false);
                    }
                }
            }
        }
        let mut names: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        for (name, keep) in &exists {
            if *keep {
                names.insert(name.clone());
            }
        }
        if let Ok(children) = image_dir_children(&guard.mmap, &guard.header, path) {
            for name in children {
                if exists.get(&name).copied().unwrap_or(true) {
                    names.insert(name);
                }
            }
        }
        let mut out = Vec::new();
        drop(guard);
        for name in names {
            let child_path = join_path(path, &name);
            let keys = self.enumerate_keys(&child_path)?;
            let has_children = !self.enumerate_dir_names_only(&child_path)?.is_empty();
            out.push(DirEntry {
                last_changed: self.last_changed(&child_path)?,
                has_children,
                has_data: !keys.is_empty(),
                name,
            });
        }
        Ok(out)
    }

    fn enumerate_dir_names_only(&self, path: &str) -> MetaResult<Vec<String>> {
        Ok(self.enumerate_dir_shallow(path)?)
    }

    // Avoids infinite recursion/lock re-entry: a shallow variant of
    // `enumerate_dir` that only needs names, used by `has_children`.
    fn enumerate_dir_shallow(&self, path: &str) -> MetaResult<Vec<String>> {
        let guard = self.inner.lock().unwrap();
        let mut names: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        for entry in &guard.journal {
            match &entry.op {
                JournalOp::SetKey { path: p, .. }
                | JournalOp::SetvKey { path: p, .. }
                | JournalOp::UnsetKey { path: p, .. } => {
                    if let Some(child) = direct_child_name(path, p) {
                        names.insert(child);
                    }
                }
                JournalOp::CopyPath { dst, .. } => {
                    if let Some(child) = direct_child_name(path, dst) {
                        names.insert(child);
                    }
                }
                _ => {}
            }
        }
        if let Ok(children) = image_dir_children(&guard.mmap, &guard.header, path) {
            names.extend(children);
        }
        Ok(names.into_iter().collect())
    }

    fn append(&self, op: JournalOp) -> MetaResult<()> {
        let mtime = now_secs();
        let mut guard = self.inner.lock().unwrap();
        let writer = guard
            .writer
            .as_mut()
            .ok_or_else(|| MetaError::CorruptJournal("tree opened read-only".into()))?;
        match writer.append(&op, mtime) {
            Ok(()) => {
                guard.journal.push(JournalEntry { mtime, op });
                Ok(())
            }
            Err(MetaError::JournalFull) => {
                drop(guard);
                self.flush()?;
                let mut guard = self.inner.lock().unwrap();
                let writer = guard.writer.as_mut().expect("flush recreates writer");
                writer.append(&op, mtime)?;
                guard.journal.push(JournalEntry { mtime, op });
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn set_string(&self, path: &str, key: &str, value: &str) -> MetaResult<()> {
        self.append(JournalOp::SetKey {
            path: path.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn set_stringv(&self, path: &str, key: &str, values: &[String]) -> MetaResult<()> {
        self.append(JournalOp::SetvKey {
            path: path.to_string(),
            key: key.to_string(),
            values: values.to_vec(),
        })
    }

    pub fn unset(&self, path: &str, key: &str) -> MetaResult<()> {
        self.append(JournalOp::UnsetKey { path: path.to_string(), key: key.to_string() })
    }

    pub fn remove(&self, path: &str) -> MetaResult<()> {
        self.append(JournalOp::RemovePath { path: path.to_string() })
    }

    pub fn copy(&self, source: &str, dest: &str) -> MetaResult<()> {
        self.append(JournalOp::CopyPath { dst: dest.to_string(), src: source.to_string() })
    }

    /// Rebuild the static image from image+journal and replace both
    /// atomically (spec §4.6 "Rotation").
    pub fn flush(&self) -> MetaResult<()> {
        let mut guard = self.inner.lock().unwrap();
        log::debug!("rotating metadata tree {:?}", self.path);
        let mut tree = builder::load_from_image(&guard.header, &guard.mmap)?;
        tree.apply(&guard.journal);

        let new_tag: u32 = rand::random();
        let new_bytes = tree.serialize(new_tag);

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = dir.join(format!(
            ".{}.tmp-{:08x}",
            self.path.file_name().and_then(|n| n.to_str()).unwrap_or("meta"),
            new_tag
        ));
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&new_bytes)?;
            tmp.sync_all()?;
        }

        let new_journal_path = journal::journal_path_for(&self.path, new_tag);
        journal::create_new_journal(&new_journal_path, new_tag)?;

        let old_journal_path = journal::journal_path_for(&self.path, guard.header.random_tag);
        patch_rotated_flag(&self.path)?;

        std::fs::rename(&tmp_path, &self.path)?;
        fsync_dir(dir)?;

        if old_journal_path.exists() {
            let _ = std::fs::remove_file(&old_journal_path);
        }

        *guard = TreeInner::open(&self.path, true)?;
        log::info!("metadata tree {:?} rotated to tag {:08x}", self.path, new_tag);
        Ok(())
    }
}

fn patch_rotated_flag(path: &Path) -> MetaResult<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(8))?;
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, format::ROTATED);
    file.write_all(&buf)?;
    file.sync_data()?;
    Ok(())
}

fn fsync_dir(dir: &Path) -> MetaResult<()> {
    let f = File::open(dir)?;
    f.sync_all()?;
    Ok(())
}

fn create_empty_image(path: &Path) -> MetaResult<()> {
    let random_tag: u32 = rand::random();
    let builder = MetaBuilder::new(now_secs());
    let bytes = builder.serialize(random_tag);
    std::fs::write(path, &bytes)?;
    let journal_path = journal::journal_path_for(path, random_tag);
    journal::create_new_journal(&journal_path, random_tag)?;
    Ok(())
}

fn image_lookup(bytes: &[u8], header: &ImageHeader, path: &str, key: &str) -> MetaResult<Option<MetaValue>> {
    let attrs = AttributeTable::parse(bytes, header.attributes_pointer as usize)?;
    let Some(key_id) = attrs.id_of(key) else { return Ok(None) };
    let Some(metadata_off) = resolve_metadata_off(bytes, header, path)? else { return Ok(None) };
    for rec in format::read_data_node(bytes, metadata_off)? {
        if rec.key_id == key_id {
            return Ok(Some(if rec.is_list {
                MetaValue::StringList(format::read_string_list(bytes, rec.value_off)?)
            } else {
                MetaValue::String(format::read_cstr(bytes, rec.value_off as usize)?.to_string())
            }));
        }
    }
    Ok(None)
}

fn image_last_changed(bytes: &[u8], header: &ImageHeader, path: &str) -> MetaResult<u64> {
    let segments = split_path(path);
    let (_, mut children_off) = format::read_root_entry(bytes, header.root_pointer)?;
    let mut mtime_delta = 0u32;
    for seg in segments {
        let dir = format::read_dir_node(bytes, children_off)?;
        match dir.iter().find(|c| c.name == seg) {
            Some(child) => {
                children_off = child.children_off;
                mtime_delta = child.mtime_delta;
            }
            None => return Ok(0),
        }
    }
    Ok(if mtime_delta == 0 { 0 } else { header.time_base + mtime_delta as u64 })
}

fn resolve_metadata_off(bytes: &[u8], header: &ImageHeader, path: &str) -> MetaResult<Option<u32>> {
    let segments = split_path(path);
    let (root_metadata_off, root_children_off) = format::read_root_entry(bytes, header.root_pointer)?;
    if segments.is_empty() {
        return Ok(Some(root_metadata_off));
    }
    let mut children_off = root_children_off;
    let mut metadata_off = 0u32;
    for (i, seg) in segments.iter().enumerate() {
        let dir = format::read_dir_node(bytes, children_off)?;
        match dir.iter().find(|c| &c.name == seg) {
            Some(child) => {
                children_off = child.children_off;
                metadata_off = child.metadata_off;
                let _ = i;
            }
            None => return Ok(None),
        }
    }
    Ok(Some(metadata_off))
}

fn image_keys(bytes: &[u8], header: &ImageHeader, path: &str) -> MetaResult<Vec<String>> {
    let attrs = AttributeTable::parse(bytes, header.attributes_pointer as usize)?;
    let Some(metadata_off) = resolve_metadata_off(bytes, header, path)? else { return Ok(Vec::new()) };
    let mut out = Vec::new();
    for rec in format::read_data_node(bytes, metadata_off)? {
        out.push(attrs.name_at(rec.key_id)?.to_string());
    }
    Ok(out)
}

fn image_dir_children(bytes: &[u8], header: &ImageHeader, path: &str) -> MetaResult<Vec<String>> {
    let segments = split_path(path);
    let (_, mut children_off) = format::read_root_entry(bytes, header.root_pointer)?;
    for seg in segments {
        let dir = format::read_dir_node(bytes, children_off)?;
        match dir.iter().find(|c| c.name == seg) {
            Some(child) => children_off = child.children_off,
            None => return Ok(Vec::new()),
        }
    }
    Ok(format::read_dir_node(bytes, children_off)?.into_iter().map(|c| c.name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_get_unset_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("root");
        let tree = MetaTree::open(&path, true).unwrap();

        tree.set_string("/a/b", "color", "red").unwrap();
        assert_eq!(tree.lookup_string("/a/b", "color").unwrap(), Some("red".to_string()));

        tree.set_string("/a/b", "color", "blue").unwrap();
        assert_eq!(tree.lookup_string("/a/b", "color").unwrap(), Some("blue".to_string()));

        tree.unset("/a/b", "color").unwrap();
        assert_eq!(tree.lookup_string("/a/b", "color").unwrap(), None);
    }

    #[test]
    fn setv_and_enumerate_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("root");
        let tree = MetaTree::open(&path, true).unwrap();

        tree.set_stringv("/a/b", "tags", &["x".to_string(), "y".to_string()]).unwrap();
        assert_eq!(
            tree.lookup_stringv("/a/b", "tags").unwrap(),
            Some(vec!["x".to_string(), "y".to_string()])
        );
        assert_eq!(tree.enumerate_keys("/a/b").unwrap(), vec!["tags".to_string()]);
    }

    #[test]
    fn remove_clears_descendants() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("root");
        let tree = MetaTree::open(&path, true).unwrap();

        tree.set_string("/a/b", "k", "v").unwrap();
        tree.remove("/a").unwrap();
        assert_eq!(tree.lookup_string("/a/b", "k").unwrap(), None);
    }

    #[test]
    fn copy_propagates_to_descendants() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("root");
        let tree = MetaTree::open(&path, true).unwrap();

        tree.set_string("/src/x", "k", "v").unwrap();
        tree.copy("/src", "/dst").unwrap();
        assert_eq!(tree.lookup_string("/dst/x", "k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn rotation_preserves_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("root");
        let tree = MetaTree::open(&path, true).unwrap();

        tree.set_string("/a", "color", "red").unwrap();
        tree.set_stringv("/a/b", "tags", &["x".to_string()]).unwrap();
        tree.flush().unwrap();

        assert_eq!(tree.lookup_string("/a", "color").unwrap(), Some("red".to_string()));
        assert_eq!(tree.lookup_stringv("/a/b", "tags").unwrap(), Some(vec!["x".to_string()]));
    }

    #[test]
    fn enumerate_dir_reports_each_name_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("root");
        let tree = MetaTree::open(&path, true).unwrap();

        tree.set_string("/a/b", "k", "v").unwrap();
        tree.set_string("/a/b", "k2", "v2").unwrap();
        let entries = tree.enumerate_dir("/a").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "b");
        assert!(entries[0].has_data);
    }
}
