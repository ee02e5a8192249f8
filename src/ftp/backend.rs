//! Per-mount Backend: address, credentials, negotiated features, the
//! directory cache, and the pool (spec §4, §3 "Backend").
//!
//! Grounded on the teacher's `FtpClient`/`directory.rs`/`file_ops.rs`
//! split, generalized behind a `Backend` trait per the redesign flag in
//! spec §9 ("a `Backend` trait/interface enumerated over its
//! implementations").

use crate::ftp::connection::{Connection, MountConfig};
use crate::ftp::data_channel::{self, Policy};
use crate::ftp::directory_cache::{CacheLookup, DirectoryCache};
use crate::ftp::error::{VfsError, VfsErrorKind, VfsResult};
use crate::ftp::features::{PreferredMethod, ServerFeatures};
use crate::ftp::parser::{EntryKind, ParsedEntry};
use crate::ftp::path::FtpPath;
use crate::ftp::pool::Pool;
use crate::ftp::task::{ResponseFlags, Task};
use crate::metadata::{MetaTree, MetaValue};
use async_trait::async_trait;
use chrono::{Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

static NEXT_MOUNT_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonically increasing mount-scoped identifier, replacing the
/// original's pointer-address identity (spec §9 redesign flag, §3 ADD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MountId(pub u64);

impl MountId {
    fn next() -> Self {
        MountId(NEXT_MOUNT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// File kind as reported to callers, collapsing symlinks into whatever
/// they resolve to for the caller's convenience while still exposing
/// the original symlink fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileKind {
    RegularFile,
    Directory,
    SymbolicLink,
}

/// One enumerate/query-info result, decorated with metadata-store
/// attributes by the caller (spec §2 dataflow: "produced file-info
/// records are decorated with metadata from the store"). Derives
/// `Serialize` the way the teacher's own listing/file-info types do
/// (`sorng-ftp::ftp::types`), for callers that want to hand results
/// across a process boundary rather than drive the backend in-process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    pub path: FtpPath,
    pub kind: FileKind,
    pub size: u64,
    /// Seconds since the Unix epoch, resolved from the listing's
    /// broken-down local time.
    pub modified: Option<i64>,
    pub is_hidden: bool,
    pub symlink_target: Option<String>,
    /// Attributes pulled from the metadata store for this path, if a
    /// tree was attached at mount time (spec §2 dataflow note).
    pub attributes: HashMap<String, MetaValue>,
}

/// How a new file should be opened for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// `STOR` on a name that must not already exist.
    Create,
    /// `APPE`.
    Append,
    /// `STOR` unconditionally overwriting any existing file.
    Replace,
}

bitflags::bitflags! {
    /// Per-call flags for `Backend::move_` (spec.md §6 "move"), mirroring
    /// gio's `G_FILE_COPY_OVERWRITE`/`G_FILE_COPY_BACKUP`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MoveFlags: u8 {
        /// Replace an existing destination instead of failing `target-exists`.
        const OVERWRITE = 0b01;
        /// Back up the destination before replacing it. Never honored: FTP
        /// has no server-side backup primitive.
        const BACKUP = 0b10;
    }
}

/// The operation surface every backend implementation provides (spec
/// §2's "Backend... implements the public operations").
#[async_trait]
pub trait Backend: Send + Sync {
    fn mount_id(&self) -> MountId;
    async fn query_info(&self, path: &FtpPath) -> VfsResult<FileInfo>;
    async fn enumerate(&self, path: &FtpPath) -> VfsResult<Vec<FileInfo>>;
    async fn open_for_read(&self, path: &FtpPath) -> VfsResult<ReadHandle>;
    async fn open_for_write(&self, path: &FtpPath, mode: WriteMode) -> VfsResult<WriteHandle>;
    async fn make_directory(&self, path: &FtpPath) -> VfsResult<()>;
    async fn delete(&self, path: &FtpPath) -> VfsResult<()>;
    async fn rename(&self, path: &FtpPath, new_name: &str) -> VfsResult<FtpPath>;
    async fn move_(&self, from: &FtpPath, to: &FtpPath, flags: MoveFlags) -> VfsResult<()>;
}

/// The FTP implementation of [`Backend`].
pub struct FtpBackend {
    id: MountId,
    pool: Arc<Pool>,
    features: ServerFeatures,
    preferred_method: PreferredMethod,
    cache: DirectoryCache,
    /// Metadata tree consulted to decorate `FileInfo` results (spec §2
    /// dataflow note), if one was attached at mount time. Optional:
    /// nothing in spec §4 requires every mount to have one.
    metadata: Option<Arc<MetaTree>>,
}

impl FtpBackend {
    /// Mount: dial, login, probe features, and construct the pool and
    /// directory cache (spec §4.1 acquire step 4 runs once here to
    /// learn `features` up front; subsequent acquires reuse it).
    pub async fn mount(config: MountConfig, pool_cap: usize) -> VfsResult<Self> {
        Self::mount_with_metadata(config, pool_cap, None).await
    }

    /// As [`Self::mount`], additionally attaching a metadata tree whose
    /// attributes decorate every `query_info`/`enumerate` result.
    pub async fn mount_with_metadata(
        config: MountConfig,
        pool_cap: usize,
        metadata: Option<Arc<MetaTree>>,
    ) -> VfsResult<Self> {
        let cancel = CancellationToken::new();
        let (mut conn, _banner) = Connection::open(&config.host, config.port, &cancel).await?;
        let bootstrap = crate::ftp::connection::bootstrap(&mut conn, &config, &cancel).await?;

        let pool = Arc::new(Pool::new(config, pool_cap));
        pool.release(conn).await;

        let id = MountId::next();
        log::info!("mounted backend {:?}", id);
        Ok(FtpBackend {
            id,
            pool,
            features: bootstrap.features,
            preferred_method: PreferredMethod::new(),
            cache: DirectoryCache::new(),
            metadata,
        })
    }

    /// Attach attribute values from the metadata store, if any, for
    /// `info.path` (spec §2 dataflow note). A no-op when no tree was
    /// attached at mount time.
    fn decorate(&self, mut info: FileInfo) -> FileInfo {
        let Some(tree) = &self.metadata else { return info };
        let path = info.path.as_str();
        match tree.enumerate_keys(path) {
            Ok(keys) => {
                for key in keys {
                    if let Ok(Some(v)) = tree.lookup_string(path, &key) {
                        info.attributes.insert(key, MetaValue::String(v));
                    } else if let Ok(Some(v)) = tree.lookup_stringv(path, &key) {
                        info.attributes.insert(key, MetaValue::StringList(v));
                    }
                }
            }
            Err(e) => log::warn!("metadata enumerate_keys({}) failed: {}", path, e),
        }
        info
    }

    pub fn pool(&self) -> Arc<Pool> {
        self.pool.clone()
    }

    fn new_task(&self) -> Task {
        Task::new(self.pool.clone(), CancellationToken::new())
    }

    /// Fetch and cache a directory's raw LIST bytes, returning the
    /// parsed, dot-filtered entries (spec §4.5 step 3 + §4.4 backend
    /// filtering).
    async fn list_directory(&self, dir: &FtpPath) -> VfsResult<Vec<ParsedEntry>> {
        let mut task = self.new_task();
        let server_path = dir.server_path().to_string();

        task.ensure_connection().await?;
        negotiate_for_task(&mut task, &self.features, &self.preferred_method).await?;

        let cmd = format!("LIST {}", server_path);
        let cancel = task.cancel_token().clone();
        task.send_and_check(&cmd, ResponseFlags::PASS_100, &[])
            .await?;

        let conn = task.connection_mut().expect("connection held by task");
        if matches!(
            self.preferred_method.get(),
            crate::ftp::features::DataMethod::Port | crate::ftp::features::DataMethod::Eprt
        ) {
            conn.accept_data(&cancel).await?;
        }

        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = conn.read_data(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        conn.close_data();

        // Drain the final "226 Transfer complete" on the command channel.
        let _ = conn.receive(&cancel).await;
        task.release().await;

        self.cache.insert(&server_path, buf.clone()).await;

        let text = String::from_utf8_lossy(&buf);
        let mut parser = crate::ftp::parser::ListingParser::new();
        Ok(text
            .lines()
            .map(|l| parser.feed_line(l))
            .filter(|e| !matches!(e.kind, EntryKind::Ignore))
            .filter(|e| e.name != "." && e.name != "..")
            .collect())
    }

    fn entry_to_file_info(&self, parent: &FtpPath, entry: &ParsedEntry) -> VfsResult<FileInfo> {
        let path = parent.child(&entry.name)?;
        let kind = match entry.kind {
            EntryKind::Directory => FileKind::Directory,
            EntryKind::Symlink => FileKind::SymbolicLink,
            _ => FileKind::RegularFile,
        };
        let is_hidden = matches!(self.features.system, crate::ftp::features::SystemClass::Unix)
            && entry.name.starts_with('.');
        let size = entry.size.parse::<u64>().unwrap_or(0);
        let modified = entry.mtime.map(resolve_local_time);
        Ok(FileInfo {
            name: entry.name.clone(),
            path,
            kind,
            size,
            modified,
            is_hidden,
            symlink_target: entry
                .link_target
                .as_ref()
                .map(|t| normalize_symlink_target(parent, t)),
            attributes: HashMap::new(),
        })
    }

    /// Per-file `CWD`/`SIZE` probes used when a directory scan misses,
    /// and to disambiguate a 550 for create/mkdir (spec §4.5).
    async fn probe_path(&self, path: &FtpPath) -> VfsResult<FileInfo> {
        let mut task = self.new_task();
        let cwd_cmd = format!("CWD {}", path.server_path());
        let cwd_result = task
            .send_and_check(&cwd_cmd, ResponseFlags::PASS_550, &[])
            .await;

        let kind = match cwd_result {
            Ok(resp) if resp.is_success() => {
                task.send_and_check("CDUP", ResponseFlags::PASS_550, &[])
                    .await
                    .ok();
                Some(FileKind::Directory)
            }
            Ok(resp) if resp.code == 550 => None,
            Ok(_) => None,
            Err(e) => {
                task.release().await;
                return Err(e);
            }
        };

        let kind = if let Some(k) = kind {
            Some(k)
        } else {
            let size_cmd = format!("SIZE {}", path.server_path());
            match task
                .send_and_check(&size_cmd, ResponseFlags::PASS_550, &[])
                .await
            {
                Ok(resp) if resp.is_success() => Some(FileKind::RegularFile),
                _ => None,
            }
        };
        task.release().await;

        match kind {
            Some(kind) => Ok(FileInfo {
                name: path.basename().unwrap_or_default().to_string(),
                path: path.clone(),
                kind,
                size: 0,
                modified: None,
                is_hidden: false,
                symlink_target: None,
                attributes: HashMap::new(),
            }),
            None => Err(VfsError::not_found(format!("{} not found", path))),
        }
    }

    /// Follow a symlink up to eight hops, re-querying the resolved
    /// target each time (spec §4.4, §9's "eight" constant).
    pub async fn resolve_symlink(&self, info: &FileInfo) -> VfsResult<FileInfo> {
        let mut current = info.clone();
        let mut hops = 0;
        while current.kind == FileKind::SymbolicLink && hops < 8 {
            let target = current
                .symlink_target
                .clone()
                .ok_or_else(|| VfsError::failed("symlink with no target"))?;
            let target_path = FtpPath::new(&target);
            current = self.query_info(&target_path).await?;
            hops += 1;
        }
        Ok(current)
    }
}

fn normalize_symlink_target(parent: &FtpPath, target: &str) -> String {
    let joined = if target.starts_with('/') {
        target.to_string()
    } else {
        format!("{}/{}", parent.as_str().trim_end_matches('/'), target)
    };
    let mut segments: Vec<&str> = Vec::new();
    for seg in joined.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

fn resolve_local_time(t: crate::ftp::parser::BrokenDownTime) -> i64 {
    let year = t.year.unwrap_or_else(|| Local::now().format("%Y").to_string().parse().unwrap_or(1970));
    match NaiveDate::from_ymd_opt(year, t.month.max(1), t.day.max(1))
        .and_then(|d| d.and_hms_opt(t.hour, t.minute, t.second))
    {
        Some(naive) => match Local.from_local_datetime(&naive).single() {
            Some(dt) => dt.timestamp(),
            None => 0,
        },
        None => 0,
    }
}

#[async_trait]
impl Backend for FtpBackend {
    fn mount_id(&self) -> MountId {
        self.id
    }

    async fn query_info(&self, path: &FtpPath) -> VfsResult<FileInfo> {
        if path.is_root() {
            return Ok(self.decorate(FileInfo {
                name: String::new(),
                path: path.clone(),
                kind: FileKind::Directory,
                size: 0,
                modified: None,
                is_hidden: false,
                symlink_target: None,
                attributes: HashMap::new(),
            }));
        }
        let parent = path
            .parent()
            .ok_or_else(|| VfsError::failed("path has no parent"))?;
        let name = path.basename().unwrap_or_default();

        let info = match self.cache.lookup(parent.server_path(), name).await {
            CacheLookup::Found(entry) => self.entry_to_file_info(&parent, &entry),
            CacheLookup::Miss => self.probe_path(path).await,
            CacheLookup::NotCached => {
                self.list_directory(&parent).await?;
                match self.cache.lookup(parent.server_path(), name).await {
                    CacheLookup::Found(entry) => self.entry_to_file_info(&parent, &entry),
                    _ => self.probe_path(path).await,
                }
            }
        }?;
        Ok(self.decorate(info))
    }

    async fn enumerate(&self, path: &FtpPath) -> VfsResult<Vec<FileInfo>> {
        let entries = self.list_directory(path).await?;
        entries
            .iter()
            .map(|e| self.entry_to_file_info(path, e).map(|i| self.decorate(i)))
            .collect()
    }

    async fn open_for_read(&self, path: &FtpPath) -> VfsResult<ReadHandle> {
        let mut task = self.new_task();
        task.ensure_connection().await?;

        negotiate_for_task(&mut task, &self.features, &self.preferred_method).await?;

        let cmd = format!("RETR {}", path.server_path());
        task.send_and_check(&cmd, ResponseFlags::PASS_100, &[])
            .await?;

        let cancel = task.cancel_token().clone();
        if matches!(
            self.preferred_method.get(),
            crate::ftp::features::DataMethod::Port | crate::ftp::features::DataMethod::Eprt
        ) {
            task.connection_mut()
                .expect("connection present")
                .accept_data(&cancel)
                .await?;
        }

        let conn = task
            .donate_held()
            .await
            .expect("connection donated to read handle");
        Ok(ReadHandle {
            connection: conn,
            pool: self.pool.clone(),
        })
    }

    async fn open_for_write(&self, path: &FtpPath, mode: WriteMode) -> VfsResult<WriteHandle> {
        let mut task = self.new_task();
        task.ensure_connection().await?;

        negotiate_for_task(&mut task, &self.features, &self.preferred_method).await?;

        let verb = match mode {
            WriteMode::Create | WriteMode::Replace => "STOR",
            WriteMode::Append => "APPE",
        };
        let cmd = format!("{} {}", verb, path.server_path());
        let hooks: Vec<crate::ftp::task::DisambiguationHook> = if mode == WriteMode::Create {
            vec![&|resp: &crate::ftp::protocol::FtpResponse| {
                if resp.text().to_lowercase().contains("exist") {
                    Some(VfsError::target_exists("target already exists"))
                } else {
                    None
                }
            }]
        } else {
            Vec::new()
        };
        task.send_and_check(&cmd, ResponseFlags::PASS_100, &hooks)
            .await?;

        let cancel = task.cancel_token().clone();
        if matches!(
            self.preferred_method.get(),
            crate::ftp::features::DataMethod::Port | crate::ftp::features::DataMethod::Eprt
        ) {
            task.connection_mut()
                .expect("connection present")
                .accept_data(&cancel)
                .await?;
        }

        self.cache
            .invalidate(path.parent().unwrap_or_else(FtpPath::root).server_path())
            .await;

        let conn = task
            .donate_held()
            .await
            .expect("connection donated to write handle");
        Ok(WriteHandle {
            connection: conn,
            pool: self.pool.clone(),
        })
    }

    async fn make_directory(&self, path: &FtpPath) -> VfsResult<()> {
        let mut task = self.new_task();
        let cmd = format!("MKD {}", path.server_path());
        let hooks: Vec<crate::ftp::task::DisambiguationHook> = vec![&|resp| {
            if resp.text().to_lowercase().contains("exist") {
                Some(VfsError::target_exists("directory already exists"))
            } else {
                None
            }
        }];
        let result = task
            .send_and_check(&cmd, ResponseFlags::PASS_550, &hooks)
            .await;
        task.release().await;
        result?;
        if let Some(parent) = path.parent() {
            self.cache.invalidate(parent.server_path()).await;
        }
        Ok(())
    }

    async fn delete(&self, path: &FtpPath) -> VfsResult<()> {
        let info = self.query_info(path).await?;
        let mut task = self.new_task();
        let result: VfsResult<()> = if info.kind == FileKind::Directory {
            let cmd = format!("RMD {}", path.server_path());
            let outcome = task.send_and_check(&cmd, ResponseFlags::PASS_550, &[]).await;
            task.release().await;
            match outcome {
                Ok(resp) if resp.code == 550 => {
                    // Original (`do_delete`) re-lists on a 550 and reports
                    // not-empty when the directory still has entries.
                    match self.list_directory(path).await {
                        Ok(entries) if !entries.is_empty() => {
                            Err(VfsError::not_empty(format!("{} is not empty", path)))
                        }
                        _ => Err(VfsError::from_code(resp.code, &resp.text())),
                    }
                }
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            }
        } else {
            let cmd = format!("DELE {}", path.server_path());
            let outcome = task
                .send_and_check(&cmd, ResponseFlags::empty(), &[])
                .await
                .map(|_| ());
            task.release().await;
            outcome
        };
        result?;
        if let Some(parent) = path.parent() {
            self.cache.invalidate(parent.server_path()).await;
        }
        Ok(())
    }

    async fn rename(&self, path: &FtpPath, new_name: &str) -> VfsResult<FtpPath> {
        let parent = path
            .parent()
            .ok_or_else(|| VfsError::failed("cannot rename root"))?;
        let new_path = parent.child(new_name)?;
        self.move_(path, &new_path, MoveFlags::empty()).await?;
        Ok(new_path)
    }

    async fn move_(&self, from: &FtpPath, to: &FtpPath, flags: MoveFlags) -> VfsResult<()> {
        if flags.contains(MoveFlags::BACKUP) {
            return Err(VfsError::backup_not_supported(
                "FTP has no server-side backup support",
            ));
        }
        if !flags.contains(MoveFlags::OVERWRITE) {
            match self.query_info(to).await {
                Ok(_) => {
                    return Err(VfsError::target_exists(format!("{} already exists", to)));
                }
                Err(e) if e.kind == VfsErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        let mut task = self.new_task();
        let rnfr = format!("RNFR {}", from.server_path());
        let rnto = format!("RNTO {}", to.server_path());
        let result: VfsResult<()> = async {
            let resp = task
                .send_and_check(&rnfr, ResponseFlags::PASS_300, &[])
                .await?;
            if !resp.is_intermediate() && !resp.is_success() {
                return Err(VfsError::from_code(resp.code, &resp.text()));
            }
            task.send_and_check(&rnto, ResponseFlags::empty(), &[])
                .await?;
            Ok(())
        }
        .await;
        task.release().await;
        result?;

        self.cache.invalidate(from.server_path()).await;
        if let Some(p) = from.parent() {
            self.cache.invalidate(p.server_path()).await;
        }
        if let Some(p) = to.parent() {
            self.cache.invalidate(p.server_path()).await;
        }
        Ok(())
    }
}

async fn negotiate_for_task(
    task: &mut Task,
    features: &ServerFeatures,
    preferred: &PreferredMethod,
) -> VfsResult<()> {
    let cancel = task.cancel_token().clone();
    let conn = task.connection_mut().expect("connection present");
    data_channel::negotiate(conn, features, preferred, Policy::Any, &cancel).await?;
    Ok(())
}

/// A long-lived read handle, owning a Connection donated from a Task
/// (spec GLOSSARY "Handle").
pub struct ReadHandle {
    connection: Connection,
    pool: Arc<Pool>,
}

impl ReadHandle {
    pub async fn close(mut self) {
        self.connection.close_data();
        self.pool.give_connection().await;
        self.pool.release(self.connection).await;
    }
}

impl ReadHandle {
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        self.connection.read_data(buf).await
    }
}

/// A long-lived write handle, owning a Connection donated from a Task.
pub struct WriteHandle {
    connection: Connection,
    pool: Arc<Pool>,
}

impl WriteHandle {
    pub async fn write_chunk(&mut self, buf: &[u8]) -> VfsResult<()> {
        self.connection.write_data(buf).await
    }

    pub async fn close(mut self) {
        self.connection.close_data();
        self.pool.give_connection().await;
        self.pool.release(self.connection).await;
    }
}
