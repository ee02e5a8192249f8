//! FTP VFS backend: Connection, Pool, Task, Backend, Path, directory
//! listing parser, directory cache, and data-channel negotiation
//! (spec §4).

pub mod backend;
pub mod connection;
pub mod data_channel;
pub mod directory_cache;
pub mod error;
pub mod features;
pub mod parser;
pub mod path;
pub mod pool;
pub mod protocol;
pub mod task;

pub use backend::{
    Backend, FileInfo, FileKind, FtpBackend, MountId, MoveFlags, ReadHandle, WriteHandle, WriteMode,
};
pub use connection::{Connection, MountConfig};
pub use error::{VfsError, VfsErrorKind, VfsResult};
pub use path::FtpPath;
pub use pool::{Pool, PoolStats};
