//! Content-addressed per-path metadata store: a memory-mapped static
//! image, an append-only journal, and a rotation protocol (spec
//! §4.6).
//!
//! Independent of the FTP backend; `crate::ftp::backend` consults it
//! (via the embedding daemon) to decorate `FileInfo` records with
//! user-defined attributes, per spec §2's dataflow note.

pub mod builder;
pub mod error;
pub mod format;
pub mod journal;
pub mod tree;

pub use error::{MetaError, MetaResult};
pub use tree::{DirEntry, MetaTree, MetaValue};
