//! Typed errors for the metadata store (spec §4.6, §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt metadata image: {0}")]
    CorruptImage(String),

    #[error("corrupt journal: {0}")]
    CorruptJournal(String),

    #[error("journal full")]
    JournalFull,

    #[error("no such tree {0:?}")]
    NoSuchTree(String),

    #[error("invalid path {0:?}")]
    InvalidPath(String),
}

pub type MetaResult<T> = Result<T, MetaError>;
