//! Typed error kinds for the FTP backend (spec §7).
//!
//! Errors are classified by kind, never by raw protocol code — the
//! protocol code is retained alongside for diagnostics but callers
//! match on [`VfsErrorKind`].

use thiserror::Error;

/// The public error kinds a backend operation can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsErrorKind {
    Cancelled,
    Closed,
    Failed,
    PermissionDenied,
    NotFound,
    NotADirectory,
    IsDirectory,
    InvalidFilename,
    TargetExists,
    NotEmpty,
    NoSpace,
    BackupNotSupported,
    NotSupported,
    Busy,
}

/// A latched backend error: one kind plus a human-readable message.
#[derive(Debug, Error, Clone)]
#[error("{kind:?}: {message}")]
pub struct VfsError {
    pub kind: VfsErrorKind,
    pub message: String,
    /// Raw FTP reply code that produced this error, if any (diagnostics only).
    pub code: Option<u16>,
}

pub type VfsResult<T> = Result<T, VfsError>;

impl VfsError {
    pub fn new(kind: VfsErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::Cancelled, msg)
    }
    pub fn closed(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::Closed, msg)
    }
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::Failed, msg)
    }
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::PermissionDenied, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::NotFound, msg)
    }
    pub fn not_a_directory(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::NotADirectory, msg)
    }
    pub fn is_directory(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::IsDirectory, msg)
    }
    pub fn invalid_filename(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::InvalidFilename, msg)
    }
    pub fn target_exists(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::TargetExists, msg)
    }
    pub fn not_empty(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::NotEmpty, msg)
    }
    pub fn no_space(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::NoSpace, msg)
    }
    pub fn backup_not_supported(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::BackupNotSupported, msg)
    }
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::NotSupported, msg)
    }
    pub fn busy(msg: impl Into<String>) -> Self {
        Self::new(VfsErrorKind::Busy, msg)
    }

    /// Classify a response code per spec §4.2's code table.
    pub fn from_code(code: u16, text: &str) -> Self {
        let kind = match code {
            332 | 532 => VfsErrorKind::NotSupported,
            421 => VfsErrorKind::Failed,
            425 | 426 => VfsErrorKind::Closed,
            450 | 451 | 550 | 551 => VfsErrorKind::Failed,
            452 | 552 => VfsErrorKind::NoSpace,
            500..=504 => VfsErrorKind::NotSupported,
            522 => VfsErrorKind::NotSupported,
            530 => VfsErrorKind::PermissionDenied,
            553 => VfsErrorKind::InvalidFilename,
            _ => VfsErrorKind::Failed,
        };
        Self::new(kind, text.to_string()).with_code(code)
    }
}

impl From<std::io::Error> for VfsError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => VfsError::not_found(e.to_string()),
            std::io::ErrorKind::PermissionDenied => VfsError::permission_denied(e.to_string()),
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => VfsError::closed(e.to_string()),
            _ => VfsError::failed(e.to_string()),
        }
    }
}
