//! Path abstraction (spec §3 "Path", §4 gvfsftpfile parity).
//!
//! A [`FtpPath`] carries both the outward (gvfs-facing) path and the
//! server-facing path. For TVFS-compliant servers the two coincide; we
//! still keep them distinct fields so a future non-TVFS server mapping
//! does not need to touch call sites.

use crate::ftp::error::{VfsError, VfsResult};
use serde::{Deserialize, Serialize};

/// An immutable, rooted, slash-separated path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FtpPath {
    /// Outward path, e.g. `/a/b/c`. Always starts with `/`.
    outward: String,
}

impl FtpPath {
    /// The root path `/`.
    pub fn root() -> Self {
        FtpPath {
            outward: "/".to_string(),
        }
    }

    /// Construct from an outward path string, normalising a missing
    /// leading slash and a trailing slash (except for root itself).
    pub fn new(path: &str) -> Self {
        let mut s = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        while s.len() > 1 && s.ends_with('/') {
            s.pop();
        }
        FtpPath { outward: s }
    }

    pub fn is_root(&self) -> bool {
        self.outward == "/"
    }

    /// The outward (gvfs-facing) path string.
    pub fn as_str(&self) -> &str {
        &self.outward
    }

    /// The server-facing path. Coincides with the outward path for
    /// TVFS-compliant servers (see spec §3).
    pub fn server_path(&self) -> &str {
        &self.outward
    }

    /// The basename of this path, or `None` for root.
    pub fn basename(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.outward.rsplit('/').next()
    }

    /// The parent path, or `None` if this is root.
    pub fn parent(&self) -> Option<FtpPath> {
        if self.is_root() {
            return None;
        }
        match self.outward.rfind('/') {
            Some(0) => Some(FtpPath::root()),
            Some(idx) => Some(FtpPath::new(&self.outward[..idx])),
            None => None,
        }
    }

    /// Construct a child path, validating the display name per spec §3:
    /// names containing `/`, `\r`, or `\n` are rejected.
    pub fn child(&self, display_name: &str) -> VfsResult<FtpPath> {
        if display_name.is_empty()
            || display_name.contains('/')
            || display_name.contains('\r')
            || display_name.contains('\n')
        {
            return Err(VfsError::invalid_filename(format!(
                "invalid filename: {:?}",
                display_name
            )));
        }
        let joined = if self.is_root() {
            format!("/{}", display_name)
        } else {
            format!("{}/{}", self.outward, display_name)
        };
        Ok(FtpPath::new(&joined))
    }

    /// Whether `self` is `other`, or an ancestor of `other`.
    pub fn is_prefix_of(&self, other: &FtpPath) -> bool {
        if self.outward == other.outward {
            return true;
        }
        if self.is_root() {
            return true;
        }
        other
            .outward
            .strip_prefix(&self.outward)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
    }

    /// The remainder of `other` under `self`, without a leading slash.
    /// Empty string if `other == self`.
    pub fn strip_prefix<'a>(&self, other: &'a FtpPath) -> Option<&'a str> {
        if self.outward == other.outward {
            return Some("");
        }
        if self.is_root() {
            return Some(other.outward.trim_start_matches('/'));
        }
        other
            .outward
            .strip_prefix(&self.outward)
            .and_then(|rest| rest.strip_prefix('/'))
    }
}

impl std::fmt::Display for FtpPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.outward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_rejects_embedded_separators() {
        let root = FtpPath::root();
        assert!(root.child("a/b").is_err());
        assert!(root.child("a\rb").is_err());
        assert!(root.child("a\nb").is_err());
        assert!(root.child("ok").is_ok());
    }

    #[test]
    fn parent_of_root_is_none() {
        assert!(FtpPath::root().parent().is_none());
    }

    #[test]
    fn parent_child_roundtrip() {
        let p = FtpPath::new("/a/b/c");
        assert_eq!(p.parent().unwrap().as_str(), "/a/b");
        assert_eq!(p.basename(), Some("c"));
    }

    #[test]
    fn prefix_matching() {
        let src = FtpPath::new("/a/b");
        let dst = FtpPath::new("/a/b/c/d");
        assert!(src.is_prefix_of(&dst));
        assert_eq!(src.strip_prefix(&dst), Some("c/d"));
        assert!(!dst.is_prefix_of(&src));
    }
}
