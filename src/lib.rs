//! Userspace FTP VFS backend core (spec §1–§9).
//!
//! Two independent subsystems:
//!
//! - [`ftp`] — the per-mount connection pool, task dispatch, and
//!   protocol state machine that talks to an FTP server.
//! - [`metadata`] — the on-disk, content-addressed metadata store
//!   consulted by `enumerate`/`query-info` to decorate results with
//!   user-defined attributes.
//!
//! Everything outside these two modules (DBus job plumbing, volume
//! enumerators, generic stream buffering) is out of scope per spec §1
//! Non-goals.

pub mod ftp;
pub mod metadata;
