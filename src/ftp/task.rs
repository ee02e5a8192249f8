//! Drives one job from start to done against a Pool-owned Connection
//! (spec §4.2).
//!
//! A hook is any closure given the 550 response text; the first one
//! that returns `Some(err)` wins. This lets a higher layer (e.g.
//! `backend.rs`'s create/mkdir paths) refine an opaque permanent
//! failure into "target exists" or "parent not found" without `Task`
//! itself knowing about filesystem semantics.

use crate::ftp::connection::Connection;
use crate::ftp::error::{VfsError, VfsErrorKind};
use crate::ftp::pool::Pool;
use crate::ftp::protocol::FtpResponse;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

bitflags::bitflags! {
    /// Per-call response-handling overrides (spec §4.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResponseFlags: u8 {
        const PASS_100 = 0b0000_0001;
        const PASS_300 = 0b0000_0010;
        const PASS_500 = 0b0000_0100;
        const PASS_550 = 0b0000_1000;
        const FAIL_200 = 0b0001_0000;
    }
}

/// A hook that may refine a generic 550 into a more specific error.
pub type DisambiguationHook<'a> = &'a (dyn Fn(&FtpResponse) -> Option<VfsError> + Send + Sync);

/// Drives one job's command exchanges against a single Connection
/// acquired from `pool`, handling classification, disambiguation, and
/// the stale-connection retry-once policy.
pub struct Task {
    pool: Arc<Pool>,
    cancel: CancellationToken,
    connection: Option<Connection>,
    last_error: Option<VfsError>,
}

impl Task {
    pub fn new(pool: Arc<Pool>, cancel: CancellationToken) -> Self {
        Self {
            pool,
            cancel,
            connection: None,
            last_error: None,
        }
    }

    pub fn latched_error(&self) -> Option<&VfsError> {
        self.last_error.as_ref()
    }

    /// Acquire a Connection from the Pool if this Task doesn't already
    /// hold one. Public so callers that need the Connection directly
    /// (e.g. for data-channel negotiation before a transfer command)
    /// can force acquisition ahead of the first `send_and_check`.
    pub async fn ensure_connection(&mut self) -> Result<(), VfsError> {
        if self.connection.is_some() {
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            self.last_error = Some(VfsError::cancelled("task cancelled before acquire"));
            return Err(self.last_error.clone().unwrap());
        }
        let acquired = self.pool.acquire(&self.cancel).await?;
        self.connection = Some(acquired.connection);
        Ok(())
    }

    /// Donation: adopt a Connection the caller already obtained by some
    /// other means (e.g. handed directly rather than via `acquire`).
    pub async fn take_connection(&mut self, conn: Connection) {
        self.pool.take_connection().await;
        self.connection = Some(conn);
    }

    /// Give the held Connection back to direct Task control, releasing
    /// the Pool's busy accounting.
    pub async fn give_connection(&mut self) -> Option<Connection> {
        self.pool.give_connection().await;
        self.connection.take()
    }

    /// Donate the Connection this Task currently holds to a long-lived
    /// handle: increments the Pool's busy count and hands over
    /// ownership. The handle is responsible for calling the Pool's
    /// give-back/release pair when it closes.
    pub async fn donate_held(&mut self) -> Option<Connection> {
        self.pool.take_connection().await;
        self.connection.take()
    }

    /// Release the Connection back to the Pool's idle queue (or
    /// discard it if unusable).
    pub async fn release(&mut self) {
        if let Some(conn) = self.connection.take() {
            self.pool.release(conn).await;
        }
    }

    /// Classify a response per spec §4.2's code table, honoring
    /// `flags`. Returns `Ok(resp)` when the flags say to pass the
    /// response through to the caller rather than latch an error.
    fn classify(
        &mut self,
        resp: FtpResponse,
        flags: ResponseFlags,
        hooks: &[DisambiguationHook<'_>],
    ) -> Result<FtpResponse, VfsError> {
        let class = resp.code / 100;
        let passthrough = match class {
            1 => flags.contains(ResponseFlags::PASS_100),
            2 => !flags.contains(ResponseFlags::FAIL_200),
            3 => flags.contains(ResponseFlags::PASS_300),
            5 if resp.code == 550 => flags.contains(ResponseFlags::PASS_550),
            5 => flags.contains(ResponseFlags::PASS_500),
            _ => false,
        };
        if passthrough {
            return Ok(resp);
        }

        if resp.code == 550 {
            for hook in hooks {
                if let Some(err) = hook(&resp) {
                    self.last_error = Some(err.clone());
                    return Err(err);
                }
            }
        }

        let err = VfsError::from_code(resp.code, &resp.text());
        self.last_error = Some(err.clone());
        Err(err)
    }

    /// Send a command and classify its response, with the
    /// disambiguation hooks and stale-connection retry-once policy
    /// from spec §4.2.
    pub async fn send_and_check(
        &mut self,
        command: &str,
        flags: ResponseFlags,
        hooks: &[DisambiguationHook<'_>],
    ) -> Result<FtpResponse, VfsError> {
        self.ensure_connection().await?;

        let first_attempt = self.try_send_and_check(command, flags, hooks).await;
        match first_attempt {
            Err(ref e) if matches!(e.kind, VfsErrorKind::Closed) => {
                // Stale idle connection: discard, acquire fresh, retry once.
                if let Some(mut conn) = self.connection.take() {
                    conn.mark_unusable();
                    self.pool.release(conn).await;
                }
                self.last_error = None;
                self.ensure_connection().await?;
                self.try_send_and_check(command, flags, hooks).await
            }
            other => other,
        }
    }

    async fn try_send_and_check(
        &mut self,
        command: &str,
        flags: ResponseFlags,
        hooks: &[DisambiguationHook<'_>],
    ) -> Result<FtpResponse, VfsError> {
        let conn = self
            .connection
            .as_mut()
            .expect("ensure_connection must be called first");
        let resp = match conn.send_and_receive(command, &self.cancel).await {
            Ok(r) => r,
            Err(e) => {
                self.last_error = Some(e.clone());
                return Err(e);
            }
        };
        self.classify(resp, flags, hooks)
    }

    /// Access the held Connection directly, e.g. for data-channel
    /// negotiation between a transfer command and its payload.
    pub fn connection_mut(&mut self) -> Option<&mut Connection> {
        self.connection.as_mut()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_pass_through_as_expected() {
        let flags = ResponseFlags::PASS_550;
        assert!(flags.contains(ResponseFlags::PASS_550));
        assert!(!flags.contains(ResponseFlags::PASS_500));
    }
}
