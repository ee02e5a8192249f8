//! Bounded connection pool: `0 <= B <= N <= M` (spec §4.2 acquire/release,
//! §5 concurrency model).
//!
//! The teacher's `FtpPool` is a flat, unbounded `HashMap<String,
//! FtpClient>` reaped on a timer. This pool instead tracks capacity
//! explicitly — `N` open connections, `M` the dynamically discovered
//! cap, `B` connections currently donated out to a Task — because the
//! spec's acquire algorithm needs all three to decide whether to dial,
//! wait, or fail busy. The mutex-plus-notify shape (`tokio::sync::Mutex`
//! guarding state, `tokio::sync::Notify` for wakeups) is carried
//! straight from the teacher's `Arc<Mutex<FtpPool>>` + maintenance-task
//! idiom.

use crate::ftp::connection::{bootstrap, Connection, MountConfig};
use crate::ftp::error::VfsError;
use crate::ftp::features::ServerFeatures;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

struct PoolState {
    idle: VecDeque<Connection>,
    /// Open connections (idle + donated out), including any connection
    /// presently mid-dial (reserved speculatively, see `acquire`).
    n: usize,
    /// Dynamically discovered cap. Starts optimistic and only shrinks.
    m: usize,
    /// Connections currently held by a Task via `take_connection`.
    b: usize,
    /// Registered waiters: woken individually via their own `Notify`,
    /// or all at once via `notify_all` when `B` reaches `N`.
    waiters: Vec<(Uuid, Arc<Notify>)>,
}

/// Per-mount bounded pool of [`Connection`]s.
pub struct Pool {
    state: Mutex<PoolState>,
    config: MountConfig,
    acquire_timeout: Duration,
    accepting: AtomicBool,
}

/// Outcome of a successful acquire: a Connection plus the features
/// discovered for it, if this acquire bootstrapped a fresh dial.
pub struct Acquired {
    pub connection: Connection,
    pub features: Option<ServerFeatures>,
}

impl Pool {
    pub fn new(config: MountConfig, initial_max: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                n: 0,
                m: initial_max,
                b: 0,
                waiters: Vec::new(),
            }),
            config,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            accepting: AtomicBool::new(true),
        }
    }

    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    /// Acquire a Connection per spec §4.2's five-step algorithm.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Acquired, VfsError> {
        let waiter_id = Uuid::new_v4();
        let deadline = tokio::time::Instant::now() + self.acquire_timeout;

        loop {
            if cancel.is_cancelled() {
                return Err(VfsError::cancelled("acquire cancelled"));
            }

            let mut guard = self.state.lock().await;

            if let Some(conn) = guard.idle.pop_front() {
                return Ok(Acquired {
                    connection: conn,
                    features: None,
                });
            }

            if guard.n < guard.m {
                guard.n += 1;
                drop(guard);

                match self.dial_and_bootstrap(cancel).await {
                    Ok((conn, features)) => {
                        return Ok(Acquired {
                            connection: conn,
                            features: Some(features),
                        });
                    }
                    Err(e) => {
                        let mut guard = self.state.lock().await;
                        guard.n = guard.n.saturating_sub(1);
                        // Reduce M to the observed working count, to
                        // avoid hammering a server that caps connections.
                        // Skipped if a concurrent acquire already moved
                        // N past what we saw (a race was detected).
                        if guard.n <= guard.m {
                            guard.m = guard.n;
                            log::warn!(
                                "connection bootstrap failed, reducing pool cap to {}",
                                guard.m
                            );
                        }
                        if guard.m == 0 {
                            log::error!("pool cap reached zero; mount cannot be served");
                        }
                        drop(guard);
                        return Err(e);
                    }
                }
            }

            // At capacity: all slots open but none idle.
            if guard.b >= guard.n || tokio::time::Instant::now() >= deadline {
                return Err(VfsError::busy("connection pool exhausted"));
            }

            let notify = Arc::new(Notify::new());
            guard.waiters.push((waiter_id, notify.clone()));
            drop(guard);

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            tokio::select! {
                _ = notify.notified() => {}
                _ = tokio::time::sleep(remaining) => {}
                _ = cancel.cancelled() => {
                    self.deregister_waiter(waiter_id).await;
                    return Err(VfsError::cancelled("acquire cancelled while waiting"));
                }
            }
            self.deregister_waiter(waiter_id).await;
        }
    }

    async fn deregister_waiter(&self, id: Uuid) {
        let mut guard = self.state.lock().await;
        guard.waiters.retain(|(w, _)| *w != id);
    }

    async fn dial_and_bootstrap(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(Connection, ServerFeatures), VfsError> {
        let (mut conn, _banner) =
            Connection::open(&self.config.host, self.config.port, cancel).await?;
        let result = bootstrap(&mut conn, &self.config, cancel).await;
        match result {
            Ok(b) => Ok((conn, b.features)),
            Err(e) => Err(e),
        }
    }

    /// Release a Connection back to the pool, or discard it.
    pub async fn release(&self, conn: Connection) {
        let mut guard = self.state.lock().await;
        if conn.is_usable() && self.accepting.load(Ordering::SeqCst) {
            guard.idle.push_back(conn);
            self.wake_one(&mut guard);
        } else {
            guard.n = guard.n.saturating_sub(1);
        }
    }

    fn wake_one(&self, guard: &mut PoolState) {
        if let Some((_, notify)) = guard.waiters.first() {
            notify.notify_one();
        }
    }

    /// Donation: a Task adopts a Connection it already holds (e.g. one
    /// handed to it directly rather than via `acquire`), incrementing
    /// `B`. When `B` reaches `N`, every waiter is woken so they fail
    /// busy immediately instead of waiting out the full timeout.
    pub async fn take_connection(&self) {
        let mut guard = self.state.lock().await;
        guard.b += 1;
        if guard.b >= guard.n {
            for (_, notify) in &guard.waiters {
                notify.notify_one();
            }
        }
    }

    /// Give-back: inverse of `take_connection`.
    pub async fn give_connection(&self) {
        let mut guard = self.state.lock().await;
        guard.b = guard.b.saturating_sub(1);
    }

    pub async fn stats(&self) -> PoolStats {
        let guard = self.state.lock().await;
        PoolStats {
            open: guard.n,
            max: guard.m,
            busy: guard.b,
            idle: guard.idle.len(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub open: usize,
    pub max: usize,
    pub busy: usize,
    pub idle: usize,
}

/// Periodic idle-connection keepalive sweep (spec §4.1 ADD), grounded
/// on the teacher's `spawn_pool_maintenance`.
pub fn spawn_idle_keepalive(pool: Arc<Pool>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let mut guard = pool.state.lock().await;
            let idle_before = guard.idle.len();
            let mut still_usable = VecDeque::new();
            while let Some(mut conn) = guard.idle.pop_front() {
                drop(guard);
                let ok = conn.keepalive(pool.config.data_timeout).await.is_ok();
                guard = pool.state.lock().await;
                if ok {
                    still_usable.push_back(conn);
                } else {
                    guard.n = guard.n.saturating_sub(1);
                }
            }
            let reaped = idle_before - still_usable.len();
            guard.idle = still_usable;
            if reaped > 0 {
                log::debug!("idle keepalive reaped {} dead connections", reaped);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stats_start_empty() {
        let pool = Pool::new(MountConfig::default(), 4);
        let s = pool.stats().await;
        assert_eq!(s.open, 0);
        assert_eq!(s.max, 4);
        assert_eq!(s.busy, 0);
        assert_eq!(s.idle, 0);
    }

    #[tokio::test]
    async fn take_and_give_connection_track_busy_count() {
        let pool = Pool::new(MountConfig::default(), 4);
        pool.take_connection().await;
        assert_eq!(pool.stats().await.busy, 1);
        pool.give_connection().await;
        assert_eq!(pool.stats().await.busy, 0);
    }
}
