//! Control-channel framing plus a single optional data channel (spec §4.1).
//!
//! Mirrors the teacher's `FtpCodec`/`connect()` split but drops TLS
//! entirely (no `AUTH TLS` in this spec's command set) and adds the
//! at-most-one-data-channel discipline the original `GVfsFtpConnection`
//! enforces (`g_return_val_if_fail (conn->data == NULL, FALSE)`).

use crate::ftp::error::VfsError;
use crate::ftp::features::ServerFeatures;
use crate::ftp::protocol::{FtpCodec, FtpResponse};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Parameters needed to dial and bootstrap one Connection. Mount
/// requests themselves are out of scope (spec §1 Non-goals); callers
/// build this programmatically. `Serialize`/`Deserialize` let a daemon
/// load mount specs from a config file, matching the teacher's own
/// `#[serde(rename_all = "camelCase")]` convention for its connection
/// config types (`sorng-ftp`'s `ftp/types.rs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub connect_timeout: Duration,
    pub data_timeout: Duration,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 21,
            user: "anonymous".to_string(),
            password: None,
            connect_timeout: Duration::from_secs(15),
            data_timeout: Duration::from_secs(30),
        }
    }
}

/// A live or accepted data-channel stream.
enum DataChannel {
    Stream(TcpStream),
    Listening(TcpListener),
}

/// One control connection, with at most one outstanding data channel.
pub struct Connection {
    codec: FtpCodec,
    remote_addr: SocketAddr,
    usable: bool,
    data: Option<DataChannel>,
}

impl Connection {
    /// Dial the control endpoint only; no login, no feature probe.
    /// (Bootstrap — banner read, LOGIN, setup, FEAT — lives in
    /// [`bootstrap`], since the Pool needs the banner/feature results
    /// independently of the raw dial per spec §4.1 acquire step 4.)
    pub async fn open(
        host: &str,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<(Self, FtpResponse), VfsError> {
        let addr = format!("{}:{}", host, port);
        let tcp = tokio::select! {
            res = TcpStream::connect(&addr) => {
                res.map_err(|e| VfsError::failed(format!("connect to {}: {}", addr, e)))?
            }
            _ = cancel.cancelled() => return Err(VfsError::cancelled("connect cancelled")),
        };
        tcp.set_nodelay(true).ok();
        let remote_addr = tcp
            .peer_addr()
            .map_err(|e| VfsError::failed(format!("peer_addr: {}", e)))?;

        let mut conn = Connection {
            codec: FtpCodec::new(tcp),
            remote_addr,
            usable: true,
            data: None,
        };
        let banner = conn.receive(cancel).await?;
        Ok((conn, banner))
    }

    /// Send a command, appending `\r\n`. Callers (the path layer and
    /// command builders) must never embed `\r`/`\n` in `command`.
    pub async fn send(
        &mut self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<(), VfsError> {
        debug_assert!(!command.contains(['\r', '\n']));
        let res = tokio::select! {
            r = self.codec.send_command(command) => r,
            _ = cancel.cancelled() => Err(VfsError::cancelled("send cancelled")),
        };
        if res.is_err() {
            self.usable = false;
        }
        res
    }

    /// Read one (possibly multi-line) reply.
    pub async fn receive(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<FtpResponse, VfsError> {
        let res = tokio::select! {
            r = self.codec.read_response() => r,
            _ = cancel.cancelled() => Err(VfsError::cancelled("receive cancelled")),
        };
        if res.is_err() {
            self.usable = false;
        }
        res
    }

    /// Send a command and read the reply in one call.
    pub async fn send_and_receive(
        &mut self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<FtpResponse, VfsError> {
        self.send(command, cancel).await?;
        self.receive(cancel).await
    }

    /// Dial a data channel (passive-style methods). Programmer error to
    /// call this while a data channel is already live.
    pub async fn open_data(
        &mut self,
        addr: SocketAddr,
        cancel: &CancellationToken,
    ) -> Result<(), VfsError> {
        assert!(self.data.is_none(), "data channel already open");
        let stream = tokio::select! {
            res = TcpStream::connect(addr) => {
                res.map_err(|e| VfsError::closed(format!("data connect to {}: {}", addr, e)))?
            }
            _ = cancel.cancelled() => return Err(VfsError::cancelled("data connect cancelled")),
        };
        self.data = Some(DataChannel::Stream(stream));
        Ok(())
    }

    /// Start listening locally (active-style methods); returns the
    /// bound local address to embed in PORT/EPRT.
    pub async fn listen_data(&mut self, bind_ip: std::net::IpAddr) -> Result<SocketAddr, VfsError> {
        assert!(self.data.is_none(), "data channel already open");
        let listener = TcpListener::bind((bind_ip, 0))
            .await
            .map_err(|e| VfsError::failed(format!("bind data listener: {}", e)))?;
        let local = listener
            .local_addr()
            .map_err(|e| VfsError::failed(format!("local_addr: {}", e)))?;
        self.data = Some(DataChannel::Listening(listener));
        Ok(local)
    }

    /// Accept the inbound data connection after sending the command
    /// that triggers the transfer (spec §4.3).
    pub async fn accept_data(&mut self, cancel: &CancellationToken) -> Result<(), VfsError> {
        let listener = match self.data.take() {
            Some(DataChannel::Listening(l)) => l,
            Some(other) => {
                self.data = Some(other);
                return Err(VfsError::failed("accept_data called without a listener"));
            }
            None => return Err(VfsError::failed("no data channel to accept on")),
        };
        let stream = tokio::select! {
            res = listener.accept() => res.map(|(s, _)| s).map_err(|e| VfsError::closed(format!("accept data: {}", e)))?,
            _ = cancel.cancelled() => return Err(VfsError::cancelled("accept cancelled")),
        };
        self.data = Some(DataChannel::Stream(stream));
        Ok(())
    }

    pub async fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        match &mut self.data {
            Some(DataChannel::Stream(s)) => s
                .read(buf)
                .await
                .map_err(|e| VfsError::closed(format!("read_data: {}", e))),
            _ => Err(VfsError::failed("no active data stream")),
        }
    }

    pub async fn write_data(&mut self, buf: &[u8]) -> Result<(), VfsError> {
        match &mut self.data {
            Some(DataChannel::Stream(s)) => s
                .write_all(buf)
                .await
                .map_err(|e| VfsError::closed(format!("write_data: {}", e))),
            _ => Err(VfsError::failed("no active data stream")),
        }
    }

    pub fn close_data(&mut self) {
        self.data = None;
    }

    /// Whether this connection can still be used; poisoned by any
    /// failed send/receive.
    pub fn is_usable(&self) -> bool {
        self.usable
    }

    pub fn mark_unusable(&mut self) {
        self.usable = false;
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Timed NOOP used by the pool's idle-keepalive sweep (spec §4.1
    /// ADD: keepalive). Marks the connection unusable on failure so the
    /// pool discards it rather than handing out a half-dead connection.
    pub async fn keepalive(&mut self, timeout_dur: Duration) -> Result<(), VfsError> {
        let cancel = CancellationToken::new();
        match timeout(timeout_dur, self.send_and_receive("NOOP", &cancel)).await {
            Ok(Ok(resp)) if resp.is_success() => Ok(()),
            Ok(Ok(resp)) => {
                self.usable = false;
                Err(VfsError::failed(format!("NOOP failed: {}", resp.code)))
            }
            Ok(Err(e)) => {
                self.usable = false;
                Err(e)
            }
            Err(_) => {
                self.usable = false;
                Err(VfsError::failed("NOOP timed out"))
            }
        }
    }
}

/// Outcome of logging in and probing features after [`Connection::open`].
pub struct Bootstrap {
    pub features: ServerFeatures,
}

/// LOGIN + setup + feature probe, per spec §4.1 acquire step 4 and
/// spec §8 scenario 1 ("feature detection with retry after login"):
/// `FEAT` is probed *before* LOGIN first; a server that rejects it
/// pre-authentication (or answers with no feature lines) gets the
/// `feat_after_login` workaround engaged and is re-probed once LOGIN
/// completes. `TYPE I`, then `OPTS UTF8 ON` if advertised (tolerating
/// failure), then `SYST`.
pub async fn bootstrap(
    conn: &mut Connection,
    config: &MountConfig,
    cancel: &CancellationToken,
) -> Result<Bootstrap, VfsError> {
    let pre_login_feat = conn.send_and_receive("FEAT", cancel).await?;
    let mut features = if pre_login_feat.is_success() {
        ServerFeatures::parse_feat(&pre_login_feat.lines)
    } else {
        ServerFeatures::default()
    };
    let needs_post_login_retry = !pre_login_feat.is_success() || features.raw.is_empty();

    let user_resp = conn
        .send_and_receive(&format!("USER {}", config.user), cancel)
        .await?;
    if user_resp.is_intermediate() {
        let password = config
            .password
            .clone()
            .unwrap_or_else(|| "ftpvfs@anonymous.invalid".to_string());
        let pass_resp = conn
            .send_and_receive(&format!("PASS {}", password), cancel)
            .await?;
        if !pass_resp.is_success() {
            return Err(VfsError::from_code(pass_resp.code, &pass_resp.text()));
        }
    } else if !user_resp.is_success() {
        return Err(VfsError::from_code(user_resp.code, &user_resp.text()));
    }

    if needs_post_login_retry {
        features.feat_after_login = true;
        let post_login_feat = conn.send_and_receive("FEAT", cancel).await?;
        if post_login_feat.is_success() {
            features = ServerFeatures::parse_feat(&post_login_feat.lines);
            features.feat_after_login = true;
        }
    }

    let type_resp = conn.send_and_receive("TYPE I", cancel).await?;
    if !type_resp.is_success() {
        return Err(VfsError::from_code(type_resp.code, &type_resp.text()));
    }

    if features.utf8 {
        let _ = conn.send_and_receive("OPTS UTF8 ON", cancel).await;
    }

    let syst_resp = conn.send_and_receive("SYST", cancel).await?;
    features.system = if syst_resp.is_success() {
        ServerFeatures::classify_system(&syst_resp.text())
    } else {
        crate::ftp::features::SystemClass::Unknown
    };

    Ok(Bootstrap { features })
}
