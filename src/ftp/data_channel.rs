//! Data-channel negotiation: PASV, EPSV, PASV-with-command-address,
//! PORT, EPRT, and the `ANY` fallback policy (spec §4.3).

use crate::ftp::connection::Connection;
use crate::ftp::error::VfsError;
use crate::ftp::features::{DataMethod, PreferredMethod, ServerFeatures};
use lazy_static::lazy_static;
use regex::Regex;
use std::net::{IpAddr, SocketAddr};
use tokio_util::sync::CancellationToken;

lazy_static! {
    static ref PASV_RE: Regex = Regex::new(r"\((\d+),(\d+),(\d+),(\d+),(\d+),(\d+)\)").unwrap();
    static ref EPSV_RE: Regex = Regex::new(r"\|\|\|(\d+)\|").unwrap();
}

/// A single concrete negotiation method, explicitly named so a Task can
/// record which one it used (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Pasv,
    Epsv,
    PasvCommandAddress,
    Port,
    Eprt,
}

impl Method {
    fn as_data_method(self) -> DataMethod {
        match self {
            Method::Pasv => DataMethod::Pasv,
            Method::Epsv => DataMethod::Epsv,
            Method::PasvCommandAddress => DataMethod::PasvCommandAddress,
            Method::Port => DataMethod::Port,
            Method::Eprt => DataMethod::Eprt,
        }
    }
}

/// Negotiate a data channel using a specific method.
///
/// For listening methods (`Port`/`Eprt`) this only binds and sends the
/// command; the caller must send the command that triggers the
/// transfer and then call `conn.accept_data` themselves, per spec
/// §4.3's note that listening modes accept only after the triggering
/// command is sent.
async fn negotiate_one(
    conn: &mut Connection,
    method: Method,
    cancel: &CancellationToken,
) -> Result<(), VfsError> {
    match method {
        Method::Pasv => {
            let resp = conn.send_and_receive("PASV", cancel).await?;
            if !resp.is_success() {
                return Err(VfsError::from_code(resp.code, &resp.text()));
            }
            let addr = parse_pasv(&resp.text())?;
            conn.open_data(addr, cancel).await
        }
        Method::PasvCommandAddress => {
            let resp = conn.send_and_receive("PASV", cancel).await?;
            if !resp.is_success() {
                return Err(VfsError::from_code(resp.code, &resp.text()));
            }
            let (_, port) = parse_pasv_parts(&resp.text())?;
            let addr = SocketAddr::new(conn.remote_address().ip(), port);
            conn.open_data(addr, cancel).await
        }
        Method::Epsv => {
            let resp = conn.send_and_receive("EPSV", cancel).await?;
            if !resp.is_success() {
                return Err(VfsError::from_code(resp.code, &resp.text()));
            }
            let port = parse_epsv(&resp.text())?;
            let addr = SocketAddr::new(conn.remote_address().ip(), port);
            conn.open_data(addr, cancel).await
        }
        Method::Port => {
            let bind_ip: IpAddr = match conn.remote_address().ip() {
                IpAddr::V4(_) => "0.0.0.0".parse().unwrap(),
                IpAddr::V6(_) => return Err(VfsError::not_supported("PORT requires IPv4")),
            };
            let local = conn.listen_data(bind_ip).await?;
            let ip = match local.ip() {
                IpAddr::V4(v4) => v4,
                IpAddr::V6(_) => return Err(VfsError::not_supported("PORT requires IPv4")),
            };
            let octets = ip.octets();
            let port = local.port();
            let cmd = format!(
                "PORT {},{},{},{},{},{}",
                octets[0],
                octets[1],
                octets[2],
                octets[3],
                port / 256,
                port % 256
            );
            let resp = conn.send_and_receive(&cmd, cancel).await?;
            if !resp.is_success() {
                return Err(VfsError::from_code(resp.code, &resp.text()));
            }
            Ok(())
        }
        Method::Eprt => {
            let bind_ip = conn.remote_address().ip();
            let local = conn.listen_data(bind_ip).await?;
            let af = match local.ip() {
                IpAddr::V4(_) => 1,
                IpAddr::V6(_) => 2,
            };
            let cmd = format!("EPRT |{}|{}|{}|", af, local.ip(), local.port());
            let resp = conn.send_and_receive(&cmd, cancel).await?;
            if !resp.is_success() {
                return Err(VfsError::from_code(resp.code, &resp.text()));
            }
            Ok(())
        }
    }
}

fn parse_pasv_parts(text: &str) -> Result<([u8; 4], u16), VfsError> {
    let caps = PASV_RE
        .captures(text)
        .ok_or_else(|| VfsError::failed(format!("cannot parse PASV reply: {}", text)))?;
    let mut nums = [0u8; 6];
    for i in 0..6 {
        nums[i] = caps[i + 1]
            .parse::<u8>()
            .map_err(|_| VfsError::failed("PASV octet out of range"))?;
    }
    let ip = [nums[0], nums[1], nums[2], nums[3]];
    let port = (nums[4] as u16) * 256 + nums[5] as u16;
    Ok((ip, port))
}

fn parse_pasv(text: &str) -> Result<SocketAddr, VfsError> {
    let (ip, port) = parse_pasv_parts(text)?;
    Ok(SocketAddr::new(IpAddr::from(ip), port))
}

fn parse_epsv(text: &str) -> Result<u16, VfsError> {
    let caps = EPSV_RE
        .captures(text)
        .ok_or_else(|| VfsError::failed(format!("cannot parse EPSV reply: {}", text)))?;
    caps[1]
        .parse::<u16>()
        .map_err(|_| VfsError::failed("EPSV port out of range"))
}

/// Policy for picking a data-channel method.
#[derive(Debug, Clone, Copy)]
pub enum Policy {
    /// Try, in order: PASV, EPSV (if advertised), PORT, EPRT (if
    /// advertised); on total failure, also try methods whose
    /// capability bit was not advertised.
    Any,
    /// Force a single specific method.
    Fixed(Method),
}

fn ordered_candidates(features: &ServerFeatures) -> Vec<Method> {
    let mut advertised = vec![Method::Pasv];
    if features.epsv {
        advertised.push(Method::Epsv);
    }
    advertised.push(Method::Port);
    if features.eprt {
        advertised.push(Method::Eprt);
    }

    let mut unadvertised = Vec::new();
    if !features.epsv {
        unadvertised.push(Method::Epsv);
    }
    if !features.eprt {
        unadvertised.push(Method::Eprt);
    }

    advertised.extend(unadvertised);
    advertised
}

/// Negotiate a data channel per `policy`, updating `preferred` on the
/// first method that succeeds (spec §4.3's atomic compare-and-set of
/// the Backend's `method` field).
pub async fn negotiate(
    conn: &mut Connection,
    features: &ServerFeatures,
    preferred: &PreferredMethod,
    policy: Policy,
    cancel: &CancellationToken,
) -> Result<Method, VfsError> {
    match policy {
        Policy::Fixed(m) => {
            negotiate_one(conn, m, cancel).await?;
            preferred.set(m.as_data_method());
            Ok(m)
        }
        Policy::Any => {
            let mut last_err = None;
            for method in ordered_candidates(features) {
                match negotiate_one(conn, method, cancel).await {
                    Ok(()) => {
                        preferred.set(method.as_data_method());
                        return Ok(method);
                    }
                    Err(e) => {
                        conn.close_data();
                        last_err = Some(e);
                    }
                }
            }
            Err(last_err.unwrap_or_else(|| VfsError::failed("no data-channel method available")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pasv_reply() {
        let addr = parse_pasv("227 Entering Passive Mode (127,0,0,1,19,136)").unwrap();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 19 * 256 + 136);
    }

    #[test]
    fn parses_epsv_reply() {
        let port = parse_epsv("229 Entering Extended Passive Mode (|||60049|)").unwrap();
        assert_eq!(port, 60049);
    }

    #[test]
    fn candidate_order_with_full_advertisement() {
        let features = ServerFeatures {
            epsv: true,
            eprt: true,
            ..Default::default()
        };
        let order = ordered_candidates(&features);
        assert_eq!(
            order,
            vec![Method::Pasv, Method::Epsv, Method::Port, Method::Eprt]
        );
    }

    #[test]
    fn candidate_order_falls_back_to_unadvertised() {
        let features = ServerFeatures::default();
        let order = ordered_candidates(&features);
        assert_eq!(
            order,
            vec![Method::Pasv, Method::Port, Method::Epsv, Method::Eprt]
        );
    }
}
