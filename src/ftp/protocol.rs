//! Low-level FTP command/response codec (RFC 959 §4, spec §4.1/§4.2).
//!
//! Handles sending CRLF-terminated commands and reading single- or
//! multi-line replies off the control channel.

use crate::ftp::error::VfsError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// A single FTP response, possibly spanning multiple lines.
#[derive(Debug, Clone)]
pub struct FtpResponse {
    pub code: u16,
    pub lines: Vec<String>,
}

impl FtpResponse {
    /// Full response text (all lines joined).
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn is_success(&self) -> bool {
        self.code < 400
    }

    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }
}

/// The command/response codec operating on split halves of a TCP stream.
pub struct FtpCodec {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl FtpCodec {
    pub fn new(stream: tokio::net::TcpStream) -> Self {
        let (rd, wr) = stream.into_split();
        Self {
            reader: BufReader::new(rd),
            writer: wr,
        }
    }

    /// Send a raw FTP command (without trailing CRLF — we add it).
    pub async fn send_command(&mut self, cmd: &str) -> Result<(), VfsError> {
        let line = format!("{}\r\n", cmd);
        self.writer.write_all(line.as_bytes()).await?;
        log::trace!(">>> {}", cmd);
        Ok(())
    }

    async fn read_line_raw(&mut self) -> Result<String, VfsError> {
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf).await?;
        if n == 0 {
            return Err(VfsError::closed("server closed control connection"));
        }
        Ok(buf)
    }

    /// Read a complete FTP response, handling the `NNN-`...`NNN ` multi-line
    /// framing convention.
    pub async fn read_response(&mut self) -> Result<FtpResponse, VfsError> {
        let first = self.read_line_raw().await?;
        let first_trimmed = first.trim_end_matches(['\r', '\n']);

        if first_trimmed.len() < 3 {
            return Err(VfsError::failed(format!(
                "response too short: '{}'",
                first_trimmed
            )));
        }

        let code = parse_code(first_trimmed)?;
        let mut lines = vec![first_trimmed.to_string()];

        let is_multi = first_trimmed.len() >= 4 && first_trimmed.as_bytes()[3] == b'-';
        if is_multi {
            let terminator = format!("{} ", code);
            loop {
                let next = self.read_line_raw().await?;
                let next_trimmed = next.trim_end_matches(['\r', '\n']);
                lines.push(next_trimmed.to_string());
                if next_trimmed.starts_with(&terminator) {
                    break;
                }
            }
        }

        let resp = FtpResponse { code, lines };
        log::trace!(
            "<<< {} {}",
            resp.code,
            resp.lines.last().map(String::as_str).unwrap_or("")
        );
        Ok(resp)
    }

    /// Send a command and return the parsed response.
    pub async fn execute(&mut self, cmd: &str) -> Result<FtpResponse, VfsError> {
        self.send_command(cmd).await?;
        self.read_response().await
    }
}

/// Parse the 3-digit reply code from the start of a line.
fn parse_code(line: &str) -> Result<u16, VfsError> {
    if line.len() < 3 {
        return Err(VfsError::failed("response too short to contain code"));
    }
    line[..3]
        .parse::<u16>()
        .map_err(|_| VfsError::failed(format!("invalid reply code in: '{}'", line)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_line_code() {
        assert_eq!(parse_code("220 ready").unwrap(), 220);
    }

    #[test]
    fn rejects_short_line() {
        assert!(parse_code("2").is_err());
    }
}
