use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use crate::error::DownloadError;
use crate::progress::ProgressSink;
use crate::transfer::{ByteRange, Credentials, SharedRateLimiter, TransferUnit, UnitCore};

const DEFAULT_FTP_PORT: u16 = 21;

/// One control-channel reply: the three-digit code and the text after it.
/// For multiline replies the text of the terminating line is kept.
#[derive(Debug)]
struct Reply {
    code: u16,
    text: String,
}

impl Reply {
    fn class(&self) -> u16 {
        self.code / 100
    }
}

/// Parse one reply line into `(code, is_continuation, text)`.
///
/// A line `NNN-...` opens or continues a multiline reply; `NNN ...`
/// terminates it.
fn parse_reply_line(line: &str) -> Option<(u16, bool, &str)> {
    if line.len() < 3 {
        return None;
    }
    let code: u16 = line.get(..3)?.parse().ok()?;
    match line.as_bytes().get(3) {
        None => Some((code, false, "")),
        Some(b' ') => Some((code, false, line[4..].trim_end())),
        Some(b'-') => Some((code, true, line[4..].trim_end())),
        Some(_) => None,
    }
}

/// Extract host and port from a 227 `Entering Passive Mode` reply. The last
/// six numbers in the text are `h1,h2,h3,h4,p1,p2`.
fn parse_passive_addr(text: &str) -> Option<SocketAddr> {
    let numbers: Vec<u8> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u8>())
        .collect::<Result<_, _>>()
        .ok()?;
    if numbers.len() < 6 {
        return None;
    }
    let n = &numbers[numbers.len() - 6..];
    let ip = Ipv4Addr::new(n[0], n[1], n[2], n[3]);
    let port = u16::from(n[4]) << 8 | u16::from(n[5]);
    Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
}

/// Buffered FTP control connection. Every transfer unit and every size
/// probe opens its own; none are shared, so an abrupt stop on one unit
/// cannot corrupt a sibling's command sequence.
struct FtpControl {
    stream: BufReader<TcpStream>,
}

impl FtpControl {
    async fn connect(host: &str, port: u16) -> Result<Self, DownloadError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(DownloadError::Transfer)?;
        let mut ctrl = Self {
            stream: BufReader::new(stream),
        };
        let greeting = ctrl.read_reply("connect").await?;
        if greeting.class() != 2 {
            return Err(DownloadError::FtpProtocol {
                command: "connect",
                reply: greeting.text,
            });
        }
        Ok(ctrl)
    }

    async fn read_reply(&mut self, command: &'static str) -> Result<Reply, DownloadError> {
        let mut line = String::new();
        let mut opening_code = None;
        loop {
            line.clear();
            let n = self
                .stream
                .read_line(&mut line)
                .await
                .map_err(DownloadError::Transfer)?;
            if n == 0 {
                return Err(DownloadError::FtpProtocol {
                    command,
                    reply: "control connection closed".to_string(),
                });
            }
            let parsed = parse_reply_line(line.trim_end_matches(['\r', '\n']));
            match (opening_code, parsed) {
                (None, Some((code, true, _))) => opening_code = Some(code),
                (None, Some((code, false, text))) => {
                    return Ok(Reply {
                        code,
                        text: text.to_string(),
                    })
                }
                (None, None) => {
                    return Err(DownloadError::FtpProtocol {
                        command,
                        reply: format!("malformed reply: {}", line.trim_end()),
                    })
                }
                // Inside a multiline reply everything is skipped until the
                // terminating line with the opening code arrives.
                (Some(open), Some((code, false, text))) if code == open => {
                    return Ok(Reply {
                        code,
                        text: text.to_string(),
                    })
                }
                (Some(_), _) => continue,
            }
        }
    }

    async fn command(&mut self, name: &'static str, line: &str) -> Result<Reply, DownloadError> {
        debug!(command = name, "sending");
        self.stream
            .get_mut()
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .map_err(DownloadError::Transfer)?;
        self.read_reply(name).await
    }

    /// Log in with the given credentials, or fall back to anonymous login.
    async fn login(&mut self, credentials: Option<&Credentials>) -> Result<(), DownloadError> {
        let (user, pass) = match credentials {
            Some(c) => (c.username.as_str(), c.password.as_str()),
            None => ("anonymous", "anonymous@"),
        };

        let mut reply = self.command("USER", &format!("USER {}", user)).await?;
        if reply.class() == 3 {
            reply = self.command("PASS", &format!("PASS {}", pass)).await?;
        }
        if reply.class() != 2 {
            return Err(DownloadError::FtpAuth { reply: reply.text });
        }
        Ok(())
    }

    /// Negotiate passive mode and return the data-socket address.
    async fn passive(&mut self) -> Result<SocketAddr, DownloadError> {
        let reply = self.command("PASV", "PASV").await?;
        if reply.code != 227 {
            return Err(DownloadError::FtpProtocol {
                command: "PASV",
                reply: reply.text,
            });
        }
        parse_passive_addr(&reply.text).ok_or(DownloadError::FtpProtocol {
            command: "PASV",
            reply: reply.text,
        })
    }

    /// Expect a successful completion reply for `name`, failing with
    /// `FtpProtocol` otherwise.
    async fn expect(
        &mut self,
        name: &'static str,
        line: &str,
        class: u16,
    ) -> Result<Reply, DownloadError> {
        let reply = self.command(name, line).await?;
        if reply.class() != class {
            return Err(DownloadError::FtpProtocol {
                command: name,
                reply: reply.text,
            });
        }
        Ok(reply)
    }

    async fn quit(mut self) {
        let _ = self.stream.get_mut().write_all(b"QUIT\r\n").await;
    }
}

fn host_of(url: &Url) -> Result<(&str, u16), DownloadError> {
    let host = url.host_str().ok_or(DownloadError::FtpProtocol {
        command: "connect",
        reply: "URL has no host".to_string(),
    })?;
    Ok((host, url.port().unwrap_or(DEFAULT_FTP_PORT)))
}

/// Transfer unit retrieving its range over FTP: binary type, passive mode,
/// `REST` to the range start, then `RETR` streamed through the shared copy
/// loop.
pub struct FtpTransferUnit {
    core: UnitCore,
    url: Url,
    credentials: Option<Credentials>,
}

impl FtpTransferUnit {
    pub fn new(
        url: Url,
        range: ByteRange,
        index: usize,
        sink: Arc<dyn ProgressSink>,
        credentials: Option<Credentials>,
        destination: PathBuf,
        limiter: Option<SharedRateLimiter>,
    ) -> Self {
        Self {
            core: UnitCore::new(range, index, sink, destination, limiter),
            url,
            credentials,
        }
    }
}

#[async_trait]
impl TransferUnit for FtpTransferUnit {
    async fn download(&self) -> Result<(), DownloadError> {
        let range = self.core.range();
        let (host, port) = host_of(&self.url)?;
        let mut file = self.core.open_destination().await?;

        let mut ctrl = FtpControl::connect(host, port).await?;
        ctrl.login(self.credentials.as_ref()).await?;

        ctrl.expect("SYST", "SYST", 2).await?;
        ctrl.expect("TYPE", "TYPE I", 2).await?;

        let data_addr = ctrl.passive().await?;
        let mut data = TcpStream::connect(data_addr)
            .await
            .map_err(DownloadError::Transfer)?;
        debug!(unit = self.core.index(), %data_addr, "data connection open");

        ctrl.expect("REST", &format!("REST {}", range.first), 3)
            .await?;
        ctrl.expect("RETR", &format!("RETR {}", self.url.path()), 1)
            .await?;

        let result = self.core.copy_range(&mut data, &mut file).await;

        // The data socket is closed on every exit path; the control
        // connection is this unit's own and goes down with it.
        drop(data);
        ctrl.quit().await;
        result
    }

    fn request_stop(&self) {
        self.core.request_stop();
    }

    fn remaining_bytes(&self) -> u64 {
        self.core.remaining()
    }

    fn unit_index(&self) -> usize {
        self.core.index()
    }
}

/// Determine the resource length via `SIZE` on a dedicated control
/// connection. Servers that do not support the query surface as
/// `SizeUnavailable`.
pub async fn probe_size(
    url: &Url,
    credentials: Option<&Credentials>,
) -> Result<u64, DownloadError> {
    let (host, port) = host_of(url)?;
    let mut ctrl = FtpControl::connect(host, port).await?;
    ctrl.login(credentials).await?;

    let reply = ctrl.command("SIZE", &format!("SIZE {}", url.path())).await?;
    if reply.code != 213 {
        ctrl.quit().await;
        return Err(DownloadError::SizeUnavailable);
    }
    let size = match reply.text.trim().parse::<u64>() {
        Ok(size) if size > 0 => size,
        _ => {
            ctrl.quit().await;
            return Err(DownloadError::SizeUnavailable);
        }
    };
    debug!(size, "probed FTP resource size");

    ctrl.quit().await;
    Ok(size)
}
