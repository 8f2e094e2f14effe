use thiserror::Error;

/// Errors surfaced by the size probe and the per-segment transfer loop.
///
/// There are no internal retries anywhere: the first failure a probe or a
/// transfer hits is reported synchronously from that call. A cooperative
/// stop is not an error and never appears here.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The remote endpoint could not report the resource length.
    #[error("could not determine remote resource size")]
    SizeUnavailable,

    /// The server answered with a non-success HTTP status.
    #[error("unexpected HTTP status {0}")]
    HttpStatus(reqwest::StatusCode),

    /// Building or sending the HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// FTP login was rejected.
    #[error("FTP login rejected: {reply}")]
    FtpAuth { reply: String },

    /// An FTP command in the transfer sequence was rejected or its reply
    /// could not be parsed.
    #[error("FTP {command} failed: {reply}")]
    FtpProtocol { command: &'static str, reply: String },

    /// A network read failed mid-transfer.
    #[error("transfer failed: {0}")]
    Transfer(#[source] std::io::Error),

    /// The remote closed the connection before the range was exhausted.
    #[error("remote closed connection with {remaining} bytes left in range")]
    TruncatedTransfer { remaining: u64 },

    /// The destination file could not be opened, seeked, or written.
    #[error("destination file error: {0}")]
    FileSystem(#[source] std::io::Error),

    /// The URL scheme has no transfer backend.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}
