use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{header, Client, RequestBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

use crate::error::DownloadError;
use crate::progress::ProgressSink;
use crate::transfer::{ByteRange, Credentials, SharedRateLimiter, TransferUnit, UnitCore};

const USER_AGENT: &str = concat!("segdl/", env!("CARGO_PKG_VERSION"));

fn build_client() -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn apply_auth(request: RequestBuilder, credentials: Option<&Credentials>) -> RequestBuilder {
    match credentials {
        Some(c) => request.basic_auth(&c.username, Some(&c.password)),
        None => request,
    }
}

/// Transfer unit fetching its range with an HTTP `Range` request.
pub struct HttpTransferUnit {
    core: UnitCore,
    url: Url,
    credentials: Option<Credentials>,
    client: Client,
}

impl HttpTransferUnit {
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
            client: build_client(),
        }
    }
}

#[async_trait]
impl TransferUnit for HttpTransferUnit {
    async fn download(&self) -> Result<(), DownloadError> {
        let range = self.core.range();
        let mut file = self.core.open_destination().await?;

        let range_header = format!("bytes={}-{}", range.first, range.last);
        debug!(unit = self.core.index(), %range_header, "requesting range");
        let request = apply_auth(
            self.client
                .get(self.url.clone())
                .header(header::RANGE, range_header),
            self.credentials.as_ref(),
        );

        let response = request.send().await?;
        let status = response.status();
        // Anything but 206 means the server did not honor the byte range;
        // streaming a full 200 body into this unit's offset would corrupt
        // the shared file.
        if status != reqwest::StatusCode::PARTIAL_CONTENT {
            return Err(DownloadError::HttpStatus(status));
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut reader = StreamReader::new(stream);

        self.core.copy_range(&mut reader, &mut file).await
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

/// Determine the resource length with a plain GET (no `Range`), reading the
/// declared content length and dropping the connection without consuming
/// the body.
pub async fn probe_size(
    url: &Url,
    credentials: Option<&Credentials>,
) -> Result<u64, DownloadError> {
    let client = build_client();
    let request = apply_auth(client.get(url.clone()), credentials);

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::HttpStatus(status));
    }

    match response.content_length() {
        Some(length) if length > 0 => {
            debug!(length, "probed HTTP resource size");
            Ok(length)
        }
        _ => Err(DownloadError::SizeUnavailable),
    }
}
