// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fmt,
    io::{self, SeekFrom},
    pin::Pin,
    sync::Arc,
};

use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use reqwest::{
    Client, Response,
    header::{ETAG, HeaderMap},
};
use snafu::{OptionExt, ResultExt, ensure};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::GrabConfig,
    digest::{ExpectedDigest, IntegrityAccumulator, TeeReader},
    error::{
        ClosedSnafu, DigestMismatchSnafu, GrabError, InvalidSeekSnafu, InvalidUrlSnafu, IoSnafu,
        LengthChangedSnafu, PastBoundarySnafu, ReadExhaustedSnafu, Result, UnverifiableSnafu,
    },
    executor::Executor,
    request::RequestTemplate,
};

/// Buffer size used by [`Body::copy_to`] and [`Body::into_stream`].
const CHUNK_SIZE: usize = 64 * 1024;

type ActiveReader = Pin<Box<dyn AsyncRead + Send>>;

fn into_reader(response: Response) -> ActiveReader {
    Box::pin(StreamReader::new(
        response.bytes_stream().map_err(io::Error::other),
    ))
}

/// A seekable view of a remote object that survives dropped connections.
///
/// The length is fixed by the first response. Reads that fail mid-body
/// reconnect with a `Range` request from the current position, and the bytes
/// handed to the caller are hashed so the result can be checked against the
/// server's ETag with [`Body::verify`].
///
/// A fatal read error is recorded and replayed by every later read until a
/// seek moves the position.
pub struct Body {
    executor: Executor,
    template: RequestTemplate,
    length:   u64,
    position: u64,
    active:   Option<ActiveReader>,
    digest:   IntegrityAccumulator,
    expected: Option<ExpectedDigest>,
    etag:     Option<String>,
    headers:  HeaderMap,
    seeked:   bool,
    closed:   bool,
    failure:  Option<Arc<GrabError>>,
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("url", self.template.url())
            .field("length", &self.length)
            .field("position", &self.position)
            .field("connected", &self.active.is_some())
            .field("seeked", &self.seeked)
            .field("closed", &self.closed)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

impl Body {
    /// Opens `url` with a client built from `config.client`.
    pub async fn open(url: &str, config: &GrabConfig) -> Result<Self> {
        let client = config.client.build_client()?;
        Self::open_with_client(url, client, config).await
    }

    /// Opens `url` with a caller-supplied client. The client must not follow
    /// redirects itself.
    pub async fn open_with_client(url: &str, client: Client, config: &GrabConfig) -> Result<Self> {
        let parsed = Url::parse(url).context(InvalidUrlSnafu { url })?;
        let mut template = RequestTemplate::get(parsed, config.header_map()?);
        let executor = Executor::new(client, config)?;

        let valid = executor.execute(&mut template, None).await?;
        let headers = valid.response.headers().clone();
        let raw_etag = headers.get(ETAG).and_then(|value| value.to_str().ok());
        let expected = raw_etag.and_then(ExpectedDigest::parse);
        let etag = raw_etag.map(|value| value.trim().trim_matches('"').to_string());

        info!(
            url,
            target = %template.target(),
            length = valid.length,
            etag = etag.as_deref().unwrap_or_default(),
            "opened remote body"
        );

        Ok(Self {
            executor,
            template,
            length: valid.length,
            position: 0,
            active: Some(into_reader(valid.response)),
            digest: IntegrityAccumulator::new(),
            expected,
            etag,
            headers,
            seeked: false,
            closed: false,
            failure: None,
        })
    }

    /// Total size of the object as reported when it was opened.
    #[must_use]
    pub const fn len(&self) -> u64 { self.length }

    #[must_use]
    pub const fn is_empty(&self) -> bool { self.length == 0 }

    #[must_use]
    pub const fn position(&self) -> u64 { self.position }

    /// Whether a seek away from the start has happened since the last rewind.
    #[must_use]
    pub const fn seeked(&self) -> bool { self.seeked }

    /// ETag of the first response, quotes removed.
    #[must_use]
    pub fn etag(&self) -> Option<&str> { self.etag.as_deref() }

    /// Headers of the first response.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap { &self.headers }

    /// URL requests currently go to, after redirects.
    #[must_use]
    pub fn url(&self) -> &Url { self.template.target() }

    /// MD5 of the bytes read since the start.
    #[must_use]
    pub fn sum(&self) -> Vec<u8> { self.digest.sum() }

    /// Reads up to `buf.len()` bytes. `Ok(0)` means the end of the object.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        ensure!(!self.closed, ClosedSnafu);
        if let Some(failure) = &self.failure {
            return Err(GrabError::Failed {
                source: Arc::clone(failure),
            });
        }
        if buf.is_empty() {
            return Ok(0);
        }
        ensure!(
            self.position <= self.length,
            PastBoundarySnafu {
                position: self.position,
                length:   self.length,
            }
        );
        if self.position == self.length {
            self.active = None;
            return Ok(0);
        }

        match self.read_inner(buf).await {
            Ok(n) => Ok(n),
            Err(err) => {
                warn!(url = %self.template.target(), position = self.position, "read failed: {err}");
                let err = Arc::new(err);
                self.failure = Some(Arc::clone(&err));
                Err(GrabError::Failed { source: err })
            }
        }
    }

    async fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.length - self.position;
        let limit = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let buf = &mut buf[..limit];
        let attempts = self.executor.attempts();
        let mut failures = 0_usize;

        loop {
            let mut reader = match self.active.take() {
                Some(reader) => reader,
                None => self.reopen().await?,
            };
            let outcome = TeeReader::new(&mut reader, &mut self.digest)
                .read(buf)
                .await;
            let cause = match outcome {
                Ok(0) => io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "connection closed at byte {} of {}",
                        self.position, self.length
                    ),
                ),
                Ok(n) => {
                    self.position += n as u64;
                    if self.position < self.length {
                        self.active = Some(reader);
                    }
                    return Ok(n);
                }
                Err(err) => err,
            };
            drop(reader);

            failures += 1;
            if failures > attempts {
                return Err(cause).context(ReadExhaustedSnafu {
                    attempts,
                    position: self.position,
                });
            }
            let delay = self.executor.backoff().delay_for(failures);
            warn!(
                url = %self.template.target(),
                position = self.position,
                attempt = failures,
                attempts,
                ?delay,
                "body read interrupted, reconnecting: {cause}"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Requests the rest of the object from the current position.
    async fn reopen(&mut self) -> Result<ActiveReader> {
        let offset = (self.position > 0).then_some(self.position);
        debug!(url = %self.template.target(), ?offset, "reopening body");

        let valid = self.executor.execute(&mut self.template, offset).await?;
        let reported = match offset {
            Some(_) => valid.content_range().and_then(|range| range.total),
            None => Some(valid.length),
        };
        if let Some(actual) = reported {
            ensure!(
                actual == self.length,
                LengthChangedSnafu {
                    expected: self.length,
                    actual,
                }
            );
        }
        Ok(into_reader(valid.response))
    }

    /// Moves the read position. No request is made until the next read.
    ///
    /// Seeking anywhere but the start makes the transfer unverifiable;
    /// seeking back to the start restarts the digest.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        ensure!(!self.closed, ClosedSnafu);
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.length.checked_add_signed(delta),
        }
        .context(InvalidSeekSnafu {
            position: self.position,
        })?;

        if target == self.position {
            return Ok(target);
        }

        debug!(from = self.position, to = target, "seek");
        self.active = None;
        self.failure = None;
        self.position = target;
        if target == 0 {
            self.digest.reset();
            self.seeked = false;
        } else {
            self.seeked = true;
        }
        Ok(target)
    }

    /// Compares the digest of everything read against the ETag. Objects
    /// without a plain MD5 ETag always pass.
    pub fn verify(&self) -> Result<()> {
        ensure!(!self.closed, ClosedSnafu);
        let Some(expected) = &self.expected else {
            return Ok(());
        };
        ensure!(!self.seeked, UnverifiableSnafu);
        let actual = self.digest.hex();
        ensure!(
            actual == expected.as_str(),
            DigestMismatchSnafu {
                expected: expected.as_str(),
                actual,
            }
        );
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        ensure!(!self.closed, ClosedSnafu);
        self.closed = true;
        self.active = None;
        debug!(url = %self.template.target(), position = self.position, "closed body");
        Ok(())
    }

    /// Reads until the end of the object, writing everything to `writer`.
    pub async fn copy_to<W>(&mut self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut buf = vec![0_u8; CHUNK_SIZE];
        let mut copied = 0_u64;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await.context(IoSnafu)?;
            copied += n as u64;
        }
        writer.flush().await.context(IoSnafu)?;
        Ok(copied)
    }

    /// Turns the body into a stream of chunks ending at the end of the
    /// object or at the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> {
        futures::stream::try_unfold(self, |mut body| async move {
            let mut buf = BytesMut::zeroed(CHUNK_SIZE);
            let n = body.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            buf.truncate(n);
            Ok::<_, GrabError>(Some((buf.freeze(), body)))
        })
    }
}
