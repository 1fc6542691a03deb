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
    fmt, io,
    pin::Pin,
    task::{Context, Poll, ready},
};

use md5::{Digest, Md5};
use tokio::io::{AsyncRead, ReadBuf};

/// Hex length of an MD5 digest.
pub const DIGEST_HEX_LEN: usize = 32;

/// Running MD5 over the bytes handed to the caller.
#[derive(Clone, Default)]
pub struct IntegrityAccumulator {
    state: Md5,
}

impl fmt::Debug for IntegrityAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityAccumulator")
            .field("digest", &self.hex())
            .finish()
    }
}

impl IntegrityAccumulator {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    pub fn update(&mut self, data: &[u8]) { self.state.update(data); }

    pub fn reset(&mut self) { self.state = Md5::new(); }

    /// Digest of everything seen since the last reset. Does not consume the
    /// running state.
    #[must_use]
    pub fn sum(&self) -> Vec<u8> { self.state.clone().finalize().to_vec() }

    /// Lowercase hex form of [`IntegrityAccumulator::sum`].
    #[must_use]
    pub fn hex(&self) -> String { format!("{:x}", self.state.clone().finalize()) }
}

/// Whole-object digest advertised by the server through its ETag.
///
/// Only single-part uploads carry a plain MD5 ETag; multi-part uploads use
/// `<md5>-<parts>` and are rejected, as are weak validators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedDigest(String);

impl ExpectedDigest {
    #[must_use]
    pub fn parse(etag: &str) -> Option<Self> {
        let etag = etag.trim();
        if etag.starts_with("W/") {
            return None;
        }
        let value = etag
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(etag);
        (value.len() == DIGEST_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit()))
            .then(|| Self(value.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ExpectedDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Reader that feeds every byte it delivers into an accumulator.
pub struct TeeReader<'a, R> {
    reader: &'a mut R,
    digest: &'a mut IntegrityAccumulator,
}

impl<'a, R> TeeReader<'a, R> {
    pub const fn new(reader: &'a mut R, digest: &'a mut IntegrityAccumulator) -> Self {
        Self { reader, digest }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TeeReader<'_, R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut *this.reader).poll_read(cx, buf))?;
        this.digest.update(&buf.filled()[before..]);
        Poll::Ready(Ok(()))
    }
}
