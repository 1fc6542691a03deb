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

use std::sync::Arc;

use jiff::SignedDuration;
use snafu::Snafu;

use crate::validate::RespError;

pub type Result<T, E = GrabError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum GrabError {
    #[snafu(display("Invalid URL {url}: {source}"))]
    InvalidUrl { url: String, source: url::ParseError },

    #[snafu(display("Invalid header name {name:?}: {source}"))]
    InvalidHeaderName {
        name:   String,
        source: reqwest::header::InvalidHeaderName,
    },

    #[snafu(display("Invalid value for header {name:?}: {source}"))]
    InvalidHeaderValue {
        name:   String,
        source: reqwest::header::InvalidHeaderValue,
    },

    #[snafu(display("{field} must be non-negative, got {value}"))]
    InvalidDuration {
        field: &'static str,
        value: SignedDuration,
    },

    #[snafu(display("Invalid proxy {proxy}: {source}"))]
    InvalidProxy {
        proxy:  String,
        source: reqwest::Error,
    },

    #[snafu(display("Failed to build HTTP client: {source}"))]
    BuildClient { source: reqwest::Error },

    #[snafu(display("Request to {url} failed: {source}"))]
    Transport { url: String, source: reqwest::Error },

    /// The request could not be built locally, e.g. an unsupported scheme.
    #[snafu(display("Cannot send request to {url}: {source}"))]
    InvalidRequest { url: String, source: reqwest::Error },

    #[snafu(display("{source}"))]
    Response { source: RespError },

    #[snafu(display(
        "Retrieving objects with undefined content-length responses (chunked transfer encoding / \
         EOF close) is not supported: {url}"
    ))]
    UnknownLength { url: String },

    #[snafu(display("Redirect {status} from {url} has no usable Location header"))]
    Redirect { url: String, status: u16 },

    #[snafu(display("Stopped after {max} redirects starting at {url}"))]
    TooManyRedirects { url: String, max: usize },

    #[snafu(display("Refusing to follow a redirect for a {method} request to {url}"))]
    RedirectNotAllowed { method: String, url: String },

    #[snafu(display("Missing Content-Range header in response from {url}"))]
    MissingContentRange { url: String },

    #[snafu(display(
        "Requested bytes from offset {expected} but the server answered from offset {actual}"
    ))]
    RangeMismatch { expected: u64, actual: u64 },

    #[snafu(display("Resource length changed from {expected} to {actual} bytes"))]
    LengthChanged { expected: u64, actual: u64 },

    #[snafu(display("Request failed after {attempts} attempts: {source}"))]
    RetriesExhausted {
        attempts: usize,
        source:   Box<GrabError>,
    },

    #[snafu(display(
        "Unable to read from response body after {attempts} attempts at position {position}: \
         {source}"
    ))]
    ReadExhausted {
        attempts: usize,
        position: u64,
        source:   std::io::Error,
    },

    /// A fatal read error recorded on the stream and replayed by later reads.
    #[snafu(display("{source}"))]
    Failed { source: Arc<GrabError> },

    #[snafu(display("Operation on closed stream"))]
    Closed,

    #[snafu(display("Cannot seek before beginning (from position {position})"))]
    InvalidSeek { position: u64 },

    #[snafu(display("Read at position {position} past {length} boundary"))]
    PastBoundary { position: u64, length: u64 },

    #[snafu(display("Cannot verify transfer for content that has been seeked"))]
    Unverifiable,

    #[snafu(display(
        "ETag: server reported ETag of {expected:?} but we calculated a digest of {actual:?}"
    ))]
    DigestMismatch { expected: String, actual: String },

    #[snafu(display("Failed to write copied data: {source}"))]
    Io { source: std::io::Error },
}

impl GrabError {
    /// Whether the executor may try the request again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::Response { .. }
                | Self::UnknownLength { .. }
                | Self::Redirect { .. }
                | Self::TooManyRedirects { .. }
        )
    }

    /// Walks through `Failed` and `RetriesExhausted` wrappers to the error
    /// that actually ended the operation.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Failed { source } => source.root(),
            Self::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}
