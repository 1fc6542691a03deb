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

//! Resumable, seekable reads of a remote object over HTTP.
//!
//! [`Body`] issues one full request, then reconnects with `Range` requests
//! whenever the connection drops, so callers see an uninterrupted stream of
//! bytes. Requests that fail outright are retried with exponential backoff,
//! and the data read can be checked against an MD5 ETag.
//!
//! ```no_run
//! # async fn run() -> grab::Result<()> {
//! let mut body = grab::open("https://example.com/bucket/object").await?;
//! let mut out = tokio::io::sink();
//! body.copy_to(&mut out).await?;
//! body.verify()?;
//! body.close()?;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod body;
mod config;
mod digest;
mod error;
mod executor;
mod request;
mod validate;

pub use backoff::{
    BackoffPolicy, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, RetryDelays, RetrySchedule,
};
pub use body::Body;
pub use config::{ClientConfig, DEFAULT_ATTEMPTS, DEFAULT_MAX_REDIRECTS, GrabConfig};
pub use digest::{ExpectedDigest, IntegrityAccumulator, TeeReader};
pub use error::{GrabError, Result};
pub use executor::Executor;
pub use request::RequestTemplate;
pub use validate::{ContentRange, RespError, ValidResponse, validate};

/// Opens `url` with the default configuration.
pub async fn open(url: &str) -> Result<Body> { Body::open(url, &GrabConfig::default()).await }
