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

use reqwest::{Method, header::HeaderMap};
use tracing::debug;
use url::Url;

/// The request a [`Body`](crate::Body) replays on every reconnect.
///
/// Once the first full-range request has followed its redirects, the final
/// location is remembered and later requests go there directly.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    method:   Method,
    url:      Url,
    headers:  HeaderMap,
    resolved: Option<Url>,
}

impl RequestTemplate {
    #[must_use]
    pub const fn new(method: Method, url: Url, headers: HeaderMap) -> Self {
        Self {
            method,
            url,
            headers,
            resolved: None,
        }
    }

    #[must_use]
    pub const fn get(url: Url, headers: HeaderMap) -> Self { Self::new(Method::GET, url, headers) }

    #[must_use]
    pub const fn method(&self) -> &Method { &self.method }

    /// The URL the caller asked for.
    #[must_use]
    pub const fn url(&self) -> &Url { &self.url }

    #[must_use]
    pub const fn headers(&self) -> &HeaderMap { &self.headers }

    #[must_use]
    pub const fn resolved(&self) -> Option<&Url> { self.resolved.as_ref() }

    /// Where the next request should be sent.
    #[must_use]
    pub fn target(&self) -> &Url { self.resolved.as_ref().unwrap_or(&self.url) }

    /// Records the final location of a redirect chain. Locations equal to
    /// the original URL are ignored.
    pub fn resolve(&mut self, location: Url) {
        if location != self.url {
            debug!(from = %self.url, to = %location, "caching resolved location");
            self.resolved = Some(location);
        }
    }
}
