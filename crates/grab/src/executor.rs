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

use backon::Retryable;
use reqwest::{
    Client, Method,
    header::{AUTHORIZATION, COOKIE, HeaderMap, HeaderValue, LOCATION, PROXY_AUTHORIZATION, RANGE},
};
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, warn};
use url::Url;

use crate::{
    backoff::BackoffPolicy,
    config::GrabConfig,
    error::{
        GrabError, InvalidHeaderValueSnafu, MissingContentRangeSnafu, RangeMismatchSnafu,
        RedirectNotAllowedSnafu, RedirectSnafu, Result, TooManyRedirectsSnafu,
    },
    request::RequestTemplate,
    validate::{ValidResponse, is_redirect, validate},
};

/// Sends a [`RequestTemplate`], following redirects by hand and retrying
/// transient failures with exponential backoff.
#[derive(Debug, Clone)]
pub struct Executor {
    client:                   Client,
    attempts:                 usize,
    backoff:                  BackoffPolicy,
    follow_redirects:         bool,
    max_redirects:            usize,
    keep_headers_on_redirect: bool,
}

impl Executor {
    /// The client must have its own redirect handling disabled.
    pub fn new(client: Client, config: &GrabConfig) -> Result<Self> {
        Ok(Self {
            client,
            attempts: config.effective_attempts(),
            backoff: config.backoff()?,
            follow_redirects: config.client.follow_redirects,
            max_redirects: config.client.max_redirects,
            keep_headers_on_redirect: config.client.keep_headers_on_redirect,
        })
    }

    #[must_use]
    pub const fn attempts(&self) -> usize { self.attempts }

    #[must_use]
    pub const fn backoff(&self) -> BackoffPolicy { self.backoff }

    /// Executes the request, asking for the bytes from `offset` onward when
    /// one is given.
    ///
    /// A full-range request records its final redirect location on the
    /// template. A ranged request must come back with a `Content-Range`
    /// starting exactly at `offset`.
    pub async fn execute(
        &self,
        template: &mut RequestTemplate,
        offset: Option<u64>,
    ) -> Result<ValidResponse> {
        let request: &RequestTemplate = template;
        let mut retry = 0_usize;
        let outcome = (|| self.attempt(request, offset))
            .retry(self.backoff.schedule(self.attempts))
            .when(GrabError::is_retryable)
            .notify(|err, delay| {
                retry += 1;
                warn!(
                    url = %request.target(),
                    retry,
                    attempts = self.attempts,
                    ?delay,
                    "request failed, retrying: {err}"
                );
            })
            .await;

        let valid = match outcome {
            Ok(valid) => valid,
            Err(err) if err.is_retryable() => {
                return Err(GrabError::RetriesExhausted {
                    attempts: self.attempts,
                    source:   Box::new(err),
                });
            }
            Err(err) => return Err(err),
        };

        match offset {
            Some(offset) => {
                let range = valid.content_range().context(MissingContentRangeSnafu {
                    url: valid.response.url().as_str(),
                })?;
                ensure!(
                    range.start == offset,
                    RangeMismatchSnafu {
                        expected: offset,
                        actual:   range.start,
                    }
                );
            }
            None => template.resolve(valid.response.url().clone()),
        }
        Ok(valid)
    }

    async fn attempt(&self, template: &RequestTemplate, offset: Option<u64>) -> Result<ValidResponse> {
        let method = template.method().clone();
        let mut url = template.target().clone();
        let mut headers = template.headers().clone();
        if let Some(offset) = offset {
            let range = HeaderValue::try_from(format!("bytes={offset}-"))
                .context(InvalidHeaderValueSnafu { name: RANGE.as_str() })?;
            headers.insert(RANGE, range);
        }

        let mut redirects = 0;
        loop {
            let response = self
                .client
                .request(method.clone(), url.clone())
                .headers(headers.clone())
                .send()
                .await
                .map_err(|source| {
                    let url = url.to_string();
                    if source.is_builder() {
                        GrabError::InvalidRequest { url, source }
                    } else {
                        GrabError::Transport { url, source }
                    }
                })?;

            let status = response.status();
            if !self.follow_redirects || !is_redirect(status) {
                return validate(response).await;
            }

            ensure!(
                method == Method::GET,
                RedirectNotAllowedSnafu {
                    method: method.as_str(),
                    url:    url.as_str(),
                }
            );
            ensure!(
                redirects < self.max_redirects,
                TooManyRedirectsSnafu {
                    url: template.target().as_str(),
                    max: self.max_redirects,
                }
            );

            let next = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|location| url.join(location).ok())
                .context(RedirectSnafu {
                    url:    url.as_str(),
                    status: status.as_u16(),
                })?;

            if !self.keep_headers_on_redirect && !same_origin(&url, &next) {
                strip_credentials(&mut headers);
            }
            debug!(from = %url, to = %next, status = status.as_u16(), "following redirect");
            url = next;
            redirects += 1;
        }
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

fn strip_credentials(headers: &mut HeaderMap) {
    headers.remove(AUTHORIZATION);
    headers.remove(COOKIE);
    headers.remove(PROXY_AUTHORIZATION);
}
