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

use std::{collections::BTreeMap, time::Duration};

use bon::Builder;
use jiff::SignedDuration;
use reqwest::{
    Client, Proxy,
    header::{HeaderMap, HeaderName, HeaderValue},
    redirect,
};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{OptionExt, ResultExt};

use crate::{
    backoff::BackoffPolicy,
    error::{
        BuildClientSnafu, InvalidDurationSnafu, InvalidHeaderNameSnafu, InvalidHeaderValueSnafu,
        InvalidProxySnafu, Result,
    },
};

/// Total tries allowed for a request and for a single read call.
pub const DEFAULT_ATTEMPTS: usize = 5;

/// Default cap on the redirect chain of a single request.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// HTTP client settings.
#[derive(Debug, Clone, SmartDefault, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Idle timeout between two reads of the socket (default: 10s)
    #[default(SignedDuration::from_secs(10))]
    #[builder(default = SignedDuration::from_secs(10))]
    pub read_timeout: SignedDuration,

    /// Timeout for establishing a connection (default: 10s)
    #[default(SignedDuration::from_secs(10))]
    #[builder(default = SignedDuration::from_secs(10))]
    pub connect_timeout: SignedDuration,

    /// Deadline for a whole request including its body. Unset by default so
    /// long transfers are bounded only by `read_timeout`.
    pub timeout: Option<SignedDuration>,

    /// Custom User-Agent header
    pub user_agent: Option<String>,

    /// Proxy URL applied to every scheme
    pub proxy: Option<String>,

    #[default = true]
    #[builder(default = true)]
    pub follow_redirects: bool,

    #[default(DEFAULT_MAX_REDIRECTS)]
    #[builder(default = DEFAULT_MAX_REDIRECTS)]
    pub max_redirects: usize,

    /// Forward credentials when a redirect leaves the original host.
    #[default = true]
    #[builder(default = true)]
    pub keep_headers_on_redirect: bool,
}

pub(crate) fn std_duration(field: &'static str, value: SignedDuration) -> Result<Duration> {
    Duration::try_from(value)
        .ok()
        .context(InvalidDurationSnafu { field, value })
}

impl ClientConfig {
    /// Builds the underlying client. Redirects are always disabled here and
    /// handled by the executor.
    pub fn build_client(&self) -> Result<Client> {
        let mut builder = Client::builder()
            .read_timeout(std_duration("read_timeout", self.read_timeout)?)
            .connect_timeout(std_duration("connect_timeout", self.connect_timeout)?)
            .redirect(redirect::Policy::none());

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(std_duration("timeout", timeout)?);
        }
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }
        if let Some(proxy) = &self.proxy {
            let proxy = Proxy::all(proxy.as_str()).context(InvalidProxySnafu {
                proxy: proxy.clone(),
            })?;
            builder = builder.proxy(proxy);
        }

        builder.build().context(BuildClientSnafu)
    }
}

/// Settings for opening a [`Body`](crate::Body).
#[derive(Debug, Clone, SmartDefault, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabConfig {
    /// Total tries per request, and reconnects per read call (default: 5).
    /// Zero falls back to the default.
    #[default(DEFAULT_ATTEMPTS)]
    #[builder(default = DEFAULT_ATTEMPTS)]
    pub attempts: usize,

    /// Base delay of the exponential backoff (default: 600ms)
    #[default(SignedDuration::from_millis(600))]
    #[builder(default = SignedDuration::from_millis(600))]
    pub backoff_base: SignedDuration,

    /// Cap for a single backoff sleep (default: 60s)
    #[default(SignedDuration::from_secs(60))]
    #[builder(default = SignedDuration::from_secs(60))]
    pub backoff_max: SignedDuration,

    /// Extra headers sent with every request, including resumed ones.
    #[builder(default)]
    pub headers: BTreeMap<String, String>,

    #[builder(default)]
    pub client: ClientConfig,
}

impl GrabConfig {
    #[must_use]
    pub const fn effective_attempts(&self) -> usize {
        if self.attempts == 0 {
            DEFAULT_ATTEMPTS
        } else {
            self.attempts
        }
    }

    pub fn backoff(&self) -> Result<BackoffPolicy> {
        Ok(BackoffPolicy::new(
            std_duration("backoff_base", self.backoff_base)?,
            std_duration("backoff_max", self.backoff_max)?,
        ))
    }

    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let key = HeaderName::from_bytes(name.as_bytes())
                .context(InvalidHeaderNameSnafu { name: name.clone() })?;
            let value =
                HeaderValue::from_str(value).context(InvalidHeaderValueSnafu { name: name.clone() })?;
            map.append(key, value);
        }
        Ok(map)
    }
}
