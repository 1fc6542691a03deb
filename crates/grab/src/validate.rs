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

use reqwest::{
    Response, StatusCode,
    header::{CONTENT_RANGE, CONTENT_TYPE, HeaderMap},
};
use serde::Deserialize;
use snafu::{OptionExt, Snafu};

use crate::error::{GrabError, Result, UnknownLengthSnafu};

/// Error response returned by an S3-style object store.
///
/// See <https://docs.aws.amazon.com/AmazonS3/latest/API/ErrorResponses.html>.
/// When the body is absent or not XML, `code` holds the status line.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("[{code}]: {message}"))]
pub struct RespError {
    pub code:        String,
    pub message:     String,
    pub resource:    String,
    pub request_id:  String,
    pub status_code: u16,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ErrorBody {
    code:       Option<String>,
    message:    Option<String>,
    resource:   Option<String>,
    request_id: Option<String>,
}

impl RespError {
    fn from_status(status: StatusCode) -> Self {
        let code = status.canonical_reason().map_or_else(
            || status.as_u16().to_string(),
            |reason| format!("{} {reason}", status.as_u16()),
        );
        Self {
            code,
            message: String::new(),
            resource: String::new(),
            request_id: String::new(),
            status_code: status.as_u16(),
        }
    }

    /// Builds the error from a status and an optional XML body. Fields
    /// missing from the body keep their status-derived defaults.
    #[must_use]
    pub fn parse(status: StatusCode, xml: Option<&str>) -> Self {
        let mut err = Self::from_status(status);
        let Some(body) = xml.and_then(|text| quick_xml::de::from_str::<ErrorBody>(text).ok())
        else {
            return err;
        };
        if let Some(code) = body.code {
            err.code = code;
        }
        if let Some(message) = body.message {
            err.message = message;
        }
        if let Some(resource) = body.resource {
            err.resource = resource;
        }
        if let Some(request_id) = body.request_id {
            err.request_id = request_id;
        }
        err
    }

    /// Consumes a failed response, reading its body only when it is XML.
    pub async fn from_response(response: Response) -> Self {
        let status = response.status();
        if !is_xml(response.headers()) {
            return Self::from_status(status);
        }
        let body = response.text().await.ok();
        Self::parse(status, body.as_deref())
    }
}

fn is_xml(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| {
            let mime = mime.trim();
            mime.eq_ignore_ascii_case("application/xml") || mime.eq_ignore_ascii_case("text/xml")
        })
}

/// A response that passed validation: success status and a declared length.
#[derive(Debug)]
pub struct ValidResponse {
    pub response: Response,
    /// Declared length of this response's body.
    pub length:   u64,
}

impl ValidResponse {
    #[must_use]
    pub fn content_range(&self) -> Option<ContentRange> {
        self.response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(ContentRange::parse)
    }
}

/// Classifies a completed response as usable or as a structured failure.
pub async fn validate(response: Response) -> Result<ValidResponse> {
    if response.status().as_u16() >= 300 {
        let source = RespError::from_response(response).await;
        return Err(GrabError::Response { source });
    }
    let length = response.content_length().context(UnknownLengthSnafu {
        url: response.url().to_string(),
    })?;
    Ok(ValidResponse { response, length })
}

/// Returns `true` for the statuses the executor follows as redirects.
#[must_use]
pub const fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Parsed `Content-Range: bytes <start>-<end>/<total>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end:   u64,
    /// `None` when the server sent `*`.
    pub total: Option<u64>,
}

impl ContentRange {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (range, total) = rest.split_once('/')?;
        let (start, end) = range.split_once('-')?;
        let start: u64 = start.trim().parse().ok()?;
        let end: u64 = end.trim().parse().ok()?;
        if end < start {
            return None;
        }
        let total = match total.trim() {
            "*" => None,
            total => Some(total.parse().ok()?),
        };
        Some(Self { start, end, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_SUCH_KEY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
  <Code>NoSuchKey</Code>
  <Message>The resource you requested does not exist</Message>
  <Resource>/mybucket/myfoto.jpg</Resource>
  <RequestId>4442587FB7D0A2F9</RequestId>
</Error>"#;

    #[test]
    fn parses_provider_error_body() {
        let err = RespError::parse(StatusCode::NOT_FOUND, Some(NO_SUCH_KEY));
        assert_eq!(err.code, "NoSuchKey");
        assert_eq!(err.message, "The resource you requested does not exist");
        assert_eq!(err.resource, "/mybucket/myfoto.jpg");
        assert_eq!(err.request_id, "4442587FB7D0A2F9");
        assert_eq!(err.status_code, 404);
        assert_eq!(
            err.to_string(),
            "[NoSuchKey]: The resource you requested does not exist"
        );
    }

    #[test]
    fn falls_back_to_status_line() {
        let err = RespError::parse(StatusCode::SERVICE_UNAVAILABLE, None);
        assert_eq!(err.code, "503 Service Unavailable");
        assert!(err.message.is_empty());

        let garbage = RespError::parse(StatusCode::FORBIDDEN, Some("not xml at all <"));
        assert_eq!(garbage.code, "403 Forbidden");
    }

    #[test]
    fn partial_body_keeps_status_code() {
        let err = RespError::parse(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some("<Error><Message>slow down</Message></Error>"),
        );
        assert_eq!(err.code, "500 Internal Server Error");
        assert_eq!(err.message, "slow down");
    }

    #[test]
    fn xml_content_type_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_xml(&headers));
        headers.insert(CONTENT_TYPE, "application/xml; charset=utf-8".parse().unwrap());
        assert!(is_xml(&headers));
        headers.insert(CONTENT_TYPE, "text/xml".parse().unwrap());
        assert!(is_xml(&headers));
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        assert!(!is_xml(&headers));
    }

    #[test]
    fn content_range_forms() {
        assert_eq!(
            ContentRange::parse("bytes 21010-47021/47022"),
            Some(ContentRange {
                start: 21010,
                end:   47021,
                total: Some(47022),
            })
        );
        assert_eq!(
            ContentRange::parse("bytes 0-9/*"),
            Some(ContentRange {
                start: 0,
                end:   9,
                total: None,
            })
        );
        assert_eq!(ContentRange::parse("bytes */47022"), None);
        assert_eq!(ContentRange::parse("bytes 10-5/100"), None);
        assert_eq!(ContentRange::parse("items 0-9/10"), None);
    }

    #[test]
    fn redirect_statuses() {
        for code in [301, 302, 303, 307, 308] {
            assert!(is_redirect(StatusCode::from_u16(code).unwrap()));
        }
        for code in [200, 206, 300, 304, 404, 500] {
            assert!(!is_redirect(StatusCode::from_u16(code).unwrap()));
        }
    }
}
