//! Common types shared by the OCI service APIs

use reqwest::header::HeaderMap;
use serde::Deserialize;
use url::Url;

/// Response body plus the OCI headers callers care about.
#[derive(Debug)]
pub struct ApiResponse<T> {
    pub data: T,
    pub headers: ResponseHeaders,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseHeaders {
    pub request_id: Option<String>,
    pub work_request_id: Option<String>,
    pub next_page: Option<String>,
    pub etag: Option<String>,
}

impl ResponseHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            request_id: get("opc-request-id"),
            work_request_id: get("opc-work-request-id"),
            next_page: get("opc-next-page"),
            etag: get("etag"),
        }
    }
}

/// Error body returned by every OCI service.
#[derive(Debug, Deserialize)]
pub struct OciErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ApiQueryParams {
    params: Vec<(String, String)>,
}

impl ApiQueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn add_optional<K: Into<String>, V: ToString>(mut self, key: K, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.params.push((key.into(), v.to_string()));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Append the parameters to `url`, percent-encoding values.
    pub fn apply(&self, url: &mut Url) {
        if self.params.is_empty() {
            return;
        }
        let mut pairs = url.query_pairs_mut();
        for (k, v) in &self.params {
            pairs.append_pair(k, v);
        }
    }
}
