use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

use super::auth::{http_date, RequestSigner};
use super::common::{ApiQueryParams, ApiResponse, OciErrorBody, ResponseHeaders};
use super::error::ApiError;

/// OCI services this client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Core,
    Identity,
    LoadBalancer,
}

impl Service {
    fn host(&self, region: &str) -> String {
        match self {
            Service::Core | Service::LoadBalancer => {
                format!("https://iaas.{}.oraclecloud.com", region)
            }
            Service::Identity => format!("https://identity.{}.oci.oraclecloud.com", region),
        }
    }

    fn api_version(&self) -> &'static str {
        match self {
            Service::Core | Service::Identity => "20160918",
            Service::LoadBalancer => "20170115",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound on the total time spent retrying one call
    pub retry_duration: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 8,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            retry_duration: Duration::from_secs(600),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub region: String,
    /// Replaces the scheme and host of every service endpoint
    pub endpoint_override: Option<String>,
    pub retry: RetryConfig,
}

impl ClientConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            endpoint_override: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Signed REST client shared by every resource
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    signer: RequestSigner,
    config: ClientConfig,
}

struct RawResponse {
    status: u16,
    headers: ResponseHeaders,
    body: Vec<u8>,
}

impl RawResponse {
    fn error_body(&self) -> Option<OciErrorBody> {
        serde_json::from_slice(&self.body).ok()
    }

    fn is_retryable(&self) -> bool {
        match self.status {
            429 | 500 | 502 | 503 | 504 => true,
            409 => self
                .error_body()
                .map(|body| body.code == "IncorrectState")
                .unwrap_or(false),
            _ => false,
        }
    }

    fn into_result(self) -> Result<RawResponse, ApiError> {
        if (200..300).contains(&self.status) {
            return Ok(self);
        }
        let (code, message) = match self.error_body() {
            Some(body) => (body.code, body.message),
            None => (
                "Unknown".to_string(),
                String::from_utf8_lossy(&self.body).into_owned(),
            ),
        };
        Err(ApiError::Service {
            status: self.status,
            code,
            message,
            request_id: self.headers.request_id.unwrap_or_default(),
        })
    }

    fn parse<T: DeserializeOwned>(self) -> Result<ApiResponse<T>, ApiError> {
        let body: &[u8] = if self.body.is_empty() {
            b"null"
        } else {
            &self.body
        };
        let data = serde_json::from_slice(body).map_err(|e| {
            ApiError::Parse(format!(
                "{} (body: {})",
                e,
                String::from_utf8_lossy(&self.body)
            ))
        })?;
        Ok(ApiResponse {
            data,
            headers: self.headers,
        })
    }
}

impl Client {
    pub fn new(signer: RequestSigner, config: ClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.retry.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .user_agent(concat!("terraform-provider-oci/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                signer,
                config,
            }),
        })
    }

    pub fn region(&self) -> &str {
        &self.inner.config.region
    }

    /// Base URL of a service, including its API version
    pub fn endpoint(&self, service: Service) -> String {
        let host = match &self.inner.config.endpoint_override {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => service.host(&self.inner.config.region),
        };
        format!("{}/{}", host, service.api_version())
    }

    fn url(&self, service: Service, path: &str, query: &ApiQueryParams) -> Result<Url, ApiError> {
        let raw = format!("{}{}", self.endpoint(service), path);
        let mut url = Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", raw, e)))?;
        query.apply(&mut url);
        Ok(url)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        service: Service,
        path: &str,
        query: &ApiQueryParams,
    ) -> Result<ApiResponse<T>, ApiError> {
        let url = self.url(service, path, query)?;
        self.execute(Method::GET, url, None).await?.parse()
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        service: Service,
        path: &str,
        query: &ApiQueryParams,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        let url = self.url(service, path, query)?;
        let body = serde_json::to_vec(body).map_err(|e| ApiError::Parse(e.to_string()))?;
        self.execute(Method::POST, url, Some(body)).await?.parse()
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        service: Service,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        let url = self.url(service, path, &ApiQueryParams::new())?;
        let body = serde_json::to_vec(body).map_err(|e| ApiError::Parse(e.to_string()))?;
        self.execute(Method::PUT, url, Some(body)).await?.parse()
    }

    pub async fn delete(
        &self,
        service: Service,
        path: &str,
        query: &ApiQueryParams,
    ) -> Result<ResponseHeaders, ApiError> {
        let url = self.url(service, path, query)?;
        Ok(self.execute(Method::DELETE, url, None).await?.headers)
    }

    /// Follow `opc-next-page` until every page of a list call was fetched.
    pub async fn list_all<T: DeserializeOwned>(
        &self,
        service: Service,
        path: &str,
        query: &ApiQueryParams,
    ) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut page: Option<String> = None;
        loop {
            let params = query.clone().add_optional("page", page.take());
            let response: ApiResponse<Vec<T>> = self.get(service, path, &params).await?;
            items.extend(response.data);
            match response.headers.next_page {
                Some(next) => {
                    debug!(path, page = %next, "fetching next page");
                    page = Some(next);
                }
                None => return Ok(items),
            }
        }
    }

    pub fn core(&self) -> super::core::CoreApi<'_> {
        super::core::CoreApi::new(self)
    }

    pub fn identity(&self) -> super::identity::IdentityApi<'_> {
        super::identity::IdentityApi::new(self)
    }

    pub fn load_balancer(&self) -> super::load_balancer::LoadBalancerApi<'_> {
        super::load_balancer::LoadBalancerApi::new(self)
    }

    /// Send a request, retrying throttling, transient server errors and
    /// `IncorrectState` conflicts. Every attempt is signed again.
    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<RawResponse, ApiError> {
        let retry = &self.inner.config.retry;
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = self.send_once(&method, &url, body.as_deref()).await;

            let retryable = match &outcome {
                Ok(raw) => raw.is_retryable(),
                Err(ApiError::Request(e)) => e.is_connect() || e.is_timeout(),
                Err(_) => false,
            };
            if !retryable {
                return outcome?.into_result();
            }

            let backoff = retry.backoff(attempt);
            if !retry.enabled
                || attempt >= retry.max_attempts
                || started.elapsed() + backoff > retry.retry_duration
            {
                return outcome?.into_result();
            }

            match &outcome {
                Ok(raw) => warn!(
                    %method, %url, status = raw.status, attempt, ?backoff,
                    "retrying OCI request"
                ),
                Err(e) => warn!(%method, %url, error = %e, attempt, ?backoff, "retrying OCI request"),
            }
            tokio::time::sleep(backoff).await;
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&[u8]>,
    ) -> Result<RawResponse, ApiError> {
        let signed = self.inner.signer.sign(method, url, body, &http_date())?;

        let mut request = self
            .inner
            .http
            .request(method.clone(), url.clone())
            .header("date", &signed.date)
            .header(AUTHORIZATION, &signed.authorization)
            .header(ACCEPT, "application/json");
        if let Some(body_headers) = &signed.body {
            request = request
                .header("x-content-sha256", &body_headers.content_sha256)
                .header(CONTENT_TYPE, body_headers.content_type)
                .header(CONTENT_LENGTH, body_headers.content_length)
                .body(body.unwrap_or_default().to_vec());
        }

        debug!(%method, %url, "OCI request");
        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = ResponseHeaders::from_headers(response.headers());
        let body = response.bytes().await?.to_vec();
        debug!(status, request_id = ?headers.request_id, "OCI response");

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
