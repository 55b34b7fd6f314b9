use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::Url;

use crate::{FailureKind, FetchError};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            redirect_limit: 5,
            max_bytes: 50 * 1024 * 1024,
        }
    }
}

/// API key sent as HTTP Basic credentials (`<key>:X`) to one host only.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    /// `host` or `host:port` of the helpdesk API.
    pub host: String,
}

/// Authenticated HTTP GET capability used by every remote call.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` with `query` and parse the body as JSON.
    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError>;

    /// GET `url` and return the raw body.
    async fn download(&self, url: &str) -> Result<Bytes, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    settings: FetchSettings,
    credentials: Option<ApiCredentials>,
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(
        settings: FetchSettings,
        credentials: Option<ApiCredentials>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .user_agent(concat!("kbsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            credentials,
            client,
        })
    }

    fn request(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::RequestBuilder, FetchError> {
        let mut parsed =
            Url::parse(url).map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if !query.is_empty() {
            let mut pairs = parsed.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        let mut request = self.client.get(parsed.clone());
        if let Some(creds) = self.credentials.as_ref() {
            if host_key(&parsed).as_deref() == Some(creds.host.as_str()) {
                request = request.basic_auth(&creds.api_key, Some("X"));
            }
        }
        Ok(request)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Bytes, FetchError> {
        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let max_bytes = self.settings.max_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let mut body = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = body.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(FetchError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let request = self
            .request(url, query)?
            .header(reqwest::header::ACCEPT, "application/json");
        let body = self.send(request).await?;
        serde_json::from_slice(&body)
            .map_err(|err| FetchError::new(FailureKind::InvalidBody, err.to_string()))
    }

    async fn download(&self, url: &str) -> Result<Bytes, FetchError> {
        let body = self.send(self.request(url, &[])?).await?;
        if body.is_empty() {
            return Err(FetchError::new(FailureKind::EmptyBody, url));
        }
        Ok(body)
    }
}

fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FailureKind::Network, err.to_string())
}
