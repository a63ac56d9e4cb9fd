//! HTTP client implementation

use crate::errors::{HttpError, HttpResult};
use crate::types::{HttpRequest, HttpResponse};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
};
use std::str::FromStr;
use std::time::Instant;
use tracing::debug;
use volley_config::HttpConfig;

/// HTTP client trait for issuing step requests
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Send one request. An `Err` means no response was received (connection
    /// refused, timeout, protocol failure); any status code is an `Ok`.
    async fn send(&self, request: HttpRequest) -> HttpResult<HttpResponse>;
}

/// `reqwest`-backed client shared by every worker of a run
#[derive(Debug, Clone)]
pub struct HttpManager {
    client: Client,
    config: HttpConfig,
}

impl HttpManager {
    /// Build the underlying client once from configuration
    pub fn new(config: &HttpConfig) -> HttpResult<Self> {
        debug!(
            "Creating HttpManager with timeout: {}ms, {} idle connections per host",
            config.timeout.as_millis(),
            config.idle_per_host()
        );

        let redirect = match config.redirects {
            0 => reqwest::redirect::Policy::none(),
            hops => reqwest::redirect::Policy::limited(hops as usize),
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(config.idle_per_host())
            .pool_idle_timeout(config.pool.idle_timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .redirect(redirect)
            .build()
            .map_err(|e| HttpError::ConfigError(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn header_map(headers: &[(String, String)]) -> HttpResult<HeaderMap> {
        let mut header_map = HeaderMap::new();
        for (key, value) in headers {
            let header_name = HeaderName::from_str(key)
                .map_err(|_| HttpError::InvalidHeaderName(key.to_string()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| HttpError::InvalidHeaderValue(key.to_string()))?;
            header_map.append(header_name, header_value);
        }
        Ok(header_map)
    }
}

#[async_trait::async_trait]
impl HttpClient for HttpManager {
    async fn send(&self, request: HttpRequest) -> HttpResult<HttpResponse> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| HttpError::InvalidUrl(format!("{}: {}", request.url, e)))?;

        debug!("Building {} request to {}", request.method, url);
        let mut builder = self
            .client
            .request(reqwest::Method::from(request.method), url)
            .headers(Self::header_map(&request.headers)?);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let start = Instant::now();
        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;
        let elapsed = start.elapsed();

        debug!(
            "HTTP response received: {} in {}ms ({} bytes)",
            status,
            elapsed.as_millis(),
            body.len()
        );

        Ok(HttpResponse {
            status,
            headers,
            body,
            elapsed,
        })
    }
}
