use std::time::Duration;

use crate::{
    client::{PreparedRequest, ProtocolClient, Response},
    config::ProtocolConfig,
    error::{ConfigError, TransportError},
    step::Method,
};

/// [`ProtocolClient`] backed by a pooled `reqwest::Client`.
///
/// Build it once and share it (it is cheap to clone); the connection pool is the only
/// state shared between executions.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(config: &ProtocolConfig) -> Result<Self, ConfigError> {
        let inner = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ConfigError::Invalid(format!("cannot build http client: {e}")))?;
        Ok(Self {
            inner,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Absolute URLs pass through; anything else is joined onto the base URL.
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_owned()
        } else if url.starts_with('/') {
            format!("{}{url}", self.base_url)
        } else {
            format!("{}/{url}", self.base_url)
        }
    }
}

fn method(m: Method) -> reqwest::Method {
    match m {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else if e.is_connect() {
        TransportError::Connection(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

impl ProtocolClient for HttpClient {
    async fn send(&self, request: PreparedRequest) -> Result<Response, TransportError> {
        let mut builder = self
            .inner
            .request(method(request.method), self.resolve(&request.url))
            .timeout(request.timeout);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(e, request.timeout))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_owned(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, request.timeout))?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
