//! The protocol seam: executions hand fully-resolved requests to a [`ProtocolClient`].
//!
//! The core never talks to the network itself. It only bounds each call with the
//! request's timeout and drops the future when it expires, so clients must be
//! cancel-safe: dropping the future must abort the in-flight call.
use std::{future::Future, time::Duration};

use crate::{error::TransportError, step::Method};

#[cfg(feature = "builtins")]
mod http;
#[cfg(feature = "builtins")]
pub use http::HttpClient;

/// A request with every template resolved against the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First header named `name`, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Result of one request step after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Response),
    /// The status is outside the request's accepted set.
    Rejected(Response),
    TransportFailure(TransportError),
}

impl Outcome {
    pub fn status(&self) -> Option<u16> {
        match self {
            Outcome::Success(r) | Outcome::Rejected(r) => Some(r.status),
            Outcome::TransportFailure(_) => None,
        }
    }
}

pub trait ProtocolClient: Send + Sync {
    fn send(
        &self,
        request: PreparedRequest,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let r = Response::new(201).with_header("location", "/pessoas/1");
        assert_eq!(r.header("Location"), Some("/pessoas/1"));
        assert_eq!(r.header("LOCATION"), Some("/pessoas/1"));
        assert_eq!(r.header("Content-Type"), None);
    }
}
