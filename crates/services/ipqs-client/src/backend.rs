//! The network side of a lookup: one request, one status code.

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE, USER_AGENT};
use thiserror::Error;

/// A round trip that failed before a status code was received.
#[derive(Error, Debug)]
#[error("reputation backend unreachable: {0}")]
pub struct TransportError(#[source] pub Box<dyn std::error::Error + Send + Sync>);

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self(Box::new(e))
    }
}

/// Performs a single round trip against a reputation service.
///
/// Implementations return the raw status code; classification is done by the
/// caller.
#[async_trait]
pub trait ReputationBackend: Send + Sync {
    async fn round_trip(&self, key: &str, user_agent: &str) -> Result<u16, TransportError>;
}

/// HTTP implementation: `GET {endpoint}{key}`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The key is appended verbatim, without escaping.
    pub fn request_url(&self, key: &str) -> String {
        format!("{}{}", self.endpoint, key)
    }
}

#[async_trait]
impl ReputationBackend for HttpBackend {
    async fn round_trip(&self, key: &str, user_agent: &str) -> Result<u16, TransportError> {
        let url = self.request_url(key);
        tracing::debug!("Querying reputation for {} at URL: {}", key, url);

        let resp = self
            .client
            .get(&url)
            .header(USER_AGENT, user_agent)
            .header(CACHE_CONTROL, "must-revalidate")
            .header(CONTENT_TYPE, "application/json")
            .header(CONNECTION, "close")
            .send()
            .await?;

        Ok(resp.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_appended_verbatim() {
        let backend = HttpBackend::new(reqwest::Client::new(), "https://internetdb.shodan.io/");
        assert_eq!(
            backend.request_url("Host.Example"),
            "https://internetdb.shodan.io/Host.Example"
        );
        assert_eq!(backend.endpoint(), "https://internetdb.shodan.io/");
    }
}
