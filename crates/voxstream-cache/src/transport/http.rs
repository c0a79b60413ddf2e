use async_trait::async_trait;
use bytes::Bytes;
use voxstream_core::config::TransportConfig;
use voxstream_core::{StreamError, StreamResult};

use super::Transport;

/// HTTP transport backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport using the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::InvalidConfig` if the HTTP client cannot be built.
    pub fn new(config: &TransportConfig) -> StreamResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| StreamError::invalid_config(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> StreamResult<Bytes> {
        tracing::trace!(url, "HTTP fetch");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StreamError::transport(url, e.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|e| StreamError::transport(url, e.to_string()))?;

        response
            .bytes()
            .await
            .map_err(|e| StreamError::transport(url, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_default_config() {
        assert!(HttpTransport::new(&TransportConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_failure() {
        let transport = HttpTransport::new(&TransportConfig {
            request_timeout_secs: 1,
        })
        .unwrap();

        // Port 9 (discard) on localhost is not expected to serve HTTP
        let err = transport
            .fetch("http://127.0.0.1:9/data?from_idx=0;to_idx=1")
            .await
            .unwrap_err();
        assert!(err.is_transport_failure());
    }
}
