//! Pull client for the current gas price recommendation.
//!
//! Used on startup to populate the shared snapshot before the first pushed
//! update arrives, and whenever a one-off reading is needed.

use crate::{FeedConfig, FeedError};
use gasbot_core::{GasPrice, LatestGasPrice};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client for the gasz query endpoint.
#[derive(Debug, Clone)]
pub struct GaszRestClient {
    http: reqwest::Client,
    url: Url,
}

impl GaszRestClient {
    /// Build a client bounded by the configured dial and request timeouts.
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let url = Url::parse(&config.query_url)?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.request_connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            url,
        })
    }

    /// Query the current recommendation.
    ///
    /// Non-2xx answers and bodies that don't decode to a valid [`GasPrice`]
    /// are errors.
    pub async fn latest(&self) -> Result<GasPrice, FeedError> {
        let response = self.http.get(self.url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::HttpStatus(status.as_u16()));
        }

        let price: GasPrice = response.json().await?;
        if !price.is_valid() {
            return Err(FeedError::ParseError(format!(
                "gas price out of range: {}",
                price
            )));
        }

        debug!(%price, "Fetched gas price");
        Ok(price)
    }

    /// Fetch the current recommendation and publish it to `latest`.
    pub async fn seed(&self, latest: &LatestGasPrice) -> Result<GasPrice, FeedError> {
        let price = self.latest().await?;
        latest.store(price);
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return the URL to hit.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut read = 0;
            loop {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                read += n;
                if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}/v1/latest", addr)
    }

    fn client_for(url: String) -> GaszRestClient {
        let config = FeedConfig::new(url, "ws://unused");
        GaszRestClient::new(&config).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_query_url() {
        let config = FeedConfig::new("not a url", "ws://unused");
        let err = GaszRestClient::new(&config).unwrap_err();
        assert!(matches!(err, FeedError::InvalidUrl(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_latest_parses_body() {
        let url = serve_once(
            "200 OK",
            r#"{"fast":100.0,"fastest":120.0,"safeLow":50.0,"average":80.0}"#,
        )
        .await;

        let price = client_for(url).latest().await.unwrap();
        assert_eq!(price, GasPrice::new(120.0, 100.0, 80.0, 50.0));
    }

    #[tokio::test]
    async fn test_latest_rejects_non_success_status() {
        let url = serve_once("503 Service Unavailable", "{}").await;

        let err = client_for(url).latest().await.unwrap_err();
        assert!(matches!(err, FeedError::HttpStatus(503)));
    }

    #[tokio::test]
    async fn test_latest_rejects_malformed_body() {
        let url = serve_once("200 OK", r#"{"fast":"soon"}"#).await;

        let err = client_for(url).latest().await.unwrap_err();
        assert!(matches!(err, FeedError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_latest_rejects_negative_price() {
        let url = serve_once(
            "200 OK",
            r#"{"fast":-1.0,"fastest":120.0,"safeLow":50.0,"average":80.0}"#,
        )
        .await;

        let err = client_for(url).latest().await.unwrap_err();
        assert!(matches!(err, FeedError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_seed_publishes_snapshot() {
        let url = serve_once(
            "200 OK",
            r#"{"fast":10.0,"fastest":12.0,"safeLow":5.0,"average":8.0}"#,
        )
        .await;

        let latest = LatestGasPrice::new();
        client_for(url).seed(&latest).await.unwrap();
        assert_eq!(*latest.load().unwrap(), GasPrice::new(12.0, 10.0, 8.0, 5.0));
    }
}
