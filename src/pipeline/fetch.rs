//! Downloads documents referenced by links in HTML bodies.

use async_trait::async_trait;

use crate::error::DownloadError;

/// Fetches the bytes behind a URL.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}

/// Plain GET with the client's default redirect policy. Non-2xx is an error.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let request_err = |e: reqwest::Error| DownloadError::Request {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let resp = self.client.get(url).send().await.map_err(request_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(request_err)?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_is_a_request_error() {
        let fetcher = HttpFetcher::new();
        // Nothing listens on the discard port locally.
        let err = fetcher
            .fetch("http://127.0.0.1:9/invoice.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Request { ref url, .. } if url.ends_with("invoice.pdf")));
    }

    #[tokio::test]
    async fn malformed_url_is_a_request_error() {
        let err = HttpFetcher::new().fetch("not a url").await.unwrap_err();
        assert!(matches!(err, DownloadError::Request { .. }));
    }
}
