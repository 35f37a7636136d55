use std::time::Duration;

use libre_core::HttpTransport;
use log::debug;
use reqwest::{Client, Url};

/// Form-posting HTTP transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    async fn post_form(&self, endpoint: &str, fields: &[(&str, &str)]) -> Result<Vec<u8>, String> {
        let url = Url::parse(endpoint)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| format!("failed to create url from {}", endpoint))?;

        let response = self
            .client
            .post(url)
            .form(fields)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        debug!("Oracle answered with HTTP {}", response.status());

        let body = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_endpoint_fails_before_sending() {
        let transport = ReqwestTransport::new(Duration::from_secs(1)).unwrap();

        let result = transport.post_form("not a url", &[("token", "t")]).await;
        assert_eq!(result, Err("failed to create url from not a url".to_string()));

        let result = transport.post_form("ftp://oracle.example", &[("token", "t")]).await;
        assert_eq!(result, Err("failed to create url from ftp://oracle.example".to_string()));
    }
}
