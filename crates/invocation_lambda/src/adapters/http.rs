use std::time::Duration;

use async_trait::async_trait;
use invocation_core::{CollaboratorError, HttpFetcher, HttpMethod};
use reqwest::Method;

/// Outbound HTTP over a shared `reqwest` client; returns the response text.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

fn outbound_error(url: &str, method: HttpMethod, message: impl ToString) -> CollaboratorError {
    CollaboratorError::Outbound {
        url: url.to_string(),
        method: method.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn outbound_request(
        &self,
        url: &str,
        method: HttpMethod,
    ) -> Result<String, CollaboratorError> {
        let request_method = Method::from_bytes(method.as_str().as_bytes())
            .map_err(|error| outbound_error(url, method, error))?;

        let response = self
            .client
            .request(request_method, url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| outbound_error(url, method, error))?;

        response
            .text()
            .await
            .map_err(|error| outbound_error(url, method, error))
    }
}
