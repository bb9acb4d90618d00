//! reqwest-backed HTTP client

use async_trait::async_trait;
use reqwest::redirect::Policy;
use tracing::debug;

use super::traits::{HttpClient, PreparedRequest, Response};
use crate::config::BrowserConfig;
use crate::Error;

/// HTTP client implementation on top of `reqwest`
///
/// Redirects and cookies are left to the browser, so the inner client is
/// built with redirects disabled and without a cookie store.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new client from browser configuration
    pub fn new(config: &BrowserConfig) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder()
            .redirect(Policy::none())
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout());

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::configuration(format!("Invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an already configured `reqwest` client
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: PreparedRequest) -> Result<Response, Error> {
        debug!("{} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers)
            .timeout(request.timeout);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let url = response.url().to_string();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(Response {
            url,
            method: request.method,
            status,
            headers,
            body,
        })
    }
}
