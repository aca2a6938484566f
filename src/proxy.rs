// src/proxy.rs

use crate::{
    config::ServerConfig,
    core::key_state::KeyRecord,
    error::{AppError, Result},
    handlers::ResponseProcessor,
    upstream::{AttemptError, StreamError, UpstreamInvoker, UpstreamReply, UpstreamRequest},
};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use http::{header, HeaderValue};
use reqwest::{Client, ClientBuilder};
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::{debug, warn};

/// Sends one request to an OpenAI-compatible upstream with one key.
///
/// Holds the shared `reqwest::Client`, so connections to each base URL
/// are pooled across requests and keys.
#[derive(Clone)]
pub struct ReqwestInvoker {
    client: Client,
    processor: ResponseProcessor,
}

impl ReqwestInvoker {
    /// Builds the shared client. `pool_size` sizes the idle pool per host.
    pub fn new(server: &ServerConfig, pool_size: usize) -> Result<Self> {
        let configure_builder = |builder: ClientBuilder| -> ClientBuilder {
            builder
                .connect_timeout(Duration::from_secs(server.connect_timeout_secs))
                .pool_idle_timeout(Duration::from_secs(server.pool_idle_timeout_secs))
                .pool_max_idle_per_host(pool_size.max(10))
                .tcp_keepalive(Some(Duration::from_secs(60)))
        };

        let client = configure_builder(Client::builder())
            .build()
            .map_err(AppError::HttpClientBuild)?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            processor: ResponseProcessor::default(),
        }
    }

    fn target_url(request: &UpstreamRequest, key: &KeyRecord) -> String {
        format!("{}/{}", key.base_url(), request.endpoint.path())
    }
}

#[async_trait]
impl UpstreamInvoker for ReqwestInvoker {
    async fn invoke(
        &self,
        request: &UpstreamRequest,
        key: &KeyRecord,
    ) -> std::result::Result<UpstreamReply, AttemptError> {
        let url = Self::target_url(request, key);

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", key.secret().expose_secret()))
            .map_err(|e| {
                warn!(api_key.preview = %key.preview(), error = %e, "API key is not a valid header value");
                AttemptError::AuthFailure {
                    status: http::StatusCode::UNAUTHORIZED,
                    message: "API key contains characters not allowed in a header".to_string(),
                }
            })?;
        bearer.set_sensitive(true);

        let mut builder = self
            .client
            .request(request.endpoint.method(), &url)
            .header(header::AUTHORIZATION, bearer);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(%url, api_key.preview = %key.preview(), "Sending request to upstream");
        let response = builder.send().await.map_err(|e| {
            AttemptError::Transient(format!("request to upstream failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(|e| {
                AttemptError::Transient(format!("failed to read upstream error body: {e}"))
            })?;
            return Err(self.processor.classify(status, &headers, &body));
        }

        if request.stream {
            let chunks = response
                .bytes_stream()
                .map_err(|e| StreamError(e.to_string()));
            return Ok(UpstreamReply::Stream(Box::pin(chunks)));
        }

        let payload = response.json::<serde_json::Value>().await.map_err(|e| {
            AttemptError::Transient(format!("failed to decode upstream response: {e}"))
        })?;
        Ok(UpstreamReply::Payload(payload))
    }
}
