//! reqwest-backed [`Transport`]

use futures::future::BoxFuture;
use phasewire_core::error::TransportError;
use phasewire_core::http::{Method, RawResponse, RequestDescriptor, Transport};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Sends request descriptors with a shared `reqwest::Client`
///
/// Non-2xx responses are returned as responses; only failures to reach the
/// server or read the body become [`TransportError`]s.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Transport with a default client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::new(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Transport reusing an existing client
    #[must_use]
    pub const fn from_reqwest(client: reqwest::Client) -> Self {
        Self { client }
    }
}

const fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
    }
}

fn encode_body(body: &Value) -> Result<Vec<u8>, TransportError> {
    match body {
        // Already encoded by a request transform
        Value::String(text) => Ok(text.clone().into_bytes()),
        other => serde_json::to_vec(other)
            .map_err(|e| TransportError::new(format!("failed to encode body: {e}"))),
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: RequestDescriptor) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        let client = self.client.clone();

        Box::pin(async move {
            let mut builder = client.request(to_reqwest(request.method), request.full_url());
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = &request.body {
                builder = builder.body(encode_body(body)?);
            }

            let response = builder.send().await.map_err(|e| {
                let error = TransportError::new(e.to_string());
                match e.status() {
                    Some(status) => error.with_status(status.as_u16()),
                    None => error,
                }
            })?;

            let status = response.status().as_u16();
            let headers: BTreeMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
                })
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::new(e.to_string()).with_status(status))?;

            tracing::trace!(status, bytes = body.len(), "Response received");

            Ok(RawResponse {
                status,
                headers,
                body: body.to_vec(),
            })
        })
    }
}
