//! HTTP client
//!
//! [`HttpClient`] turns configuration into a [`RequestDescriptor`], runs the
//! request transforms, hands the descriptor to a [`Transport`] and turns the
//! [`RawResponse`] into a transformed [`ResponseEnvelope`].
//!
//! Failures never escape as panics or raw transport errors: transport
//! failures and non-2xx statuses both come back as an [`ApiError`], so a
//! resolution function can use `?` and let the dispatcher pick the phase.

use crate::config::{Config, ResolvedConfig, resolve};
use crate::error::{ApiError, ConfigError, TransportError};
use crate::transform::{apply_request_transforms, apply_response_transforms};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// HTTP verbs supported by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// HEAD
    Head,
}

impl Method {
    /// Upper-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the transport needs to perform one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// URL without the query string
    pub url: String,
    /// HTTP verb
    pub method: Method,
    /// Header names are lower-cased
    pub headers: BTreeMap<String, String>,
    /// JSON body, if any
    pub body: Option<Value>,
    /// Query parameters
    pub query: BTreeMap<String, String>,
}

impl RequestDescriptor {
    /// Build a descriptor from resolved configuration
    ///
    /// `url` wins outright. Otherwise the URL is
    /// `base_url + path + append_path`, followed by `.append_ext`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingBaseUrl`] when neither `url` nor
    /// `base_url` is set.
    pub fn from_resolved<S>(method: Method, config: &ResolvedConfig<S>) -> Result<Self, ConfigError> {
        let url = if let Some(url) = &config.url {
            url.clone()
        } else {
            let base = config.base_url.as_deref().ok_or(ConfigError::MissingBaseUrl)?;
            let mut url = String::from(base);
            if let Some(path) = &config.path {
                url.push_str(path);
            }
            if let Some(segment) = &config.append_path {
                url.push_str(segment);
            }
            if let Some(ext) = &config.append_ext {
                url.push('.');
                url.push_str(ext);
            }
            url
        };

        Ok(Self {
            url,
            method,
            headers: config.headers.clone(),
            body: config.body.clone(),
            query: config.params.clone(),
        })
    }

    /// URL including the form-encoded query string
    #[must_use]
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }

        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.query)
            .finish();
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.url)
    }
}

/// Response as produced by the transport, before any transform
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lower-cased
    pub headers: BTreeMap<String, String>,
    /// Raw body bytes
    pub body: Vec<u8>,
}

/// Response after the response transforms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// `true` for 2xx statuses
    pub ok: bool,
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: BTreeMap<String, String>,
    /// Body; text or raw bytes until a transform such as `parse_json` rewrites it
    pub body: Value,
}

/// Empty bodies become `null` and UTF-8 bodies become a string. Any other
/// body is kept byte for byte as an array of numbers.
impl From<RawResponse> for ResponseEnvelope {
    fn from(raw: RawResponse) -> Self {
        let body = if raw.body.is_empty() {
            Value::Null
        } else {
            match String::from_utf8(raw.body) {
                Ok(text) => Value::String(text),
                Err(e) => Value::Array(e.into_bytes().into_iter().map(Value::from).collect()),
            }
        };

        Self {
            ok: (200..300).contains(&raw.status),
            status: raw.status,
            headers: raw.headers,
            body,
        }
    }
}

/// The only point of contact with the network
///
/// Production code uses a reqwest-backed implementation; tests substitute a
/// scripted double.
pub trait Transport: Send + Sync {
    /// Perform the request
    fn send(&self, request: RequestDescriptor) -> BoxFuture<'static, Result<RawResponse, TransportError>>;
}

/// HTTP client bound to a baseline configuration and a state snapshot
///
/// Verbs accept anything convertible into [`Config`]; a bare string is a
/// path. Each call resolves the baseline merged with its options against the
/// snapshot, exactly once.
pub struct HttpClient<S> {
    config: Arc<Config<S>>,
    transport: Arc<dyn Transport>,
    snapshot: Arc<S>,
}

impl<S> Clone for HttpClient<S> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
            snapshot: Arc::clone(&self.snapshot),
        }
    }
}

impl<S> fmt::Debug for HttpClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> HttpClient<S>
where
    S: Send + Sync + 'static,
{
    /// Create a client
    #[must_use]
    pub fn new(config: Config<S>, transport: Arc<dyn Transport>, snapshot: Arc<S>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            snapshot,
        }
    }

    /// Same client, resolving against another snapshot
    #[must_use]
    pub fn with_snapshot(&self, snapshot: Arc<S>) -> Self {
        Self {
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
            snapshot,
        }
    }

    /// Same transport and snapshot, with different defaults
    #[must_use]
    pub fn with_defaults(&self, config: Config<S>) -> Self {
        Self {
            config: Arc::new(config),
            transport: Arc::clone(&self.transport),
            snapshot: Arc::clone(&self.snapshot),
        }
    }

    /// Baseline configuration
    #[must_use]
    pub fn config(&self) -> &Config<S> {
        &self.config
    }

    /// State snapshot the client resolves against
    #[must_use]
    pub fn snapshot(&self) -> &S {
        &self.snapshot
    }

    /// Transport used for requests
    #[must_use]
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// GET request
    ///
    /// # Errors
    ///
    /// See [`HttpClient::request`].
    pub async fn get(&self, options: impl Into<Config<S>>) -> Result<ResponseEnvelope, ApiError> {
        self.request(Method::Get, options.into()).await
    }

    /// POST request
    ///
    /// # Errors
    ///
    /// See [`HttpClient::request`].
    pub async fn post(&self, options: impl Into<Config<S>>) -> Result<ResponseEnvelope, ApiError> {
        self.request(Method::Post, options.into()).await
    }

    /// PUT request
    ///
    /// # Errors
    ///
    /// See [`HttpClient::request`].
    pub async fn put(&self, options: impl Into<Config<S>>) -> Result<ResponseEnvelope, ApiError> {
        self.request(Method::Put, options.into()).await
    }

    /// PATCH request
    ///
    /// # Errors
    ///
    /// See [`HttpClient::request`].
    pub async fn patch(&self, options: impl Into<Config<S>>) -> Result<ResponseEnvelope, ApiError> {
        self.request(Method::Patch, options.into()).await
    }

    /// DELETE request
    ///
    /// # Errors
    ///
    /// See [`HttpClient::request`].
    pub async fn delete(&self, options: impl Into<Config<S>>) -> Result<ResponseEnvelope, ApiError> {
        self.request(Method::Delete, options.into()).await
    }

    /// HEAD request
    ///
    /// # Errors
    ///
    /// See [`HttpClient::request`].
    pub async fn head(&self, options: impl Into<Config<S>>) -> Result<ResponseEnvelope, ApiError> {
        self.request(Method::Head, options.into()).await
    }

    /// Perform a request with the given verb
    ///
    /// 1. Resolve the baseline merged with `options` against the snapshot
    /// 2. Build the descriptor and run the request transforms
    /// 3. Send it through the transport
    /// 4. Run the response transforms over the envelope
    ///
    /// # Errors
    ///
    /// - [`ApiError::Config`] if resolution fails or no base URL is known
    /// - [`ApiError::Transform`] if any transform fails
    /// - [`ApiError::Transport`] if the transport fails
    /// - [`ApiError::Status`] for non-2xx responses, with the transformed body
    #[tracing::instrument(skip(self, method, options), fields(method = %method), name = "http_request")]
    pub async fn request(&self, method: Method, options: Config<S>) -> Result<ResponseEnvelope, ApiError> {
        let resolved = resolve(&self.config, &options, &self.snapshot)?;
        let descriptor = RequestDescriptor::from_resolved(method, &resolved)?;
        let descriptor =
            apply_request_transforms(&resolved.request_transforms, &self.snapshot, descriptor)?;

        tracing::debug!(url = %descriptor.full_url(), "Sending request");
        metrics::counter!("http.requests.total", "method" => method.as_str()).increment(1);

        let raw = match self.transport.send(descriptor).await {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(error = %error, "Transport failed");
                metrics::counter!("http.responses.total", "outcome" => "transport_error")
                    .increment(1);
                return Err(error.into());
            },
        };

        let envelope = apply_response_transforms(
            &resolved.response_transforms,
            &self.snapshot,
            ResponseEnvelope::from(raw),
        )?;

        if envelope.ok {
            tracing::trace!(status = envelope.status, "Request succeeded");
            metrics::counter!("http.responses.total", "outcome" => "ok").increment(1);
            Ok(envelope)
        } else {
            tracing::debug!(status = envelope.status, "Request returned error status");
            metrics::counter!("http.responses.total", "outcome" => "error_status").increment(1);
            Err(ApiError::Status {
                status: envelope.status,
                body: envelope.body,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::config::ConfigValue;
    use crate::error::TransformError;
    use crate::transform::Transform;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Default)]
    struct State {
        user_id: u32,
    }

    /// Answers every request with a fixed response and remembers the requests
    struct Canned {
        response: Result<RawResponse, TransportError>,
        seen: Mutex<Vec<RequestDescriptor>>,
    }

    impl Canned {
        fn ok(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(RawResponse {
                    status,
                    headers: BTreeMap::new(),
                    body: body.as_bytes().to_vec(),
                }),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Err(TransportError::new(message)),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> RequestDescriptor {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }
    }

    impl Transport for Canned {
        fn send(&self, request: RequestDescriptor) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
            self.seen.lock().unwrap().push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn client(transport: Arc<Canned>) -> HttpClient<State> {
        HttpClient::new(
            Config::new("https://x.test"),
            transport,
            Arc::new(State { user_id: 7 }),
        )
    }

    #[test]
    fn url_is_built_from_parts_in_order() {
        let config: Config<State> = Config::new("https://x.test")
            .with_path("/todos")
            .with_append_path("5")
            .with_append_ext("json")
            .with_param("q", "a");
        let resolved = config.resolve(&State::default()).unwrap();

        let descriptor = RequestDescriptor::from_resolved(Method::Get, &resolved).unwrap();

        assert_eq!(descriptor.full_url(), "https://x.test/todos5.json?q=a");
    }

    #[test]
    fn url_override_ignores_base_url_and_path() {
        let config: Config<State> = Config::new("https://x.test")
            .with_path("/todos")
            .with_url("https://other.test/raw");
        let resolved = config.resolve(&State::default()).unwrap();

        let descriptor = RequestDescriptor::from_resolved(Method::Get, &resolved).unwrap();

        assert_eq!(descriptor.url, "https://other.test/raw");
    }

    #[test]
    fn missing_base_url_is_a_config_error() {
        let resolved = Config::<State>::path("/todos").resolve(&State::default()).unwrap();
        let error = RequestDescriptor::from_resolved(Method::Get, &resolved).unwrap_err();
        assert_eq!(error, ConfigError::MissingBaseUrl);
    }

    #[test]
    fn query_values_are_form_encoded() {
        let config: Config<State> = Config::new("https://x.test/search?lang=en")
            .with_param("q", "a b&c");
        let resolved = config.resolve(&State::default()).unwrap();

        let descriptor = RequestDescriptor::from_resolved(Method::Get, &resolved).unwrap();

        assert_eq!(descriptor.full_url(), "https://x.test/search?lang=en&q=a+b%26c");
    }

    #[tokio::test]
    async fn get_returns_parsed_json_on_success() {
        let transport = Canned::ok(200, r#"{"todos":[1,2,3]}"#);
        let client = client(Arc::clone(&transport));

        let response = assert_ok!(client.get("/todos").await);

        assert!(response.ok);
        assert_eq!(response.body, json!({ "todos": [1, 2, 3] }));
        let sent = transport.last();
        assert_eq!(sent.method, Method::Get);
        assert_eq!(sent.url, "https://x.test/todos");
        assert_eq!(sent.headers["accept"], "application/json");
    }

    #[tokio::test]
    async fn computed_options_resolve_against_the_snapshot() {
        let transport = Canned::ok(200, "{}");
        let client = client(Arc::clone(&transport));

        let _ = assert_ok!(
            client
                .post(
                    Config::path("/users/")
                        .with_append_path(ConfigValue::computed(|s: &State| s.user_id.to_string()))
                        .with_body(json!({ "name": "ada" })),
                )
                .await
        );

        let sent = transport.last();
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.url, "https://x.test/users/7");
        assert_eq!(sent.body, Some(json!({ "name": "ada" })));
    }

    #[tokio::test]
    async fn non_2xx_is_rejected_with_transformed_body() {
        let transport = Canned::ok(500, r#"{"message":"boom"}"#);
        let client = client(transport);

        let error = assert_err!(client.delete("/todos/1").await);

        assert_eq!(error, ApiError::status(500, json!({ "message": "boom" })));
    }

    #[tokio::test]
    async fn transport_failure_is_normalized() {
        let client = client(Canned::failing("connection refused"));

        let error = assert_err!(client.head("/").await);

        let failure = error.normalize();
        assert_eq!(failure.status, 0);
        assert_eq!(failure.message, "connection refused");
    }

    #[tokio::test]
    async fn failing_request_transform_never_reaches_the_transport() {
        let transport = Canned::ok(200, "{}");
        let client = client(Arc::clone(&transport)).with_defaults(
            Config::new("https://x.test").with_request_transform(Transform::new(|_: &State, _| {
                Err(TransformError::new("blocked"))
            })),
        );

        let error = assert_err!(client.put("/todos/1").await);

        assert_eq!(error, ApiError::Transform(TransformError::new("blocked")));
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn patch_and_empty_body_give_null() {
        let transport = Canned::ok(204, "");
        let client = client(transport);

        let response = assert_ok!(client.patch("/todos/1").await);

        assert_eq!(response.status, 204);
        assert_eq!(response.body, Value::Null);
    }

    #[tokio::test]
    async fn failing_response_transform_rejects_a_success() {
        let transport = Canned::ok(200, r#"{"todos":[]}"#);
        let client = HttpClient::new(
            Config::new("https://x.test").with_response_transform(Transform::new(|_: &State, _| {
                Err(TransformError::new("unexpected shape"))
            })),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(State::default()),
        );

        let error = assert_err!(client.get("/todos").await);

        assert_eq!(error, ApiError::Transform(TransformError::new("unexpected shape")));
        assert_eq!(transport.last().url, "https://x.test/todos");
    }

    #[test]
    fn binary_body_survives_as_bytes() {
        let raw = RawResponse {
            status: 200,
            headers: BTreeMap::new(),
            body: vec![0xff, 0x00, 0x7f],
        };

        let envelope = ResponseEnvelope::from(raw);

        assert_eq!(envelope.body, json!([255, 0, 127]));
    }
}
