//! Configuration resolver
//!
//! A [`Config`] is used at every level of a call: the process-wide baseline
//! handed to the dispatcher, the override carried by an API action, and the
//! options passed to a single HTTP verb. Every scalar entry is a
//! [`ConfigValue`], either a literal or a function of the current state
//! snapshot.
//!
//! Resolution happens once per call: [`resolve`] merges the override over the
//! baseline and replaces every computed entry by its value, producing a
//! [`ResolvedConfig`] that later stages consume without looking at state again.
//!
//! # Example
//!
//! ```
//! use phasewire_core::config::{resolve, Config, ConfigValue};
//!
//! struct AppState {
//!     token: String,
//! }
//!
//! let baseline: Config<AppState> = Config::new("https://api.test")
//!     .with_header("x-client", "web");
//! let call = Config::path("/todos").with_header(
//!     "authorization",
//!     ConfigValue::computed(|s: &AppState| format!("Bearer {}", s.token)),
//! );
//!
//! let state = AppState { token: "abc".into() };
//! let resolved = resolve(&baseline, &call, &state).unwrap();
//! assert_eq!(resolved.headers["x-client"], "web");
//! assert_eq!(resolved.headers["authorization"], "Bearer abc");
//! ```

use crate::error::ConfigError;
use crate::transform::{RequestTransform, ResponseTransform, parse_json};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A function computing a configuration value from a state snapshot
pub type Resolver<S, T> = Arc<dyn Fn(&S) -> Result<T, String> + Send + Sync>;

/// Resolved header map, keys lower-cased
pub type HeaderMap = BTreeMap<String, String>;

/// A configuration leaf: a fixed value or one computed from state
pub enum ConfigValue<S, T> {
    /// Fixed value
    Literal(T),
    /// Value computed from the state snapshot at dispatch time
    Computed(Resolver<S, T>),
}

impl<S: 'static, T: 'static> ConfigValue<S, T> {
    /// Wrap an infallible function of the state snapshot
    #[must_use]
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&S) -> T + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(move |state| Ok(f(state))))
    }

    /// Wrap a fallible function of the state snapshot
    ///
    /// An `Err` aborts resolution of the whole call with a [`ConfigError`].
    #[must_use]
    pub fn try_computed<F, E>(f: F) -> Self
    where
        F: Fn(&S) -> Result<T, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        Self::Computed(Arc::new(move |state| f(state).map_err(|e| e.to_string())))
    }
}

impl<S, T> ConfigValue<S, T> {
    /// Whether the value depends on state
    #[must_use]
    pub const fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }

    /// Produce the concrete value for `state`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Computed`] naming `key` if the resolver fails.
    pub fn resolve(&self, key: &str, state: &S) -> Result<T, ConfigError>
    where
        T: Clone,
    {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Computed(f) => f(state).map_err(|message| ConfigError::computed(key, message)),
        }
    }
}

impl<S, T: Clone> Clone for ConfigValue<S, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal(value) => Self::Literal(value.clone()),
            Self::Computed(f) => Self::Computed(Arc::clone(f)),
        }
    }
}

impl<S, T: fmt::Debug> fmt::Debug for ConfigValue<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Computed(_) => write!(f, "Computed(<fn>)"),
        }
    }
}

impl<S, T> From<T> for ConfigValue<S, T> {
    fn from(value: T) -> Self {
        Self::Literal(value)
    }
}

impl<S> From<&str> for ConfigValue<S, String> {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_string())
    }
}

/// One layer of headers; layers are applied in order, later keys win
pub enum HeaderLayer<S> {
    /// Individual entries, each a literal or computed value
    Entries(BTreeMap<String, ConfigValue<S, String>>),
    /// A whole map computed from state
    Computed(Resolver<S, HeaderMap>),
}

impl<S> HeaderLayer<S> {
    fn resolve_into(&self, state: &S, headers: &mut HeaderMap) -> Result<(), ConfigError> {
        match self {
            Self::Entries(entries) => {
                for (name, value) in entries {
                    headers.insert(name.to_ascii_lowercase(), value.resolve(name, state)?);
                }
            },
            Self::Computed(f) => {
                let computed =
                    f(state).map_err(|message| ConfigError::computed("headers", message))?;
                for (name, value) in computed {
                    headers.insert(name.to_ascii_lowercase(), value);
                }
            },
        }
        Ok(())
    }
}

impl<S> Clone for HeaderLayer<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Entries(entries) => Self::Entries(entries.clone()),
            Self::Computed(f) => Self::Computed(Arc::clone(f)),
        }
    }
}

impl<S> fmt::Debug for HeaderLayer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entries(entries) => f.debug_tuple("Entries").field(entries).finish(),
            Self::Computed(_) => write!(f, "Computed(<fn>)"),
        }
    }
}

/// Request configuration, used for the baseline and for every override
///
/// All fields are optional so that any level can leave a value to the level
/// below it. [`Config::new`] builds a baseline with JSON defaults.
pub struct Config<S> {
    /// Prefix for `path`; ignored when `url` is set
    pub base_url: Option<ConfigValue<S, String>>,
    /// Full URL override
    pub url: Option<ConfigValue<S, String>>,
    /// Path appended to `base_url`
    pub path: Option<ConfigValue<S, String>>,
    /// Extra segment concatenated onto the path
    pub append_path: Option<ConfigValue<S, String>>,
    /// Extension appended after a `.`
    pub append_ext: Option<ConfigValue<S, String>>,
    /// Query parameters, merged key by key
    pub params: BTreeMap<String, ConfigValue<S, String>>,
    /// Header layers, merged in order
    pub headers: Vec<HeaderLayer<S>>,
    /// JSON request body
    pub body: Option<ConfigValue<S, Value>>,
    /// Transforms applied to the request descriptor, in order
    pub request_transforms: Vec<RequestTransform<S>>,
    /// Transforms applied to the response envelope, in order
    pub response_transforms: Vec<ResponseTransform<S>>,
}

impl<S: 'static> Config<S> {
    /// Baseline configuration for `base_url` with JSON defaults
    ///
    /// Sets `Accept` and `Content-Type` to `application/json` and installs
    /// the [`parse_json`] response transform.
    #[must_use]
    pub fn new(base_url: impl Into<ConfigValue<S, String>>) -> Self {
        Self::default()
            .with_base_url(base_url)
            .with_header("accept", "application/json")
            .with_header("content-type", "application/json")
            .with_response_transform(parse_json())
    }

    /// Add a layer of headers computed from state
    #[must_use]
    pub fn with_headers_from<F>(mut self, f: F) -> Self
    where
        F: Fn(&S) -> HeaderMap + Send + Sync + 'static,
    {
        self.headers
            .push(HeaderLayer::Computed(Arc::new(move |state| Ok(f(state)))));
        self
    }
}

impl<S> Config<S> {
    /// Options with only `path` set
    #[must_use]
    pub fn path(path: impl Into<ConfigValue<S, String>>) -> Self {
        Self::default().with_path(path)
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<ConfigValue<S, String>>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set a full URL, bypassing `base_url` and `path`
    #[must_use]
    pub fn with_url(mut self, url: impl Into<ConfigValue<S, String>>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the path appended to the base URL
    #[must_use]
    pub fn with_path(mut self, path: impl Into<ConfigValue<S, String>>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set a segment concatenated onto the path
    #[must_use]
    pub fn with_append_path(mut self, segment: impl Into<ConfigValue<S, String>>) -> Self {
        self.append_path = Some(segment.into());
        self
    }

    /// Set an extension appended as `.ext`
    #[must_use]
    pub fn with_append_ext(mut self, ext: impl Into<ConfigValue<S, String>>) -> Self {
        self.append_ext = Some(ext.into());
        self
    }

    /// Add a query parameter
    #[must_use]
    pub fn with_param(
        mut self,
        name: impl Into<String>,
        value: impl Into<ConfigValue<S, String>>,
    ) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Add a header entry to the last entries layer
    #[must_use]
    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<ConfigValue<S, String>>,
    ) -> Self {
        if let Some(HeaderLayer::Entries(entries)) = self.headers.last_mut() {
            entries.insert(name.into(), value.into());
        } else {
            let mut entries = BTreeMap::new();
            entries.insert(name.into(), value.into());
            self.headers.push(HeaderLayer::Entries(entries));
        }
        self
    }

    /// Set the JSON request body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<ConfigValue<S, Value>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Append a request transform
    #[must_use]
    pub fn with_request_transform(mut self, transform: RequestTransform<S>) -> Self {
        self.request_transforms.push(transform);
        self
    }

    /// Append a response transform
    #[must_use]
    pub fn with_response_transform(mut self, transform: ResponseTransform<S>) -> Self {
        self.response_transforms.push(transform);
        self
    }

    /// Drop all response transforms, including the JSON default
    #[must_use]
    pub fn without_response_transforms(mut self) -> Self {
        self.response_transforms.clear();
        self
    }

    /// Merge `over` on top of `self`
    ///
    /// Scalars: `over` wins when set. Params: key by key, `over` wins.
    /// Headers: layers of `self` then layers of `over`. Transforms: `self`
    /// first, then `over`.
    #[must_use]
    pub fn merge(&self, over: &Self) -> Self {
        let pick = |base: &Option<ConfigValue<S, String>>, over: &Option<ConfigValue<S, String>>| {
            over.clone().or_else(|| base.clone())
        };

        let mut params = self.params.clone();
        params.extend(over.params.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self {
            base_url: pick(&self.base_url, &over.base_url),
            url: pick(&self.url, &over.url),
            path: pick(&self.path, &over.path),
            append_path: pick(&self.append_path, &over.append_path),
            append_ext: pick(&self.append_ext, &over.append_ext),
            params,
            headers: self.headers.iter().chain(&over.headers).cloned().collect(),
            body: over.body.clone().or_else(|| self.body.clone()),
            request_transforms: self
                .request_transforms
                .iter()
                .chain(&over.request_transforms)
                .cloned()
                .collect(),
            response_transforms: self
                .response_transforms
                .iter()
                .chain(&over.response_transforms)
                .cloned()
                .collect(),
        }
    }

    /// Replace every computed entry by its value for `state`
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] raised by a computed entry.
    pub fn resolve(&self, state: &S) -> Result<ResolvedConfig<S>, ConfigError> {
        let scalar = |key: &str, value: &Option<ConfigValue<S, String>>| {
            value.as_ref().map(|v| v.resolve(key, state)).transpose()
        };

        let mut headers = HeaderMap::new();
        for layer in &self.headers {
            layer.resolve_into(state, &mut headers)?;
        }

        let params = self
            .params
            .iter()
            .map(|(name, value)| Ok((name.clone(), value.resolve(name, state)?)))
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

        Ok(ResolvedConfig {
            base_url: scalar("base_url", &self.base_url)?,
            url: scalar("url", &self.url)?,
            path: scalar("path", &self.path)?,
            append_path: scalar("append_path", &self.append_path)?,
            append_ext: scalar("append_ext", &self.append_ext)?,
            params,
            headers,
            body: self.body.as_ref().map(|v| v.resolve("body", state)).transpose()?,
            request_transforms: self.request_transforms.clone(),
            response_transforms: self.response_transforms.clone(),
        })
    }
}

impl<S> Default for Config<S> {
    fn default() -> Self {
        Self {
            base_url: None,
            url: None,
            path: None,
            append_path: None,
            append_ext: None,
            params: BTreeMap::new(),
            headers: Vec::new(),
            body: None,
            request_transforms: Vec::new(),
            response_transforms: Vec::new(),
        }
    }
}

impl<S> Clone for Config<S> {
    fn clone(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            url: self.url.clone(),
            path: self.path.clone(),
            append_path: self.append_path.clone(),
            append_ext: self.append_ext.clone(),
            params: self.params.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            request_transforms: self.request_transforms.clone(),
            response_transforms: self.response_transforms.clone(),
        }
    }
}

impl<S> fmt::Debug for Config<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("url", &self.url)
            .field("path", &self.path)
            .field("append_path", &self.append_path)
            .field("append_ext", &self.append_ext)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("request_transforms", &self.request_transforms.len())
            .field("response_transforms", &self.response_transforms.len())
            .finish()
    }
}

impl<S> From<&str> for Config<S> {
    fn from(path: &str) -> Self {
        Self::path(path)
    }
}

impl<S> From<String> for Config<S> {
    fn from(path: String) -> Self {
        Self::path(path)
    }
}

/// Configuration with every computed entry replaced by its value
///
/// Transforms stay unbound; they are bound to the same snapshot the
/// configuration was resolved against when the pipeline runs.
pub struct ResolvedConfig<S> {
    /// Resolved base URL
    pub base_url: Option<String>,
    /// Resolved full URL override
    pub url: Option<String>,
    /// Resolved path
    pub path: Option<String>,
    /// Resolved path suffix
    pub append_path: Option<String>,
    /// Resolved extension
    pub append_ext: Option<String>,
    /// Resolved query parameters
    pub params: BTreeMap<String, String>,
    /// Resolved headers, keys lower-cased
    pub headers: HeaderMap,
    /// Resolved JSON body
    pub body: Option<Value>,
    /// Request transforms, baseline first
    pub request_transforms: Vec<RequestTransform<S>>,
    /// Response transforms, baseline first
    pub response_transforms: Vec<ResponseTransform<S>>,
}

impl<S> Clone for ResolvedConfig<S> {
    fn clone(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            url: self.url.clone(),
            path: self.path.clone(),
            append_path: self.append_path.clone(),
            append_ext: self.append_ext.clone(),
            params: self.params.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            request_transforms: self.request_transforms.clone(),
            response_transforms: self.response_transforms.clone(),
        }
    }
}

impl<S> fmt::Debug for ResolvedConfig<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("base_url", &self.base_url)
            .field("url", &self.url)
            .field("path", &self.path)
            .field("append_path", &self.append_path)
            .field("append_ext", &self.append_ext)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("request_transforms", &self.request_transforms.len())
            .field("response_transforms", &self.response_transforms.len())
            .finish()
    }
}

impl<S> From<ResolvedConfig<S>> for Config<S> {
    /// Lift a resolved configuration back into literals, so it can serve as
    /// the defaults of a client without being resolved against state again
    fn from(resolved: ResolvedConfig<S>) -> Self {
        let headers = if resolved.headers.is_empty() {
            Vec::new()
        } else {
            vec![HeaderLayer::Entries(
                resolved
                    .headers
                    .into_iter()
                    .map(|(k, v)| (k, ConfigValue::Literal(v)))
                    .collect(),
            )]
        };

        Self {
            base_url: resolved.base_url.map(ConfigValue::Literal),
            url: resolved.url.map(ConfigValue::Literal),
            path: resolved.path.map(ConfigValue::Literal),
            append_path: resolved.append_path.map(ConfigValue::Literal),
            append_ext: resolved.append_ext.map(ConfigValue::Literal),
            params: resolved
                .params
                .into_iter()
                .map(|(k, v)| (k, ConfigValue::Literal(v)))
                .collect(),
            headers,
            body: resolved.body.map(ConfigValue::Literal),
            request_transforms: resolved.request_transforms,
            response_transforms: resolved.response_transforms,
        }
    }
}

/// Merge `override_config` over `baseline` and resolve against `state`
///
/// # Errors
///
/// Returns the [`ConfigError`] of the first computed entry that fails; no
/// partially resolved configuration is ever returned.
pub fn resolve<S>(
    baseline: &Config<S>,
    override_config: &Config<S>,
    state: &S,
) -> Result<ResolvedConfig<S>, ConfigError> {
    baseline.merge(override_config).resolve(state)
}
