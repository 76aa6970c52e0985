//! Transform pipeline
//!
//! Transforms are state-aware functions that rewrite a request descriptor
//! before it is sent, or a response envelope after it arrives. The pipeline
//! first binds every transform to the state snapshot, then folds the bound
//! chain left to right in declaration order. The first failure aborts the
//! fold; nothing is retried.

use crate::error::TransformError;
use crate::http::{RequestDescriptor, ResponseEnvelope};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type TransformFn<S, T> = Arc<dyn Fn(&S, T) -> Result<T, TransformError> + Send + Sync>;

/// A state-aware rewrite of a value of type `T`
pub struct Transform<S, T> {
    f: TransformFn<S, T>,
}

/// Transform applied to outgoing request descriptors
pub type RequestTransform<S> = Transform<S, RequestDescriptor>;

/// Transform applied to incoming response envelopes
pub type ResponseTransform<S> = Transform<S, ResponseEnvelope>;

impl<S: 'static, T: 'static> Transform<S, T> {
    /// Create a transform from a fallible function of state and value
    #[must_use]
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&S, T) -> Result<T, TransformError> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    /// Create a transform that ignores state and cannot fail
    #[must_use]
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        Self::new(move |_, value| Ok(f(value)))
    }
}

impl<S, T> Transform<S, T> {
    /// Bind the transform to a state snapshot
    pub fn bind<'a>(&'a self, state: &'a S) -> impl Fn(T) -> Result<T, TransformError> + 'a {
        move |value| (self.f)(state, value)
    }
}

impl<S, T> Clone for Transform<S, T> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<S, T> fmt::Debug for Transform<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transform(<fn>)")
    }
}

/// Bind every transform to `state`, then fold them over `initial`
///
/// # Errors
///
/// Returns the first [`TransformError`]; later transforms do not run.
pub fn apply_transforms<S, T>(
    transforms: &[Transform<S, T>],
    state: &S,
    initial: T,
) -> Result<T, TransformError> {
    let chain: Vec<_> = transforms.iter().map(|t| t.bind(state)).collect();
    chain.iter().try_fold(initial, |value, step| step(value))
}

/// Run the request transforms over a descriptor
///
/// # Errors
///
/// Returns the first [`TransformError`].
pub fn apply_request_transforms<S>(
    transforms: &[RequestTransform<S>],
    state: &S,
    descriptor: RequestDescriptor,
) -> Result<RequestDescriptor, TransformError> {
    apply_transforms(transforms, state, descriptor)
}

/// Run the response transforms over an envelope
///
/// # Errors
///
/// Returns the first [`TransformError`].
pub fn apply_response_transforms<S>(
    transforms: &[ResponseTransform<S>],
    state: &S,
    response: ResponseEnvelope,
) -> Result<ResponseEnvelope, TransformError> {
    apply_transforms(transforms, state, response)
}

/// Parse a string body as JSON
///
/// Bodies that are not valid JSON are left as text, so an HTML error page
/// still reaches the `ERROR` payload intact.
#[must_use]
pub fn parse_json<S: 'static>() -> ResponseTransform<S> {
    Transform::map(|mut response: ResponseEnvelope| {
        if let Value::String(text) = &response.body {
            if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                response.body = parsed;
            }
        }
        response
    })
}

/// Set `Authorization: Bearer <token>` from state, when a token is present
#[must_use]
pub fn bearer_token<S, F>(token: F) -> RequestTransform<S>
where
    S: 'static,
    F: Fn(&S) -> Option<String> + Send + Sync + 'static,
{
    Transform::new(move |state, mut request: RequestDescriptor| {
        if let Some(token) = token(state) {
            request
                .headers
                .insert("authorization".to_string(), format!("Bearer {token}"));
        }
        Ok(request)
    })
}
