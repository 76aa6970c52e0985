//! Actions, action types and phase identifiers
//!
//! Actions are dynamically typed messages: an [`ActionType`] identifier, a
//! [`Payload`] and [`Meta`] data. API actions (`meta.is_api`) carry their
//! resolution function as payload; the dispatcher turns each of them into a
//! `LOADING` action followed by exactly one `SUCCESS` or `ERROR` action,
//! whose identifiers are derived from the base type by [`ApiTypes::derive`].

use crate::config::{Config, ResolvedConfig};
use crate::error::{ApiError, ApiFailure, DispatchError};
use crate::http::HttpClient;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Unique identifier of an action type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionType(String);

impl ActionType {
    /// Create an identifier
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The identifier as a string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ActionType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&ActionType> for ActionType {
    fn from(ty: &ActionType) -> Self {
        ty.clone()
    }
}

impl PartialEq<str> for ActionType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ActionType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Phase of an API call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// The base action itself
    Base,
    /// Request started
    Loading,
    /// Request settled successfully
    Success,
    /// Request settled with an error
    Error,
}

impl Phase {
    /// All phases, base first
    pub const ALL: [Self; 4] = [Self::Base, Self::Loading, Self::Success, Self::Error];

    /// Suffix appended to the base identifier
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Base => "",
            Self::Loading => "_LOADING",
            Self::Success => "_SUCCESS",
            Self::Error => "_ERROR",
        }
    }

    /// Lower-case label, used for metrics
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// The four identifiers derived from one API base type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiTypes {
    /// Base identifier
    pub base: ActionType,
    /// `<base>_LOADING`
    pub loading: ActionType,
    /// `<base>_SUCCESS`
    pub success: ActionType,
    /// `<base>_ERROR`
    pub error: ActionType,
}

impl ApiTypes {
    /// Derive the phase identifiers of `base`
    ///
    /// Deterministic: the same base always yields the same identifiers.
    #[must_use]
    pub fn derive(base: impl Into<ActionType>) -> Self {
        let base = base.into();
        let with = |phase: Phase| ActionType::new(format!("{}{}", base, phase.suffix()));
        Self {
            loading: with(Phase::Loading),
            success: with(Phase::Success),
            error: with(Phase::Error),
            base,
        }
    }

    /// Identifier of `phase`
    #[must_use]
    pub const fn get(&self, phase: Phase) -> &ActionType {
        match phase {
            Phase::Base => &self.base,
            Phase::Loading => &self.loading,
            Phase::Success => &self.success,
            Phase::Error => &self.error,
        }
    }

    /// Which phase `ty` belongs to, if any
    #[must_use]
    pub fn phase_of(&self, ty: &ActionType) -> Option<Phase> {
        Phase::ALL.into_iter().find(|phase| self.get(*phase) == ty)
    }
}

impl From<&ApiTypes> for ActionType {
    fn from(types: &ApiTypes) -> Self {
        types.base.clone()
    }
}

/// Registry of action type identifiers, optionally namespaced
///
/// ```
/// use phasewire_core::action::Constants;
///
/// let constants = Constants::namespaced("todos").plain("ADD").api("FETCH_ALL");
/// assert_eq!(constants.get("ADD").map(|t| t.as_str()), Some("todos/ADD"));
/// let fetch = constants.api_types("FETCH_ALL").unwrap();
/// assert_eq!(fetch.loading.as_str(), "todos/FETCH_ALL_LOADING");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Constants {
    namespace: Option<String>,
    plain: BTreeMap<String, ActionType>,
    api: BTreeMap<String, ApiTypes>,
}

impl Constants {
    /// Registry without a namespace
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose identifiers are prefixed with `namespace/`
    #[must_use]
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    fn identifier(&self, name: &str) -> ActionType {
        match &self.namespace {
            Some(namespace) => ActionType::new(format!("{namespace}/{name}")),
            None => ActionType::new(name),
        }
    }

    /// Register a plain action type
    #[must_use]
    pub fn plain(mut self, name: &str) -> Self {
        let ty = self.identifier(name);
        self.plain.insert(name.to_string(), ty);
        self
    }

    /// Register an API action type and its phase identifiers
    #[must_use]
    pub fn api(mut self, name: &str) -> Self {
        let types = ApiTypes::derive(self.identifier(name));
        self.api.insert(name.to_string(), types);
        self
    }

    /// Identifier registered under `name`; API names return their base
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ActionType> {
        self.plain
            .get(name)
            .or_else(|| self.api.get(name).map(|types| &types.base))
    }

    /// Phase identifiers registered under `name`
    #[must_use]
    pub fn api_types(&self, name: &str) -> Option<&ApiTypes> {
        self.api.get(name)
    }
}

/// Something actions can be handed to
///
/// Implemented by the runtime store; resolution functions receive one so
/// they can dispatch follow-up actions.
pub trait Dispatch<S>: Send + Sync {
    /// Dispatch an action
    fn dispatch(&self, action: Action<S>) -> BoxFuture<'_, Result<(), DispatchError>>;
}

type CallFn<S> =
    dyn Fn(Arc<dyn Dispatch<S>>, HttpClient<S>) -> BoxFuture<'static, Result<Value, ApiError>> + Send + Sync;

/// Resolution function of an API action
///
/// Receives a dispatch handle and an [`HttpClient`] preconfigured with the
/// resolved configuration of the call.
pub struct ApiCall<S> {
    f: Arc<CallFn<S>>,
}

impl<S: 'static> ApiCall<S> {
    /// Wrap an async function
    #[must_use]
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<dyn Dispatch<S>>, HttpClient<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApiError>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |dispatch, client| Box::pin(f(dispatch, client))),
        }
    }
}

impl<S> ApiCall<S> {
    /// Start the call
    #[must_use]
    pub fn invoke(
        &self,
        dispatch: Arc<dyn Dispatch<S>>,
        client: HttpClient<S>,
    ) -> BoxFuture<'static, Result<Value, ApiError>> {
        (self.f)(dispatch, client)
    }
}

impl<S> Clone for ApiCall<S> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<S> fmt::Debug for ApiCall<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiCall(<fn>)")
    }
}

/// Action payload
pub enum Payload<S> {
    /// No payload
    None,
    /// Plain data; also the payload of `SUCCESS` actions
    Value(Value),
    /// Resolution function of an API action
    Call(ApiCall<S>),
    /// Normalized error of an `ERROR` action
    Failure(ApiFailure),
}

impl<S> Clone for Payload<S> {
    fn clone(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Value(value) => Self::Value(value.clone()),
            Self::Call(call) => Self::Call(call.clone()),
            Self::Failure(failure) => Self::Failure(failure.clone()),
        }
    }
}

impl<S> fmt::Debug for Payload<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Call(call) => f.debug_tuple("Call").field(call).finish(),
            Self::Failure(failure) => f.debug_tuple("Failure").field(failure).finish(),
        }
    }
}

/// Action metadata
pub struct Meta<S> {
    /// Whether the dispatcher should expand this action into phases
    pub is_api: bool,
    /// Per-call configuration carried by the inbound action
    pub options: Option<Config<S>>,
    /// Fully merged and resolved configuration, set by the dispatcher
    pub resolved: Option<ResolvedConfig<S>>,
}

impl<S> Default for Meta<S> {
    fn default() -> Self {
        Self {
            is_api: false,
            options: None,
            resolved: None,
        }
    }
}

impl<S> Clone for Meta<S> {
    fn clone(&self) -> Self {
        Self {
            is_api: self.is_api,
            options: self.options.clone(),
            resolved: self.resolved.clone(),
        }
    }
}

impl<S> fmt::Debug for Meta<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meta")
            .field("is_api", &self.is_api)
            .field("options", &self.options)
            .field("resolved", &self.resolved)
            .finish()
    }
}

/// A message flowing through the store
pub struct Action<S> {
    /// Identifier used to route the action
    pub action_type: ActionType,
    /// Data carried by the action
    pub payload: Payload<S>,
    /// Metadata
    pub meta: Meta<S>,
}

impl<S> Action<S> {
    /// Action without payload
    #[must_use]
    pub fn new(action_type: impl Into<ActionType>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: Payload::None,
            meta: Meta::default(),
        }
    }

    /// Action carrying plain data
    #[must_use]
    pub fn with_value(action_type: impl Into<ActionType>, value: Value) -> Self {
        Self {
            payload: Payload::Value(value),
            ..Self::new(action_type)
        }
    }

    /// API action whose payload is its resolution function
    #[must_use]
    pub fn api(action_type: impl Into<ActionType>, call: ApiCall<S>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: Payload::Call(call),
            meta: Meta {
                is_api: true,
                ..Meta::default()
            },
        }
    }

    /// Attach per-call configuration, merged over the dispatcher baseline
    #[must_use]
    pub fn with_options(mut self, options: Config<S>) -> Self {
        self.meta.options = Some(options);
        self
    }

    /// Whether the action is an API action
    #[must_use]
    pub const fn is_api(&self) -> bool {
        self.meta.is_api
    }

    /// Plain data payload, if any
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Failure payload, if any
    #[must_use]
    pub const fn failure(&self) -> Option<&ApiFailure> {
        match &self.payload {
            Payload::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

impl<S> Clone for Action<S> {
    fn clone(&self) -> Self {
        Self {
            action_type: self.action_type.clone(),
            payload: self.payload.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<S> fmt::Debug for Action<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("action_type", &self.action_type)
            .field("payload", &self.payload)
            .field("meta", &self.meta)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn derives_four_phase_identifiers() {
        let types = ApiTypes::derive("FETCH_ALL");
        assert_eq!(types.base, "FETCH_ALL");
        assert_eq!(types.loading, "FETCH_ALL_LOADING");
        assert_eq!(types.success, "FETCH_ALL_SUCCESS");
        assert_eq!(types.error, "FETCH_ALL_ERROR");
    }

    #[test]
    fn phase_of_recognizes_only_own_identifiers() {
        let types = ApiTypes::derive("FETCH_ALL");
        assert_eq!(types.phase_of(&"FETCH_ALL_ERROR".into()), Some(Phase::Error));
        assert_eq!(types.phase_of(&"FETCH_ALL".into()), Some(Phase::Base));
        assert_eq!(types.phase_of(&"FETCH_ONE_ERROR".into()), None);
    }

    #[test]
    fn constants_without_namespace_use_the_bare_name() {
        let constants = Constants::new().plain("TOGGLE").api("SAVE");
        assert_eq!(constants.get("TOGGLE").map(ActionType::as_str), Some("TOGGLE"));
        assert_eq!(constants.get("SAVE").map(ActionType::as_str), Some("SAVE"));
        assert!(constants.api_types("TOGGLE").is_none());
        assert!(constants.get("MISSING").is_none());
    }

    #[test]
    fn registering_twice_yields_identical_identifiers() {
        let once = Constants::namespaced("app").api("LOAD");
        let twice = once.clone().api("LOAD");
        assert_eq!(once.api_types("LOAD"), twice.api_types("LOAD"));
    }

    #[test]
    fn api_constructor_marks_action() {
        let action: Action<()> = Action::api(
            "FETCH_ALL",
            ApiCall::new(|_, _| async { Ok(json!(null)) }),
        );
        assert!(action.is_api());
        assert!(matches!(action.payload, Payload::Call(_)));

        let plain: Action<()> = Action::with_value("ADD", json!(1));
        assert!(!plain.is_api());
        assert_eq!(plain.value(), Some(&json!(1)));
        assert!(plain.failure().is_none());
    }

    proptest! {
        #[test]
        fn derivation_is_deterministic(base in "[A-Z_]{1,24}") {
            prop_assert_eq!(ApiTypes::derive(base.as_str()), ApiTypes::derive(base.as_str()));
        }

        #[test]
        fn derived_identifiers_are_unique(base in "[A-Z_]{1,24}") {
            let types = ApiTypes::derive(base.as_str());
            let all = [&types.base, &types.loading, &types.success, &types.error];
            for (i, a) in all.iter().enumerate() {
                for b in &all[i + 1..] {
                    prop_assert_ne!(a, b);
                }
            }
        }
    }
}
