//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use phasewire_core::reducer::Reducer;

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// Actions given with [`when_action`](Self::when_action) are reduced in
/// order, so a whole phase sequence can be replayed in one test.
///
/// # Example
///
/// ```ignore
/// use phasewire_testing::ReducerTest;
///
/// ReducerTest::new(todos_reducer())
///     .given_state(TodoState::default())
///     .when_action(Action::new("FETCH_ALL_LOADING"))
///     .when_action(Action::with_value("FETCH_ALL_SUCCESS", json!({ "todos": [1] })))
///     .then_state(|state| {
///         assert!(!state.loading);
///         assert_eq!(state.todos, vec![1]);
///     })
///     .run();
/// ```
pub struct ReducerTest<R>
where
    R: Reducer,
{
    reducer: R,
    initial_state: Option<R::State>,
    actions: Vec<R::Action>,
    state_assertions: Vec<StateAssertion<R::State>>,
}

impl<R> ReducerTest<R>
where
    R: Reducer,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
        }
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to reduce (When)
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state or actions are not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        assert!(
            !self.actions.is_empty(),
            "At least one action must be set with when_action()"
        );

        for action in &self.actions {
            self.reducer.reduce(&mut state, action);
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }
    }
}

/// Helper assertions for emitted actions
pub mod assertions {
    use phasewire_core::action::{Action, ApiTypes, Phase};

    /// Assert that the actions of `base` are exactly `LOADING` then `terminal`
    ///
    /// Actions of other types are ignored, so the input may be everything a
    /// store emitted.
    ///
    /// # Panics
    ///
    /// Panics if `terminal` is not [`Phase::Success`] or [`Phase::Error`], or
    /// if the phase actions of `base` differ from the expected pair.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_phase_sequence<S, I>(actions: I, base: &str, terminal: Phase)
    where
        I: IntoIterator<Item = Action<S>>,
    {
        assert!(
            matches!(terminal, Phase::Success | Phase::Error),
            "Terminal phase must be Success or Error, got {terminal:?}"
        );

        let types = ApiTypes::derive(base);
        let seen: Vec<String> = actions
            .into_iter()
            .filter(|action| {
                matches!(
                    types.phase_of(&action.action_type),
                    Some(Phase::Loading | Phase::Success | Phase::Error)
                )
            })
            .map(|action| action.action_type.to_string())
            .collect();
        let expected = vec![types.loading.to_string(), types.get(terminal).to_string()];

        assert_eq!(
            seen, expected,
            "Expected phase sequence {expected:?} for {base}, but found {seen:?}"
        );
    }

    /// Assert that `action` carries a failure with the given message
    ///
    /// # Panics
    ///
    /// Panics if the action has no failure payload or the message differs.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_failure_message<S>(action: &Action<S>, message: &str) {
        match action.failure() {
            Some(failure) => assert_eq!(
                failure.message, message,
                "Unexpected failure message on {}",
                action.action_type
            ),
            None => panic!("Expected {} to carry a failure", action.action_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasewire_core::action::{Action, Payload, Phase};
    use phasewire_core::error::ApiFailure;
    use serde_json::json;

    #[derive(Clone, Debug)]
    struct TestState {
        count: i64,
    }

    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = Action<TestState>;

        fn reduce(&self, state: &mut Self::State, action: &Self::Action) {
            match action.action_type.as_str() {
                "INCREMENT" => state.count += 1,
                "ADD" => state.count += action.value().and_then(serde_json::Value::as_i64).unwrap_or(0),
                _ => {},
            }
        }
    }

    fn failed(action_type: &str, message: &str) -> Action<TestState> {
        Action {
            payload: Payload::Failure(ApiFailure {
                status: 500,
                message: message.to_string(),
                body: json!(null),
            }),
            ..Action::new(action_type)
        }
    }

    #[test]
    fn test_reducer_test_single_action() {
        ReducerTest::new(TestReducer)
            .given_state(TestState { count: 0 })
            .when_action(Action::new("INCREMENT"))
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_actions_apply_in_order() {
        ReducerTest::new(TestReducer)
            .given_state(TestState { count: 5 })
            .when_action(Action::with_value("ADD", json!(10)))
            .when_action(Action::new("INCREMENT"))
            .when_action(Action::new("UNKNOWN"))
            .then_state(|state| {
                assert_eq!(state.count, 16);
            })
            .run();
    }

    #[test]
    fn test_phase_sequence_ignores_unrelated_actions() {
        let actions = vec![
            Action::<TestState>::new("OTHER_LOADING"),
            Action::new("FETCH_LOADING"),
            Action::new("INCREMENT"),
            Action::new("FETCH_SUCCESS"),
        ];

        assertions::assert_phase_sequence(actions, "FETCH", Phase::Success);
    }

    #[test]
    #[should_panic(expected = "Expected phase sequence")]
    fn test_phase_sequence_rejects_missing_loading() {
        let actions = vec![Action::<TestState>::new("FETCH_ERROR")];

        assertions::assert_phase_sequence(actions, "FETCH", Phase::Error);
    }

    #[test]
    #[should_panic(expected = "Expected phase sequence")]
    fn test_phase_sequence_rejects_two_terminals() {
        let actions = vec![
            Action::<TestState>::new("FETCH_LOADING"),
            Action::new("FETCH_SUCCESS"),
            Action::new("FETCH_ERROR"),
        ];

        assertions::assert_phase_sequence(actions, "FETCH", Phase::Success);
    }

    #[test]
    fn test_failure_message() {
        assertions::assert_failure_message(&failed("FETCH_ERROR", "boom"), "boom");
    }

    #[test]
    #[should_panic(expected = "to carry a failure")]
    fn test_failure_message_requires_failure() {
        assertions::assert_failure_message(&Action::<TestState>::new("FETCH_ERROR"), "boom");
    }
}
