//! Reducer composition utilities
//!
//! - **`combine_reducers`**: run several reducers on the same state and action
//! - **`scope_reducer`**: focus a reducer on a slice of a larger state
//!
//! # Example
//!
//! ```
//! use phasewire_core::action::Action;
//! use phasewire_core::composition::{combine_reducers, scope_reducer};
//! use phasewire_core::handler::HandlerTable;
//! use phasewire_core::reducer::Reducer;
//!
//! #[derive(Clone, Default)]
//! struct App {
//!     count: i64,
//!     title: String,
//! }
//!
//! let counter = scope_reducer(
//!     HandlerTable::<i64, App>::new().on("INCREMENT", |count: &mut i64, _: &Action<App>| *count += 1),
//!     |app: &App| &app.count,
//!     |app: &mut App, count| app.count = count,
//! );
//! let title = HandlerTable::<App>::new().on("RENAME", |app: &mut App, _: &Action<App>| {
//!     app.title = "renamed".to_string();
//! });
//!
//! let reducer = combine_reducers(vec![Box::new(counter), Box::new(title)]);
//! let mut app = App::default();
//! reducer.reduce(&mut app, &Action::new("INCREMENT"));
//! reducer.reduce(&mut app, &Action::new("RENAME"));
//! assert_eq!(app.count, 1);
//! assert_eq!(app.title, "renamed");
//! ```

use crate::reducer::Reducer;
use std::marker::PhantomData;

/// Boxed reducer over state `S` and action `A`
pub type BoxedReducer<S, A> = Box<dyn Reducer<State = S, Action = A> + Send + Sync>;

/// Combines reducers that operate on the same state and action types.
///
/// Reducers run in the order given.
#[must_use]
pub fn combine_reducers<S, A>(reducers: Vec<BoxedReducer<S, A>>) -> CombinedReducer<S, A> {
    CombinedReducer { reducers }
}

/// Reducers run in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A> {
    reducers: Vec<BoxedReducer<S, A>>,
}

impl<S, A> Reducer for CombinedReducer<S, A> {
    type State = S;
    type Action = A;

    fn reduce(&self, state: &mut S, action: &A) {
        for reducer in &self.reducers {
            reducer.reduce(state, action);
        }
    }
}

/// Scopes a reducer to a subset of a larger state.
///
/// The sub-state is cloned out with `get_state`, reduced, and written back
/// with `set_state`.
#[must_use]
pub fn scope_reducer<S, SubS, R>(
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
) -> ScopedReducer<S, SubS, R>
where
    SubS: Clone,
    R: Reducer<State = SubS>,
{
    ScopedReducer {
        reducer,
        get_state,
        set_state,
        _state: PhantomData,
    }
}

/// A reducer operating on a slice of state.
///
/// Created by [`scope_reducer`].
pub struct ScopedReducer<S, SubS, R> {
    reducer: R,
    get_state: fn(&S) -> &SubS,
    set_state: fn(&mut S, SubS),
    _state: PhantomData<fn(&mut S)>,
}

impl<S, SubS, R> Reducer for ScopedReducer<S, SubS, R>
where
    SubS: Clone,
    R: Reducer<State = SubS>,
{
    type State = S;
    type Action = R::Action;

    fn reduce(&self, state: &mut S, action: &R::Action) {
        let mut sub_state = (self.get_state)(state).clone();
        self.reducer.reduce(&mut sub_state, action);
        (self.set_state)(state, sub_state);
    }
}
