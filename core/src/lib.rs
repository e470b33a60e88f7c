//! # Libris Core
//!
//! The functional core of the Libris circulation service.
//!
//! Business rules are written as reducers: a reducer receives the current
//! state, an action and an environment of injected dependencies, mutates the
//! state in place and returns descriptions of side effects. The effects are
//! values; the runtime crate decides when and where they run.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state owned by a reducer
//! - **Action**: All inputs to a reducer (commands and the events they produce)
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies such as the clock
//!
//! ## Example
//!
//! ```
//! use libris_core::{effect::Effect, reducer::Reducer, SmallVec, smallvec};
//!
//! #[derive(Default)]
//! struct ShelfState {
//!     copies: u32,
//! }
//!
//! enum ShelfAction {
//!     Restock(u32),
//! }
//!
//! struct ShelfReducer;
//!
//! impl Reducer for ShelfReducer {
//!     type State = ShelfState;
//!     type Action = ShelfAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut ShelfState,
//!         action: ShelfAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<ShelfAction>; 4]> {
//!         match action {
//!             ShelfAction::Restock(n) => state.copies += n,
//!         }
//!         smallvec![Effect::None]
//!     }
//! }
//!
//! let mut state = ShelfState::default();
//! ShelfReducer.reduce(&mut state, ShelfAction::Restock(3), &());
//! assert_eq!(state.copies, 3);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - the trait every business rule set implements.
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They must not perform I/O; anything observable outside the state is
/// returned as an [`Effect`](crate::effect::Effect).
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// Validates the action, updates `state` in place and returns the
        /// effects the runtime should execute. Most actions produce zero or
        /// one effect, hence the inline capacity of four.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - side effect descriptions.
///
/// Effects are returned by reducers and executed by the runtime after the
/// reducer has finished. A reducer that needs to write an audit entry, for
/// example, returns an [`Effect::Future`] wrapping the write instead of
/// awaiting it.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is handed to the
        /// runtime's feedback channel.
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Wrap a future that performs work and never feeds an action back.
        ///
        /// Used for fire-and-forget writes such as audit entries.
        #[must_use]
        pub fn fire_and_forget<F>(fut: F) -> Effect<Action>
        where
            F: Future<Output = ()> + Send + 'static,
        {
            Effect::Future(Box::pin(async move {
                fut.await;
                None
            }))
        }

        /// Returns `true` if executing this effect does nothing.
        #[must_use]
        pub fn is_noop(&self) -> bool {
            match self {
                Effect::None => true,
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    effects.iter().all(Effect::is_noop)
                },
                Effect::Delay { .. } | Effect::Future(_) => false,
            }
        }
    }
}

/// Environment module - dependency injection traits.
///
/// All time-dependent decisions (due dates, overdue detection) read the
/// clock from the environment so tests can pin the calendar.
pub mod environment {
    use chrono::{DateTime, NaiveDate, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Current calendar date (UTC).
        fn today(&self) -> NaiveDate {
            self.now().date_naive()
        }
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
