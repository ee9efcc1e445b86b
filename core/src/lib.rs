//! # Skillswap Core
//!
//! Functional core used by the call lifecycle engine.
//!
//! Business rules live in reducers: pure functions that validate an action,
//! mutate state in place and describe the side effects that should follow.
//! The imperative shell executes those effects and feeds any resulting
//! actions back into the reducer until the transition settles.
//!
//! ## Core Concepts
//!
//! - **State**: the record being transitioned
//! - **Action**: commands (requests) and events (facts), in one enum
//! - **Reducer**: `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: a description of async work, not its execution
//! - **Environment**: injected dependencies such as the [`environment::Clock`]
//!
//! ## Example
//!
//! ```ignore
//! use skillswap_core::{driver, reducer::Reducer};
//!
//! let mut state = CallState::new(call);
//! driver::run_to_completion(&CallReducer, &mut state, CallAction::Deactivate, &env).await;
//! assert!(!state.call.active);
//! ```

pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// The reducer trait: all business logic goes through it.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Core abstraction for business logic
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
        /// effects to execute. Most actions produce zero or one effect, so
        /// the return type stays on the stack.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Side effect descriptions returned by reducers.
pub mod effect {
    use futures::future::BoxFuture;
    use std::future::Future;
    use std::pin::Pin;

    /// Describes a side effect to be executed by the shell
    ///
    /// Effects are values. Nothing runs until [`Effect::execute`] is awaited.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects concurrently
        Parallel(Vec<Effect<Action>>),

        /// Run effects one after another
        Sequential(Vec<Effect<Action>>),

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>`: if `Some`, the action is fed back into the reducer
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

        /// Whether this effect does nothing
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }

    impl<Action: Send + 'static> Effect<Action> {
        /// Wrap an async computation as an effect
        pub fn future<F>(fut: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(fut))
        }

        /// Execute the effect, collecting the actions it produces
        ///
        /// `Sequential` preserves order. `Parallel` runs its children
        /// concurrently and returns their actions in declaration order.
        pub fn execute(self) -> BoxFuture<'static, Vec<Action>> {
            Box::pin(async move {
                match self {
                    Effect::None => Vec::new(),
                    Effect::Future(fut) => fut.await.into_iter().collect(),
                    Effect::Sequential(effects) => {
                        let mut actions = Vec::new();
                        for effect in effects {
                            actions.extend(effect.execute().await);
                        }
                        actions
                    },
                    Effect::Parallel(effects) => {
                        futures::future::join_all(effects.into_iter().map(Effect::execute))
                            .await
                            .into_iter()
                            .flatten()
                            .collect()
                    },
                }
            })
        }
    }
}

/// Dependency injection traits shared by every environment.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

/// Inline effect execution.
///
/// Runs one action through a reducer and keeps executing the returned effects,
/// feeding their actions back, until nothing is left to do. The caller owns the
/// state for the whole run, so a transition is observed either fully settled or
/// not at all.
pub mod driver {
    use super::effect::Effect;
    use super::reducer::Reducer;
    use std::collections::VecDeque;

    /// Drive `action` and every action it causes through `reducer`
    ///
    /// Actions are processed in FIFO order. Returns the number of actions
    /// reduced, including the initial one.
    pub async fn run_to_completion<R>(
        reducer: &R,
        state: &mut R::State,
        action: R::Action,
        env: &R::Environment,
    ) -> usize
    where
        R: Reducer,
        R::Action: Send + 'static,
    {
        let mut pending = VecDeque::from([action]);
        let mut reduced = 0;

        while let Some(action) = pending.pop_front() {
            reduced += 1;
            let effects = reducer.reduce(state, action, env);
            for effect in effects {
                if effect.is_none() {
                    continue;
                }
                pending.extend(Effect::execute(effect).await);
            }
        }

        reduced
    }
}
