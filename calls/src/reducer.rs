//! The call state machine.
//!
//! ```text
//! Scheduled ──Start(owner)──▶ InProgress ──Complete──▶ Completed
//!     │                           │
//!     └────────Cancel(owner)──────┴──────────────────▶ Cancelled
//! ```
//!
//! Join and Leave only apply while `Scheduled`. Deactivate clears the active
//! flag from any status and blocks every later mutation. Ledger work runs in
//! an effect; its outcome comes back as an event that moves the status, so a
//! call never changes status without its balances having moved.

use crate::environment::CallEnvironment;
use crate::error::CallError;
use crate::ledger::Posting;
use crate::settlement;
use crate::types::{Call, CallStatus, LedgerEntry, UserId};
use chrono::{DateTime, Utc};
use skillswap_core::{SmallVec, effect::Effect, reducer::Reducer};
use std::sync::Arc;

/// One call being transitioned
#[derive(Clone, Debug)]
pub struct CallState {
    /// Working copy of the record
    pub call: Call,
    /// Set when the last command or effect was rejected
    pub last_error: Option<CallError>,
    /// Whether the record differs from what was loaded
    pub changed: bool,
    /// Ledger entries committed during this transition
    pub applied: Vec<LedgerEntry>,
}

impl CallState {
    /// Wrap a freshly loaded record
    #[must_use]
    pub const fn new(call: Call) -> Self {
        Self {
            call,
            last_error: None,
            changed: false,
            applied: Vec::new(),
        }
    }
}

/// Commands and events for a call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallAction {
    // ========== Commands ==========
    /// Enroll a participant
    Join {
        /// Joining user
        user: UserId,
    },
    /// Withdraw a participant
    Leave {
        /// Leaving user
        user: UserId,
    },
    /// Owner starts the call, or a member enters it
    Start {
        /// Requesting principal
        caller: UserId,
    },
    /// Settle the call
    Complete {
        /// Participants who showed up
        attended: Vec<UserId>,
    },
    /// Owner calls the session off
    Cancel {
        /// Requesting principal
        caller: UserId,
    },
    /// Soft-remove the call
    Deactivate,

    // ========== Events ==========
    /// A participant was enrolled
    ParticipantJoined {
        /// Enrolled user
        user: UserId,
    },
    /// A participant was withdrawn
    ParticipantLeft {
        /// Withdrawn user
        user: UserId,
    },
    /// A member entered without changing the call
    CallEntered {
        /// Entering user
        caller: UserId,
    },
    /// Every participant paid; the call is running
    FundsReserved {
        /// Start timestamp
        started_at: DateTime<Utc>,
        /// Reservation entries
        entries: Vec<LedgerEntry>,
    },
    /// Penalties and revenue are on the ledger
    SettlementApplied {
        /// Completion timestamp
        completed_at: DateTime<Utc>,
        /// Settlement entries
        entries: Vec<LedgerEntry>,
    },
    /// The owner cancelled; reservations, if any, were refunded
    CallCancelled {
        /// Cancellation timestamp
        cancelled_at: DateTime<Utc>,
        /// Refund entries
        entries: Vec<LedgerEntry>,
    },
    /// The call was soft-removed
    CallDeactivated {
        /// Deactivation timestamp
        deactivated_at: DateTime<Utc>,
    },
    /// A command or ledger effect was refused
    TransitionRejected {
        /// Why
        error: CallError,
    },
}

impl CallAction {
    /// Whether this is a request rather than a fact
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::Join { .. }
                | Self::Leave { .. }
                | Self::Start { .. }
                | Self::Complete { .. }
                | Self::Cancel { .. }
                | Self::Deactivate
        )
    }

    /// Whether this is a fact produced by a command or effect
    #[must_use]
    pub const fn is_event(&self) -> bool {
        !self.is_command()
    }
}

/// What a valid `Start` leads to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StartOutcome {
    Reserve,
    Enter,
}

/// What a valid `Cancel` leads to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CancelOutcome {
    Withdraw,
    Refund,
}

/// Reducer for a single call
#[derive(Clone, Debug, Default)]
pub struct CallReducer;

impl CallReducer {
    /// Creates a new `CallReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_join(call: &Call, user: UserId) -> Result<(), CallError> {
        if !call.active {
            return Err(CallError::CallInactive(call.id));
        }
        if call.status != CallStatus::Scheduled {
            return Err(CallError::CallNotJoinable(call.status));
        }
        if call.is_full() {
            return Err(CallError::CallFull {
                capacity: call.max_participants,
            });
        }
        if call.is_enrolled(user) {
            return Err(CallError::AlreadyEnrolled(user));
        }
        Ok(())
    }

    fn validate_leave(call: &Call, user: UserId) -> Result<(), CallError> {
        if !call.active {
            return Err(CallError::CallInactive(call.id));
        }
        if call.status != CallStatus::Scheduled {
            return Err(CallError::InvalidTransition {
                from: call.status,
                action: "leave",
            });
        }
        if !call.is_enrolled(user) {
            return Err(CallError::NotEnrolled(user));
        }
        Ok(())
    }

    fn validate_start(call: &Call, caller: UserId) -> Result<StartOutcome, CallError> {
        if !call.active {
            return Err(CallError::CallInactive(call.id));
        }
        if !call.is_member(caller) {
            return Err(CallError::Unauthorized(caller));
        }
        if call.is_owner(caller) && call.status == CallStatus::Scheduled {
            Ok(StartOutcome::Reserve)
        } else {
            Ok(StartOutcome::Enter)
        }
    }

    fn validate_complete(call: &Call) -> Result<(), CallError> {
        if !call.active {
            return Err(CallError::CallInactive(call.id));
        }
        match call.status {
            CallStatus::InProgress => Ok(()),
            CallStatus::Completed => Err(CallError::AlreadyCompleted(call.id)),
            from @ (CallStatus::Scheduled | CallStatus::Cancelled) => {
                Err(CallError::InvalidTransition {
                    from,
                    action: "complete",
                })
            },
        }
    }

    fn validate_cancel(call: &Call, caller: UserId) -> Result<CancelOutcome, CallError> {
        if !call.active {
            return Err(CallError::CallInactive(call.id));
        }
        if !call.is_owner(caller) {
            return Err(CallError::Unauthorized(caller));
        }
        match call.status {
            CallStatus::Scheduled => Ok(CancelOutcome::Withdraw),
            CallStatus::InProgress => Ok(CancelOutcome::Refund),
            from @ (CallStatus::Completed | CallStatus::Cancelled) => {
                Err(CallError::InvalidTransition {
                    from,
                    action: "cancel",
                })
            },
        }
    }

    /// Applies an event to state
    fn apply_event(state: &mut CallState, action: &CallAction) {
        let call = &mut state.call;
        match action {
            CallAction::ParticipantJoined { user } => {
                call.enroll(*user);
                state.changed = true;
                state.last_error = None;
            },
            CallAction::ParticipantLeft { user } => {
                call.withdraw(*user);
                state.changed = true;
                state.last_error = None;
            },
            CallAction::CallEntered { .. } => {
                state.last_error = None;
            },
            CallAction::FundsReserved {
                started_at,
                entries,
            } => {
                call.status = CallStatus::InProgress;
                call.started_at = Some(*started_at);
                Self::record_entries(state, entries);
            },
            CallAction::SettlementApplied {
                completed_at,
                entries,
            } => {
                call.status = CallStatus::Completed;
                call.completed_at = Some(*completed_at);
                Self::record_entries(state, entries);
            },
            CallAction::CallCancelled {
                cancelled_at,
                entries,
            } => {
                call.status = CallStatus::Cancelled;
                call.cancelled_at = Some(*cancelled_at);
                Self::record_entries(state, entries);
            },
            CallAction::CallDeactivated { deactivated_at } => {
                call.active = false;
                call.deactivated_at = Some(*deactivated_at);
                state.changed = true;
                state.last_error = None;
            },
            CallAction::TransitionRejected { error } => {
                state.last_error = Some(error.clone());
            },
            // Commands are not applied to state
            CallAction::Join { .. }
            | CallAction::Leave { .. }
            | CallAction::Start { .. }
            | CallAction::Complete { .. }
            | CallAction::Cancel { .. }
            | CallAction::Deactivate => {},
        }
    }

    fn record_entries(state: &mut CallState, entries: &[LedgerEntry]) {
        state.call.ledger_trail.extend_from_slice(entries);
        state.applied.extend_from_slice(entries);
        state.changed = true;
        state.last_error = None;
    }

    fn reject(state: &mut CallState, error: CallError) -> SmallVec<[Effect<CallAction>; 4]> {
        Self::apply_event(state, &CallAction::TransitionRejected { error });
        SmallVec::new()
    }

    fn emit(state: &mut CallState, event: &CallAction) -> SmallVec<[Effect<CallAction>; 4]> {
        Self::apply_event(state, event);
        SmallVec::new()
    }

    /// Apply `postings` on the ledger, then report back with `on_success`
    fn post<F>(env: &CallEnvironment, postings: Vec<Posting>, on_success: F) -> Effect<CallAction>
    where
        F: FnOnce(Vec<LedgerEntry>) -> CallAction + Send + 'static,
    {
        let ledger = Arc::clone(&env.ledger);
        Effect::future(async move {
            Some(match ledger.apply(&postings).await {
                Ok(entries) => on_success(entries),
                Err(error) => CallAction::TransitionRejected { error },
            })
        })
    }
}

impl Reducer for CallReducer {
    type State = CallState;
    type Action = CallAction;
    type Environment = CallEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            CallAction::Join { user } => match Self::validate_join(&state.call, user) {
                Ok(()) => Self::emit(state, &CallAction::ParticipantJoined { user }),
                Err(error) => Self::reject(state, error),
            },

            CallAction::Leave { user } => match Self::validate_leave(&state.call, user) {
                Ok(()) => Self::emit(state, &CallAction::ParticipantLeft { user }),
                Err(error) => Self::reject(state, error),
            },

            CallAction::Start { caller } => match Self::validate_start(&state.call, caller) {
                Ok(StartOutcome::Enter) => Self::emit(state, &CallAction::CallEntered { caller }),
                Ok(StartOutcome::Reserve) => {
                    let started_at = env.clock.now();
                    let postings = settlement::reservation_postings(&state.call);
                    smallvec::smallvec![Self::post(env, postings, move |entries| {
                        CallAction::FundsReserved {
                            started_at,
                            entries,
                        }
                    })]
                },
                Err(error) => Self::reject(state, error),
            },

            CallAction::Complete { attended } => match Self::validate_complete(&state.call) {
                Ok(()) => {
                    let completed_at = env.clock.now();
                    let plan = settlement::plan_completion(&state.call, &attended);
                    tracing::debug!(
                        call_id = %state.call.id,
                        no_shows = plan.no_shows.len(),
                        owner_revenue = plan.owner_revenue.value(),
                        "settlement planned"
                    );
                    smallvec::smallvec![Self::post(env, plan.postings, move |entries| {
                        CallAction::SettlementApplied {
                            completed_at,
                            entries,
                        }
                    })]
                },
                Err(error) => Self::reject(state, error),
            },

            CallAction::Cancel { caller } => match Self::validate_cancel(&state.call, caller) {
                Ok(CancelOutcome::Withdraw) => Self::emit(
                    state,
                    &CallAction::CallCancelled {
                        cancelled_at: env.clock.now(),
                        entries: Vec::new(),
                    },
                ),
                Ok(CancelOutcome::Refund) => {
                    let cancelled_at = env.clock.now();
                    let postings = settlement::refund_postings(&state.call);
                    smallvec::smallvec![Self::post(env, postings, move |entries| {
                        CallAction::CallCancelled {
                            cancelled_at,
                            entries,
                        }
                    })]
                },
                Err(error) => Self::reject(state, error),
            },

            CallAction::Deactivate => {
                if state.call.active {
                    Self::emit(
                        state,
                        &CallAction::CallDeactivated {
                            deactivated_at: env.clock.now(),
                        },
                    )
                } else {
                    SmallVec::new()
                }
            },

            // ========== Events ==========
            CallAction::ParticipantJoined { .. }
            | CallAction::ParticipantLeft { .. }
            | CallAction::CallEntered { .. }
            | CallAction::FundsReserved { .. }
            | CallAction::SettlementApplied { .. }
            | CallAction::CallCancelled { .. }
            | CallAction::CallDeactivated { .. }
            | CallAction::TransitionRejected { .. } => Self::emit(state, &action),
        }
    }
}
