//! The imperative shell around the call reducer.
//!
//! Every mutating operation follows the same path: take the call's lock, load
//! the record, drive the reducer and its ledger effects to completion, then
//! save the whole record. A rejected transition returns before anything is
//! saved. A save that fails after balances moved reverts those balances.

use crate::environment::{
    AccountDirectory, CallEnvironment, CallRecordStore, MeetingProvisioner, MeetingRequest,
    OfferingCatalog,
};
use crate::error::{CallError, Entity};
use crate::ledger::Ledger;
use crate::locks::CallLocks;
use crate::policy;
use crate::reducer::{CallAction, CallReducer, CallState};
use crate::types::{Call, CallId, CallStatus, LedgerEntry, OfferingId, ScheduleCall, UserId};
use chrono::{DateTime, Utc};
use skillswap_core::driver::run_to_completion;
use skillswap_core::environment::Clock;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Topic used for provisioned meetings unless configured otherwise
pub const DEFAULT_MEETING_TOPIC: &str = "Skill Swap Session";

/// Everything the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    /// Call records
    pub store: Arc<dyn CallRecordStore>,
    /// Point balances
    pub accounts: Arc<dyn AccountDirectory>,
    /// Offering prices
    pub offerings: Arc<dyn OfferingCatalog>,
    /// Meeting rooms
    pub provisioner: Arc<dyn MeetingProvisioner>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// Call lifecycle operations
pub struct CallEngine {
    store: Arc<dyn CallRecordStore>,
    accounts: Arc<dyn AccountDirectory>,
    offerings: Arc<dyn OfferingCatalog>,
    provisioner: Arc<dyn MeetingProvisioner>,
    clock: Arc<dyn Clock>,
    ledger: Arc<Ledger>,
    reducer: CallReducer,
    env: CallEnvironment,
    locks: CallLocks,
    meeting_topic: String,
}

impl CallEngine {
    /// Creates an engine over the given collaborators
    #[must_use]
    pub fn new(collaborators: Collaborators) -> Self {
        let Collaborators {
            store,
            accounts,
            offerings,
            provisioner,
            clock,
        } = collaborators;
        let ledger = Arc::new(Ledger::new(Arc::clone(&accounts)));
        let env = CallEnvironment::new(Arc::clone(&clock), Arc::clone(&ledger));

        Self {
            store,
            accounts,
            offerings,
            provisioner,
            clock,
            ledger,
            reducer: CallReducer::new(),
            env,
            locks: CallLocks::new(),
            meeting_topic: DEFAULT_MEETING_TOPIC.to_string(),
        }
    }

    /// Set the topic passed to the meeting provisioner
    #[must_use]
    pub fn with_meeting_topic(mut self, topic: impl Into<String>) -> Self {
        self.meeting_topic = topic.into();
        self
    }

    /// Current time according to the engine's clock
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The ledger all balance movements go through
    #[must_use]
    pub const fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Create a call from an offering
    ///
    /// The meeting is provisioned before anything is persisted, and without
    /// holding any lock.
    ///
    /// # Errors
    ///
    /// - `InvalidSchedule` for a capacity of zero or an end time out of range
    /// - `NotFound` for an unknown owner or offering
    /// - `ProvisioningFailed` if the meeting could not be created
    #[tracing::instrument(skip_all, fields(offering_id = %request.offering_id, owner = %request.owner))]
    pub async fn schedule_call(&self, request: ScheduleCall) -> Result<Call, CallError> {
        self.try_schedule(request)
            .await
            .inspect_err(|error| Self::record_rejection("schedule", error))
    }

    async fn try_schedule(&self, request: ScheduleCall) -> Result<Call, CallError> {
        if request.max_participants == 0 {
            return Err(CallError::InvalidSchedule(
                "a call needs room for at least one participant".to_string(),
            ));
        }
        if request
            .scheduled_time
            .checked_add_signed(policy::call_duration())
            .is_none()
        {
            return Err(CallError::InvalidSchedule(
                "the call would end outside the supported time range".to_string(),
            ));
        }
        if !self.accounts.exists(request.owner).await? {
            return Err(CallError::account_not_found(request.owner));
        }
        let offering_price = self
            .offerings
            .price(request.offering_id)
            .await?
            .ok_or_else(|| CallError::NotFound {
                entity: Entity::Offering,
                id: request.offering_id.to_string(),
            })?;

        let meeting = self
            .provisioner
            .provision(MeetingRequest {
                topic: self.meeting_topic.clone(),
                start_time: request.scheduled_time,
                duration_minutes: policy::DEFAULT_CALL_DURATION_MINUTES,
                max_participants: request.max_participants,
            })
            .await?;

        let call = Call::schedule(CallId::new(), &request, offering_price, meeting, self.clock.now());
        let saved = self.store.save(call).await?;

        metrics::counter!("calls.scheduled").increment(1);
        info!(
            call_id = %saved.id,
            participant_price = saved.participant_price.value(),
            capacity = saved.max_participants,
            "call scheduled"
        );
        Ok(saved)
    }

    /// Enroll a user
    ///
    /// # Errors
    ///
    /// `NotFound` (call or user), `CallInactive`, `CallNotJoinable`,
    /// `CallFull` or `AlreadyEnrolled`.
    #[tracing::instrument(skip_all, fields(call_id = %call_id, user = %user))]
    pub async fn join_call(&self, call_id: CallId, user: UserId) -> Result<Call, CallError> {
        let call = self
            .try_join(call_id, user)
            .await
            .inspect_err(|error| Self::record_rejection("join", error))?;
        metrics::counter!("calls.joined").increment(1);
        info!(participants = call.current_participants, "participant joined");
        Ok(call)
    }

    async fn try_join(&self, call_id: CallId, user: UserId) -> Result<Call, CallError> {
        let _guard = self.locks.acquire(call_id).await;
        let call = self.store.get(call_id).await?;
        if !self.accounts.exists(user).await? {
            return Err(CallError::account_not_found(user));
        }
        let (call, _) = self.transition(call, CallAction::Join { user }).await?;
        Ok(call)
    }

    /// Withdraw a participant from a scheduled call
    ///
    /// # Errors
    ///
    /// `NotFound`, `CallInactive`, `InvalidTransition` or `NotEnrolled`.
    #[tracing::instrument(skip_all, fields(call_id = %call_id, user = %user))]
    pub async fn leave_call(&self, call_id: CallId, user: UserId) -> Result<Call, CallError> {
        let (call, _) = self
            .locked(call_id, CallAction::Leave { user })
            .await
            .inspect_err(|error| Self::record_rejection("leave", error))?;
        metrics::counter!("calls.left").increment(1);
        info!(participants = call.current_participants, "participant left");
        Ok(call)
    }

    /// Start the call if `caller` is the owner and it is scheduled,
    /// otherwise return it unchanged
    ///
    /// Starting reserves the participant price from every participant, all
    /// or nothing.
    ///
    /// # Errors
    ///
    /// `NotFound`, `CallInactive`, `Unauthorized` for non-members, or
    /// `InsufficientBalance` naming the first underfunded participant.
    #[tracing::instrument(skip_all, fields(call_id = %call_id, caller = %caller))]
    pub async fn start_or_enter(&self, call_id: CallId, caller: UserId) -> Result<Call, CallError> {
        let (call, started) = self
            .locked(call_id, CallAction::Start { caller })
            .await
            .inspect_err(|error| Self::record_rejection("start", error))?;

        if started {
            metrics::counter!("calls.started").increment(1);
            info!(participants = call.current_participants, "call started");
        }
        Ok(call)
    }

    /// Settle an in-progress call
    ///
    /// Participants not in `attended` pay the no-show penalty. Ids that are
    /// not participants are ignored.
    ///
    /// # Errors
    ///
    /// `NotFound`, `CallInactive`, `AlreadyCompleted` or `InvalidTransition`.
    #[tracing::instrument(skip_all, fields(call_id = %call_id, attended = attended.len()))]
    pub async fn complete_call(
        &self,
        call_id: CallId,
        attended: Vec<UserId>,
    ) -> Result<Call, CallError> {
        let (call, _) = self
            .locked(call_id, CallAction::Complete { attended })
            .await
            .inspect_err(|error| Self::record_rejection("complete", error))?;
        Self::record_completion(&call, "manual");
        Ok(call)
    }

    /// Cancel a call; an in-progress call refunds every reservation
    ///
    /// # Errors
    ///
    /// `NotFound`, `CallInactive`, `Unauthorized` for anyone but the owner,
    /// or `InvalidTransition` for a completed or cancelled call.
    #[tracing::instrument(skip_all, fields(call_id = %call_id, caller = %caller))]
    pub async fn cancel_call(&self, call_id: CallId, caller: UserId) -> Result<Call, CallError> {
        let (call, _) = self
            .locked(call_id, CallAction::Cancel { caller })
            .await
            .inspect_err(|error| Self::record_rejection("cancel", error))?;
        metrics::counter!("calls.cancelled").increment(1);
        info!(refunds = call.ledger_trail.len(), "call cancelled");
        Ok(call)
    }

    /// Soft-remove a call
    ///
    /// Deactivating an inactive call returns it unchanged.
    ///
    /// # Errors
    ///
    /// `NotFound` if the call does not exist.
    #[tracing::instrument(skip_all, fields(call_id = %call_id))]
    pub async fn deactivate_call(&self, call_id: CallId) -> Result<Call, CallError> {
        self.deactivate_one(call_id)
            .await
            .map(|(call, _)| call)
            .inspect_err(|error| Self::record_rejection("deactivate", error))
    }

    /// Deactivate every call created from an offering
    ///
    /// Each call is locked on its own. Returns how many calls were active
    /// before this run; running it again returns zero.
    ///
    /// # Errors
    ///
    /// Stops at the first call that cannot be deactivated. Calls handled
    /// before it stay deactivated and a rerun picks up the rest.
    #[tracing::instrument(skip_all, fields(offering_id = %offering))]
    pub async fn deactivate_calls_for_offering(
        &self,
        offering: OfferingId,
    ) -> Result<usize, CallError> {
        let calls = self.store.find_by_offering(offering).await?;
        let mut deactivated = 0;

        for call in calls.iter().filter(|call| call.active) {
            let (_, was_active) = self
                .deactivate_one(call.id)
                .await
                .inspect_err(|error| Self::record_rejection("deactivate", error))?;
            if was_active {
                deactivated += 1;
            }
        }

        info!(deactivated, total = calls.len(), "offering calls deactivated");
        Ok(deactivated)
    }

    /// Complete a call on behalf of the sweeper, if it is still due at `now`
    ///
    /// The record is reloaded under the call's lock, so a call completed or
    /// cancelled by a user in the meantime is left alone and `None` is
    /// returned. Every participant counts as attended.
    ///
    /// # Errors
    ///
    /// Any error from loading, settling or saving the call.
    #[tracing::instrument(skip_all, fields(call_id = %call_id))]
    pub async fn complete_elapsed(
        &self,
        call_id: CallId,
        now: DateTime<Utc>,
    ) -> Result<Option<Call>, CallError> {
        let _guard = self.locks.acquire(call_id).await;
        let call = self.store.get(call_id).await?;
        if !call.is_due_for_auto_completion(now) {
            return Ok(None);
        }

        let attended = call.participants.clone();
        let (call, _) = self
            .transition(call, CallAction::Complete { attended })
            .await?;
        Self::record_completion(&call, "sweeper");
        Ok(Some(call))
    }

    /// Load one call
    ///
    /// # Errors
    ///
    /// `NotFound` if the call does not exist.
    pub async fn get_call(&self, call_id: CallId) -> Result<Call, CallError> {
        Ok(self.store.get(call_id).await?)
    }

    /// Calls a user is enrolled in
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_calls_for_participant(&self, user: UserId) -> Result<Vec<Call>, CallError> {
        Ok(self.store.find_by_participant(user).await?)
    }

    /// Calls created from an offering
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn list_calls_for_offering(
        &self,
        offering: OfferingId,
    ) -> Result<Vec<Call>, CallError> {
        Ok(self.store.find_by_offering(offering).await?)
    }

    /// Active calls currently running
    ///
    /// # Errors
    ///
    /// Store failures.
    pub async fn in_progress_calls(&self) -> Result<Vec<Call>, CallError> {
        Ok(self
            .store
            .find_active_by_status(CallStatus::InProgress)
            .await?)
    }

    async fn locked(
        &self,
        call_id: CallId,
        action: CallAction,
    ) -> Result<(Call, bool), CallError> {
        let _guard = self.locks.acquire(call_id).await;
        let call = self.store.get(call_id).await?;
        self.transition(call, action).await
    }

    async fn deactivate_one(&self, call_id: CallId) -> Result<(Call, bool), CallError> {
        let _guard = self.locks.acquire(call_id).await;
        let call = self.store.get(call_id).await?;
        let (call, was_active) = self.transition(call, CallAction::Deactivate).await?;
        if was_active {
            metrics::counter!("calls.deactivated").increment(1);
            info!(call_id = %call.id, status = %call.status, "call deactivated");
        }
        Ok((call, was_active))
    }

    /// Drive one action to completion and persist the result
    ///
    /// Returns the stored record and whether it changed. Callers must hold
    /// the call's lock.
    async fn transition(
        &self,
        call: Call,
        action: CallAction,
    ) -> Result<(Call, bool), CallError> {
        let mut state = CallState::new(call);
        run_to_completion(&self.reducer, &mut state, action, &self.env).await;

        if let Some(error) = state.last_error.take() {
            if !state.applied.is_empty() {
                self.compensate(state.call.id, &state.applied).await;
            }
            return Err(error);
        }
        if !state.changed {
            return Ok((state.call, false));
        }

        let call_id = state.call.id;
        match self.store.save(state.call).await {
            Ok(saved) => Ok((saved, true)),
            Err(error) => {
                warn!(%call_id, %error, entries = state.applied.len(), "saving call failed");
                if !state.applied.is_empty() {
                    self.compensate(call_id, &state.applied).await;
                }
                Err(error.into())
            },
        }
    }

    async fn compensate(&self, call_id: CallId, entries: &[LedgerEntry]) {
        if let Err(error) = self.ledger.revert(entries).await {
            error!(%call_id, %error, "ledger reversal failed, balances need manual repair");
        }
    }

    fn record_rejection(operation: &'static str, error: &CallError) {
        metrics::counter!("calls.rejected", "operation" => operation, "reason" => error.reason())
            .increment(1);
        warn!(operation, reason = error.reason(), %error, "call operation rejected");
    }

    fn record_completion(call: &Call, trigger: &'static str) {
        metrics::counter!("calls.completed", "trigger" => trigger).increment(1);
        info!(
            call_id = %call.id,
            trigger,
            entries = call.ledger_trail.len(),
            "call completed"
        );
    }
}

impl std::fmt::Debug for CallEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallEngine")
            .field("meeting_topic", &self.meeting_topic)
            .finish_non_exhaustive()
    }
}
