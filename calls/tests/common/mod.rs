//! Shared fixtures for engine integration tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use chrono::Duration;
use skillswap_calls::memory::{
    InMemoryAccounts, InMemoryCallStore, InMemoryOfferings, StubMeetingProvisioner,
};
use skillswap_calls::{
    Call, CallEngine, CallKind, Collaborators, OfferingId, Points, ScheduleCall, UserId,
};
use skillswap_core::environment::Clock;
use skillswap_testing::{ManualClock, test_clock};
use std::sync::Arc;

/// Engine over in-memory collaborators with handles to each of them
pub struct Harness {
    pub engine: Arc<CallEngine>,
    pub store: Arc<InMemoryCallStore>,
    pub accounts: Arc<InMemoryAccounts>,
    pub offerings: Arc<InMemoryOfferings>,
    pub provisioner: Arc<StubMeetingProvisioner>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryCallStore::new());
        let accounts = Arc::new(InMemoryAccounts::new());
        let offerings = Arc::new(InMemoryOfferings::new());
        let provisioner = Arc::new(StubMeetingProvisioner::new());
        let clock = ManualClock::starting_at(test_clock().now());

        let engine = Arc::new(CallEngine::new(Collaborators {
            store: store.clone(),
            accounts: accounts.clone(),
            offerings: offerings.clone(),
            provisioner: provisioner.clone(),
            clock: Arc::new(clock.clone()),
        }));

        Self {
            engine,
            store,
            accounts,
            offerings,
            provisioner,
            clock,
        }
    }

    /// Open an account with `balance` points
    pub fn user(&self, balance: u64) -> UserId {
        let user = UserId::new();
        self.accounts.open(user, Points::new(balance));
        user
    }

    pub fn balance(&self, user: UserId) -> u64 {
        self.accounts.balance_of(user).expect("account exists").value()
    }

    pub fn offering(&self, price: u64) -> OfferingId {
        let offering = OfferingId::new();
        self.offerings.publish(offering, Points::new(price));
        offering
    }

    /// Schedule a call one hour from now
    pub async fn schedule(
        &self,
        owner: UserId,
        offering: OfferingId,
        kind: CallKind,
        capacity: u32,
    ) -> Call {
        self.engine
            .schedule_call(ScheduleCall {
                offering_id: offering,
                owner,
                kind,
                scheduled_time: self.clock.now() + Duration::hours(1),
                max_participants: capacity,
            })
            .await
            .expect("call scheduled")
    }

    /// Schedule, enroll every participant and start
    pub async fn started_call(
        &self,
        owner: UserId,
        price: u64,
        kind: CallKind,
        participants: &[UserId],
    ) -> Call {
        let offering = self.offering(price);
        let capacity = u32::try_from(participants.len()).unwrap().max(1);
        let call = self.schedule(owner, offering, kind, capacity).await;
        for participant in participants {
            self.engine.join_call(call.id, *participant).await.expect("joined");
        }
        self.engine
            .start_or_enter(call.id, owner)
            .await
            .expect("started")
    }

    /// Move the clock past the end of `call`'s slot
    pub fn pass_end_of(&self, call: &Call) {
        self.clock.set(call.ends_at().expect("slot end in range") + Duration::seconds(1));
    }
}
