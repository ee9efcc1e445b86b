//! In-memory collaborators for development and testing.
//!
//! Each adapter can be told to fail, so tests can exercise the engine's
//! compensation paths without a real backend.

use crate::environment::{
    AccountDirectory, CallRecordStore, MeetingProvisioner, MeetingRequest, OfferingCatalog,
};
use crate::error::{AccountError, CatalogError, ProvisioningError, StoreError};
use crate::types::{Call, CallId, CallStatus, MeetingDetails, OfferingId, Points, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

/// Call records in a map, with optimistic version checks
#[derive(Debug, Default)]
pub struct InMemoryCallStore {
    calls: RwLock<HashMap<CallId, Call>>,
    fail_saves: AtomicBool,
}

impl InMemoryCallStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `save` fail with a backend error
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of stored calls
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite a record without a version check
    pub fn put(&self, call: Call) {
        self.calls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(call.id, call);
    }

    fn select(&self, predicate: impl Fn(&Call) -> bool) -> Vec<Call> {
        let calls = self.calls.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<Call> = calls.values().filter(|&c| predicate(c)).cloned().collect();
        found.sort_by_key(|c| (c.scheduled_time, c.id));
        found
    }
}

#[async_trait]
impl CallRecordStore for InMemoryCallStore {
    async fn get(&self, id: CallId) -> Result<Call, StoreError> {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn save(&self, mut call: Call) -> Result<Call, StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected save failure".to_string()));
        }

        let mut calls = self.calls.write().unwrap_or_else(PoisonError::into_inner);
        let stored = calls.get(&call.id).map_or(0, |existing| existing.version);
        if stored != call.version {
            return Err(StoreError::VersionConflict {
                id: call.id,
                expected: call.version,
                actual: stored,
            });
        }

        call.version += 1;
        calls.insert(call.id, call.clone());
        Ok(call)
    }

    async fn find_active_by_status(&self, status: CallStatus) -> Result<Vec<Call>, StoreError> {
        Ok(self.select(|c| c.active && c.status == status))
    }

    async fn find_by_offering(&self, offering: OfferingId) -> Result<Vec<Call>, StoreError> {
        Ok(self.select(|c| c.offering_id == offering))
    }

    async fn find_by_participant(&self, user: UserId) -> Result<Vec<Call>, StoreError> {
        Ok(self.select(|c| c.is_enrolled(user)))
    }
}

/// Point balances in a map
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    balances: RwLock<HashMap<UserId, Points>>,
    failing_writes: RwLock<HashSet<UserId>>,
}

impl InMemoryAccounts {
    /// Creates an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or reset an account
    pub fn open(&self, user: UserId, balance: Points) {
        self.balances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user, balance);
    }

    /// Remove an account
    pub fn close(&self, user: UserId) {
        self.balances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user);
    }

    /// Current balance, without going through the async trait
    #[must_use]
    pub fn balance_of(&self, user: UserId) -> Option<Points> {
        self.balances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user)
            .copied()
    }

    /// Sum of every balance
    #[must_use]
    pub fn total(&self) -> Points {
        self.balances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .copied()
            .sum()
    }

    /// Make writes to `user` fail until [`InMemoryAccounts::heal`] is called
    pub fn fail_writes_for(&self, user: UserId) {
        self.failing_writes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user);
    }

    /// Clear all injected write failures
    pub fn heal(&self) {
        self.failing_writes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccounts {
    async fn exists(&self, user: UserId) -> Result<bool, AccountError> {
        Ok(self.balance_of(user).is_some())
    }

    async fn balance(&self, user: UserId) -> Result<Option<Points>, AccountError> {
        Ok(self.balance_of(user))
    }

    async fn set_balance(&self, user: UserId, balance: Points) -> Result<(), AccountError> {
        let failing = self
            .failing_writes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&user);
        if failing {
            return Err(AccountError::Unavailable {
                account: user,
                reason: "injected write failure".to_string(),
            });
        }
        self.open(user, balance);
        Ok(())
    }
}

/// Offering prices in a map
#[derive(Debug, Default)]
pub struct InMemoryOfferings {
    prices: RwLock<HashMap<OfferingId, Points>>,
}

impl InMemoryOfferings {
    /// Creates an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish or reprice an offering
    pub fn publish(&self, offering: OfferingId, price: Points) {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(offering, price);
    }
}

#[async_trait]
impl OfferingCatalog for InMemoryOfferings {
    async fn price(&self, offering: OfferingId) -> Result<Option<Points>, CatalogError> {
        Ok(self
            .prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&offering)
            .copied())
    }
}

/// Meeting provisioner that fabricates rooms locally
#[derive(Debug, Default)]
pub struct StubMeetingProvisioner {
    failing: AtomicBool,
    provisioned: AtomicUsize,
}

impl StubMeetingProvisioner {
    /// Creates a provisioner that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle failure injection
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of rooms created so far
    #[must_use]
    pub fn provisioned(&self) -> usize {
        self.provisioned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MeetingProvisioner for StubMeetingProvisioner {
    async fn provision(&self, request: MeetingRequest) -> Result<MeetingDetails, ProvisioningError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProvisioningError::Unavailable(
                "stub provisioner is failing".to_string(),
            ));
        }

        let room = uuid::Uuid::new_v4().simple().to_string();
        let meeting_id = room[..11].to_string();
        let details = MeetingDetails {
            join_url: format!("https://meet.example.com/j/{meeting_id}"),
            password: room[11..19].to_string(),
            host_key: room[19..25].to_string(),
            meeting_id,
        };
        self.provisioned.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(
            topic = %request.topic,
            start_time = %request.start_time,
            meeting_id = %details.meeting_id,
            "stub meeting provisioned"
        );
        Ok(details)
    }
}
