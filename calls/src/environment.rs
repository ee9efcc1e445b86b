//! Collaborator traits and the reducer environment.
//!
//! The engine owns no storage of its own. Call records, balances, offering
//! prices and meeting rooms all live behind these traits, so production
//! adapters and the in-memory ones in [`crate::memory`] are interchangeable.

use crate::error::{AccountError, CatalogError, ProvisioningError, StoreError};
use crate::ledger::Ledger;
use crate::types::{Call, CallId, CallStatus, MeetingDetails, OfferingId, Points, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skillswap_core::environment::Clock;
use std::sync::Arc;

/// Durable call records
///
/// `save` replaces the whole record atomically. A record whose `version`
/// differs from the stored one is rejected with
/// [`StoreError::VersionConflict`]; on success the stored copy, with its
/// version bumped, is returned.
#[async_trait]
pub trait CallRecordStore: Send + Sync {
    /// Load one call
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no record exists.
    async fn get(&self, id: CallId) -> Result<Call, StoreError>;

    /// Insert or replace a call
    ///
    /// # Errors
    ///
    /// [`StoreError::VersionConflict`] on a stale version.
    async fn save(&self, call: Call) -> Result<Call, StoreError>;

    /// Active calls in the given status
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn find_active_by_status(&self, status: CallStatus) -> Result<Vec<Call>, StoreError>;

    /// Every call created from an offering, active or not
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn find_by_offering(&self, offering: OfferingId) -> Result<Vec<Call>, StoreError>;

    /// Every call a user is enrolled in
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn find_by_participant(&self, user: UserId) -> Result<Vec<Call>, StoreError>;
}

/// Point balances owned by the user-management side
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Whether the account exists
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn exists(&self, user: UserId) -> Result<bool, AccountError>;

    /// Current balance, `None` for an unknown account
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn balance(&self, user: UserId) -> Result<Option<Points>, AccountError>;

    /// Overwrite the balance
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn set_balance(&self, user: UserId, balance: Points) -> Result<(), AccountError>;
}

/// Offering prices, read once when a call is scheduled
#[async_trait]
pub trait OfferingCatalog: Send + Sync {
    /// Price of the offering, `None` if it does not exist
    ///
    /// # Errors
    ///
    /// Backend failures.
    async fn price(&self, offering: OfferingId) -> Result<Option<Points>, CatalogError>;
}

/// What the engine asks the meeting provider for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeetingRequest {
    /// Meeting title
    pub topic: String,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// Length in minutes
    pub duration_minutes: i64,
    /// Capacity, owner excluded
    pub max_participants: u32,
}

/// Third-party video meeting provisioning
///
/// Implementations own their credentials and token caches.
#[async_trait]
pub trait MeetingProvisioner: Send + Sync {
    /// Create a meeting room
    ///
    /// # Errors
    ///
    /// Any failure aborts call creation. The engine does not retry.
    async fn provision(&self, request: MeetingRequest) -> Result<MeetingDetails, ProvisioningError>;
}

/// Dependencies available to the call reducer
#[derive(Clone)]
pub struct CallEnvironment {
    /// Time source for transition timestamps
    pub clock: Arc<dyn Clock>,
    /// Balance mutations requested by effects
    pub ledger: Arc<Ledger>,
}

impl CallEnvironment {
    /// Creates a new `CallEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ledger: Arc<Ledger>) -> Self {
        Self { clock, ledger }
    }
}
