//! Error types for the call engine and its collaborators.

use crate::types::{CallId, CallStatus, Points, UserId};
use thiserror::Error;

/// Kind of record a [`CallError::NotFound`] refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    /// A call record
    Call,
    /// A user account
    Account,
    /// An offering
    Offering,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Call => "call",
            Self::Account => "account",
            Self::Offering => "offering",
        })
    }
}

/// Every way a call operation can fail
///
/// Rejected operations leave balances and the call record untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Call, account or offering does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record
        entity: Entity,
        /// Identifier that was looked up
        id: String,
    },

    /// The requested transition is not legal from the current status
    #[error("cannot {action} a call that is {from}")]
    InvalidTransition {
        /// Status at the time of the request
        from: CallStatus,
        /// Requested transition
        action: &'static str,
    },

    /// The call was deactivated
    #[error("call {0} is inactive")]
    CallInactive(CallId),

    /// Join attempted on a call that no longer accepts participants
    #[error("call is {0} and no longer accepts participants")]
    CallNotJoinable(CallStatus),

    /// Capacity reached
    #[error("call is full ({capacity} participants)")]
    CallFull {
        /// Maximum participants
        capacity: u32,
    },

    /// User already enrolled in the call
    #[error("user {0} is already enrolled")]
    AlreadyEnrolled(UserId),

    /// User is not a participant
    #[error("user {0} is not enrolled")]
    NotEnrolled(UserId),

    /// A strict debit would take an account below zero
    #[error("account {account} has {balance}, {required} required")]
    InsufficientBalance {
        /// Underfunded account
        account: UserId,
        /// Balance at the time of the check
        balance: Points,
        /// Amount the debit needed
        required: Points,
    },

    /// The call has already been settled
    #[error("call {0} is already completed")]
    AlreadyCompleted(CallId),

    /// Meeting provisioning failed; nothing was persisted
    #[error("meeting provisioning failed: {0}")]
    ProvisioningFailed(String),

    /// Caller is not allowed to perform the operation
    #[error("user {0} is not allowed to perform this operation")]
    Unauthorized(UserId),

    /// Schedule request is malformed
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The record changed between load and save
    #[error("call {id} was modified concurrently (expected version {expected}, found {actual})")]
    ConcurrentModification {
        /// Call identifier
        id: CallId,
        /// Version the writer loaded
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// A collaborator failed
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl CallError {
    /// Builds a `NotFound` for a call
    #[must_use]
    pub fn call_not_found(id: CallId) -> Self {
        Self::NotFound {
            entity: Entity::Call,
            id: id.to_string(),
        }
    }

    /// Builds a `NotFound` for an account
    #[must_use]
    pub fn account_not_found(id: UserId) -> Self {
        Self::NotFound {
            entity: Entity::Account,
            id: id.to_string(),
        }
    }

    /// Stable snake-case code, used as a metrics label
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::CallInactive(_) => "call_inactive",
            Self::CallNotJoinable(_) => "call_not_joinable",
            Self::CallFull { .. } => "call_full",
            Self::AlreadyEnrolled(_) => "already_enrolled",
            Self::NotEnrolled(_) => "not_enrolled",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::AlreadyCompleted(_) => "already_completed",
            Self::ProvisioningFailed(_) => "provisioning_failed",
            Self::Unauthorized(_) => "unauthorized",
            Self::InvalidSchedule(_) => "invalid_schedule",
            Self::ConcurrentModification { .. } => "concurrent_modification",
            Self::Persistence(_) => "persistence",
        }
    }

    /// Whether the error rejects a lifecycle transition on status grounds
    #[must_use]
    pub const fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::CallNotJoinable(_)
        )
    }
}

/// Failures of the call record store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record with this id
    #[error("call {0} not found")]
    NotFound(CallId),

    /// Optimistic version check failed
    #[error("version conflict on call {id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Call identifier
        id: CallId,
        /// Version carried by the record being saved
        expected: u64,
        /// Version in the store
        actual: u64,
    },

    /// Storage backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for CallError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => Self::call_not_found(id),
            StoreError::VersionConflict {
                id,
                expected,
                actual,
            } => Self::ConcurrentModification {
                id,
                expected,
                actual,
            },
            StoreError::Backend(message) => Self::Persistence(message),
        }
    }
}

/// Failures of the account collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    /// The balance could not be read or written
    #[error("account {account} unavailable: {reason}")]
    Unavailable {
        /// Account being accessed
        account: UserId,
        /// Backend message
        reason: String,
    },
}

impl From<AccountError> for CallError {
    fn from(error: AccountError) -> Self {
        Self::Persistence(error.to_string())
    }
}

/// Failures of the offering catalog
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Catalog backend failure
    #[error("offering catalog unavailable: {0}")]
    Unavailable(String),
}

impl From<CatalogError> for CallError {
    fn from(error: CatalogError) -> Self {
        Self::Persistence(error.to_string())
    }
}

/// Failures of the meeting provisioner
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    /// The provider refused the request
    #[error("provider rejected the meeting: {0}")]
    Rejected(String),

    /// The provider could not be reached or authenticated against
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl From<ProvisioningError> for CallError {
    fn from(error: ProvisioningError) -> Self {
        Self::ProvisioningFailed(error.to_string())
    }
}
