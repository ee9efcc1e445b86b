//! Domain types for the call lifecycle engine.
//!
//! A call is a scheduled skill-exchange session between an owner and a set of
//! participants. Each participant pays a fixed price in points when the owner
//! starts the call; completion settles revenue and no-show penalties.

use crate::policy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a user account
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `UserId` from a UUID
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a call
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallId(Uuid);

impl CallId {
    /// Creates a new random `CallId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `CallId` from a UUID
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the offering (the advertised post) a call was created from
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OfferingId(Uuid);

impl OfferingId {
    /// Creates a new random `OfferingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an `OfferingId` from a UUID
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for OfferingId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OfferingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative amount of points
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Points(u64);

impl Points {
    /// Zero points
    pub const ZERO: Self = Self(0);

    /// Creates a `Points` amount
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw amount
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Checks if this amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, `None` on overflow
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Subtracts, `None` if the result would be negative
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(diff) => Some(Self(diff)),
            None => None,
        }
    }

    /// Subtracts, stopping at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// `ceil(self * percent / 100)`
    #[must_use]
    pub fn percent_ceil(self, percent: u64) -> Self {
        let scaled = u128::from(self.0) * u128::from(percent);
        Self::saturate(scaled.div_ceil(100))
    }

    /// `floor(self * percent / 100)`
    #[must_use]
    pub fn percent_floor(self, percent: u64) -> Self {
        let scaled = u128::from(self.0) * u128::from(percent);
        Self::saturate(scaled / 100)
    }

    fn saturate(value: u128) -> Self {
        Self(u64::try_from(value).unwrap_or(u64::MAX))
    }
}

impl std::iter::Sum for Points {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.fold(0u64, |acc, p| acc.saturating_add(p.0)))
    }
}

impl std::fmt::Display for Points {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} pts", self.0)
    }
}

/// Lifecycle status of a call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Created, accepting participants
    Scheduled,
    /// Started by the owner, funds reserved
    InProgress,
    /// Settled
    Completed,
    /// Called off by the owner
    Cancelled,
}

impl CallStatus {
    /// Whether no further lifecycle transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// How the owner relates to the participants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// The owner teaches and earns revenue from attendees
    Teaching,
    /// Owner and participants learn together; everyone pays
    LearnTogether,
}

/// Meeting metadata returned by the provisioning collaborator, stored verbatim
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingDetails {
    /// Link participants use to join
    pub join_url: String,
    /// Provider meeting id
    pub meeting_id: String,
    /// Meeting password
    pub password: String,
    /// Host key for the owner
    pub host_key: String,
}

/// What a ledger entry was for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Participant price taken when the call starts
    Reservation,
    /// Charged to a participant who did not attend
    NoShowPenalty,
    /// Paid to the owner of a teaching call
    TeachingRevenue,
    /// Charged to the owner of a learn-together call
    LearnTogetherCharge,
    /// Reservation returned on cancellation
    Refund,
    /// Compensation for an entry that could not be made durable
    Reversal,
}

/// Whether an entry took points from or gave points to an account
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Points taken
    Debit,
    /// Points given
    Credit,
}

/// One balance movement caused by a call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Account that moved
    pub account: UserId,
    /// Reason for the movement
    pub kind: EntryKind,
    /// Debit or credit
    pub direction: Direction,
    /// Amount the settlement asked for
    pub requested: Points,
    /// Amount actually moved (lower than `requested` when a debit was clamped)
    pub applied: Points,
    /// Account balance after the movement
    pub balance_after: Points,
}

impl LedgerEntry {
    /// Whether the debit was clamped at a zero balance
    #[must_use]
    pub fn was_clamped(&self) -> bool {
        self.applied < self.requested
    }
}

/// Request to create a call from an offering
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleCall {
    /// Offering the call is created from
    pub offering_id: OfferingId,
    /// Session owner
    pub owner: UserId,
    /// Teaching or learn-together
    pub kind: CallKind,
    /// Start time
    pub scheduled_time: DateTime<Utc>,
    /// Capacity, at least one
    pub max_participants: u32,
}

/// Durable record of one call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Call identifier
    pub id: CallId,
    /// Offering this call was created from
    pub offering_id: OfferingId,
    /// Session owner
    pub owner: UserId,
    /// Teaching or learn-together
    pub kind: CallKind,
    /// Start time
    pub scheduled_time: DateTime<Utc>,
    /// Capacity
    pub max_participants: u32,
    /// Always equal to `participants.len()`
    pub current_participants: u32,
    /// Enrolled participants, in join order
    pub participants: Vec<UserId>,
    /// Offering price at creation
    pub offering_price: Points,
    /// Price each participant pays, fixed at creation
    pub participant_price: Points,
    /// Lifecycle status
    pub status: CallStatus,
    /// Cleared on soft removal, independent of `status`
    pub active: bool,
    /// Meeting metadata
    pub meeting: MeetingDetails,
    /// Every balance movement this call caused
    pub ledger_trail: Vec<LedgerEntry>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When funds were reserved
    pub started_at: Option<DateTime<Utc>>,
    /// When settlement became durable
    pub completed_at: Option<DateTime<Utc>>,
    /// When the owner cancelled
    pub cancelled_at: Option<DateTime<Utc>>,
    /// When the call was deactivated
    pub deactivated_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency version, bumped by every save
    pub version: u64,
}

impl Call {
    /// Creates a new scheduled call with no participants
    ///
    /// The participant price is derived from `offering_price` here and never
    /// recomputed.
    #[must_use]
    pub fn schedule(
        id: CallId,
        request: &ScheduleCall,
        offering_price: Points,
        meeting: MeetingDetails,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            offering_id: request.offering_id,
            owner: request.owner,
            kind: request.kind,
            scheduled_time: request.scheduled_time,
            max_participants: request.max_participants,
            current_participants: 0,
            participants: Vec::new(),
            offering_price,
            participant_price: policy::participant_price(request.kind, offering_price),
            status: CallStatus::Scheduled,
            active: true,
            meeting,
            ledger_trail: Vec::new(),
            created_at,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            deactivated_at: None,
            version: 0,
        }
    }

    /// Checks if capacity is reached
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.current_participants >= self.max_participants
    }

    /// Checks if `user` is an enrolled participant
    #[must_use]
    pub fn is_enrolled(&self, user: UserId) -> bool {
        self.participants.contains(&user)
    }

    /// Checks if `user` owns the call
    #[must_use]
    pub fn is_owner(&self, user: UserId) -> bool {
        self.owner == user
    }

    /// Owner or participant
    #[must_use]
    pub fn is_member(&self, user: UserId) -> bool {
        self.is_owner(user) || self.is_enrolled(user)
    }

    /// Scheduled end of the session, `None` past the representable range
    #[must_use]
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        self.scheduled_time.checked_add_signed(policy::call_duration())
    }

    /// Whether the session's time slot is over at `now`
    ///
    /// A slot whose end cannot be represented never elapses.
    #[must_use]
    pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.ends_at().is_some_and(|end| now > end)
    }

    /// Whether the sweeper should complete this call at `now`
    #[must_use]
    pub fn is_due_for_auto_completion(&self, now: DateTime<Utc>) -> bool {
        self.active && self.status == CallStatus::InProgress && self.is_elapsed(now)
    }

    /// Enrollment invariants: count matches, capacity respected, no duplicates
    #[must_use]
    pub fn enrollment_is_consistent(&self) -> bool {
        let count_matches =
            u32::try_from(self.participants.len()).is_ok_and(|n| n == self.current_participants);
        let mut seen = self.participants.clone();
        seen.sort_unstable();
        seen.dedup();
        count_matches
            && self.current_participants <= self.max_participants
            && seen.len() == self.participants.len()
    }

    pub(crate) fn enroll(&mut self, user: UserId) {
        self.participants.push(user);
        self.current_participants = self.current_participants.saturating_add(1);
    }

    pub(crate) fn withdraw(&mut self, user: UserId) {
        let before = self.participants.len();
        self.participants.retain(|p| *p != user);
        if self.participants.len() < before {
            self.current_participants = self.current_participants.saturating_sub(1);
        }
    }
}
