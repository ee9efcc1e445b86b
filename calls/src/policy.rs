//! Pricing and settlement rates.

use crate::types::{CallKind, Points};

/// Share of the participant price charged to an absentee, rounded up
pub const NO_SHOW_PENALTY_PERCENT: u64 = 75;

/// Share of each attendee's price the owner of a teaching call earns, rounded up
pub const TEACHING_REVENUE_PERCENT: u64 = 75;

/// Participant price of a learn-together call, as a share of the offering price
pub const LEARN_TOGETHER_PARTICIPANT_PERCENT: u64 = 50;

/// Charge to the owner of a learn-together call, as a share of the offering price
pub const LEARN_TOGETHER_OWNER_PERCENT: u64 = 66;

/// Length of a session; a call is elapsed this long after its start time
pub const DEFAULT_CALL_DURATION_MINUTES: i64 = 120;

/// Price each participant pays
#[must_use]
pub fn participant_price(kind: CallKind, offering_price: Points) -> Points {
    match kind {
        CallKind::Teaching => offering_price,
        CallKind::LearnTogether => offering_price.percent_floor(LEARN_TOGETHER_PARTICIPANT_PERCENT),
    }
}

/// Penalty for a participant who did not attend
#[must_use]
pub fn no_show_penalty(participant_price: Points) -> Points {
    participant_price.percent_ceil(NO_SHOW_PENALTY_PERCENT)
}

/// Revenue the owner of a teaching call earns per attendee
#[must_use]
pub fn teaching_revenue(participant_price: Points) -> Points {
    participant_price.percent_ceil(TEACHING_REVENUE_PERCENT)
}

/// Charge to the owner of a learn-together call at completion
#[must_use]
pub fn owner_learn_together_charge(offering_price: Points) -> Points {
    offering_price.percent_floor(LEARN_TOGETHER_OWNER_PERCENT)
}

/// Session length as a duration
#[must_use]
pub fn call_duration() -> chrono::Duration {
    chrono::Duration::minutes(DEFAULT_CALL_DURATION_MINUTES)
}
