//! Ledger postings for each settlement step.
//!
//! Planning is pure: it looks at a call snapshot and says which balances
//! should move. The [`crate::ledger::Ledger`] applies the plan.

use crate::ledger::Posting;
use crate::policy;
use crate::types::{Call, CallKind, EntryKind, Points, UserId};

/// Strict debit of the participant price from every participant
#[must_use]
pub fn reservation_postings(call: &Call) -> Vec<Posting> {
    if call.participant_price.is_zero() {
        return Vec::new();
    }
    call.participants
        .iter()
        .map(|participant| Posting::reservation(*participant, call.participant_price))
        .collect()
}

/// Outcome of settling a completed call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionPlan {
    /// Balance movements, participants first, owner last
    pub postings: Vec<Posting>,
    /// Participants charged the no-show penalty
    pub no_shows: Vec<UserId>,
    /// Revenue credited to the owner (teaching calls only)
    pub owner_revenue: Points,
}

/// Settlement for a call whose attendance is known
///
/// Ids in `attended` that are not participants are ignored.
#[must_use]
pub fn plan_completion(call: &Call, attended: &[UserId]) -> CompletionPlan {
    let penalty = policy::no_show_penalty(call.participant_price);
    let revenue_per_attendee = policy::teaching_revenue(call.participant_price);

    let mut postings = Vec::new();
    let mut no_shows = Vec::new();
    let mut owner_revenue = Points::ZERO;

    for participant in &call.participants {
        if attended.contains(participant) {
            if call.kind == CallKind::Teaching {
                owner_revenue = owner_revenue
                    .checked_add(revenue_per_attendee)
                    .unwrap_or(Points::new(u64::MAX));
            }
        } else {
            no_shows.push(*participant);
            if !penalty.is_zero() {
                postings.push(Posting::no_show_penalty(*participant, penalty));
            }
        }
    }

    match call.kind {
        CallKind::Teaching if !owner_revenue.is_zero() => {
            postings.push(Posting::teaching_revenue(call.owner, owner_revenue));
        },
        CallKind::LearnTogether => {
            let charge = policy::owner_learn_together_charge(call.offering_price);
            if !charge.is_zero() {
                postings.push(Posting::learn_together_charge(call.owner, charge));
            }
        },
        CallKind::Teaching => {},
    }

    CompletionPlan {
        postings,
        no_shows,
        owner_revenue,
    }
}

/// Credit back every reservation the call holds
///
/// Refunds what was actually reserved according to the ledger trail, which
/// equals the participant price for every participant charged at start.
#[must_use]
pub fn refund_postings(call: &Call) -> Vec<Posting> {
    call.ledger_trail
        .iter()
        .filter(|entry| entry.kind == EntryKind::Reservation && !entry.applied.is_zero())
        .map(|entry| Posting::refund(entry.account, entry.applied))
        .collect()
}
