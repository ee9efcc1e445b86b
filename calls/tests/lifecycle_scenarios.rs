//! End-to-end call lifecycle scenarios over in-memory collaborators.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::Harness;
use skillswap_calls::error::Entity;
use skillswap_calls::types::EntryKind;
use skillswap_calls::{CallError, CallKind, CallStatus, Points, UserId};

#[tokio::test]
async fn teaching_call_with_full_attendance_pays_owner_revenue() {
    let h = Harness::new();
    let owner = h.user(0);
    let (a, b) = (h.user(200), h.user(200));

    let call = h.started_call(owner, 100, CallKind::Teaching, &[a, b]).await;
    assert_eq!(call.status, CallStatus::InProgress);
    assert_eq!((h.balance(a), h.balance(b)), (100, 100));

    let done = h.engine.complete_call(call.id, vec![a, b]).await.unwrap();

    assert_eq!(done.status, CallStatus::Completed);
    assert!(done.completed_at.is_some());
    assert_eq!((h.balance(a), h.balance(b)), (100, 100));
    assert_eq!(h.balance(owner), 150);
}

#[tokio::test]
async fn absentee_pays_no_show_penalty() {
    let h = Harness::new();
    let owner = h.user(0);
    let (present, absent) = (h.user(200), h.user(200));

    let call = h
        .started_call(owner, 100, CallKind::Teaching, &[present, absent])
        .await;
    h.engine.complete_call(call.id, vec![present]).await.unwrap();

    assert_eq!(h.balance(present), 100);
    assert_eq!(h.balance(absent), 25);
    assert_eq!(h.balance(owner), 75);
}

#[tokio::test]
async fn no_show_penalty_is_clamped_at_zero() {
    let h = Harness::new();
    let owner = h.user(0);
    let absent = h.user(100);

    let call = h.started_call(owner, 100, CallKind::Teaching, &[absent]).await;
    assert_eq!(h.balance(absent), 0);

    let done = h.engine.complete_call(call.id, Vec::new()).await.unwrap();

    assert_eq!(h.balance(absent), 0);
    let penalty = done
        .ledger_trail
        .iter()
        .find(|e| e.kind == EntryKind::NoShowPenalty)
        .unwrap();
    assert_eq!(penalty.requested, Points::new(75));
    assert_eq!(penalty.applied, Points::ZERO);
    assert_eq!(h.balance(owner), 0);
}

#[tokio::test]
async fn learn_together_halves_price_and_charges_owner() {
    let h = Harness::new();
    let owner = h.user(100);
    let learner = h.user(100);

    let call = h
        .started_call(owner, 100, CallKind::LearnTogether, &[learner])
        .await;
    assert_eq!(call.participant_price, Points::new(50));
    assert_eq!(h.balance(learner), 50);

    h.engine.complete_call(call.id, vec![learner]).await.unwrap();

    assert_eq!(h.balance(learner), 50);
    assert_eq!(h.balance(owner), 34);
}

#[tokio::test]
async fn learn_together_owner_charge_never_goes_negative() {
    let h = Harness::new();
    let owner = h.user(10);
    let learner = h.user(100);

    let call = h
        .started_call(owner, 100, CallKind::LearnTogether, &[learner])
        .await;
    let done = h.engine.complete_call(call.id, vec![learner]).await.unwrap();

    assert_eq!(done.status, CallStatus::Completed);
    assert_eq!(h.balance(owner), 0);
}

#[tokio::test]
async fn underfunded_start_changes_nothing() {
    let h = Harness::new();
    let owner = h.user(0);
    let (rich, poor) = (h.user(500), h.user(99));
    let offering = h.offering(100);
    let call = h.schedule(owner, offering, CallKind::Teaching, 2).await;
    h.engine.join_call(call.id, rich).await.unwrap();
    h.engine.join_call(call.id, poor).await.unwrap();

    let error = h.engine.start_or_enter(call.id, owner).await.unwrap_err();

    assert_eq!(
        error,
        CallError::InsufficientBalance {
            account: poor,
            balance: Points::new(99),
            required: Points::new(100),
        }
    );
    assert_eq!((h.balance(rich), h.balance(poor)), (500, 99));
    let stored = h.engine.get_call(call.id).await.unwrap();
    assert_eq!(stored.status, CallStatus::Scheduled);
    assert!(stored.ledger_trail.is_empty());
}

#[tokio::test]
async fn completing_twice_settles_once() {
    let h = Harness::new();
    let owner = h.user(0);
    let (a, b) = (h.user(200), h.user(200));
    let call = h.started_call(owner, 100, CallKind::Teaching, &[a, b]).await;

    h.engine.complete_call(call.id, vec![a]).await.unwrap();
    let second = h.engine.complete_call(call.id, vec![a]).await;

    assert_eq!(second, Err(CallError::AlreadyCompleted(call.id)));
    assert_eq!(h.balance(b), 25);
    assert_eq!(h.balance(owner), 75);
}

#[tokio::test]
async fn completing_a_scheduled_call_is_an_invalid_transition() {
    let h = Harness::new();
    let owner = h.user(0);
    let offering = h.offering(100);
    let call = h.schedule(owner, offering, CallKind::Teaching, 2).await;

    let error = h.engine.complete_call(call.id, Vec::new()).await.unwrap_err();

    assert!(error.is_invalid_transition());
}

#[tokio::test]
async fn join_rejects_full_and_duplicate_enrollment() {
    let h = Harness::new();
    let owner = h.user(0);
    let (a, b) = (h.user(10), h.user(10));
    let offering = h.offering(5);
    let call = h.schedule(owner, offering, CallKind::Teaching, 1).await;

    h.engine.join_call(call.id, a).await.unwrap();

    assert_eq!(
        h.engine.join_call(call.id, b).await,
        Err(CallError::CallFull { capacity: 1 })
    );

    let roomy = h.schedule(owner, offering, CallKind::Teaching, 3).await;
    h.engine.join_call(roomy.id, a).await.unwrap();
    assert_eq!(
        h.engine.join_call(roomy.id, a).await,
        Err(CallError::AlreadyEnrolled(a))
    );

    let stored = h.engine.get_call(roomy.id).await.unwrap();
    assert_eq!(stored.current_participants, 1);
    assert!(stored.enrollment_is_consistent());
}

#[tokio::test]
async fn join_and_leave_report_missing_records() {
    let h = Harness::new();
    let owner = h.user(0);
    let offering = h.offering(5);
    let call = h.schedule(owner, offering, CallKind::Teaching, 2).await;
    let ghost = UserId::new();

    assert!(matches!(
        h.engine.join_call(call.id, ghost).await,
        Err(CallError::NotFound {
            entity: Entity::Account,
            ..
        })
    ));
    assert!(matches!(
        h.engine.leave_call(skillswap_calls::CallId::new(), owner).await,
        Err(CallError::NotFound {
            entity: Entity::Call,
            ..
        })
    ));
}

#[tokio::test]
async fn leave_then_rejoin() {
    let h = Harness::new();
    let owner = h.user(0);
    let a = h.user(10);
    let offering = h.offering(5);
    let call = h.schedule(owner, offering, CallKind::Teaching, 1).await;

    h.engine.join_call(call.id, a).await.unwrap();
    let left = h.engine.leave_call(call.id, a).await.unwrap();
    assert_eq!(left.current_participants, 0);
    assert_eq!(
        h.engine.leave_call(call.id, a).await,
        Err(CallError::NotEnrolled(a))
    );

    let rejoined = h.engine.join_call(call.id, a).await.unwrap();
    assert_eq!(rejoined.participants, vec![a]);
}

#[tokio::test]
async fn deactivation_blocks_enrollment_changes() {
    let h = Harness::new();
    let owner = h.user(0);
    let (a, b) = (h.user(10), h.user(10));
    let offering = h.offering(5);
    let call = h.schedule(owner, offering, CallKind::Teaching, 3).await;
    h.engine.join_call(call.id, a).await.unwrap();

    let inactive = h.engine.deactivate_call(call.id).await.unwrap();
    assert!(!inactive.active);
    assert_eq!(inactive.status, CallStatus::Scheduled);

    assert_eq!(
        h.engine.join_call(call.id, b).await,
        Err(CallError::CallInactive(call.id))
    );
    assert_eq!(
        h.engine.leave_call(call.id, a).await,
        Err(CallError::CallInactive(call.id))
    );
    assert_eq!(
        h.engine.cancel_call(call.id, owner).await,
        Err(CallError::CallInactive(call.id))
    );

    let again = h.engine.deactivate_call(call.id).await.unwrap();
    assert_eq!(again.version, inactive.version);
}

#[tokio::test]
async fn offering_cascade_is_idempotent() {
    let h = Harness::new();
    let owner = h.user(0);
    let offering = h.offering(5);
    let other_offering = h.offering(5);
    for _ in 0..3 {
        h.schedule(owner, offering, CallKind::Teaching, 2).await;
    }
    let unrelated = h.schedule(owner, other_offering, CallKind::Teaching, 2).await;

    assert_eq!(h.engine.deactivate_calls_for_offering(offering).await, Ok(3));
    assert_eq!(h.engine.deactivate_calls_for_offering(offering).await, Ok(0));

    let calls = h.engine.list_calls_for_offering(offering).await.unwrap();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| !c.active));
    assert!(h.engine.get_call(unrelated.id).await.unwrap().active);
}

#[tokio::test]
async fn only_the_owner_starts_and_strangers_are_refused() {
    let h = Harness::new();
    let owner = h.user(0);
    let a = h.user(200);
    let offering = h.offering(100);
    let call = h.schedule(owner, offering, CallKind::Teaching, 2).await;
    let joined = h.engine.join_call(call.id, a).await.unwrap();

    let entered = h.engine.start_or_enter(call.id, a).await.unwrap();
    assert_eq!(entered, joined);
    assert_eq!(h.balance(a), 200);

    let stranger = h.user(0);
    assert_eq!(
        h.engine.start_or_enter(call.id, stranger).await,
        Err(CallError::Unauthorized(stranger))
    );

    let started = h.engine.start_or_enter(call.id, owner).await.unwrap();
    assert_eq!(started.status, CallStatus::InProgress);

    let entered_again = h.engine.start_or_enter(call.id, owner).await.unwrap();
    assert_eq!(entered_again, started);
    assert_eq!(h.balance(a), 100);
}

#[tokio::test]
async fn provisioning_failure_persists_nothing() {
    let h = Harness::new();
    let owner = h.user(0);
    let offering = h.offering(100);
    h.provisioner.set_failing(true);

    let result = h
        .engine
        .schedule_call(skillswap_calls::ScheduleCall {
            offering_id: offering,
            owner,
            kind: CallKind::Teaching,
            scheduled_time: h.engine.now(),
            max_participants: 2,
        })
        .await;

    assert!(matches!(result, Err(CallError::ProvisioningFailed(_))));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn schedule_validates_request() {
    let h = Harness::new();
    let owner = h.user(0);
    let offering = h.offering(100);
    let request = skillswap_calls::ScheduleCall {
        offering_id: offering,
        owner,
        kind: CallKind::Teaching,
        scheduled_time: h.engine.now(),
        max_participants: 0,
    };

    assert!(matches!(
        h.engine.schedule_call(request.clone()).await,
        Err(CallError::InvalidSchedule(_))
    ));
    assert!(matches!(
        h.engine
            .schedule_call(skillswap_calls::ScheduleCall {
                offering_id: skillswap_calls::OfferingId::new(),
                max_participants: 2,
                ..request
            })
            .await,
        Err(CallError::NotFound {
            entity: Entity::Offering,
            ..
        })
    ));
    assert_eq!(h.provisioner.provisioned(), 0);
}

#[tokio::test]
async fn schedule_rejects_a_slot_ending_out_of_range() {
    let h = Harness::new();
    let owner = h.user(0);
    let offering = h.offering(100);

    let result = h
        .engine
        .schedule_call(skillswap_calls::ScheduleCall {
            offering_id: offering,
            owner,
            kind: CallKind::Teaching,
            scheduled_time: chrono::DateTime::<chrono::Utc>::MAX_UTC,
            max_participants: 2,
        })
        .await;

    assert!(matches!(result, Err(CallError::InvalidSchedule(_))));
    assert!(h.store.is_empty());
    assert_eq!(h.provisioner.provisioned(), 0);
}

#[tokio::test]
async fn scheduled_call_carries_meeting_details() {
    let h = Harness::new();
    let owner = h.user(0);
    let offering = h.offering(80);

    let call = h.schedule(owner, offering, CallKind::Teaching, 4).await;

    assert_eq!(call.version, 1);
    assert_eq!(call.participant_price, Points::new(80));
    assert!(call.meeting.join_url.starts_with("https://"));
    assert!(!call.meeting.host_key.is_empty());
    assert_eq!(h.provisioner.provisioned(), 1);
}

#[tokio::test]
async fn cancelling_a_running_call_refunds_reservations() {
    let h = Harness::new();
    let owner = h.user(0);
    let (a, b) = (h.user(150), h.user(100));
    let call = h.started_call(owner, 100, CallKind::Teaching, &[a, b]).await;
    assert_eq!((h.balance(a), h.balance(b)), (50, 0));

    assert_eq!(
        h.engine.cancel_call(call.id, a).await,
        Err(CallError::Unauthorized(a))
    );

    let cancelled = h.engine.cancel_call(call.id, owner).await.unwrap();

    assert_eq!(cancelled.status, CallStatus::Cancelled);
    assert_eq!((h.balance(a), h.balance(b)), (150, 100));
    let refunds = cancelled
        .ledger_trail
        .iter()
        .filter(|e| e.kind == EntryKind::Refund)
        .count();
    assert_eq!(refunds, 2);

    let error = h.engine.cancel_call(call.id, owner).await.unwrap_err();
    assert!(error.is_invalid_transition());
    assert!(
        h.engine
            .complete_call(call.id, Vec::new())
            .await
            .unwrap_err()
            .is_invalid_transition()
    );
}

#[tokio::test]
async fn cancelling_a_scheduled_call_moves_no_points() {
    let h = Harness::new();
    let owner = h.user(0);
    let a = h.user(100);
    let offering = h.offering(100);
    let call = h.schedule(owner, offering, CallKind::Teaching, 2).await;
    h.engine.join_call(call.id, a).await.unwrap();

    let cancelled = h.engine.cancel_call(call.id, owner).await.unwrap();

    assert_eq!(cancelled.status, CallStatus::Cancelled);
    assert!(cancelled.ledger_trail.is_empty());
    assert_eq!(h.balance(a), 100);
    assert!(matches!(
        h.engine.join_call(call.id, h.user(5)).await,
        Err(CallError::CallNotJoinable(CallStatus::Cancelled))
    ));
}

#[tokio::test]
async fn failed_save_reverts_settlement() {
    let h = Harness::new();
    let owner = h.user(0);
    let (present, absent) = (h.user(200), h.user(200));
    let call = h
        .started_call(owner, 100, CallKind::Teaching, &[present, absent])
        .await;

    h.store.fail_saves(true);
    let result = h.engine.complete_call(call.id, vec![present]).await;
    h.store.fail_saves(false);

    assert!(matches!(result, Err(CallError::Persistence(_))));
    assert_eq!((h.balance(present), h.balance(absent)), (100, 100));
    assert_eq!(h.balance(owner), 0);
    assert_eq!(
        h.engine.get_call(call.id).await.unwrap().status,
        CallStatus::InProgress
    );

    h.engine.complete_call(call.id, vec![present]).await.unwrap();
    assert_eq!(h.balance(absent), 25);
    assert_eq!(h.balance(owner), 75);
}

#[tokio::test]
async fn ledger_trail_records_every_movement() {
    let h = Harness::new();
    let owner = h.user(0);
    let (a, b) = (h.user(200), h.user(200));
    let call = h.started_call(owner, 100, CallKind::Teaching, &[a, b]).await;

    let done = h.engine.complete_call(call.id, vec![a]).await.unwrap();

    let kinds: Vec<EntryKind> = done.ledger_trail.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EntryKind::Reservation,
            EntryKind::Reservation,
            EntryKind::NoShowPenalty,
            EntryKind::TeachingRevenue,
        ]
    );
    let revenue = done.ledger_trail.last().unwrap();
    assert_eq!(revenue.account, owner);
    assert_eq!(revenue.balance_after, Points::new(75));
}

#[tokio::test]
async fn participant_view_is_derived_from_enrollment() {
    let h = Harness::new();
    let owner = h.user(0);
    let a = h.user(10);
    let offering = h.offering(5);
    let first = h.schedule(owner, offering, CallKind::Teaching, 2).await;
    let second = h.schedule(owner, offering, CallKind::Teaching, 2).await;

    h.engine.join_call(first.id, a).await.unwrap();
    h.engine.join_call(second.id, a).await.unwrap();
    h.engine.leave_call(first.id, a).await.unwrap();

    let mine = h.engine.list_calls_for_participant(a).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, second.id);
    assert!(h.engine.list_calls_for_participant(owner).await.unwrap().is_empty());
}
