//! Property tests for enrollment bookkeeping.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::Harness;
use proptest::prelude::*;
use skillswap_calls::{CallError, CallKind};

#[derive(Clone, Copy, Debug)]
enum Step {
    Join(usize),
    Leave(usize),
}

fn step(pool: usize) -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..pool).prop_map(Step::Join),
        (0..pool).prop_map(Step::Leave),
    ]
}

const POOL: usize = 5;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn enrollment_tracks_a_simple_model(
        capacity in 1u32..=4,
        steps in prop::collection::vec(step(POOL), 1..40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let h = Harness::new();
            let owner = h.user(0);
            let offering = h.offering(10);
            let call = h.schedule(owner, offering, CallKind::Teaching, capacity).await;
            let users: Vec<_> = (0..POOL).map(|_| h.user(10)).collect();
            let mut model = Vec::new();

            for step in steps {
                match step {
                    Step::Join(i) => {
                        let user = users[i];
                        let result = h.engine.join_call(call.id, user).await;
                        if model.len() == capacity as usize {
                            assert_eq!(result, Err(CallError::CallFull { capacity }));
                        } else if model.contains(&user) {
                            assert_eq!(result, Err(CallError::AlreadyEnrolled(user)));
                        } else {
                            assert!(result.is_ok());
                            model.push(user);
                        }
                    },
                    Step::Leave(i) => {
                        let user = users[i];
                        let result = h.engine.leave_call(call.id, user).await;
                        if let Some(position) = model.iter().position(|u| *u == user) {
                            assert!(result.is_ok());
                            model.remove(position);
                        } else {
                            assert_eq!(result, Err(CallError::NotEnrolled(user)));
                        }
                    },
                }

                let stored = h.engine.get_call(call.id).await.unwrap();
                assert!(stored.enrollment_is_consistent());
                assert!(stored.current_participants <= capacity);
                assert_eq!(stored.participants, model);
            }
        });
    }
}
