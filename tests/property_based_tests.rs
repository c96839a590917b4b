mod common;

use common::*;
use proptest::prelude::*;
use relay_core::{Broker, DispatcherConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn expected_trace(stages: &[String]) -> Vec<String> {
    let mut expected: Vec<String> = stages.iter().map(|name| format!("{name}-enter")).collect();
    expected.push("handler".to_string());
    expected.extend(stages.iter().rev().map(|name| format!("{name}-exit")));
    expected
}

proptest! {
    /// Property: stages wrap the handler in registration order, outermost first
    #[test]
    fn stages_nest_in_registration_order(
        stages in prop::collection::vec("[a-z]{1,6}", 0..8),
        value in 0u32..1_000,
    ) {
        let trace = new_trace();
        let names: Vec<&str> = stages.iter().map(String::as_str).collect();
        let broker = Broker::from_registry(
            Arc::new(ping_registry(&trace, &names)),
            DispatcherConfig::default(),
        );

        let pong = tokio_test::block_on(
            broker.request::<Ping, Pong>(Ping { value }, CancellationToken::new()),
        )
        .unwrap();

        prop_assert_eq!(pong.value, value + 1);
        prop_assert_eq!(entries(&trace), expected_trace(&stages));

        let stats = broker.dispatcher().stats();
        prop_assert_eq!(stats.stage_invocations, stages.len() as u64);
        prop_assert_eq!(stats.handler_invocations, 1);
    }

    /// Property: repeated dispatch produces the same trace every time
    #[test]
    fn repeated_dispatch_is_deterministic(
        stages in prop::collection::vec("[A-Z]{1,3}", 1..5),
        repeats in 1usize..4,
    ) {
        let trace = new_trace();
        let names: Vec<&str> = stages.iter().map(String::as_str).collect();
        let broker = Broker::from_registry(
            Arc::new(ping_registry(&trace, &names)),
            DispatcherConfig::default(),
        );

        for _ in 0..repeats {
            trace.lock().clear();
            tokio_test::block_on(
                broker.request::<Ping, Pong>(Ping { value: 1 }, CancellationToken::new()),
            )
            .unwrap();
            prop_assert_eq!(entries(&trace), expected_trace(&stages));
        }
        prop_assert_eq!(broker.dispatcher().stats().compiled_stage_adapters, 1);
    }
}
