// tests/property/relay_test.rs

//! Interleaved pushes and ticks deliver everything exactly once, in order.

use pawn_redis::core::dispatch::TickDispatcher;
use pawn_redis::core::relay::{MessageRelay, RelayEntry};
use pawn_redis::CallbackError;
use proptest::prelude::*;
use std::sync::Arc;

proptest! {
    #[test]
    fn test_interleaved_ticks_deliver_each_message_once(
        batches in prop::collection::vec(prop::collection::vec(0u8..4, 0..20), 1..20),
    ) {
        let relay = Arc::new(MessageRelay::new());
        let dispatcher = TickDispatcher::new(relay.clone());
        let mut delivered: Vec<(String, String)> = Vec::new();
        let mut expected = Vec::new();
        let mut seq = 0u32;

        for batch in &batches {
            for channel in batch {
                let channel = format!("ch{channel}");
                let payload = seq.to_string();
                seq += 1;
                expected.push((format!("On{channel}"), payload.clone()));
                relay.push(RelayEntry::new(channel.clone(), payload, format!("On{channel}")));
            }
            let mut host = |callback: &str, payload: &str| -> Result<(), CallbackError> {
                delivered.push((callback.to_string(), payload.to_string()));
                Ok(())
            };
            let report = dispatcher.tick(&mut host);
            prop_assert!(!report.skipped);
            prop_assert_eq!(report.delivered, batch.len());
        }
        prop_assert!(relay.is_empty());
        prop_assert_eq!(delivered, expected);
    }
}
