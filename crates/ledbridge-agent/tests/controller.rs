// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::sync::Arc;

use common::MockSink;
use ledbridge_agent::{BridgeController, BridgeError, LinkHandle, LinkSignals, LinkTimings};
use ledbridge_core::{CommandEncoder, DesiredState, DeviceProfile, PowerState, StateStore};

fn controller(
    initial: DesiredState,
) -> (BridgeController, Arc<StateStore>, Arc<MockSink>, LinkSignals) {
    let store = Arc::new(StateStore::new(initial));
    let sink = MockSink::new();
    let (link, signals) = LinkHandle::new(LinkTimings::default());
    let controller = BridgeController::new(
        Arc::clone(&store),
        CommandEncoder::new(DeviceProfile::elk_bledom()),
        link,
        sink.clone(),
        true,
    );
    (controller, store, sink, signals)
}

#[tokio::test]
async fn malformed_message_leaves_store_untouched() {
    let (controller, store, sink, _signals) = controller(DesiredState::default());

    for raw in [&b"not json"[..], b"[1,2,3]", b"{\"state\":\"MAYBE\"}"] {
        let result = controller.on_inbound_message(raw).await;
        assert!(matches!(result, Err(BridgeError::MalformedMessage(_))), "{:?}", raw);
    }

    assert_eq!(store.current(), DesiredState::default());
    assert!(sink.published().is_empty());
}

#[tokio::test]
async fn update_while_disconnected_is_stored_and_published() {
    let (controller, store, sink, mut signals) = controller(DesiredState::default());

    let outcome = controller
        .on_inbound_message(br#"{"state":"off","brightness":300}"#)
        .await
        .unwrap();

    assert_eq!(outcome.state.power, PowerState::Off);
    assert_eq!(outcome.state.brightness, 255);
    assert_eq!(store.current(), outcome.state);
    assert_eq!(sink.published(), vec![outcome.state]);
    assert_eq!(signals.drain(), 0);
}

#[tokio::test]
async fn power_on_from_off_while_disconnected_does_not_request_reconnect() {
    let off = DesiredState {
        power: PowerState::Off,
        ..DesiredState::default()
    };
    let (controller, _store, _sink, mut signals) = controller(off);

    let outcome = controller.on_inbound_message(br#"{"state":"ON"}"#).await.unwrap();
    assert!(outcome.woke_from_off);

    // The next connect reconciles with a wake anyway
    assert_eq!(signals.drain(), 0);
}
