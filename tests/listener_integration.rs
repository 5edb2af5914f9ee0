use std::sync::Arc;

use lightpath::{
    BatchListener, CircuitId, CircuitState, ControllerCall, LightpathError, ListenerConfig,
    MockControllerClient, MockStatProvider, TransferEvent,
};

fn configured() -> ListenerConfig {
    ListenerConfig::with_controller("http://controller.example:8181")
}

fn new_listener(
    config: &ListenerConfig,
) -> (
    BatchListener<MockControllerClient, MockStatProvider>,
    Arc<MockControllerClient>,
    Arc<MockStatProvider>,
) {
    let controller = Arc::new(MockControllerClient::new());
    let stat = Arc::new(MockStatProvider::new());
    let listener = BatchListener::new(config, controller.clone(), stat.clone());
    (listener, controller, stat)
}

#[test_log::test(tokio::test)]
async fn test_two_pair_batch_end_to_end() {
    let (mut listener, controller, stat) = new_listener(&configured());
    controller.push_reserve_result(Ok(CircuitId::from("vlan-21764")));
    controller.push_release_result(Ok(()));
    stat.set_size("gsiftp://a", 700);
    stat.set_size("gsiftp://c", 300);

    listener.on_event(TransferEvent::ListEnter).await;
    listener
        .on_event(TransferEvent::ListItem("gsiftp://a => gsiftp://b".to_string()))
        .await;
    listener
        .on_event(TransferEvent::ListItem("gsiftp://c => gsiftp://d".to_string()))
        .await;
    listener.on_event(TransferEvent::ListExit).await;
    assert_eq!(listener.total_bytes(), 1000);
    assert_eq!(listener.pending(), 2);

    listener
        .on_event(TransferEvent::PassiveEndpoint(
            "dest.example:[192.168.0.1]:2811".to_string(),
        ))
        .await;
    listener.on_event(TransferEvent::TransferExit).await;
    listener.on_event(TransferEvent::TransferExit).await;

    // Exactly one reservation and one release
    assert_eq!(controller.reserve_count(), 1);
    assert_eq!(controller.release_count(), 1);
    assert_eq!(listener.pending(), 0);
    assert!(matches!(listener.circuit_state(), CircuitState::Idle));

    // The reservation carried the batch's endpoint and scheduling hints
    match &controller.calls()[0] {
        ControllerCall::Reserve {
            controller,
            host,
            ip,
            port,
            volume_hint,
            pair_count,
            ..
        } => {
            assert_eq!(controller, "http://controller.example:8181");
            assert_eq!(host, "dest.example");
            assert_eq!(ip, "192.168.0.1");
            assert_eq!(*port, 2811);
            assert_eq!(*volume_hint, 1000);
            assert_eq!(*pair_count, 2);
        }
        other => panic!("expected a reserve call first, got {:?}", other),
    }
}

#[test_log::test(tokio::test)]
async fn test_endpoint_notifications_without_controller_issue_no_calls() {
    let (mut listener, controller, stat) = new_listener(&ListenerConfig::default());
    stat.set_size("gsiftp://a", 64);

    listener.on_event(TransferEvent::ListEnter).await;
    listener
        .on_event(TransferEvent::ListItem("gsiftp://a => gsiftp://b".to_string()))
        .await;
    listener.on_event(TransferEvent::ListExit).await;

    for _ in 0..5 {
        listener
            .on_event(TransferEvent::PassiveEndpoint(
                "dest.example:[10.0.0.9]:2811".to_string(),
            ))
            .await;
    }
    listener.on_event(TransferEvent::TransferExit).await;

    assert!(matches!(listener.circuit_state(), CircuitState::Idle));
    assert_eq!(controller.reserve_count(), 0);
    assert_eq!(controller.release_count(), 0);
}

#[test_log::test(tokio::test)]
async fn test_circuit_is_reused_across_endpoint_notifications() {
    let (mut listener, controller, stat) = new_listener(&configured());
    controller.push_reserve_result(Ok(CircuitId::from("vlan-29000")));
    controller.push_release_result(Ok(()));
    for i in 0..3 {
        stat.set_size(&format!("gsiftp://a/{i}"), 10);
    }

    listener.on_event(TransferEvent::ListEnter).await;
    for i in 0..3 {
        listener
            .on_event(TransferEvent::ListItem(format!(
                "gsiftp://a/{i} => gsiftp://b/{i}"
            )))
            .await;
    }
    listener.on_event(TransferEvent::ListExit).await;

    // One passive endpoint notification per file, interleaved with exits
    for _ in 0..3 {
        listener
            .on_event(TransferEvent::PassiveEndpoint(
                "dest.example:[192.168.0.1]:2811".to_string(),
            ))
            .await;
        listener.on_event(TransferEvent::TransferExit).await;
    }

    assert_eq!(controller.reserve_count(), 1);
    assert_eq!(controller.release_count(), 1);
    assert!(matches!(listener.circuit_state(), CircuitState::Idle));
}

#[test_log::test(tokio::test)]
async fn test_release_only_after_last_transfer() {
    let (mut listener, controller, stat) = new_listener(&configured());
    controller.push_reserve_result(Ok(CircuitId::from("vlan-23500")));
    controller.push_release_result(Ok(()));
    for i in 0..3 {
        stat.set_size(&format!("gsiftp://a/{i}"), 1);
    }

    listener.on_event(TransferEvent::ListEnter).await;
    for i in 0..3 {
        listener
            .on_event(TransferEvent::ListItem(format!(
                "gsiftp://a/{i} => gsiftp://b/{i}"
            )))
            .await;
    }
    listener.on_event(TransferEvent::ListExit).await;
    listener
        .on_event(TransferEvent::PassiveEndpoint(
            "dest.example:[192.168.0.1]:2811".to_string(),
        ))
        .await;

    listener.on_event(TransferEvent::TransferExit).await;
    assert_eq!(controller.release_count(), 0);
    listener.on_event(TransferEvent::TransferExit).await;
    assert_eq!(controller.release_count(), 0);
    listener.on_event(TransferEvent::TransferExit).await;
    assert_eq!(controller.release_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_unreachable_sources_shrink_the_pending_count() {
    let (mut listener, controller, stat) = new_listener(&configured());
    controller.push_reserve_result(Ok(CircuitId::from("vlan-24100")));
    controller.push_release_result(Ok(()));
    stat.set_size("gsiftp://a/ok", 2048);
    // gsiftp://a/gone is not registered and fails to stat

    listener.on_event(TransferEvent::ListEnter).await;
    listener
        .on_event(TransferEvent::ListItem(
            "gsiftp://a/ok => gsiftp://b/ok".to_string(),
        ))
        .await;
    listener
        .on_event(TransferEvent::ListItem(
            "gsiftp://a/gone => gsiftp://b/gone".to_string(),
        ))
        .await;
    listener.on_event(TransferEvent::ListExit).await;

    assert_eq!(listener.pending(), 1);
    assert_eq!(listener.total_bytes(), 2048);

    listener
        .on_event(TransferEvent::PassiveEndpoint(
            "dest.example:[192.168.0.1]:2811".to_string(),
        ))
        .await;
    listener.on_event(TransferEvent::TransferExit).await;

    // The single reachable transfer finishing releases the circuit
    assert_eq!(controller.release_count(), 1);
    assert!(matches!(listener.circuit_state(), CircuitState::Idle));
}

#[test_log::test(tokio::test)]
async fn test_failed_release_does_not_disturb_completion() {
    let (mut listener, controller, stat) = new_listener(&configured());
    controller.push_reserve_result(Ok(CircuitId::from("vlan-26600")));
    controller.push_release_result(Err(LightpathError::Release(
        "controller unreachable".to_string(),
    )));
    stat.set_size("gsiftp://a", 1);

    listener.on_event(TransferEvent::ListEnter).await;
    listener
        .on_event(TransferEvent::ListItem("gsiftp://a => gsiftp://b".to_string()))
        .await;
    listener.on_event(TransferEvent::ListExit).await;
    listener
        .on_event(TransferEvent::PassiveEndpoint(
            "dest.example:[192.168.0.1]:2811".to_string(),
        ))
        .await;
    listener.on_event(TransferEvent::TransferExit).await;

    // The release was attempted exactly once and the batch wound down
    assert_eq!(controller.release_count(), 1);
    assert_eq!(listener.pending(), 0);
    assert!(matches!(listener.circuit_state(), CircuitState::Idle));

    // A stray late exit stays harmless
    listener.on_event(TransferEvent::TransferExit).await;
    assert_eq!(controller.release_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_failed_reservation_never_fails_the_batch() {
    let (mut listener, controller, stat) = new_listener(&configured());
    controller.push_reserve_result(Err(LightpathError::Reservation(
        "no capacity".to_string(),
    )));
    stat.set_size("gsiftp://a", 1);

    listener.on_event(TransferEvent::ListEnter).await;
    listener
        .on_event(TransferEvent::ListItem("gsiftp://a => gsiftp://b".to_string()))
        .await;
    listener.on_event(TransferEvent::ListExit).await;
    listener
        .on_event(TransferEvent::PassiveEndpoint(
            "dest.example:[192.168.0.1]:2811".to_string(),
        ))
        .await;
    listener.on_event(TransferEvent::TransferExit).await;

    // The batch proceeded without a circuit, nothing to release
    assert_eq!(controller.reserve_count(), 1);
    assert_eq!(controller.release_count(), 0);
    assert_eq!(listener.pending(), 0);
    assert!(matches!(listener.circuit_state(), CircuitState::Idle));
}

#[test_log::test(tokio::test)]
async fn test_concurrent_batches_are_independent() {
    let (mut first, first_controller, first_stat) = new_listener(&configured());
    let (mut second, second_controller, second_stat) = new_listener(&configured());
    first_controller.push_reserve_result(Ok(CircuitId::from("vlan-20100")));
    first_controller.push_release_result(Ok(()));
    second_controller.push_reserve_result(Ok(CircuitId::from("vlan-20200")));
    second_controller.push_release_result(Ok(()));
    first_stat.set_size("gsiftp://a/one", 10);
    second_stat.set_size("gsiftp://a/two", 20);

    assert_ne!(first.batch_id(), second.batch_id());

    // Interleave the two batches' event streams
    first.on_event(TransferEvent::ListEnter).await;
    second.on_event(TransferEvent::ListEnter).await;
    first
        .on_event(TransferEvent::ListItem(
            "gsiftp://a/one => gsiftp://b/one".to_string(),
        ))
        .await;
    second
        .on_event(TransferEvent::ListItem(
            "gsiftp://a/two => gsiftp://b/two".to_string(),
        ))
        .await;
    first.on_event(TransferEvent::ListExit).await;
    second.on_event(TransferEvent::ListExit).await;
    first
        .on_event(TransferEvent::PassiveEndpoint(
            "one.example:[10.0.0.1]:2811".to_string(),
        ))
        .await;
    second
        .on_event(TransferEvent::PassiveEndpoint(
            "two.example:[10.0.0.2]:2811".to_string(),
        ))
        .await;
    first.on_event(TransferEvent::TransferExit).await;
    second.on_event(TransferEvent::TransferExit).await;

    assert_eq!(first_controller.reserve_count(), 1);
    assert_eq!(first_controller.release_count(), 1);
    assert_eq!(second_controller.reserve_count(), 1);
    assert_eq!(second_controller.release_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_abort_releases_circuit_with_transfers_pending() {
    let (mut listener, controller, stat) = new_listener(&configured());
    controller.push_reserve_result(Ok(CircuitId::from("vlan-27300")));
    controller.push_release_result(Ok(()));
    stat.set_size("gsiftp://a", 5);

    listener.on_event(TransferEvent::ListEnter).await;
    listener
        .on_event(TransferEvent::ListItem("gsiftp://a => gsiftp://b".to_string()))
        .await;
    listener.on_event(TransferEvent::ListExit).await;
    listener
        .on_event(TransferEvent::PassiveEndpoint(
            "dest.example:[192.168.0.1]:2811".to_string(),
        ))
        .await;

    // The copy operation is torn down before the transfer finishes
    listener.abort().await;

    assert_eq!(controller.release_count(), 1);
    assert!(matches!(listener.circuit_state(), CircuitState::Idle));
}
