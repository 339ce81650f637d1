//! Protocol-level tests driving a [`Session`] with JSON frames.

use std::time::Duration;

use serde_json::Value;
use statevisor::{call_machine, Config, Registry, Session};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Next outbound frame, decoded.
async fn next_frame(rx: &mut mpsc::Receiver<String>) -> Value {
    let frame = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for push frame")
        .expect("session outbound closed");
    serde_json::from_str(&frame).expect("push frames are valid JSON")
}

/// Next outbound frame of the given `type`, skipping others.
async fn next_frame_of(rx: &mut mpsc::Receiver<String>, ty: &str) -> Value {
    loop {
        let frame = next_frame(rx).await;
        if frame["type"] == ty {
            return frame;
        }
    }
}

#[tokio::test]
async fn test_incoming_call_pushes_registration_and_state_changes() {
    init_logging();
    let registry = Registry::new(Config::default(), call_machine::call_machine());
    let (session, mut rx) = Session::connect(registry.clone());

    session
        .handle_text(r#"{"action":"INCOMING_CALL","callerNumber":"+15550001111"}"#)
        .await
        .unwrap();

    let reg = next_frame_of(&mut rx, "MACHINE_REGISTERED").await;
    assert_eq!(reg["machineId"], "call-001");

    let first = next_frame_of(&mut rx, "STATE_CHANGE").await;
    assert_eq!(first["stepNumber"], 1);
    assert_eq!(first["stateBefore"], "Initial");
    assert_eq!(first["stateAfter"], "IDLE");
    assert_eq!(first["entryActionStatus"], "ok");

    let second = next_frame_of(&mut rx, "STATE_CHANGE").await;
    assert_eq!(second["stepNumber"], 2);
    assert_eq!(second["stateAfter"], "RINGING");
    assert_eq!(second["eventName"], "IncomingCall");

    // RINGING's 30s timeout announces itself immediately.
    let countdown = next_frame_of(&mut rx, "TIMEOUT_COUNTDOWN").await;
    assert_eq!(countdown["remainingSeconds"], 30);

    session.close();
    registry.shutdown().await;
}

#[tokio::test]
async fn test_list_and_registry_state_queries() {
    init_logging();
    let registry = Registry::new(Config::default(), call_machine::call_machine());
    let (session, mut rx) = Session::connect(registry.clone());

    session
        .handle_text(r#"{"action":"INCOMING_CALL"}"#)
        .await
        .unwrap();

    session.handle_text(r#"{"action":"GET_MACHINES"}"#).await.unwrap();
    let list = next_frame_of(&mut rx, "MACHINES_LIST").await;
    assert_eq!(list["machines"][0]["id"], "call-001");
    assert_eq!(list["machines"][0]["type"], "CallMachine");
    assert_eq!(list["machines"][0]["state"], "RINGING");

    session
        .handle_text(r#"{"action":"GET_OFFLINE_MACHINES"}"#)
        .await
        .unwrap();
    let offline = next_frame_of(&mut rx, "OFFLINE_MACHINES_LIST").await;
    assert_eq!(offline["machines"].as_array().unwrap().len(), 0);

    session
        .handle_text(r#"{"action":"GET_REGISTRY_STATE"}"#)
        .await
        .unwrap();
    let state = next_frame_of(&mut rx, "REGISTRY_STATE").await;
    assert_eq!(state["debugMode"], false);
    assert_eq!(state["machineCount"], 1);
    assert_eq!(state["activeMachines"][0], "call-001");

    session.close();
    registry.shutdown().await;
}

#[tokio::test]
async fn test_select_machine_rebuilds_and_follows_the_tree_view() {
    init_logging();
    let registry = Registry::new(Config::default(), call_machine::call_machine());
    let (session, mut rx) = Session::connect(registry.clone());

    session
        .handle_text(r#"{"action":"INCOMING_CALL"}"#)
        .await
        .unwrap();
    session.handle_text(r#"{"action":"ANSWER"}"#).await.unwrap();

    session
        .handle_text(r#"{"action":"SELECT_MACHINE","machineId":"call-001"}"#)
        .await
        .unwrap();
    let update = next_frame_of(&mut rx, "TREEVIEW_STORE_UPDATE").await;
    assert_eq!(update["store"]["version"], 1);
    assert_eq!(update["store"]["selectedMachineId"], "call-001");
    let instances = update["store"]["stateInstances"].as_array().unwrap();
    assert_eq!(instances.len(), 3);
    assert_eq!(instances[2]["state"], "CONNECTED");

    let current = next_frame_of(&mut rx, "CURRENT_STATE").await;
    assert_eq!(current["currentState"], "CONNECTED");

    // Live transitions on the selected machine bump the version.
    session.handle_text(r#"{"action":"HANGUP"}"#).await.unwrap();
    let update = next_frame_of(&mut rx, "TREEVIEW_STORE_UPDATE").await;
    assert_eq!(update["store"]["version"], 2);
    let instances = update["store"]["stateInstances"].as_array().unwrap();
    assert_eq!(instances.len(), 4);
    assert_eq!(instances[3]["state"], "IDLE");
    assert_eq!(instances[3]["instanceNumber"], 2);

    session.close();
    registry.shutdown().await;
}

#[tokio::test]
async fn test_fire_event_reports_outcome_and_current_state() {
    init_logging();
    let registry = Registry::new(Config::default(), call_machine::call_machine());
    let (session, mut rx) = Session::connect(registry.clone());

    session
        .handle_text(r#"{"action":"INCOMING_CALL"}"#)
        .await
        .unwrap();

    session
        .handle_text(r#"{"action":"FIRE_EVENT","machineId":"call-001","event":"Answer"}"#)
        .await
        .unwrap();
    let fired = next_frame_of(&mut rx, "EVENT_FIRED").await;
    assert_eq!(fired["success"], true);
    assert_eq!(fired["eventType"], "Answer");
    let current = next_frame_of(&mut rx, "CURRENT_STATE").await;
    assert_eq!(current["currentState"], "CONNECTED");

    // Answer is not valid in CONNECTED.
    session
        .handle_text(r#"{"action":"FIRE_EVENT","machineId":"call-001","event":"Answer"}"#)
        .await
        .unwrap();
    let fired = next_frame_of(&mut rx, "EVENT_FIRED").await;
    assert_eq!(fired["success"], false);

    session.close();
    registry.shutdown().await;
}

#[tokio::test]
async fn test_send_event_targets_an_explicit_machine() {
    init_logging();
    let registry = Registry::new(Config::default(), call_machine::call_machine());
    let (session, mut rx) = Session::connect(registry.clone());

    session
        .handle_text(
            r#"{"action":"SEND_EVENT","machineId":"call-002",
                "eventType":"IncomingCall","payload":{"callerNumber":"+15559998888"}}"#,
        )
        .await
        .unwrap();

    let fired = next_frame_of(&mut rx, "EVENT_FIRED").await;
    assert_eq!(fired["machineId"], "call-002");
    assert_eq!(fired["success"], true);

    assert_eq!(
        registry.current_state_of("call-002").await.as_deref(),
        Some("RINGING")
    );
    assert_eq!(registry.history_of("call-002").len(), 2);

    session.close();
    registry.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frame_is_rejected_but_not_fatal() {
    init_logging();
    let registry = Registry::new(Config::default(), call_machine::call_machine());
    let (session, mut rx) = Session::connect(registry.clone());

    assert!(session.handle_text("{not json").await.is_err());
    assert!(session.handle_text(r#"{"action":"NO_SUCH_ACTION"}"#).await.is_err());

    // The session still works.
    session
        .handle_text(r#"{"action":"GET_REGISTRY_STATE"}"#)
        .await
        .unwrap();
    let state = next_frame_of(&mut rx, "REGISTRY_STATE").await;
    assert_eq!(state["machineCount"], 0);

    session.close();
    registry.shutdown().await;
}

#[tokio::test]
async fn test_tree_views_are_per_session() {
    init_logging();
    let registry = Registry::new(Config::default(), call_machine::call_machine());
    let (alpha, mut rx_a) = Session::connect(registry.clone());
    let (beta, mut rx_b) = Session::connect(registry.clone());

    alpha
        .handle_text(r#"{"action":"INCOMING_CALL"}"#)
        .await
        .unwrap();
    alpha
        .handle_text(r#"{"action":"SELECT_MACHINE","machineId":"call-001"}"#)
        .await
        .unwrap();
    next_frame_of(&mut rx_a, "TREEVIEW_STORE_UPDATE").await;

    // A transition reaches both sessions, but only the selecting one
    // receives a tree-view update.
    alpha.handle_text(r#"{"action":"ANSWER"}"#).await.unwrap();
    let update = next_frame_of(&mut rx_a, "TREEVIEW_STORE_UPDATE").await;
    assert_eq!(update["store"]["version"], 2);

    let mut beta_types = Vec::new();
    loop {
        let frame = next_frame(&mut rx_b).await;
        let ty = frame["type"].as_str().unwrap().to_string();
        let done = ty == "STATE_CHANGE" && frame["stepNumber"] == 3;
        beta_types.push(ty);
        if done {
            break;
        }
    }
    assert!(beta_types.iter().all(|t| t != "TREEVIEW_STORE_UPDATE"));

    alpha.close();
    beta.close();
    registry.shutdown().await;
}
