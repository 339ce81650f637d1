//! # Inbound client requests.
//!
//! [`ClientRequest`] decodes the JSON frames a monitor/dashboard client
//! sends over its connection. Frames are tagged by `action`:
//!
//! ```json
//! {"action": "FIRE_EVENT", "machineId": "call-001", "event": "Answer"}
//! {"action": "INCOMING_CALL", "callerNumber": "+15551234567"}
//! {"action": "SELECT_MACHINE", "machineId": "call-001"}
//! ```
//!
//! Malformed frames fail to decode and are dropped by the session with a
//! warning; the connection stays open.

use serde::Deserialize;

/// One decoded inbound frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action")]
pub enum ClientRequest {
    /// Shorthand: dispatch `IncomingCall` to the session's machine.
    #[serde(rename = "INCOMING_CALL", rename_all = "camelCase")]
    IncomingCall {
        /// Optional caller id forwarded to state handlers as payload.
        #[serde(default)]
        caller_number: Option<String>,
    },

    /// Shorthand: dispatch `Answer` to the session's machine.
    #[serde(rename = "ANSWER")]
    Answer,

    /// Shorthand: dispatch `Hangup` to the session's machine.
    #[serde(rename = "HANGUP")]
    Hangup,

    /// Dispatch a named event to an explicit machine.
    #[serde(rename = "FIRE_EVENT", rename_all = "camelCase")]
    FireEvent {
        /// Target machine id.
        machine_id: String,
        /// Event name as declared in the transition table.
        event: String,
    },

    /// Dispatch with an explicit envelope and payload.
    #[serde(rename = "SEND_EVENT", rename_all = "camelCase")]
    SendEvent {
        /// Target machine id.
        machine_id: String,
        /// Event name as declared in the transition table.
        event_type: String,
        /// Opaque payload handed to state handlers.
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },

    /// Request the current active-machine list.
    #[serde(rename = "GET_MACHINES")]
    GetMachines,

    /// Request the offline-machine list.
    #[serde(rename = "GET_OFFLINE_MACHINES")]
    GetOfflineMachines,

    /// Request the full registry-state snapshot.
    #[serde(rename = "GET_REGISTRY_STATE")]
    GetRegistryState,

    /// Bind this session's tree view to a machine.
    #[serde(rename = "TREEVIEW_ACTION", rename_all = "camelCase")]
    TreeViewAction {
        /// Machine to select.
        machine_id: String,
    },

    /// Bind this session's tree view to a machine (alias).
    #[serde(rename = "SELECT_MACHINE", rename_all = "camelCase")]
    SelectMachine {
        /// Machine to select.
        machine_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_shorthand_actions() {
        let req: ClientRequest =
            serde_json::from_str(r#"{"action":"INCOMING_CALL","callerNumber":"+15551234567"}"#)
                .unwrap();
        assert!(matches!(
            req,
            ClientRequest::IncomingCall { caller_number: Some(n) } if n == "+15551234567"
        ));

        let req: ClientRequest = serde_json::from_str(r#"{"action":"HANGUP"}"#).unwrap();
        assert!(matches!(req, ClientRequest::Hangup));
    }

    #[test]
    fn test_decodes_fire_and_send_event() {
        let req: ClientRequest = serde_json::from_str(
            r#"{"action":"FIRE_EVENT","machineId":"call-001","event":"Answer"}"#,
        )
        .unwrap();
        match req {
            ClientRequest::FireEvent { machine_id, event } => {
                assert_eq!(machine_id, "call-001");
                assert_eq!(event, "Answer");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let req: ClientRequest = serde_json::from_str(
            r#"{"action":"SEND_EVENT","machineId":"m1","eventType":"SessionProgress","payload":{"ring":3}}"#,
        )
        .unwrap();
        match req {
            ClientRequest::SendEvent { payload, .. } => {
                assert_eq!(payload.unwrap()["ring"], 3);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_action() {
        assert!(serde_json::from_str::<ClientRequest>(r#"{"action":"EXPLODE"}"#).is_err());
        assert!(serde_json::from_str::<ClientRequest>("not json").is_err());
    }
}
