use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::ProtocolError;
use crate::process::Role;

// ============================================================================
// Control Messages
// ============================================================================
//
// Every frame on the control channel is a JSON object carrying a `kind`
// discriminator. Direction is implied by the kind:
//
//   inbound   ConnTest, Start, Start_l, Start_w, Stop, Stop_l, Stop_w,
//             RewardChange
//   outbound  ConnTest (with status), LearnerOutput, WorkerOutput
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnStatus {
    #[serde(rename = "OK")]
    Ok,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ControlMessage {
    /// Channel handshake; echoed back with `status: "OK"`
    ConnTest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<ConnStatus>,
        value: Number,
    },

    /// Start the trainer, then the simulator after the settle delay
    Start,

    #[serde(rename = "Start_l")]
    StartTrainer,

    #[serde(rename = "Start_w")]
    StartSimulator,

    /// Stop the trainer, then the simulator
    Stop,

    #[serde(rename = "Stop_l")]
    StopTrainer,

    #[serde(rename = "Stop_w")]
    StopSimulator,

    /// Replace the reward weighting. Both arrays are validated by the receiver,
    /// so absent or null arrays still decode.
    RewardChange {
        #[serde(default)]
        rewards: Option<Vec<String>>,
        #[serde(default)]
        weights: Option<Vec<f64>>,
    },

    LearnerOutput {
        data: String,
    },

    WorkerOutput {
        data: String,
    },
}

impl ControlMessage {
    pub fn conn_test_reply(value: Number) -> Self {
        ControlMessage::ConnTest {
            status: Some(ConnStatus::Ok),
            value,
        }
    }

    /// Outbound message carrying one captured line from `role`
    pub fn output(role: Role, data: impl Into<String>) -> Self {
        let data = data.into();
        match role {
            Role::Trainer => ControlMessage::LearnerOutput { data },
            Role::Simulator => ControlMessage::WorkerOutput { data },
        }
    }

    /// Wire name of the message kind
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::ConnTest { .. } => "ConnTest",
            ControlMessage::Start => "Start",
            ControlMessage::StartTrainer => "Start_l",
            ControlMessage::StartSimulator => "Start_w",
            ControlMessage::Stop => "Stop",
            ControlMessage::StopTrainer => "Stop_l",
            ControlMessage::StopSimulator => "Stop_w",
            ControlMessage::RewardChange { .. } => "RewardChange",
            ControlMessage::LearnerOutput { .. } => "LearnerOutput",
            ControlMessage::WorkerOutput { .. } => "WorkerOutput",
        }
    }

    /// True for kinds only the supervisor emits. A `ConnTest` that already
    /// carries a status is a reply, not a request.
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            ControlMessage::ConnTest { status: Some(_), .. }
                | ControlMessage::LearnerOutput { .. }
                | ControlMessage::WorkerOutput { .. }
        )
    }

    /// Decode a frame received by the supervisor.
    pub fn decode_inbound(frame: Value) -> Result<Self, ProtocolError> {
        let kind = match frame.get("kind") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(ProtocolError::MissingKind),
        };

        let message: ControlMessage = serde_json::from_value(frame)
            .map_err(|source| ProtocolError::Malformed { kind: kind.clone(), source })?;

        if message.is_outbound() {
            return Err(ProtocolError::UnexpectedDirection(kind));
        }

        Ok(message)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_lifecycle_kinds() {
        let cases = vec![
            ("Start", ControlMessage::Start),
            ("Start_l", ControlMessage::StartTrainer),
            ("Start_w", ControlMessage::StartSimulator),
            ("Stop", ControlMessage::Stop),
            ("Stop_l", ControlMessage::StopTrainer),
            ("Stop_w", ControlMessage::StopSimulator),
        ];

        for (kind, expected) in cases {
            let decoded = ControlMessage::decode_inbound(json!({ "kind": kind })).unwrap();
            assert_eq!(decoded, expected);
            assert_eq!(decoded.kind(), kind);
        }
    }

    #[test]
    fn test_conn_test_reply_wire_format() {
        let request = ControlMessage::decode_inbound(json!({ "kind": "ConnTest", "value": 7 })).unwrap();
        let value = match request {
            ControlMessage::ConnTest { status: None, value } => value,
            other => panic!("unexpected message: {:?}", other),
        };

        let reply = serde_json::to_value(ControlMessage::conn_test_reply(value)).unwrap();
        assert_eq!(reply, json!({ "kind": "ConnTest", "status": "OK", "value": 7 }));
    }

    #[test]
    fn test_reward_change_tolerates_missing_arrays() {
        let decoded = ControlMessage::decode_inbound(json!({
            "kind": "RewardChange",
            "rewards": null
        }))
        .unwrap();

        assert_eq!(
            decoded,
            ControlMessage::RewardChange { rewards: None, weights: None }
        );
    }

    #[test]
    fn test_missing_kind_is_rejected() {
        let result = ControlMessage::decode_inbound(json!({ "value": 1 }));
        assert!(matches!(result, Err(ProtocolError::MissingKind)));

        let result = ControlMessage::decode_inbound(json!({ "kind": 3 }));
        assert!(matches!(result, Err(ProtocolError::MissingKind)));
    }

    #[test]
    fn test_unknown_kind_is_malformed() {
        let result = ControlMessage::decode_inbound(json!({ "kind": "Reboot" }));
        assert!(matches!(result, Err(ProtocolError::Malformed { ref kind, .. }) if kind == "Reboot"));
    }

    #[test]
    fn test_outbound_kinds_rejected_inbound() {
        let result = ControlMessage::decode_inbound(json!({ "kind": "LearnerOutput", "data": "x" }));
        assert!(matches!(result, Err(ProtocolError::UnexpectedDirection(_))));

        let result = ControlMessage::decode_inbound(json!({ "kind": "ConnTest", "status": "OK", "value": 1 }));
        assert!(matches!(result, Err(ProtocolError::UnexpectedDirection(_))));
    }

    #[test]
    fn test_output_kind_follows_role() {
        let trainer = serde_json::to_value(ControlMessage::output(Role::Trainer, "ready")).unwrap();
        let simulator = serde_json::to_value(ControlMessage::output(Role::Simulator, "ready")).unwrap();

        assert_eq!(trainer, json!({ "kind": "LearnerOutput", "data": "ready" }));
        assert_eq!(simulator, json!({ "kind": "WorkerOutput", "data": "ready" }));
    }
}
