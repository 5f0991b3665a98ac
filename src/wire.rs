//! JSON wire frames exchanged with the relay.
//!
//! All frames are JSON text messages, dispatched on a `type` tag with
//! snake_case keys — the shape the relay's decoder expects. `sig` is a
//! reserved field for a future frame signature and is currently always null
//! on every frame (see [`crate::signer`]); the relay accepts null there.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::identity::ProcessInfo;

/// Kind of application event carried by a `message` frame.
///
/// `Result` and `Error` are terminal application-state signals, informational
/// to the relay; the client enforces no local transition on sending them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgType {
    Status,
    Result,
    Error,
}

impl MsgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MsgType::Status => "Status",
            MsgType::Result => "Result",
            MsgType::Error => "Error",
        }
    }
}

// ─── Client → relay ─────────────────────────────────────────────

/// Top-level envelope sent to the relay; the `type` tag drives dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Register(RegisterFrame),
    ReRegister(ReRegisterFrame),
    Message(MessageFrame),
    Disconnect(DisconnectFrame),
}

impl ClientFrame {
    /// Returns the frame with its signature slot filled in.
    ///
    /// `disconnect` carries no signature slot and is returned unchanged.
    pub fn with_sig(self, sig: Option<String>) -> Self {
        match self {
            ClientFrame::Register(f) => ClientFrame::Register(RegisterFrame { sig, ..f }),
            ClientFrame::ReRegister(f) => ClientFrame::ReRegister(ReRegisterFrame { sig, ..f }),
            ClientFrame::Message(f) => ClientFrame::Message(MessageFrame { sig, ..f }),
            ClientFrame::Disconnect(f) => ClientFrame::Disconnect(f),
        }
    }
}

/// First frame on the first connection of the client's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterFrame {
    pub app_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub app_name: String,
    pub child_pub_key: String,
    pub process_info: ProcessInfo,
    #[serde(default)]
    pub role_refs: Vec<String>,
    pub sig: Option<String>,
}

/// First frame on every reconnect; `last_seq` lets the relay detect gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReRegisterFrame {
    pub app_id: Uuid,
    pub last_seq: i64,
    pub pub_key: String,
    pub sig: Option<String>,
}

/// Application event: Status, Result, or Error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageFrame {
    pub app_id: Uuid,
    pub header: MsgHeader,
    pub payload: JsonValue,
    pub sig: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgHeader {
    pub msg_type: MsgType,
    /// Epoch milliseconds, stamped at transmission time.
    pub timestamp: i64,
    pub seq: i64,
    pub correlation_id: Option<String>,
}

/// Intentional termination, distinguishing graceful exit from a crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectFrame {
    pub app_id: Uuid,
    pub reason: String,
}

// ─── Relay → client ─────────────────────────────────────────────

/// Frames the relay sends back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Registered(RegisteredFrame),
    Ack(AckFrame),
    Error(ServerErrorFrame),
}

/// Acknowledges a `register`/`re_register` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredFrame {
    pub app_id: Uuid,
    pub server_pub_key: String,
}

/// Acknowledges a data message by sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckFrame {
    pub seq: i64,
}

/// Protocol-level rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerErrorFrame {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity;

    #[test]
    fn test_register_frame_shape() {
        let frame = ClientFrame::Register(RegisterFrame {
            app_id: Uuid::new_v4(),
            parent_id: None,
            app_name: "demo".into(),
            child_pub_key: "ed25519:AAAA".into(),
            process_info: identity::collect(),
            role_refs: vec!["reader".into()],
            sig: None,
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "register");
        assert_eq!(value["app_name"], "demo");
        assert_eq!(value["child_pub_key"], "ed25519:AAAA");
        assert!(value["sig"].is_null());
        assert!(value["process_info"]["pid"].is_i64());
    }

    #[test]
    fn test_re_register_frame_shape() {
        let frame = ClientFrame::ReRegister(ReRegisterFrame {
            app_id: Uuid::new_v4(),
            last_seq: 17,
            pub_key: "ed25519:BBBB".into(),
            sig: None,
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "re_register");
        assert_eq!(value["last_seq"], 17);
        assert!(value["sig"].is_null());
    }

    #[test]
    fn test_message_frame_shape() {
        let frame = ClientFrame::Message(MessageFrame {
            app_id: Uuid::new_v4(),
            header: MsgHeader {
                msg_type: MsgType::Status,
                timestamp: 1_740_000_000_000,
                seq: 1,
                correlation_id: None,
            },
            payload: serde_json::json!({"phase": "processing", "progress": 0.5}),
            sig: None,
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["header"]["msg_type"], "Status");
        assert_eq!(value["header"]["seq"], 1);
        assert!(value["header"]["correlation_id"].is_null());
        assert_eq!(value["payload"]["progress"], 0.5);
    }

    #[test]
    fn test_disconnect_frame_shape() {
        let frame = ClientFrame::Disconnect(DisconnectFrame {
            app_id: Uuid::new_v4(),
            reason: "completed".into(),
        });
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "disconnect");
        assert_eq!(value["reason"], "completed");
    }

    #[test]
    fn test_with_sig_fills_slot() {
        let frame = ClientFrame::ReRegister(ReRegisterFrame {
            app_id: Uuid::new_v4(),
            last_seq: 3,
            pub_key: "k".into(),
            sig: None,
        });
        let signed = frame.with_sig(Some("sig-bytes".into()));
        match signed {
            ClientFrame::ReRegister(f) => assert_eq!(f.sig.as_deref(), Some("sig-bytes")),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_server_frames_parse() {
        let registered: ServerFrame = serde_json::from_str(&format!(
            r#"{{"type":"registered","app_id":"{}","server_pub_key":"ed25519:CCCC"}}"#,
            Uuid::new_v4()
        ))
        .unwrap();
        assert!(matches!(registered, ServerFrame::Registered(_)));

        let ack: ServerFrame = serde_json::from_str(r#"{"type":"ack","seq":5}"#).unwrap();
        match ack {
            ServerFrame::Ack(a) => assert_eq!(a.seq, 5),
            other => panic!("unexpected frame: {other:?}"),
        }

        let err: ServerFrame = serde_json::from_str(
            r#"{"type":"error","code":"registration_failed","message":"nope"}"#,
        )
        .unwrap();
        match err {
            ServerFrame::Error(e) => assert_eq!(e.code, "registration_failed"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_msg_type_as_str() {
        assert_eq!(MsgType::Status.as_str(), "Status");
        assert_eq!(MsgType::Result.as_str(), "Result");
        assert_eq!(MsgType::Error.as_str(), "Error");
    }
}
