//! HMR wire protocol.
//!
//! JSON messages exchanged over the dev-server WebSocket. Server → client
//! payloads are tagged with a lowercase `type`; client → server payloads use
//! camelCase type tags.

use serde::{Deserialize, Serialize};

/// Server → client HMR message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HmrMessage {
    /// Sent once when a client connects.
    Connected,
    /// A hot update for the listed modules.
    Update {
        /// The changed file, as a root-relative URL path.
        path: String,
        /// Affected module URL paths (change plus transitive importers).
        modules: Vec<String>,
        /// Change timestamp in milliseconds since the epoch.
        timestamp: u64,
    },
    /// Full page reload.
    Reload,
    /// A build or transform error to show in the client overlay.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
    /// A module left the graph; clients should drop its state.
    Prune { path: String },
}

impl HmrMessage {
    /// Serialize to the wire format.
    #[must_use]
    pub fn to_json(&self) -> String {
        // The enum has no non-serializable fields, so this cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Client → server HMR message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// The module at `path` registered a hot-accept handler.
    HotAccept { path: String },
    /// The module at `path` declined hot updates.
    Decline { path: String },
    /// The client invalidated `path`; the server should re-broadcast.
    Invalidate { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_wire_format() {
        assert_eq!(HmrMessage::Reload.to_json(), r#"{"type":"reload"}"#);
    }

    #[test]
    fn test_connected_wire_format() {
        assert_eq!(HmrMessage::Connected.to_json(), r#"{"type":"connected"}"#);
    }

    #[test]
    fn test_update_wire_format() {
        let msg = HmrMessage::Update {
            path: "/src/app.ts".to_string(),
            modules: vec!["/src/app.ts".to_string(), "/src/main.ts".to_string()],
            timestamp: 1234,
        };
        let json = msg.to_json();
        assert!(json.contains(r#""type":"update""#));
        assert!(json.contains(r#""path":"/src/app.ts""#));
        assert!(json.contains(r#""timestamp":1234"#));

        let parsed: HmrMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_error_omits_missing_stack() {
        let msg = HmrMessage::Error {
            message: "boom".to_string(),
            stack: None,
        };
        assert_eq!(msg.to_json(), r#"{"type":"error","message":"boom"}"#);
    }

    #[test]
    fn test_client_messages_parse() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"hotAccept","path":"/src/app.ts"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::HotAccept {
                path: "/src/app.ts".to_string()
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"decline","path":"/x.ts"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Decline { .. }));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"invalidate","path":"/x.ts"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Invalidate { .. }));
    }
}
