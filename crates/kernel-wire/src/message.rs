//! The protocol envelope the notebook UI pattern-matches on.

use bytes::Bytes;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::base64::{deserialize_buffers, serialize_buffers};

/// Logical sub-channel multiplexed over the single transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Shell,
    Iopub,
    Stdin,
}

/// Envelope header.
///
/// Incoming frames may omit any field; every field defaults to the empty
/// string so a sparse header still parses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub msg_id: String,
    #[serde(default)]
    pub msg_type: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub version: String,
}

/// One protocol message as it crosses the emulated socket.
///
/// `msg_id` and `msg_type` are duplicated at the top level because the
/// consuming UI's output rendering reads them there; the duplication is
/// part of the wire contract, not a convenience.
///
/// `parent_header` serializes as `{}` when absent, and `{}`, `null` or a
/// missing field all deserialize back to absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub header: Header,

    #[serde(default)]
    pub msg_id: String,

    #[serde(default)]
    pub msg_type: String,

    #[serde(
        default,
        serialize_with = "serialize_parent_header",
        deserialize_with = "deserialize_parent_header"
    )]
    pub parent_header: Option<Header>,

    #[serde(default)]
    pub metadata: Value,

    #[serde(default)]
    pub content: Value,

    #[serde(
        default,
        serialize_with = "serialize_buffers",
        deserialize_with = "deserialize_buffers"
    )]
    pub buffers: Vec<Bytes>,

    #[serde(default)]
    pub channel: Option<Channel>,
}

/// Serialize an absent parent header as the empty object the UI expects.
pub fn serialize_parent_header<S>(
    header: &Option<Header>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match header {
        Some(header) => header.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

/// Deserialize a parent header that may be `{}`, `null` or missing.
pub fn deserialize_parent_header<'de, D>(deserializer: D) -> Result<Option<Header>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) if map.is_empty() => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shell_frame(parent_header: Value) -> String {
        json!({
            "header": {
                "msg_id": "sess_0",
                "msg_type": "execute_request",
                "username": "username",
                "session": "sess",
                "date": "2026-01-01T00:00:00.000Z",
                "version": "5.2"
            },
            "parent_header": parent_header,
            "metadata": {},
            "content": {"code": "1+1"},
            "buffers": [],
            "channel": "shell"
        })
        .to_string()
    }

    #[test]
    fn empty_parent_header_parses_as_absent() {
        let message: WireMessage = serde_json::from_str(&shell_frame(json!({}))).unwrap();
        assert!(message.parent_header.is_none());
        assert_eq!(message.channel, Some(Channel::Shell));
        assert_eq!(message.header.msg_type, "execute_request");
    }

    #[test]
    fn null_parent_header_parses_as_absent() {
        let message: WireMessage = serde_json::from_str(&shell_frame(json!(null))).unwrap();
        assert!(message.parent_header.is_none());
    }

    #[test]
    fn populated_parent_header_is_kept() {
        let parent = json!({"msg_id": "sess_1", "msg_type": "status", "session": "sess"});
        let message: WireMessage = serde_json::from_str(&shell_frame(parent)).unwrap();
        let header = message.parent_header.unwrap();
        assert_eq!(header.msg_id, "sess_1");
        // Omitted header fields default to empty.
        assert_eq!(header.username, "");
    }

    #[test]
    fn absent_parent_header_serializes_as_empty_object() {
        let message: WireMessage = serde_json::from_str(&shell_frame(json!({}))).unwrap();
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["parent_header"], json!({}));
    }

    #[test]
    fn sparse_incoming_frame_parses() {
        // The UI is only guaranteed to send a header and a channel.
        let raw = json!({
            "header": {"msg_type": "kernel_info_request", "session": "s"},
            "channel": "shell"
        })
        .to_string();
        let message: WireMessage = serde_json::from_str(&raw).unwrap();
        assert_eq!(message.header.msg_type, "kernel_info_request");
        assert!(message.buffers.is_empty());
        assert!(message.content.is_null());
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let raw = json!({
            "header": {"msg_type": "flush"},
            "channel": "control"
        })
        .to_string();
        assert!(serde_json::from_str::<WireMessage>(&raw).is_err());
    }
}
