//! Outgoing envelope construction.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::message::{Channel, Header, WireMessage};

const DEFAULT_USERNAME: &str = "username";
const DEFAULT_PROTOCOL_VERSION: &str = "5.2";

/// Stamps outgoing envelopes for one transport instance.
///
/// Pure apart from the monotonic message counter and the clock: given the
/// same counter value and parent, [`MessageFactory::format`] produces the
/// same envelope modulo the `date` field. Message ids are
/// `"{session}_{count}"` and unique for the factory's lifetime.
#[derive(Debug, Default)]
pub struct MessageFactory {
    count: u64,
}

impl MessageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of envelopes stamped so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Wrap `content` in a protocol envelope correlated to `parent`.
    ///
    /// Header fields are copied from the parent header where present
    /// (`session`, `username`, `version`) and defaulted otherwise; the
    /// channel falls back to the parent's channel when not supplied.
    pub fn format(
        &mut self,
        parent: Option<&WireMessage>,
        msg_type: &str,
        content: Value,
        channel: Option<Channel>,
    ) -> WireMessage {
        let parent_header = parent.map(|parent| parent.header.clone());
        let template = parent_header.clone().unwrap_or_default();

        let session = template.session;
        let username = if template.username.is_empty() {
            DEFAULT_USERNAME.to_string()
        } else {
            template.username
        };
        let version = if template.version.is_empty() {
            DEFAULT_PROTOCOL_VERSION.to_string()
        } else {
            template.version
        };

        let msg_id = format!("{}_{}", session, self.count);
        self.count += 1;

        let date = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let channel = channel.or_else(|| parent.and_then(|parent| parent.channel));

        WireMessage {
            header: Header {
                msg_id: msg_id.clone(),
                msg_type: msg_type.to_string(),
                username,
                session,
                date,
                version,
            },
            msg_id,
            msg_type: msg_type.to_string(),
            parent_header,
            metadata: json!({}),
            content,
            buffers: Vec::new(),
            channel,
        }
    }

    /// `status` envelope with `execution_state: "busy"` on iopub.
    pub fn status_busy(&mut self, parent: Option<&WireMessage>) -> WireMessage {
        self.status(parent, "busy")
    }

    /// `status` envelope with `execution_state: "idle"` on iopub.
    pub fn status_idle(&mut self, parent: Option<&WireMessage>) -> WireMessage {
        self.status(parent, "idle")
    }

    fn status(&mut self, parent: Option<&WireMessage>, state: &str) -> WireMessage {
        self.format(
            parent,
            "status",
            json!({ "execution_state": state }),
            Some(Channel::Iopub),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parent() -> WireMessage {
        serde_json::from_value(json!({
            "header": {
                "msg_id": "abc_7",
                "msg_type": "execute_request",
                "username": "jo",
                "session": "abc",
                "date": "2026-01-01T00:00:00.000Z",
                "version": "5.3"
            },
            "channel": "shell",
            "content": {"code": "x"}
        }))
        .unwrap()
    }

    #[test]
    fn header_fields_copied_from_parent() {
        let mut factory = MessageFactory::new();
        let parent = parent();
        let message = factory.format(Some(&parent), "execute_reply", json!({}), None);

        assert_eq!(message.header.session, "abc");
        assert_eq!(message.header.username, "jo");
        assert_eq!(message.header.version, "5.3");
        assert_eq!(message.parent_header, Some(parent.header.clone()));
        // Channel falls back to the parent's when not supplied.
        assert_eq!(message.channel, Some(Channel::Shell));
    }

    #[test]
    fn missing_parent_fields_are_defaulted() {
        let mut factory = MessageFactory::new();
        let message = factory.format(None, "kernel_info_reply", json!({"status": "ok"}), None);

        assert_eq!(message.header.session, "");
        assert_eq!(message.header.username, "username");
        assert_eq!(message.header.version, "5.2");
        assert!(message.parent_header.is_none());
        assert_eq!(message.channel, None);
    }

    #[test]
    fn msg_id_is_session_plus_counter_and_strictly_increases() {
        let mut factory = MessageFactory::new();
        let parent = parent();

        let first = factory.format(Some(&parent), "status", json!({}), None);
        let second = factory.format(Some(&parent), "status", json!({}), None);
        let third = factory.format(None, "status", json!({}), None);

        assert_eq!(first.msg_id, "abc_0");
        assert_eq!(second.msg_id, "abc_1");
        // The counter is per-factory, not per-session.
        assert_eq!(third.msg_id, "_2");
        assert_eq!(first.header.msg_id, first.msg_id);
        assert_eq!(factory.count(), 3);
    }

    #[test]
    fn explicit_channel_wins_over_parent() {
        let mut factory = MessageFactory::new();
        let parent = parent();
        let message = factory.format(Some(&parent), "stream", json!({}), Some(Channel::Iopub));
        assert_eq!(message.channel, Some(Channel::Iopub));
    }

    #[test]
    fn status_helpers_set_execution_state() {
        let mut factory = MessageFactory::new();
        let parent = parent();

        let busy = factory.status_busy(Some(&parent));
        assert_eq!(busy.msg_type, "status");
        assert_eq!(busy.channel, Some(Channel::Iopub));
        assert_eq!(busy.content, json!({"execution_state": "busy"}));

        let idle = factory.status_idle(Some(&parent));
        assert_eq!(idle.content, json!({"execution_state": "idle"}));
    }

    #[test]
    fn envelope_serializes_with_full_field_set() {
        let mut factory = MessageFactory::new();
        let parent = parent();
        let value =
            serde_json::to_value(factory.format(Some(&parent), "execute_input", json!({}), None))
                .unwrap();

        for key in [
            "header",
            "msg_id",
            "msg_type",
            "parent_header",
            "metadata",
            "content",
            "buffers",
            "channel",
        ] {
            assert!(value.get(key).is_some(), "missing field {key}");
        }
        assert_eq!(value["metadata"], json!({}));
        assert_eq!(value["buffers"], json!([]));
    }
}
