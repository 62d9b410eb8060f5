//! Inbound Jupyter messages and their translation into channel events.

use cellflow::{CellIdentity, ChannelEvent, ExecuteReply, ReplyStatus};
use jupyter_protocol::{Channel, Header, JupyterMessage};
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Error type for message conversion failures.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Malformed {msg_type} message: {reason}")]
    Malformed { msg_type: String, reason: String },
}

/// A Jupyter message with its content left as raw JSON.
///
/// Dependency-aware kernels add fields (`cell_uuid`, `upstream`,
/// `parent_uuids`) that typed message contents would discard, so inbound
/// messages are decoded from here.
#[derive(Debug, Clone, Deserialize)]
pub struct RawJupyterMessage {
    pub header: Header,

    #[serde(
        default,
        deserialize_with = "jupyter_protocol::deserialize_parent_header"
    )]
    pub parent_header: Option<Header>,

    #[serde(default)]
    pub metadata: Value,

    /// Raw JSON content, interpreted based on header.msg_type
    pub content: Value,

    #[serde(default)]
    pub channel: Option<Channel>,
}

impl TryFrom<JupyterMessage> for RawJupyterMessage {
    type Error = ConversionError;

    fn try_from(msg: JupyterMessage) -> Result<Self, Self::Error> {
        Ok(RawJupyterMessage {
            content: serde_json::to_value(&msg.content)?,
            header: msg.header,
            parent_header: msg.parent_header,
            metadata: msg.metadata,
            channel: msg.channel,
        })
    }
}

impl RawJupyterMessage {
    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    /// The request this message answers, if any.
    pub fn parent_msg_id(&self) -> Option<&str> {
        self.parent_header.as_ref().map(|h| h.msg_id.as_str())
    }

    /// Translate into the events a notebook understands. Message types the
    /// engine has no use for yield no events.
    pub fn to_channel_events(&self) -> Result<Vec<ChannelEvent>, ConversionError> {
        let msg_type = self.msg_type();
        match msg_type {
            "stream" | "display_data" | "execute_result" | "error" => {
                let content = self.content_object()?;
                Ok(vec![ChannelEvent::Output {
                    identity: reported_identity(content),
                    output: output_record(msg_type, content),
                }])
            }
            "clear_output" => {
                let content = self.content_object()?;
                let wait = content.get("wait").and_then(Value::as_bool).unwrap_or(false);
                Ok(vec![ChannelEvent::ClearOutput { wait }])
            }
            "execute_reply" => self.execute_reply_events(),
            "input_request" => {
                let content = self.content_object()?;
                Ok(vec![ChannelEvent::InputRequest {
                    prompt: str_field(content, "prompt").unwrap_or_default().to_string(),
                    password: content
                        .get("password")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                }])
            }
            _ => {
                debug!("[kernel-channel] Ignoring {} message", msg_type);
                Ok(Vec::new())
            }
        }
    }

    fn content_object(&self) -> Result<&Map<String, Value>, ConversionError> {
        self.content
            .as_object()
            .ok_or_else(|| self.malformed("content is not an object"))
    }

    fn malformed(&self, reason: impl Into<String>) -> ConversionError {
        ConversionError::Malformed {
            msg_type: self.msg_type().to_string(),
            reason: reason.into(),
        }
    }

    fn identity_list(
        &self,
        content: &Map<String, Value>,
        key: &str,
    ) -> Result<Vec<CellIdentity>, ConversionError> {
        match content.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(CellIdentity::from)
                        .ok_or_else(|| self.malformed(format!("{} holds a non-string entry", key)))
                })
                .collect(),
            Some(_) => Err(self.malformed(format!("{} is not a list", key))),
        }
    }

    /// Payload events first, then the terminal reply.
    fn execute_reply_events(&self) -> Result<Vec<ChannelEvent>, ConversionError> {
        let content = self.content_object()?;

        let status = match content.get("status") {
            Some(status) => serde_json::from_value::<ReplyStatus>(status.clone())
                .map_err(|_| self.malformed(format!("unknown status {}", status)))?,
            None => ReplyStatus::Ok,
        };
        let reply = ExecuteReply {
            status,
            execution_count: content.get("execution_count").and_then(Value::as_i64),
            identity: reported_identity(content),
            upstream: self.identity_list(content, "upstream")?,
            downstream: self.identity_list(content, "parent_uuids")?,
        };

        let mut events: Vec<ChannelEvent> = content
            .get("payload")
            .and_then(Value::as_array)
            .map(|payloads| payloads.iter().filter_map(payload_event).collect())
            .unwrap_or_default();
        events.push(ChannelEvent::Reply(reply));
        Ok(events)
    }
}

fn str_field<'a>(content: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    content.get(key).and_then(Value::as_str)
}

/// The identity an output or reply names: `cell_uuid`, or an
/// `execution_count` that carries a string instead of a number.
fn reported_identity(content: &Map<String, Value>) -> Option<CellIdentity> {
    str_field(content, "cell_uuid")
        .or_else(|| str_field(content, "execution_count"))
        .map(CellIdentity::from)
}

/// nbformat output record for an iopub output message.
fn output_record(msg_type: &str, content: &Map<String, Value>) -> Value {
    let mut output = content.clone();
    output.remove("cell_uuid");
    output.remove("transient");
    if output.get("execution_count").is_some_and(Value::is_string) {
        output.insert("execution_count".to_string(), Value::Null);
    }
    output.insert(
        "output_type".to_string(),
        Value::String(msg_type.to_string()),
    );
    Value::Object(output)
}

fn payload_event(payload: &Value) -> Option<ChannelEvent> {
    match payload.get("source").and_then(Value::as_str)? {
        "set_next_input" => Some(ChannelEvent::SetNextInput {
            text: payload
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            replace: payload
                .get("replace")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            clear_output: payload
                .get("clear_output")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }),
        "page" => Some(ChannelEvent::Page {
            payload: payload.get("data").cloned().unwrap_or(Value::Null),
        }),
        other => {
            debug!("[kernel-channel] Ignoring {} payload", other);
            None
        }
    }
}
