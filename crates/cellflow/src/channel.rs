//! The seam between the engine and whatever actually runs code.
//!
//! A channel accepts a request and returns immediately with a message id.
//! Everything the backend says about that run comes back later as
//! [`ChannelEvent`]s handed to [`crate::Notebook::handle_message`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChannelError;
use crate::execution::ExecutionRequest;
use crate::identity::CellIdentity;

/// Backend-issued id for one run.
pub type MessageId = String;

pub trait ExecutionChannel {
    /// Hand a run to the backend. Must not block on the result.
    fn submit(&mut self, request: &ExecutionRequest) -> Result<MessageId, ChannelError>;

    /// Stop delivering events for `msg_id`. Advisory: the backend keeps
    /// computing.
    fn clear_callbacks(&mut self, msg_id: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    #[default]
    Ok,
    Error,
    Aborted,
}

/// Terminal reply for a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecuteReply {
    pub status: ReplyStatus,
    pub execution_count: Option<i64>,
    /// Identity the backend ran the code under.
    pub identity: Option<CellIdentity>,
    /// Cells this run consumed.
    pub upstream: Vec<CellIdentity>,
    /// Cells that consume this cell's output.
    pub downstream: Vec<CellIdentity>,
}

/// Something the backend reported about an in-flight run.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// An output record tagged with the identity it belongs to. Untagged
    /// outputs belong to the requesting cell.
    Output {
        identity: Option<CellIdentity>,
        output: Value,
    },
    ClearOutput { wait: bool },
    Reply(ExecuteReply),
    /// The run ended without a reply.
    Failed { reason: String },
    SetNextInput {
        text: String,
        replace: bool,
        clear_output: bool,
    },
    Page { payload: Value },
    InputRequest { prompt: String, password: bool },
}
