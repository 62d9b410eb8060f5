//! Execution channel backed by a Jupyter kernel connection.
//!
//! Outgoing `execute_request`s go onto an mpsc sender owned by whatever holds
//! the kernel's shell socket. Inbound messages come back through
//! [`forward_messages`], which keeps only messages for runs the notebook
//! still tracks.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use cellflow::{
    ChannelError, ChannelEvent, ExecutionChannel, ExecutionRequest, MessageId, Notebook,
};
use jupyter_protocol::{ExecuteRequest, JupyterMessage};
use log::{debug, error, info, warn};
use serde_json::json;
use tokio::sync::mpsc;

use crate::message::RawJupyterMessage;

/// msg_ids of requests whose replies the notebook still wants.
type LiveRequests = Arc<Mutex<HashSet<MessageId>>>;

pub struct KernelChannel {
    shell: mpsc::UnboundedSender<JupyterMessage>,
    live: LiveRequests,
}

impl KernelChannel {
    /// Create a channel writing to `shell`, plus the router that filters
    /// the kernel's replies against the requests this channel still tracks.
    pub fn new(shell: mpsc::UnboundedSender<JupyterMessage>) -> (Self, MessageRouter) {
        let live = LiveRequests::default();
        let router = MessageRouter { live: live.clone() };
        (Self { shell, live }, router)
    }
}

impl ExecutionChannel for KernelChannel {
    fn submit(&mut self, request: &ExecutionRequest) -> Result<MessageId, ChannelError> {
        let mut execute = ExecuteRequest::new(request.code.clone());
        execute.stop_on_error = request.stop_on_error;
        let mut message: JupyterMessage = execute.into();
        message.metadata = json!({
            "cell_uuid": request.identity,
            "source": request.cell_snapshots,
        });
        let msg_id = message.header.msg_id.clone();

        // Register before sending so replies racing the send are not dropped
        self.live
            .lock()
            .map_err(|e| ChannelError::Send(e.to_string()))?
            .insert(msg_id.clone());

        if self.shell.send(message).is_err() {
            if let Ok(mut live) = self.live.lock() {
                live.remove(&msg_id);
            }
            return Err(ChannelError::Closed);
        }

        info!(
            "[kernel-channel] Sent execute_request: msg_id={} cell_uuid={}",
            msg_id, request.identity
        );
        Ok(msg_id)
    }

    fn clear_callbacks(&mut self, msg_id: &str) {
        if let Ok(mut live) = self.live.lock() {
            if live.remove(msg_id) {
                debug!("[kernel-channel] Detached msg_id={}", msg_id);
            }
        }
    }
}

/// Decides which inbound messages reach the notebook.
#[derive(Clone)]
pub struct MessageRouter {
    live: LiveRequests,
}

impl MessageRouter {
    fn is_live(&self, msg_id: &str) -> bool {
        self.live
            .lock()
            .map(|live| live.contains(msg_id))
            .unwrap_or(false)
    }

    /// The run a message belongs to and the events it carries, or `None`
    /// when it should be dropped.
    pub fn route(&self, message: &RawJupyterMessage) -> Option<(MessageId, Vec<ChannelEvent>)> {
        let Some(parent) = message.parent_msg_id() else {
            debug!(
                "[kernel-channel] {} has no parent header, dropping",
                message.msg_type()
            );
            return None;
        };
        if !self.is_live(parent) {
            debug!(
                "[kernel-channel] {} for detached msg_id={}, dropping",
                message.msg_type(),
                parent
            );
            return None;
        }

        match message.to_channel_events() {
            Ok(events) if events.is_empty() => None,
            Ok(events) => Some((parent.to_string(), events)),
            Err(e) => {
                warn!("[kernel-channel] Dropping message for msg_id={}: {}", parent, e);
                None
            }
        }
    }
}

/// Apply inbound kernel messages to `notebook` until the sender side closes.
pub async fn forward_messages(
    mut inbound: mpsc::UnboundedReceiver<RawJupyterMessage>,
    router: MessageRouter,
    notebook: Arc<Mutex<Notebook>>,
) {
    while let Some(message) = inbound.recv().await {
        let Some((msg_id, events)) = router.route(&message) else {
            continue;
        };
        let Ok(mut notebook) = notebook.lock() else {
            error!("[kernel-channel] Notebook lock poisoned, stopping");
            return;
        };
        for event in events {
            notebook.handle_message(&msg_id, event);
        }
    }
    info!("[kernel-channel] Inbound channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellflow::{event_channel, CellIdentity, CellKind, ExecutionCounter};
    use jupyter_protocol::JupyterMessageContent;
    use serde_json::Value;

    fn reply_to(msg_id: &str, msg_type: &str, content: Value) -> RawJupyterMessage {
        serde_json::from_value(json!({
            "header": {
                "date": "2025-05-14T14:32:23.490Z",
                "msg_id": format!("{}-{}", msg_type, msg_id),
                "msg_type": msg_type,
                "session": "kernel-session",
                "username": "",
                "version": "5.2"
            },
            "parent_header": {
                "date": "2025-05-14T14:32:23.100Z",
                "msg_id": msg_id,
                "msg_type": "execute_request",
                "session": "client-session",
                "username": "",
                "version": "5.2"
            },
            "metadata": {},
            "content": content
        }))
        .unwrap()
    }

    fn request(code: &str) -> ExecutionRequest {
        ExecutionRequest {
            code: code.to_string(),
            cell_snapshots: Vec::new(),
            identity: "abc".into(),
            stop_on_error: false,
        }
    }

    #[test]
    fn test_submit_sends_execute_request_with_identity() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut channel, _router) = KernelChannel::new(tx);

        let msg_id = channel.submit(&request("x = 1")).unwrap();

        let message = rx.try_recv().unwrap();
        assert_eq!(message.header.msg_id, msg_id);
        assert_eq!(message.header.msg_type, "execute_request");
        assert_eq!(message.metadata["cell_uuid"], "abc");
        assert_eq!(message.metadata["source"], json!([]));
        match &message.content {
            JupyterMessageContent::ExecuteRequest(req) => {
                assert_eq!(req.code, "x = 1");
                assert!(!req.stop_on_error);
            }
            other => panic!("expected execute_request, got {:?}", other),
        }

        let raw = RawJupyterMessage::try_from(message).unwrap();
        assert_eq!(raw.content["code"], "x = 1");
    }

    #[test]
    fn test_submit_on_closed_shell_fails() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let (mut channel, router) = KernelChannel::new(tx);

        let result = channel.submit(&request("x = 1"));

        assert!(matches!(result, Err(ChannelError::Closed)));
        assert!(router.live.lock().unwrap().is_empty());
    }

    #[test]
    fn test_router_drops_detached_requests() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut channel, router) = KernelChannel::new(tx);
        let msg_id = channel.submit(&request("x = 1")).unwrap();
        let stream = reply_to(&msg_id, "stream", json!({"name": "stdout", "text": "1"}));

        assert!(router.route(&stream).is_some());

        channel.clear_callbacks(&msg_id);

        assert!(router.route(&stream).is_none());
    }

    #[test]
    fn test_router_drops_unknown_and_malformed() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut channel, router) = KernelChannel::new(tx);
        let msg_id = channel.submit(&request("x = 1")).unwrap();

        let stranger = reply_to("someone-else", "stream", json!({"name": "stdout", "text": "1"}));
        let malformed = reply_to(&msg_id, "execute_reply", json!({"upstream": 7}));
        let status = reply_to(&msg_id, "status", json!({"execution_state": "busy"}));

        assert!(router.route(&stranger).is_none());
        assert!(router.route(&malformed).is_none());
        assert!(router.route(&status).is_none());
    }

    #[tokio::test]
    async fn test_forward_messages_updates_notebook() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (shell_tx, mut shell_rx) = mpsc::unbounded_channel();
        let (channel, router) = KernelChannel::new(shell_tx);
        let (events, _events_rx) = event_channel();

        let mut notebook = Notebook::new(events);
        notebook.set_channel(Box::new(channel));
        let cell_id = notebook.add_cell(CellKind::Code, None);
        notebook.update_source(&cell_id, "print(1)");
        notebook.execute(&cell_id).unwrap();
        let identity = notebook.cell(&cell_id).unwrap().identity().cloned().unwrap();
        let notebook = Arc::new(Mutex::new(notebook));

        let sent = shell_rx.recv().await.unwrap();
        let msg_id = sent.header.msg_id.clone();

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward_messages(inbound_rx, router, notebook.clone()));

        inbound_tx
            .send(reply_to(
                &msg_id,
                "stream",
                json!({"name": "stdout", "text": "1\n", "cell_uuid": identity.as_str()}),
            ))
            .unwrap();
        inbound_tx
            .send(reply_to(
                &msg_id,
                "execute_reply",
                json!({"status": "ok", "execution_count": 1, "upstream": [], "parent_uuids": ["later"]}),
            ))
            .unwrap();
        drop(inbound_tx);
        forwarder.await.unwrap();

        let notebook = notebook.lock().unwrap();
        let cell = notebook.cell(&cell_id).unwrap().as_code().unwrap();
        assert_eq!(cell.outputs().len(), 1);
        assert_eq!(cell.outputs()[0]["text"], "1\n");
        assert_eq!(cell.execution_counter(), ExecutionCounter::Count(1));
        assert!(!cell.is_running());
        assert_eq!(cell.parent_identities(), &[CellIdentity::from("later")]);
    }
}
