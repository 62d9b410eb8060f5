//! Notifications raised for collaborators outside the engine (the frontend,
//! the save scheduler, the pager).

use log::error;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::dependency::DependencyPanel;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotebookEvent {
    /// The document has unsaved changes.
    DirtyChanged { dirty: bool },
    /// A run was handed to the backend.
    CellExecuted { cell_id: String, msg_id: String },
    /// A cell's dependency panel was rebuilt (or removed).
    DependenciesChanged {
        cell_id: String,
        panel: Option<DependencyPanel>,
    },
    /// Show a `page` payload in the side pager.
    OpenPager { cell_id: String, payload: Value },
    /// Replace (or insert) the input of the next cell.
    SetNextInput {
        cell_id: String,
        text: String,
        replace: bool,
        clear_output: bool,
    },
    /// The backend is waiting on stdin.
    InputRequested {
        cell_id: String,
        prompt: String,
        password: bool,
    },
}

pub type EventSender = mpsc::UnboundedSender<NotebookEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<NotebookEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Send an event, logging if nobody is listening anymore.
pub(crate) fn emit(events: &EventSender, event: NotebookEvent) {
    if let Err(e) = events.send(event) {
        error!("[notebook] Failed to emit event: {:?}", e.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(NotebookEvent::CellExecuted {
            cell_id: "c1".to_string(),
            msg_id: "m1".to_string(),
        })
        .unwrap();

        assert_eq!(json["event"], "cell_executed");
        assert_eq!(json["cell_id"], "c1");
        assert_eq!(json["msg_id"], "m1");
    }

    #[test]
    fn test_emit_delivers_in_order() {
        let (tx, mut rx) = event_channel();
        emit(&tx, NotebookEvent::DirtyChanged { dirty: true });
        emit(&tx, NotebookEvent::DirtyChanged { dirty: false });

        assert_eq!(rx.try_recv().unwrap(), NotebookEvent::DirtyChanged { dirty: true });
        assert_eq!(rx.try_recv().unwrap(), NotebookEvent::DirtyChanged { dirty: false });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_without_receiver_does_not_panic() {
        let (tx, rx) = event_channel();
        drop(rx);
        emit(&tx, NotebookEvent::DirtyChanged { dirty: true });
    }
}
