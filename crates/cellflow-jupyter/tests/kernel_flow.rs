//! Drives a notebook through the Jupyter channel the way a kernel would:
//! requests go out on the shell sender, replies come back through
//! `forward_messages`.

use std::sync::{Arc, Mutex};

use cellflow::{event_channel, DependencyAction, Notebook, NotebookEvent};
use cellflow_jupyter::{forward_messages, KernelChannel, RawJupyterMessage};
use jupyter_protocol::JupyterMessage;
use serde_json::{json, Value};
use tokio::sync::mpsc;

fn kernel_message(parent_msg_id: &str, msg_type: &str, content: Value) -> RawJupyterMessage {
    serde_json::from_value(json!({
        "header": {
            "date": "2025-05-14T14:32:23.490Z",
            "msg_id": format!("{}-{}", msg_type, parent_msg_id),
            "msg_type": msg_type,
            "session": "kernel-session",
            "username": "",
            "version": "5.2"
        },
        "parent_header": {
            "date": "2025-05-14T14:32:23.100Z",
            "msg_id": parent_msg_id,
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

fn notebook_json() -> String {
    json!({
        "cells": [
            {"cell_type": "code", "id": "a", "source": "x = 1", "cell_uuid": "A_id",
             "execution_count": null, "outputs": [], "metadata": {}},
            {"cell_type": "markdown", "id": "m", "source": "notes", "metadata": {}},
            {"cell_type": "code", "id": "b", "source": "y = x + 1", "cell_uuid": "B_id",
             "execution_count": null, "outputs": [], "metadata": {}}
        ],
        "metadata": {},
        "nbformat": 4,
        "nbformat_minor": 5
    })
    .to_string()
}

#[tokio::test]
async fn test_reply_edges_drive_downstream_execution() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (shell_tx, mut shell_rx) = mpsc::unbounded_channel::<JupyterMessage>();
    let (channel, router) = KernelChannel::new(shell_tx);
    let (events, mut events_rx) = event_channel();
    let mut notebook = Notebook::from_json(&notebook_json(), events).unwrap();
    notebook.set_channel(Box::new(channel));
    notebook.execute("a").unwrap();
    let notebook = Arc::new(Mutex::new(notebook));

    let first = shell_rx.recv().await.unwrap();
    assert_eq!(first.metadata["cell_uuid"], "A_id");
    let snapshots = first.metadata["source"].as_array().unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[1]["cell_uuid"], "B_id");
    assert_eq!(snapshots[1]["edited"], true);

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(forward_messages(inbound_rx, router, notebook.clone()));
    let parent = first.header.msg_id.clone();
    inbound_tx
        .send(kernel_message(
            &parent,
            "execute_result",
            json!({"execution_count": "A_id", "data": {"text/plain": "1"}, "metadata": {}}),
        ))
        .unwrap();
    inbound_tx
        .send(kernel_message(
            &parent,
            "execute_reply",
            json!({
                "status": "ok",
                "execution_count": 1,
                "cell_uuid": "A_id",
                "upstream": [],
                "parent_uuids": ["B_id"],
                "payload": [{"source": "set_next_input", "text": "z = 3", "replace": false}]
            }),
        ))
        .unwrap();
    drop(inbound_tx);
    forwarder.await.unwrap();

    let seen: Vec<_> = std::iter::from_fn(|| events_rx.try_recv().ok()).collect();
    assert!(seen.iter().any(|e| matches!(
        e,
        NotebookEvent::SetNextInput { text, replace: false, .. } if text == "z = 3"
    )));
    assert!(seen.iter().any(|e| matches!(
        e,
        NotebookEvent::DependenciesChanged { cell_id, panel: Some(_) } if cell_id == "a"
    )));

    let started = {
        let mut notebook = notebook.lock().unwrap();
        let cell = notebook.cell("a").unwrap().as_code().unwrap();
        assert_eq!(cell.outputs().len(), 1);
        assert_eq!(cell.outputs()[0]["output_type"], "execute_result");
        notebook.apply_dependency_action("a", DependencyAction::ExecuteAllDownstream)
    };

    assert_eq!(started.len(), 1);
    let second = shell_rx.recv().await.unwrap();
    assert_eq!(second.header.msg_id, started[0]);
    assert_eq!(second.metadata["cell_uuid"], "B_id");
}
