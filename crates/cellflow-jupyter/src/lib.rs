//! Jupyter wire protocol adapter for `cellflow`.
//!
//! This crate provides the execution channel a notebook uses to talk to a
//! Jupyter kernel:
//!
//! - [`KernelChannel`] turns execution requests into `execute_request`
//!   messages carrying the cell identity and dependency snapshot
//! - [`RawJupyterMessage`] decodes inbound messages into channel events
//! - [`MessageRouter`] drops messages for runs the notebook detached
//! - [`forward_messages`] applies routed events to a shared notebook

mod kernel_channel;
mod message;

pub use kernel_channel::{forward_messages, KernelChannel, MessageRouter};
pub use message::{ConversionError, RawJupyterMessage};
