//! Cell identity and dependency propagation for notebook documents.
//!
//! Each code cell gets a stable identity on its first run. The execution
//! backend reports, per run, which cells fed the run (upstream) and which
//! cells consumed this cell's output (downstream). This crate keeps those
//! identities, fans streamed outputs out to every cell carrying the reported
//! identity, and turns the reported edges into select/execute actions.
//!
//! # Components
//!
//! - [`IdentityRegistry`] mints and tracks identities
//! - [`token_index`] offers prefix completion from visible tokens and identities
//! - [`ExecutionRequest`] is the payload handed to an [`ExecutionChannel`]
//! - [`ResultDispatcher`] routes channel events to cells
//! - [`DependencyPanel`] and [`DependencyAction`] expose the reported edges
//! - [`snapshot`] maps cells to and from persisted records
//! - [`Notebook`] owns the cells and wires it all together

pub mod cell;
pub mod channel;
pub mod dependency;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod execution;
pub mod identity;
pub mod notebook;
pub mod output_area;
pub mod settings;
pub mod snapshot;
pub mod token_index;

pub use cell::{Cell, CellKind, CellView, CodeCell, ExecutionCounter, Highlight, TextCell};
pub use channel::{ChannelEvent, ExecuteReply, ExecutionChannel, MessageId, ReplyStatus};
pub use dependency::{DependencyAction, DependencyPanel};
pub use dispatcher::{Dispatched, ResultDispatcher, RunState};
pub use error::{ChannelError, EngineError};
pub use events::{event_channel, EventReceiver, EventSender, NotebookEvent};
pub use execution::{ExecutionRequest, SourceSnapshot};
pub use identity::{CellIdentity, IdentityAssignment, IdentityRegistry};
pub use notebook::{ExecuteOutcome, Notebook, SkipReason};
pub use settings::{EngineSettings, PromptStyle};
pub use snapshot::{CellRecord, NotebookRecord};
pub use token_index::Suggestion;
