//! Routing of streamed run results to cells.
//!
//! Each run is tracked by the message id the channel returned for it. Output
//! messages are fanned out by reported identity to every cell that carries
//! it, so one run can refresh several cells. Each identity's outputs are
//! cleared once per run, on the first message that names it.

use std::collections::{HashMap, HashSet};

use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::cell::{Cell, CodeCell, ExecutionCounter};
use crate::channel::{ChannelEvent, ExecuteReply, MessageId, ReplyStatus};
use crate::dependency::{merge_downstream, DependencyPanel};
use crate::events::NotebookEvent;
use crate::identity::CellIdentity;

/// Lifecycle of one run: `Sent → Streaming* → Complete | Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Sent,
    Streaming,
    Complete,
    Errored,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Complete | RunState::Errored)
    }
}

/// One in-flight (or finished but still attached) execution.
#[derive(Debug, Clone)]
pub struct PendingRun {
    pub msg_id: MessageId,
    pub cell_id: String,
    pub identity: CellIdentity,
    pub state: RunState,
    /// Identities whose outputs this run already cleared.
    cleared: HashSet<CellIdentity>,
}

impl PendingRun {
    fn new(msg_id: MessageId, cell_id: String, identity: CellIdentity) -> Self {
        Self {
            msg_id,
            cell_id,
            identity,
            state: RunState::Sent,
            cleared: HashSet::new(),
        }
    }

    pub fn has_cleared(&self, identity: &CellIdentity) -> bool {
        self.cleared.contains(identity)
    }
}

/// What handling one channel event amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// No attached run for that message id.
    Ignored,
    Output { delivered: usize },
    Cleared,
    Completed { cell_id: String },
    Failed { cell_id: String },
    /// Forward to the UI.
    Notify(NotebookEvent),
}

/// Owns the message-id → run map for one notebook.
#[derive(Debug, Default)]
pub struct ResultDispatcher {
    runs: HashMap<MessageId, PendingRun>,
    by_cell: HashMap<String, MessageId>,
}

impl ResultDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new run for `cell_id`, detaching the cell's previous run.
    /// Returns the detached message id so the channel can drop its callbacks.
    pub fn register(
        &mut self,
        msg_id: MessageId,
        cell_id: &str,
        identity: CellIdentity,
    ) -> Option<MessageId> {
        let replaced = self.detach_cell(cell_id);
        self.by_cell.insert(cell_id.to_string(), msg_id.clone());
        self.runs.insert(
            msg_id.clone(),
            PendingRun::new(msg_id, cell_id.to_string(), identity),
        );
        replaced
    }

    /// Forget the cell's current run, if any.
    pub fn detach_cell(&mut self, cell_id: &str) -> Option<MessageId> {
        let msg_id = self.by_cell.remove(cell_id)?;
        self.runs.remove(&msg_id);
        debug!("[dispatch] Detached run {} from cell {}", msg_id, cell_id);
        Some(msg_id)
    }

    pub fn run(&self, msg_id: &str) -> Option<&PendingRun> {
        self.runs.get(msg_id)
    }

    pub fn run_for_cell(&self, cell_id: &str) -> Option<&PendingRun> {
        self.by_cell.get(cell_id).and_then(|m| self.runs.get(m))
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Apply one channel event for `msg_id` to the notebook's cells.
    pub fn dispatch(
        &mut self,
        msg_id: &str,
        event: ChannelEvent,
        cells: &mut [Cell],
        display_limit: usize,
    ) -> Dispatched {
        let Some(run) = self.runs.get_mut(msg_id) else {
            debug!("[dispatch] No attached run for msg_id={}, dropping", msg_id);
            return Dispatched::Ignored;
        };

        match event {
            ChannelEvent::Output { identity, output } => {
                let target = identity.unwrap_or_else(|| run.identity.clone());
                let delivered = fan_out(run, &target, output, cells);
                if !run.state.is_terminal() {
                    run.state = RunState::Streaming;
                }
                Dispatched::Output { delivered }
            }
            ChannelEvent::ClearOutput { wait } => match requesting_cell(cells, &run.cell_id) {
                Some(cell) => {
                    cell.output_area.clear(wait);
                    Dispatched::Cleared
                }
                None => Dispatched::Ignored,
            },
            ChannelEvent::Reply(reply) => {
                if run.state.is_terminal() {
                    warn!("[dispatch] Duplicate reply for msg_id={}, ignoring", msg_id);
                    return Dispatched::Ignored;
                }
                let Some(cell) = requesting_cell(cells, &run.cell_id) else {
                    return Dispatched::Ignored;
                };
                apply_reply(cell, &run.identity, reply, display_limit);
                run.state = RunState::Complete;
                info!("[dispatch] Run complete: cell={} msg_id={}", run.cell_id, msg_id);
                Dispatched::Completed {
                    cell_id: run.cell_id.clone(),
                }
            }
            ChannelEvent::Failed { reason } => {
                if run.state.is_terminal() {
                    return Dispatched::Ignored;
                }
                error!(
                    "[dispatch] Run failed: cell={} msg_id={}: {}",
                    run.cell_id, msg_id, reason
                );
                run.state = RunState::Errored;
                if let Some(cell) = requesting_cell(cells, &run.cell_id) {
                    cell.running = false;
                    cell.counter = ExecutionCounter::Unset;
                }
                Dispatched::Failed {
                    cell_id: run.cell_id.clone(),
                }
            }
            ChannelEvent::SetNextInput {
                text,
                replace,
                clear_output,
            } => Dispatched::Notify(NotebookEvent::SetNextInput {
                cell_id: run.cell_id.clone(),
                text,
                replace,
                clear_output,
            }),
            ChannelEvent::Page { payload } => Dispatched::Notify(NotebookEvent::OpenPager {
                cell_id: run.cell_id.clone(),
                payload,
            }),
            ChannelEvent::InputRequest { prompt, password } => {
                Dispatched::Notify(NotebookEvent::InputRequested {
                    cell_id: run.cell_id.clone(),
                    prompt,
                    password,
                })
            }
        }
    }
}

fn requesting_cell<'a>(cells: &'a mut [Cell], cell_id: &str) -> Option<&'a mut CodeCell> {
    cells
        .iter_mut()
        .find(|c| c.id() == cell_id)
        .and_then(Cell::as_code_mut)
}

/// Deliver `output` to every cell carrying `target`, clearing each of them
/// first if this is the run's first output for that identity.
fn fan_out(run: &mut PendingRun, target: &CellIdentity, output: Value, cells: &mut [Cell]) -> usize {
    let first_for_identity = run.cleared.insert(target.clone());
    let mut delivered = 0;

    for cell in cells.iter_mut().filter_map(Cell::as_code_mut) {
        if cell.identity() != Some(target) {
            continue;
        }
        if first_for_identity {
            cell.output_area.clear(false);
        }
        cell.output_area.append(output.clone());
        delivered += 1;
    }

    if delivered == 0 {
        debug!(
            "[dispatch] Output for identity {} matched no cell (msg_id={})",
            target, run.msg_id
        );
    }
    delivered
}

fn apply_reply(cell: &mut CodeCell, ran_as: &CellIdentity, reply: ExecuteReply, display_limit: usize) {
    if let Some(reported) = reply.identity.as_ref() {
        if reported != ran_as {
            warn!(
                "[dispatch] Reply for cell {} names identity {}, expected {}; keeping {}",
                cell.id(),
                reported,
                ran_as,
                ran_as
            );
        }
    }

    if reply.status != ReplyStatus::Ok {
        warn!(
            "[dispatch] Cell {} finished with status {:?}",
            cell.id(),
            reply.status
        );
    }

    cell.counter = match reply.execution_count {
        Some(n) => ExecutionCounter::Count(n),
        None => ExecutionCounter::Unset,
    };
    cell.upstream = reply.upstream;
    merge_downstream(&mut cell.parent_identities, &reply.downstream);
    cell.running = false;
    cell.dependency_panel =
        DependencyPanel::build(&cell.parent_identities, &cell.upstream, display_limit);
}
