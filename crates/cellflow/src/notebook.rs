//! The document: an ordered list of cells plus everything that acts on them.
//!
//! All mutation happens through `&mut Notebook` on one logical thread. The
//! execution channel returns immediately; results come back later through
//! [`Notebook::handle_message`].

use log::{debug, error, info, warn};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::cell::{Cell, CellKind, CellView, ExecutionCounter, Highlight};
use crate::channel::{ChannelEvent, ExecutionChannel, MessageId};
use crate::dependency::{DependencyAction, DependencyPanel};
use crate::dispatcher::{Dispatched, ResultDispatcher};
use crate::error::EngineError;
use crate::events::{emit, EventSender, NotebookEvent};
use crate::execution::ExecutionRequest;
use crate::identity::{CellIdentity, IdentityAssignment, IdentityRegistry};
use crate::settings::EngineSettings;
use crate::snapshot::NotebookRecord;
use crate::token_index::{self, Suggestion};

/// Why an execute call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoKernel,
    EmptySource,
    NotCode,
    UnknownCell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Submitted(MessageId),
    Skipped(SkipReason),
}

pub struct Notebook {
    cells: Vec<Cell>,
    metadata: Map<String, Value>,
    registry: IdentityRegistry,
    dispatcher: ResultDispatcher,
    channel: Option<Box<dyn ExecutionChannel + Send>>,
    events: EventSender,
    settings: EngineSettings,
    dirty: bool,
    focused: Option<String>,
}

impl Notebook {
    pub fn new(events: EventSender) -> Self {
        Self {
            cells: Vec::new(),
            metadata: Map::new(),
            registry: IdentityRegistry::new(),
            dispatcher: ResultDispatcher::new(),
            channel: None,
            events,
            settings: EngineSettings::default(),
            dirty: false,
            focused: None,
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the identity source, e.g. with a seeded one in tests.
    /// Only meaningful before any identity has been assigned.
    pub fn with_registry(mut self, registry: IdentityRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Rebuild a document from its persisted record. Every persisted
    /// identity is registered verbatim.
    pub fn from_record(record: &NotebookRecord, events: EventSender) -> Result<Self, EngineError> {
        if record.nbformat != 4 {
            return Err(EngineError::UnsupportedFormat {
                major: record.nbformat,
                minor: record.nbformat_minor,
            });
        }
        let mut notebook = Self::new(events);
        notebook.metadata = record.metadata.clone();
        notebook.cells = record
            .cells
            .iter()
            .map(|c| Cell::from_record(c, &mut notebook.registry))
            .collect();
        info!(
            "[notebook] Loaded {} cells ({} identities)",
            notebook.cells.len(),
            notebook.registry.len()
        );
        Ok(notebook)
    }

    pub fn from_json(json: &str, events: EventSender) -> Result<Self, EngineError> {
        let record = NotebookRecord::from_json(json)?;
        Self::from_record(&record, events)
    }

    pub fn to_record(&self) -> NotebookRecord {
        NotebookRecord {
            cells: self.cells.iter().map(Cell::to_record).collect(),
            metadata: self.metadata.clone(),
            nbformat: 4,
            nbformat_minor: 5,
        }
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        self.to_record().to_json()
    }

    pub fn set_channel(&mut self, channel: Box<dyn ExecutionChannel + Send>) {
        self.channel = Some(channel);
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, cell_id: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id() == cell_id)
    }

    pub fn cell_mut(&mut self, cell_id: &str) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|c| c.id() == cell_id)
    }

    fn position(&self, cell_id: &str) -> Option<usize> {
        self.cells.iter().position(|c| c.id() == cell_id)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        emit(&self.events, NotebookEvent::DirtyChanged { dirty: true });
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
        emit(&self.events, NotebookEvent::DirtyChanged { dirty: false });
    }

    /// Insert a new cell after `after` (or at the end) and return its id.
    pub fn add_cell(&mut self, kind: CellKind, after: Option<&str>) -> String {
        let id = Uuid::new_v4().to_string();
        let index = after
            .and_then(|a| self.position(a))
            .map_or(self.cells.len(), |i| i + 1);
        self.cells.insert(index, Cell::new(kind, id.clone()));
        self.mark_dirty();
        id
    }

    /// Remove a cell, releasing its identity and detaching any run.
    pub fn delete_cell(&mut self, cell_id: &str) -> Option<Cell> {
        let index = self.position(cell_id)?;
        let cell = self.cells.remove(index);

        if let Some(identity) = cell.identity() {
            self.registry.release(identity, cell_id);
        }
        if let Some(msg_id) = self.dispatcher.detach_cell(cell_id) {
            if let Some(channel) = self.channel.as_mut() {
                channel.clear_callbacks(&msg_id);
            }
        }
        if self.focused.as_deref() == Some(cell_id) {
            self.focused = None;
        }
        self.mark_dirty();
        Some(cell)
    }

    /// Identities of every cell that has one, in document order.
    pub fn identities(&self) -> Vec<CellIdentity> {
        IdentityRegistry::list_all(&self.cells)
    }

    pub fn view(&self) -> Vec<CellView> {
        self.cells
            .iter()
            .map(|c| c.view(self.settings.prompt_style))
            .collect()
    }

    pub fn dependency_panel(&self, cell_id: &str) -> Option<&DependencyPanel> {
        self.cell(cell_id)
            .and_then(Cell::as_code)
            .and_then(|c| c.dependency_panel())
    }

    /// Replace a cell's text. Code cells become edited, and so does every
    /// cell known to depend on them. Highlights are cleared.
    pub fn update_source(&mut self, cell_id: &str, text: &str) -> bool {
        let Some(index) = self.position(cell_id) else {
            return false;
        };

        let dependents = match &mut self.cells[index] {
            Cell::Code(cell) => {
                cell.buffer.set_text(text);
                cell.edited = true;
                cell.parent_identities.clone()
            }
            other => {
                other.set_source(text);
                Vec::new()
            }
        };

        for cell in self.cells.iter_mut().filter_map(Cell::as_code_mut) {
            if cell
                .identity()
                .is_some_and(|identity| dependents.contains(identity))
            {
                cell.edited = true;
            }
        }

        self.clear_highlights();
        self.mark_dirty();
        true
    }

    /// Completion for the cell's text at byte offset `cursor`.
    pub fn complete(&self, cell_id: &str, cursor: usize) -> Vec<Suggestion> {
        match self.cell(cell_id) {
            Some(cell) => token_index::complete(cell.source(), cursor, &self.identities()),
            None => Vec::new(),
        }
    }

    pub fn execute(&mut self, cell_id: &str) -> Result<ExecuteOutcome, EngineError> {
        self.execute_with(cell_id, self.settings.stop_on_error)
    }

    /// Send the cell's source to the execution channel.
    pub fn execute_with(
        &mut self,
        cell_id: &str,
        stop_on_error: bool,
    ) -> Result<ExecuteOutcome, EngineError> {
        let Some(index) = self.position(cell_id) else {
            warn!("[notebook] Cannot execute unknown cell {}", cell_id);
            return Ok(ExecuteOutcome::Skipped(SkipReason::UnknownCell));
        };
        if self.cells[index].as_code().is_none() {
            debug!("[notebook] Cell {} is not a code cell, nothing to run", cell_id);
            return Ok(ExecuteOutcome::Skipped(SkipReason::NotCode));
        }
        let Some(channel) = self.channel.as_mut() else {
            warn!("[notebook] No kernel attached, cannot execute cell {}", cell_id);
            return Ok(ExecuteOutcome::Skipped(SkipReason::NoKernel));
        };

        if let Some(previous) = self.dispatcher.detach_cell(cell_id) {
            channel.clear_callbacks(&previous);
        }

        let Cell::Code(cell) = &mut self.cells[index] else {
            return Ok(ExecuteOutcome::Skipped(SkipReason::NotCode));
        };
        cell.clear_output(false);
        cell.dependency_panel = None;
        cell.upstream.clear();

        if cell.buffer.is_blank() {
            cell.counter = ExecutionCounter::Unset;
            cell.running = false;
            debug!("[notebook] Cell {} has no source, skipping", cell_id);
            return Ok(ExecuteOutcome::Skipped(SkipReason::EmptySource));
        }

        let identity = self.registry.set(cell, IdentityAssignment::Fresh);
        cell.counter = ExecutionCounter::Running;
        cell.running = true;
        let code = cell.source().to_string();

        let Some(request) =
            ExecutionRequest::build(&code, identity.clone(), &self.cells, stop_on_error)
        else {
            return Ok(ExecuteOutcome::Skipped(SkipReason::EmptySource));
        };

        match channel.submit(&request) {
            Ok(msg_id) => {
                if let Cell::Code(cell) = &mut self.cells[index] {
                    cell.edited = false;
                }
                self.dispatcher.register(msg_id.clone(), cell_id, identity);
                info!("[notebook] Executing cell {} (msg_id={})", cell_id, msg_id);
                emit(
                    &self.events,
                    NotebookEvent::CellExecuted {
                        cell_id: cell_id.to_string(),
                        msg_id: msg_id.clone(),
                    },
                );
                Ok(ExecuteOutcome::Submitted(msg_id))
            }
            Err(e) => {
                if let Cell::Code(cell) = &mut self.cells[index] {
                    cell.running = false;
                    cell.counter = ExecutionCounter::Unset;
                }
                error!("[notebook] Failed to execute cell {}: {}", cell_id, e);
                Err(EngineError::Dispatch {
                    cell_id: cell_id.to_string(),
                    source: e,
                })
            }
        }
    }

    /// Apply one event the channel reported for `msg_id`.
    pub fn handle_message(&mut self, msg_id: &str, event: ChannelEvent) -> Dispatched {
        let limit = self.settings.downstream_display_limit;
        let result = self.dispatcher.dispatch(msg_id, event, &mut self.cells, limit);

        match &result {
            Dispatched::Completed { cell_id } => {
                self.mark_dirty();
                let panel = self.dependency_panel(cell_id).cloned();
                emit(
                    &self.events,
                    NotebookEvent::DependenciesChanged {
                        cell_id: cell_id.clone(),
                        panel,
                    },
                );
            }
            Dispatched::Notify(event) => emit(&self.events, event.clone()),
            _ => {}
        }
        result
    }

    pub fn clear_highlights(&mut self) {
        for cell in self.cells.iter_mut().filter_map(Cell::as_code_mut) {
            cell.highlight = None;
        }
    }

    /// Run one of the dependency panel's actions for `cell_id`. Returns the
    /// message ids of any runs it started.
    pub fn apply_dependency_action(
        &mut self,
        cell_id: &str,
        action: DependencyAction,
    ) -> Vec<MessageId> {
        let Some(cell) = self.cell(cell_id).and_then(Cell::as_code) else {
            warn!("[notebook] No code cell {} for dependency action", cell_id);
            return Vec::new();
        };
        let downstream = cell.parent_identities().to_vec();
        let upstream = cell.upstream().to_vec();

        self.clear_highlights();

        match action {
            DependencyAction::SelectAllDownstream => {
                self.highlight(&downstream, Highlight::Downstream);
                self.mark_dirty();
                Vec::new()
            }
            DependencyAction::ExecuteAllDownstream => {
                let targets = self.highlight(&downstream, Highlight::Downstream);
                self.mark_dirty();
                self.execute_each(&targets)
            }
            DependencyAction::ExecuteOneDownstream(identity) => {
                if !downstream.contains(&identity) {
                    warn!(
                        "[notebook] {} is not downstream of cell {}, not executing",
                        identity, cell_id
                    );
                    return Vec::new();
                }
                let targets =
                    self.highlight(std::slice::from_ref(&identity), Highlight::Downstream);
                self.mark_dirty();
                self.execute_each(&targets)
            }
            DependencyAction::ShowUpstream => {
                self.highlight(&upstream, Highlight::Upstream);
                Vec::new()
            }
        }
    }

    /// Ids of code cells carrying any of `identities`, in document order.
    /// Identities without a live cell are skipped.
    fn cells_with(&self, identities: &[CellIdentity]) -> Vec<String> {
        for identity in identities {
            if !self.cells.iter().any(|c| c.identity() == Some(identity)) {
                debug!("[notebook] No live cell for identity {}, skipping", identity);
            }
        }
        self.cells
            .iter()
            .filter(|c| c.identity().is_some_and(|i| identities.contains(i)))
            .map(|c| c.id().to_string())
            .collect()
    }

    /// Highlight and focus the cells carrying `identities`; returns their ids.
    fn highlight(&mut self, identities: &[CellIdentity], kind: Highlight) -> Vec<String> {
        let targets = self.cells_with(identities);
        for cell in self.cells.iter_mut().filter_map(Cell::as_code_mut) {
            if targets.iter().any(|t| t == cell.id()) {
                cell.highlight = Some(kind);
            }
        }
        if let Some(last) = targets.last() {
            self.focused = Some(last.clone());
        }
        targets
    }

    /// Execute each cell in turn. A cell the channel refuses is logged and
    /// skipped; the rest still run.
    fn execute_each(&mut self, cell_ids: &[String]) -> Vec<MessageId> {
        let mut started = Vec::new();
        for cell_id in cell_ids {
            match self.execute(cell_id) {
                Ok(ExecuteOutcome::Submitted(msg_id)) => started.push(msg_id),
                Ok(ExecuteOutcome::Skipped(_)) => {}
                Err(e) => warn!("[notebook] Skipping cell {} in batch: {}", cell_id, e),
            }
        }
        started
    }
}
