//! Cell variants and their per-cell state.
//!
//! A notebook holds a closed set of cell kinds. Shared capabilities (id,
//! source, identity, view) dispatch by matching on [`Cell`]; only code cells
//! carry identities, outputs and dependency state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dependency::DependencyPanel;
use crate::identity::CellIdentity;
use crate::output_area::OutputArea;
use crate::settings::PromptStyle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Code,
    Markdown,
    Raw,
}

impl std::fmt::Display for CellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellKind::Code => write!(f, "code"),
            CellKind::Markdown => write!(f, "markdown"),
            CellKind::Raw => write!(f, "raw"),
        }
    }
}

impl std::str::FromStr for CellKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(CellKind::Code),
            "markdown" => Ok(CellKind::Markdown),
            "raw" => Ok(CellKind::Raw),
            _ => Err(format!("Unknown cell type: {}", s)),
        }
    }
}

/// Execution counter shown in the input prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionCounter {
    /// Never run, or cleared.
    #[default]
    Unset,
    /// A request is in flight.
    Running,
    /// Set from a successful reply.
    Count(i64),
}

impl ExecutionCounter {
    /// Only finite counts persist; the running marker never leaks into saved state.
    pub fn persisted(self) -> Option<i64> {
        match self {
            ExecutionCounter::Count(n) => Some(n),
            ExecutionCounter::Unset | ExecutionCounter::Running => None,
        }
    }
}

/// Dependency highlight applied by the bulk selection actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Highlight {
    Upstream,
    Downstream,
}

/// Cell text with a linear undo history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceBuffer {
    text: String,
    history: Vec<String>,
}

impl SourceBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            history: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text != self.text {
            let previous = std::mem::replace(&mut self.text, text);
            self.history.push(previous);
        }
    }

    /// Revert to the previous text. Returns false at the undo floor.
    pub fn undo(&mut self) -> bool {
        match self.history.pop() {
            Some(previous) => {
                self.text = previous;
                true
            }
            None => false,
        }
    }

    /// Make the current text the undo floor.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A cell that sends source to the execution backend.
#[derive(Debug, Clone)]
pub struct CodeCell {
    id: String,
    identity: Option<CellIdentity>,
    pub(crate) buffer: SourceBuffer,
    pub(crate) counter: ExecutionCounter,
    pub(crate) edited: bool,
    pub(crate) running: bool,
    /// Cells that depend on this one, as last reported by the backend.
    pub(crate) parent_identities: Vec<CellIdentity>,
    /// Cells the last run consumed. Display only, never persisted.
    pub(crate) upstream: Vec<CellIdentity>,
    pub(crate) output_area: OutputArea,
    pub(crate) highlight: Option<Highlight>,
    pub(crate) dependency_panel: Option<DependencyPanel>,
    /// Metadata keys this crate does not interpret, kept for round-trips.
    pub(crate) extra_metadata: Map<String, Value>,
}

impl CodeCell {
    pub fn new(id: String) -> Self {
        Self {
            id,
            identity: None,
            buffer: SourceBuffer::default(),
            counter: ExecutionCounter::Unset,
            edited: true,
            running: false,
            parent_identities: Vec::new(),
            upstream: Vec::new(),
            output_area: OutputArea::new(),
            highlight: None,
            dependency_panel: None,
            extra_metadata: Map::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn identity(&self) -> Option<&CellIdentity> {
        self.identity.as_ref()
    }

    /// Only the registry attaches identities, and only once.
    pub(crate) fn attach_identity(&mut self, identity: CellIdentity) {
        if self.identity.is_none() {
            self.identity = Some(identity);
        }
    }

    pub fn source(&self) -> &str {
        self.buffer.text()
    }

    pub fn buffer(&self) -> &SourceBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut SourceBuffer {
        &mut self.buffer
    }

    pub fn execution_counter(&self) -> ExecutionCounter {
        self.counter
    }

    pub fn is_edited(&self) -> bool {
        self.edited
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn parent_identities(&self) -> &[CellIdentity] {
        &self.parent_identities
    }

    pub fn upstream(&self) -> &[CellIdentity] {
        &self.upstream
    }

    pub fn outputs(&self) -> &[Value] {
        self.output_area.outputs()
    }

    pub fn output_area(&self) -> &OutputArea {
        &self.output_area
    }

    pub fn output_area_mut(&mut self) -> &mut OutputArea {
        &mut self.output_area
    }

    pub fn highlight(&self) -> Option<Highlight> {
        self.highlight
    }

    pub fn dependency_panel(&self) -> Option<&DependencyPanel> {
        self.dependency_panel.as_ref()
    }

    /// Clear outputs and reset the prompt.
    pub fn clear_output(&mut self, wait: bool) {
        self.output_area.clear(wait);
        self.counter = ExecutionCounter::Unset;
    }

    pub fn prompt(&self, style: PromptStyle) -> String {
        let value = match self.counter {
            ExecutionCounter::Unset => " ".to_string(),
            ExecutionCounter::Running => "*".to_string(),
            ExecutionCounter::Count(n) => n.to_string(),
        };
        let classical = format!("In [{}]:", value);
        match style {
            PromptStyle::Classical => classical,
            PromptStyle::Continuation => {
                let mut lines = vec![classical];
                lines.extend((1..self.buffer.line_count()).map(|_| "...:".to_string()));
                lines.join("\n")
            }
        }
    }
}

/// Markdown or raw cell: text only.
#[derive(Debug, Clone)]
pub struct TextCell {
    id: String,
    pub(crate) buffer: SourceBuffer,
    pub(crate) rendered: bool,
    pub(crate) metadata: Map<String, Value>,
}

impl TextCell {
    pub fn new(id: String) -> Self {
        Self {
            id,
            buffer: SourceBuffer::default(),
            rendered: false,
            metadata: Map::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        self.buffer.text()
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered
    }
}

#[derive(Debug, Clone)]
pub enum Cell {
    Code(CodeCell),
    Markdown(TextCell),
    Raw(TextCell),
}

impl Cell {
    pub fn new(kind: CellKind, id: String) -> Self {
        match kind {
            CellKind::Code => Cell::Code(CodeCell::new(id)),
            CellKind::Markdown => Cell::Markdown(TextCell::new(id)),
            CellKind::Raw => Cell::Raw(TextCell::new(id)),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Cell::Code(cell) => cell.id(),
            Cell::Markdown(cell) | Cell::Raw(cell) => cell.id(),
        }
    }

    pub fn kind(&self) -> CellKind {
        match self {
            Cell::Code(_) => CellKind::Code,
            Cell::Markdown(_) => CellKind::Markdown,
            Cell::Raw(_) => CellKind::Raw,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Cell::Code(cell) => cell.source(),
            Cell::Markdown(cell) | Cell::Raw(cell) => cell.source(),
        }
    }

    pub fn buffer_mut(&mut self) -> &mut SourceBuffer {
        match self {
            Cell::Code(cell) => &mut cell.buffer,
            Cell::Markdown(cell) | Cell::Raw(cell) => &mut cell.buffer,
        }
    }

    pub fn set_source(&mut self, text: &str) {
        self.buffer_mut().set_text(text);
    }

    pub fn identity(&self) -> Option<&CellIdentity> {
        match self {
            Cell::Code(cell) => cell.identity(),
            Cell::Markdown(_) | Cell::Raw(_) => None,
        }
    }

    pub fn as_code(&self) -> Option<&CodeCell> {
        match self {
            Cell::Code(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_code_mut(&mut self) -> Option<&mut CodeCell> {
        match self {
            Cell::Code(cell) => Some(cell),
            _ => None,
        }
    }

    /// Markdown cells switch to their rendered form; other kinds have no
    /// separate rendered state.
    pub fn render(&mut self) {
        if let Cell::Markdown(cell) = self {
            cell.rendered = true;
        }
    }

    pub fn unrender(&mut self) {
        if let Cell::Markdown(cell) = self {
            cell.rendered = false;
        }
    }

    pub fn view(&self, style: PromptStyle) -> CellView {
        match self {
            Cell::Code(cell) => CellView::Code {
                id: cell.id().to_string(),
                source: cell.source().to_string(),
                prompt: cell.prompt(style),
                identity: cell.identity().cloned(),
                running: cell.running,
                edited: cell.edited,
                highlight: cell.highlight,
                outputs: cell.outputs().to_vec(),
                dependencies: cell.dependency_panel.clone(),
            },
            Cell::Markdown(cell) => CellView::Markdown {
                id: cell.id().to_string(),
                source: cell.source().to_string(),
                rendered: cell.rendered,
            },
            Cell::Raw(cell) => CellView::Raw {
                id: cell.id().to_string(),
                source: cell.source().to_string(),
            },
        }
    }
}

/// Flattened cell state for a frontend.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "cell_type")]
pub enum CellView {
    #[serde(rename = "code")]
    Code {
        id: String,
        source: String,
        prompt: String,
        identity: Option<CellIdentity>,
        running: bool,
        edited: bool,
        highlight: Option<Highlight>,
        outputs: Vec<Value>,
        dependencies: Option<DependencyPanel>,
    },
    #[serde(rename = "markdown")]
    Markdown {
        id: String,
        source: String,
        rendered: bool,
    },
    #[serde(rename = "raw")]
    Raw { id: String, source: String },
}
