//! Persisted notebook and cell records.
//!
//! The on-disk shape is nbformat 4 with two additions on code cells: a
//! top-level `cell_uuid` (the cell's identity) and `metadata.parent_uuids`
//! (its known downstream cells). Identities are restored verbatim; regenerating
//! them would orphan every dependency edge that names them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::cell::{Cell, CodeCell, ExecutionCounter, TextCell};
use crate::error::EngineError;
use crate::identity::{CellIdentity, IdentityAssignment, IdentityRegistry};
use crate::output_area::ScrollState;

/// nbformat multiline string: either one string or a list of lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MultilineString {
    Single(String),
    Lines(Vec<String>),
}

impl MultilineString {
    pub fn from_text(text: &str) -> Self {
        MultilineString::Lines(source_to_lines(text))
    }

    pub fn to_text(&self) -> String {
        match self {
            MultilineString::Single(s) => s.clone(),
            MultilineString::Lines(lines) => lines.concat(),
        }
    }
}

impl Default for MultilineString {
    fn default() -> Self {
        MultilineString::Lines(Vec::new())
    }
}

/// Split source into nbformat lines, each keeping its trailing newline.
fn source_to_lines(source: &str) -> Vec<String> {
    if source.is_empty() {
        return Vec::new();
    }
    source.split_inclusive('\n').map(|s| s.to_string()).collect()
}

/// Accept `true`/`false`; anything else (`"auto"`, `null`) means unset.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_bool()))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CodeCellMetadata {
    #[serde(default)]
    pub trusted: bool,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub scrolled: Option<bool>,
    /// Downstream identities, present only once some run reported them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uuids: Option<Vec<CellIdentity>>,
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cell_type")]
pub enum CellRecord {
    #[serde(rename = "code")]
    Code {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        source: MultilineString,
        #[serde(default)]
        execution_count: Option<i64>,
        #[serde(default)]
        cell_uuid: Option<CellIdentity>,
        #[serde(default)]
        outputs: Vec<Value>,
        #[serde(default)]
        metadata: CodeCellMetadata,
    },
    #[serde(rename = "markdown")]
    Markdown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        source: MultilineString,
        #[serde(default)]
        metadata: Map<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachments: Option<Value>,
    },
    #[serde(rename = "raw")]
    Raw {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        source: MultilineString,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
}

impl CellRecord {
    pub fn id(&self) -> Option<&str> {
        match self {
            CellRecord::Code { id, .. }
            | CellRecord::Markdown { id, .. }
            | CellRecord::Raw { id, .. } => id.as_deref(),
        }
    }
}

fn default_nbformat() -> u32 {
    4
}

fn default_nbformat_minor() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookRecord {
    pub cells: Vec<CellRecord>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "default_nbformat")]
    pub nbformat: u32,
    #[serde(default = "default_nbformat_minor")]
    pub nbformat_minor: u32,
}

impl NotebookRecord {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let record: NotebookRecord = serde_json::from_str(json)?;
        if record.nbformat != 4 {
            return Err(EngineError::UnsupportedFormat {
                major: record.nbformat,
                minor: record.nbformat_minor,
            });
        }
        Ok(record)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl CodeCell {
    pub fn to_record(&self) -> CellRecord {
        CellRecord::Code {
            id: Some(self.id().to_string()),
            source: MultilineString::from_text(self.source()),
            execution_count: self.counter.persisted(),
            cell_uuid: self.identity().cloned(),
            outputs: self.outputs().to_vec(),
            metadata: CodeCellMetadata {
                trusted: self.output_area.trusted,
                collapsed: self.output_area.collapsed,
                scrolled: self.output_area.scroll_state.to_metadata(),
                parent_uuids: (!self.parent_identities.is_empty())
                    .then(|| self.parent_identities.clone()),
                additional: self.extra_metadata.clone(),
            },
        }
    }

    /// Restore state from a code record. Records of any other type are
    /// ignored and `false` is returned.
    pub fn apply_record(&mut self, record: &CellRecord, registry: &mut IdentityRegistry) -> bool {
        let CellRecord::Code {
            source,
            execution_count,
            cell_uuid,
            outputs,
            metadata,
            ..
        } = record
        else {
            return false;
        };

        self.buffer.set_text(source.to_text());
        self.buffer.clear_history();

        if let Some(identity) = cell_uuid {
            registry.set(self, IdentityAssignment::Adopt(identity.clone()));
        }

        self.counter = execution_count.map_or(ExecutionCounter::Unset, ExecutionCounter::Count);
        self.output_area.restore(outputs.clone());
        self.output_area.trusted = metadata.trusted;
        self.output_area.collapsed = metadata.collapsed;
        self.output_area.scroll_state = ScrollState::from_metadata(metadata.scrolled);
        self.parent_identities = metadata.parent_uuids.clone().unwrap_or_default();
        self.extra_metadata = metadata.additional.clone();
        true
    }
}

impl TextCell {
    fn restore(id: String, source: &MultilineString, metadata: &Map<String, Value>) -> Self {
        let mut cell = TextCell::new(id);
        cell.buffer.set_text(source.to_text());
        cell.buffer.clear_history();
        cell.metadata = metadata.clone();
        cell
    }
}

impl Cell {
    pub fn to_record(&self) -> CellRecord {
        match self {
            Cell::Code(cell) => cell.to_record(),
            Cell::Markdown(cell) => CellRecord::Markdown {
                id: Some(cell.id().to_string()),
                source: MultilineString::from_text(cell.source()),
                metadata: cell.metadata.clone(),
                attachments: None,
            },
            Cell::Raw(cell) => CellRecord::Raw {
                id: Some(cell.id().to_string()),
                source: MultilineString::from_text(cell.source()),
                metadata: cell.metadata.clone(),
            },
        }
    }

    /// Build a cell from its record, registering any persisted identity.
    /// Records without an id get a fresh one.
    pub fn from_record(record: &CellRecord, registry: &mut IdentityRegistry) -> Self {
        let id = record
            .id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        match record {
            CellRecord::Code { .. } => {
                let mut cell = CodeCell::new(id);
                cell.apply_record(record, registry);
                Cell::Code(cell)
            }
            CellRecord::Markdown {
                source, metadata, ..
            } => Cell::Markdown(TextCell::restore(id, source, metadata)),
            CellRecord::Raw {
                source, metadata, ..
            } => Cell::Raw(TextCell::restore(id, source, metadata)),
        }
    }
}
