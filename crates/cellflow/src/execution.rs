//! Payload sent to the execution backend for one run.

use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::identity::CellIdentity;

/// Reduced view of a code cell used by the backend to resolve dependency
/// edges. Carries no outputs or counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    #[serde(rename = "cell_uuid")]
    pub identity: Option<CellIdentity>,
    pub source: String,
    pub edited: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    /// Every code cell in document order, recomputed for each run.
    #[serde(rename = "source")]
    pub cell_snapshots: Vec<SourceSnapshot>,
    #[serde(rename = "cell_uuid")]
    pub identity: CellIdentity,
    pub stop_on_error: bool,
}

impl ExecutionRequest {
    /// Build the request for `code` run under `identity`.
    ///
    /// Returns `None` for blank source: there is nothing to run.
    pub fn build(
        code: &str,
        identity: CellIdentity,
        cells: &[Cell],
        stop_on_error: bool,
    ) -> Option<Self> {
        if code.trim().is_empty() {
            return None;
        }
        Some(Self {
            code: code.to_string(),
            cell_snapshots: snapshot_sources(cells),
            identity,
            stop_on_error,
        })
    }
}

/// Map every code cell, in document order, to its dependency snapshot.
pub fn snapshot_sources(cells: &[Cell]) -> Vec<SourceSnapshot> {
    cells
        .iter()
        .filter_map(Cell::as_code)
        .map(|cell| SourceSnapshot {
            identity: cell.identity().cloned(),
            source: cell.source().to_string(),
            edited: cell.is_edited(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellKind, CodeCell};

    fn code(id: &str, source: &str, identity: Option<&str>) -> Cell {
        let mut cell = CodeCell::new(id.to_string());
        cell.buffer.set_text(source);
        if let Some(identity) = identity {
            cell.attach_identity(identity.into());
        }
        Cell::Code(cell)
    }

    #[test]
    fn test_blank_source_builds_nothing() {
        let cells = vec![code("a", "  \n", Some("x"))];
        assert!(ExecutionRequest::build("  \n", "x".into(), &cells, true).is_none());
    }

    #[test]
    fn test_snapshots_cover_code_cells_in_order() {
        let mut markdown = Cell::new(CellKind::Markdown, "m".to_string());
        markdown.buffer_mut().set_text("# title");
        let cells = vec![
            code("a", "x = 1", Some("id-a")),
            markdown,
            code("b", "y = x", None),
        ];

        let request = ExecutionRequest::build("x = 1", "id-a".into(), &cells, false).unwrap();

        assert_eq!(request.cell_snapshots.len(), 2);
        assert_eq!(request.cell_snapshots[0].identity, Some("id-a".into()));
        assert_eq!(request.cell_snapshots[0].source, "x = 1");
        assert!(request.cell_snapshots[0].edited);
        assert_eq!(request.cell_snapshots[1].identity, None);
        assert_eq!(request.cell_snapshots[1].source, "y = x");
        assert!(!request.stop_on_error);
    }

    #[test]
    fn test_snapshot_reflects_edited_flag() {
        let mut cell = CodeCell::new("a".to_string());
        cell.buffer.set_text("x");
        cell.edited = false;
        let snapshots = snapshot_sources(&[Cell::Code(cell)]);
        assert!(!snapshots[0].edited);
    }

    #[test]
    fn test_wire_shape_excludes_outputs_and_counters() {
        let cells = vec![code("a", "x = 1", Some("id-a"))];
        let request = ExecutionRequest::build("x = 1", "id-a".into(), &cells, true).unwrap();

        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["cell_uuid"], "id-a");
        assert_eq!(json["stop_on_error"], true);
        let snapshot = json["source"][0].as_object().unwrap();
        let mut keys: Vec<_> = snapshot.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["cell_uuid", "edited", "source"]);
    }
}
