//! Dependency affordances built from execution replies.
//!
//! The backend reports, per run, which cells consumed this cell's output
//! (downstream, stored as `parent_identities`) and which cells the run
//! consumed (upstream). These are hints, not ground truth: they may name
//! deleted cells, repeat themselves, or form cycles. Nothing here assumes
//! otherwise.

use serde::{Deserialize, Serialize};

use crate::identity::CellIdentity;

/// Bulk action offered by a dependency panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "identity", rename_all = "snake_case")]
pub enum DependencyAction {
    /// Focus and highlight every downstream cell.
    SelectAllDownstream,
    /// Highlight and execute every downstream cell, in document order.
    ExecuteAllDownstream,
    /// Execute the one downstream cell with this identity.
    ExecuteOneDownstream(CellIdentity),
    /// Highlight the cells the last run consumed. Selection only.
    ShowUpstream,
}

/// What a frontend shows under a cell's output after a run with
/// dependency information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyPanel {
    /// Downstream identities listed individually (at most the display limit).
    pub downstream: Vec<CellIdentity>,
    /// Downstream identities only reachable through "execute all".
    pub hidden_downstream: usize,
    pub has_upstream: bool,
}

impl DependencyPanel {
    /// Build a panel, or `None` when there is nothing to show.
    pub fn build(
        downstream: &[CellIdentity],
        upstream: &[CellIdentity],
        display_limit: usize,
    ) -> Option<Self> {
        if downstream.is_empty() && upstream.is_empty() {
            return None;
        }
        let shown: Vec<CellIdentity> = downstream.iter().take(display_limit).cloned().collect();
        Some(Self {
            hidden_downstream: downstream.len() - shown.len(),
            downstream: shown,
            has_upstream: !upstream.is_empty(),
        })
    }

    /// Whether any downstream identity is known, listed or hidden.
    pub fn has_downstream(&self) -> bool {
        !self.downstream.is_empty() || self.hidden_downstream > 0
    }

    /// Actions the panel exposes, in display order.
    pub fn actions(&self) -> Vec<DependencyAction> {
        let mut actions: Vec<DependencyAction> = self
            .downstream
            .iter()
            .cloned()
            .map(DependencyAction::ExecuteOneDownstream)
            .collect();
        if self.has_downstream() {
            actions.push(DependencyAction::SelectAllDownstream);
            actions.push(DependencyAction::ExecuteAllDownstream);
        }
        if self.has_upstream {
            actions.push(DependencyAction::ShowUpstream);
        }
        actions
    }
}

/// Record a reply's downstream list. An empty list never erases what is
/// already known; a non-empty one replaces it.
pub fn merge_downstream(known: &mut Vec<CellIdentity>, reported: &[CellIdentity]) -> bool {
    if reported.is_empty() {
        return false;
    }
    *known = reported.to_vec();
    true
}
