//! Stable cell identities and the registry that mints them.
//!
//! An identity is assigned to a code cell the first time it runs (or restored
//! verbatim from a saved notebook) and never changes afterwards. The execution
//! backend reports dependency edges in terms of these identities, so they must
//! survive save/reload unchanged.

use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CodeCell};

/// Opaque, stable identifier for a code cell.
///
/// Serializes as a bare string (`"3f2b…"`), matching the `cell_uuid` field of
/// persisted records and backend messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellIdentity(String);

impl CellIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The expression that names this cell's output in the kernel namespace.
    pub fn output_reference(&self) -> String {
        format!("Out['{}']", self.0)
    }
}

impl fmt::Display for CellIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CellIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CellIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl PartialEq<str> for CellIdentity {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for CellIdentity {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// How an identity should be attached to a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityAssignment {
    /// Mint a fresh random identity.
    Fresh,
    /// Adopt the given identity verbatim (restoring from a saved record).
    Adopt(CellIdentity),
}

/// Mints identities and tracks which live cell owns each one.
///
/// Entries are keyed by identity and point at the document-local cell id.
/// The registry lives exactly as long as its notebook; removing a cell must
/// call [`IdentityRegistry::release`].
pub struct IdentityRegistry {
    rng: StdRng,
    owners: HashMap<CellIdentity, String>,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Registry with a deterministic random source, for reproducible identities.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            owners: HashMap::new(),
        }
    }

    /// Generate a new random identity in the RFC 4122 version 4 layout,
    /// lowercase hex with standard hyphen grouping.
    pub fn assign_new(&mut self) -> CellIdentity {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        CellIdentity(uuid.hyphenated().to_string())
    }

    /// Attach an identity to `cell` and record ownership.
    ///
    /// Identities are immutable: if the cell already has one it is returned
    /// unchanged and the assignment is ignored.
    pub fn set(&mut self, cell: &mut CodeCell, assignment: IdentityAssignment) -> CellIdentity {
        if let Some(existing) = cell.identity() {
            if let IdentityAssignment::Adopt(ref requested) = assignment {
                if requested != existing {
                    warn!(
                        "[identity] Cell {} already has identity {}, ignoring {}",
                        cell.id(),
                        existing,
                        requested
                    );
                }
            }
            return existing.clone();
        }

        let identity = match assignment {
            IdentityAssignment::Fresh => self.assign_new(),
            IdentityAssignment::Adopt(identity) => identity,
        };

        if let Some(previous) = self.owners.insert(identity.clone(), cell.id().to_string()) {
            if previous != cell.id() {
                warn!(
                    "[identity] Identity {} was owned by cell {}, now claimed by {}",
                    identity,
                    previous,
                    cell.id()
                );
            }
        }
        debug!("[identity] Cell {} -> {}", cell.id(), identity);
        cell.attach_identity(identity.clone());
        identity
    }

    /// Drop the registry entry for `identity` if `cell_id` still owns it.
    pub fn release(&mut self, identity: &CellIdentity, cell_id: &str) {
        if self.owners.get(identity).map(String::as_str) == Some(cell_id) {
            self.owners.remove(identity);
        }
    }

    /// The live cell id that owns `identity`, if any.
    pub fn owner(&self, identity: &CellIdentity) -> Option<&str> {
        self.owners.get(identity).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Identities of every cell that has one, in document order.
    ///
    /// Cells that have never run are skipped; they cannot be dependency
    /// targets yet.
    pub fn list_all<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> Vec<CellIdentity> {
        cells
            .into_iter()
            .filter_map(|cell| cell.identity().cloned())
            .collect()
    }
}
