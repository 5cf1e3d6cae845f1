//! Group registry.
//!
//! The registry owns every [`Group`] instance. It is built once at startup
//! from a fixed catalog and never changes shape afterwards: groups are not
//! created or destroyed at runtime.

use crate::group::Group;
use papo_protocol::GroupSummary;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::info;

/// One catalog entry: everything about a group except its runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Stable group id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Emoji icon.
    pub icon: String,
}

impl CatalogEntry {
    fn new(id: &str, name: &str, description: &str, icon: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            icon: icon.into(),
        }
    }
}

/// The reference catalog: five groups, always present.
#[must_use]
pub fn default_catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new("geral", "Geral", "Conversas gerais e assuntos variados", "💬"),
        CatalogEntry::new(
            "tecnologia",
            "Tecnologia",
            "Programação, gadgets e novidades tech",
            "💻",
        ),
        CatalogEntry::new("games", "Games", "Jogos, consoles e e-sports", "🎮"),
        CatalogEntry::new("musica", "Música", "Música, shows e playlists", "🎵"),
        CatalogEntry::new("esportes", "Esportes", "Futebol e esportes em geral", "⚽"),
    ]
}

/// Catalog validation errors, surfaced at startup only.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog has no entries.
    #[error("Group catalog is empty")]
    Empty,

    /// Two catalog entries share an id.
    #[error("Duplicate group id in catalog: {0}")]
    DuplicateId(String),

    /// The configured default group is not in the catalog.
    #[error("Default group not in catalog: {0}")]
    UnknownDefault(String),
}

/// Owns the fixed set of groups, in catalog order.
#[derive(Debug)]
pub struct GroupRegistry {
    groups: Vec<Group>,
}

impl GroupRegistry {
    /// Build the registry from a catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog is empty or contains duplicate ids.
    pub fn from_catalog(
        catalog: &[CatalogEntry],
        history_capacity: usize,
    ) -> Result<Self, CatalogError> {
        if catalog.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for entry in catalog {
            if !seen.insert(entry.id.as_str()) {
                return Err(CatalogError::DuplicateId(entry.id.clone()));
            }
        }

        let groups = catalog
            .iter()
            .map(|e| {
                Group::with_capacity(&e.id, &e.name, &e.description, &e.icon, history_capacity)
            })
            .collect::<Vec<_>>();

        info!(groups = groups.len(), "Group registry initialized");
        Ok(Self { groups })
    }

    /// Look up a group by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id() == id)
    }

    /// Look up a group mutably by id.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id() == id)
    }

    /// Check if a group exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.groups.iter().any(|g| g.id() == id)
    }

    /// Catalog summaries with live counts, in catalog order.
    #[must_use]
    pub fn summaries(&self) -> Vec<GroupSummary> {
        self.groups.iter().map(Group::summary).collect()
    }

    /// Iterate over all groups mutably. Used by the history sweeper.
    pub fn groups_mut(&mut self) -> impl Iterator<Item = &mut Group> {
        self.groups.iter_mut()
    }

    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True if the registry holds no groups. Cannot happen after a
    /// successful [`GroupRegistry::from_catalog`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
