//! Save/restore cache of the quantity → default-unit mapping.
//!
//! # Responsibility
//! - Snapshot the selection entity's mapping when a destructive batch
//!   starts.
//! - Replay the snapshot inside one compound modification so observers see
//!   a single notification.
//!
//! # Invariants
//! - `save` replaces the snapshot wholesale; without a selection entity the
//!   snapshot is empty.
//! - `restore` reproduces the saved pairs as long as the unit IDs are still
//!   valid in the destination scene.

use crate::model::node::NodeId;
use crate::model::selection::SelectionEntity;
use crate::scene::Scene;
use std::collections::BTreeMap;

/// Re-entrancy state of the owning registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreState {
    #[default]
    Idle,
    /// The registry is writing one default itself.
    Writing,
    /// The registry is replaying the cache.
    Restoring,
}

/// Snapshot of quantity → unit ID pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultMappingCache {
    entries: BTreeMap<String, NodeId>,
}

impl DefaultMappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot with the selection's current mapping.
    pub fn save(&mut self, selection: Option<&SelectionEntity>) {
        self.entries = selection
            .map(|selection| selection.unit_node_ids().into_iter().collect())
            .unwrap_or_default();
    }

    /// Records one pair written after the last `save`.
    pub fn insert(&mut self, quantity: &str, unit_id: &NodeId) {
        self.entries.insert(quantity.to_string(), unit_id.clone());
    }

    pub fn entries(&self) -> &BTreeMap<String, NodeId> {
        &self.entries
    }

    pub fn unit_node_id(&self, quantity: &str) -> Option<&NodeId> {
        self.entries.get(quantity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replays every cached pair through `install`, bracketed by one
    /// compound modification of the scene's selection entity.
    pub fn restore<F>(&self, scene: &mut Scene, mut install: F)
    where
        F: FnMut(&mut Scene, &str, &NodeId),
    {
        let selection_id = scene.selection_id();
        if let Some(id) = &selection_id {
            scene.start_modify(id);
        }
        for (quantity, unit_id) in &self.entries {
            install(scene, quantity, unit_id);
        }
        if let Some(id) = &selection_id {
            scene.end_modify(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DefaultMappingCache;
    use crate::model::node::NodeId;
    use crate::model::selection::SelectionEntity;
    use crate::scene::Scene;

    #[test]
    fn save_without_selection_empties_cache() {
        let mut selection = SelectionEntity::default();
        selection.set_unit_node_id("length", &NodeId::new("UnitNodeApplicationLength"));
        let mut cache = DefaultMappingCache::new();
        cache.save(Some(&selection));
        assert_eq!(cache.len(), 1);
        cache.save(None);
        assert!(cache.is_empty());
    }

    #[test]
    fn insert_overrides_saved_pair() {
        let mut selection = SelectionEntity::default();
        selection.set_unit_node_id("length", &NodeId::new("UnitNodeApplicationLength"));
        let mut cache = DefaultMappingCache::new();
        cache.save(Some(&selection));
        cache.insert("length", &NodeId::new("UnitNodeMicrometer"));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.unit_node_id("length"),
            Some(&NodeId::new("UnitNodeMicrometer"))
        );
    }

    #[test]
    fn restore_visits_pairs_in_quantity_order() {
        let mut selection = SelectionEntity::default();
        selection.set_unit_node_id("time", &NodeId::new("UnitNodeApplicationTime"));
        selection.set_unit_node_id("length", &NodeId::new("UnitNodeApplicationLength"));
        let mut cache = DefaultMappingCache::new();
        cache.save(Some(&selection));

        let mut scene = Scene::new();
        let mut visited = Vec::new();
        cache.restore(&mut scene, |_, quantity, unit_id| {
            visited.push((quantity.to_string(), unit_id.clone()));
        });
        assert_eq!(
            visited,
            vec![
                ("length".to_string(), NodeId::new("UnitNodeApplicationLength")),
                ("time".to_string(), NodeId::new("UnitNodeApplicationTime")),
            ]
        );
    }
}
