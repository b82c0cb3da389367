//! Selection entity payload.
//!
//! # Responsibility
//! - Hold the scene-wide default unit per quantity.
//! - Hold the active volume slots used by volume tooling.
//!
//! # Invariants
//! - Every quantity present maps to a non-empty unit ID.
//! - Mapping iteration order is by quantity (stable, sorted).

use crate::model::node::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scene singleton holding the current default-unit choice per quantity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEntity {
    #[serde(default)]
    unit_node_ids: BTreeMap<String, NodeId>,
    #[serde(default)]
    active_volume_id: Option<NodeId>,
    #[serde(default)]
    active_label_volume_id: Option<NodeId>,
}

impl SelectionEntity {
    /// Installs or replaces the default unit for one quantity.
    ///
    /// An unassigned unit ID removes the entry. Returns whether the mapping
    /// changed.
    pub fn set_unit_node_id(&mut self, quantity: &str, unit_id: &NodeId) -> bool {
        if !unit_id.is_assigned() {
            return self.unit_node_ids.remove(quantity).is_some();
        }
        if self.unit_node_ids.get(quantity) == Some(unit_id) {
            return false;
        }
        self.unit_node_ids
            .insert(quantity.to_string(), unit_id.clone());
        true
    }

    pub fn unit_node_id(&self, quantity: &str) -> Option<&NodeId> {
        self.unit_node_ids.get(quantity)
    }

    /// Returns every `(quantity, unit ID)` pair sorted by quantity.
    pub fn unit_node_ids(&self) -> Vec<(String, NodeId)> {
        self.unit_node_ids
            .iter()
            .map(|(quantity, id)| (quantity.clone(), id.clone()))
            .collect()
    }

    pub fn quantities(&self) -> impl Iterator<Item = &str> {
        self.unit_node_ids.keys().map(String::as_str)
    }

    pub fn active_volume_id(&self) -> Option<&NodeId> {
        self.active_volume_id.as_ref()
    }

    pub fn set_active_volume_id(&mut self, id: Option<NodeId>) -> bool {
        if self.active_volume_id == id {
            return false;
        }
        self.active_volume_id = id;
        true
    }

    pub fn active_label_volume_id(&self) -> Option<&NodeId> {
        self.active_label_volume_id.as_ref()
    }

    pub fn set_active_label_volume_id(&mut self, id: Option<NodeId>) -> bool {
        if self.active_label_volume_id == id {
            return false;
        }
        self.active_label_volume_id = id;
        true
    }

    /// Rewrites referenced IDs through `map`.
    pub fn remap_references(&mut self, map: &BTreeMap<NodeId, NodeId>) {
        for unit_id in self.unit_node_ids.values_mut() {
            if let Some(new_id) = map.get(unit_id) {
                *unit_id = new_id.clone();
            }
        }
        for slot in [&mut self.active_volume_id, &mut self.active_label_volume_id] {
            if let Some(new_id) = slot.as_ref().and_then(|id| map.get(id)) {
                *slot = Some(new_id.clone());
            }
        }
    }

    /// Drops all state. Returns whether anything was set.
    pub fn reset(&mut self) -> bool {
        let had_state = !self.unit_node_ids.is_empty()
            || self.active_volume_id.is_some()
            || self.active_label_volume_id.is_some();
        *self = Self::default();
        had_state
    }
}
