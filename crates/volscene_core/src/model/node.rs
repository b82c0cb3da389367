//! Scene node envelope, identity and class tags.
//!
//! # Responsibility
//! - Define the identity (`NodeId`) and typed class (`NodeClass`) of every
//!   node a scene can hold.
//! - Wrap the typed payloads (`NodeData`) in one envelope carrying name,
//!   singleton tag, persistence flag and free-form attributes.
//!
//! # Invariants
//! - A `NodeId` is empty until the owning scene assigns it on insertion.
//! - Singleton nodes are identified by `<ClassTag><SingletonTag>`, so their
//!   ID is stable across clear/reload cycles.
//! - `NodeData::class()` is the single source of truth for a node's class.

use crate::model::color::ColorTableNode;
use crate::model::selection::SelectionEntity;
use crate::model::storage::{StorageKind, StorageNode};
use crate::model::unit::UnitDefinition;
use crate::model::volume::{VolumeDisplayNode, VolumeKind, VolumeNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Scene-unique node identifier.
///
/// IDs are only unique within the scene that assigned them; a node moved to
/// another scene receives a new ID there.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Placeholder carried by nodes that were never added to a scene.
    pub fn unassigned() -> Self {
        Self(String::new())
    }

    pub fn is_assigned(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Typed node class, used for class registration, ID prefixes and lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    Unit,
    Selection,
    ScalarVolume,
    LabelMapVolume,
    VectorVolume,
    DiffusionWeightedVolume,
    DiffusionTensorVolume,
    ScalarVolumeDisplay,
    LabelMapVolumeDisplay,
    VectorVolumeDisplay,
    DiffusionWeightedVolumeDisplay,
    DiffusionTensorVolumeDisplay,
    NrrdStorage,
    VolumeArchetypeStorage,
    ColorTable,
}

impl NodeClass {
    /// Every class known to the scene, in registration order.
    pub const ALL: [NodeClass; 15] = [
        Self::Unit,
        Self::Selection,
        Self::ScalarVolume,
        Self::LabelMapVolume,
        Self::VectorVolume,
        Self::DiffusionWeightedVolume,
        Self::DiffusionTensorVolume,
        Self::ScalarVolumeDisplay,
        Self::LabelMapVolumeDisplay,
        Self::VectorVolumeDisplay,
        Self::DiffusionWeightedVolumeDisplay,
        Self::DiffusionTensorVolumeDisplay,
        Self::NrrdStorage,
        Self::VolumeArchetypeStorage,
        Self::ColorTable,
    ];

    /// Stable tag used as ID prefix.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Unit => "UnitNode",
            Self::Selection => "SelectionNode",
            Self::ScalarVolume => "ScalarVolumeNode",
            Self::LabelMapVolume => "LabelMapVolumeNode",
            Self::VectorVolume => "VectorVolumeNode",
            Self::DiffusionWeightedVolume => "DiffusionWeightedVolumeNode",
            Self::DiffusionTensorVolume => "DiffusionTensorVolumeNode",
            Self::ScalarVolumeDisplay => "ScalarVolumeDisplayNode",
            Self::LabelMapVolumeDisplay => "LabelMapVolumeDisplayNode",
            Self::VectorVolumeDisplay => "VectorVolumeDisplayNode",
            Self::DiffusionWeightedVolumeDisplay => "DiffusionWeightedVolumeDisplayNode",
            Self::DiffusionTensorVolumeDisplay => "DiffusionTensorVolumeDisplayNode",
            Self::NrrdStorage => "NRRDStorageNode",
            Self::VolumeArchetypeStorage => "VolumeArchetypeStorageNode",
            Self::ColorTable => "ColorTableNode",
        }
    }

    /// Returns the volume kind for volume classes.
    pub fn volume_kind(self) -> Option<VolumeKind> {
        match self {
            Self::ScalarVolume => Some(VolumeKind::Scalar),
            Self::LabelMapVolume => Some(VolumeKind::LabelMap),
            Self::VectorVolume => Some(VolumeKind::Vector),
            Self::DiffusionWeightedVolume => Some(VolumeKind::DiffusionWeighted),
            Self::DiffusionTensorVolume => Some(VolumeKind::DiffusionTensor),
            _ => None,
        }
    }

    /// Returns the display kind for volume display classes.
    pub fn display_kind(self) -> Option<VolumeKind> {
        match self {
            Self::ScalarVolumeDisplay => Some(VolumeKind::Scalar),
            Self::LabelMapVolumeDisplay => Some(VolumeKind::LabelMap),
            Self::VectorVolumeDisplay => Some(VolumeKind::Vector),
            Self::DiffusionWeightedVolumeDisplay => Some(VolumeKind::DiffusionWeighted),
            Self::DiffusionTensorVolumeDisplay => Some(VolumeKind::DiffusionTensor),
            _ => None,
        }
    }

    pub fn is_volume(self) -> bool {
        self.volume_kind().is_some()
    }
}

impl Display for NodeClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Typed node payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payload", rename_all = "snake_case")]
pub enum NodeData {
    Unit(UnitDefinition),
    Selection(SelectionEntity),
    Volume(VolumeNode),
    VolumeDisplay(VolumeDisplayNode),
    Storage(StorageNode),
    ColorTable(ColorTableNode),
}

impl NodeData {
    pub fn class(&self) -> NodeClass {
        match self {
            Self::Unit(_) => NodeClass::Unit,
            Self::Selection(_) => NodeClass::Selection,
            Self::Volume(volume) => volume.kind.node_class(),
            Self::VolumeDisplay(display) => display.kind.display_class(),
            Self::Storage(storage) => match storage.kind {
                StorageKind::Nrrd => NodeClass::NrrdStorage,
                StorageKind::VolumeArchetype => NodeClass::VolumeArchetypeStorage,
            },
            Self::ColorTable(_) => NodeClass::ColorTable,
        }
    }

    /// Builds a default payload for one class.
    pub fn default_for(class: NodeClass) -> Self {
        if let Some(kind) = class.volume_kind() {
            return Self::Volume(VolumeNode::new(kind));
        }
        if let Some(kind) = class.display_kind() {
            return Self::VolumeDisplay(VolumeDisplayNode::new(kind));
        }
        match class {
            NodeClass::Unit => Self::Unit(UnitDefinition::default()),
            NodeClass::Selection => Self::Selection(SelectionEntity::default()),
            NodeClass::NrrdStorage => Self::Storage(StorageNode::new(StorageKind::Nrrd)),
            NodeClass::VolumeArchetypeStorage => {
                Self::Storage(StorageNode::new(StorageKind::VolumeArchetype))
            }
            _ => Self::ColorTable(ColorTableNode::default()),
        }
    }

    /// Restores the payload state a singleton has after a scene clear.
    ///
    /// Returns whether anything changed. Unit definitions and color tables
    /// are catalog data and survive unchanged.
    pub fn reset(&mut self) -> bool {
        match self {
            Self::Selection(selection) => selection.reset(),
            Self::Unit(_) | Self::ColorTable(_) => false,
            other => {
                let fresh = Self::default_for(other.class());
                let changed = *other != fresh;
                *other = fresh;
                changed
            }
        }
    }

    /// Rewrites node references through `map`; unmapped references stay.
    pub fn remap_references(&mut self, map: &BTreeMap<NodeId, NodeId>) {
        fn remap(slot: &mut Option<NodeId>, map: &BTreeMap<NodeId, NodeId>) {
            if let Some(new_id) = slot.as_ref().and_then(|id| map.get(id)) {
                *slot = Some(new_id.clone());
            }
        }

        match self {
            Self::Volume(volume) => {
                remap(&mut volume.display_node_id, map);
                remap(&mut volume.storage_node_id, map);
                remap(&mut volume.transform_node_id, map);
            }
            Self::VolumeDisplay(display) => remap(&mut display.color_node_id, map),
            Self::Selection(selection) => selection.remap_references(map),
            Self::Unit(_) | Self::Storage(_) | Self::ColorTable(_) => {}
        }
    }

    pub fn as_unit(&self) -> Option<&UnitDefinition> {
        match self {
            Self::Unit(unit) => Some(unit),
            _ => None,
        }
    }

    pub fn as_selection(&self) -> Option<&SelectionEntity> {
        match self {
            Self::Selection(selection) => Some(selection),
            _ => None,
        }
    }

    pub fn as_selection_mut(&mut self) -> Option<&mut SelectionEntity> {
        match self {
            Self::Selection(selection) => Some(selection),
            _ => None,
        }
    }

    pub fn as_volume(&self) -> Option<&VolumeNode> {
        match self {
            Self::Volume(volume) => Some(volume),
            _ => None,
        }
    }

    pub fn as_volume_mut(&mut self) -> Option<&mut VolumeNode> {
        match self {
            Self::Volume(volume) => Some(volume),
            _ => None,
        }
    }

    pub fn as_display(&self) -> Option<&VolumeDisplayNode> {
        match self {
            Self::VolumeDisplay(display) => Some(display),
            _ => None,
        }
    }

    pub fn as_display_mut(&mut self) -> Option<&mut VolumeDisplayNode> {
        match self {
            Self::VolumeDisplay(display) => Some(display),
            _ => None,
        }
    }

    pub fn as_storage(&self) -> Option<&StorageNode> {
        match self {
            Self::Storage(storage) => Some(storage),
            _ => None,
        }
    }

    pub fn as_storage_mut(&mut self) -> Option<&mut StorageNode> {
        match self {
            Self::Storage(storage) => Some(storage),
            _ => None,
        }
    }
}

fn default_persist() -> bool {
    true
}

/// Node envelope stored by a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    /// Assigned by the owning scene on insertion.
    pub id: NodeId,
    pub name: Option<String>,
    /// Marks the node as a scene singleton; see module invariants.
    pub singleton_tag: Option<String>,
    /// `false` excludes the node from committed scene documents.
    #[serde(default = "default_persist")]
    pub persist: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub data: NodeData,
}

impl SceneNode {
    /// Creates an unnamed, persistent node that has not been added yet.
    pub fn new(data: NodeData) -> Self {
        Self {
            id: NodeId::unassigned(),
            name: None,
            singleton_tag: None,
            persist: true,
            attributes: BTreeMap::new(),
            data,
        }
    }

    pub fn named(name: impl Into<String>, data: NodeData) -> Self {
        let mut node = Self::new(data);
        node.name = Some(name.into());
        node
    }

    pub fn with_singleton_tag(mut self, tag: impl Into<String>) -> Self {
        self.singleton_tag = Some(tag.into());
        self
    }

    pub fn class(&self) -> NodeClass {
        self.data.class()
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton_tag.is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeClass, NodeData, NodeId, SceneNode};
    use crate::model::selection::SelectionEntity;

    #[test]
    fn default_payload_matches_requested_class() {
        for class in NodeClass::ALL {
            assert_eq!(NodeData::default_for(class).class(), class);
        }
    }

    #[test]
    fn selection_reset_reports_change_only_when_mapping_existed() {
        let mut data = NodeData::Selection(SelectionEntity::default());
        assert!(!data.reset());

        data.as_selection_mut()
            .expect("selection payload")
            .set_unit_node_id("length", &NodeId::new("UnitNodeMillimeter"));
        assert!(data.reset());
        assert!(data
            .as_selection()
            .expect("selection payload")
            .unit_node_ids()
            .is_empty());
    }

    #[test]
    fn new_nodes_are_unassigned_and_persistent() {
        let node = SceneNode::new(NodeData::default_for(NodeClass::ScalarVolume));
        assert!(!node.id.is_assigned());
        assert!(node.persist);
        assert!(!node.is_singleton());
    }
}
