//! Scene-level volume operations: label volumes, clones, centering and
//! archetype saving.
//!
//! # Responsibility
//! - Derive new volumes (label maps, clones) that share a source's
//!   geometry but own their voxels.
//! - Point a volume at the right storage flavor before writing it.
//!
//! # Invariants
//! - Derived volumes never share storage nodes with their source.
//! - New names are made unique within the scene.

use crate::model::node::{NodeData, NodeId, SceneNode};
use crate::model::storage::{StorageKind, StorageNode, VolumeIo};
use crate::model::volume::{ScalarType, VolumeDisplayNode, VolumeKind, VolumeNode};
use crate::scene::{Scene, SceneError};
use crate::volumes::colors::ColorDefaults;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Attribute linking a label volume to the volume it was derived from.
pub const ASSOCIATED_NODE_ATTRIBUTE: &str = "AssociatedNodeID";

pub type VolumeOpResult<T> = Result<T, VolumeOpError>;

#[derive(Debug)]
pub enum VolumeOpError {
    InvalidArgument(&'static str),
    Scene(SceneError),
}

impl Display for VolumeOpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::Scene(err) => write!(f, "{err}"),
        }
    }
}

impl Error for VolumeOpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Scene(err) => Some(err),
            Self::InvalidArgument(_) => None,
        }
    }
}

impl From<SceneError> for VolumeOpError {
    fn from(value: SceneError) -> Self {
        Self::Scene(value)
    }
}

fn require_name(name: &str) -> VolumeOpResult<()> {
    if name.trim().is_empty() {
        return Err(VolumeOpError::InvalidArgument("volume name is empty"));
    }
    Ok(())
}

/// Creates a zero-filled `Short` label map with `volume_id`'s geometry.
///
/// The label gets its own label-map display using the label palette and
/// an `AssociatedNodeID` attribute pointing back at the source.
pub fn create_and_add_label_volume(
    scene: &mut Scene,
    colors: &ColorDefaults,
    volume_id: &NodeId,
    name: &str,
) -> VolumeOpResult<NodeId> {
    require_name(name)?;
    let source = scene.volume(volume_id)?;
    let mut label = source.label_map_like();
    label.image = source
        .image
        .as_ref()
        .map(|image| image.zeroed_like(ScalarType::Short));

    let display_id = scene.add_node(SceneNode::new(NodeData::VolumeDisplay(
        VolumeDisplayNode::new(VolumeKind::LabelMap),
    )));
    colors.assign(scene, &display_id, true, None);

    label.display_node_id = Some(display_id);
    let mut node = SceneNode::named(scene.unique_name(name), NodeData::Volume(label));
    node.set_attribute(ASSOCIATED_NODE_ATTRIBUTE, volume_id.as_str());
    let label_id = scene.add_node(node);
    log::debug!(
        "event=label_volume_create module=volumes status=ok source={volume_id} label={label_id}"
    );
    Ok(label_id)
}

/// Resets `label_id` to a zero-filled copy of `template_id`'s geometry.
///
/// The label keeps its name and references. A label-map display is
/// created and linked when the label has none.
pub fn fill_label_volume_from_template(
    scene: &mut Scene,
    colors: &ColorDefaults,
    label_id: &NodeId,
    template_id: &NodeId,
) -> VolumeOpResult<NodeId> {
    let label_kind = scene.volume(label_id)?.kind;
    if label_kind != VolumeKind::LabelMap {
        return Err(SceneError::WrongNodeClass {
            id: label_id.clone(),
            expected: "label map volume",
            actual: label_kind.node_class(),
        }
        .into());
    }
    let template = scene.volume(template_id)?.clone();

    let existing_display = scene
        .volume(label_id)?
        .display_node_id
        .clone()
        .filter(|id| {
            scene
                .display(id)
                .is_ok_and(|display| display.kind == VolumeKind::LabelMap)
        });
    let display_id = match existing_display {
        Some(id) => id,
        None => scene.add_node(SceneNode::new(NodeData::VolumeDisplay(
            VolumeDisplayNode::new(VolumeKind::LabelMap),
        ))),
    };
    colors.assign(scene, &display_id, true, None);

    scene.modify_node(label_id, |data| {
        let Some(label) = data.as_volume_mut() else {
            return false;
        };
        label.copy_orientation(&template);
        label.image = template
            .image
            .as_ref()
            .map(|image| image.zeroed_like(ScalarType::Short));
        label.display_node_id = Some(display_id);
        true
    })?;
    Ok(label_id.clone())
}

/// Copies a volume and its display node under a unique name.
///
/// The clone has no storage node. With `clone_image_data` the voxels are
/// deep-copied, otherwise the clone has none.
pub fn clone_volume(
    scene: &mut Scene,
    volume_id: &NodeId,
    name: &str,
    clone_image_data: bool,
) -> VolumeOpResult<NodeId> {
    require_name(name)?;
    let source_node = scene
        .node(volume_id)
        .ok_or_else(|| SceneError::UnknownNode(volume_id.clone()))?;
    let source = scene.volume(volume_id)?.clone();
    let attributes = source_node.attributes.clone();

    let display_clone = source
        .display_node_id
        .as_ref()
        .and_then(|id| scene.display(id).ok())
        .cloned();
    let display_id =
        display_clone.map(|display| scene.add_node(SceneNode::new(NodeData::VolumeDisplay(display))));

    let mut clone = VolumeNode::new(source.kind);
    clone.copy_orientation(&source);
    clone.transform_node_id = source.transform_node_id.clone();
    clone.display_node_id = display_id;
    if clone_image_data {
        match &source.image {
            Some(image) => clone.image = Some(image.clone()),
            None => log::error!(
                "event=volume_clone module=volumes status=error volume={volume_id} error=source has no image data"
            ),
        }
    }

    let mut node = SceneNode::named(scene.unique_name(name), NodeData::Volume(clone));
    node.attributes = attributes;
    let clone_id = scene.add_node(node);
    log::debug!("event=volume_clone module=volumes status=ok source={volume_id} clone={clone_id}");
    Ok(clone_id)
}

/// Origin that centers the volume on RAS (0, 0, 0); zero without voxels.
pub fn volume_centered_origin(scene: &Scene, volume_id: &NodeId) -> VolumeOpResult<[f64; 3]> {
    Ok(scene
        .volume(volume_id)?
        .centered_origin()
        .unwrap_or([0.0; 3]))
}

/// Moves the origin so the volume is centered. Returns `false` without
/// voxels.
pub fn center_volume(scene: &mut Scene, volume_id: &NodeId) -> VolumeOpResult<bool> {
    let Some(origin) = scene.volume(volume_id)?.centered_origin() else {
        return Ok(false);
    };
    scene.modify_node(volume_id, |data| match data.as_volume_mut() {
        Some(volume) if volume.origin != origin => {
            volume.origin = origin;
            true
        }
        _ => false,
    })?;
    Ok(true)
}

/// Storage flavor a volume is saved with.
pub fn save_storage_kind(kind: VolumeKind) -> StorageKind {
    match kind {
        VolumeKind::DiffusionWeighted | VolumeKind::Vector => StorageKind::Nrrd,
        _ => StorageKind::VolumeArchetype,
    }
}

/// Writes a volume to `file_name` through a storage node of the matching
/// flavor, creating and linking one when the current storage differs.
pub fn save_archetype_volume(
    scene: &mut Scene,
    io: &dyn VolumeIo,
    file_name: &str,
    volume_id: &NodeId,
) -> VolumeOpResult<()> {
    if file_name.trim().is_empty() {
        return Err(VolumeOpError::InvalidArgument("file name is empty"));
    }
    let volume = scene.volume(volume_id)?;
    let wanted = save_storage_kind(volume.kind);
    let current = volume
        .storage_node_id
        .clone()
        .filter(|id| scene.storage(id).is_ok_and(|storage| storage.kind == wanted));

    let storage_id = match current {
        Some(id) => id,
        None => {
            let id = scene.add_node(SceneNode::new(NodeData::Storage(StorageNode::new(wanted))));
            let link = id.clone();
            scene.modify_node(volume_id, |data| match data.as_volume_mut() {
                Some(volume) => {
                    volume.storage_node_id = Some(link);
                    true
                }
                None => false,
            })?;
            id
        }
    };

    let is_remote = scene.is_remote_reference(file_name);
    scene.modify_node(&storage_id, |data| match data.as_storage_mut() {
        Some(storage) => {
            storage.set_reference(file_name, is_remote);
            true
        }
        None => false,
    })?;
    scene.write_volume_data(volume_id, io)?;
    log::info!(
        "event=volume_save module=volumes status=ok volume={volume_id} storage={storage_id} codec={}",
        io.name()
    );
    Ok(())
}
