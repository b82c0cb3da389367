//! Default color tables for volume displays.

use crate::model::color::ColorTableNode;
use crate::model::node::{NodeClass, NodeData, NodeId, SceneNode};
use crate::scene::Scene;

const LEGACY_LABEL_EXTENSIONS: [&str; 3] = [".mgz", ".mgh", ".mgh.gz"];

/// Palette assignment for new display nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorDefaults {
    pub volume: ColorTableNode,
    pub label_map: ColorTableNode,
    /// Label maps stored in the legacy neuroimaging formats.
    pub legacy_label_map: ColorTableNode,
}

impl Default for ColorDefaults {
    fn default() -> Self {
        Self {
            volume: ColorTableNode::new("Grey", false),
            label_map: ColorTableNode::new("GenericAnatomyColors", true),
            legacy_label_map: ColorTableNode::new("FreeSurferLabels", true),
        }
    }
}

impl ColorDefaults {
    /// Scene ID of a palette singleton.
    pub fn table_id(table: &ColorTableNode) -> NodeId {
        NodeId::new(format!("{}{}", NodeClass::ColorTable.tag(), table.palette))
    }

    /// Adds the three palette singletons. Present tables are left alone.
    pub fn install(&self, scene: &mut Scene) {
        for table in [&self.volume, &self.label_map, &self.legacy_label_map] {
            if scene.contains(&Self::table_id(table)) {
                continue;
            }
            scene.add_node(
                SceneNode::named(table.palette.clone(), NodeData::ColorTable(table.clone()))
                    .with_singleton_tag(table.palette.clone()),
            );
        }
    }

    /// Palette ID for a display of the given flavor.
    pub fn color_node_id(&self, label_map: bool, file_name: Option<&str>) -> NodeId {
        let table = match (label_map, file_name) {
            (false, _) => &self.volume,
            (true, Some(file_name)) if is_legacy_label_format(file_name) => {
                &self.legacy_label_map
            }
            (true, _) => &self.label_map,
        };
        Self::table_id(table)
    }

    /// Points `display_id` at the matching palette ID. The palette itself
    /// is added by `install`, once per scene.
    pub fn assign(
        &self,
        scene: &mut Scene,
        display_id: &NodeId,
        label_map: bool,
        file_name: Option<&str>,
    ) {
        let color_id = self.color_node_id(label_map, file_name);
        let _ = scene.modify_node(display_id, |data| match data.as_display_mut() {
            Some(display) if display.color_node_id.as_ref() != Some(&color_id) => {
                display.color_node_id = Some(color_id);
                true
            }
            _ => false,
        });
    }
}

/// `.mgz`, `.mgh` and `.mgh.gz` files, case-insensitive.
pub fn is_legacy_label_format(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    LEGACY_LABEL_EXTENSIONS
        .iter()
        .any(|extension| lower.ends_with(extension))
}

#[cfg(test)]
mod tests {
    use super::{is_legacy_label_format, ColorDefaults};
    use crate::model::node::{NodeClass, NodeData, NodeId, SceneNode};
    use crate::scene::Scene;

    #[test]
    fn legacy_extensions_are_case_insensitive() {
        assert!(is_legacy_label_format("aseg.MGZ"));
        assert!(is_legacy_label_format("/data/brain.mgh"));
        assert!(is_legacy_label_format("orig.mgh.gz"));
        assert!(!is_legacy_label_format("brain.nrrd"));
        assert!(!is_legacy_label_format("mgz"));
    }

    #[test]
    fn palette_choice_depends_on_label_flag_and_format() {
        let colors = ColorDefaults::default();
        assert_eq!(
            colors.color_node_id(false, Some("aseg.mgz")),
            NodeId::new("ColorTableNodeGrey")
        );
        assert_eq!(
            colors.color_node_id(true, Some("aseg.mgz")),
            NodeId::new("ColorTableNodeFreeSurferLabels")
        );
        assert_eq!(
            colors.color_node_id(true, None),
            NodeId::new("ColorTableNodeGenericAnatomyColors")
        );
    }

    #[test]
    fn assign_only_references_the_palette() {
        let mut scene = Scene::new();
        let display = scene.add_node(SceneNode::new(NodeData::default_for(NodeClass::LabelMapVolumeDisplay)));
        let before = scene.node_count();
        ColorDefaults::default().assign(&mut scene, &display, true, Some("aseg.mgz"));
        assert_eq!(scene.node_count(), before);
        assert_eq!(
            scene.display(&display).expect("display").color_node_id,
            Some(NodeId::new("ColorTableNodeFreeSurferLabels"))
        );
    }

    #[test]
    fn install_is_idempotent() {
        let mut scene = Scene::new();
        let colors = ColorDefaults::default();
        colors.install(&mut scene);
        colors.install(&mut scene);
        assert_eq!(scene.nodes_by_class(NodeClass::ColorTable).len(), 3);
    }
}
