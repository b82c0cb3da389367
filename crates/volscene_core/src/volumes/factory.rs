//! Node-set factories and their ordered registry.
//!
//! # Responsibility
//! - Build unpopulated volume node sets (volume + display + storage) in a
//!   scratch scene, one flavor per factory.
//! - Keep the trial order of factories: specific formats first, generic
//!   fallbacks last.
//!
//! # Invariants
//! - A factory touches nothing outside the scene it is given.
//! - Factory names are unique within a registry; registering a name twice
//!   is a no-op.
//!
//! # See also
//! - `ingest` for the trial-and-rollback loop that consumes the registry.

use crate::model::node::{NodeData, NodeId, SceneNode};
use crate::model::storage::{StorageKind, StorageNode};
use crate::model::volume::{VolumeDisplayNode, VolumeKind, VolumeNode};
use crate::scene::Scene;
use std::fmt::{Display, Formatter};
use std::ops::BitOr;
use std::rc::Rc;

/// Bit-coded loading options. Unknown higher bits are carried unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LoadOptions(u32);

impl LoadOptions {
    pub const NONE: Self = Self(0);
    pub const LABEL_MAP: Self = Self(1);
    pub const CENTER_IMAGE: Self = Self(1 << 1);
    pub const SINGLE_FILE: Self = Self(1 << 2);
    pub const AUTO_WINDOW_LEVEL: Self = Self(1 << 3);
    pub const DISCARD_ORIENTATION: Self = Self(1 << 4);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_label_map(self) -> bool {
        self.contains(Self::LABEL_MAP)
    }
}

impl BitOr for LoadOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Display for LoadOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#07b}", self.0)
    }
}

/// IDs of one candidate node set plus its label-map discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeNodeSet {
    pub node: NodeId,
    pub display: NodeId,
    pub storage: NodeId,
    pub label_map: bool,
}

impl VolumeNodeSet {
    /// Member IDs in removal order: display, storage, volume.
    pub fn members(&self) -> [&NodeId; 3] {
        [&self.display, &self.storage, &self.node]
    }
}

/// Builds one flavor of volume node set.
pub trait NodeSetFactory {
    /// Registry identity.
    fn name(&self) -> &str;

    /// Creates and wires the three nodes inside `scene`.
    fn create(&self, volume_name: &str, scene: &mut Scene, options: LoadOptions) -> VolumeNodeSet;
}

/// The built-in node-set flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultNodeSet {
    DiffusionWeighted,
    DiffusionTensor,
    NrrdVector,
    ArchetypeVector,
    LabelMap,
    Scalar,
}

impl DefaultNodeSet {
    /// Default trial order.
    pub const ORDER: [DefaultNodeSet; 6] = [
        Self::DiffusionWeighted,
        Self::DiffusionTensor,
        Self::NrrdVector,
        Self::ArchetypeVector,
        Self::LabelMap,
        Self::Scalar,
    ];

    fn volume_kind(self) -> VolumeKind {
        match self {
            Self::DiffusionWeighted => VolumeKind::DiffusionWeighted,
            Self::DiffusionTensor => VolumeKind::DiffusionTensor,
            Self::NrrdVector | Self::ArchetypeVector => VolumeKind::Vector,
            Self::LabelMap => VolumeKind::LabelMap,
            Self::Scalar => VolumeKind::Scalar,
        }
    }

    fn storage(self, options: LoadOptions) -> StorageNode {
        let center_image = options.contains(LoadOptions::CENTER_IMAGE);
        match self {
            Self::DiffusionWeighted | Self::NrrdVector => {
                let mut storage = StorageNode::new(StorageKind::Nrrd);
                storage.center_image = center_image;
                storage
            }
            _ => archetype_storage(options),
        }
    }

    fn display(self) -> VolumeDisplayNode {
        let mut display = VolumeDisplayNode::new(self.volume_kind());
        if self == Self::DiffusionTensor {
            display.window = 0.0;
            display.level = 0.0;
            display.upper_threshold = 0.0;
            display.lower_threshold = 0.0;
            display.auto_window_level = true;
        }
        display
    }
}

/// Generic archetype storage honoring center/orientation/single-file bits.
pub fn archetype_storage(options: LoadOptions) -> StorageNode {
    let mut storage = StorageNode::new(StorageKind::VolumeArchetype);
    storage.center_image = options.contains(LoadOptions::CENTER_IMAGE);
    storage.use_orientation_from_file = !options.contains(LoadOptions::DISCARD_ORIENTATION);
    storage.single_file = options.contains(LoadOptions::SINGLE_FILE);
    storage
}

impl NodeSetFactory for DefaultNodeSet {
    fn name(&self) -> &str {
        match self {
            Self::DiffusionWeighted => "diffusion_weighted",
            Self::DiffusionTensor => "diffusion_tensor",
            Self::NrrdVector => "nrrd_vector",
            Self::ArchetypeVector => "archetype_vector",
            Self::LabelMap => "label_map",
            Self::Scalar => "scalar",
        }
    }

    fn create(&self, volume_name: &str, scene: &mut Scene, options: LoadOptions) -> VolumeNodeSet {
        let volume = SceneNode::named(volume_name, NodeData::Volume(VolumeNode::new(self.volume_kind())));
        let display = SceneNode::new(NodeData::VolumeDisplay(self.display()));

        // label maps add the volume first, every other flavor its display
        let (node, display) = if *self == Self::LabelMap {
            let node = scene.add_node(volume);
            (node, scene.add_node(display))
        } else {
            let display = scene.add_node(display);
            (scene.add_node(volume), display)
        };
        let storage = scene.add_node(SceneNode::new(NodeData::Storage(self.storage(options))));
        link_node_set(scene, &node, &display, &storage);

        VolumeNodeSet {
            node,
            display,
            storage,
            label_map: *self == Self::LabelMap,
        }
    }
}

/// Points a volume at its display and storage nodes.
pub fn link_node_set(scene: &mut Scene, node: &NodeId, display: &NodeId, storage: &NodeId) {
    let display = display.clone();
    let storage = storage.clone();
    let _ = scene.modify_node(node, |data| match data.as_volume_mut() {
        Some(volume) => {
            volume.display_node_id = Some(display);
            volume.storage_node_id = Some(storage);
            true
        }
        None => false,
    });
}

/// Ordered list of node-set factories.
#[derive(Clone, Default)]
pub struct NodeSetFactoryRegistry {
    factories: Vec<Rc<dyn NodeSetFactory>>,
}

impl NodeSetFactoryRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the six built-in flavors in default order.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for flavor in DefaultNodeSet::ORDER {
            registry.register(Rc::new(flavor));
        }
        registry
    }

    /// Appends a factory. Returns `false` when this same instance is
    /// already registered; distinct instances may share a name.
    pub fn register(&mut self, factory: Rc<dyn NodeSetFactory>) -> bool {
        if self.instance_position(&factory).is_some() {
            return false;
        }
        log::debug!(
            "event=factory_register module=volumes status=ok factory={} position={}",
            factory.name(),
            self.factories.len()
        );
        self.factories.push(factory);
        true
    }

    /// Moves (or inserts) a factory instance to the front of the trial
    /// order.
    pub fn register_with_priority(&mut self, factory: Rc<dyn NodeSetFactory>) {
        if let Some(index) = self.instance_position(&factory) {
            self.factories.remove(index);
        }
        log::debug!(
            "event=factory_register module=volumes status=ok factory={} position=0",
            factory.name()
        );
        self.factories.insert(0, factory);
    }

    fn instance_position(&self, factory: &Rc<dyn NodeSetFactory>) -> Option<usize> {
        self.factories
            .iter()
            .position(|existing| Rc::ptr_eq(existing, factory))
    }

    /// Whether the instance is registered.
    pub fn contains_instance(&self, factory: &Rc<dyn NodeSetFactory>) -> bool {
        self.instance_position(factory).is_some()
    }

    /// Whether any registered factory has this name.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.iter().any(|factory| factory.name() == name)
    }

    /// Factory names in trial order.
    pub fn names(&self) -> Vec<String> {
        self.factories
            .iter()
            .map(|factory| factory.name().to_string())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<dyn NodeSetFactory>> {
        self.factories.iter()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{DefaultNodeSet, LoadOptions, NodeSetFactory, NodeSetFactoryRegistry};
    use crate::model::node::NodeClass;
    use crate::scene::Scene;
    use std::rc::Rc;

    #[test]
    fn load_options_keep_reserved_bits() {
        let options = LoadOptions::from_bits(0b1_0000_0011);
        assert!(options.is_label_map());
        assert!(options.contains(LoadOptions::CENTER_IMAGE));
        assert!(!options.contains(LoadOptions::SINGLE_FILE));
        assert_eq!(options.bits(), 0b1_0000_0011);
        assert_eq!(
            (LoadOptions::SINGLE_FILE | LoadOptions::DISCARD_ORIENTATION).bits(),
            20
        );
    }

    #[test]
    fn defaults_are_registered_in_trial_order() {
        let registry = NodeSetFactoryRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec![
                "diffusion_weighted",
                "diffusion_tensor",
                "nrrd_vector",
                "archetype_vector",
                "label_map",
                "scalar"
            ]
        );
    }

    #[test]
    fn registration_is_keyed_by_instance() {
        let mut registry = NodeSetFactoryRegistry::with_defaults();
        let custom: Rc<dyn NodeSetFactory> = Rc::new(DefaultNodeSet::Scalar);
        assert!(registry.register(custom.clone()));
        assert!(!registry.register(custom.clone()));
        assert_eq!(registry.len(), 7);
        assert!(registry.contains_instance(&custom));

        registry.register_with_priority(custom.clone());
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.names()[0], "scalar");
        assert_eq!(registry.names()[5], "label_map");
        assert_eq!(registry.names()[6], "scalar");
        assert!(Rc::ptr_eq(registry.iter().next().expect("front"), &custom));
    }

    #[test]
    fn label_map_factory_wires_archetype_storage() {
        let mut scene = Scene::new();
        let options = LoadOptions::LABEL_MAP | LoadOptions::SINGLE_FILE | LoadOptions::DISCARD_ORIENTATION;
        let set = DefaultNodeSet::LabelMap.create("seg", &mut scene, options);
        assert!(set.label_map);

        let volume = scene.volume(&set.node).expect("volume");
        assert_eq!(volume.display_node_id.as_ref(), Some(&set.display));
        assert_eq!(volume.storage_node_id.as_ref(), Some(&set.storage));
        let storage = scene.storage(&set.storage).expect("storage");
        assert!(storage.single_file);
        assert!(!storage.use_orientation_from_file);
        assert_eq!(
            scene.node(&set.storage).map(|node| node.class()),
            Some(NodeClass::VolumeArchetypeStorage)
        );
    }

    #[test]
    fn diffusion_factories_configure_storage_and_display() {
        let mut scene = Scene::new();
        let dwi = DefaultNodeSet::DiffusionWeighted.create("dwi", &mut scene, LoadOptions::CENTER_IMAGE);
        let storage = scene.storage(&dwi.storage).expect("storage");
        assert!(storage.center_image);
        assert_eq!(
            scene.node(&dwi.storage).map(|node| node.class()),
            Some(NodeClass::NrrdStorage)
        );

        let dti = DefaultNodeSet::DiffusionTensor.create("dti", &mut scene, LoadOptions::NONE);
        let display = scene.display(&dti.display).expect("display");
        assert_eq!(display.window, 0.0);
        assert_eq!(display.lower_threshold, 0.0);
        assert!(display.auto_window_level);
        assert!(!dti.label_map);
    }
}
