//! Volumes use-case service.
//!
//! # Responsibility
//! - Give host code one stateful entry point for volume loading, saving,
//!   derivation and geometry checks.
//! - Own the factory registry, color defaults and comparison epsilon.
//! - Relay storage progress and completed ingestions to logic observers.
//!
//! # Invariants
//! - The service never owns a scene; every call borrows the caller's.
//! - Registries are per service instance; two services never share
//!   factory order.
//! - `active_volume` is only set by a successful ingestion or an explicit
//!   `set_active_volume`.

use crate::model::node::NodeId;
use crate::model::storage::{StorageEvent, StorageObserver, VolumeIo};
use crate::scene::Scene;
use crate::volumes::colors::{self, ColorDefaults};
use crate::volumes::factory::{
    DefaultNodeSet, NodeSetFactory, NodeSetFactoryRegistry, VolumeNodeSet,
};
use crate::volumes::geometry::GeometryComparator;
use crate::volumes::ingest::{self, ArchetypeIngestionPipeline, IngestRequest, IngestResult};
use crate::volumes::ops::{self, VolumeOpResult};
use crate::volumes::transform::{self, TransformResult};
use glam::DMat4;
use std::rc::Rc;

/// Host-side listener for service-level events.
///
/// Every callback defaults to a no-op.
pub trait LogicObserver {
    /// Storage read progress in `[0, 1]`.
    fn on_progress(&self, _fraction: f64) {}

    /// A volume node set was committed to the scene.
    fn on_node_added(&self, _volume_id: &NodeId) {}

    /// Service state changed.
    fn on_modified(&self) {}
}

/// Forwards storage progress to logic observers.
pub struct ProgressRelay {
    observers: Vec<Rc<dyn LogicObserver>>,
}

impl ProgressRelay {
    pub fn new(observers: Vec<Rc<dyn LogicObserver>>) -> Self {
        Self { observers }
    }
}

impl StorageObserver for ProgressRelay {
    fn on_storage_event(&self, event: &StorageEvent) {
        if let StorageEvent::Progress(fraction) = event {
            for observer in &self.observers {
                observer.on_progress(*fraction);
            }
        }
    }
}

/// Facade over the volume operations, generic over the volume codec.
pub struct VolumesService<I: VolumeIo> {
    io: I,
    pipeline: ArchetypeIngestionPipeline,
    comparator: GeometryComparator,
    active_volume: Option<NodeId>,
    observers: Vec<Rc<dyn LogicObserver>>,
}

impl<I: VolumeIo> VolumesService<I> {
    /// Creates a service with the built-in factories and color defaults.
    pub fn new(io: I) -> Self {
        Self::with_pipeline(io, ArchetypeIngestionPipeline::with_defaults())
    }

    pub fn with_pipeline(io: I, pipeline: ArchetypeIngestionPipeline) -> Self {
        Self {
            io,
            pipeline,
            comparator: GeometryComparator::default(),
            active_volume: None,
            observers: Vec::new(),
        }
    }

    pub fn with_colors(mut self, colors: ColorDefaults) -> Self {
        self.pipeline = self.pipeline.with_colors(colors);
        self
    }

    pub fn io(&self) -> &I {
        &self.io
    }

    pub fn colors(&self) -> &ColorDefaults {
        self.pipeline.colors()
    }

    /// Adds the default palette singletons to `scene`. Displays created by
    /// this service reference them by ID.
    pub fn install_color_tables(&self, scene: &mut Scene) {
        self.colors().install(scene);
    }

    pub fn registry(&self) -> &NodeSetFactoryRegistry {
        self.pipeline.registry()
    }

    pub fn add_observer(&mut self, observer: Rc<dyn LogicObserver>) {
        self.observers.push(observer);
    }

    /// Appends a factory to the trial order. Returns `false` when the
    /// instance is already registered.
    pub fn register_node_set_factory(&mut self, factory: Rc<dyn NodeSetFactory>) -> bool {
        self.pipeline.registry_mut().register(factory)
    }

    /// Moves a factory to the front of the trial order.
    pub fn preregister_node_set_factory(&mut self, factory: Rc<dyn NodeSetFactory>) {
        self.pipeline.registry_mut().register_with_priority(factory);
    }

    /// Loads a file through the registered factories.
    ///
    /// # Contract
    /// - On success the volume becomes the active volume, observers get
    ///   `on_node_added` for the volume node and then `on_modified`.
    /// - On failure the scene only gains an undo checkpoint.
    pub fn add_archetype_volume(
        &mut self,
        scene: &mut Scene,
        request: &IngestRequest,
    ) -> IngestResult<VolumeNodeSet> {
        let pipeline = self.pipeline.clone();
        self.ingest_with(&pipeline, scene, request)
    }

    /// Loads a file with the scalar factory only.
    pub fn add_archetype_scalar_volume(
        &mut self,
        scene: &mut Scene,
        request: &IngestRequest,
    ) -> IngestResult<VolumeNodeSet> {
        let mut registry = NodeSetFactoryRegistry::new();
        registry.register(Rc::new(DefaultNodeSet::Scalar));
        let pipeline =
            ArchetypeIngestionPipeline::new(registry).with_colors(self.pipeline.colors().clone());
        self.ingest_with(&pipeline, scene, request)
    }

    fn ingest_with(
        &mut self,
        pipeline: &ArchetypeIngestionPipeline,
        scene: &mut Scene,
        request: &IngestRequest,
    ) -> IngestResult<VolumeNodeSet> {
        let progress: Option<Rc<dyn StorageObserver>> = if self.observers.is_empty() {
            None
        } else {
            Some(Rc::new(ProgressRelay::new(self.observers.clone())))
        };
        let set = pipeline.ingest(scene, &self.io, request, progress)?;
        self.active_volume = Some(set.node.clone());
        for observer in &self.observers {
            observer.on_node_added(&set.node);
        }
        self.notify_modified();
        Ok(set)
    }

    pub fn active_volume(&self) -> Option<&NodeId> {
        self.active_volume.as_ref()
    }

    /// Sets the active volume slot and mirrors it into the selection.
    pub fn set_active_volume(&mut self, scene: &mut Scene, volume_id: Option<NodeId>) {
        if self.active_volume == volume_id {
            return;
        }
        if let Some(id) = &volume_id {
            let label_map = scene
                .volume(id)
                .is_ok_and(|volume| volume.kind.is_label_map());
            ingest::set_active_volume(scene, id, label_map);
        }
        self.active_volume = volume_id;
        self.notify_modified();
    }

    fn notify_modified(&self) {
        for observer in &self.observers {
            observer.on_modified();
        }
    }

    pub fn save_archetype_volume(
        &self,
        scene: &mut Scene,
        file_name: &str,
        volume_id: &NodeId,
    ) -> VolumeOpResult<()> {
        ops::save_archetype_volume(scene, &self.io, file_name, volume_id)
    }

    pub fn create_and_add_label_volume(
        &self,
        scene: &mut Scene,
        volume_id: &NodeId,
        name: &str,
    ) -> VolumeOpResult<NodeId> {
        ops::create_and_add_label_volume(scene, self.pipeline.colors(), volume_id, name)
    }

    pub fn fill_label_volume_from_template(
        &self,
        scene: &mut Scene,
        label_id: &NodeId,
        template_id: &NodeId,
    ) -> VolumeOpResult<NodeId> {
        ops::fill_label_volume_from_template(scene, self.pipeline.colors(), label_id, template_id)
    }

    /// Empty when `label_id` is a label map matching `volume_id`'s geometry.
    pub fn check_for_label_volume_validity(
        &self,
        scene: &Scene,
        volume_id: &NodeId,
        label_id: &NodeId,
    ) -> String {
        self.comparator
            .label_validity(scene.volume(volume_id).ok(), scene.volume(label_id).ok())
    }

    /// Empty when both volumes share geometry within the epsilon.
    pub fn compare_volume_geometry(&self, scene: &Scene, first: &NodeId, second: &NodeId) -> String {
        self.comparator
            .compare(scene.volume(first).ok(), scene.volume(second).ok())
    }

    pub fn set_compare_volume_geometry_epsilon(&mut self, epsilon: f64) {
        if self.comparator.set_epsilon(epsilon) {
            self.notify_modified();
        }
    }

    pub fn compare_volume_geometry_epsilon(&self) -> f64 {
        self.comparator.epsilon()
    }

    pub fn compare_volume_geometry_precision(&self) -> i32 {
        self.comparator.precision()
    }

    pub fn clone_volume(
        &self,
        scene: &mut Scene,
        volume_id: &NodeId,
        name: &str,
    ) -> VolumeOpResult<NodeId> {
        ops::clone_volume(scene, volume_id, name, true)
    }

    pub fn clone_volume_without_image_data(
        &self,
        scene: &mut Scene,
        volume_id: &NodeId,
        name: &str,
    ) -> VolumeOpResult<NodeId> {
        ops::clone_volume(scene, volume_id, name, false)
    }

    pub fn center_volume(&self, scene: &mut Scene, volume_id: &NodeId) -> VolumeOpResult<bool> {
        ops::center_volume(scene, volume_id)
    }

    pub fn volume_centered_origin(
        &self,
        scene: &Scene,
        volume_id: &NodeId,
    ) -> VolumeOpResult<[f64; 3]> {
        ops::volume_centered_origin(scene, volume_id)
    }

    pub fn is_legacy_label_format(&self, file_name: &str) -> bool {
        colors::is_legacy_label_format(file_name)
    }

    pub fn legacy_voxel_to_canonical(
        &self,
        scene: &Scene,
        volume_id: &NodeId,
    ) -> TransformResult<DMat4> {
        transform::legacy_voxel_to_canonical(scene, volume_id)
    }

    pub fn resolve_cross_tool_registration(
        &self,
        scene: &Scene,
        a_id: &NodeId,
        b_id: &NodeId,
        registration: &DMat4,
    ) -> TransformResult<DMat4> {
        transform::resolve_cross_tool_registration(scene, a_id, b_id, registration)
    }
}

#[cfg(test)]
mod tests {
    use super::{LogicObserver, ProgressRelay};
    use crate::model::storage::{StorageEvent, StorageObserver};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        progress: RefCell<Vec<f64>>,
    }

    impl LogicObserver for Recorder {
        fn on_progress(&self, fraction: f64) {
            self.progress.borrow_mut().push(fraction);
        }
    }

    #[test]
    fn progress_relay_forwards_progress_only() {
        let recorder = Rc::new(Recorder::default());
        let observer: Rc<dyn LogicObserver> = recorder.clone();
        let relay = ProgressRelay::new(vec![observer]);
        relay.on_storage_event(&StorageEvent::Progress(0.25));
        relay.on_storage_event(&StorageEvent::Error("ignored".to_string()));
        relay.on_storage_event(&StorageEvent::Progress(1.0));
        assert_eq!(*recorder.progress.borrow(), vec![0.25, 1.0]);
    }
}
