//! Archetype ingestion: resolve one file into a typed volume node set.
//!
//! # Responsibility
//! - Try each registered factory in a disposable scratch scene until one
//!   reads the file.
//! - Move the winning node set into the target scene and relink it.
//! - Collect every read error so a total failure reports them together.
//!
//! # Invariants
//! - The target scene only ever sees the winning node set; failed trials
//!   leave no nodes in the scratch scene either.
//! - The whole operation runs inside one batch window of the target scene,
//!   preceded by an undo checkpoint.
//! - The scratch scene and its remote IO pair never outlive one call.
//!
//! # See also
//! - `factory` for the candidate builders.
//! - `crate::scene::remote_io` for reference classification.

use crate::model::node::{NodeClass, NodeId};
use crate::model::storage::{StorageEvent, StorageObserver, VolumeIo};
use crate::scene::remote_io::RemoteIo;
use crate::scene::{Scene, SceneError};
use crate::volumes::colors::ColorDefaults;
use crate::volumes::factory::{LoadOptions, NodeSetFactoryRegistry, VolumeNodeSet};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::rc::Rc;

pub type IngestResult<T> = Result<T, IngestError>;

/// Ingestion failure.
#[derive(Debug)]
pub enum IngestError {
    InvalidArgument(&'static str),
    /// Every factory either mismatched the label-map flag or failed to read.
    NoFactoryAccepted {
        file_name: String,
        errors: Vec<String>,
    },
    Scene(SceneError),
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::NoFactoryAccepted { file_name, errors } => {
                write!(f, "no volume factory could read `{file_name}`")?;
                for error in errors {
                    write!(f, "\n  {error}")?;
                }
                Ok(())
            }
            Self::Scene(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Scene(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SceneError> for IngestError {
    fn from(value: SceneError) -> Self {
        Self::Scene(value)
    }
}

/// Collects storage error messages across trials.
#[derive(Debug, Default)]
pub struct ErrorSink {
    errors: RefCell<Vec<String>>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.borrow().is_empty()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    pub fn push(&self, message: impl Into<String>) {
        self.errors.borrow_mut().push(message.into());
    }

    pub fn clear(&self) {
        self.errors.borrow_mut().clear();
    }

    /// Logs every collected error.
    pub fn display_errors(&self) {
        for error in self.errors.borrow().iter() {
            log::error!("event=volume_ingest_error module=volumes status=error error={error}");
        }
    }
}

impl StorageObserver for ErrorSink {
    fn on_storage_event(&self, event: &StorageEvent) {
        if let StorageEvent::Error(message) = event {
            self.push(message.clone());
        }
    }
}

/// One ingestion call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestRequest {
    pub file_name: String,
    /// Display name; defaults to the file's base name.
    pub volume_name: Option<String>,
    pub options: LoadOptions,
    /// Remaining files of a multi-file series.
    pub file_list: Option<Vec<String>>,
}

impl IngestRequest {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Self::default()
        }
    }

    pub fn named(mut self, volume_name: impl Into<String>) -> Self {
        self.volume_name = Some(volume_name.into());
        self
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_file_list(mut self, files: Vec<String>) -> Self {
        self.file_list = Some(files);
        self
    }

    fn base_name(&self) -> String {
        Path::new(&self.file_name)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name.clone())
    }
}

/// Trial-and-rollback ingestion over an owned factory registry.
#[derive(Clone)]
pub struct ArchetypeIngestionPipeline {
    registry: NodeSetFactoryRegistry,
    colors: ColorDefaults,
}

impl ArchetypeIngestionPipeline {
    pub fn new(registry: NodeSetFactoryRegistry) -> Self {
        Self {
            registry,
            colors: ColorDefaults::default(),
        }
    }

    /// Pipeline over the six built-in factories.
    pub fn with_defaults() -> Self {
        Self::new(NodeSetFactoryRegistry::with_defaults())
    }

    pub fn with_colors(mut self, colors: ColorDefaults) -> Self {
        self.colors = colors;
        self
    }

    pub fn registry(&self) -> &NodeSetFactoryRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NodeSetFactoryRegistry {
        &mut self.registry
    }

    pub fn colors(&self) -> &ColorDefaults {
        &self.colors
    }

    /// Reads `request.file_name` into `target` and returns the committed
    /// node set.
    ///
    /// `progress`, when given, is attached to every candidate storage node.
    ///
    /// # Errors
    /// - `InvalidArgument` for an empty file name; nothing is touched.
    /// - `NoFactoryAccepted` when every factory mismatched or failed; the
    ///   target scene only gains the undo checkpoint.
    pub fn ingest(
        &self,
        target: &mut Scene,
        io: &dyn VolumeIo,
        request: &IngestRequest,
        progress: Option<Rc<dyn StorageObserver>>,
    ) -> IngestResult<VolumeNodeSet> {
        if request.file_name.trim().is_empty() {
            return Err(IngestError::InvalidArgument("file name is empty"));
        }

        target.start_batch();
        target.save_state_for_undo();
        let result = self.run(target, io, request, progress);
        target.end_batch();

        match &result {
            Ok(set) => log::info!(
                "event=volume_ingest module=volumes status=ok volume={} label_map={}",
                set.node,
                set.label_map
            ),
            Err(err) => log::warn!(
                "event=volume_ingest module=volumes status=error error_kind={}",
                error_kind(err)
            ),
        }
        result
    }

    fn run(
        &self,
        target: &mut Scene,
        io: &dyn VolumeIo,
        request: &IngestRequest,
        progress: Option<Rc<dyn StorageObserver>>,
    ) -> IngestResult<VolumeNodeSet> {
        let base_name = request
            .volume_name
            .clone()
            .unwrap_or_else(|| request.base_name());
        let volume_name = target.unique_name(&base_name);
        let label_map = request.options.is_label_map();

        let mut scratch = Scene::bare();
        for class in NodeClass::ALL {
            scratch.register_node_class(class);
        }
        scratch.set_remote_io(
            target
                .remote_io()
                .map(RemoteIo::clone_settings)
                .unwrap_or_default(),
        );

        let sink = Rc::new(ErrorSink::new());
        let mut winner = None;
        for factory in self.registry.iter() {
            let set = factory.create(&volume_name, &mut scratch, request.options);
            if set.label_map == label_map {
                let accepted =
                    self.try_read(&mut scratch, io, request, &set, &sink, progress.clone());
                log::debug!(
                    "event=volume_trial module=volumes status={} factory={}",
                    if accepted { "ok" } else { "rejected" },
                    factory.name()
                );
                if accepted {
                    winner = Some(set);
                    break;
                }
            }
            discard(&mut scratch, &set);
        }

        let outcome = match winner {
            Some(set) => {
                let committed = commit(&mut scratch, target, &set)?;
                self.colors.assign(
                    target,
                    &committed.display,
                    label_map,
                    Some(&request.file_name),
                );
                set_active_volume(target, &committed.node, label_map);
                Ok(committed)
            }
            None => {
                sink.display_errors();
                Err(IngestError::NoFactoryAccepted {
                    file_name: request.file_name.clone(),
                    errors: sink.errors(),
                })
            }
        };

        scratch.take_remote_io();
        outcome
    }

    fn try_read(
        &self,
        scratch: &mut Scene,
        io: &dyn VolumeIo,
        request: &IngestRequest,
        set: &VolumeNodeSet,
        sink: &Rc<ErrorSink>,
        progress: Option<Rc<dyn StorageObserver>>,
    ) -> bool {
        let error_key = scratch.add_storage_observer(&set.storage, sink.clone());
        let progress_key =
            progress.map(|observer| scratch.add_storage_observer(&set.storage, observer));

        initialize_storage(scratch, &set.storage, request);
        let accepted = match scratch.read_volume_data(&set.node, io) {
            Ok(accepted) => accepted,
            Err(err) => {
                sink.push(err.to_string());
                false
            }
        };

        scratch.remove_storage_observer(error_key);
        if let Some(key) = progress_key {
            scratch.remove_storage_observer(key);
        }
        accepted
    }
}

fn error_kind(err: &IngestError) -> &'static str {
    match err {
        IngestError::InvalidArgument(_) => "invalid_argument",
        IngestError::NoFactoryAccepted { .. } => "no_factory_accepted",
        IngestError::Scene(_) => "scene",
    }
}

/// Points the candidate storage node at the file (and series list), as
/// URIs when the scratch scene classifies the file name as remote.
fn initialize_storage(scratch: &mut Scene, storage_id: &NodeId, request: &IngestRequest) {
    let is_remote = scratch.is_remote_reference(&request.file_name);
    let _ = scratch.modify_node(storage_id, |data| {
        let Some(storage) = data.as_storage_mut() else {
            return false;
        };
        storage.set_reference(&request.file_name, is_remote);
        if let Some(files) = &request.file_list {
            storage.uris.clear();
            storage.file_names.clear();
            for file in files {
                storage.add_reference(file, is_remote);
            }
        }
        true
    });
}

/// Unlinks and removes a rejected candidate.
fn discard(scratch: &mut Scene, set: &VolumeNodeSet) {
    let _ = scratch.modify_node(&set.node, |data| match data.as_volume_mut() {
        Some(volume) => {
            volume.display_node_id = None;
            volume.storage_node_id = None;
            true
        }
        None => false,
    });
    for id in set.members() {
        let _ = scratch.remove_node(id);
    }
}

/// Moves the winning node set into `target`: remove from the scratch scene
/// first, then add, then relink references to the IDs `target` assigned.
fn commit(scratch: &mut Scene, target: &mut Scene, set: &VolumeNodeSet) -> IngestResult<VolumeNodeSet> {
    let display = scratch.remove_node(&set.display)?;
    let storage = scratch.remove_node(&set.storage)?;
    let mut volume = scratch.remove_node(&set.node)?;

    let display_id = target.add_node(display);
    let storage_id = target.add_node(storage);
    let remap = BTreeMap::from([
        (set.display.clone(), display_id.clone()),
        (set.storage.clone(), storage_id.clone()),
    ]);
    volume.data.remap_references(&remap);
    let node_id = target.add_node(volume);

    log::debug!(
        "event=volume_commit module=volumes status=ok volume={node_id} display={display_id} storage={storage_id} scratch_residual={}",
        scratch.node_count()
    );
    Ok(VolumeNodeSet {
        node: node_id,
        display: display_id,
        storage: storage_id,
        label_map: set.label_map,
    })
}

/// Writes the active volume slot of the target's selection entity.
pub fn set_active_volume(scene: &mut Scene, volume_id: &NodeId, label_map: bool) {
    let Some(selection_id) = scene.selection_id() else {
        return;
    };
    let volume_id = volume_id.clone();
    let _ = scene.modify_node(&selection_id, |data| {
        let Some(selection) = data.as_selection_mut() else {
            return false;
        };
        if label_map {
            selection.set_active_label_volume_id(Some(volume_id))
        } else {
            selection.set_active_volume_id(Some(volume_id))
        }
    });
}

#[cfg(test)]
mod tests {
    use super::{ErrorSink, IngestError, IngestRequest};
    use crate::model::storage::{StorageEvent, StorageObserver};

    #[test]
    fn error_sink_collects_only_errors() {
        let sink = ErrorSink::new();
        sink.on_storage_event(&StorageEvent::Progress(0.5));
        assert!(!sink.has_errors());
        sink.on_storage_event(&StorageEvent::Error("bad header".to_string()));
        assert_eq!(sink.errors(), vec!["bad header".to_string()]);
        sink.clear();
        assert!(!sink.has_errors());
    }

    #[test]
    fn request_defaults_name_to_base_name() {
        let request = IngestRequest::new("/data/scans/head.nrrd");
        assert_eq!(request.base_name(), "head.nrrd");
    }

    #[test]
    fn no_factory_error_lists_every_attempt() {
        let err = IngestError::NoFactoryAccepted {
            file_name: "a.nrrd".to_string(),
            errors: vec!["first".to_string(), "second".to_string()],
        };
        let text = err.to_string();
        assert!(text.contains("a.nrrd"));
        assert!(text.contains("first"));
        assert!(text.contains("second"));
    }
}
