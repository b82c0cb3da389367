//! Scene graph container.
//!
//! # Responsibility
//! - Own nodes, assign IDs, generate unique names and keep insertion order.
//! - Dispatch scene events to registered observers and node-modification
//!   events to per-node subscribers.
//! - Provide batch-mutation windows, compound modifications, undo
//!   checkpoints and the destructive operations `clear`/`import`.
//!
//! # Invariants
//! - IDs are `<ClassTag><n>`, or `<ClassTag><SingletonTag>` for singletons.
//! - A node subscription is keyed by `(node, observer)`; subscribing twice
//!   is a no-op.
//! - Observers run synchronously and may mutate the scene re-entrantly.
//!   The scene is single-writer and not thread-safe.
//!
//! # See also
//! - `events` for the event bus types.
//! - `remote_io` for the cache/data-transfer pair.

pub mod events;
pub mod remote_io;

use crate::model::node::{NodeClass, NodeData, NodeId, SceneNode};
use crate::model::selection::SelectionEntity;
use crate::model::storage::{StorageEvent, StorageNode, StorageObserver, VolumeIo};
use crate::model::volume::{VolumeDisplayNode, VolumeNode};
use events::{ObserverKey, SceneEvent, SceneObserver};
use remote_io::{local_path, DataTransfer, RemoteIo, TransferStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::rc::Rc;
use uuid::Uuid;

pub type SceneResult<T> = Result<T, SceneError>;

/// Tag of the scene-wide selection singleton.
pub const SELECTION_SINGLETON_TAG: &str = "Singleton";

const SCENE_DOCUMENT_VERSION: u32 = 1;
const UNDO_STACK_LIMIT: usize = 16;

/// Container-level error.
#[derive(Debug)]
pub enum SceneError {
    UnknownNode(NodeId),
    WrongNodeClass {
        id: NodeId,
        expected: &'static str,
        actual: NodeClass,
    },
    UnregisteredClass(NodeClass),
    Serialization(serde_json::Error),
    Storage(String),
}

impl Display for SceneError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownNode(id) => write!(f, "node not found: {id}"),
            Self::WrongNodeClass {
                id,
                expected,
                actual,
            } => write!(f, "node {id} is a {actual}, expected {expected}"),
            Self::UnregisteredClass(class) => write!(f, "node class not registered: {class}"),
            Self::Serialization(err) => write!(f, "scene document error: {err}"),
            Self::Storage(message) => write!(f, "storage error: {message}"),
        }
    }
}

impl Error for SceneError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SceneError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

#[derive(Serialize, Deserialize)]
struct SceneDocument {
    version: u32,
    nodes: Vec<SceneNode>,
}

struct UndoSnapshot {
    nodes: BTreeMap<NodeId, SceneNode>,
    order: Vec<NodeId>,
}

#[derive(Default)]
struct ModifyScope {
    depth: u32,
    pending: bool,
}

struct StorageSubscription {
    storage_id: NodeId,
    key: ObserverKey,
    observer: Rc<dyn StorageObserver>,
}

/// Node container with an event bus.
pub struct Scene {
    uuid: Uuid,
    nodes: BTreeMap<NodeId, SceneNode>,
    order: Vec<NodeId>,
    registered: BTreeSet<NodeClass>,
    counters: BTreeMap<NodeClass, u64>,
    batch_depth: u32,
    undo_stack: Vec<UndoSnapshot>,
    next_observer_key: u64,
    observers: Vec<(ObserverKey, Rc<dyn SceneObserver>)>,
    node_subscriptions: BTreeSet<(NodeId, ObserverKey)>,
    storage_observers: Vec<StorageSubscription>,
    modify_scopes: BTreeMap<NodeId, ModifyScope>,
    remote_io: Option<RemoteIo>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Application scene: every node class registered plus the selection
    /// singleton.
    pub fn new() -> Self {
        let mut scene = Self::bare();
        for class in NodeClass::ALL {
            scene.register_node_class(class);
        }
        scene.add_node(
            SceneNode::new(NodeData::Selection(SelectionEntity::default()))
                .with_singleton_tag(SELECTION_SINGLETON_TAG),
        );
        scene
    }

    /// Empty scene with no registered classes and no selection entity.
    pub fn bare() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            nodes: BTreeMap::new(),
            order: Vec::new(),
            registered: BTreeSet::new(),
            counters: BTreeMap::new(),
            batch_depth: 0,
            undo_stack: Vec::new(),
            next_observer_key: 1,
            observers: Vec::new(),
            node_subscriptions: BTreeSet::new(),
            storage_observers: Vec::new(),
            modify_scopes: BTreeMap::new(),
            remote_io: None,
        }
    }

    /// Process-unique identity of this scene instance.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    // ---- class registry -------------------------------------------------

    /// Returns whether the class was newly registered.
    pub fn register_node_class(&mut self, class: NodeClass) -> bool {
        self.registered.insert(class)
    }

    pub fn is_registered(&self, class: NodeClass) -> bool {
        self.registered.contains(&class)
    }

    /// Builds an unattached node with the default payload of `class`.
    pub fn create_node_by_class(&self, class: NodeClass) -> SceneResult<SceneNode> {
        if !self.is_registered(class) {
            return Err(SceneError::UnregisteredClass(class));
        }
        Ok(SceneNode::new(NodeData::default_for(class)))
    }

    // ---- node collection ------------------------------------------------

    /// Adds a node and returns its ID.
    ///
    /// A singleton whose ID is already taken is merged into the existing
    /// node instead.
    pub fn add_node(&mut self, node: SceneNode) -> NodeId {
        self.insert_node(node, false)
    }

    fn insert_node(&mut self, mut node: SceneNode, keep_id: bool) -> NodeId {
        let class = node.class();
        if let Some(tag) = node.singleton_tag.as_deref() {
            let id = NodeId::new(format!("{}{}", class.tag(), tag));
            if self.nodes.contains_key(&id) {
                self.merge_singleton(&id, node);
                return id;
            }
            node.id = id;
        } else if !(keep_id && node.id.is_assigned() && !self.nodes.contains_key(&node.id)) {
            node.id = self.next_id(class);
        }

        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        self.order.push(id.clone());
        self.emit(SceneEvent::NodeAdded(id.clone()));
        id
    }

    fn next_id(&mut self, class: NodeClass) -> NodeId {
        let counter = self.counters.entry(class).or_insert(0);
        loop {
            *counter += 1;
            let candidate = NodeId::new(format!("{}{}", class.tag(), counter));
            if !self.nodes.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn merge_singleton(&mut self, id: &NodeId, incoming: SceneNode) {
        let SceneNode {
            name,
            persist,
            attributes,
            data,
            ..
        } = incoming;
        if let Some(existing) = self.nodes.get_mut(id) {
            if name.is_some() {
                existing.name = name;
            }
            existing.persist = persist;
            existing.attributes.extend(attributes);
        }
        let _ = self.modify_node(id, |current| {
            if *current == data {
                return false;
            }
            *current = data;
            true
        });
    }

    /// Removes a node and every subscription that targets it.
    pub fn remove_node(&mut self, id: &NodeId) -> SceneResult<SceneNode> {
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| SceneError::UnknownNode(id.clone()))?;
        self.order.retain(|existing| existing != id);
        self.node_subscriptions
            .retain(|(node_id, _)| node_id != id);
        self.storage_observers
            .retain(|subscription| &subscription.storage_id != id);
        self.modify_scopes.remove(id);
        self.emit(SceneEvent::NodeRemoved(id.clone()));
        Ok(node)
    }

    pub fn node(&self, id: &NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    /// Direct access; emits nothing. Pair with `notify_modified` when
    /// observers must learn about the change.
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node IDs in insertion order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node IDs of one class in insertion order.
    pub fn nodes_by_class(&self, class: NodeClass) -> Vec<NodeId> {
        self.order
            .iter()
            .filter(|id| {
                self.nodes
                    .get(*id)
                    .is_some_and(|node| node.class() == class)
            })
            .cloned()
            .collect()
    }

    /// Volume node IDs of every volume class in insertion order.
    pub fn volume_ids(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .filter(|id| {
                self.nodes
                    .get(*id)
                    .is_some_and(|node| node.class().is_volume())
            })
            .cloned()
            .collect()
    }

    /// First selection entity, if any.
    pub fn selection_id(&self) -> Option<NodeId> {
        self.nodes_by_class(NodeClass::Selection).into_iter().next()
    }

    pub fn selection(&self) -> Option<&SelectionEntity> {
        let id = self.selection_id()?;
        self.nodes.get(&id)?.data.as_selection()
    }

    /// Returns `base` if unused as a node name, otherwise `base_<n>`.
    pub fn unique_name(&self, base: &str) -> String {
        let taken = |candidate: &str| {
            self.nodes
                .values()
                .any(|node| node.name() == Some(candidate))
        };
        if !taken(base) {
            return base.to_string();
        }
        (1u64..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    pub fn volume(&self, id: &NodeId) -> SceneResult<&VolumeNode> {
        let node = self.require(id)?;
        node.data
            .as_volume()
            .ok_or_else(|| wrong_class(id, "volume", node.class()))
    }

    pub fn volume_mut(&mut self, id: &NodeId) -> SceneResult<&mut VolumeNode> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| SceneError::UnknownNode(id.clone()))?;
        let class = node.class();
        node.data
            .as_volume_mut()
            .ok_or_else(|| wrong_class(id, "volume", class))
    }

    pub fn display(&self, id: &NodeId) -> SceneResult<&VolumeDisplayNode> {
        let node = self.require(id)?;
        node.data
            .as_display()
            .ok_or_else(|| wrong_class(id, "volume display", node.class()))
    }

    pub fn storage(&self, id: &NodeId) -> SceneResult<&StorageNode> {
        let node = self.require(id)?;
        node.data
            .as_storage()
            .ok_or_else(|| wrong_class(id, "storage", node.class()))
    }

    fn require(&self, id: &NodeId) -> SceneResult<&SceneNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| SceneError::UnknownNode(id.clone()))
    }

    // ---- modification ---------------------------------------------------

    /// Mutates one payload. `f` reports whether it changed anything;
    /// `NodeModified` is emitted only then.
    pub fn modify_node<F>(&mut self, id: &NodeId, f: F) -> SceneResult<bool>
    where
        F: FnOnce(&mut NodeData) -> bool,
    {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| SceneError::UnknownNode(id.clone()))?;
        let changed = f(&mut node.data);
        if changed {
            self.notify_modified(id);
        }
        Ok(changed)
    }

    /// Emits `NodeModified`, or defers it while a compound modification of
    /// the node is open.
    pub fn notify_modified(&mut self, id: &NodeId) {
        if let Some(scope) = self.modify_scopes.get_mut(id) {
            scope.pending = true;
            return;
        }
        self.emit(SceneEvent::NodeModified(id.clone()));
    }

    /// Opens a compound modification of one node. Nested scopes are
    /// counted.
    pub fn start_modify(&mut self, id: &NodeId) -> bool {
        if !self.nodes.contains_key(id) {
            return false;
        }
        self.modify_scopes.entry(id.clone()).or_default().depth += 1;
        true
    }

    /// Closes a compound modification; the outermost close emits one
    /// `NodeModified` if anything changed inside.
    pub fn end_modify(&mut self, id: &NodeId) -> bool {
        let Some(scope) = self.modify_scopes.get_mut(id) else {
            return false;
        };
        scope.depth = scope.depth.saturating_sub(1);
        if scope.depth > 0 {
            return true;
        }
        let pending = scope.pending;
        self.modify_scopes.remove(id);
        if pending && self.nodes.contains_key(id) {
            self.emit(SceneEvent::NodeModified(id.clone()));
        }
        true
    }

    // ---- batch and undo -------------------------------------------------

    pub fn start_batch(&mut self) {
        self.batch_depth += 1;
        if self.batch_depth == 1 {
            self.emit(SceneEvent::StartBatch);
        }
    }

    pub fn end_batch(&mut self) {
        if self.batch_depth == 0 {
            return;
        }
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.emit(SceneEvent::EndBatch);
        }
    }

    pub fn is_batch_processing(&self) -> bool {
        self.batch_depth > 0
    }

    /// Records an undo checkpoint of every node.
    pub fn save_state_for_undo(&mut self) {
        if self.undo_stack.len() == UNDO_STACK_LIMIT {
            self.undo_stack.remove(0);
        }
        self.undo_stack.push(UndoSnapshot {
            nodes: self.nodes.clone(),
            order: self.order.clone(),
        });
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    /// Restores the latest checkpoint. Returns `false` when none exists.
    pub fn undo(&mut self) -> bool {
        let Some(snapshot) = self.undo_stack.pop() else {
            return false;
        };
        self.start_batch();
        self.nodes = snapshot.nodes;
        self.order = snapshot.order;
        let nodes = &self.nodes;
        self.node_subscriptions
            .retain(|(node_id, _)| nodes.contains_key(node_id));
        self.storage_observers
            .retain(|subscription| nodes.contains_key(&subscription.storage_id));
        self.modify_scopes.clear();
        self.end_batch();
        true
    }

    // ---- observers ------------------------------------------------------

    fn next_key(&mut self) -> ObserverKey {
        let key = ObserverKey(self.next_observer_key);
        self.next_observer_key += 1;
        key
    }

    /// Registers a scene observer.
    pub fn add_observer(&mut self, observer: Rc<dyn SceneObserver>) -> ObserverKey {
        let key = self.next_key();
        self.observers.push((key, observer));
        key
    }

    /// Unregisters an observer and drops its node subscriptions.
    pub fn remove_observer(&mut self, key: ObserverKey) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != key);
        self.node_subscriptions
            .retain(|(_, subscriber)| *subscriber != key);
        before != self.observers.len()
    }

    pub fn has_observer(&self, key: ObserverKey) -> bool {
        self.observers.iter().any(|(existing, _)| *existing == key)
    }

    /// Subscribes an observer to `NodeModified` of one node.
    ///
    /// Returns `true` only when a new subscription was created.
    pub fn observe_node(&mut self, id: &NodeId, key: ObserverKey) -> bool {
        if !self.nodes.contains_key(id) || !self.has_observer(key) {
            return false;
        }
        self.node_subscriptions.insert((id.clone(), key))
    }

    pub fn unobserve_node(&mut self, id: &NodeId, key: ObserverKey) -> bool {
        self.node_subscriptions.remove(&(id.clone(), key))
    }

    pub fn is_observing_node(&self, id: &NodeId, key: ObserverKey) -> bool {
        self.node_subscriptions.contains(&(id.clone(), key))
    }

    fn emit(&mut self, event: SceneEvent) {
        let targets: Vec<Rc<dyn SceneObserver>> = match &event {
            SceneEvent::NodeModified(id) => self
                .observers
                .iter()
                .filter(|(key, _)| self.node_subscriptions.contains(&(id.clone(), *key)))
                .map(|(_, observer)| Rc::clone(observer))
                .collect(),
            _ => self
                .observers
                .iter()
                .map(|(_, observer)| Rc::clone(observer))
                .collect(),
        };
        for observer in targets {
            observer.on_scene_event(self, &event);
        }
    }

    // ---- destructive operations -----------------------------------------

    /// Removes every non-singleton node and resets singleton payloads.
    pub fn clear(&mut self) {
        self.start_batch();
        let removable: Vec<NodeId> = self
            .order
            .iter()
            .filter(|id| self.nodes.get(*id).is_some_and(|node| !node.is_singleton()))
            .cloned()
            .collect();
        for id in &removable {
            let _ = self.remove_node(id);
        }
        let singletons: Vec<NodeId> = self.order.clone();
        for id in &singletons {
            let _ = self.modify_node(id, NodeData::reset);
        }
        self.undo_stack.clear();
        self.end_batch();
        log::debug!(
            "event=scene_clear module=scene status=ok removed={} kept={}",
            removable.len(),
            singletons.len()
        );
    }

    /// Serializes every persistent node into a JSON scene document.
    pub fn commit(&self) -> SceneResult<String> {
        let nodes: Vec<SceneNode> = self
            .order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|node| node.persist)
            .cloned()
            .collect();
        let count = nodes.len();
        let document = SceneDocument {
            version: SCENE_DOCUMENT_VERSION,
            nodes,
        };
        let json = serde_json::to_string(&document)?;
        log::debug!("event=scene_commit module=scene status=ok nodes={count}");
        Ok(json)
    }

    /// Adds the nodes of a scene document inside one batch window.
    ///
    /// Nodes of unregistered classes are skipped. Singletons merge into
    /// existing ones. Document IDs are kept when free; references are
    /// relinked to the IDs actually assigned.
    pub fn import(&mut self, document: &str) -> SceneResult<Vec<NodeId>> {
        let document: SceneDocument = serde_json::from_str(document)?;
        self.start_batch();
        let mut remap = BTreeMap::new();
        let mut imported = Vec::new();
        let mut skipped = 0usize;
        for node in document.nodes {
            let class = node.class();
            if !self.is_registered(class) {
                skipped += 1;
                log::warn!(
                    "event=scene_import module=scene status=skipped class={}",
                    class.tag()
                );
                continue;
            }
            let original = node.id.clone();
            let id = self.insert_node(node, true);
            if original.is_assigned() && original != id {
                remap.insert(original, id.clone());
            }
            imported.push(id);
        }
        if !remap.is_empty() {
            for id in &imported {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.data.remap_references(&remap);
                }
            }
        }
        self.end_batch();
        log::debug!(
            "event=scene_import module=scene status=ok imported={} skipped={skipped}",
            imported.len()
        );
        Ok(imported)
    }

    // ---- remote IO and storage -----------------------------------------

    pub fn remote_io(&self) -> Option<&RemoteIo> {
        self.remote_io.as_ref()
    }

    pub fn remote_io_mut(&mut self) -> Option<&mut RemoteIo> {
        self.remote_io.as_mut()
    }

    pub fn set_remote_io(&mut self, remote_io: RemoteIo) {
        self.remote_io = Some(remote_io);
    }

    /// Detaches the remote IO pair.
    pub fn take_remote_io(&mut self) -> Option<RemoteIo> {
        self.remote_io.take()
    }

    /// Classifies a reference with this scene's cache manager; without a
    /// remote IO pair every reference is local.
    pub fn is_remote_reference(&self, reference: &str) -> bool {
        self.remote_io
            .as_ref()
            .is_some_and(|remote| remote.cache.is_remote_reference(reference))
    }

    /// Attaches a storage observer to one storage node.
    pub fn add_storage_observer(
        &mut self,
        storage_id: &NodeId,
        observer: Rc<dyn StorageObserver>,
    ) -> ObserverKey {
        let key = self.next_key();
        self.storage_observers.push(StorageSubscription {
            storage_id: storage_id.clone(),
            key,
            observer,
        });
        key
    }

    pub fn remove_storage_observer(&mut self, key: ObserverKey) -> bool {
        let before = self.storage_observers.len();
        self.storage_observers
            .retain(|subscription| subscription.key != key);
        before != self.storage_observers.len()
    }

    fn storage_observers_of(&self, storage_id: &NodeId) -> Vec<Rc<dyn StorageObserver>> {
        self.storage_observers
            .iter()
            .filter(|subscription| &subscription.storage_id == storage_id)
            .map(|subscription| Rc::clone(&subscription.observer))
            .collect()
    }

    fn volume_storage(&self, volume_id: &NodeId) -> SceneResult<(NodeId, StorageNode)> {
        let storage_id = self
            .volume(volume_id)?
            .storage_node_id
            .clone()
            .ok_or_else(|| SceneError::Storage(format!("volume {volume_id} has no storage node")))?;
        let storage = self.storage(&storage_id)?.clone();
        Ok((storage_id, storage))
    }

    /// Reads the volume's data through its storage node.
    ///
    /// Returns the read outcome; progress and errors go to the storage
    /// node's observers.
    pub fn read_volume_data(&mut self, volume_id: &NodeId, io: &dyn VolumeIo) -> SceneResult<bool> {
        let kind = self.volume(volume_id)?.kind;
        let (storage_id, storage) = self.volume_storage(volume_id)?;
        let observers = self.storage_observers_of(&storage_id);

        let remote = self.remote_io.as_ref();
        let resolve = |reference: &str| -> Result<PathBuf, String> {
            match remote {
                Some(remote) => remote.resolve(reference),
                None => resolve_local_only(reference),
            }
        };
        let mut sink = |event: StorageEvent| {
            for observer in &observers {
                observer.on_storage_event(&event);
            }
        };
        let result = storage.read_data(io, kind, &resolve, &mut sink);
        self.record_remote_reads(&storage);

        match result {
            Ok(loaded) => {
                let mut attributes = BTreeMap::new();
                self.modify_node(volume_id, |data| match data.as_volume_mut() {
                    Some(volume) => {
                        attributes = loaded.apply_to(volume);
                        true
                    }
                    None => false,
                })?;
                if let Some(node) = self.nodes.get_mut(volume_id) {
                    node.attributes.extend(attributes);
                }
                log::debug!(
                    "event=storage_read module=scene status=ok codec={} volume={volume_id}",
                    io.name()
                );
                Ok(true)
            }
            Err(message) => {
                log::debug!(
                    "event=storage_read module=scene status=error codec={} volume={volume_id} error={message}",
                    io.name()
                );
                Ok(false)
            }
        }
    }

    fn record_remote_reads(&mut self, storage: &StorageNode) {
        let Some(remote) = self.remote_io.as_mut() else {
            return;
        };
        let references: Vec<String> = storage
            .primary_reference()
            .into_iter()
            .chain(storage.extra_references())
            .filter(|reference| remote.cache.is_remote_reference(reference))
            .map(str::to_string)
            .collect();
        for uri in references {
            let local_path = remote.cache.cached_path(&uri);
            let status = if local_path.as_ref().is_some_and(|path| path.is_file()) {
                TransferStatus::Cached
            } else {
                TransferStatus::Missing
            };
            remote.data_io.record_transfer(DataTransfer {
                uri,
                local_path,
                status,
            });
        }
    }

    /// Writes the volume's data through its storage node.
    pub fn write_volume_data(&mut self, volume_id: &NodeId, io: &dyn VolumeIo) -> SceneResult<()> {
        let (storage_id, storage) = self.volume_storage(volume_id)?;
        let volume = self.volume(volume_id)?;
        let attributes = &self.require(volume_id)?.attributes;
        let remote = self.remote_io.as_ref();
        let resolve = |reference: &str| -> Result<PathBuf, String> {
            match remote {
                Some(remote) => remote.resolve_for_write(reference),
                None => resolve_local_only(reference),
            }
        };
        let result = storage.write_data(io, volume, attributes, &resolve);

        let remote_uri = storage
            .primary_reference()
            .filter(|reference| self.is_remote_reference(reference))
            .map(str::to_string);
        if let Some(uri) = remote_uri {
            if let Some(remote) = self.remote_io.as_mut() {
                let local_path = remote.cache.cached_path(&uri);
                remote.data_io.record_transfer(DataTransfer {
                    uri,
                    local_path,
                    status: TransferStatus::Staged,
                });
            }
        }

        result.map_err(|message| {
            let event = StorageEvent::Error(message.clone());
            for observer in self.storage_observers_of(&storage_id) {
                observer.on_storage_event(&event);
            }
            SceneError::Storage(message)
        })
    }
}

fn wrong_class(id: &NodeId, expected: &'static str, actual: NodeClass) -> SceneError {
    SceneError::WrongNodeClass {
        id: id.clone(),
        expected,
        actual,
    }
}

fn resolve_local_only(reference: &str) -> Result<PathBuf, String> {
    if remote_io::CacheManager::new().is_remote_reference(reference) {
        return Err(format!("scene has no remote IO to fetch {reference}"));
    }
    Ok(local_path(reference))
}

#[cfg(test)]
mod tests {
    use super::events::{SceneEvent, SceneObserver};
    use super::{Scene, SceneError};
    use crate::model::node::{NodeClass, NodeData, NodeId, SceneNode};
    use crate::model::unit::UnitDefinition;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<SceneEvent>>,
    }

    impl SceneObserver for Recorder {
        fn on_scene_event(&self, _scene: &mut Scene, event: &SceneEvent) {
            self.events.borrow_mut().push(event.clone());
        }
    }

    fn unit_node(name: &str, quantity: &str) -> SceneNode {
        SceneNode::named(name, NodeData::Unit(UnitDefinition::new(name, quantity)))
            .with_singleton_tag(name)
    }

    #[test]
    fn assigns_class_prefixed_ids() {
        let mut scene = Scene::new();
        let first = scene.add_node(SceneNode::new(NodeData::default_for(NodeClass::ScalarVolume)));
        let second = scene.add_node(SceneNode::new(NodeData::default_for(NodeClass::ScalarVolume)));
        assert_eq!(first.as_str(), "ScalarVolumeNode1");
        assert_eq!(second.as_str(), "ScalarVolumeNode2");
        assert_eq!(
            scene.selection_id(),
            Some(NodeId::new("SelectionNodeSingleton"))
        );
    }

    #[test]
    fn singleton_add_merges_into_existing_node() {
        let mut scene = Scene::new();
        let id = scene.add_node(unit_node("Millimeter", "length"));
        let again = scene.add_node(unit_node("Millimeter", "length"));
        assert_eq!(id, again);
        assert_eq!(id.as_str(), "UnitNodeMillimeter");
        assert_eq!(scene.nodes_by_class(NodeClass::Unit).len(), 1);
    }

    #[test]
    fn nested_batches_emit_once() {
        let mut scene = Scene::new();
        let recorder = Rc::new(Recorder::default());
        scene.add_observer(recorder.clone());
        scene.start_batch();
        scene.start_batch();
        scene.end_batch();
        assert!(scene.is_batch_processing());
        scene.end_batch();
        scene.end_batch();
        assert_eq!(
            *recorder.events.borrow(),
            vec![SceneEvent::StartBatch, SceneEvent::EndBatch]
        );
    }

    #[test]
    fn observe_node_is_idempotent_and_compound_modify_coalesces() {
        let mut scene = Scene::new();
        let recorder = Rc::new(Recorder::default());
        let key = scene.add_observer(recorder.clone());
        let selection = scene.selection_id().expect("selection");
        assert!(scene.observe_node(&selection, key));
        assert!(!scene.observe_node(&selection, key));

        scene.start_modify(&selection);
        for quantity in ["length", "time", "frequency"] {
            scene
                .modify_node(&selection, |data| {
                    data.as_selection_mut()
                        .expect("selection payload")
                        .set_unit_node_id(quantity, &NodeId::new("UnitNodeX"))
                })
                .expect("modify selection");
        }
        assert!(recorder.events.borrow().is_empty());
        scene.end_modify(&selection);
        assert_eq!(
            *recorder.events.borrow(),
            vec![SceneEvent::NodeModified(selection.clone())]
        );
    }

    #[test]
    fn clear_keeps_singletons_and_resets_selection() {
        let mut scene = Scene::new();
        let unit = scene.add_node(unit_node("Second", "time"));
        let selection = scene.selection_id().expect("selection");
        scene
            .modify_node(&selection, |data| {
                data.as_selection_mut()
                    .expect("selection payload")
                    .set_unit_node_id("time", &unit)
            })
            .expect("modify selection");
        scene.add_node(SceneNode::new(NodeData::default_for(NodeClass::ScalarVolume)));

        scene.clear();
        assert!(scene.contains(&unit));
        assert!(scene.nodes_by_class(NodeClass::ScalarVolume).is_empty());
        assert!(scene
            .selection()
            .expect("selection")
            .unit_node_id("time")
            .is_none());
    }

    #[test]
    fn import_skips_unregistered_classes_and_keeps_free_ids() {
        let mut source = Scene::new();
        let volume = source.add_node(SceneNode::named(
            "vol",
            NodeData::default_for(NodeClass::ScalarVolume),
        ));
        source.add_node(unit_node("Meter", "length"));
        let document = source.commit().expect("commit");

        let mut target = Scene::bare();
        target.register_node_class(NodeClass::ScalarVolume);
        let imported = target.import(&document).expect("import");
        assert_eq!(imported, vec![volume]);
        assert_eq!(target.node_count(), 1);
    }

    #[test]
    fn non_persistent_nodes_are_not_committed() {
        let mut scene = Scene::new();
        let mut node = unit_node("ApplicationTime", "time");
        node.persist = false;
        scene.add_node(node);
        let json: serde_json::Value =
            serde_json::from_str(&scene.commit().expect("commit")).expect("valid json");
        let nodes = json["nodes"].as_array().expect("nodes array");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0]["id"], "SelectionNodeSingleton");
    }

    #[test]
    fn unique_name_appends_counter() {
        let mut scene = Scene::new();
        scene.add_node(SceneNode::named(
            "brain",
            NodeData::default_for(NodeClass::ScalarVolume),
        ));
        assert_eq!(scene.unique_name("brain"), "brain_1");
        assert_eq!(scene.unique_name("head"), "head");
    }

    #[test]
    fn undo_restores_checkpoint() {
        let mut scene = Scene::new();
        scene.save_state_for_undo();
        let id = scene.add_node(SceneNode::new(NodeData::default_for(NodeClass::ScalarVolume)));
        assert!(scene.undo());
        assert!(!scene.contains(&id));
        assert!(!scene.undo());
    }

    #[test]
    fn remove_unknown_node_fails() {
        let mut scene = Scene::new();
        let err = scene
            .remove_node(&NodeId::new("ScalarVolumeNode9"))
            .expect_err("unknown node");
        assert!(matches!(err, SceneError::UnknownNode(_)));
    }
}
