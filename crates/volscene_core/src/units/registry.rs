//! Unit registry: unit definitions and the default-unit mapping.
//!
//! # Responsibility
//! - Own a private catalog scene seeded with the built-in units.
//! - On attach, create the application default units in the attached scene
//!   and install them as defaults.
//! - Keep the selection entity's mapping alive across clear/import by
//!   saving it when a batch starts and restoring it when the selection is
//!   modified by someone else or (re)created.
//!
//! # Invariants
//! - The registry is subscribed to the selection entity at most once.
//! - Restores never re-trigger themselves (`RestoreState::Restoring`).
//! - The registry's own writes never trigger a restore
//!   (`RestoreState::Writing`).
//! - Not thread-safe: single writer, re-entrant through scene callbacks.
//!
//! # See also
//! - `default_cache` for the snapshot type.
//! - `catalog` for the unit data.

use crate::model::node::{NodeClass, NodeData, NodeId, SceneNode};
use crate::model::unit::UnitDefinition;
use crate::scene::events::{ObserverKey, SceneEvent, SceneObserver};
use crate::scene::Scene;
use crate::units::catalog::{APPLICATION_DEFAULTS, BUILTIN_UNITS};
use crate::units::default_cache::{DefaultMappingCache, RestoreState};
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Attachment {
    scene: Uuid,
    key: ObserverKey,
}

/// Unit definition registry observing one scene at a time.
pub struct UnitRegistry {
    units_scene: RefCell<Scene>,
    attachment: Cell<Option<Attachment>>,
    cache: RefCell<DefaultMappingCache>,
    state: Cell<RestoreState>,
}

impl UnitRegistry {
    /// Creates a detached registry whose catalog scene holds the built-ins.
    pub fn new() -> Rc<Self> {
        let mut units_scene = Scene::bare();
        Self::initialize_builtins(&mut units_scene);
        Rc::new(Self {
            units_scene: RefCell::new(units_scene),
            attachment: Cell::new(None),
            cache: RefCell::new(DefaultMappingCache::new()),
            state: Cell::new(RestoreState::Idle),
        })
    }

    /// Inserts one unit definition. Unit nodes are singletons tagged by
    /// name, so the ID is `UnitNode<name>`.
    pub fn create_unit(scene: &mut Scene, definition: UnitDefinition) -> NodeId {
        let name = definition.name.clone();
        scene.add_node(
            SceneNode::named(name.clone(), NodeData::Unit(definition)).with_singleton_tag(name),
        )
    }

    /// Registers the unit class and creates the built-in catalog.
    pub fn initialize_builtins(scene: &mut Scene) {
        scene.register_node_class(NodeClass::Unit);
        for unit in BUILTIN_UNITS {
            Self::create_unit(scene, unit.definition());
        }
        log::debug!(
            "event=units_builtins module=units status=ok count={}",
            BUILTIN_UNITS.len()
        );
    }

    /// Private catalog scene.
    pub fn units_scene(&self) -> Ref<'_, Scene> {
        self.units_scene.borrow()
    }

    pub fn is_attached_to(&self, scene: &Scene) -> bool {
        self.attachment
            .get()
            .is_some_and(|attachment| attachment.scene == scene.uuid())
    }

    fn observer_key(&self, scene: &Scene) -> Option<ObserverKey> {
        self.attachment
            .get()
            .filter(|attachment| attachment.scene == scene.uuid())
            .map(|attachment| attachment.key)
    }

    /// Starts observing `scene`: registers the unit class, installs the
    /// application defaults, then listens for batches.
    ///
    /// Attaching to the scene already observed is a no-op. A registry
    /// observes one scene; call `detach` on the previous scene first.
    pub fn attach(self: &Rc<Self>, scene: &mut Scene) {
        if self.is_attached_to(scene) {
            return;
        }
        if self.attachment.get().is_some() {
            log::warn!("event=units_attach module=units status=replaced");
        }
        scene.register_node_class(NodeClass::Unit);
        *self.cache.borrow_mut() = DefaultMappingCache::new();
        let observer: Rc<dyn SceneObserver> = self.clone();
        let key = scene.add_observer(observer);
        self.attachment.set(Some(Attachment {
            scene: scene.uuid(),
            key,
        }));
        self.install_application_defaults(scene);
        log::info!("event=units_attach module=units status=ok scene={}", scene.uuid());
    }

    /// Stops observing `scene`. Returns whether it was attached.
    pub fn detach(&self, scene: &mut Scene) -> bool {
        let Some(key) = self.observer_key(scene) else {
            return false;
        };
        scene.remove_observer(key);
        self.attachment.set(None);
        log::info!("event=units_detach module=units status=ok scene={}", scene.uuid());
        true
    }

    /// Adds a unit to the attached scene. `None` when `scene` is not the
    /// attached one.
    pub fn add_unit(&self, scene: &mut Scene, definition: UnitDefinition) -> Option<NodeId> {
        if !self.is_attached_to(scene) {
            return None;
        }
        Some(Self::create_unit(scene, definition))
    }

    /// Creates the five non-persistent application units and installs each
    /// as its quantity's default.
    pub fn install_application_defaults(&self, scene: &mut Scene) {
        for default in APPLICATION_DEFAULTS {
            let id = Self::create_unit(scene, default.definition());
            if let Some(node) = scene.node_mut(&id) {
                node.persist = false;
            }
            self.set_default_unit(scene, default.quantity, &id);
        }
    }

    /// Installs `unit_id` as the default for `quantity`.
    ///
    /// No-op when the quantity is empty, the registry is not attached to
    /// `scene`, or the scene has no selection entity. Subscribes to the
    /// selection entity once. Outside a restore the pair is also recorded
    /// in the cache, so a later restore keeps it.
    pub fn set_default_unit(&self, scene: &mut Scene, quantity: &str, unit_id: &NodeId) {
        if quantity.is_empty() {
            return;
        }
        let Some(key) = self.observer_key(scene) else {
            return;
        };
        let Some(selection_id) = scene.selection_id() else {
            return;
        };
        let previous = self.state.get();
        if previous == RestoreState::Idle {
            self.state.set(RestoreState::Writing);
        }
        let changed = scene.modify_node(&selection_id, |data| {
            data.as_selection_mut()
                .is_some_and(|selection| selection.set_unit_node_id(quantity, unit_id))
        });
        self.state.set(previous);
        if let Err(err) = changed {
            log::error!("event=units_set_default module=units status=error error={err}");
            return;
        }
        if previous != RestoreState::Restoring {
            self.cache.borrow_mut().insert(quantity, unit_id);
        }
        scene.observe_node(&selection_id, key);
    }

    /// Current default unit of `quantity` in `scene`.
    pub fn default_unit(scene: &Scene, quantity: &str) -> Option<NodeId> {
        scene.selection()?.unit_node_id(quantity).cloned()
    }

    /// Resolves the default unit definition of `quantity` in `scene`.
    pub fn default_unit_definition<'a>(
        scene: &'a Scene,
        quantity: &str,
    ) -> Option<&'a UnitDefinition> {
        let id = Self::default_unit(scene, quantity)?;
        scene.node(&id)?.data.as_unit()
    }

    /// Snapshots the selection entity's mapping.
    pub fn save_default_units(&self, scene: &Scene) {
        let mut cache = self.cache.borrow_mut();
        cache.save(scene.selection());
        log::debug!(
            "event=units_save module=units status=ok quantities={}",
            cache.len()
        );
    }

    /// Replays the snapshot into the selection entity.
    pub fn restore_default_units(&self, scene: &mut Scene) {
        self.state.set(RestoreState::Restoring);
        let cache = self.cache.borrow().clone();
        cache.restore(scene, |scene, quantity, unit_id| {
            self.set_default_unit(scene, quantity, unit_id);
        });
        self.state.set(RestoreState::Idle);
        log::debug!(
            "event=units_restore module=units status=ok quantities={}",
            cache.len()
        );
    }

    pub fn restore_state(&self) -> RestoreState {
        self.state.get()
    }

    /// Copy of the cached mapping.
    pub fn cached_default_units(&self) -> DefaultMappingCache {
        self.cache.borrow().clone()
    }
}

impl SceneObserver for UnitRegistry {
    fn on_scene_event(&self, scene: &mut Scene, event: &SceneEvent) {
        if !self.is_attached_to(scene) {
            return;
        }
        match event {
            SceneEvent::StartBatch => self.save_default_units(scene),
            SceneEvent::NodeAdded(id) => {
                let is_selection = scene
                    .node(id)
                    .is_some_and(|node| node.class() == NodeClass::Selection);
                if !is_selection || self.state.get() != RestoreState::Idle {
                    return;
                }
                if let Some(key) = self.observer_key(scene) {
                    scene.observe_node(id, key);
                }
                log::debug!("event=units_selection_added module=units status=ok node={id}");
                self.restore_default_units(scene);
            }
            SceneEvent::NodeModified(id) => {
                let is_selection = scene
                    .node(id)
                    .is_some_and(|node| node.class() == NodeClass::Selection);
                if is_selection && self.state.get() == RestoreState::Idle {
                    self.restore_default_units(scene);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UnitRegistry;
    use crate::model::node::{NodeClass, NodeId};
    use crate::model::unit::UnitDefinition;
    use crate::scene::Scene;
    use crate::units::default_cache::RestoreState;

    #[test]
    fn catalog_scene_holds_every_builtin() {
        let registry = UnitRegistry::new();
        let scene = registry.units_scene();
        assert_eq!(scene.nodes_by_class(NodeClass::Unit).len(), 23);
        let micrometer = scene
            .node(&NodeId::new("UnitNodeMicrometer"))
            .and_then(|node| node.data.as_unit())
            .expect("micrometer");
        assert_eq!(micrometer.suffix, "µm");
        assert_eq!(micrometer.display_coefficient, 1000.0);
    }

    #[test]
    fn detached_registry_ignores_default_writes() {
        let registry = UnitRegistry::new();
        let mut scene = Scene::new();
        registry.set_default_unit(&mut scene, "length", &NodeId::new("UnitNodeMillimeter"));
        assert!(UnitRegistry::default_unit(&scene, "length").is_none());
        assert!(registry
            .add_unit(&mut scene, UnitDefinition::new("Foot", "length"))
            .is_none());
    }

    #[test]
    fn empty_quantity_is_ignored() {
        let registry = UnitRegistry::new();
        let mut scene = Scene::new();
        registry.attach(&mut scene);
        let before = scene.selection().cloned();
        registry.set_default_unit(&mut scene, "", &NodeId::new("UnitNodeApplicationLength"));
        assert_eq!(scene.selection().cloned(), before);
    }

    #[test]
    fn restore_leaves_registry_idle() {
        let registry = UnitRegistry::new();
        let mut scene = Scene::new();
        registry.attach(&mut scene);
        registry.save_default_units(&scene);
        registry.restore_default_units(&mut scene);
        assert_eq!(registry.restore_state(), RestoreState::Idle);
    }
}
