use std::fmt;
use std::sync::Arc;

use super::sidecar::{NavigationSnapshot, Sidecar, SidecarKind, SnapshotSource};
use super::state::{EntityState, PropertyFlag, StateData, StateManagerId};
use super::state_manager::StateManager;
use crate::core::{Result, Value};
use crate::keys::{KeyValue, KeyValueFactory};
use crate::metadata::{ChangeTrackingStrategy, EntityType};
use crate::object::{ObjectId, ObjectRef, WeakObjectRef};

/// Stable handle to an entry, scoped to the state manager that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId {
    manager: StateManagerId,
    index: u64,
}

impl EntryId {
    pub(crate) fn new(manager: StateManagerId, index: u64) -> Self {
        Self { manager, index }
    }

    pub fn manager(&self) -> StateManagerId {
        self.manager
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.manager, self.index)
    }
}

/// Where an entry keeps its property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// No object; every value lives in the entry.
    Shadow,
    /// Every value lives on the object.
    Materialized,
    /// An object plus shadow properties stored in the entry.
    Mixed,
}

/// Tracked entries hold their object strongly; untracked ones only weakly.
#[derive(Debug, Clone)]
pub(crate) enum EntryObject {
    None,
    Strong(ObjectRef),
    Weak(WeakObjectRef),
}

fn read_stored(
    entity_type: &EntityType,
    values: &[Value],
    object: Option<&ObjectRef>,
    property: usize,
) -> Value {
    let prop = entity_type.property_at(property);
    match object {
        Some(object) if !prop.is_shadow() => prop.accessor().get(object),
        _ => values.get(property).cloned().unwrap_or(Value::Null),
    }
}

fn read_navigation(
    entity_type: &EntityType,
    object: Option<&ObjectRef>,
    navigation: usize,
) -> NavigationSnapshot {
    let collection = entity_type.navigation_at(navigation).is_collection();
    match (object, collection) {
        (Some(object), true) => NavigationSnapshot::Collection(object.navigation_collection(navigation)),
        (Some(object), false) => NavigationSnapshot::Reference(object.navigation_reference(navigation)),
        (None, true) => NavigationSnapshot::Collection(Vec::new()),
        (None, false) => NavigationSnapshot::Reference(None),
    }
}

struct StoredValues<'a> {
    entity_type: &'a EntityType,
    values: &'a [Value],
    object: Option<ObjectRef>,
}

impl SnapshotSource for StoredValues<'_> {
    fn entity_type(&self) -> &EntityType {
        self.entity_type
    }

    fn snapshot_value(&self, property: usize) -> Value {
        read_stored(self.entity_type, self.values, self.object.as_ref(), property)
    }

    fn snapshot_navigation(&self, navigation: usize) -> NavigationSnapshot {
        read_navigation(self.entity_type, self.object.as_ref(), navigation)
    }
}

/// The tracked record for one logical object.
#[derive(Debug)]
pub struct InternalEntityEntry {
    pub(crate) id: EntryId,
    pub(crate) entity_type: Arc<EntityType>,
    pub(crate) object: EntryObject,
    pub(crate) object_id: Option<ObjectId>,
    pub(crate) values: Vec<Value>,
    pub(crate) state: EntityState,
    pub(crate) state_data: StateData,
    pub(crate) sidecars: Vec<Sidecar>,
    /// Key values this entry is currently registered under, one per key.
    pub(crate) indexed_keys: Vec<KeyValue>,
}

impl InternalEntityEntry {
    pub(crate) fn materialized(id: EntryId, entity_type: Arc<EntityType>, object: &ObjectRef) -> Self {
        let values = entity_type
            .properties()
            .iter()
            .map(|p| p.default_value())
            .collect();
        let property_count = entity_type.properties().len();
        Self {
            id,
            entity_type,
            object: EntryObject::Weak(object.downgrade()),
            object_id: Some(object.id()),
            values,
            state: EntityState::Detached,
            state_data: StateData::new(property_count),
            sidecars: Vec::new(),
            indexed_keys: Vec::new(),
        }
    }

    pub(crate) fn shadow(id: EntryId, entity_type: Arc<EntityType>, values: Vec<Value>) -> Self {
        let property_count = entity_type.properties().len();
        Self {
            id,
            entity_type,
            object: EntryObject::None,
            object_id: None,
            values,
            state: EntityState::Detached,
            state_data: StateData::new(property_count),
            sidecars: Vec::new(),
            indexed_keys: Vec::new(),
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn kind(&self) -> EntryKind {
        match self.object {
            EntryObject::None => EntryKind::Shadow,
            _ if self.entity_type.has_shadow_properties() => EntryKind::Mixed,
            _ => EntryKind::Materialized,
        }
    }

    pub fn object(&self) -> Option<ObjectRef> {
        match &self.object {
            EntryObject::None => None,
            EntryObject::Strong(object) => Some(object.clone()),
            EntryObject::Weak(object) => object.upgrade(),
        }
    }

    pub(crate) fn is_object_alive(&self) -> bool {
        match &self.object {
            EntryObject::None | EntryObject::Strong(_) => true,
            EntryObject::Weak(object) => object.is_alive(),
        }
    }

    pub(crate) fn retain_object(&mut self) {
        if let EntryObject::Weak(weak) = &self.object
            && let Some(object) = weak.upgrade()
        {
            self.object = EntryObject::Strong(object);
        }
    }

    pub(crate) fn release_object(&mut self) -> Option<WeakObjectRef> {
        if let EntryObject::Strong(object) = &self.object {
            let weak = object.downgrade();
            self.object = EntryObject::Weak(weak.clone());
            return Some(weak);
        }
        None
    }

    /// Main storage, bypassing sidecars.
    pub(crate) fn read_stored(&self, property: usize) -> Value {
        read_stored(&self.entity_type, &self.values, self.object().as_ref(), property)
    }

    pub(crate) fn write_stored(&mut self, property: usize, value: Value) {
        let entity_type = self.entity_type.clone();
        let prop = entity_type.property_at(property);
        match self.object() {
            Some(object) if !prop.is_shadow() => prop.accessor().set(&object, value),
            _ => {
                if let Some(slot) = self.values.get_mut(property) {
                    *slot = value;
                }
            }
        }
    }

    pub fn current_value(&self, property: usize) -> Value {
        for sidecar in &self.sidecars {
            if sidecar.kind().transparent_read()
                && let Some(value) = sidecar.get(property)
            {
                return value.clone();
            }
        }
        self.read_stored(property)
    }

    /// Ordinary write path: redirected into a transparent sidecar when one covers the property.
    pub(crate) fn write_value(&mut self, property: usize, value: Value) -> Result<()> {
        let entity_type = self.entity_type.clone();
        let prop = entity_type.property_at(property);
        if let Some(sidecar) = self
            .sidecars
            .iter_mut()
            .find(|s| s.kind().transparent_write() && s.can_store_value(prop))
        {
            return sidecar.set(prop, value);
        }
        self.write_stored(property, value);
        Ok(())
    }

    pub fn current_navigation(&self, navigation: usize) -> NavigationSnapshot {
        read_navigation(&self.entity_type, self.object().as_ref(), navigation)
    }

    pub fn is_flagged(&self, property: usize, flag: PropertyFlag) -> bool {
        self.state_data.is_flagged(property, flag)
    }

    pub fn is_modified(&self, property: usize) -> bool {
        self.state == EntityState::Modified && self.state_data.is_flagged(property, PropertyFlag::Modified)
    }

    pub fn is_temporary(&self, property: usize) -> bool {
        self.state_data.is_flagged(property, PropertyFlag::Temporary)
    }

    pub fn has_temporary_values(&self) -> bool {
        self.state_data.any_flagged(PropertyFlag::Temporary)
    }

    pub fn uses_snapshot_tracking(&self) -> bool {
        self.entity_type.change_tracking() == ChangeTrackingStrategy::Snapshot
    }

    pub fn sidecar(&self, kind: SidecarKind) -> Option<&Sidecar> {
        self.sidecars.iter().find(|s| s.kind() == kind)
    }

    pub(crate) fn sidecar_mut(&mut self, kind: SidecarKind) -> Option<&mut Sidecar> {
        self.sidecars.iter_mut().find(|s| s.kind() == kind)
    }

    /// Attaches a sidecar of `kind`, returning the existing one if already attached.
    pub(crate) fn add_sidecar(&mut self, kind: SidecarKind) -> &mut Sidecar {
        let position = match self.sidecars.iter().position(|s| s.kind() == kind) {
            Some(position) => position,
            None => {
                self.sidecars.push(Sidecar::new(kind));
                self.sidecars.len() - 1
            }
        };
        &mut self.sidecars[position]
    }

    /// Detaches the sidecar, discarding its values.
    pub(crate) fn rollback_sidecar(&mut self, kind: SidecarKind) -> bool {
        let before = self.sidecars.len();
        self.sidecars.retain(|s| s.kind() != kind);
        self.sidecars.len() != before
    }

    /// Detaches the sidecar and writes its values into main storage.
    pub(crate) fn commit_sidecar(&mut self, kind: SidecarKind) {
        if let Some(position) = self.sidecars.iter().position(|s| s.kind() == kind) {
            let sidecar = self.sidecars.remove(position);
            let mut values: Vec<(usize, Value)> = sidecar.into_values().into_iter().collect();
            values.sort_by_key(|(property, _)| *property);
            for (property, value) in values {
                self.write_stored(property, value);
            }
        }
    }

    pub(crate) fn take_snapshot(&mut self, kind: SidecarKind) {
        let object = self.object();
        let source = StoredValues {
            entity_type: &self.entity_type,
            values: &self.values,
            object,
        };
        let position = match self.sidecars.iter().position(|s| s.kind() == kind) {
            Some(position) => position,
            None => {
                self.sidecars.push(Sidecar::new(kind));
                self.sidecars.len() - 1
            }
        };
        self.sidecars[position].take_snapshot(&source);
    }

    pub(crate) fn ensure_snapshot(&mut self, kind: SidecarKind, property: usize) {
        let object = self.object();
        let source = StoredValues {
            entity_type: &self.entity_type,
            values: &self.values,
            object,
        };
        let position = match self.sidecars.iter().position(|s| s.kind() == kind) {
            Some(position) => position,
            None => {
                self.sidecars.push(Sidecar::new(kind));
                self.sidecars.len() - 1
            }
        };
        self.sidecars[position].ensure_snapshot(&source, property);
    }

    pub(crate) fn update_snapshot(&mut self, kind: SidecarKind) {
        let object = self.object();
        let source = StoredValues {
            entity_type: &self.entity_type,
            values: &self.values,
            object,
        };
        if let Some(sidecar) = self.sidecars.iter_mut().find(|s| s.kind() == kind) {
            sidecar.update_snapshot(&source);
        }
    }

    /// Seeds the baselines of an entry that just started being tracked.
    pub(crate) fn seed_snapshots(&mut self) {
        if self.uses_snapshot_tracking() {
            self.take_snapshot(SidecarKind::OriginalValues);
        }
        self.take_snapshot(SidecarKind::RelationshipSnapshot);
    }

    pub fn original_value(&self, property: usize) -> Value {
        match self.sidecar(SidecarKind::OriginalValues).and_then(|s| s.get(property)) {
            Some(value) => value.clone(),
            None => self.current_value(property),
        }
    }

    pub(crate) fn set_original_value(&mut self, property: usize, value: Value) -> Result<()> {
        let entity_type = self.entity_type.clone();
        self.add_sidecar(SidecarKind::OriginalValues)
            .set(entity_type.property_at(property), value)
    }

    pub fn relationship_snapshot_value(&self, property: usize) -> Value {
        match self
            .sidecar(SidecarKind::RelationshipSnapshot)
            .and_then(|s| s.get(property))
        {
            Some(value) => value.clone(),
            None => self.current_value(property),
        }
    }

    pub(crate) fn set_relationship_snapshot_value(&mut self, property: usize, value: Value) -> Result<()> {
        let entity_type = self.entity_type.clone();
        let prop = entity_type.property_at(property);
        if prop.requires_relationship_snapshot() {
            self.add_sidecar(SidecarKind::RelationshipSnapshot).set(prop, value)?;
        }
        Ok(())
    }

    pub fn relationship_snapshot_navigation(&self, navigation: usize) -> NavigationSnapshot {
        match self
            .sidecar(SidecarKind::RelationshipSnapshot)
            .and_then(|s| s.navigation(navigation))
        {
            Some(snapshot) => snapshot.clone(),
            None => self.current_navigation(navigation),
        }
    }

    pub(crate) fn refresh_navigation_snapshot(&mut self, navigation: usize) {
        let current = self.current_navigation(navigation);
        self.add_sidecar(SidecarKind::RelationshipSnapshot)
            .set_navigation(navigation, current);
    }

    /// Records a single member change without re-reading the live collection.
    pub(crate) fn snapshot_collection_member(&mut self, navigation: usize, item: &ObjectRef, present: bool) {
        let current = self.current_navigation(navigation);
        let sidecar = self.add_sidecar(SidecarKind::RelationshipSnapshot);
        if sidecar.navigation(navigation).is_none() {
            sidecar.set_navigation(navigation, current);
            return;
        }
        if let Some(NavigationSnapshot::Collection(items)) = sidecar.navigation_mut(navigation) {
            let contained = items.iter().any(|i| i.ptr_eq(item));
            if present && !contained {
                items.push(item.clone());
            } else if !present && contained {
                items.retain(|i| !i.ptr_eq(item));
            }
        }
    }

    pub(crate) fn key_value(&self, factory: &dyn KeyValueFactory) -> KeyValue {
        factory.create(
            factory
                .properties()
                .iter()
                .map(|p| self.current_value(*p))
                .collect(),
        )
    }

    /// Values of `properties` taken from the relationship snapshot (or current values).
    pub(crate) fn values_of(&self, properties: &[usize], from_snapshot: bool) -> Vec<Value> {
        properties
            .iter()
            .map(|p| {
                if from_snapshot {
                    self.relationship_snapshot_value(*p)
                } else {
                    self.current_value(*p)
                }
            })
            .collect()
    }

    /// Reverts temporary values to their defaults and clears the flags.
    pub(crate) fn discard_temporary_values(&mut self) {
        for property in self.state_data.flagged(PropertyFlag::Temporary) {
            let default = self.entity_type.property_at(property).default_value();
            self.write_stored(property, default);
        }
        self.state_data.flag_all(PropertyFlag::Temporary, false);
    }
}

/// Read-only view of an entry.
pub struct EntityEntry<'a> {
    manager: &'a StateManager,
    entry: &'a InternalEntityEntry,
}

impl<'a> EntityEntry<'a> {
    pub(crate) fn new(manager: &'a StateManager, entry: &'a InternalEntityEntry) -> Self {
        Self { manager, entry }
    }

    pub fn id(&self) -> EntryId {
        self.entry.id
    }

    pub fn state(&self) -> EntityState {
        self.entry.state
    }

    pub fn kind(&self) -> EntryKind {
        self.entry.kind()
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entry.entity_type
    }

    pub fn object(&self) -> Option<ObjectRef> {
        self.entry.object()
    }

    pub fn current_value(&self, property: &str) -> Result<Value> {
        let index = self.entry.entity_type.property(property)?.index();
        Ok(self.entry.current_value(index))
    }

    pub fn original_value(&self, property: &str) -> Result<Value> {
        let index = self.entry.entity_type.property(property)?.index();
        Ok(self.entry.original_value(index))
    }

    pub fn is_modified(&self, property: &str) -> Result<bool> {
        let index = self.entry.entity_type.property(property)?.index();
        Ok(self.entry.is_modified(index))
    }

    pub fn is_temporary(&self, property: &str) -> Result<bool> {
        let index = self.entry.entity_type.property(property)?.index();
        Ok(self.entry.is_temporary(index))
    }

    pub fn modified_properties(&self) -> Vec<&'a str> {
        if self.entry.state != EntityState::Modified {
            return Vec::new();
        }
        let entry: &'a InternalEntityEntry = self.entry;
        let entity_type: &'a EntityType = &entry.entity_type;
        entry
            .state_data
            .flagged(PropertyFlag::Modified)
            .into_iter()
            .map(|p| entity_type.property_at(p).name())
            .collect()
    }

    pub fn has_sidecar(&self, kind: SidecarKind) -> bool {
        self.entry.sidecar(kind).is_some()
    }

    pub fn primary_key(&self) -> KeyValue {
        let key = self.manager.model().key(self.entry.entity_type.primary_key());
        let factory = self.manager.key_factory(key);
        self.entry.key_value(factory.as_ref())
    }
}

impl fmt::Debug for EntityEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityEntry")
            .field("id", &self.entry.id)
            .field("entity_type", &self.entry.entity_type.name())
            .field("state", &self.entry.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::metadata::{Model, ModelBuilder, PropertyBuilder};

    fn model() -> Arc<Model> {
        let mut builder = ModelBuilder::new();
        builder
            .entity("Doc")
            .property(PropertyBuilder::new("Id", DataType::Integer).value_generated_on_add())
            .property(PropertyBuilder::new("Title", DataType::Text))
            .key(&["Id"]);
        builder.build().unwrap()
    }

    fn draft() -> InternalEntityEntry {
        let model = model();
        let entity_type = model.find_entity_type("Doc").unwrap().clone();
        InternalEntityEntry::shadow(
            EntryId::new(StateManagerId::new(), 1),
            entity_type,
            vec![Value::Integer(-1), Value::from("draft")],
        )
    }

    #[test]
    fn test_writes_land_in_store_generated_sidecar() {
        let mut entry = draft();
        entry.add_sidecar(SidecarKind::StoreGeneratedValues);

        entry.write_value(0, Value::Integer(42)).unwrap();
        entry.write_value(1, Value::from("final")).unwrap();

        assert_eq!(entry.current_value(0), Value::Integer(42));
        assert_eq!(entry.read_stored(0), Value::Integer(-1));
        assert!(entry.sidecar(SidecarKind::StoreGeneratedValues).unwrap().has_value(0));
        // Not store generated: written straight through.
        assert_eq!(entry.read_stored(1), Value::from("final"));
        assert!(!entry.sidecar(SidecarKind::StoreGeneratedValues).unwrap().has_value(1));
    }

    #[test]
    fn test_commit_sidecar_writes_back() {
        let mut entry = draft();
        entry.add_sidecar(SidecarKind::StoreGeneratedValues);
        entry.write_value(0, Value::Integer(42)).unwrap();

        entry.commit_sidecar(SidecarKind::StoreGeneratedValues);

        assert!(entry.sidecar(SidecarKind::StoreGeneratedValues).is_none());
        assert_eq!(entry.read_stored(0), Value::Integer(42));
        assert_eq!(entry.current_value(0), Value::Integer(42));
    }

    #[test]
    fn test_rollback_sidecar_discards_values() {
        let mut entry = draft();
        entry.add_sidecar(SidecarKind::StoreGeneratedValues);
        entry.write_value(0, Value::Integer(42)).unwrap();

        assert!(entry.rollback_sidecar(SidecarKind::StoreGeneratedValues));
        assert_eq!(entry.current_value(0), Value::Integer(-1));
        assert!(!entry.rollback_sidecar(SidecarKind::StoreGeneratedValues));

        // Without the sidecar the write goes to main storage.
        entry.write_value(0, Value::Integer(7)).unwrap();
        assert_eq!(entry.read_stored(0), Value::Integer(7));
    }

    #[test]
    fn test_relationship_snapshot_only_covers_keys() {
        let mut entry = draft();
        entry.set_relationship_snapshot_value(1, Value::from("ignored")).unwrap();
        assert!(entry.sidecar(SidecarKind::RelationshipSnapshot).is_none());

        entry.set_relationship_snapshot_value(0, Value::Integer(5)).unwrap();
        assert_eq!(entry.relationship_snapshot_value(0), Value::Integer(5));
        assert_eq!(entry.current_value(0), Value::Integer(-1));
    }
}
