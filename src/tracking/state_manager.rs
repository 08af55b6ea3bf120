// ============================================================================
// State Manager
// ============================================================================
//
// Owns every entry of one unit of work, the identity maps (one per key, so
// alternate keys resolve too) and the reverse map from tracked objects to
// their entries. Entries of objects that stop being tracked are remembered in
// a weak side table so tracking the same object again reuses its entry.
//
// Single-threaded by construction: entries, objects and listeners are `Rc`.
//
// ============================================================================

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use tracing::{Level, event};

use super::entry::{EntityEntry, EntryId, InternalEntityEntry};
use super::listeners::ListenerSet;
use super::state::{EntityState, StateManagerId};
use super::transitions::StateChange;
use super::value_generation::{ValueGenerator, ValueGeneratorSelector};
use crate::config::TrackerConfig;
use crate::core::{Result, TrackingError, Value};
use crate::keys::{KeyValue, KeyValueFactory, KeyValueFactorySource};
use crate::metadata::{EntityType, ForeignKeyId, Key, KeyId, Model, ValueGenerated};
use crate::object::{ObjectId, ObjectRef, WeakObjectRef};

pub struct StateManager {
    id: StateManagerId,
    model: Arc<Model>,
    config: TrackerConfig,
    next_entry: u64,
    pub(crate) entries: BTreeMap<EntryId, InternalEntityEntry>,
    identity_maps: HashMap<KeyId, HashMap<KeyValue, EntryId>>,
    object_entries: HashMap<ObjectId, EntryId>,
    detached_objects: HashMap<ObjectId, (WeakObjectRef, EntryId)>,
    detached_shadows: Vec<EntryId>,
    key_factories: KeyValueFactorySource,
    pub(crate) value_generators: ValueGeneratorSelector,
    listeners: ListenerSet,
    pub(crate) single_query_mode: Option<bool>,
    pub(crate) detecting_changes: bool,
    /// Set while `attach` walks a graph; added nodes do not pull in their neighbors.
    pub(crate) attaching: bool,
}

impl StateManager {
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            id: StateManagerId::new(),
            model,
            config: TrackerConfig::default(),
            next_entry: 0,
            entries: BTreeMap::new(),
            identity_maps: HashMap::new(),
            object_entries: HashMap::new(),
            detached_objects: HashMap::new(),
            detached_shadows: Vec::new(),
            key_factories: KeyValueFactorySource::new(),
            value_generators: ValueGeneratorSelector::new(),
            listeners: ListenerSet::with_defaults(),
            single_query_mode: None,
            detecting_changes: false,
            attaching: false,
        }
    }

    pub fn with_config(model: Arc<Model>, config: TrackerConfig) -> Result<Self> {
        config.validate().map_err(TrackingError::InvalidConfig)?;
        let mut manager = Self::new(model);
        manager.config = config;
        Ok(manager)
    }

    pub fn id(&self) -> StateManagerId {
        self.id
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Registration point for additional listeners; they run after the defaults.
    pub fn listeners_mut(&mut self) -> &mut ListenerSet {
        &mut self.listeners
    }

    pub(crate) fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    /// Overrides the value generator used for one property.
    pub fn register_value_generator(
        &mut self,
        entity_type: &str,
        property: &str,
        generator: Rc<dyn ValueGenerator>,
    ) -> Result<()> {
        let entity_type = self.model.find_entity_type(entity_type)?;
        let property = entity_type.property(property)?;
        self.value_generators
            .register(entity_type.id(), property.index(), generator);
        Ok(())
    }

    pub fn key_factory(&self, key: &Key) -> Rc<dyn KeyValueFactory> {
        self.key_factories.get(key)
    }

    pub fn single_query_mode(&self) -> bool {
        self.single_query_mode == Some(true)
    }

    // ------------------------------------------------------------------
    // Entry access
    // ------------------------------------------------------------------

    pub fn entry(&self, id: EntryId) -> Result<EntityEntry<'_>> {
        Ok(EntityEntry::new(self, self.internal(id)?))
    }

    pub fn internal(&self, id: EntryId) -> Result<&InternalEntityEntry> {
        if id.manager() != self.id {
            return Err(TrackingError::ForeignEntry(id.to_string()));
        }
        self.entries
            .get(&id)
            .ok_or_else(|| TrackingError::EntryNotFound(id.to_string()))
    }

    pub(crate) fn internal_mut(&mut self, id: EntryId) -> Result<&mut InternalEntityEntry> {
        if id.manager() != self.id {
            return Err(TrackingError::ForeignEntry(id.to_string()));
        }
        self.entries
            .get_mut(&id)
            .ok_or_else(|| TrackingError::EntryNotFound(id.to_string()))
    }

    pub fn state(&self, id: EntryId) -> Result<EntityState> {
        Ok(self.internal(id)?.state)
    }

    pub fn is_tracked(&self, id: EntryId) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|e| e.state.is_tracked())
    }

    pub(crate) fn object_of(&self, id: EntryId) -> Option<ObjectRef> {
        self.entries.get(&id).and_then(|e| e.object())
    }

    pub(crate) fn tracked_entry_for_object(&self, object: &ObjectRef) -> Option<EntryId> {
        self.object_entries.get(&object.id()).copied()
    }

    /// The entry of `object`, tracked or remembered in the detached side table.
    pub fn entry_for_object(&self, object: &ObjectRef) -> Option<EntryId> {
        if let Some(id) = self.tracked_entry_for_object(object) {
            return Some(id);
        }
        self.detached_objects
            .get(&object.id())
            .filter(|(weak, _)| weak.upgrade().is_some_and(|o| o.ptr_eq(object)))
            .map(|(_, id)| *id)
    }

    /// Tracked entries, in creation order.
    pub fn entries(&self) -> impl Iterator<Item = EntityEntry<'_>> {
        self.entries
            .values()
            .filter(|e| e.state.is_tracked())
            .map(move |e| EntityEntry::new(self, e))
    }

    pub(crate) fn tracked_ids(&self) -> Vec<EntryId> {
        self.entries
            .values()
            .filter(|e| e.state.is_tracked())
            .map(|e| e.id)
            .collect()
    }

    pub fn tracked_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.state.is_tracked())
            .count()
    }

    fn next_entry_id(&mut self) -> EntryId {
        self.next_entry += 1;
        EntryId::new(self.id, self.next_entry)
    }

    // ------------------------------------------------------------------
    // Entry creation
    // ------------------------------------------------------------------

    /// Returns the entry already associated with `object`, or creates an
    /// untracked one that reads the object's values through its accessors.
    pub fn get_or_create_entry(&mut self, object: &ObjectRef) -> Result<EntryId> {
        let entity_type = object.entity_type();
        if !self.model.contains(&entity_type) {
            return Err(TrackingError::UnknownEntityType(entity_type.name().to_string()));
        }
        if let Some(id) = self.entry_for_object(object) {
            return Ok(id);
        }
        if self.detached_objects.len() >= self.config.detached_sweep_threshold {
            self.sweep_detached();
        }

        let id = self.next_entry_id();
        self.entries.insert(
            id,
            InternalEntityEntry::materialized(id, entity_type, object),
        );
        // A dead mapping at this address belonged to a dropped object whose
        // memory was reused; its entry can no longer be reached.
        if let Some((_, stale)) = self
            .detached_objects
            .insert(object.id(), (object.downgrade(), id))
            && self.entries.get(&stale).is_some_and(|e| !e.state.is_tracked())
        {
            self.entries.remove(&stale);
            event!(Level::TRACE, entry = %stale, "evicted entry of reused object address");
        }
        event!(Level::TRACE, entry = %id, "entry created");
        Ok(id)
    }

    /// Creates an untracked shadow entry: no object, values held by the entry.
    pub fn create_entry(&mut self, entity_type: &str, values: Vec<Value>) -> Result<EntryId> {
        let entity_type = self.model.find_entity_type(entity_type)?.clone();
        validate_row(&entity_type, &values)?;
        let id = self.next_entry_id();
        self.entries
            .insert(id, InternalEntityEntry::shadow(id, entity_type, values));
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Identity map
    // ------------------------------------------------------------------

    fn describe_key(&self, entity_type: &EntityType, key: &Key, values: &[Value]) -> String {
        let names = key
            .properties()
            .iter()
            .map(|p| entity_type.property_at(*p).name());
        let parts: Vec<String> = if self.config.sensitive_data_logging {
            names
                .zip(values.iter())
                .map(|(name, value)| format!("{}: {}", name, value))
                .collect()
        } else {
            names.map(|name| format!("'{}'", name)).collect()
        };
        format!("{{{}}}", parts.join(", "))
    }

    fn compute_keys(&self, id: EntryId) -> Result<Vec<KeyValue>> {
        let entry = self.internal(id)?;
        let entity_type = &entry.entity_type;
        let mut key_values = Vec::with_capacity(entity_type.keys().len());
        for key_id in entity_type.keys() {
            let key = self.model.key(*key_id);
            let factory = self.key_factories.get(key);
            let value = entry.key_value(factory.as_ref());
            if !value.is_valid() {
                return Err(TrackingError::InvalidKey {
                    entity_type: entity_type.name().to_string(),
                    key: self.describe_key(
                        entity_type,
                        key,
                        &entry.values_of(key.properties(), false),
                    ),
                });
            }
            if let Some(existing) = self.identity_maps.get(key_id).and_then(|m| m.get(&value))
                && *existing != id
            {
                return Err(TrackingError::IdentityConflict {
                    entity_type: entity_type.name().to_string(),
                    key: self.describe_key(entity_type, key, value.values()),
                });
            }
            key_values.push(value);
        }
        Ok(key_values)
    }

    /// Registers the entry under all of its keys. No-op if already registered.
    pub fn start_tracking(&mut self, id: EntryId) -> Result<()> {
        let entry = self.internal(id)?;
        if !entry.indexed_keys.is_empty() {
            return Ok(());
        }
        if !entry.is_object_alive() {
            return Err(TrackingError::ObjectDropped(id.to_string()));
        }
        let key_values = self.compute_keys(id)?;
        for value in &key_values {
            self.identity_maps
                .entry(value.key())
                .or_default()
                .insert(value.clone(), id);
        }

        let entry = self.internal_mut(id)?;
        entry.indexed_keys = key_values;
        entry.retain_object();
        if let Some(object_id) = entry.object_id {
            self.object_entries.insert(object_id, id);
            self.detached_objects.remove(&object_id);
        }
        self.detached_shadows.retain(|e| *e != id);
        event!(Level::DEBUG, entry = %id, "started tracking");
        Ok(())
    }

    /// Removes the entry from the identity maps, keeping it reachable from
    /// its object through the weak side table.
    pub fn stop_tracking(&mut self, id: EntryId) -> Result<()> {
        let entry = self.internal_mut(id)?;
        let key_values = std::mem::take(&mut entry.indexed_keys);
        let weak = entry.release_object();
        let object_id = entry.object_id;

        for value in key_values {
            if let Some(map) = self.identity_maps.get_mut(&value.key())
                && map.get(&value) == Some(&id)
            {
                map.remove(&value);
            }
        }
        match object_id {
            Some(object_id) => {
                self.object_entries.remove(&object_id);
                if let Some(weak) = weak {
                    self.detached_objects.insert(object_id, (weak, id));
                }
            }
            None => self.detached_shadows.push(id),
        }
        event!(Level::DEBUG, entry = %id, "stopped tracking");
        Ok(())
    }

    /// Moves a tracked entry to its current key values. Validates every key
    /// before touching the maps, so a failure leaves them as they were.
    pub(crate) fn reindex(&mut self, id: EntryId) -> Result<()> {
        let entry = self.internal(id)?;
        if entry.indexed_keys.is_empty() {
            return Ok(());
        }
        let old_values = entry.indexed_keys.clone();
        let new_values = self.compute_keys(id)?;
        if old_values == new_values {
            return Ok(());
        }
        for value in &old_values {
            if let Some(map) = self.identity_maps.get_mut(&value.key())
                && map.get(value) == Some(&id)
            {
                map.remove(value);
            }
        }
        for value in &new_values {
            self.identity_maps
                .entry(value.key())
                .or_default()
                .insert(value.clone(), id);
        }
        self.internal_mut(id)?.indexed_keys = new_values;
        event!(Level::TRACE, entry = %id, "entry re-indexed");
        Ok(())
    }

    pub(crate) fn find_by_key(&self, key: KeyId, values: Vec<Value>) -> Option<EntryId> {
        let factory = self.key_factories.get(self.model.key(key));
        let value = factory.create(values);
        if !value.is_valid() {
            return None;
        }
        self.identity_maps.get(&key)?.get(&value).copied()
    }

    /// Looks up a tracked entry by primary key values.
    pub fn try_get_entry(&self, entity_type: &str, key: &[Value]) -> Result<Option<EntryId>> {
        let entity_type = self.model.find_entity_type(entity_type)?;
        Ok(self.find_by_key(entity_type.primary_key(), key.to_vec()))
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Starts a query. The first query into an empty manager runs in single
    /// query mode; any later one ends it.
    pub fn begin_tracking_query(&mut self) {
        self.single_query_mode = match self.single_query_mode {
            None => Some(self.config.single_query_mode && self.tracked_count() == 0),
            Some(_) => Some(false),
        };
    }

    /// Tracks a row coming from a query. Idempotent per identity: if the
    /// row's key is already tracked the existing entry is returned untouched.
    pub fn start_tracking_from_query(
        &mut self,
        entity_type: &str,
        object: Option<&ObjectRef>,
        row: &[Value],
    ) -> Result<EntryId> {
        let entity_type = self.model.find_entity_type(entity_type)?.clone();
        validate_row(&entity_type, row)?;

        let key = self.model.key(entity_type.primary_key());
        let factory = self.key_factories.get(key);
        let key_value = factory.create_from_buffer(row);
        if !key_value.is_valid() {
            return Err(TrackingError::InvalidKey {
                entity_type: entity_type.name().to_string(),
                key: self.describe_key(&entity_type, key, &factory_values(factory.as_ref(), row)),
            });
        }
        if let Some(existing) = self
            .identity_maps
            .get(&key.id())
            .and_then(|m| m.get(&key_value))
        {
            return Ok(*existing);
        }
        if self.single_query_mode.is_none() {
            self.begin_tracking_query();
        }

        let id = match object {
            Some(object) => {
                if object.entity_type().id() != entity_type.id() {
                    return Err(TrackingError::TypeMismatch(format!(
                        "an instance of '{}' cannot materialize a row of '{}'",
                        object.entity_type().name(),
                        entity_type.name()
                    )));
                }
                let id = self.get_or_create_entry(object)?;
                let entry = self.internal_mut(id)?;
                if !entry.state.is_tracked() {
                    for (property, value) in row.iter().enumerate() {
                        entry.write_stored(property, value.clone());
                    }
                }
                id
            }
            None => {
                let id = self.next_entry_id();
                self.entries.insert(
                    id,
                    InternalEntityEntry::shadow(id, entity_type.clone(), row.to_vec()),
                );
                id
            }
        };

        self.set_entity_state_with(
            id,
            EntityState::Unchanged,
            StateChange {
                from_query: true,
                ..StateChange::default()
            },
        )?;
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Relationships
    // ------------------------------------------------------------------

    /// Tracked dependents whose foreign key equals the principal's key,
    /// comparing either current values or relationship-snapshot values.
    pub fn get_dependents(
        &self,
        principal: EntryId,
        foreign_key: ForeignKeyId,
        from_snapshot: bool,
    ) -> Result<impl Iterator<Item = EntryId> + '_> {
        let fk = self.model.foreign_key(foreign_key);
        let entry = self.internal(principal)?;
        let principal_values =
            entry.values_of(self.model.key(fk.principal_key()).properties(), from_snapshot);
        let valid = !principal_values.iter().any(Value::is_null);
        let dependent_type = fk.dependent_type();
        Ok(self
            .entries
            .values()
            .filter(move |e| {
                valid
                    && e.state.is_tracked()
                    && e.entity_type.id() == dependent_type
                    && e.values_of(fk.properties(), from_snapshot) == principal_values
            })
            .map(|e| e.id))
    }

    /// The tracked principal the dependent's foreign key currently points at.
    pub fn find_principal(
        &self,
        dependent: EntryId,
        foreign_key: ForeignKeyId,
        from_snapshot: bool,
    ) -> Result<Option<EntryId>> {
        let fk = self.model.foreign_key(foreign_key);
        let values = self
            .internal(dependent)?
            .values_of(fk.properties(), from_snapshot);
        Ok(self.find_by_key(fk.principal_key(), values))
    }

    // ------------------------------------------------------------------
    // Graph operations
    // ------------------------------------------------------------------

    /// Tracks `object` as Added. Reachable untracked objects follow when
    /// `cascade_graph_on_add` is on.
    pub fn add(&mut self, object: &ObjectRef) -> Result<EntryId> {
        let id = self.get_or_create_entry(object)?;
        self.set_entity_state(id, EntityState::Added)?;
        Ok(id)
    }

    /// Tracks `object` and every untracked object reachable from it, as
    /// Unchanged, or as Added when the primary key still awaits generation.
    pub fn attach(&mut self, object: &ObjectRef) -> Result<EntryId> {
        let mut visited = HashSet::new();
        let attaching = std::mem::replace(&mut self.attaching, true);
        let result = self.attach_graph(object, &mut visited);
        self.attaching = attaching;
        result
    }

    fn attach_graph(&mut self, object: &ObjectRef, visited: &mut HashSet<ObjectId>) -> Result<EntryId> {
        let id = self.get_or_create_entry(object)?;
        if !visited.insert(object.id()) || self.is_tracked(id) {
            return Ok(id);
        }
        let reachable = reachable_objects(object);
        let state = if self.needs_generated_key(id)? {
            EntityState::Added
        } else {
            EntityState::Unchanged
        };
        self.set_entity_state(id, state)?;
        for target in reachable {
            if self.tracked_entry_for_object(&target).is_none() {
                self.attach_graph(&target, visited)?;
            }
        }
        Ok(id)
    }

    fn needs_generated_key(&self, id: EntryId) -> Result<bool> {
        let entry = self.internal(id)?;
        let key = self.model.key(entry.entity_type.primary_key());
        Ok(key.properties().iter().any(|p| {
            let property = entry.entity_type.property_at(*p);
            property.value_generated() != ValueGenerated::Never
                && entry.current_value(*p) == property.default_value()
        }))
    }

    /// Marks the object Deleted; an Added object is detached instead.
    pub fn remove(&mut self, object: &ObjectRef) -> Result<EntryId> {
        let id = self.get_or_create_entry(object)?;
        if self.state(id)? == EntityState::Detached {
            self.set_entity_state(id, EntityState::Unchanged)?;
        }
        self.set_entity_state(id, EntityState::Deleted)?;
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Housekeeping
    // ------------------------------------------------------------------

    /// Evicts detached entries whose objects were dropped, and detached
    /// shadow entries. Returns the number of entries removed.
    pub fn sweep_detached(&mut self) -> usize {
        let dead: Vec<(ObjectId, EntryId)> = self
            .detached_objects
            .iter()
            .filter(|(_, (weak, _))| !weak.is_alive())
            .map(|(object_id, (_, id))| (*object_id, *id))
            .collect();
        let mut evicted = 0;
        for (object_id, id) in dead {
            self.detached_objects.remove(&object_id);
            if self.entries.get(&id).is_some_and(|e| !e.state.is_tracked()) {
                self.entries.remove(&id);
                evicted += 1;
            }
        }
        for id in std::mem::take(&mut self.detached_shadows) {
            if self.entries.get(&id).is_some_and(|e| !e.state.is_tracked()) {
                self.entries.remove(&id);
                evicted += 1;
            }
        }
        event!(Level::DEBUG, manager = %self.id, evicted, "swept detached entries");
        evicted
    }

    /// Forgets every entry without running fixup.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.identity_maps.clear();
        self.object_entries.clear();
        self.detached_objects.clear();
        self.detached_shadows.clear();
        self.single_query_mode = None;
        self.detecting_changes = false;
        self.attaching = false;
        event!(Level::DEBUG, manager = %self.id, "state manager reset");
    }

    // ------------------------------------------------------------------
    // Listener fan-out
    // ------------------------------------------------------------------

    pub(crate) fn fire_state_changing(&mut self, id: EntryId, new_state: EntityState) -> Result<()> {
        let listeners = self.listeners.state.clone();
        for listener in &listeners {
            listener.state_changing(self, id, new_state)?;
        }
        Ok(())
    }

    pub(crate) fn fire_state_changed(
        &mut self,
        id: EntryId,
        old_state: EntityState,
        from_query: bool,
    ) -> Result<()> {
        let listeners = self.listeners.state.clone();
        for listener in &listeners {
            listener.state_changed(self, id, old_state, from_query)?;
        }
        Ok(())
    }

    pub(crate) fn fire_property_changing(&mut self, id: EntryId, property: usize) -> Result<()> {
        let listeners = self.listeners.property.clone();
        for listener in &listeners {
            listener.property_changing(self, id, property)?;
        }
        Ok(())
    }

    pub(crate) fn fire_property_changed(&mut self, id: EntryId, property: usize) -> Result<()> {
        let listeners = self.listeners.property.clone();
        for listener in &listeners {
            listener.property_changed(self, id, property)?;
        }
        Ok(())
    }

    pub(crate) fn fire_key_changed(
        &mut self,
        id: EntryId,
        property: usize,
        old_value: &Value,
        new_value: &Value,
    ) -> Result<()> {
        let listeners = self.listeners.key.clone();
        for listener in &listeners {
            listener.key_property_changed(self, id, property, old_value, new_value)?;
        }
        Ok(())
    }

    pub(crate) fn fire_foreign_key_changed(
        &mut self,
        id: EntryId,
        property: usize,
        old_value: &Value,
        new_value: &Value,
    ) -> Result<()> {
        let listeners = self.listeners.foreign_key.clone();
        for listener in &listeners {
            listener.foreign_key_property_changed(self, id, property, old_value, new_value)?;
        }
        Ok(())
    }

    pub(crate) fn fire_reference_changed(
        &mut self,
        id: EntryId,
        navigation: usize,
        old_value: Option<&ObjectRef>,
        new_value: Option<&ObjectRef>,
    ) -> Result<()> {
        let listeners = self.listeners.navigation.clone();
        for listener in &listeners {
            listener.navigation_reference_changed(self, id, navigation, old_value, new_value)?;
        }
        Ok(())
    }

    pub(crate) fn fire_collection_changed(
        &mut self,
        id: EntryId,
        navigation: usize,
        added: &[ObjectRef],
        removed: &[ObjectRef],
    ) -> Result<()> {
        let listeners = self.listeners.navigation.clone();
        for listener in &listeners {
            listener.navigation_collection_changed(self, id, navigation, added, removed)?;
        }
        Ok(())
    }
}

fn validate_row(entity_type: &EntityType, row: &[Value]) -> Result<()> {
    if row.len() != entity_type.properties().len() {
        return Err(TrackingError::TypeMismatch(format!(
            "a row of '{}' needs {} values, got {}",
            entity_type.name(),
            entity_type.properties().len(),
            row.len()
        )));
    }
    for (property, value) in entity_type.properties().iter().zip(row) {
        if !property.data_type().is_compatible(value) {
            return Err(TrackingError::TypeMismatch(format!(
                "cannot assign {} to '{}.{}' of type {}",
                value.type_name(),
                entity_type.name(),
                property.name(),
                property.data_type()
            )));
        }
    }
    Ok(())
}

fn factory_values(factory: &dyn KeyValueFactory, row: &[Value]) -> Vec<Value> {
    factory
        .properties()
        .iter()
        .map(|p| row.get(*p).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Objects directly reachable through any navigation of `object`.
pub(crate) fn reachable_objects(object: &ObjectRef) -> Vec<ObjectRef> {
    let entity_type = object.entity_type();
    let mut reachable = Vec::new();
    for navigation in entity_type.navigations() {
        if navigation.is_collection() {
            reachable.extend(object.navigation_collection(navigation.index()));
        } else if let Some(target) = object.navigation_reference(navigation.index()) {
            reachable.push(target);
        }
    }
    reachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::metadata::{ModelBuilder, PropertyBuilder};

    fn model() -> Arc<Model> {
        let mut builder = ModelBuilder::new();
        builder
            .entity("Tag")
            .property(PropertyBuilder::new("Id", DataType::Integer))
            .property(PropertyBuilder::new("Label", DataType::Text))
            .key(&["Id"]);
        builder.build().unwrap()
    }

    fn tag(model: &Model, id: i64) -> ObjectRef {
        let tag = model.create_object("Tag").unwrap();
        tag.set("Id", id).unwrap();
        tag
    }

    #[test]
    fn test_get_or_create_entry_reuses_entry() {
        let model = model();
        let mut sm = StateManager::new(model.clone());
        let object = tag(&model, 1);
        let first = sm.get_or_create_entry(&object).unwrap();
        let second = sm.get_or_create_entry(&object).unwrap();
        assert_eq!(first, second);
        assert_eq!(sm.state(first).unwrap(), EntityState::Detached);
        assert_eq!(sm.tracked_count(), 0);
    }

    #[test]
    fn test_stop_tracking_keeps_entry_for_object() {
        let model = model();
        let mut sm = StateManager::new(model.clone());
        let object = tag(&model, 1);
        let id = sm.attach(&object).unwrap();
        assert_eq!(sm.try_get_entry("Tag", &[Value::Integer(1)]).unwrap(), Some(id));

        sm.set_entity_state(id, EntityState::Detached).unwrap();
        assert_eq!(sm.try_get_entry("Tag", &[Value::Integer(1)]).unwrap(), None);
        assert_eq!(sm.get_or_create_entry(&object).unwrap(), id);
        assert_eq!(sm.attach(&object).unwrap(), id);
    }

    #[test]
    fn test_sweep_evicts_dropped_objects() {
        let model = model();
        let mut sm = StateManager::new(model.clone());
        let object = tag(&model, 1);
        let id = sm.get_or_create_entry(&object).unwrap();
        drop(object);
        assert_eq!(sm.sweep_detached(), 1);
        assert!(matches!(sm.entry(id), Err(TrackingError::EntryNotFound(_))));
    }

    #[test]
    fn test_reused_object_address_evicts_stale_entry() {
        let model = model();
        let mut sm = StateManager::new(model.clone());
        let dropped = tag(&model, 1);
        let dropped_address = dropped.id();
        let stale = sm.get_or_create_entry(&dropped).unwrap();
        drop(dropped);

        // Stand in for the allocator handing the freed address to a new object.
        let object = tag(&model, 2);
        let mapping = sm.detached_objects.remove(&dropped_address).unwrap();
        sm.detached_objects.insert(object.id(), mapping);

        let id = sm.get_or_create_entry(&object).unwrap();
        assert_ne!(id, stale);
        assert!(matches!(sm.entry(stale), Err(TrackingError::EntryNotFound(_))));
        assert_eq!(sm.entry_for_object(&object), Some(id));
        assert_eq!(sm.sweep_detached(), 0);
    }

    #[test]
    fn test_foreign_entry_is_rejected() {
        let model = model();
        let mut first = StateManager::new(model.clone());
        let second = StateManager::new(model.clone());
        let id = first.get_or_create_entry(&tag(&model, 1)).unwrap();
        assert!(matches!(second.entry(id), Err(TrackingError::ForeignEntry(_))));
    }

    #[test]
    fn test_identity_conflict_hides_values_unless_sensitive() {
        let model = model();
        let mut sm = StateManager::new(model.clone());
        sm.attach(&tag(&model, 1)).unwrap();
        match sm.attach(&tag(&model, 1)) {
            Err(TrackingError::IdentityConflict { key, .. }) => assert_eq!(key, "{'Id'}"),
            other => panic!("unexpected {:?}", other),
        }

        let config = TrackerConfig::new().sensitive_data_logging(true);
        let mut sm = StateManager::with_config(model.clone(), config).unwrap();
        sm.attach(&tag(&model, 1)).unwrap();
        match sm.attach(&tag(&model, 1)) {
            Err(TrackingError::IdentityConflict { key, .. }) => assert_eq!(key, "{Id: 1}"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_query_rows_are_idempotent_per_key() {
        let model = model();
        let mut sm = StateManager::new(model);
        sm.begin_tracking_query();
        assert!(sm.single_query_mode());
        let row = vec![Value::Integer(5), Value::from("rust")];
        let first = sm.start_tracking_from_query("Tag", None, &row).unwrap();
        let second = sm.start_tracking_from_query("Tag", None, &row).unwrap();
        assert_eq!(first, second);
        assert_eq!(sm.tracked_count(), 1);
        assert_eq!(sm.state(first).unwrap(), EntityState::Unchanged);

        sm.begin_tracking_query();
        assert!(!sm.single_query_mode());
    }

    #[test]
    fn test_reset_forgets_everything() {
        let model = model();
        let mut sm = StateManager::new(model.clone());
        let object = tag(&model, 1);
        let id = sm.attach(&object).unwrap();
        sm.reset();
        assert_eq!(sm.tracked_count(), 0);
        assert!(sm.entry(id).is_err());
        assert!(sm.entry_for_object(&object).is_none());
    }
}
