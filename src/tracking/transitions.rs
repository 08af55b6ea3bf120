// ============================================================================
// State Transitions and Property Writes
// ============================================================================
//
// Transition side effects, in order:
//   1. Deleting an Added entry detaches it instead.
//   2. Entering Unchanged/Modified/Deleted with a temporary value fails.
//   3. Entering Added generates values for properties still at their default.
//   4. Leaving Detached registers the entry in the identity maps.
//   5. Flags are reset for the target state; entering Detached reverts
//      temporary values and drops every sidecar.
//   6. Listeners see "changing" before and "changed" after.
//
// ============================================================================

use tracing::{Level, event};

use super::entry::EntryId;
use super::key_propagator::KeyPropagator;
use super::sidecar::SidecarKind;
use super::state::{EntityState, PropertyFlag};
use super::state_manager::StateManager;
use crate::core::{Result, TrackingError, Value};
use crate::metadata::{DeleteBehavior, ValueGenerated};
use crate::object::ObjectRef;

/// Options for a state transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateChange {
    /// Entering Modified flags every non-key property.
    pub modify_properties: bool,
    /// The entry was materialized from a query row.
    pub from_query: bool,
}

/// Whether a property write notifies key and foreign-key listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    Notify,
    /// Writes made by fixup itself; only the snapshot is brought up to date.
    Fixup,
}

impl StateManager {
    pub fn set_entity_state(&mut self, id: EntryId, new_state: EntityState) -> Result<()> {
        self.set_entity_state_with(
            id,
            new_state,
            StateChange {
                modify_properties: new_state == EntityState::Modified,
                from_query: false,
            },
        )
    }

    pub fn set_entity_state_with(
        &mut self,
        id: EntryId,
        new_state: EntityState,
        change: StateChange,
    ) -> Result<()> {
        let entry = self.internal(id)?;
        let old_state = entry.state;
        let entity_type = entry.entity_type.clone();
        let new_state = if old_state == EntityState::Added && new_state == EntityState::Deleted {
            EntityState::Detached
        } else {
            new_state
        };
        if old_state == new_state {
            return Ok(());
        }

        if matches!(
            new_state,
            EntityState::Unchanged | EntityState::Modified | EntityState::Deleted
        ) && let Some(property) = entry.state_data.flagged(PropertyFlag::Temporary).first()
        {
            return Err(TrackingError::TemporaryValue {
                entity_type: entity_type.name().to_string(),
                property: entity_type.property_at(*property).name().to_string(),
                state: new_state,
            });
        }

        let generated = if new_state == EntityState::Added {
            self.generate_values(id)?
        } else {
            Vec::new()
        };

        if let Err(err) = self.fire_state_changing(id, new_state) {
            self.discard_generated(id, &generated)?;
            return Err(err);
        }
        if old_state == EntityState::Detached
            && let Err(err) = self.start_tracking(id)
        {
            self.discard_generated(id, &generated)?;
            return Err(err);
        }

        let entry = self.internal_mut(id)?;
        entry.state = new_state;
        match new_state {
            EntityState::Added => {
                entry.state_data.flag_all(PropertyFlag::Modified, false);
            }
            EntityState::Modified => {
                if change.modify_properties {
                    for property in entity_type.properties() {
                        if !property.is_primary_key() {
                            entry
                                .state_data
                                .flag(property.index(), PropertyFlag::Modified, true);
                        }
                    }
                }
            }
            EntityState::Unchanged => {
                entry.state_data.flag_all(PropertyFlag::Modified, false);
                entry.state_data.flag_all(PropertyFlag::ConceptualNull, false);
            }
            EntityState::Deleted => {
                entry.state_data.flag_all(PropertyFlag::ConceptualNull, false);
            }
            EntityState::Detached => {
                entry.discard_temporary_values();
                entry.state_data.flag_all(PropertyFlag::Modified, false);
                entry.state_data.flag_all(PropertyFlag::ConceptualNull, false);
                entry.sidecars.clear();
            }
        }

        if new_state == EntityState::Detached {
            self.stop_tracking(id)?;
        } else if old_state == EntityState::Detached {
            entry.seed_snapshots();
        } else if new_state == EntityState::Unchanged {
            // Current values become the new baseline.
            if entry.uses_snapshot_tracking() {
                entry.take_snapshot(SidecarKind::OriginalValues);
            } else {
                entry.rollback_sidecar(SidecarKind::OriginalValues);
            }
        }

        if matches!(new_state, EntityState::Added | EntityState::Modified)
            && self.single_query_mode == Some(true)
        {
            self.single_query_mode = Some(false);
        }

        event!(
            Level::DEBUG,
            entry = %id,
            entity_type = entity_type.name(),
            from = %old_state,
            to = %new_state,
            "entity state changed"
        );
        self.fire_state_changed(id, old_state, change.from_query)
    }

    /// Fills properties still holding their default on entry to Added.
    /// Returns the ordinals written.
    fn generate_values(&mut self, id: EntryId) -> Result<Vec<usize>> {
        let entity_type = self.internal(id)?.entity_type.clone();
        let mut generated = Vec::new();
        for property in entity_type.properties() {
            let index = property.index();
            if self.internal(id)?.current_value(index) != property.default_value() {
                continue;
            }
            let (value, temporary) = if property.is_foreign_key() {
                match KeyPropagator::propagate_value(self, id, index)? {
                    Some(propagated) => propagated,
                    None => continue,
                }
            } else if property.value_generated() != ValueGenerated::Never {
                match self.value_generators.select(property) {
                    Some(generator) => (
                        generator.next(property)?,
                        generator.generates_temporary_values(),
                    ),
                    None => continue,
                }
            } else {
                continue;
            };

            let entry = self.internal_mut(id)?;
            entry.write_value(index, value)?;
            entry
                .state_data
                .flag(index, PropertyFlag::Temporary, temporary);
            generated.push(index);
        }
        Ok(generated)
    }

    fn discard_generated(&mut self, id: EntryId, generated: &[usize]) -> Result<()> {
        let entry = self.internal_mut(id)?;
        for index in generated {
            let default = entry.entity_type.property_at(*index).default_value();
            entry.write_stored(*index, default);
            entry
                .state_data
                .flag(*index, PropertyFlag::Temporary, false);
        }
        Ok(())
    }

    /// Flags a property of a persisted entry, moving Unchanged to Modified.
    pub(crate) fn mark_modified(&mut self, id: EntryId, property: usize) -> Result<()> {
        let entry = self.internal_mut(id)?;
        match entry.state {
            EntityState::Unchanged => {
                entry
                    .state_data
                    .flag(property, PropertyFlag::Modified, true);
                self.set_entity_state_with(id, EntityState::Modified, StateChange::default())
            }
            EntityState::Modified | EntityState::Deleted => {
                entry
                    .state_data
                    .flag(property, PropertyFlag::Modified, true);
                Ok(())
            }
            EntityState::Added | EntityState::Detached => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Property writes
    // ------------------------------------------------------------------

    pub(crate) fn set_property_internal(
        &mut self,
        id: EntryId,
        property: usize,
        value: Value,
        mode: WriteMode,
    ) -> Result<()> {
        let model = self.model().clone();
        let entry = self.internal(id)?;
        let entity_type = entry.entity_type.clone();
        let prop = entity_type.property_at(property);
        if !prop.data_type().is_compatible(&value) {
            return Err(TrackingError::TypeMismatch(format!(
                "cannot assign {} to '{}.{}' of type {}",
                value.type_name(),
                entity_type.name(),
                prop.name(),
                prop.data_type()
            )));
        }

        let state = entry.state;
        let old_value = entry.current_value(property);
        let persisted = matches!(
            state,
            EntityState::Unchanged | EntityState::Modified | EntityState::Deleted
        );
        if old_value == value {
            self.internal_mut(id)?
                .state_data
                .flag(property, PropertyFlag::ConceptualNull, false);
            return Ok(());
        }
        if prop.is_primary_key() && persisted {
            return Err(TrackingError::KeyMutation {
                entity_type: entity_type.name().to_string(),
                property: prop.name().to_string(),
            });
        }
        if state == EntityState::Detached {
            let entry = self.internal_mut(id)?;
            entry.write_value(property, value)?;
            entry
                .state_data
                .flag(property, PropertyFlag::Temporary, false);
            return Ok(());
        }

        if value.is_null() {
            match model.required_relationship(prop) {
                Some(cascades) if state != EntityState::Deleted => {
                    if persisted || cascades {
                        self.internal_mut(id)?.state_data.flag(
                            property,
                            PropertyFlag::ConceptualNull,
                            true,
                        );
                        event!(Level::TRACE, entry = %id, property = prop.name(), "conceptual null");
                        return match mode {
                            WriteMode::Notify => {
                                let resolved = self.handle_conceptual_nulls(id);
                                if resolved.is_err() {
                                    self.internal_mut(id)?.state_data.flag(
                                        property,
                                        PropertyFlag::ConceptualNull,
                                        false,
                                    );
                                }
                                resolved
                            }
                            WriteMode::Fixup => Ok(()),
                        };
                    }
                }
                _ if persisted && !prop.is_nullable() => {
                    return Err(TrackingError::NullValue {
                        entity_type: entity_type.name().to_string(),
                        property: prop.name().to_string(),
                    });
                }
                _ => {}
            }
        }

        self.fire_property_changing(id, property)?;
        let entry = self.internal_mut(id)?;
        entry.write_value(property, value.clone())?;
        entry
            .state_data
            .flag(property, PropertyFlag::Temporary, false);
        entry
            .state_data
            .flag(property, PropertyFlag::ConceptualNull, false);

        if prop.is_key()
            && let Err(err) = self.reindex(id)
        {
            self.internal_mut(id)?.write_value(property, old_value)?;
            return Err(err);
        }
        if persisted && !prop.is_primary_key() {
            self.mark_modified(id, property)?;
        }
        if mode == WriteMode::Notify {
            if prop.is_key() {
                self.fire_key_changed(id, property, &old_value, &value)?;
            }
            if prop.is_foreign_key() {
                self.fire_foreign_key_changed(id, property, &old_value, &value)?;
            }
        }
        if prop.requires_relationship_snapshot() {
            self.internal_mut(id)?
                .set_relationship_snapshot_value(property, value)?;
        }
        self.fire_property_changed(id, property)
    }

    /// Writes a property and notifies listeners immediately.
    pub fn set_property_value(
        &mut self,
        id: EntryId,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let index = self.internal(id)?.entity_type.property(property)?.index();
        self.set_property_internal(id, index, value.into(), WriteMode::Notify)
    }

    pub fn property_value(&self, id: EntryId, property: &str) -> Result<Value> {
        let entry = self.internal(id)?;
        let index = entry.entity_type.property(property)?.index();
        Ok(entry.current_value(index))
    }

    /// Flags or unflags one property. Unflagging restores the original value
    /// and returns the entry to Unchanged once nothing is left flagged.
    pub fn set_property_modified(&mut self, id: EntryId, property: &str, modified: bool) -> Result<()> {
        let entry = self.internal(id)?;
        let entity_type = entry.entity_type.clone();
        let prop = entity_type.property(property)?;
        let index = prop.index();
        if prop.is_primary_key() {
            return Err(TrackingError::KeyMutation {
                entity_type: entity_type.name().to_string(),
                property: prop.name().to_string(),
            });
        }
        if !matches!(entry.state, EntityState::Unchanged | EntityState::Modified) {
            return Ok(());
        }
        if modified {
            return self.mark_modified(id, index);
        }
        if !entry.is_modified(index) {
            return Ok(());
        }

        let original = entry.original_value(index);
        self.set_property_internal(id, index, original, WriteMode::Notify)?;
        let entry = self.internal_mut(id)?;
        entry
            .state_data
            .flag(index, PropertyFlag::Modified, false);
        if entry.state == EntityState::Modified
            && !entry.state_data.any_flagged(PropertyFlag::Modified)
        {
            self.set_entity_state(id, EntityState::Unchanged)?;
        }
        Ok(())
    }

    pub fn original_value(&self, id: EntryId, property: &str) -> Result<Value> {
        let entry = self.internal(id)?;
        let index = entry.entity_type.property(property)?.index();
        Ok(entry.original_value(index))
    }

    pub fn set_original_value(
        &mut self,
        id: EntryId,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let value = value.into();
        let entry = self.internal_mut(id)?;
        let entity_type = entry.entity_type.clone();
        let prop = entity_type.property(property)?;
        if !prop.data_type().is_compatible(&value) {
            return Err(TrackingError::TypeMismatch(format!(
                "cannot assign {} to '{}.{}' of type {}",
                value.type_name(),
                entity_type.name(),
                prop.name(),
                prop.data_type()
            )));
        }
        entry.set_original_value(prop.index(), value)
    }

    // ------------------------------------------------------------------
    // Navigation writes
    // ------------------------------------------------------------------

    /// Sets a reference navigation and runs fixup immediately.
    pub fn set_reference(
        &mut self,
        id: EntryId,
        navigation: &str,
        target: Option<&ObjectRef>,
    ) -> Result<()> {
        let entry = self.internal(id)?;
        let entity_type = entry.entity_type.clone();
        let index = entity_type.navigation(navigation)?.index();
        let object = entry
            .object()
            .ok_or_else(|| TrackingError::ObjectDropped(id.to_string()))?;
        let old = object.navigation_reference(index);
        let unchanged = match (&old, target) {
            (Some(old), Some(new)) => old.ptr_eq(new),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return Ok(());
        }
        object.set_reference(navigation, target)?;
        if !entry.state.is_tracked() {
            return Ok(());
        }

        if let Some(target) = target {
            self.track_reachable(target)?;
        }
        self.fire_reference_changed(id, index, old.as_ref(), target)?;
        self.internal_mut(id)?.refresh_navigation_snapshot(index);
        self.handle_all_conceptual_nulls()
    }

    /// Adds to a collection navigation and runs fixup immediately.
    /// Returns false if the item was already a member.
    pub fn add_to_collection(&mut self, id: EntryId, navigation: &str, item: &ObjectRef) -> Result<bool> {
        let entry = self.internal(id)?;
        let entity_type = entry.entity_type.clone();
        let index = entity_type.navigation(navigation)?.index();
        let object = entry
            .object()
            .ok_or_else(|| TrackingError::ObjectDropped(id.to_string()))?;
        let tracked = entry.state.is_tracked();
        if !object.add_to_collection(navigation, item)? {
            return Ok(false);
        }
        if !tracked {
            return Ok(true);
        }

        self.track_reachable(item)?;
        self.fire_collection_changed(id, index, std::slice::from_ref(item), &[])?;
        self.internal_mut(id)?
            .snapshot_collection_member(index, item, true);
        self.handle_all_conceptual_nulls()?;
        Ok(true)
    }

    /// Removes from a collection navigation and runs fixup immediately.
    pub fn remove_from_collection(
        &mut self,
        id: EntryId,
        navigation: &str,
        item: &ObjectRef,
    ) -> Result<bool> {
        let entry = self.internal(id)?;
        let entity_type = entry.entity_type.clone();
        let index = entity_type.navigation(navigation)?.index();
        let object = entry
            .object()
            .ok_or_else(|| TrackingError::ObjectDropped(id.to_string()))?;
        let tracked = entry.state.is_tracked();
        if !object.remove_from_collection(navigation, item)? {
            return Ok(false);
        }
        if !tracked {
            return Ok(true);
        }

        self.fire_collection_changed(id, index, &[], std::slice::from_ref(item))?;
        self.internal_mut(id)?
            .snapshot_collection_member(index, item, false);
        self.handle_all_conceptual_nulls()?;
        Ok(true)
    }

    fn track_reachable(&mut self, object: &ObjectRef) -> Result<()> {
        if !self.config().cascade_graph_on_add || self.tracked_entry_for_object(object).is_some() {
            return Ok(());
        }
        let target = self.get_or_create_entry(object)?;
        self.set_entity_state(target, EntityState::Added)
    }

    // ------------------------------------------------------------------
    // Conceptual nulls
    // ------------------------------------------------------------------

    /// Resolves foreign keys severed to null: a cascading relationship
    /// deletes the dependent (detaches it if Added), anything else fails.
    pub fn handle_conceptual_nulls(&mut self, id: EntryId) -> Result<()> {
        let model = self.model().clone();
        let entry = self.internal(id)?;
        let flagged = entry.state_data.flagged(PropertyFlag::ConceptualNull);
        if flagged.is_empty() {
            return Ok(());
        }
        let entity_type = entry.entity_type.clone();
        let state = entry.state;

        let mut cascades = false;
        let mut principal = String::new();
        for property in flagged {
            for fk in entity_type.property_at(property).foreign_keys() {
                let fk = model.foreign_key(*fk);
                if !fk.is_required() {
                    continue;
                }
                principal = model.entity_type(fk.principal_type()).name().to_string();
                if fk.delete_behavior() == DeleteBehavior::Cascade {
                    cascades = true;
                }
            }
        }
        if !cascades {
            return Err(TrackingError::ConceptualNull {
                dependent: entity_type.name().to_string(),
                principal,
            });
        }

        self.internal_mut(id)?
            .state_data
            .flag_all(PropertyFlag::ConceptualNull, false);
        let target = if state == EntityState::Added {
            EntityState::Detached
        } else {
            EntityState::Deleted
        };
        event!(Level::DEBUG, entry = %id, to = %target, "conceptual null resolved by cascade");
        self.set_entity_state(id, target)
    }

    pub(crate) fn handle_all_conceptual_nulls(&mut self) -> Result<()> {
        let pending: Vec<EntryId> = self
            .entries
            .values()
            .filter(|e| {
                e.state.is_tracked() && e.state_data.any_flagged(PropertyFlag::ConceptualNull)
            })
            .map(|e| e.id)
            .collect();
        for id in pending {
            self.handle_conceptual_nulls(id)?;
        }
        Ok(())
    }
}
