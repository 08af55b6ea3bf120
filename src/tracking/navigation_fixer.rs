// ============================================================================
// Navigation Fixer
// ============================================================================
//
// Keeps both ends of every relationship consistent with the foreign keys:
//
//   - a tracked entry is connected to the principals its foreign keys point
//     at and to the dependents pointing at it,
//   - a foreign-key change moves the dependent between principals,
//   - a navigation change rewrites the foreign key and the inverse side,
//   - a key change is copied into every dependent's foreign key,
//   - a delete cascades, nulls, or leaves dependents according to the
//     relationship's delete behavior,
//   - a detach unlinks the entry from the navigations of the tracked graph.
//
// Writes made here go through `WriteMode::Fixup`, so they never re-enter the
// key and foreign-key listeners.
//
// ============================================================================

use tracing::{Level, event};

use super::entry::EntryId;
use super::listeners::{EntityStateListener, ForeignKeyListener, KeyListener, NavigationListener};
use super::state::{EntityState, PropertyFlag};
use super::state_manager::{StateManager, reachable_objects};
use super::transitions::WriteMode;
use crate::core::{Result, TrackingError, Value};
use crate::metadata::{DeleteBehavior, ForeignKey};
use crate::object::ObjectRef;

#[derive(Debug, Clone, Copy, Default)]
pub struct NavigationFixer;

impl NavigationFixer {
    // ------------------------------------------------------------------
    // Raw writes: change the object, keep the relationship snapshot in step
    // ------------------------------------------------------------------

    fn set_reference_raw(
        manager: &mut StateManager,
        id: EntryId,
        navigation: usize,
        target: Option<ObjectRef>,
    ) -> Result<()> {
        let Some(object) = manager.object_of(id) else {
            return Ok(());
        };
        object.set_navigation_reference(navigation, target);
        if manager.is_tracked(id) {
            manager.internal_mut(id)?.refresh_navigation_snapshot(navigation);
        }
        Ok(())
    }

    fn collection_add_raw(
        manager: &mut StateManager,
        id: EntryId,
        navigation: usize,
        item: &ObjectRef,
    ) -> Result<()> {
        let Some(object) = manager.object_of(id) else {
            return Ok(());
        };
        object.collection_add(navigation, item.clone());
        if manager.is_tracked(id) {
            manager
                .internal_mut(id)?
                .snapshot_collection_member(navigation, item, true);
        }
        Ok(())
    }

    fn collection_remove_raw(
        manager: &mut StateManager,
        id: EntryId,
        navigation: usize,
        item: &ObjectRef,
    ) -> Result<()> {
        let Some(object) = manager.object_of(id) else {
            return Ok(());
        };
        object.collection_remove(navigation, item);
        if manager.is_tracked(id) {
            manager
                .internal_mut(id)?
                .snapshot_collection_member(navigation, item, false);
        }
        Ok(())
    }

    /// Adds `dependent` to the principal's side of the relationship.
    fn add_to_inverse(
        manager: &mut StateManager,
        principal: EntryId,
        fk: &ForeignKey,
        dependent: &ObjectRef,
    ) -> Result<()> {
        let Some(navigation) = fk.principal_to_dependent() else {
            return Ok(());
        };
        if fk.is_unique() {
            Self::set_reference_raw(manager, principal, navigation, Some(dependent.clone()))
        } else {
            Self::collection_add_raw(manager, principal, navigation, dependent)
        }
    }

    fn remove_from_inverse(
        manager: &mut StateManager,
        principal: EntryId,
        fk: &ForeignKey,
        dependent: &ObjectRef,
    ) -> Result<()> {
        let Some(navigation) = fk.principal_to_dependent() else {
            return Ok(());
        };
        if !fk.is_unique() {
            return Self::collection_remove_raw(manager, principal, navigation, dependent);
        }
        let points_here = manager
            .object_of(principal)
            .and_then(|p| p.navigation_reference(navigation))
            .is_some_and(|d| d.ptr_eq(dependent));
        if points_here {
            Self::set_reference_raw(manager, principal, navigation, None)?;
        }
        Ok(())
    }

    /// Object-level inverse for a principal that is not tracked.
    fn mirror_inverse(principal: &ObjectRef, fk: &ForeignKey, dependent: &ObjectRef, present: bool) {
        let Some(navigation) = fk.principal_to_dependent() else {
            return;
        };
        if fk.is_unique() {
            let current = principal.navigation_reference(navigation);
            if present {
                principal.set_navigation_reference(navigation, Some(dependent.clone()));
            } else if current.is_some_and(|d| d.ptr_eq(dependent)) {
                principal.set_navigation_reference(navigation, None);
            }
        } else if present {
            principal.collection_add(navigation, dependent.clone());
        } else {
            principal.collection_remove(navigation, dependent);
        }
    }

    /// Object-level reference for a dependent that is not tracked.
    fn mirror_principal(dependent: &ObjectRef, fk: &ForeignKey, principal: Option<&ObjectRef>) {
        let Some(navigation) = fk.dependent_to_principal() else {
            return;
        };
        match principal {
            Some(principal) => dependent.set_navigation_reference(navigation, Some(principal.clone())),
            None => {
                let current = dependent.navigation_reference(navigation);
                if current.is_some() {
                    dependent.set_navigation_reference(navigation, None);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Foreign keys
    // ------------------------------------------------------------------

    /// Copies the principal's key into the dependent's foreign key, or nulls
    /// it. A null on a required relationship is flagged as a conceptual null
    /// instead. Primary-key properties are never nulled.
    ///
    /// A copied value that lands on one of the dependent's own keys is passed
    /// on to that key's listeners, so identifying chains follow the change
    /// down every level. The walk stops at the first level whose value is
    /// already current.
    fn set_foreign_key_raw(
        manager: &mut StateManager,
        dependent: EntryId,
        fk: &ForeignKey,
        principal: Option<EntryId>,
    ) -> Result<()> {
        let model = manager.model().clone();
        let principal_key = model.key(fk.principal_key()).properties();
        let entity_type = manager.internal(dependent)?.entity_type.clone();

        for (position, property) in fk.properties().iter().enumerate() {
            match principal {
                Some(principal) => {
                    let source = principal_key[position];
                    let entry = manager.internal(principal)?;
                    let value = entry.current_value(source);
                    let temporary = entry.is_temporary(source);
                    let old_value = manager.internal(dependent)?.current_value(*property);
                    manager.set_property_internal(dependent, *property, value.clone(), WriteMode::Fixup)?;
                    manager
                        .internal_mut(dependent)?
                        .state_data
                        .flag(*property, PropertyFlag::Temporary, temporary);
                    if entity_type.property_at(*property).is_key()
                        && old_value != value
                        && manager.internal(dependent)?.current_value(*property) == value
                    {
                        manager.fire_key_changed(dependent, *property, &old_value, &value)?;
                    }
                }
                None => {
                    if entity_type.property_at(*property).is_primary_key() {
                        continue;
                    }
                    manager.set_property_internal(dependent, *property, Value::Null, WriteMode::Fixup)?;
                }
            }
        }
        Ok(())
    }

    /// Links `dependent` to `principal` on both sides. For one-to-one
    /// relationships any other dependent claiming the principal is severed.
    fn connect(
        manager: &mut StateManager,
        principal: EntryId,
        dependent: EntryId,
        fk: &ForeignKey,
        set_foreign_key: bool,
    ) -> Result<()> {
        let principal_object = manager.object_of(principal);
        let dependent_object = manager.object_of(dependent);

        if fk.is_unique() {
            let mut others: Vec<EntryId> = manager
                .get_dependents(principal, fk.id(), false)?
                .filter(|d| *d != dependent)
                .collect();
            if let (Some(object), Some(navigation)) = (&principal_object, fk.principal_to_dependent())
                && let Some(current) = object.navigation_reference(navigation)
                && let Some(current) = manager.tracked_entry_for_object(&current)
                && current != dependent
                && !others.contains(&current)
            {
                others.push(current);
            }
            for other in others {
                event!(Level::DEBUG, principal = %principal, dependent = %other, "severing replaced dependent");
                Self::sever(manager, other, principal, fk)?;
            }
        }

        // Leave whichever principal the dependent's navigation still names.
        if let (Some(object), Some(navigation)) = (&dependent_object, fk.dependent_to_principal())
            && let Some(previous) = object.navigation_reference(navigation)
            && principal_object.as_ref().is_none_or(|p| !p.ptr_eq(&previous))
        {
            match manager.tracked_entry_for_object(&previous) {
                Some(previous) => Self::remove_from_inverse(manager, previous, fk, object)?,
                None => Self::mirror_inverse(&previous, fk, object, false),
            }
        }

        if set_foreign_key {
            Self::set_foreign_key_raw(manager, dependent, fk, Some(principal))?;
        }
        if let (Some(navigation), Some(object)) = (fk.dependent_to_principal(), &principal_object) {
            Self::set_reference_raw(manager, dependent, navigation, Some(object.clone()))?;
        }
        if let Some(object) = &dependent_object {
            Self::add_to_inverse(manager, principal, fk, object)?;
        }
        Ok(())
    }

    /// Detaches `dependent` from `principal`: clears its navigation if it
    /// names the principal and nulls its foreign key if it matches.
    fn sever(manager: &mut StateManager, dependent: EntryId, principal: EntryId, fk: &ForeignKey) -> Result<()> {
        if let (Some(navigation), Some(object), Some(target)) = (
            fk.dependent_to_principal(),
            manager.object_of(dependent),
            manager.object_of(principal),
        ) && object
            .navigation_reference(navigation)
            .is_some_and(|t| t.ptr_eq(&target))
        {
            Self::set_reference_raw(manager, dependent, navigation, None)?;
        }
        if manager.find_principal(dependent, fk.id(), false)? == Some(principal) {
            Self::set_foreign_key_raw(manager, dependent, fk, None)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // State-driven fixup
    // ------------------------------------------------------------------

    /// Connects an entry that just started being tracked, as a dependent
    /// and as a principal, then tracks the graph it reaches if it was added.
    fn initial_fixup(manager: &mut StateManager, id: EntryId, from_query: bool) -> Result<()> {
        let model = manager.model().clone();
        let entity_type = manager.internal(id)?.entity_type.clone();
        let object = manager.object_of(id);

        for fk_id in entity_type.foreign_keys() {
            let fk = model.foreign_key(*fk_id);
            let by_key = manager.find_principal(id, *fk_id, false)?;
            if let (Some(object), Some(navigation)) = (&object, fk.dependent_to_principal())
                && let Some(target) = object.navigation_reference(navigation)
            {
                match manager.tracked_entry_for_object(&target) {
                    Some(principal) => {
                        Self::connect(manager, principal, id, fk, by_key != Some(principal))?;
                    }
                    None => Self::mirror_inverse(&target, fk, object, true),
                }
                continue;
            }
            if let Some(principal) = by_key {
                Self::connect(manager, principal, id, fk, false)?;
            }
        }

        let skip_reverse_scan = from_query && manager.single_query_mode();
        for fk_id in entity_type.referencing_foreign_keys() {
            let fk = model.foreign_key(*fk_id);

            let dependents: Vec<EntryId> = manager.get_dependents(id, *fk_id, false)?.collect();
            for dependent in dependents {
                // A navigation naming another principal wins over the key.
                if let (Some(navigation), Some(dependent_object)) =
                    (fk.dependent_to_principal(), manager.object_of(dependent))
                    && let Some(target) = dependent_object.navigation_reference(navigation)
                    && object.as_ref().is_none_or(|o| !o.ptr_eq(&target))
                {
                    continue;
                }
                Self::connect(manager, id, dependent, fk, false)?;
            }

            if let (Some(object), Some(navigation)) = (&object, fk.principal_to_dependent()) {
                let items: Vec<ObjectRef> = if fk.is_unique() {
                    object.navigation_reference(navigation).into_iter().collect()
                } else {
                    object.navigation_collection(navigation)
                };
                for item in items {
                    match manager.tracked_entry_for_object(&item) {
                        Some(dependent) => {
                            let set_fk = manager.find_principal(dependent, *fk_id, false)? != Some(id);
                            Self::connect(manager, id, dependent, fk, set_fk)?;
                        }
                        None => Self::mirror_principal(&item, fk, Some(object)),
                    }
                }
            }

            if skip_reverse_scan {
                continue;
            }
            if let (Some(object), Some(navigation)) = (&object, fk.dependent_to_principal()) {
                let dependent_type = fk.dependent_type();
                let pointing: Vec<EntryId> = manager
                    .entries
                    .values()
                    .filter(|e| {
                        e.state.is_tracked()
                            && e.id != id
                            && e.entity_type.id() == dependent_type
                            && e.object().is_some_and(|d| {
                                d.navigation_reference(navigation)
                                    .is_some_and(|t| t.ptr_eq(object))
                            })
                    })
                    .map(|e| e.id)
                    .collect();
                for dependent in pointing {
                    let set_fk = manager.find_principal(dependent, *fk_id, false)? != Some(id);
                    Self::connect(manager, id, dependent, fk, set_fk)?;
                }
            }
        }

        if manager.state(id)? == EntityState::Added
            && manager.config().cascade_graph_on_add
            && !manager.attaching
            && let Some(object) = &object
        {
            for target in reachable_objects(object) {
                if manager.tracked_entry_for_object(&target).is_some() {
                    continue;
                }
                let target_id = manager.get_or_create_entry(&target)?;
                if !manager.is_tracked(target_id) {
                    event!(Level::TRACE, entry = %target_id, "tracking reachable object as added");
                    manager.set_entity_state(target_id, EntityState::Added)?;
                }
            }
        }
        Ok(())
    }

    /// Applies each referencing relationship's delete behavior to the
    /// dependents of a principal that was just deleted.
    fn cascade_delete(manager: &mut StateManager, id: EntryId) -> Result<()> {
        let model = manager.model().clone();
        let entity_type = manager.internal(id)?.entity_type.clone();

        for fk_id in entity_type.referencing_foreign_keys() {
            let fk = model.foreign_key(*fk_id);
            let dependents: Vec<EntryId> = manager
                .get_dependents(id, *fk_id, false)?
                .filter(|d| *d != id)
                .collect();
            for dependent in dependents {
                if !manager.is_tracked(dependent) {
                    continue;
                }
                match fk.delete_behavior() {
                    DeleteBehavior::Cascade => {
                        if manager.state(dependent)? == EntityState::Deleted {
                            continue;
                        }
                        event!(Level::DEBUG, principal = %id, dependent = %dependent, "cascade delete");
                        manager.set_entity_state(dependent, EntityState::Deleted)?;
                    }
                    DeleteBehavior::ClientSetNull => {
                        if manager.state(dependent)? != EntityState::Deleted {
                            Self::sever(manager, dependent, id, fk)?;
                        }
                        if let Some(object) = manager.object_of(dependent) {
                            Self::remove_from_inverse(manager, id, fk, &object)?;
                        }
                    }
                    DeleteBehavior::Restrict => {}
                }
            }
        }
        Ok(())
    }

    /// Removes a freshly detached entry from every navigation of the tracked
    /// graph, and clears its own navigations. Foreign keys are left as they are.
    fn unlink(manager: &mut StateManager, id: EntryId) -> Result<()> {
        let Some(object) = manager.object_of(id) else {
            return Ok(());
        };
        let model = manager.model().clone();
        let entity_type = manager.internal(id)?.entity_type.clone();

        for fk_id in entity_type.foreign_keys() {
            let fk = model.foreign_key(*fk_id);
            let Some(navigation) = fk.dependent_to_principal() else {
                continue;
            };
            if let Some(principal) = object.navigation_reference(navigation) {
                object.set_navigation_reference(navigation, None);
                match manager.tracked_entry_for_object(&principal) {
                    Some(principal) => Self::remove_from_inverse(manager, principal, fk, &object)?,
                    None => Self::mirror_inverse(&principal, fk, &object, false),
                }
            }
        }

        for fk_id in entity_type.referencing_foreign_keys() {
            let fk = model.foreign_key(*fk_id);
            let Some(navigation) = fk.principal_to_dependent() else {
                continue;
            };
            let items: Vec<ObjectRef> = if fk.is_unique() {
                let items = object.navigation_reference(navigation).into_iter().collect();
                object.set_navigation_reference(navigation, None);
                items
            } else {
                let items = object.navigation_collection(navigation);
                for item in &items {
                    object.collection_remove(navigation, item);
                }
                items
            };
            let Some(dependent_navigation) = fk.dependent_to_principal() else {
                continue;
            };
            for item in items {
                if !item
                    .navigation_reference(dependent_navigation)
                    .is_some_and(|t| t.ptr_eq(&object))
                {
                    continue;
                }
                match manager.tracked_entry_for_object(&item) {
                    Some(dependent) => {
                        Self::set_reference_raw(manager, dependent, dependent_navigation, None)?
                    }
                    None => item.set_navigation_reference(dependent_navigation, None),
                }
            }
        }
        event!(Level::TRACE, entry = %id, "unlinked from graph");
        Ok(())
    }
}

impl EntityStateListener for NavigationFixer {
    /// A principal cannot be deleted while dependents it would have to null
    /// hang off a required relationship.
    fn state_changing(&self, manager: &mut StateManager, entry: EntryId, new_state: EntityState) -> Result<()> {
        if new_state != EntityState::Deleted {
            return Ok(());
        }
        let model = manager.model().clone();
        let entity_type = manager.internal(entry)?.entity_type.clone();
        for fk_id in entity_type.referencing_foreign_keys() {
            let fk = model.foreign_key(*fk_id);
            if fk.delete_behavior() != DeleteBehavior::ClientSetNull {
                continue;
            }
            if !fk.is_required() {
                continue;
            }
            let dependent_type = model.entity_type(fk.dependent_type());
            if manager
                .get_dependents(entry, *fk_id, false)?
                .any(|d| d != entry && !manager.state(d).is_ok_and(|s| s == EntityState::Deleted))
            {
                return Err(TrackingError::ConceptualNull {
                    dependent: dependent_type.name().to_string(),
                    principal: entity_type.name().to_string(),
                });
            }
        }
        Ok(())
    }

    fn state_changed(
        &self,
        manager: &mut StateManager,
        entry: EntryId,
        old_state: EntityState,
        from_query: bool,
    ) -> Result<()> {
        let new_state = manager.state(entry)?;
        match (old_state, new_state) {
            (EntityState::Detached, EntityState::Detached) => Ok(()),
            (EntityState::Detached, _) => Self::initial_fixup(manager, entry, from_query),
            (_, EntityState::Deleted) => Self::cascade_delete(manager, entry),
            (_, EntityState::Detached) => Self::unlink(manager, entry),
            _ => Ok(()),
        }
    }
}

impl ForeignKeyListener for NavigationFixer {
    fn foreign_key_property_changed(
        &self,
        manager: &mut StateManager,
        entry: EntryId,
        property: usize,
        old_value: &Value,
        _new_value: &Value,
    ) -> Result<()> {
        let model = manager.model().clone();
        let entity_type = manager.internal(entry)?.entity_type.clone();
        let dependent_object = manager.object_of(entry);

        for fk_id in entity_type.property_at(property).foreign_keys() {
            let fk = model.foreign_key(*fk_id);
            let Some(position) = fk.property_position(property) else {
                continue;
            };
            let mut old_values = manager.internal(entry)?.values_of(fk.properties(), false);
            old_values[position] = old_value.clone();
            let old_principal = manager.find_by_key(fk.principal_key(), old_values);
            let new_principal = manager.find_principal(entry, *fk_id, false)?;
            if old_principal == new_principal {
                continue;
            }
            event!(
                Level::DEBUG,
                entry = %entry,
                from = ?old_principal,
                to = ?new_principal,
                "foreign key moved dependent"
            );

            if let (Some(old), Some(object)) = (old_principal, &dependent_object) {
                Self::remove_from_inverse(manager, old, fk, object)?;
            }
            match new_principal {
                Some(principal) => Self::connect(manager, principal, entry, fk, false)?,
                None => {
                    // The navigation still names the old principal.
                    if let (Some(navigation), Some(object), Some(old)) =
                        (fk.dependent_to_principal(), &dependent_object, old_principal)
                        && let Some(target) = object.navigation_reference(navigation)
                        && manager.object_of(old).is_some_and(|o| o.ptr_eq(&target))
                    {
                        Self::set_reference_raw(manager, entry, navigation, None)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl KeyListener for NavigationFixer {
    /// Dependents of the old key value follow the principal to the new one.
    fn key_property_changed(
        &self,
        manager: &mut StateManager,
        entry: EntryId,
        property: usize,
        old_value: &Value,
        _new_value: &Value,
    ) -> Result<()> {
        let model = manager.model().clone();
        let entity_type = manager.internal(entry)?.entity_type.clone();
        let object = manager.object_of(entry);

        for fk_id in entity_type.referencing_foreign_keys() {
            let fk = model.foreign_key(*fk_id);
            let key = model.key(fk.principal_key());
            let Some(position) = key.properties().iter().position(|p| *p == property) else {
                continue;
            };
            let mut old_key = manager.internal(entry)?.values_of(key.properties(), false);
            old_key[position] = old_value.clone();

            let mut dependents = Vec::new();
            if let (Some(object), Some(navigation)) = (&object, fk.principal_to_dependent()) {
                let items: Vec<ObjectRef> = if fk.is_unique() {
                    object.navigation_reference(navigation).into_iter().collect()
                } else {
                    object.navigation_collection(navigation)
                };
                dependents.extend(items.iter().filter_map(|i| manager.tracked_entry_for_object(i)));
            }
            if !old_key.iter().any(Value::is_null) {
                let dependent_type = fk.dependent_type();
                dependents.extend(
                    manager
                        .entries
                        .values()
                        .filter(|e| {
                            e.state.is_tracked()
                                && e.entity_type.id() == dependent_type
                                && e.values_of(fk.properties(), false) == old_key
                        })
                        .map(|e| e.id),
                );
            }
            dependents.sort();
            dependents.dedup();

            for dependent in dependents {
                if manager.is_tracked(dependent) {
                    Self::set_foreign_key_raw(manager, dependent, fk, Some(entry))?;
                }
            }
        }
        Ok(())
    }
}

impl NavigationListener for NavigationFixer {
    fn navigation_reference_changed(
        &self,
        manager: &mut StateManager,
        entry: EntryId,
        navigation: usize,
        old_value: Option<&ObjectRef>,
        new_value: Option<&ObjectRef>,
    ) -> Result<()> {
        let model = manager.model().clone();
        let entity_type = manager.internal(entry)?.entity_type.clone();
        let nav = entity_type.navigation_at(navigation);
        let fk = model.foreign_key(nav.foreign_key());
        let Some(object) = manager.object_of(entry) else {
            return Ok(());
        };

        if nav.points_to_principal() {
            let old_principal = old_value.and_then(|o| manager.tracked_entry_for_object(o));
            match (old_value, old_principal) {
                (_, Some(old)) => Self::remove_from_inverse(manager, old, fk, &object)?,
                (Some(old), None) => Self::mirror_inverse(old, fk, &object, false),
                (None, None) => {}
            }
            match new_value {
                Some(new) => match manager.tracked_entry_for_object(new) {
                    Some(principal) => Self::connect(manager, principal, entry, fk, true)?,
                    None => Self::mirror_inverse(new, fk, &object, true),
                },
                None => {
                    let current = manager.find_principal(entry, fk.id(), false)?;
                    if current.is_some() && current == old_principal {
                        Self::set_foreign_key_raw(manager, entry, fk, None)?;
                    }
                }
            }
            return Ok(());
        }

        // Principal side of a one-to-one.
        if let Some(old) = old_value {
            match manager.tracked_entry_for_object(old) {
                Some(dependent) => Self::sever(manager, dependent, entry, fk)?,
                None => {
                    if fk
                        .dependent_to_principal()
                        .and_then(|n| old.navigation_reference(n))
                        .is_some_and(|p| p.ptr_eq(&object))
                    {
                        Self::mirror_principal(old, fk, None);
                    }
                }
            }
        }
        if let Some(new) = new_value {
            match manager.tracked_entry_for_object(new) {
                Some(dependent) => Self::connect(manager, entry, dependent, fk, true)?,
                None => Self::mirror_principal(new, fk, Some(&object)),
            }
        }
        Ok(())
    }

    fn navigation_collection_changed(
        &self,
        manager: &mut StateManager,
        entry: EntryId,
        navigation: usize,
        added: &[ObjectRef],
        removed: &[ObjectRef],
    ) -> Result<()> {
        let model = manager.model().clone();
        let entity_type = manager.internal(entry)?.entity_type.clone();
        let fk = model.foreign_key(entity_type.navigation_at(navigation).foreign_key());
        let Some(object) = manager.object_of(entry) else {
            return Ok(());
        };

        for item in removed {
            match manager.tracked_entry_for_object(item) {
                Some(dependent) => Self::sever(manager, dependent, entry, fk)?,
                None => {
                    if fk
                        .dependent_to_principal()
                        .and_then(|n| item.navigation_reference(n))
                        .is_some_and(|p| p.ptr_eq(&object))
                    {
                        Self::mirror_principal(item, fk, None);
                    }
                }
            }
        }
        for item in added {
            match manager.tracked_entry_for_object(item) {
                Some(dependent) => Self::connect(manager, entry, dependent, fk, true)?,
                None => Self::mirror_principal(item, fk, Some(&object)),
            }
        }
        Ok(())
    }
}
