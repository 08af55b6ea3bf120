// ============================================================================
// Change Detector
// ============================================================================
//
// Finds changes on snapshot-tracked entries by comparing live values with
// their baselines:
//   - plain properties against the original values (flags modification),
//   - key and foreign-key properties against the relationship snapshot
//     (re-indexes and notifies key listeners),
//   - navigations against the relationship snapshot (notifies navigation
//     listeners; collections as added/removed sets).
//
// Notifying entity types are skipped; their writes go through the state
// manager and are seen as they happen.
//
// ============================================================================

use std::collections::HashSet;

use tracing::{Level, debug_span, event};

use super::entry::EntryId;
use super::listeners::PropertyListener;
use super::sidecar::{NavigationSnapshot, SidecarKind};
use super::state::{EntityState, PropertyFlag};
use super::state_manager::StateManager;
use crate::core::{Result, TrackingError};
use crate::object::{ObjectId, ObjectRef};

#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl PropertyListener for ChangeDetector {
    /// Notifying types capture the original value lazily, on first change.
    fn property_changing(&self, manager: &mut StateManager, entry: EntryId, property: usize) -> Result<()> {
        let entry = manager.internal_mut(entry)?;
        if !entry.uses_snapshot_tracking() {
            entry.ensure_snapshot(SidecarKind::OriginalValues, property);
        }
        Ok(())
    }
}

impl ChangeDetector {
    /// Scans every tracked entry once. Untracked objects newly reachable
    /// through a changed navigation are then tracked as Added.
    ///
    /// Re-entrant calls made while a scan is running return immediately.
    pub fn detect_changes(manager: &mut StateManager) -> Result<()> {
        if manager.detecting_changes {
            return Ok(());
        }
        let span = debug_span!("detect_changes", manager = %manager.id());
        let _enter = span.enter();

        manager.detecting_changes = true;
        let result = Self::detect_all(manager);
        manager.detecting_changes = false;
        result
    }

    fn detect_all(manager: &mut StateManager) -> Result<()> {
        let mut discovered = Vec::new();
        for id in manager.tracked_ids() {
            let Ok(entry) = manager.internal(id) else {
                continue;
            };
            if !entry.state.is_tracked() || !entry.uses_snapshot_tracking() {
                continue;
            }
            Self::detect_entry_changes(manager, id, &mut discovered)?;
        }

        let mut seen = HashSet::<ObjectId>::new();
        for object in discovered {
            if !seen.insert(object.id()) || manager.tracked_entry_for_object(&object).is_some() {
                continue;
            }
            let id = manager.get_or_create_entry(&object)?;
            event!(Level::DEBUG, entry = %id, "tracking object discovered by change detection");
            manager.set_entity_state(id, EntityState::Added)?;
        }
        manager.handle_all_conceptual_nulls()
    }

    /// Compares one entry with its baselines. Does not attach discovered objects.
    pub fn detect_entry(manager: &mut StateManager, id: EntryId) -> Result<()> {
        let mut discovered = Vec::new();
        Self::detect_entry_changes(manager, id, &mut discovered)
    }

    fn detect_entry_changes(
        manager: &mut StateManager,
        id: EntryId,
        discovered: &mut Vec<ObjectRef>,
    ) -> Result<()> {
        let entity_type = manager.internal(id)?.entity_type.clone();
        for property in entity_type.properties() {
            if !manager.is_tracked(id) {
                return Ok(());
            }
            Self::detect_property_change(manager, id, property.index())?;
        }
        for navigation in entity_type.navigations() {
            if !manager.is_tracked(id) {
                return Ok(());
            }
            Self::detect_navigation_change(manager, id, navigation.index(), discovered)?;
        }
        Ok(())
    }

    fn detect_property_change(manager: &mut StateManager, id: EntryId, property: usize) -> Result<()> {
        let entry = manager.internal(id)?;
        let entity_type = entry.entity_type.clone();
        let prop = entity_type.property_at(property);
        let state = entry.state;
        let current = entry.current_value(property);
        let persisted = matches!(
            state,
            EntityState::Unchanged | EntityState::Modified | EntityState::Deleted
        );

        if matches!(state, EntityState::Unchanged | EntityState::Modified)
            && !prop.is_primary_key()
            && !entry.is_flagged(property, PropertyFlag::Modified)
            && current != entry.original_value(property)
        {
            event!(Level::TRACE, entry = %id, property = prop.name(), "property change detected");
            manager.mark_modified(id, property)?;
        }

        if !prop.requires_relationship_snapshot() {
            return Ok(());
        }
        let entry = manager.internal(id)?;
        let snapshot = entry.relationship_snapshot_value(property);
        if current == snapshot {
            return Ok(());
        }
        if prop.is_primary_key() && persisted {
            return Err(TrackingError::KeyMutation {
                entity_type: entity_type.name().to_string(),
                property: prop.name().to_string(),
            });
        }

        event!(
            Level::DEBUG,
            entry = %id,
            property = prop.name(),
            "key property change detected"
        );
        if prop.is_key() {
            manager.reindex(id)?;
            manager.fire_key_changed(id, property, &snapshot, &current)?;
        }
        if prop.is_foreign_key() {
            if current.is_null()
                && persisted
                && state != EntityState::Deleted
                && manager.model().required_relationship(prop).is_some()
            {
                manager
                    .internal_mut(id)?
                    .state_data
                    .flag(property, PropertyFlag::ConceptualNull, true);
            }
            manager.fire_foreign_key_changed(id, property, &snapshot, &current)?;
        }
        if manager.is_tracked(id) {
            manager
                .internal_mut(id)?
                .set_relationship_snapshot_value(property, current)?;
        }
        Ok(())
    }

    fn detect_navigation_change(
        manager: &mut StateManager,
        id: EntryId,
        navigation: usize,
        discovered: &mut Vec<ObjectRef>,
    ) -> Result<()> {
        let entry = manager.internal(id)?;
        let current = entry.current_navigation(navigation);
        let snapshot = entry.relationship_snapshot_navigation(navigation);

        match (&current, &snapshot) {
            (NavigationSnapshot::Collection(live), NavigationSnapshot::Collection(before)) => {
                let added: Vec<ObjectRef> = live
                    .iter()
                    .filter(|o| !before.iter().any(|b| b.ptr_eq(o)))
                    .cloned()
                    .collect();
                let removed: Vec<ObjectRef> = before
                    .iter()
                    .filter(|o| !live.iter().any(|l| l.ptr_eq(o)))
                    .cloned()
                    .collect();
                if added.is_empty() && removed.is_empty() {
                    return Ok(());
                }
                event!(
                    Level::DEBUG,
                    entry = %id,
                    navigation,
                    added = added.len(),
                    removed = removed.len(),
                    "collection change detected"
                );
                for object in &added {
                    if manager.tracked_entry_for_object(object).is_none() {
                        discovered.push(object.clone());
                    }
                }
                manager.fire_collection_changed(id, navigation, &added, &removed)?;
            }
            _ => {
                let live = current.reference();
                let before = snapshot.reference();
                let same = match (live, before) {
                    (Some(a), Some(b)) => a.ptr_eq(b),
                    (None, None) => true,
                    _ => false,
                };
                if same {
                    return Ok(());
                }
                event!(Level::DEBUG, entry = %id, navigation, "reference change detected");
                if let Some(object) = live
                    && manager.tracked_entry_for_object(object).is_none()
                {
                    discovered.push(object.clone());
                }
                manager.fire_reference_changed(id, navigation, before, live)?;
            }
        }

        if manager.is_tracked(id) {
            manager
                .internal_mut(id)?
                .refresh_navigation_snapshot(navigation);
        }
        Ok(())
    }
}

impl StateManager {
    /// Scans all snapshot-tracked entries for changes.
    pub fn detect_changes(&mut self) -> Result<()> {
        ChangeDetector::detect_changes(self)
    }

    /// Scans a single entry; does not track newly reachable objects.
    pub fn detect_entry_changes(&mut self, id: EntryId) -> Result<()> {
        ChangeDetector::detect_entry(self, id)
    }
}
