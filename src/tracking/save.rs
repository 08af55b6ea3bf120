// ============================================================================
// Save Pipeline
// ============================================================================
//
// SaveChanges hands every pending entry (Added, Modified, Deleted) to an
// external persister as a batch of `EntryUpdate`s. On success the values the
// store generated are merged back through the store-generated sidecar, which
// then commits; with `accept_all_changes_on_success` the entries are accepted.
// On failure the sidecars are rolled back and no entry changes state.
//
// ============================================================================

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use tracing::{Level, event, info_span};

use super::entry::EntryId;
use super::sidecar::SidecarKind;
use super::state::{EntityState, PropertyFlag};
use super::state_manager::StateManager;
use super::transitions::WriteMode;
use crate::core::{Result, TrackingError, Value};
use crate::metadata::{SaveBehavior, ValueGenerated};

/// One pending entry as the persistence layer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub entity_type: String,
    pub state: EntityState,
    /// Primary key, property name to value.
    pub key: Vec<(String, Value)>,
    /// Values to write: every saved property when Added, the modified ones when Modified.
    pub values: Vec<(String, Value)>,
    pub modified: Vec<String>,
    /// Original values of concurrency tokens, for optimistic checks.
    pub original_values: Vec<(String, Value)>,
    /// Properties the store is expected to supply.
    pub store_generated: Vec<String>,
}

/// A value the store assigned to `property` of the update at `index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreGeneratedValue {
    pub index: usize,
    pub property: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistOutcome {
    pub store_generated: Vec<StoreGeneratedValue>,
}

/// The persistence collaborator: turns updates into store operations.
#[async_trait(?Send)]
pub trait ChangePersister {
    async fn persist(&self, updates: &[EntryUpdate]) -> Result<PersistOutcome>;
}

impl StateManager {
    /// Persists every pending entry and returns how many were processed.
    pub async fn save_changes(
        &mut self,
        persister: &dyn ChangePersister,
        accept_all_changes_on_success: bool,
    ) -> Result<usize> {
        let span = info_span!(
            "save_changes",
            manager = %self.id(),
            accept = accept_all_changes_on_success
        );
        let _enter = span.enter();

        if self.config().auto_detect_changes {
            self.detect_changes()?;
        }
        self.handle_all_conceptual_nulls()?;

        let pending: Vec<EntryId> = self
            .entries
            .values()
            .filter(|e| e.state.is_pending())
            .map(|e| e.id)
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        for id in &pending {
            if let Err(err) = self.prepare_to_save(*id) {
                self.rollback_store_generated(&pending);
                return Err(err);
            }
        }
        let mut updates = Vec::with_capacity(pending.len());
        for id in &pending {
            updates.push(self.build_update(*id)?);
        }

        let outcome = match persister.persist(&updates).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.rollback_store_generated(&pending);
                event!(Level::ERROR, error = %err, entries = pending.len(), "save failed");
                return Err(err);
            }
        };

        for generated in outcome.store_generated {
            self.apply_store_generated(&pending, generated)?;
        }
        for id in &pending {
            if let Ok(entry) = self.internal_mut(*id) {
                entry.commit_sidecar(SidecarKind::StoreGeneratedValues);
            }
        }

        if accept_all_changes_on_success {
            self.ensure_no_temporary_values(&pending)?;
            for id in &pending {
                self.accept_changes(*id)?;
            }
        }
        event!(Level::INFO, entries = pending.len(), "changes saved");
        Ok(pending.len())
    }

    /// Validates read-only rules and attaches the store-generated sidecar
    /// when the store will supply values for this entry.
    fn prepare_to_save(&mut self, id: EntryId) -> Result<()> {
        let entry = self.internal(id)?;
        let entity_type = entry.entity_type.clone();
        let state = entry.state;
        let mut expects_store_values = false;

        for property in entity_type.properties() {
            let index = property.index();
            match state {
                EntityState::Added => {
                    let value = entry.current_value(index);
                    let temporary = entry.is_temporary(index);
                    if property.before_save_behavior() == SaveBehavior::Throw
                        && value != property.default_value()
                        && !temporary
                    {
                        return Err(TrackingError::ReadOnlyBeforeSave {
                            entity_type: entity_type.name().to_string(),
                            property: property.name().to_string(),
                        });
                    }
                    if value.is_null()
                        && !property.is_nullable()
                        && property.value_generated() == ValueGenerated::Never
                    {
                        return Err(TrackingError::NullValue {
                            entity_type: entity_type.name().to_string(),
                            property: property.name().to_string(),
                        });
                    }
                    if temporary || property.value_generated() != ValueGenerated::Never {
                        expects_store_values = true;
                    }
                }
                EntityState::Modified => {
                    if property.after_save_behavior() == SaveBehavior::Throw
                        && entry.is_modified(index)
                    {
                        return Err(TrackingError::ReadOnlyAfterSave {
                            entity_type: entity_type.name().to_string(),
                            property: property.name().to_string(),
                        });
                    }
                    if property.value_generated() == ValueGenerated::OnAddOrUpdate {
                        expects_store_values = true;
                    }
                }
                _ => {}
            }
        }

        if expects_store_values {
            self.internal_mut(id)?
                .add_sidecar(SidecarKind::StoreGeneratedValues);
        }
        Ok(())
    }

    fn build_update(&self, id: EntryId) -> Result<EntryUpdate> {
        let entry = self.internal(id)?;
        let entity_type = &entry.entity_type;
        let key = self.model().key(entity_type.primary_key());
        let named = |index: usize, value: Value| (entity_type.property_at(index).name().to_string(), value);

        let key_values = key
            .properties()
            .iter()
            .map(|p| named(*p, entry.current_value(*p)))
            .collect();

        let mut values = Vec::new();
        let mut modified = Vec::new();
        let mut original_values = Vec::new();
        let mut store_generated = Vec::new();
        for property in entity_type.properties() {
            let index = property.index();
            match entry.state {
                EntityState::Added => {
                    if property.before_save_behavior() != SaveBehavior::Ignore {
                        values.push(named(index, entry.current_value(index)));
                    }
                    if entry.is_temporary(index) || property.value_generated() != ValueGenerated::Never {
                        store_generated.push(property.name().to_string());
                    }
                }
                EntityState::Modified => {
                    if entry.is_modified(index) {
                        modified.push(property.name().to_string());
                        if property.after_save_behavior() != SaveBehavior::Ignore {
                            values.push(named(index, entry.current_value(index)));
                        }
                    }
                    if property.value_generated() == ValueGenerated::OnAddOrUpdate {
                        store_generated.push(property.name().to_string());
                    }
                }
                _ => {}
            }
            if property.is_concurrency_token()
                && matches!(entry.state, EntityState::Modified | EntityState::Deleted)
            {
                original_values.push(named(index, entry.original_value(index)));
            }
        }

        Ok(EntryUpdate {
            entity_type: entity_type.name().to_string(),
            state: entry.state,
            key: key_values,
            values,
            modified,
            original_values,
            store_generated,
        })
    }

    fn apply_store_generated(&mut self, pending: &[EntryId], generated: StoreGeneratedValue) -> Result<()> {
        let Some(id) = pending.get(generated.index).copied() else {
            warn!(
                "ignoring store-generated value for out-of-range update {} (batch of {})",
                generated.index,
                pending.len()
            );
            return Ok(());
        };
        let entry = self.internal(id)?;
        let entity_type = entry.entity_type.clone();
        let Some(property) = entity_type.find_property(&generated.property) else {
            warn!(
                "ignoring store-generated value for unknown property '{}.{}'",
                entity_type.name(),
                generated.property
            );
            return Ok(());
        };
        if property.is_primary_key() && entry.state != EntityState::Added {
            warn!(
                "ignoring store-generated key value for '{}.{}' of a persisted entity",
                entity_type.name(),
                property.name()
            );
            return Ok(());
        }
        event!(
            Level::TRACE,
            entry = %id,
            property = property.name(),
            "applying store-generated value"
        );
        self.set_property_internal(id, property.index(), generated.value, WriteMode::Notify)
    }

    fn rollback_store_generated(&mut self, pending: &[EntryId]) {
        for id in pending {
            if let Ok(entry) = self.internal_mut(*id) {
                entry.rollback_sidecar(SidecarKind::StoreGeneratedValues);
            }
        }
    }

    /// Every placeholder a pending entry still holds must have been replaced
    /// by the store (or by a principal's store value) before anything is
    /// accepted.
    fn ensure_no_temporary_values(&self, pending: &[EntryId]) -> Result<()> {
        for id in pending {
            let Ok(entry) = self.internal(*id) else {
                continue;
            };
            if !matches!(entry.state, EntityState::Added | EntityState::Modified) {
                continue;
            }
            if let Some(property) = entry.state_data.flagged(PropertyFlag::Temporary).first() {
                return Err(TrackingError::TemporaryValue {
                    entity_type: entry.entity_type.name().to_string(),
                    property: entry.entity_type.property_at(*property).name().to_string(),
                    state: EntityState::Unchanged,
                });
            }
        }
        Ok(())
    }

    /// Accepts every tracked entry: Deleted entries detach, Added and
    /// Modified ones become Unchanged with fresh baselines.
    pub fn accept_all_changes(&mut self) -> Result<()> {
        for id in self.tracked_ids() {
            if self.is_tracked(id) {
                self.accept_changes(id)?;
            }
        }
        Ok(())
    }

    pub fn accept_changes(&mut self, id: EntryId) -> Result<()> {
        match self.state(id)? {
            EntityState::Deleted => self.set_entity_state(id, EntityState::Detached),
            EntityState::Added | EntityState::Modified => {
                self.set_entity_state(id, EntityState::Unchanged)
            }
            EntityState::Unchanged | EntityState::Detached => Ok(()),
        }
    }
}
