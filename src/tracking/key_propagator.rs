use super::entry::EntryId;
use super::state_manager::StateManager;
use crate::core::{Result, Value};

/// Derives a dependent's foreign-key value from its principal.
pub struct KeyPropagator;

impl KeyPropagator {
    /// Tries, in order: the principal referenced by the dependent's
    /// navigation; a principal whose navigation lists the dependent; for an
    /// identifying foreign key, a freshly generated value. Returns the value
    /// and whether it is temporary, or `None` to leave the default in place.
    pub fn propagate_value(
        manager: &mut StateManager,
        dependent: EntryId,
        property: usize,
    ) -> Result<Option<(Value, bool)>> {
        let model = manager.model().clone();
        let entry = manager.internal(dependent)?;
        let entity_type = entry.entity_type.clone();
        let object = entry.object();
        let prop = entity_type.property_at(property);

        for fk_id in prop.foreign_keys() {
            let fk = model.foreign_key(*fk_id);
            let Some(position) = fk.property_position(property) else {
                continue;
            };
            let principal_property = model.key(fk.principal_key()).properties()[position];

            let mut principal = None;
            if let (Some(object), Some(navigation)) = (&object, fk.dependent_to_principal())
                && let Some(target) = object.navigation_reference(navigation)
            {
                principal = manager.tracked_entry_for_object(&target);
            }
            if principal.is_none()
                && let (Some(object), Some(navigation)) = (&object, fk.principal_to_dependent())
            {
                principal = manager
                    .entries
                    .values()
                    .filter(|e| e.state.is_tracked() && e.entity_type.id() == fk.principal_type())
                    .find(|e| {
                        e.object().is_some_and(|p| {
                            p.collection_contains(navigation, object)
                                || p.navigation_reference(navigation)
                                    .is_some_and(|d| d.ptr_eq(object))
                        })
                    })
                    .map(|e| e.id);
            }

            if let Some(principal) = principal {
                let entry = manager.internal(principal)?;
                let value = entry.current_value(principal_property);
                if !value.is_null() {
                    return Ok(Some((value, entry.is_temporary(principal_property))));
                }
            }
        }

        let identifying = prop.is_primary_key()
            && prop
                .foreign_keys()
                .iter()
                .any(|fk| model.foreign_key(*fk).is_identifying());
        if identifying && let Some(generator) = manager.value_generators.select_for_key(prop) {
            return Ok(Some((
                generator.next(prop)?,
                generator.generates_temporary_values(),
            )));
        }
        Ok(None)
    }
}
