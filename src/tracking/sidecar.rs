// ============================================================================
// Sidecars
// ============================================================================
//
// Named overlay stores attached to an entry. An entry holds at most one
// sidecar of each kind. Removing a sidecar without committing it discards
// its values; committing writes them back into the entry's main storage.
//
// Transparent sidecars sit in front of the entry's ordinary read/write path
// for the properties they cover.
//
// ============================================================================

use std::collections::HashMap;
use std::fmt;

use crate::core::{Result, TrackingError, Value};
use crate::metadata::{EntityType, Property};
use crate::object::ObjectRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SidecarKind {
    /// Last-known persisted values; baseline for dirty detection.
    OriginalValues,
    /// Last-known key, foreign-key and navigation values; the "before" side of fixup.
    RelationshipSnapshot,
    /// Provisional values the store assigns during a save.
    StoreGeneratedValues,
}

impl SidecarKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OriginalValues => "OriginalValues",
            Self::RelationshipSnapshot => "RelationshipSnapshot",
            Self::StoreGeneratedValues => "StoreGeneratedValues",
        }
    }

    pub fn transparent_read(&self) -> bool {
        matches!(self, Self::StoreGeneratedValues)
    }

    pub fn transparent_write(&self) -> bool {
        matches!(self, Self::StoreGeneratedValues)
    }

    /// Committed automatically once the owning save completes.
    pub fn auto_commit(&self) -> bool {
        matches!(self, Self::StoreGeneratedValues)
    }

    pub fn can_store_value(&self, property: &Property) -> bool {
        match self {
            Self::OriginalValues => true,
            Self::RelationshipSnapshot => property.requires_relationship_snapshot(),
            Self::StoreGeneratedValues => property.may_be_store_generated(),
        }
    }

    pub fn can_store_navigations(&self) -> bool {
        matches!(self, Self::RelationshipSnapshot)
    }
}

impl fmt::Display for SidecarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A captured navigation value. Collections are copied into a fixed list so
/// later edits to the live collection show up on comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationSnapshot {
    Reference(Option<ObjectRef>),
    Collection(Vec<ObjectRef>),
}

impl NavigationSnapshot {
    pub fn reference(&self) -> Option<&ObjectRef> {
        match self {
            Self::Reference(target) => target.as_ref(),
            Self::Collection(_) => None,
        }
    }

    pub fn items(&self) -> &[ObjectRef] {
        match self {
            Self::Reference(Some(target)) => std::slice::from_ref(target),
            Self::Reference(None) => &[],
            Self::Collection(items) => items,
        }
    }

    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.items().iter().any(|o| o.ptr_eq(object))
    }
}

/// What a sidecar snapshots from: the entry's main storage.
pub trait SnapshotSource {
    fn entity_type(&self) -> &EntityType;
    fn snapshot_value(&self, property: usize) -> Value;
    fn snapshot_navigation(&self, navigation: usize) -> NavigationSnapshot;
}

#[derive(Debug, Clone)]
pub struct Sidecar {
    kind: SidecarKind,
    values: HashMap<usize, Value>,
    navigations: HashMap<usize, NavigationSnapshot>,
}

impl Sidecar {
    pub fn new(kind: SidecarKind) -> Self {
        Self {
            kind,
            values: HashMap::new(),
            navigations: HashMap::new(),
        }
    }

    pub fn kind(&self) -> SidecarKind {
        self.kind
    }

    pub fn can_store_value(&self, property: &Property) -> bool {
        self.kind.can_store_value(property)
    }

    pub fn has_value(&self, property: usize) -> bool {
        self.values.contains_key(&property)
    }

    pub fn get(&self, property: usize) -> Option<&Value> {
        self.values.get(&property)
    }

    pub fn set(&mut self, property: &Property, value: Value) -> Result<()> {
        if !self.can_store_value(property) {
            return Err(TrackingError::SidecarCannotStore {
                sidecar: self.kind.name().to_string(),
                property: property.name().to_string(),
            });
        }
        self.values.insert(property.index(), value);
        Ok(())
    }

    pub fn navigation(&self, navigation: usize) -> Option<&NavigationSnapshot> {
        self.navigations.get(&navigation)
    }

    pub fn navigation_mut(&mut self, navigation: usize) -> Option<&mut NavigationSnapshot> {
        self.navigations.get_mut(&navigation)
    }

    pub fn set_navigation(&mut self, navigation: usize, snapshot: NavigationSnapshot) {
        if self.kind.can_store_navigations() {
            self.navigations.insert(navigation, snapshot);
        }
    }

    /// Captures every property (and navigation) this sidecar can hold.
    pub fn take_snapshot(&mut self, source: &dyn SnapshotSource) {
        let entity_type = source.entity_type();
        for property in entity_type.properties() {
            if self.kind.can_store_value(property) {
                self.values
                    .insert(property.index(), source.snapshot_value(property.index()));
            }
        }
        if self.kind.can_store_navigations() {
            for navigation in entity_type.navigations() {
                self.navigations.insert(
                    navigation.index(),
                    source.snapshot_navigation(navigation.index()),
                );
            }
        }
    }

    pub fn take_property_snapshot(&mut self, source: &dyn SnapshotSource, property: usize) {
        if self.kind.can_store_value(source.entity_type().property_at(property)) {
            self.values.insert(property, source.snapshot_value(property));
        }
    }

    /// Snapshots `property` only when no baseline exists yet.
    pub fn ensure_snapshot(&mut self, source: &dyn SnapshotSource, property: usize) {
        if !self.has_value(property) {
            self.take_property_snapshot(source, property);
        }
    }

    /// Refreshes the values already held; never adds new ones.
    pub fn update_snapshot(&mut self, source: &dyn SnapshotSource) {
        for (property, value) in self.values.iter_mut() {
            *value = source.snapshot_value(*property);
        }
        for (navigation, snapshot) in self.navigations.iter_mut() {
            *snapshot = source.snapshot_navigation(*navigation);
        }
    }

    pub(crate) fn into_values(self) -> HashMap<usize, Value> {
        self.values
    }
}
