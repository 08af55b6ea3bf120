use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{EntityTypeId, ForeignKeyId, KeyId};
use crate::core::{DataType, Result, TrackingError, Value};
use crate::object::PropertyAccessor;

/// When the store (or a client-side generator) supplies a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ValueGenerated {
    #[default]
    Never,
    OnAdd,
    OnAddOrUpdate,
}

/// What happens to a property value when the entity is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SaveBehavior {
    #[default]
    Save,
    Ignore,
    Throw,
}

/// How changes to instances of an entity type are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ChangeTrackingStrategy {
    /// Plain objects: changes are found by comparing against snapshots.
    #[default]
    Snapshot,
    /// Objects route every edit through the state manager, which notifies immediately.
    ChangedNotifications,
}

pub struct Property {
    pub(crate) name: String,
    pub(crate) index: usize,
    pub(crate) declaring_type: EntityTypeId,
    pub(crate) data_type: DataType,
    pub(crate) nullable: bool,
    pub(crate) shadow: bool,
    pub(crate) value_generated: ValueGenerated,
    pub(crate) before_save: SaveBehavior,
    pub(crate) after_save: SaveBehavior,
    pub(crate) concurrency_token: bool,
    pub(crate) accessor: Arc<dyn PropertyAccessor>,
    pub(crate) primary_key: bool,
    pub(crate) keys: Vec<KeyId>,
    pub(crate) foreign_keys: Vec<ForeignKeyId>,
}

impl Property {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordinal of the property in its entity type; also its row-buffer position.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn declaring_type(&self) -> EntityTypeId {
        self.declaring_type
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Shadow properties live only in the entry, never on the object.
    pub fn is_shadow(&self) -> bool {
        self.shadow
    }

    pub fn value_generated(&self) -> ValueGenerated {
        self.value_generated
    }

    pub fn before_save_behavior(&self) -> SaveBehavior {
        self.before_save
    }

    pub fn after_save_behavior(&self) -> SaveBehavior {
        self.after_save
    }

    pub fn is_concurrency_token(&self) -> bool {
        self.concurrency_token
    }

    pub fn accessor(&self) -> &Arc<dyn PropertyAccessor> {
        &self.accessor
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Part of the primary key or of any alternate key.
    pub fn is_key(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn keys(&self) -> &[KeyId] {
        &self.keys
    }

    pub fn is_foreign_key(&self) -> bool {
        !self.foreign_keys.is_empty()
    }

    /// Every foreign key this property participates in; may be more than one.
    pub fn foreign_keys(&self) -> &[ForeignKeyId] {
        &self.foreign_keys
    }

    pub fn default_value(&self) -> Value {
        self.data_type.default_value(self.nullable)
    }

    pub fn requires_relationship_snapshot(&self) -> bool {
        self.is_key() || self.is_foreign_key()
    }

    pub fn may_be_store_generated(&self) -> bool {
        self.value_generated != ValueGenerated::Never || self.is_foreign_key()
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("data_type", &self.data_type)
            .field("nullable", &self.nullable)
            .field("shadow", &self.shadow)
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

/// An object-valued or collection-valued property tied to a foreign key.
#[derive(Debug, Clone)]
pub struct Navigation {
    pub(crate) name: String,
    pub(crate) index: usize,
    pub(crate) declaring_type: EntityTypeId,
    pub(crate) target_type: EntityTypeId,
    pub(crate) foreign_key: ForeignKeyId,
    pub(crate) points_to_principal: bool,
    pub(crate) collection: bool,
}

impl Navigation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn declaring_type(&self) -> EntityTypeId {
        self.declaring_type
    }

    pub fn target_type(&self) -> EntityTypeId {
        self.target_type
    }

    pub fn foreign_key(&self) -> ForeignKeyId {
        self.foreign_key
    }

    /// True on the dependent side (`product.Category`), false on the principal side.
    pub fn points_to_principal(&self) -> bool {
        self.points_to_principal
    }

    pub fn is_collection(&self) -> bool {
        self.collection
    }
}

#[derive(Debug)]
pub struct EntityType {
    pub(crate) id: EntityTypeId,
    pub(crate) name: String,
    pub(crate) properties: Vec<Property>,
    pub(crate) primary_key: KeyId,
    pub(crate) keys: Vec<KeyId>,
    pub(crate) foreign_keys: Vec<ForeignKeyId>,
    pub(crate) referencing_foreign_keys: Vec<ForeignKeyId>,
    pub(crate) navigations: Vec<Navigation>,
    pub(crate) change_tracking: ChangeTrackingStrategy,
}

impl EntityType {
    pub fn id(&self) -> EntityTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property_at(&self, index: usize) -> &Property {
        &self.properties[index]
    }

    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property(&self, name: &str) -> Result<&Property> {
        self.find_property(name)
            .ok_or_else(|| TrackingError::UnknownProperty(self.name.clone(), name.to_string()))
    }

    pub fn primary_key(&self) -> KeyId {
        self.primary_key
    }

    /// Primary key first, then alternate keys.
    pub fn keys(&self) -> &[KeyId] {
        &self.keys
    }

    /// Foreign keys declared on this type (this type is the dependent).
    pub fn foreign_keys(&self) -> &[ForeignKeyId] {
        &self.foreign_keys
    }

    /// Foreign keys targeting one of this type's keys (this type is the principal).
    pub fn referencing_foreign_keys(&self) -> &[ForeignKeyId] {
        &self.referencing_foreign_keys
    }

    pub fn navigations(&self) -> &[Navigation] {
        &self.navigations
    }

    pub fn navigation_at(&self, index: usize) -> &Navigation {
        &self.navigations[index]
    }

    pub fn navigation(&self, name: &str) -> Result<&Navigation> {
        self.navigations
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| TrackingError::UnknownNavigation(self.name.clone(), name.to_string()))
    }

    pub fn change_tracking(&self) -> ChangeTrackingStrategy {
        self.change_tracking
    }

    pub fn has_shadow_properties(&self) -> bool {
        self.properties.iter().any(|p| p.shadow)
    }
}
