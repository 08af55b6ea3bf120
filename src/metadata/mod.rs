// ============================================================================
// Mapping metadata: entity types, keys, foreign keys, navigations
// ============================================================================

pub mod entity_type;
pub mod keys;
pub mod model;

use serde::{Deserialize, Serialize};

pub use entity_type::{
    ChangeTrackingStrategy, EntityType, Navigation, Property, SaveBehavior, ValueGenerated,
};
pub use keys::{DeleteBehavior, ForeignKey, Key};
pub use model::{EntityTypeBuilder, ForeignKeyBuilder, Model, ModelBuilder, PropertyBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityTypeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForeignKeyId(pub usize);
