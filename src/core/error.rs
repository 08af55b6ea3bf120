use thiserror::Error;

use crate::tracking::EntityState;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error(
        "The instance of entity type '{entity_type}' cannot be tracked because another instance with the key value {key} is already being tracked"
    )]
    IdentityConflict { entity_type: String, key: String },

    #[error("Unable to track an entity of type '{entity_type}' because its key {key} has a null component")]
    InvalidKey { entity_type: String, key: String },

    #[error(
        "The property '{entity_type}.{property}' is read-only before save and must not be given a value when the entity is added"
    )]
    ReadOnlyBeforeSave { entity_type: String, property: String },

    #[error(
        "The property '{entity_type}.{property}' is read-only after save and cannot be modified once the entity exists in the store"
    )]
    ReadOnlyAfterSave { entity_type: String, property: String },

    #[error(
        "The property '{entity_type}.{property}' is part of a key and cannot be modified once the entity is tracked"
    )]
    KeyMutation { entity_type: String, property: String },

    #[error(
        "The property '{entity_type}.{property}' has a temporary value while attempting to change the entity's state to '{state}'"
    )]
    TemporaryValue {
        entity_type: String,
        property: String,
        state: EntityState,
    },

    #[error(
        "The association between entity types '{principal}' and '{dependent}' has been severed, but the relationship is required and does not cascade"
    )]
    ConceptualNull { dependent: String, principal: String },

    #[error("The property '{entity_type}.{property}' is not nullable and cannot be set to null")]
    NullValue { entity_type: String, property: String },

    #[error("The {sidecar} sidecar cannot store a value for property '{property}'")]
    SidecarCannotStore { sidecar: String, property: String },

    #[error("Entity type '{0}' not found")]
    UnknownEntityType(String),

    #[error("Property '{1}' not found on entity type '{0}'")]
    UnknownProperty(String, String),

    #[error("Navigation '{1}' not found on entity type '{0}'")]
    UnknownNavigation(String, String),

    #[error("Entry {0} not found")]
    EntryNotFound(String),

    #[error("Entry {0} belongs to a different state manager")]
    ForeignEntry(String),

    #[error("The object of entry {0} has been dropped")]
    ObjectDropped(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, TrackingError>;
