// ============================================================================
// memotrack Library
// ============================================================================
//
// Change tracking and identity management for an object-relational
// persistence layer: an identity map per key, a per-entry state machine,
// snapshot-based change detection and navigation fixup across object graphs.
//
// ============================================================================

pub mod config;
pub mod core;
pub mod keys;
pub mod metadata;
pub mod object;
pub mod prelude;
pub mod tracking;

// Re-export main types for convenience
pub use config::TrackerConfig;
pub use core::{DataType, Result, TrackingError, Value};
pub use keys::KeyValue;
pub use metadata::{
    ChangeTrackingStrategy, DeleteBehavior, EntityType, Model, ModelBuilder, PropertyBuilder,
    SaveBehavior,
};
pub use object::{ObjectRef, PropertyAccessor, SlotAccessor};
pub use tracking::{
    ChangePersister, EntityEntry, EntityState, EntryId, EntryUpdate, PersistOutcome, StateManager,
    StoreGeneratedValue,
};
