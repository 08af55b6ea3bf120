//! Everything an application needs to declare a model and track objects.
//!
//! ```
//! use memotrack::prelude::*;
//!
//! let mut builder = ModelBuilder::new();
//! builder
//!     .entity("Tag")
//!     .property(PropertyBuilder::new("Id", DataType::Integer))
//!     .property(PropertyBuilder::new("Label", DataType::Text))
//!     .key(&["Id"]);
//! let model = builder.build().unwrap();
//!
//! let mut manager = StateManager::new(model.clone());
//! let tag = model.create_object("Tag").unwrap();
//! tag.set("Id", 1).unwrap();
//! let id = manager.attach(&tag).unwrap();
//! assert_eq!(manager.state(id).unwrap(), EntityState::Unchanged);
//! ```

pub use crate::config::TrackerConfig;
pub use crate::core::{DataType, Result, TrackingError, Value};
pub use crate::metadata::{
    ChangeTrackingStrategy, DeleteBehavior, Model, ModelBuilder, PropertyBuilder, SaveBehavior,
};
pub use crate::object::ObjectRef;
pub use crate::tracking::{
    ChangePersister, EntityEntry, EntityState, EntryId, EntryUpdate, PersistOutcome, SidecarKind,
    StateManager, StoreGeneratedValue,
};
