// ============================================================================
// Tracking
// ============================================================================
//
// The unit of work: entries and their state machine, sidecars, the state
// manager with its identity maps, and the listeners that keep the object
// graph consistent (change detector, navigation fixer).
//
// ============================================================================

pub mod change_detector;
pub mod entry;
pub mod key_propagator;
pub mod listeners;
pub mod navigation_fixer;
pub mod save;
pub mod sidecar;
pub mod state;
pub mod state_manager;
pub mod transitions;
pub mod value_generation;

pub use change_detector::ChangeDetector;
pub use entry::{EntityEntry, EntryId, EntryKind, InternalEntityEntry};
pub use key_propagator::KeyPropagator;
pub use listeners::{
    EntityStateListener, ForeignKeyListener, KeyListener, ListenerSet, NavigationListener,
    PropertyListener,
};
pub use navigation_fixer::NavigationFixer;
pub use save::{ChangePersister, EntryUpdate, PersistOutcome, StoreGeneratedValue};
pub use sidecar::{NavigationSnapshot, Sidecar, SidecarKind, SnapshotSource};
pub use state::{EntityState, PropertyFlag, StateData, StateManagerId};
pub use state_manager::StateManager;
pub use transitions::StateChange;
pub use value_generation::{
    TemporaryIntegerValueGenerator, UuidValueGenerator, ValueGenerator, ValueGeneratorSelector,
};
