// ============================================================================
// Key Values
// ============================================================================
//
// Identity and foreign-key values, single or composite, plus the factories
// that build them from an entry or a row buffer. Factories are selected once
// per key definition and cached in a `KeyValueFactorySource`.
//
// ============================================================================

pub mod factory;
pub mod key_value;

pub use factory::{
    CompositeKeyValueFactory, KeyValueFactory, KeyValueFactorySource, SimpleKeyValueFactory,
};
pub use key_value::KeyValue;
