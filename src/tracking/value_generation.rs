use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use uuid::Uuid;

use crate::core::{DataType, Result, TrackingError, Value};
use crate::metadata::{EntityTypeId, Property};

/// Produces values for properties entering the Added state.
pub trait ValueGenerator: fmt::Debug {
    fn next(&self, property: &Property) -> Result<Value>;

    /// Temporary values are placeholders the store replaces on save.
    fn generates_temporary_values(&self) -> bool;
}

/// Yields -1, -2, ... as temporary integer keys.
#[derive(Debug, Default)]
pub struct TemporaryIntegerValueGenerator {
    current: Cell<i64>,
}

impl TemporaryIntegerValueGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValueGenerator for TemporaryIntegerValueGenerator {
    fn next(&self, _property: &Property) -> Result<Value> {
        let next = self.current.get() - 1;
        self.current.set(next);
        Ok(Value::Integer(next))
    }

    fn generates_temporary_values(&self) -> bool {
        true
    }
}

/// Random v4 UUIDs; Text properties receive the hyphenated string form.
#[derive(Debug, Default)]
pub struct UuidValueGenerator;

impl ValueGenerator for UuidValueGenerator {
    fn next(&self, property: &Property) -> Result<Value> {
        let id = Uuid::new_v4();
        match property.data_type() {
            DataType::Uuid => Ok(Value::Uuid(id)),
            DataType::Text => Ok(Value::Text(id.to_string())),
            other => Err(TrackingError::TypeMismatch(format!(
                "cannot generate a UUID for '{}' of type {}",
                property.name(),
                other
            ))),
        }
    }

    fn generates_temporary_values(&self) -> bool {
        false
    }
}

/// Picks the generator for a property: a registered override first, then a
/// built-in one by data type (key properties only).
#[derive(Debug)]
pub struct ValueGeneratorSelector {
    custom: HashMap<(EntityTypeId, usize), Rc<dyn ValueGenerator>>,
    integers: Rc<TemporaryIntegerValueGenerator>,
    uuids: Rc<UuidValueGenerator>,
}

impl Default for ValueGeneratorSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueGeneratorSelector {
    pub fn new() -> Self {
        Self {
            custom: HashMap::new(),
            integers: Rc::new(TemporaryIntegerValueGenerator::new()),
            uuids: Rc::new(UuidValueGenerator),
        }
    }

    pub fn register(&mut self, entity_type: EntityTypeId, property: usize, generator: Rc<dyn ValueGenerator>) {
        self.custom.insert((entity_type, property), generator);
    }

    pub fn select(&self, property: &Property) -> Option<Rc<dyn ValueGenerator>> {
        if let Some(custom) = self
            .custom
            .get(&(property.declaring_type(), property.index()))
        {
            return Some(custom.clone());
        }
        if property.is_key() {
            return self.select_for_key(property);
        }
        None
    }

    pub fn select_for_key(&self, property: &Property) -> Option<Rc<dyn ValueGenerator>> {
        if let Some(custom) = self
            .custom
            .get(&(property.declaring_type(), property.index()))
        {
            return Some(custom.clone());
        }
        match property.data_type() {
            DataType::Integer => Some(self.integers.clone()),
            DataType::Uuid | DataType::Text => Some(self.uuids.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ModelBuilder, PropertyBuilder};

    #[test]
    fn test_builtin_generators() {
        let mut builder = ModelBuilder::new();
        builder
            .entity("Doc")
            .property(PropertyBuilder::new("Id", DataType::Integer).value_generated_on_add())
            .property(PropertyBuilder::new("Ref", DataType::Uuid).value_generated_on_add())
            .property(PropertyBuilder::new("Stamp", DataType::Integer).value_generated_on_add())
            .key(&["Id"])
            .alternate_key(&["Ref"]);
        let model = builder.build().unwrap();
        let doc = model.find_entity_type("Doc").unwrap();
        let selector = ValueGeneratorSelector::new();

        let ids = selector.select(doc.property_at(0)).unwrap();
        assert!(ids.generates_temporary_values());
        assert_eq!(ids.next(doc.property_at(0)).unwrap(), Value::Integer(-1));
        assert_eq!(ids.next(doc.property_at(0)).unwrap(), Value::Integer(-2));

        let uuids = selector.select(doc.property_at(1)).unwrap();
        assert!(!uuids.generates_temporary_values());
        assert!(matches!(uuids.next(doc.property_at(1)).unwrap(), Value::Uuid(_)));

        // Non-key properties need an explicit generator.
        assert!(selector.select(doc.property_at(2)).is_none());
    }

    #[test]
    fn test_registered_generator_wins() {
        #[derive(Debug)]
        struct Fixed;
        impl ValueGenerator for Fixed {
            fn next(&self, _property: &Property) -> Result<Value> {
                Ok(Value::Integer(42))
            }
            fn generates_temporary_values(&self) -> bool {
                false
            }
        }

        let mut builder = ModelBuilder::new();
        builder
            .entity("Doc")
            .property(PropertyBuilder::new("Id", DataType::Integer).value_generated_on_add())
            .property(PropertyBuilder::new("Stamp", DataType::Integer).value_generated_on_add())
            .key(&["Id"]);
        let model = builder.build().unwrap();
        let doc = model.find_entity_type("Doc").unwrap();
        let mut selector = ValueGeneratorSelector::new();
        selector.register(doc.id(), 1, Rc::new(Fixed));

        let stamp = selector.select(doc.property_at(1)).unwrap();
        assert_eq!(stamp.next(doc.property_at(1)).unwrap(), Value::Integer(42));
    }
}
