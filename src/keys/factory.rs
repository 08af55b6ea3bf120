use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::KeyValue;
use crate::core::Value;
use crate::metadata::{Key, KeyId};

/// Builds key values for one key definition.
pub trait KeyValueFactory: fmt::Debug {
    fn key(&self) -> KeyId;

    /// Property ordinals the key is made of, in key order.
    fn properties(&self) -> &[usize];

    /// Builds a key value from components already in key order.
    fn create(&self, values: Vec<Value>) -> KeyValue;

    /// Builds a key value from a row buffer laid out in property order.
    fn create_from_buffer(&self, buffer: &[Value]) -> KeyValue {
        let values = self
            .properties()
            .iter()
            .map(|p| buffer.get(*p).cloned().unwrap_or(Value::Null))
            .collect();
        self.create(values)
    }
}

#[derive(Debug)]
pub struct SimpleKeyValueFactory {
    key: KeyId,
    properties: [usize; 1],
}

impl SimpleKeyValueFactory {
    pub fn new(key: KeyId, property: usize) -> Self {
        Self {
            key,
            properties: [property],
        }
    }
}

impl KeyValueFactory for SimpleKeyValueFactory {
    fn key(&self) -> KeyId {
        self.key
    }

    fn properties(&self) -> &[usize] {
        &self.properties
    }

    fn create(&self, mut values: Vec<Value>) -> KeyValue {
        match values.pop() {
            Some(value) if values.is_empty() && !value.is_null() => KeyValue::Simple {
                key: self.key,
                value,
            },
            _ => KeyValue::Invalid { key: self.key },
        }
    }
}

/// Multi-property keys, and single-property keys over array-shaped values.
#[derive(Debug)]
pub struct CompositeKeyValueFactory {
    key: KeyId,
    properties: Vec<usize>,
}

impl CompositeKeyValueFactory {
    pub fn new(key: KeyId, properties: Vec<usize>) -> Self {
        Self { key, properties }
    }
}

impl KeyValueFactory for CompositeKeyValueFactory {
    fn key(&self) -> KeyId {
        self.key
    }

    fn properties(&self) -> &[usize] {
        &self.properties
    }

    fn create(&self, values: Vec<Value>) -> KeyValue {
        if values.len() != self.properties.len() || values.iter().any(Value::is_null) {
            return KeyValue::Invalid { key: self.key };
        }
        KeyValue::Composite {
            key: self.key,
            values,
        }
    }
}

/// Per-state-manager cache of key value factories.
#[derive(Debug, Default)]
pub struct KeyValueFactorySource {
    factories: RefCell<HashMap<KeyId, Rc<dyn KeyValueFactory>>>,
}

impl KeyValueFactorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Key) -> Rc<dyn KeyValueFactory> {
        if let Some(factory) = self.factories.borrow().get(&key.id()) {
            return factory.clone();
        }
        let factory: Rc<dyn KeyValueFactory> = if key.is_composite() || key.is_structural() {
            Rc::new(CompositeKeyValueFactory::new(
                key.id(),
                key.properties().to_vec(),
            ))
        } else {
            Rc::new(SimpleKeyValueFactory::new(key.id(), key.properties()[0]))
        };
        self.factories.borrow_mut().insert(key.id(), factory.clone());
        factory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::metadata::{ModelBuilder, PropertyBuilder};

    #[test]
    fn test_factory_selection_and_caching() {
        let mut builder = ModelBuilder::new();
        builder
            .entity("Blob")
            .property(PropertyBuilder::new("Hash", DataType::Bytes).required())
            .property(PropertyBuilder::new("Id", DataType::Integer))
            .property(PropertyBuilder::new("Part", DataType::Integer))
            .key(&["Hash"])
            .alternate_key(&["Id"])
            .alternate_key(&["Id", "Part"]);
        let model = builder.build().unwrap();
        let blob = model.find_entity_type("Blob").unwrap();
        let source = KeyValueFactorySource::new();

        let binary = source.get(model.key(blob.keys()[0]));
        let simple = source.get(model.key(blob.keys()[1]));
        let composite = source.get(model.key(blob.keys()[2]));

        let buffer = vec![
            Value::Bytes(vec![0xAB]),
            Value::Integer(1),
            Value::Integer(2),
        ];
        assert!(matches!(
            binary.create_from_buffer(&buffer),
            KeyValue::Composite { .. }
        ));
        assert!(matches!(
            simple.create_from_buffer(&buffer),
            KeyValue::Simple { .. }
        ));
        assert_eq!(
            composite.create_from_buffer(&buffer).values(),
            &[Value::Integer(1), Value::Integer(2)]
        );

        assert!(Rc::ptr_eq(&simple, &source.get(model.key(blob.keys()[1]))));
    }

    #[test]
    fn test_null_component_is_invalid() {
        let simple = SimpleKeyValueFactory::new(KeyId(0), 0);
        assert!(!simple.create(vec![Value::Null]).is_valid());
        assert!(simple.create(vec![Value::Integer(0)]).is_valid());

        let composite = CompositeKeyValueFactory::new(KeyId(1), vec![0, 1]);
        assert!(!composite.create(vec![Value::Integer(1), Value::Null]).is_valid());
        assert!(!composite.create_from_buffer(&[Value::Integer(1)]).is_valid());
    }
}
