use std::fmt;

use crate::core::Value;
use crate::metadata::KeyId;

/// A key value bound to the key definition that produced it.
///
/// Values from different key definitions never compare equal, even when their
/// components do. Byte components compare element-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    Simple { key: KeyId, value: Value },
    Composite { key: KeyId, values: Vec<Value> },
    /// At least one component was null; never used for lookup.
    Invalid { key: KeyId },
}

impl KeyValue {
    pub fn key(&self) -> KeyId {
        match self {
            Self::Simple { key, .. } | Self::Composite { key, .. } | Self::Invalid { key } => *key,
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid { .. })
    }

    pub fn values(&self) -> &[Value] {
        match self {
            Self::Simple { value, .. } => std::slice::from_ref(value),
            Self::Composite { values, .. } => values,
            Self::Invalid { .. } => &[],
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple { value, .. } => write!(f, "{}", value),
            Self::Composite { values, .. } => {
                write!(f, "(")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, ")")
            }
            Self::Invalid { .. } => write!(f, "<invalid>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(key: &KeyValue) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_composite_equality_is_structural() {
        let a = KeyValue::Composite {
            key: KeyId(3),
            values: vec![Value::Integer(1), Value::Bytes(vec![1, 2, 3])],
        };
        let b = KeyValue::Composite {
            key: KeyId(3),
            values: vec![Value::Integer(1), Value::Bytes(vec![1, 2, 3])],
        };
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let other_element = KeyValue::Composite {
            key: KeyId(3),
            values: vec![Value::Integer(1), Value::Bytes(vec![1, 2, 4])],
        };
        let other_length = KeyValue::Composite {
            key: KeyId(3),
            values: vec![Value::Integer(1)],
        };
        let other_key = KeyValue::Composite {
            key: KeyId(4),
            values: vec![Value::Integer(1), Value::Bytes(vec![1, 2, 3])],
        };
        assert_ne!(a, other_element);
        assert_ne!(a, other_length);
        assert_ne!(a, other_key);
    }

    #[test]
    fn test_display() {
        let simple = KeyValue::Simple {
            key: KeyId(0),
            value: Value::Integer(7),
        };
        assert_eq!(simple.to_string(), "7");
        assert_eq!(simple.values(), &[Value::Integer(7)]);

        let composite = KeyValue::Composite {
            key: KeyId(0),
            values: vec![Value::Integer(7), Value::from("x")],
        };
        assert_eq!(composite.to_string(), "(7, 'x')");
        assert!(!KeyValue::Invalid { key: KeyId(0) }.is_valid());
    }
}
