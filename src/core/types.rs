use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Value;

/// CLR-style storage type of a declared property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    Bytes,
    Uuid,
}

impl DataType {
    pub fn is_compatible(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (Self::Integer, Value::Integer(_))
                | (Self::Float, Value::Float(_))
                | (Self::Text, Value::Text(_))
                | (Self::Boolean, Value::Boolean(_))
                | (Self::Bytes, Value::Bytes(_))
                | (Self::Uuid, Value::Uuid(_))
        )
    }

    /// Text and byte arrays are reference-shaped: their default is null.
    pub fn is_reference_type(&self) -> bool {
        matches!(self, Self::Text | Self::Bytes)
    }

    /// Keys over these types need structural comparison.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Bytes)
    }

    /// The value an unset property of this type holds.
    pub fn default_value(&self, nullable: bool) -> Value {
        if nullable || self.is_reference_type() {
            return Value::Null;
        }
        match self {
            Self::Integer => Value::Integer(0),
            Self::Float => Value::Float(0.0),
            Self::Boolean => Value::Boolean(false),
            Self::Uuid => Value::Uuid(Uuid::nil()),
            Self::Text | Self::Bytes => Value::Null,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Bytes => write!(f, "BYTES"),
            Self::Uuid => write!(f, "UUID"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_compatibility() {
        let int_type = DataType::Integer;
        assert!(int_type.is_compatible(&Value::Integer(42)));
        assert!(int_type.is_compatible(&Value::Null));
        assert!(!int_type.is_compatible(&Value::Text("hello".into())));
    }

    #[test]
    fn test_default_values() {
        assert_eq!(DataType::Integer.default_value(false), Value::Integer(0));
        assert_eq!(DataType::Integer.default_value(true), Value::Null);
        assert_eq!(DataType::Text.default_value(false), Value::Null);
        assert_eq!(DataType::Uuid.default_value(false), Value::Uuid(Uuid::nil()));
    }
}
