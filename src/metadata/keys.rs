use serde::{Deserialize, Serialize};

use super::{EntityTypeId, ForeignKeyId, KeyId};

#[derive(Debug, Clone)]
pub struct Key {
    pub(crate) id: KeyId,
    pub(crate) declaring_type: EntityTypeId,
    pub(crate) properties: Vec<usize>,
    pub(crate) primary: bool,
    pub(crate) structural: bool,
}

impl Key {
    pub fn id(&self) -> KeyId {
        self.id
    }

    pub fn declaring_type(&self) -> EntityTypeId {
        self.declaring_type
    }

    /// Property ordinals of the declaring type, in key order.
    pub fn properties(&self) -> &[usize] {
        &self.properties
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_composite(&self) -> bool {
        self.properties.len() > 1
    }

    /// Any component is array-shaped and must be compared element-wise.
    pub fn is_structural(&self) -> bool {
        self.structural
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteBehavior {
    /// Deleting the principal deletes its dependents.
    Cascade,
    /// Dependents keep living with their foreign key nulled.
    ClientSetNull,
    /// Dependents are left untouched; the store is expected to reject the delete.
    Restrict,
}

#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub(crate) id: ForeignKeyId,
    pub(crate) dependent_type: EntityTypeId,
    pub(crate) properties: Vec<usize>,
    pub(crate) principal_type: EntityTypeId,
    pub(crate) principal_key: KeyId,
    pub(crate) unique: bool,
    pub(crate) required: bool,
    pub(crate) delete_behavior: DeleteBehavior,
    pub(crate) identifying: bool,
    pub(crate) dependent_to_principal: Option<usize>,
    pub(crate) principal_to_dependent: Option<usize>,
}

impl ForeignKey {
    pub fn id(&self) -> ForeignKeyId {
        self.id
    }

    pub fn dependent_type(&self) -> EntityTypeId {
        self.dependent_type
    }

    /// Dependent property ordinals, positionally matched to the principal key.
    pub fn properties(&self) -> &[usize] {
        &self.properties
    }

    pub fn principal_type(&self) -> EntityTypeId {
        self.principal_type
    }

    pub fn principal_key(&self) -> KeyId {
        self.principal_key
    }

    /// One-to-one: a principal may be claimed by at most one dependent.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn delete_behavior(&self) -> DeleteBehavior {
        self.delete_behavior
    }

    /// The dependent's primary key is wholly or partly made of this foreign key.
    pub fn is_identifying(&self) -> bool {
        self.identifying
    }

    pub fn is_self_referencing(&self) -> bool {
        self.dependent_type == self.principal_type
    }

    /// Navigation index on the dependent type pointing at the principal.
    pub fn dependent_to_principal(&self) -> Option<usize> {
        self.dependent_to_principal
    }

    /// Navigation index on the principal type pointing at the dependent(s).
    pub fn principal_to_dependent(&self) -> Option<usize> {
        self.principal_to_dependent
    }

    pub fn property_position(&self, property: usize) -> Option<usize> {
        self.properties.iter().position(|p| *p == property)
    }
}
