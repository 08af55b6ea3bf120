use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::core::{Result, TrackingError, Value};
use crate::metadata::{EntityType, Navigation};

/// Reads and writes one declared property on a materialized object.
///
/// Accessors are resolved once, when the model is built, so the tracking core
/// never needs to look a member up by name on the hot path.
pub trait PropertyAccessor: fmt::Debug + Send + Sync {
    fn get(&self, object: &ObjectRef) -> Value;
    fn set(&self, object: &ObjectRef, value: Value);
}

/// Default accessor: the value lives in the object's slot at the property ordinal.
#[derive(Debug, Clone, Copy)]
pub struct SlotAccessor {
    slot: usize,
}

impl SlotAccessor {
    pub fn new(slot: usize) -> Self {
        Self { slot }
    }
}

impl PropertyAccessor for SlotAccessor {
    fn get(&self, object: &ObjectRef) -> Value {
        object.slot(self.slot)
    }

    fn set(&self, object: &ObjectRef, value: Value) {
        object.set_slot(self.slot, value);
    }
}

#[derive(Clone)]
pub(crate) enum NavigationSlot {
    Reference(Option<ObjectRef>),
    Collection(Vec<ObjectRef>),
}

struct ObjectData {
    entity_type: Arc<EntityType>,
    slots: Vec<Value>,
    navigations: Vec<NavigationSlot>,
}

/// Pointer identity of a materialized object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

/// A materialized application object: scalar slots plus navigation slots.
///
/// Cloning an `ObjectRef` clones the handle, not the object. Equality and
/// hashing are by identity.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<ObjectData>>);

#[derive(Clone)]
pub struct WeakObjectRef(Weak<RefCell<ObjectData>>);

impl WeakObjectRef {
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakObjectRef(alive: {})", self.is_alive())
    }
}

impl ObjectRef {
    /// Creates an object whose properties hold their type defaults and whose
    /// navigations are empty.
    pub fn new(entity_type: &Arc<EntityType>) -> Self {
        let slots = entity_type
            .properties()
            .iter()
            .map(|p| p.default_value())
            .collect();
        let navigations = entity_type
            .navigations()
            .iter()
            .map(|n| {
                if n.is_collection() {
                    NavigationSlot::Collection(Vec::new())
                } else {
                    NavigationSlot::Reference(None)
                }
            })
            .collect();
        Self(Rc::new(RefCell::new(ObjectData {
            entity_type: entity_type.clone(),
            slots,
            navigations,
        })))
    }

    pub fn entity_type(&self) -> Arc<EntityType> {
        self.0.borrow().entity_type.clone()
    }

    pub fn id(&self) -> ObjectId {
        ObjectId(Rc::as_ptr(&self.0) as *const () as usize)
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Rc::downgrade(&self.0))
    }

    pub fn get(&self, property: &str) -> Result<Value> {
        let entity_type = self.entity_type();
        let property = entity_type.property(property)?;
        if property.is_shadow() {
            return Err(TrackingError::UnknownProperty(
                entity_type.name().to_string(),
                property.name().to_string(),
            ));
        }
        Ok(property.accessor().get(self))
    }

    /// Plain write; a snapshot-tracked entry picks it up on the next change detection.
    pub fn set(&self, property: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let entity_type = self.entity_type();
        let property = entity_type.property(property)?;
        if property.is_shadow() {
            return Err(TrackingError::UnknownProperty(
                entity_type.name().to_string(),
                property.name().to_string(),
            ));
        }
        if !property.data_type().is_compatible(&value) {
            return Err(TrackingError::TypeMismatch(format!(
                "cannot assign {} to '{}.{}' of type {}",
                value.type_name(),
                entity_type.name(),
                property.name(),
                property.data_type()
            )));
        }
        property.accessor().set(self, value);
        Ok(())
    }

    pub fn reference(&self, navigation: &str) -> Result<Option<ObjectRef>> {
        let index = self.navigation_index(navigation, false)?;
        Ok(self.navigation_reference(index))
    }

    pub fn set_reference(&self, navigation: &str, target: Option<&ObjectRef>) -> Result<()> {
        let index = self.navigation_index(navigation, false)?;
        if let Some(target) = target {
            self.check_target(index, target)?;
        }
        self.set_navigation_reference(index, target.cloned());
        Ok(())
    }

    pub fn collection(&self, navigation: &str) -> Result<Vec<ObjectRef>> {
        let index = self.navigation_index(navigation, true)?;
        Ok(self.navigation_collection(index))
    }

    /// Returns false if the item was already a member.
    pub fn add_to_collection(&self, navigation: &str, item: &ObjectRef) -> Result<bool> {
        let index = self.navigation_index(navigation, true)?;
        self.check_target(index, item)?;
        Ok(self.collection_add(index, item.clone()))
    }

    pub fn remove_from_collection(&self, navigation: &str, item: &ObjectRef) -> Result<bool> {
        let index = self.navigation_index(navigation, true)?;
        Ok(self.collection_remove(index, item))
    }

    fn navigation_index(&self, name: &str, collection: bool) -> Result<usize> {
        let entity_type = self.entity_type();
        let navigation = entity_type.navigation(name)?;
        if navigation.is_collection() != collection {
            return Err(TrackingError::TypeMismatch(format!(
                "navigation '{}.{}' is a {}",
                entity_type.name(),
                name,
                if navigation.is_collection() {
                    "collection"
                } else {
                    "reference"
                }
            )));
        }
        Ok(navigation.index())
    }

    fn check_target(&self, index: usize, target: &ObjectRef) -> Result<()> {
        let entity_type = self.entity_type();
        let navigation: &Navigation = entity_type.navigation_at(index);
        let target_type = target.entity_type();
        if target_type.id() != navigation.target_type() {
            return Err(TrackingError::TypeMismatch(format!(
                "navigation '{}.{}' cannot hold an instance of '{}'",
                entity_type.name(),
                navigation.name(),
                target_type.name()
            )));
        }
        Ok(())
    }

    pub(crate) fn slot(&self, slot: usize) -> Value {
        self.0
            .borrow()
            .slots
            .get(slot)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub(crate) fn set_slot(&self, slot: usize, value: Value) {
        if let Some(target) = self.0.borrow_mut().slots.get_mut(slot) {
            *target = value;
        }
    }

    pub(crate) fn navigation_reference(&self, index: usize) -> Option<ObjectRef> {
        match self.0.borrow().navigations.get(index) {
            Some(NavigationSlot::Reference(target)) => target.clone(),
            _ => None,
        }
    }

    pub(crate) fn set_navigation_reference(&self, index: usize, target: Option<ObjectRef>) {
        if let Some(NavigationSlot::Reference(slot)) = self.0.borrow_mut().navigations.get_mut(index)
        {
            *slot = target;
        }
    }

    pub(crate) fn navigation_collection(&self, index: usize) -> Vec<ObjectRef> {
        match self.0.borrow().navigations.get(index) {
            Some(NavigationSlot::Collection(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn collection_contains(&self, index: usize, item: &ObjectRef) -> bool {
        match self.0.borrow().navigations.get(index) {
            Some(NavigationSlot::Collection(items)) => items.iter().any(|i| i.ptr_eq(item)),
            _ => false,
        }
    }

    pub(crate) fn collection_add(&self, index: usize, item: ObjectRef) -> bool {
        match self.0.borrow_mut().navigations.get_mut(index) {
            Some(NavigationSlot::Collection(items)) => {
                if items.iter().any(|i| i.ptr_eq(&item)) {
                    false
                } else {
                    items.push(item);
                    true
                }
            }
            _ => false,
        }
    }

    pub(crate) fn collection_remove(&self, index: usize, item: &ObjectRef) -> bool {
        match self.0.borrow_mut().navigations.get_mut(index) {
            Some(NavigationSlot::Collection(items)) => {
                let before = items.len();
                items.retain(|i| !i.ptr_eq(item));
                items.len() != before
            }
            _ => false,
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl std::hash::Hash for ObjectRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(data) => f
                .debug_struct("ObjectRef")
                .field("type", &data.entity_type.name())
                .field("slots", &data.slots)
                .finish(),
            Err(_) => f.write_str("ObjectRef(<borrowed>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::metadata::{ModelBuilder, PropertyBuilder};

    fn model() -> Arc<crate::metadata::Model> {
        let mut builder = ModelBuilder::new();
        builder
            .entity("Category")
            .property(PropertyBuilder::new("Id", DataType::Integer))
            .property(PropertyBuilder::new("Name", DataType::Text))
            .key(&["Id"]);
        builder
            .entity("Product")
            .property(PropertyBuilder::new("Id", DataType::Integer))
            .property(PropertyBuilder::new("CategoryId", DataType::Integer))
            .key(&["Id"]);
        builder
            .foreign_key("Product", &["CategoryId"], "Category")
            .navigation_to_principal("Category")
            .navigation_to_dependents("Products");
        builder.build().unwrap()
    }

    #[test]
    fn test_new_object_holds_defaults() {
        let model = model();
        let product = model.create_object("Product").unwrap();
        assert_eq!(product.get("Id").unwrap(), Value::Integer(0));
        assert_eq!(product.reference("Category").unwrap(), None);

        let category = model.create_object("Category").unwrap();
        assert_eq!(category.get("Name").unwrap(), Value::Null);
        assert!(category.collection("Products").unwrap().is_empty());
    }

    #[test]
    fn test_set_checks_types() {
        let model = model();
        let category = model.create_object("Category").unwrap();
        category.set("Name", "Beverages").unwrap();
        assert_eq!(category.get("Name").unwrap(), Value::from("Beverages"));
        assert!(matches!(
            category.set("Id", "one"),
            Err(TrackingError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_navigation_kind_and_target_are_checked() {
        let model = model();
        let product = model.create_object("Product").unwrap();
        let category = model.create_object("Category").unwrap();
        let other = model.create_object("Product").unwrap();

        assert!(product.collection("Category").is_err());
        assert!(product.set_reference("Category", Some(&other)).is_err());
        product.set_reference("Category", Some(&category)).unwrap();
        assert_eq!(product.reference("Category").unwrap(), Some(category.clone()));

        assert!(category.add_to_collection("Products", &product).unwrap());
        assert!(!category.add_to_collection("Products", &product).unwrap());
        assert!(category.remove_from_collection("Products", &product).unwrap());
        assert!(category.collection("Products").unwrap().is_empty());
    }

    #[test]
    fn test_identity_is_by_pointer() {
        let model = model();
        let a = model.create_object("Category").unwrap();
        let b = model.create_object("Category").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let weak = a.downgrade();
        assert!(weak.is_alive());
        drop(a);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }
}
