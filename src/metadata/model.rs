use std::collections::HashSet;
use std::sync::Arc;

use super::{
    ChangeTrackingStrategy, DeleteBehavior, EntityType, EntityTypeId, ForeignKey, ForeignKeyId,
    Key, KeyId, Navigation, Property, SaveBehavior, ValueGenerated,
};
use crate::core::{DataType, Result, TrackingError};
use crate::object::{ObjectRef, PropertyAccessor, SlotAccessor};

/// Immutable mapping metadata shared by every state manager built over it.
#[derive(Debug)]
pub struct Model {
    entity_types: Vec<Arc<EntityType>>,
    keys: Vec<Key>,
    foreign_keys: Vec<ForeignKey>,
}

impl Model {
    pub fn builder() -> ModelBuilder {
        ModelBuilder::new()
    }

    pub fn entity_types(&self) -> &[Arc<EntityType>] {
        &self.entity_types
    }

    pub fn entity_type(&self, id: EntityTypeId) -> &Arc<EntityType> {
        &self.entity_types[id.0]
    }

    pub fn find_entity_type(&self, name: &str) -> Result<&Arc<EntityType>> {
        self.entity_types
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| TrackingError::UnknownEntityType(name.to_string()))
    }

    /// Whether `entity_type` is one of this model's own types (not merely an equal one).
    pub fn contains(&self, entity_type: &Arc<EntityType>) -> bool {
        self.entity_types
            .get(entity_type.id().0)
            .is_some_and(|t| Arc::ptr_eq(t, entity_type))
    }

    pub fn key(&self, id: KeyId) -> &Key {
        &self.keys[id.0]
    }

    pub fn foreign_key(&self, id: ForeignKeyId) -> &ForeignKey {
        &self.foreign_keys[id.0]
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// `None` unless the property belongs to a required foreign key; otherwise
    /// whether any of its required foreign keys cascades on delete.
    pub(crate) fn required_relationship(&self, property: &Property) -> Option<bool> {
        let mut required = property
            .foreign_keys()
            .iter()
            .map(|fk| self.foreign_key(*fk))
            .filter(|fk| fk.is_required())
            .peekable();
        required.peek()?;
        Some(required.any(|fk| fk.delete_behavior() == DeleteBehavior::Cascade))
    }

    /// Creates a materialized object of the named type with default values.
    pub fn create_object(&self, entity_type: &str) -> Result<ObjectRef> {
        Ok(ObjectRef::new(self.find_entity_type(entity_type)?))
    }
}

#[derive(Clone)]
pub struct PropertyBuilder {
    name: String,
    data_type: DataType,
    nullable: bool,
    shadow: bool,
    value_generated: ValueGenerated,
    before_save: SaveBehavior,
    after_save: SaveBehavior,
    concurrency_token: bool,
    accessor: Option<Arc<dyn PropertyAccessor>>,
}

impl PropertyBuilder {
    /// Text and byte properties start out nullable, everything else required.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: data_type.is_reference_type(),
            shadow: false,
            value_generated: ValueGenerated::Never,
            before_save: SaveBehavior::Save,
            after_save: SaveBehavior::Save,
            concurrency_token: false,
            accessor: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn shadow(mut self) -> Self {
        self.shadow = true;
        self
    }

    pub fn value_generated_on_add(mut self) -> Self {
        self.value_generated = ValueGenerated::OnAdd;
        self
    }

    pub fn value_generated_on_add_or_update(mut self) -> Self {
        self.value_generated = ValueGenerated::OnAddOrUpdate;
        self
    }

    pub fn before_save(mut self, behavior: SaveBehavior) -> Self {
        self.before_save = behavior;
        self
    }

    pub fn after_save(mut self, behavior: SaveBehavior) -> Self {
        self.after_save = behavior;
        self
    }

    pub fn concurrency_token(mut self) -> Self {
        self.concurrency_token = true;
        self
    }

    pub fn with_accessor(mut self, accessor: Arc<dyn PropertyAccessor>) -> Self {
        self.accessor = Some(accessor);
        self
    }
}

pub struct EntityTypeBuilder {
    name: String,
    properties: Vec<PropertyBuilder>,
    primary_key: Vec<String>,
    alternate_keys: Vec<Vec<String>>,
    change_tracking: ChangeTrackingStrategy,
}

impl EntityTypeBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            properties: Vec::new(),
            primary_key: Vec::new(),
            alternate_keys: Vec::new(),
            change_tracking: ChangeTrackingStrategy::Snapshot,
        }
    }

    pub fn property(&mut self, property: PropertyBuilder) -> &mut Self {
        self.properties.push(property);
        self
    }

    pub fn key(&mut self, properties: &[&str]) -> &mut Self {
        self.primary_key = properties.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn alternate_key(&mut self, properties: &[&str]) -> &mut Self {
        self.alternate_keys
            .push(properties.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn change_tracking(&mut self, strategy: ChangeTrackingStrategy) -> &mut Self {
        self.change_tracking = strategy;
        self
    }
}

pub struct ForeignKeyBuilder {
    dependent: String,
    properties: Vec<String>,
    principal: String,
    principal_key: Option<Vec<String>>,
    unique: bool,
    required: Option<bool>,
    delete_behavior: Option<DeleteBehavior>,
    dependent_to_principal: Option<String>,
    principal_to_dependent: Option<String>,
}

impl ForeignKeyBuilder {
    /// Targets an alternate key instead of the principal's primary key.
    pub fn principal_key(&mut self, properties: &[&str]) -> &mut Self {
        self.principal_key = Some(properties.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    pub fn required(&mut self, required: bool) -> &mut Self {
        self.required = Some(required);
        self
    }

    pub fn on_delete(&mut self, behavior: DeleteBehavior) -> &mut Self {
        self.delete_behavior = Some(behavior);
        self
    }

    pub fn navigation_to_principal(&mut self, name: &str) -> &mut Self {
        self.dependent_to_principal = Some(name.to_string());
        self
    }

    /// A collection for one-to-many relationships, a reference for unique ones.
    pub fn navigation_to_dependents(&mut self, name: &str) -> &mut Self {
        self.principal_to_dependent = Some(name.to_string());
        self
    }
}

#[derive(Default)]
pub struct ModelBuilder {
    entities: Vec<EntityTypeBuilder>,
    foreign_keys: Vec<ForeignKeyBuilder>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&mut self, name: &str) -> &mut EntityTypeBuilder {
        let position = match self.entities.iter().position(|e| e.name == name) {
            Some(position) => position,
            None => {
                self.entities.push(EntityTypeBuilder::new(name));
                self.entities.len() - 1
            }
        };
        &mut self.entities[position]
    }

    pub fn foreign_key(
        &mut self,
        dependent: &str,
        properties: &[&str],
        principal: &str,
    ) -> &mut ForeignKeyBuilder {
        self.foreign_keys.push(ForeignKeyBuilder {
            dependent: dependent.to_string(),
            properties: properties.iter().map(|p| p.to_string()).collect(),
            principal: principal.to_string(),
            principal_key: None,
            unique: false,
            required: None,
            delete_behavior: None,
            dependent_to_principal: None,
            principal_to_dependent: None,
        });
        let last = self.foreign_keys.len() - 1;
        &mut self.foreign_keys[last]
    }

    pub fn build(self) -> Result<Arc<Model>> {
        let mut types: Vec<EntityType> = Vec::with_capacity(self.entities.len());
        let mut keys: Vec<Key> = Vec::new();

        for (i, builder) in self.entities.iter().enumerate() {
            let type_id = EntityTypeId(i);
            if builder.primary_key.is_empty() {
                return Err(TrackingError::InvalidModel(format!(
                    "Entity type '{}' has no primary key",
                    builder.name
                )));
            }

            let mut seen = HashSet::new();
            let mut properties = Vec::with_capacity(builder.properties.len());
            for (index, p) in builder.properties.iter().enumerate() {
                if !seen.insert(p.name.as_str()) {
                    return Err(TrackingError::InvalidModel(format!(
                        "Property '{}' is declared twice on entity type '{}'",
                        p.name, builder.name
                    )));
                }
                let accessor: Arc<dyn PropertyAccessor> = match &p.accessor {
                    Some(accessor) => accessor.clone(),
                    None => Arc::new(SlotAccessor::new(index)),
                };
                properties.push(Property {
                    name: p.name.clone(),
                    index,
                    declaring_type: type_id,
                    data_type: p.data_type,
                    nullable: p.nullable,
                    shadow: p.shadow,
                    value_generated: p.value_generated,
                    before_save: p.before_save,
                    after_save: p.after_save,
                    concurrency_token: p.concurrency_token,
                    accessor,
                    primary_key: false,
                    keys: Vec::new(),
                    foreign_keys: Vec::new(),
                });
            }

            let mut entity_type = EntityType {
                id: type_id,
                name: builder.name.clone(),
                properties,
                primary_key: KeyId(usize::MAX),
                keys: Vec::new(),
                foreign_keys: Vec::new(),
                referencing_foreign_keys: Vec::new(),
                navigations: Vec::new(),
                change_tracking: builder.change_tracking,
            };
            entity_type.primary_key =
                add_key(&mut entity_type, &mut keys, &builder.primary_key, true)?;
            for alternate in &builder.alternate_keys {
                add_key(&mut entity_type, &mut keys, alternate, false)?;
            }
            types.push(entity_type);
        }

        let mut foreign_keys: Vec<ForeignKey> = Vec::with_capacity(self.foreign_keys.len());
        for builder in &self.foreign_keys {
            let id = ForeignKeyId(foreign_keys.len());
            let dependent = find_type(&types, &builder.dependent)?;
            let principal = find_type(&types, &builder.principal)?;

            let properties = resolve_properties(&types[dependent.0], &builder.properties)?;
            let principal_key = match &builder.principal_key {
                Some(names) => add_key(&mut types[principal.0], &mut keys, names, false)?,
                None => types[principal.0].primary_key,
            };

            let principal_properties = keys[principal_key.0].properties.clone();
            if principal_properties.len() != properties.len() {
                return Err(TrackingError::InvalidModel(format!(
                    "Foreign key {:?} on '{}' has {} properties but the principal key of '{}' has {}",
                    builder.properties,
                    builder.dependent,
                    properties.len(),
                    builder.principal,
                    principal_properties.len()
                )));
            }
            for (dep, prin) in properties.iter().zip(principal_properties.iter()) {
                let dep_type = types[dependent.0].properties[*dep].data_type;
                let prin_type = types[principal.0].properties[*prin].data_type;
                if dep_type != prin_type {
                    return Err(TrackingError::InvalidModel(format!(
                        "Foreign key property '{}.{}' is {} but the principal key property '{}.{}' is {}",
                        builder.dependent,
                        types[dependent.0].properties[*dep].name,
                        dep_type,
                        builder.principal,
                        types[principal.0].properties[*prin].name,
                        prin_type
                    )));
                }
            }

            let required = builder.required.unwrap_or_else(|| {
                properties
                    .iter()
                    .all(|p| !types[dependent.0].properties[*p].nullable)
            });
            let delete_behavior = builder.delete_behavior.unwrap_or(if required {
                DeleteBehavior::Cascade
            } else {
                DeleteBehavior::ClientSetNull
            });
            let identifying = properties
                .iter()
                .any(|p| types[dependent.0].properties[*p].primary_key);

            let dependent_to_principal = match &builder.dependent_to_principal {
                Some(name) => Some(add_navigation(
                    &mut types[dependent.0],
                    name,
                    principal,
                    id,
                    true,
                    false,
                )?),
                None => None,
            };
            let principal_to_dependent = match &builder.principal_to_dependent {
                Some(name) => Some(add_navigation(
                    &mut types[principal.0],
                    name,
                    dependent,
                    id,
                    false,
                    !builder.unique,
                )?),
                None => None,
            };

            for p in &properties {
                types[dependent.0].properties[*p].foreign_keys.push(id);
            }
            types[dependent.0].foreign_keys.push(id);
            types[principal.0].referencing_foreign_keys.push(id);

            foreign_keys.push(ForeignKey {
                id,
                dependent_type: dependent,
                properties,
                principal_type: principal,
                principal_key,
                unique: builder.unique,
                required,
                delete_behavior,
                identifying,
                dependent_to_principal,
                principal_to_dependent,
            });
        }

        Ok(Arc::new(Model {
            entity_types: types.into_iter().map(Arc::new).collect(),
            keys,
            foreign_keys,
        }))
    }
}

fn find_type(types: &[EntityType], name: &str) -> Result<EntityTypeId> {
    types
        .iter()
        .find(|t| t.name == name)
        .map(|t| t.id)
        .ok_or_else(|| TrackingError::UnknownEntityType(name.to_string()))
}

fn resolve_properties(entity_type: &EntityType, names: &[String]) -> Result<Vec<usize>> {
    if names.is_empty() {
        return Err(TrackingError::InvalidModel(format!(
            "An empty property list was given for entity type '{}'",
            entity_type.name
        )));
    }
    names
        .iter()
        .map(|name| entity_type.property(name).map(|p| p.index))
        .collect()
}

/// Registers a key, reusing an existing one over the same properties.
fn add_key(
    entity_type: &mut EntityType,
    keys: &mut Vec<Key>,
    names: &[String],
    primary: bool,
) -> Result<KeyId> {
    let properties = resolve_properties(entity_type, names)?;
    if !primary
        && let Some(existing) = entity_type
            .keys
            .iter()
            .find(|k| keys[k.0].properties == properties)
    {
        return Ok(*existing);
    }

    let id = KeyId(keys.len());
    let structural = properties
        .iter()
        .any(|p| entity_type.properties[*p].data_type.is_structural());
    for p in &properties {
        let property = &mut entity_type.properties[*p];
        property.keys.push(id);
        if primary {
            property.primary_key = true;
        }
    }
    entity_type.keys.push(id);
    keys.push(Key {
        id,
        declaring_type: entity_type.id,
        properties,
        primary,
        structural,
    });
    Ok(id)
}

fn add_navigation(
    entity_type: &mut EntityType,
    name: &str,
    target_type: EntityTypeId,
    foreign_key: ForeignKeyId,
    points_to_principal: bool,
    collection: bool,
) -> Result<usize> {
    if entity_type.navigations.iter().any(|n| n.name == name)
        || entity_type.find_property(name).is_some()
    {
        return Err(TrackingError::InvalidModel(format!(
            "Member '{}' is declared twice on entity type '{}'",
            name, entity_type.name
        )));
    }
    let index = entity_type.navigations.len();
    entity_type.navigations.push(Navigation {
        name: name.to_string(),
        index,
        declaring_type: entity_type.id,
        target_type,
        foreign_key,
        points_to_principal,
        collection,
    });
    Ok(index)
}
