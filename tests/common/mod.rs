#![allow(dead_code)]

use std::sync::Arc;

use memotrack::metadata::ForeignKeyBuilder;
use memotrack::prelude::*;

/// Store model shared by the integration tests:
///
/// - `Category` 1..n `Product` over required `CategoryId` (cascade delete),
/// - `Product` 1..1 `ProductDetail` over nullable `ProductId` (client set null),
/// - `Node` self-referencing one-to-one over `NextId`,
/// - `Principal` with alternate key `PrincipalId`, targeted by `Dependent`,
/// - `Blob` keyed by a byte array,
/// - `Order` 1..n `OrderLine` with composite key `(OrderId, LineNo)`,
/// - `Ticket` tracked through change notifications.
pub fn store_model() -> Arc<Model> {
    let mut builder = ModelBuilder::new();
    builder
        .entity("Category")
        .property(PropertyBuilder::new("Id", DataType::Integer).value_generated_on_add())
        .property(PropertyBuilder::new("Name", DataType::Text))
        .key(&["Id"]);
    builder
        .entity("Product")
        .property(PropertyBuilder::new("Id", DataType::Integer).value_generated_on_add())
        .property(PropertyBuilder::new("Name", DataType::Text))
        .property(PropertyBuilder::new("Price", DataType::Float))
        .property(PropertyBuilder::new("CategoryId", DataType::Integer))
        .property(PropertyBuilder::new("Version", DataType::Integer).concurrency_token())
        .key(&["Id"]);
    builder
        .entity("ProductDetail")
        .property(PropertyBuilder::new("Id", DataType::Integer))
        .property(PropertyBuilder::new("ProductId", DataType::Integer).nullable())
        .property(PropertyBuilder::new("Notes", DataType::Text))
        .key(&["Id"]);
    builder
        .entity("Node")
        .property(PropertyBuilder::new("Id", DataType::Integer))
        .property(PropertyBuilder::new("NextId", DataType::Integer).nullable())
        .key(&["Id"]);
    builder
        .entity("Principal")
        .property(PropertyBuilder::new("Id", DataType::Integer))
        .property(PropertyBuilder::new("PrincipalId", DataType::Integer))
        .key(&["Id"])
        .alternate_key(&["PrincipalId"]);
    builder
        .entity("Dependent")
        .property(PropertyBuilder::new("Id", DataType::Integer))
        .property(PropertyBuilder::new("PrincipalId", DataType::Integer).nullable())
        .key(&["Id"]);
    builder
        .entity("Blob")
        .property(PropertyBuilder::new("Key", DataType::Bytes).required())
        .property(PropertyBuilder::new("Data", DataType::Text))
        .key(&["Key"]);
    builder
        .entity("Order")
        .property(PropertyBuilder::new("Id", DataType::Integer))
        .key(&["Id"]);
    builder
        .entity("OrderLine")
        .property(PropertyBuilder::new("OrderId", DataType::Integer))
        .property(PropertyBuilder::new("LineNo", DataType::Integer))
        .property(PropertyBuilder::new("Quantity", DataType::Integer))
        .key(&["OrderId", "LineNo"]);
    builder
        .entity("Ticket")
        .property(PropertyBuilder::new("Id", DataType::Integer))
        .property(PropertyBuilder::new("Title", DataType::Text))
        .key(&["Id"])
        .change_tracking(ChangeTrackingStrategy::ChangedNotifications);

    named(builder.foreign_key("Product", &["CategoryId"], "Category"), "Category", "Products");
    named(
        builder
            .foreign_key("ProductDetail", &["ProductId"], "Product")
            .unique(),
        "Product",
        "Detail",
    );
    named(
        builder.foreign_key("Node", &["NextId"], "Node").unique(),
        "Next",
        "Previous",
    );
    named(
        builder
            .foreign_key("Dependent", &["PrincipalId"], "Principal")
            .principal_key(&["PrincipalId"]),
        "Principal",
        "Dependents",
    );
    named(builder.foreign_key("OrderLine", &["OrderId"], "Order"), "Order", "Lines");

    builder.build().unwrap()
}

fn named(fk: &mut ForeignKeyBuilder, to_principal: &str, to_dependents: &str) {
    fk.navigation_to_principal(to_principal)
        .navigation_to_dependents(to_dependents);
}

/// Creates an object of `entity` with the given property values.
pub fn object(model: &Model, entity: &str, values: &[(&str, Value)]) -> ObjectRef {
    let object = model.create_object(entity).unwrap();
    for (name, value) in values {
        object.set(name, value.clone()).unwrap();
    }
    object
}

pub fn category(model: &Model, id: i64, name: &str) -> ObjectRef {
    object(
        model,
        "Category",
        &[("Id", Value::from(id)), ("Name", Value::from(name))],
    )
}

pub fn product(model: &Model, id: i64, name: &str, category_id: i64) -> ObjectRef {
    object(
        model,
        "Product",
        &[
            ("Id", Value::from(id)),
            ("Name", Value::from(name)),
            ("CategoryId", Value::from(category_id)),
            ("Version", Value::from(1)),
        ],
    )
}

pub fn detail(model: &Model, id: i64, product_id: Option<i64>) -> ObjectRef {
    object(
        model,
        "ProductDetail",
        &[("Id", Value::from(id)), ("ProductId", Value::from(product_id))],
    )
}

pub fn node(model: &Model, id: i64) -> ObjectRef {
    object(model, "Node", &[("Id", Value::from(id))])
}
