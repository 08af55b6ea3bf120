mod common;

use memotrack::prelude::*;

use common::{category, detail, node, product, store_model};

#[test]
fn test_attach_connects_dependent_to_tracked_principal() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let tools = category(&model, 1, "Tools");
    let hammer = product(&model, 10, "Hammer", 1);

    sm.attach(&tools).unwrap();
    let hammer_id = sm.attach(&hammer).unwrap();

    assert_eq!(hammer.reference("Category").unwrap(), Some(tools.clone()));
    assert_eq!(tools.collection("Products").unwrap(), vec![hammer.clone()]);
    assert_eq!(sm.state(hammer_id).unwrap(), EntityState::Unchanged);
}

#[test]
fn test_attach_in_reverse_order_connects_from_principal_side() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let tools = category(&model, 1, "Tools");
    let hammer = product(&model, 10, "Hammer", 1);
    let saw = product(&model, 11, "Saw", 1);

    sm.attach(&hammer).unwrap();
    sm.attach(&saw).unwrap();
    sm.attach(&tools).unwrap();

    let products = tools.collection("Products").unwrap();
    assert_eq!(products.len(), 2);
    assert!(products.contains(&hammer) && products.contains(&saw));
    assert_eq!(saw.reference("Category").unwrap(), Some(tools.clone()));
}

#[test]
fn test_setting_reference_sets_foreign_key_and_inverse() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let tools = category(&model, 1, "Tools");
    let hammer = product(&model, 10, "Hammer", 0);
    sm.attach(&tools).unwrap();
    let hammer_id = sm.attach(&hammer).unwrap();

    sm.set_reference(hammer_id, "Category", Some(&tools)).unwrap();

    assert_eq!(hammer.get("CategoryId").unwrap(), Value::from(1));
    assert_eq!(tools.collection("Products").unwrap(), vec![hammer.clone()]);
    let entry = sm.entry(hammer_id).unwrap();
    assert_eq!(entry.state(), EntityState::Modified);
    assert_eq!(entry.modified_properties(), vec!["CategoryId"]);
}

#[test]
fn test_removing_from_required_collection_deletes_dependent() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let tools = category(&model, 1, "Tools");
    let hammer = product(&model, 10, "Hammer", 1);
    let tools_id = sm.attach(&tools).unwrap();
    let hammer_id = sm.attach(&hammer).unwrap();

    sm.remove_from_collection(tools_id, "Products", &hammer)
        .unwrap();

    assert_eq!(sm.state(hammer_id).unwrap(), EntityState::Deleted);
    assert_eq!(hammer.reference("Category").unwrap(), None);
    assert!(tools.collection("Products").unwrap().is_empty());
}

#[test]
fn test_changing_foreign_key_moves_dependent_between_collections() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let tools = category(&model, 1, "Tools");
    let garden = category(&model, 2, "Garden");
    let hammer = product(&model, 10, "Hammer", 1);
    sm.attach(&tools).unwrap();
    sm.attach(&hammer).unwrap();
    sm.attach(&garden).unwrap();

    hammer.set("CategoryId", 2).unwrap();
    sm.detect_changes().unwrap();

    assert_eq!(hammer.reference("Category").unwrap(), Some(garden.clone()));
    assert!(tools.collection("Products").unwrap().is_empty());
    assert_eq!(garden.collection("Products").unwrap(), vec![hammer.clone()]);
}

#[test]
fn test_one_to_one_foreign_key_steals_dependent_slot() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let p1 = product(&model, 1, "Kool", 0);
    let p2 = product(&model, 2, "Beans", 0);
    let d1 = detail(&model, 1, Some(1));
    let d2 = detail(&model, 2, Some(2));
    for object in [&p1, &p2, &d1, &d2] {
        sm.attach(object).unwrap();
    }
    assert_eq!(p1.reference("Detail").unwrap(), Some(d1.clone()));
    assert_eq!(p2.reference("Detail").unwrap(), Some(d2.clone()));

    d1.set("ProductId", 2).unwrap();
    sm.detect_changes().unwrap();

    assert_eq!(d1.reference("Product").unwrap(), Some(p2.clone()));
    assert_eq!(p2.reference("Detail").unwrap(), Some(d1.clone()));
    assert_eq!(p1.reference("Detail").unwrap(), None);
    assert_eq!(d2.reference("Product").unwrap(), None);
    assert_eq!(d2.get("ProductId").unwrap(), Value::Null);
    let d2_id = sm.entry_for_object(&d2).unwrap();
    assert_eq!(sm.state(d2_id).unwrap(), EntityState::Modified);
}

#[test]
fn test_one_to_one_navigation_steals_dependent_slot() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let p1 = product(&model, 1, "Kool", 0);
    let p2 = product(&model, 2, "Beans", 0);
    let d1 = detail(&model, 1, Some(1));
    let d2 = detail(&model, 2, Some(2));
    let p1_id = sm.attach(&p1).unwrap();
    for object in [&p2, &d1, &d2] {
        sm.attach(object).unwrap();
    }

    sm.set_reference(p1_id, "Detail", Some(&d2)).unwrap();

    assert_eq!(d2.reference("Product").unwrap(), Some(p1.clone()));
    assert_eq!(d2.get("ProductId").unwrap(), Value::from(1));
    assert_eq!(p2.reference("Detail").unwrap(), None);
    assert_eq!(d1.reference("Product").unwrap(), None);
    assert_eq!(d1.get("ProductId").unwrap(), Value::Null);
}

#[test]
fn test_self_referencing_one_to_one() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let a = node(&model, 1);
    let b = node(&model, 2);
    let c = node(&model, 3);
    let a_id = sm.attach(&a).unwrap();
    sm.attach(&b).unwrap();
    let c_id = sm.attach(&c).unwrap();

    sm.set_reference(a_id, "Next", Some(&b)).unwrap();
    assert_eq!(a.get("NextId").unwrap(), Value::from(2));
    assert_eq!(b.reference("Previous").unwrap(), Some(a.clone()));

    sm.set_reference(c_id, "Next", Some(&b)).unwrap();

    assert_eq!(c.get("NextId").unwrap(), Value::from(2));
    assert_eq!(b.reference("Previous").unwrap(), Some(c.clone()));
    assert_eq!(a.reference("Next").unwrap(), None);
    assert_eq!(a.get("NextId").unwrap(), Value::Null);
}

#[test]
fn test_deleting_principal_cascades_to_required_dependents() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let tools = category(&model, 1, "Tools");
    let hammer = product(&model, 10, "Hammer", 1);
    let tools_id = sm.attach(&tools).unwrap();
    let hammer_id = sm.attach(&hammer).unwrap();

    sm.remove(&tools).unwrap();

    assert_eq!(sm.state(tools_id).unwrap(), EntityState::Deleted);
    assert_eq!(sm.state(hammer_id).unwrap(), EntityState::Deleted);
}

#[test]
fn test_deleting_principal_nulls_optional_dependents() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let kool = product(&model, 1, "Kool", 0);
    let notes = detail(&model, 1, Some(1));
    sm.attach(&kool).unwrap();
    let notes_id = sm.attach(&notes).unwrap();

    sm.remove(&kool).unwrap();

    assert_eq!(notes.get("ProductId").unwrap(), Value::Null);
    assert_eq!(notes.reference("Product").unwrap(), None);
    assert_eq!(kool.reference("Detail").unwrap(), None);
    assert_eq!(sm.state(notes_id).unwrap(), EntityState::Modified);
}

#[test]
fn test_added_graph_propagates_temporary_keys() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let tools = category(&model, 0, "Tools");
    let hammer = product(&model, 0, "Hammer", 0);
    let saw = product(&model, 0, "Saw", 0);
    tools.add_to_collection("Products", &hammer).unwrap();
    tools.add_to_collection("Products", &saw).unwrap();

    let tools_id = sm.add(&tools).unwrap();

    assert_eq!(sm.property_value(tools_id, "Id").unwrap(), Value::from(-1));
    for item in [&hammer, &saw] {
        let id = sm.entry_for_object(item).unwrap();
        let entry = sm.entry(id).unwrap();
        assert_eq!(entry.state(), EntityState::Added);
        assert_eq!(entry.current_value("CategoryId").unwrap(), Value::from(-1));
        assert!(entry.is_temporary("CategoryId").unwrap());
        assert_eq!(item.reference("Category").unwrap(), Some(tools.clone()));
    }
    assert_eq!(sm.tracked_count(), 3);
}

#[test]
fn test_query_results_are_fixed_up_as_they_stream_in() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let tools = model.create_object("Category").unwrap();
    let hammer = model.create_object("Product").unwrap();

    sm.begin_tracking_query();
    sm.start_tracking_from_query("Category", Some(&tools), &[Value::from(1), Value::from("Tools")])
        .unwrap();
    sm.start_tracking_from_query(
        "Product",
        Some(&hammer),
        &[
            Value::from(10),
            Value::from("Hammer"),
            Value::from(9.5),
            Value::from(1),
            Value::from(1),
        ],
    )
    .unwrap();

    assert_eq!(hammer.reference("Category").unwrap(), Some(tools.clone()));
    assert_eq!(tools.collection("Products").unwrap(), vec![hammer.clone()]);
}
