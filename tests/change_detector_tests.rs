mod common;

use std::cell::RefCell;
use std::rc::Rc;

use memotrack::prelude::*;
use memotrack::tracking::{ForeignKeyListener, KeyListener, NavigationListener};

use common::{category, object, product, store_model};

/// Records every key, foreign-key and navigation notification.
#[derive(Default)]
struct Recorder {
    keys: RefCell<Vec<(EntryId, Value, Value)>>,
    foreign_keys: RefCell<Vec<(EntryId, Value, Value)>>,
    navigations: RefCell<Vec<EntryId>>,
}

impl Recorder {
    fn install(manager: &mut StateManager) -> Rc<Self> {
        let recorder = Rc::new(Self::default());
        let listeners = manager.listeners_mut();
        listeners.add_key_listener(recorder.clone());
        listeners.add_foreign_key_listener(recorder.clone());
        listeners.add_navigation_listener(recorder.clone());
        recorder
    }

    fn is_empty(&self) -> bool {
        self.keys.borrow().is_empty()
            && self.foreign_keys.borrow().is_empty()
            && self.navigations.borrow().is_empty()
    }
}

impl KeyListener for Recorder {
    fn key_property_changed(
        &self,
        _manager: &mut StateManager,
        entry: EntryId,
        _property: usize,
        old_value: &Value,
        new_value: &Value,
    ) -> Result<()> {
        self.keys
            .borrow_mut()
            .push((entry, old_value.clone(), new_value.clone()));
        Ok(())
    }
}

impl ForeignKeyListener for Recorder {
    fn foreign_key_property_changed(
        &self,
        _manager: &mut StateManager,
        entry: EntryId,
        _property: usize,
        old_value: &Value,
        new_value: &Value,
    ) -> Result<()> {
        self.foreign_keys
            .borrow_mut()
            .push((entry, old_value.clone(), new_value.clone()));
        Ok(())
    }
}

impl NavigationListener for Recorder {
    fn navigation_reference_changed(
        &self,
        _manager: &mut StateManager,
        entry: EntryId,
        _navigation: usize,
        _old_value: Option<&ObjectRef>,
        _new_value: Option<&ObjectRef>,
    ) -> Result<()> {
        self.navigations.borrow_mut().push(entry);
        Ok(())
    }

    fn navigation_collection_changed(
        &self,
        _manager: &mut StateManager,
        entry: EntryId,
        _navigation: usize,
        _added: &[ObjectRef],
        _removed: &[ObjectRef],
    ) -> Result<()> {
        self.navigations.borrow_mut().push(entry);
        Ok(())
    }
}

#[test]
fn test_direct_write_is_detected_as_modification() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let kool = product(&model, 10, "Kool", 0);
    let id = sm.attach(&kool).unwrap();

    kool.set("Name", "Beans").unwrap();
    sm.detect_changes().unwrap();

    let entry = sm.entry(id).unwrap();
    assert_eq!(entry.state(), EntityState::Modified);
    assert_eq!(entry.modified_properties(), vec!["Name"]);
    assert_eq!(entry.original_value("Name").unwrap(), Value::from("Kool"));
}

#[test]
fn test_value_written_back_to_original_is_not_a_change() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let kool = product(&model, 10, "Kool", 0);
    let id = sm.attach(&kool).unwrap();

    kool.set("Name", "Beans").unwrap();
    kool.set("Name", "Kool").unwrap();
    sm.detect_changes().unwrap();

    let entry = sm.entry(id).unwrap();
    assert_eq!(entry.state(), EntityState::Unchanged);
    assert!(entry.modified_properties().is_empty());
}

#[test]
fn test_unchanged_graph_raises_no_notifications() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let tools = category(&model, 1, "Tools");
    let hammer = product(&model, 10, "Hammer", 1);
    sm.attach(&tools).unwrap();
    sm.attach(&hammer).unwrap();
    let recorder = Recorder::install(&mut sm);

    sm.detect_changes().unwrap();
    sm.detect_changes().unwrap();

    assert!(recorder.is_empty());
    assert!(sm.entries().all(|e| e.state() == EntityState::Unchanged));
}

#[test]
fn test_alternate_key_change_on_added_entity_is_reported_once() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let principal = object(
        &model,
        "Principal",
        &[("Id", Value::from(-1)), ("PrincipalId", Value::from(77))],
    );
    let id = sm.add(&principal).unwrap();
    let recorder = Recorder::install(&mut sm);

    principal.set("PrincipalId", 78).unwrap();
    sm.detect_changes().unwrap();

    assert_eq!(
        *recorder.keys.borrow(),
        vec![(id, Value::from(77), Value::from(78))]
    );
    assert!(recorder.foreign_keys.borrow().is_empty());
    assert_eq!(sm.state(id).unwrap(), EntityState::Added);
    assert_eq!(sm.try_get_entry("Principal", &[Value::from(-1)]).unwrap(), Some(id));

    sm.detect_changes().unwrap();
    assert_eq!(recorder.keys.borrow().len(), 1);
}

#[test]
fn test_alternate_key_change_flows_to_dependents() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let principal = object(
        &model,
        "Principal",
        &[("Id", Value::from(1)), ("PrincipalId", Value::from(77))],
    );
    let dependent = object(
        &model,
        "Dependent",
        &[("Id", Value::from(1)), ("PrincipalId", Value::from(77))],
    );
    let principal_id = sm.attach(&principal).unwrap();
    let dependent_id = sm.attach(&dependent).unwrap();
    assert_eq!(
        dependent.reference("Principal").unwrap(),
        Some(principal.clone())
    );

    principal.set("PrincipalId", 78).unwrap();
    sm.detect_changes().unwrap();

    assert_eq!(sm.state(principal_id).unwrap(), EntityState::Modified);
    assert_eq!(dependent.get("PrincipalId").unwrap(), Value::from(78));
    assert_eq!(sm.state(dependent_id).unwrap(), EntityState::Modified);
    assert_eq!(
        dependent.reference("Principal").unwrap(),
        Some(principal.clone())
    );
}

#[test]
fn test_object_added_to_tracked_collection_is_tracked_as_added() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let tools = category(&model, 1, "Tools");
    sm.attach(&tools).unwrap();
    let saw = product(&model, 0, "Saw", 0);

    tools.add_to_collection("Products", &saw).unwrap();
    sm.detect_changes().unwrap();

    let id = sm.entry_for_object(&saw).unwrap();
    let entry = sm.entry(id).unwrap();
    assert_eq!(entry.state(), EntityState::Added);
    assert_eq!(entry.current_value("CategoryId").unwrap(), Value::from(1));
    assert!(!entry.is_temporary("CategoryId").unwrap());
    assert!(entry.is_temporary("Id").unwrap());
    assert_eq!(saw.reference("Category").unwrap(), Some(tools.clone()));
}

#[test]
fn test_notifying_entities_are_skipped_by_detection() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let ticket = object(
        &model,
        "Ticket",
        &[("Id", Value::from(1)), ("Title", Value::from("Broken build"))],
    );
    let id = sm.attach(&ticket).unwrap();

    ticket.set("Title", "Flaky build").unwrap();
    sm.detect_changes().unwrap();
    assert_eq!(sm.state(id).unwrap(), EntityState::Unchanged);

    sm.set_property_value(id, "Title", "Fixed build").unwrap();
    assert_eq!(sm.state(id).unwrap(), EntityState::Modified);
    assert_eq!(sm.original_value(id, "Title").unwrap(), Value::from("Flaky build"));
}

#[test]
fn test_detect_entry_changes_limits_the_scan() {
    let model = store_model();
    let mut sm = StateManager::new(model.clone());
    let kool = product(&model, 10, "Kool", 0);
    let beans = product(&model, 11, "Beans", 0);
    let kool_id = sm.attach(&kool).unwrap();
    let beans_id = sm.attach(&beans).unwrap();

    kool.set("Price", 2.5).unwrap();
    beans.set("Price", 3.5).unwrap();
    sm.detect_entry_changes(kool_id).unwrap();

    assert_eq!(sm.state(kool_id).unwrap(), EntityState::Modified);
    assert_eq!(sm.state(beans_id).unwrap(), EntityState::Unchanged);
}
