// ============================================================================
// Listeners
// ============================================================================
//
// Change notifications fan out synchronously, in registration order, from the
// state manager to these capability traits. Each callback gets the manager
// back so it can react by mutating other entries.
//
// ============================================================================

use std::rc::Rc;

use super::change_detector::ChangeDetector;
use super::entry::EntryId;
use super::navigation_fixer::NavigationFixer;
use super::state::EntityState;
use super::state_manager::StateManager;
use crate::core::{Result, Value};
use crate::object::ObjectRef;

pub trait EntityStateListener {
    /// Runs before the state is applied; an error aborts the transition.
    fn state_changing(
        &self,
        _manager: &mut StateManager,
        _entry: EntryId,
        _new_state: EntityState,
    ) -> Result<()> {
        Ok(())
    }

    fn state_changed(
        &self,
        manager: &mut StateManager,
        entry: EntryId,
        old_state: EntityState,
        from_query: bool,
    ) -> Result<()>;
}

pub trait PropertyListener {
    fn property_changing(&self, _manager: &mut StateManager, _entry: EntryId, _property: usize) -> Result<()> {
        Ok(())
    }

    fn property_changed(&self, _manager: &mut StateManager, _entry: EntryId, _property: usize) -> Result<()> {
        Ok(())
    }
}

/// A property that is part of a primary or alternate key changed.
pub trait KeyListener {
    fn key_property_changed(
        &self,
        manager: &mut StateManager,
        entry: EntryId,
        property: usize,
        old_value: &Value,
        new_value: &Value,
    ) -> Result<()>;
}

/// A property that is part of one or more foreign keys changed.
pub trait ForeignKeyListener {
    fn foreign_key_property_changed(
        &self,
        manager: &mut StateManager,
        entry: EntryId,
        property: usize,
        old_value: &Value,
        new_value: &Value,
    ) -> Result<()>;
}

pub trait NavigationListener {
    fn navigation_reference_changed(
        &self,
        manager: &mut StateManager,
        entry: EntryId,
        navigation: usize,
        old_value: Option<&ObjectRef>,
        new_value: Option<&ObjectRef>,
    ) -> Result<()>;

    fn navigation_collection_changed(
        &self,
        manager: &mut StateManager,
        entry: EntryId,
        navigation: usize,
        added: &[ObjectRef],
        removed: &[ObjectRef],
    ) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct ListenerSet {
    pub(crate) state: Vec<Rc<dyn EntityStateListener>>,
    pub(crate) property: Vec<Rc<dyn PropertyListener>>,
    pub(crate) key: Vec<Rc<dyn KeyListener>>,
    pub(crate) foreign_key: Vec<Rc<dyn ForeignKeyListener>>,
    pub(crate) navigation: Vec<Rc<dyn NavigationListener>>,
}

impl ListenerSet {
    /// Change detector and navigation fixer, the listeners every manager starts with.
    pub fn with_defaults() -> Self {
        let detector = Rc::new(ChangeDetector);
        let fixer = Rc::new(NavigationFixer);
        let mut listeners = Self::default();
        listeners.property.push(detector);
        listeners.state.push(fixer.clone());
        listeners.key.push(fixer.clone());
        listeners.foreign_key.push(fixer.clone());
        listeners.navigation.push(fixer);
        listeners
    }

    pub fn add_state_listener(&mut self, listener: Rc<dyn EntityStateListener>) {
        self.state.push(listener);
    }

    pub fn add_property_listener(&mut self, listener: Rc<dyn PropertyListener>) {
        self.property.push(listener);
    }

    pub fn add_key_listener(&mut self, listener: Rc<dyn KeyListener>) {
        self.key.push(listener);
    }

    pub fn add_foreign_key_listener(&mut self, listener: Rc<dyn ForeignKeyListener>) {
        self.foreign_key.push(listener);
    }

    pub fn add_navigation_listener(&mut self, listener: Rc<dyn NavigationListener>) {
        self.navigation.push(listener);
    }
}
