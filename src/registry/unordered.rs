// ABOUTME: Hash-map registry with constant-time membership and snapshot iteration
// ABOUTME: Makes no promise about the order entries are visited in

use std::collections::HashMap;

use super::{RegistryView, TaskRegistry};
use crate::engine::{TaskControl, TaskId};

#[derive(Debug, Default)]
pub struct UnorderedRegistry {
    entries: HashMap<TaskId, TaskControl>,
}

impl UnorderedRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskRegistry for UnorderedRegistry {
    fn insert(&mut self, control: TaskControl) {
        self.entries.insert(control.id(), control);
    }

    fn remove(&mut self, id: TaskId) -> Option<TaskControl> {
        self.entries.remove(&id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn for_each(&self, f: &mut dyn FnMut(&TaskControl)) {
        for control in self.entries.values() {
            f(control);
        }
    }

    fn view(&self) -> RegistryView {
        RegistryView::Snapshot(self.entries.values().cloned().collect())
    }
}
