// ABOUTME: Submission-ordered registry kept as a doubly linked list inside a slab arena
// ABOUTME: Unlinking is constant time and iteration tolerates entries vanishing mid-walk

use slab::Slab;
use std::collections::HashMap;

use super::{RegistryView, TaskRegistry};
use crate::engine::{TaskControl, TaskId};

struct Node {
    control: TaskControl,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Keeps controls in the order they were inserted.
#[derive(Default)]
pub struct OrderedRegistry {
    nodes: Slab<Node>,
    index: HashMap<TaskId, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl OrderedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn first_after(&self, cursor: TaskId) -> Option<usize> {
        let mut slot = self.head;
        while let Some(key) = slot {
            let node = &self.nodes[key];
            if node.control.id() > cursor {
                return Some(key);
            }
            slot = node.next;
        }
        None
    }
}

impl TaskRegistry for OrderedRegistry {
    fn insert(&mut self, control: TaskControl) {
        let id = control.id();
        let key = self.nodes.insert(Node {
            control,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        self.index.insert(id, key);
    }

    fn remove(&mut self, id: TaskId) -> Option<TaskControl> {
        let key = self.index.remove(&id)?;
        let node = self.nodes.remove(key);
        match node.prev {
            Some(prev) => self.nodes[prev].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes[next].prev = node.prev,
            None => self.tail = node.prev,
        }
        Some(node.control)
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn for_each(&self, f: &mut dyn FnMut(&TaskControl)) {
        let mut slot = self.head;
        while let Some(key) = slot {
            let node = &self.nodes[key];
            f(&node.control);
            slot = node.next;
        }
    }

    fn view(&self) -> RegistryView {
        RegistryView::Live
    }

    fn next_after(&self, cursor: Option<TaskId>) -> Option<TaskControl> {
        let slot = match cursor {
            None => self.head,
            Some(id) => match self.index.get(&id) {
                Some(&key) => self.nodes[key].next,
                None => self.first_after(id),
            },
        };
        slot.map(|key| self.nodes[key].control.clone())
    }
}

impl std::fmt::Debug for OrderedRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids = Vec::with_capacity(self.len());
        self.for_each(&mut |control| ids.push(control.id()));
        f.debug_struct("OrderedRegistry").field("ids", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::control;

    fn ids(registry: &OrderedRegistry) -> Vec<u64> {
        let mut ids = Vec::new();
        registry.for_each(&mut |control| ids.push(control.id().as_u64()));
        ids
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut registry = OrderedRegistry::new();
        for id in 1..=5 {
            registry.insert(control(id));
        }
        assert_eq!(ids(&registry), vec![1, 2, 3, 4, 5]);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_remove_head_middle_and_tail() {
        let mut registry = OrderedRegistry::new();
        for id in 1..=5 {
            registry.insert(control(id));
        }

        assert!(registry.remove(TaskId(3)).is_some());
        assert_eq!(ids(&registry), vec![1, 2, 4, 5]);
        assert!(registry.remove(TaskId(1)).is_some());
        assert!(registry.remove(TaskId(5)).is_some());
        assert_eq!(ids(&registry), vec![2, 4]);
        assert!(registry.remove(TaskId(5)).is_none());

        registry.insert(control(6));
        assert_eq!(ids(&registry), vec![2, 4, 6]);

        registry.remove(TaskId(2));
        registry.remove(TaskId(4));
        registry.remove(TaskId(6));
        assert!(registry.is_empty());
        assert!(registry.next_after(None).is_none());
    }

    #[test]
    fn test_cursor_survives_removal() {
        let mut registry = OrderedRegistry::new();
        for id in 1..=4 {
            registry.insert(control(id));
        }

        let first = registry.next_after(None).unwrap();
        assert_eq!(first.id(), TaskId(1));
        let second = registry.next_after(Some(first.id())).unwrap();
        assert_eq!(second.id(), TaskId(2));

        // The cursor's own entry and its successor go away mid-walk.
        registry.remove(TaskId(2));
        registry.remove(TaskId(3));
        let next = registry.next_after(Some(second.id())).unwrap();
        assert_eq!(next.id(), TaskId(4));

        registry.insert(control(5));
        let last = registry.next_after(Some(next.id())).unwrap();
        assert_eq!(last.id(), TaskId(5));
        assert!(registry.next_after(Some(last.id())).is_none());
    }

    #[test]
    fn test_view_is_live() {
        assert!(matches!(OrderedRegistry::new().view(), RegistryView::Live));
    }
}
