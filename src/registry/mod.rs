// ABOUTME: Registry strategies holding a service's outstanding task controls
// ABOUTME: Ordered registries iterate live in submission order, unordered ones hand out snapshots

pub mod ordered;
pub mod unordered;

pub use ordered::OrderedRegistry;
pub use unordered::UnorderedRegistry;

use serde::{Deserialize, Serialize};

use crate::engine::{TaskControl, TaskId, TaskStage};

/// Storage for the controls a service still tracks.
///
/// Implementations are only ever touched under the owning service's lock,
/// so they need no synchronization of their own.
pub trait TaskRegistry: Send + 'static {
    fn insert(&mut self, control: TaskControl);

    fn remove(&mut self, id: TaskId) -> Option<TaskControl>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn for_each(&self, f: &mut dyn FnMut(&TaskControl));

    /// How iteration over this registry behaves.
    fn view(&self) -> RegistryView;

    /// The entry following `cursor`, or the first entry for `None`.
    ///
    /// If `cursor` has been removed since it was handed out, iteration
    /// resumes at the first remaining entry submitted after it. Only
    /// registries whose view is [`RegistryView::Live`] are walked this way;
    /// snapshot registries keep the default, which yields nothing.
    fn next_after(&self, _cursor: Option<TaskId>) -> Option<TaskControl> {
        None
    }
}

/// Iteration behaviour offered by a registry.
#[derive(Debug)]
pub enum RegistryView {
    /// Walk the registry itself, seeing removals made while iterating.
    Live,
    /// Point-in-time copy of the entries, in no particular order.
    Snapshot(Vec<TaskControl>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    #[default]
    Ordered,
    Unordered,
}

impl RegistryKind {
    pub fn build(self) -> Box<dyn TaskRegistry> {
        match self {
            RegistryKind::Ordered => Box::new(OrderedRegistry::new()),
            RegistryKind::Unordered => Box::new(UnorderedRegistry::new()),
        }
    }
}

impl std::fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryKind::Ordered => write!(f, "ordered"),
            RegistryKind::Unordered => write!(f, "unordered"),
        }
    }
}

impl std::str::FromStr for RegistryKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ordered" => Ok(RegistryKind::Ordered),
            "unordered" => Ok(RegistryKind::Unordered),
            other => Err(anyhow::anyhow!("Unknown registry kind: {}", other)),
        }
    }
}

/// Moves every pending entry straight to `Cancelled`, returning how many moved.
pub(crate) fn cancel_pending(registry: &dyn TaskRegistry) -> usize {
    let mut cancelled = 0;
    registry.for_each(&mut |control| {
        if control.try_update_stage(TaskStage::Pending, TaskStage::Cancelled) {
            cancelled += 1;
        }
    });
    cancelled
}

pub(crate) fn all_finished(registry: &dyn TaskRegistry) -> bool {
    let mut finished = true;
    registry.for_each(&mut |control| {
        finished &= control.stage().is_terminal();
    });
    finished
}

/// Drops entries already in a terminal stage, returning how many went.
pub(crate) fn purge_finished(registry: &mut dyn TaskRegistry) -> usize {
    let mut finished = Vec::new();
    registry.for_each(&mut |control| {
        if control.stage().is_terminal() {
            finished.push(control.id());
        }
    });
    for id in &finished {
        registry.remove(*id);
    }
    finished.len()
}
