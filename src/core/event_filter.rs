// src/core/event_filter.rs
use std::collections::HashSet;

use super::model::{Module, TypeId, TypeSymbol};

/// Decides which fields stay untouched because they presumably back an event.
///
/// Compilers store an event's delegate in a private field with the event's
/// name. Making that field public would clash with the event itself, so any
/// field whose name equals an event name anywhere in the module is skipped.
/// The match is exact and global across types: a best-effort heuristic that
/// can over-exclude (unrelated field sharing an event name) and under-exclude
/// (toolchains that mangle backing-field names).
#[derive(Debug, Clone, Default)]
pub struct EventBackingFieldFilter {
    event_names: HashSet<String>,
}

impl EventBackingFieldFilter {
    /// Collect event names over the flattened type sequence
    pub fn from_types(module: &Module, order: &[TypeId]) -> Self {
        let event_names = order
            .iter()
            .filter_map(|id| module.get(*id))
            .flat_map(|ty| ty.events.iter().map(|e| e.name.clone()))
            .collect();

        Self { event_names }
    }

    /// A filter that excludes nothing
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether the field `name` declared on `owner` must keep its visibility
    pub fn excludes(&self, _owner: &TypeSymbol, name: &str) -> bool {
        self.event_names.contains(name)
    }

    pub fn event_count(&self) -> usize {
        self.event_names.len()
    }
}
