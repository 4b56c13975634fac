use std::collections::VecDeque;
use std::fmt;

use super::entry::QueuedEntry;

/// Pending tasks, highest priority first.
///
/// Within a priority band entries keep arrival order: a new entry goes in
/// front of the first entry with a strictly lower priority.
///
/// # Performance Characteristics
/// - O(n) push (linear scan for the insertion point)
/// - O(1) pop from the front
#[derive(Default)]
pub(crate) struct TaskQueue {
    entries: VecDeque<QueuedEntry>,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("len", &self.entries.len())
            .field("head_priority", &self.entries.front().map(QueuedEntry::priority))
            .finish()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: QueuedEntry) {
        let priority = entry.priority();
        let index = self
            .entries
            .iter()
            .position(|queued| queued.priority() < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(index, entry);
    }

    /// Put an entry back at the head, ahead of its priority band.
    ///
    /// Used when a popped entry could not be dispatched after all.
    pub fn push_front(&mut self, entry: QueuedEntry) {
        self.entries.push_front(entry);
    }

    pub fn pop(&mut self) -> Option<QueuedEntry> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry, in queue order.
    pub fn drain(&mut self) -> impl Iterator<Item = QueuedEntry> + '_ {
        self.entries.drain(..)
    }
}
