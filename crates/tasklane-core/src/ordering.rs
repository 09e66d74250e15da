//! Client-side ordering of the task list.
//!
//! The working set is rebuilt from the server collection on every change
//! (pending first, then completed, each in server order) and afterwards only
//! moves when the user drags a pending task. Completed tasks always stay at
//! the tail.

use tasklane_shared::TaskDto;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnknownSource,
    UnknownTarget,
    SourceCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderOutcome {
    Moved,
    Unchanged,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    tasks: Vec<TaskDto>,
}

impl WorkingSet {
    pub fn from_tasks(tasks: &[TaskDto]) -> Self {
        let mut set = Self::default();
        set.reset(tasks);
        set
    }

    /// Discards any local order and rebuilds from `tasks`.
    pub fn reset(&mut self, tasks: &[TaskDto]) {
        let (completed, pending): (Vec<_>, Vec<_>) =
            tasks.iter().cloned().partition(TaskDto::is_completed);
        self.tasks = pending;
        self.tasks.extend(completed);
        debug!(count = self.tasks.len(), "working set reset");
    }

    pub fn tasks(&self) -> &[TaskDto] {
        &self.tasks
    }

    pub fn ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|task| task.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TaskDto> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    /// Completed tasks are pinned to the tail and cannot be picked up.
    pub fn can_drag(&self, id: &str) -> bool {
        self.get(id).is_some_and(|task| !task.is_completed())
    }

    /// Moves `source` into the slot currently held by `target`, then sinks
    /// completed tasks back below pending ones.
    #[tracing::instrument(skip(self))]
    pub fn reorder(&mut self, source: &str, target: &str) -> ReorderOutcome {
        let Some(from) = self.position(source) else {
            return ReorderOutcome::Rejected(RejectReason::UnknownSource);
        };
        let Some(to) = self.position(target) else {
            return ReorderOutcome::Rejected(RejectReason::UnknownTarget);
        };
        if self.tasks[from].is_completed() {
            debug!("refusing to move completed task");
            return ReorderOutcome::Rejected(RejectReason::SourceCompleted);
        }
        if from == to {
            return ReorderOutcome::Unchanged;
        }

        let before: Vec<String> = self.tasks.iter().map(|task| task.id.clone()).collect();

        let moved = self.tasks.remove(from);
        self.tasks.insert(to, moved);
        // Stable: relative order inside each status group is kept.
        self.tasks.sort_by_key(TaskDto::is_completed);

        let changed = self
            .tasks
            .iter()
            .map(|task| task.id.as_str())
            .ne(before.iter().map(String::as_str));

        if changed {
            debug!(from, to, "moved task");
            ReorderOutcome::Moved
        } else {
            ReorderOutcome::Unchanged
        }
    }
}

/// Fixed-size pages over the working set.
///
/// The stored index is not reset when the underlying set changes; reads
/// clamp it to the pages that currently exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    page_size: usize,
    page: usize,
}

impl Pager {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            page: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.page_size)
    }

    fn last_index(&self, total: usize) -> usize {
        self.page_count(total).saturating_sub(1)
    }

    pub fn current(&self, total: usize) -> usize {
        self.page.min(self.last_index(total))
    }

    /// Jumps to `index`, clamped into range. Returns the page now shown.
    pub fn set_page(&mut self, index: usize, total: usize) -> usize {
        self.page = index.min(self.last_index(total));
        self.page
    }

    pub fn next(&mut self, total: usize) -> bool {
        let current = self.current(total);
        if current + 1 < self.page_count(total) {
            self.page = current + 1;
            true
        } else {
            false
        }
    }

    pub fn prev(&mut self, total: usize) -> bool {
        let current = self.current(total);
        if current > 0 {
            self.page = current - 1;
            true
        } else {
            false
        }
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.current(items.len()) * self.page_size;
        let end = (start + self.page_size).min(items.len());
        &items[start.min(items.len())..end]
    }
}

impl Default for Pager {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_PAGE_SIZE)
    }
}
