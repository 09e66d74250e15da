use anyhow::anyhow;
use tasklane_shared::{TaskCreate, TaskDto, TaskPatch, TaskStatus};
use tracing::{debug, instrument};

use crate::error::ApiError;
use crate::gesture::ReorderCommand;
use crate::ordering::{Pager, ReorderOutcome, WorkingSet};
use crate::todos::{FetchOutcome, TaskCounts, TodoStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Completed,
}

impl StatusFilter {
    pub fn as_status(self) -> Option<TaskStatus> {
        match self {
            Self::All => None,
            Self::Pending => Some(TaskStatus::Pending),
            Self::Completed => Some(TaskStatus::Completed),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "All Tasks",
            Self::Pending => "To Do",
            Self::Completed => "Completed",
        }
    }
}

impl std::str::FromStr for StatusFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "pending" | "todo" => Ok(Self::Pending),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(anyhow!("unknown filter: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    /// Zero-based.
    pub index: usize,
    pub count: usize,
    pub total: usize,
    /// Position of the first visible task within the working set.
    pub offset: usize,
}

/// Everything the list view shows: cached tasks, their local order, the
/// current page and the active status filter.
pub struct Dashboard {
    todos: TodoStore,
    working: WorkingSet,
    pager: Pager,
    filter: StatusFilter,
}

impl Dashboard {
    pub fn new(todos: TodoStore, page_size: usize) -> Self {
        Self {
            todos,
            working: WorkingSet::default(),
            pager: Pager::new(page_size),
            filter: StatusFilter::default(),
        }
    }

    pub fn todos(&self) -> &TodoStore {
        &self.todos
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working
    }

    pub fn filter(&self) -> StatusFilter {
        self.filter
    }

    pub fn error(&self) -> Option<String> {
        self.todos.error()
    }

    pub fn counts(&self) -> TaskCounts {
        self.todos.counts()
    }

    fn reset(&mut self) {
        self.working.reset(&self.todos.todos());
    }

    #[instrument(skip(self), fields(filter = ?self.filter))]
    pub async fn refresh(&mut self) -> Result<(), ApiError> {
        let outcome = self.todos.fetch(self.filter.as_status()).await?;
        if let FetchOutcome::Applied(_) = outcome {
            self.reset();
        }
        Ok(())
    }

    pub async fn set_filter(&mut self, filter: StatusFilter) -> Result<(), ApiError> {
        debug!(?filter, "changing status filter");
        self.filter = filter;
        self.refresh().await
    }

    pub async fn create(&mut self, data: &TaskCreate) -> Result<TaskDto, ApiError> {
        let created = self.todos.create(data).await?;
        self.reset();
        Ok(created)
    }

    pub async fn update(&mut self, id: &str, patch: &TaskPatch) -> Result<TaskDto, ApiError> {
        let updated = self.todos.update(id, patch).await?;
        self.reset();
        Ok(updated)
    }

    pub async fn toggle(&mut self, id: &str) -> Result<TaskDto, ApiError> {
        let current = self
            .todos
            .find(id)
            .map(|task| task.status)
            .ok_or_else(|| ApiError::Validation(format!("no task with id {id}")))?;
        let updated = self.todos.toggle_status(id, current).await?;
        self.reset();
        Ok(updated)
    }

    pub async fn delete(&mut self, id: &str) -> Result<(), ApiError> {
        self.todos.delete(id).await?;
        self.reset();
        Ok(())
    }

    pub fn reorder(&mut self, source: &str, target: &str) -> ReorderOutcome {
        self.working.reorder(source, target)
    }

    pub fn apply(&mut self, command: &ReorderCommand) -> ReorderOutcome {
        self.reorder(&command.source, &command.target)
    }

    pub fn visible(&self) -> &[TaskDto] {
        self.pager.slice(self.working.tasks())
    }

    pub fn page_info(&self) -> PageInfo {
        let total = self.working.len();
        let index = self.pager.current(total);
        PageInfo {
            index,
            count: self.pager.page_count(total).max(1),
            total,
            offset: index * self.pager.page_size(),
        }
    }

    pub fn next_page(&mut self) -> bool {
        self.pager.next(self.working.len())
    }

    pub fn prev_page(&mut self) -> bool {
        self.pager.prev(self.working.len())
    }

    pub fn set_page(&mut self, index: usize) -> usize {
        self.pager.set_page(index, self.working.len())
    }

    /// Accepts a 1-based row number from the list, a full id, or a unique id
    /// prefix or suffix (the table shows id tails).
    pub fn resolve(&self, token: &str) -> Option<String> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        if let Ok(row) = token.parse::<usize>()
            && row >= 1
            && let Some(task) = self.working.tasks().get(row - 1)
        {
            return Some(task.id.clone());
        }
        if self.working.get(token).is_some() {
            return Some(token.to_string());
        }

        let mut matches = self
            .working
            .tasks()
            .iter()
            .filter(|task| task.id.starts_with(token) || task.id.ends_with(token));
        let first = matches.next()?;
        if matches.next().is_some() {
            None
        } else {
            Some(first.id.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_parses_aliases() {
        assert_eq!("todo".parse::<StatusFilter>().ok(), Some(StatusFilter::Pending));
        assert_eq!(" Done ".parse::<StatusFilter>().ok(), Some(StatusFilter::Completed));
        assert_eq!("all".parse::<StatusFilter>().ok(), Some(StatusFilter::All));
        assert!("later".parse::<StatusFilter>().is_err());
    }

    #[test]
    fn filter_maps_to_query_status() {
        assert_eq!(StatusFilter::All.as_status(), None);
        assert_eq!(StatusFilter::Completed.as_status(), Some(TaskStatus::Completed));
        assert_eq!(StatusFilter::Pending.label(), "To Do");
    }
}
