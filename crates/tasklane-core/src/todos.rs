use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tasklane_shared::{Envelope, ListEnvelope, TaskCreate, TaskDto, TaskPatch, TaskStatus};
use tracing::{debug, info, instrument, warn};

use crate::error::ApiError;
use crate::session::{ApiRequest, SessionClient};

pub const TODOS_PATH: &str = "/todos";

const FETCH_FAILED: &str = "Failed to fetch todos";
const CREATE_FAILED: &str = "Failed to create todo";
const UPDATE_FAILED: &str = "Failed to update todo";
const DELETE_FAILED: &str = "Failed to delete todo";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub pending: usize,
    pub completed: usize,
}

impl TaskCounts {
    pub fn of(tasks: &[TaskDto]) -> Self {
        let completed = tasks.iter().filter(|task| task.is_completed()).count();
        Self {
            pending: tasks.len() - completed,
            completed,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The response replaced the cache.
    Applied(usize),
    /// A newer fetch was issued while this one was in flight; dropped.
    Stale,
}

#[derive(Debug, Default)]
struct CacheState {
    todos: Vec<TaskDto>,
    error: Option<String>,
}

/// Task CRUD against the API plus the locally cached collection.
///
/// Every operation clears the previous error before it starts. Failures keep
/// the cache as it was, store a readable message and are returned to the
/// caller as well.
pub struct TodoStore {
    client: Arc<SessionClient>,
    state: Mutex<CacheState>,
    fetch_seq: AtomicU64,
}

impl TodoStore {
    pub fn new(client: Arc<SessionClient>) -> Self {
        Self {
            client,
            state: Mutex::new(CacheState::default()),
            fetch_seq: AtomicU64::new(0),
        }
    }

    pub fn todos(&self) -> Vec<TaskDto> {
        self.state.lock().todos.clone()
    }

    pub fn find(&self, id: &str) -> Option<TaskDto> {
        self.state.lock().todos.iter().find(|task| task.id == id).cloned()
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn counts(&self) -> TaskCounts {
        TaskCounts::of(&self.state.lock().todos)
    }

    pub fn clear_error(&self) {
        self.state.lock().error = None;
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, status: Option<TaskStatus>) -> Result<FetchOutcome, ApiError> {
        let ticket = self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.clear_error();

        let mut request = ApiRequest::get(TODOS_PATH);
        if let Some(status) = status {
            request = request.param("status", status.as_str());
        }
        let result = self.client.request::<ListEnvelope<TaskDto>>(request).await;

        let mut state = self.state.lock();
        let latest = self.fetch_seq.load(Ordering::SeqCst);

        if ticket != latest {
            debug!(ticket, latest, "discarding response of superseded fetch");
            return match result {
                Ok(_) => Ok(FetchOutcome::Stale),
                Err(err) => Err(err),
            };
        }

        match result {
            Ok(envelope) => {
                state.todos = envelope.into_items();
                info!(count = state.todos.len(), "fetched todos");
                Ok(FetchOutcome::Applied(state.todos.len()))
            }
            Err(err) => {
                warn!(error = %err, "fetch failed; keeping cached todos");
                state.error = Some(err.user_message(FETCH_FAILED));
                Err(err)
            }
        }
    }

    #[instrument(skip(self, data), fields(title = %data.title))]
    pub async fn create(&self, data: &TaskCreate) -> Result<TaskDto, ApiError> {
        self.clear_error();
        if data.title.trim().is_empty() {
            return self.record(
                Err(ApiError::Validation("Title is required".to_string())),
                CREATE_FAILED,
            );
        }

        let result = async {
            let request = ApiRequest::post(TODOS_PATH).json(data)?;
            self.client.request::<Envelope<TaskDto>>(request).await
        }
        .await;

        let created = self.record(result, CREATE_FAILED)?.data;
        self.state.lock().todos.insert(0, created.clone());
        info!(id = %created.id, "created todo");
        Ok(created)
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: &TaskPatch) -> Result<TaskDto, ApiError> {
        self.clear_error();
        if patch.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
            return self.record(
                Err(ApiError::Validation("Title is required".to_string())),
                UPDATE_FAILED,
            );
        }

        let result = async {
            let request = ApiRequest::patch(task_path(id)).json(patch)?;
            self.client.request::<Envelope<TaskDto>>(request).await
        }
        .await;

        let updated = self.record(result, UPDATE_FAILED)?.data;
        let mut state = self.state.lock();
        match state.todos.iter_mut().find(|task| task.id == id) {
            Some(slot) => *slot = updated.clone(),
            None => debug!("updated todo is not in the cache"),
        }
        info!(status = ?updated.status, "updated todo");
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.clear_error();
        let result = self.client.request_empty(ApiRequest::delete(task_path(id))).await;
        self.record(result, DELETE_FAILED)?;

        let mut state = self.state.lock();
        let before = state.todos.len();
        state.todos.retain(|task| task.id != id);
        info!(removed = before - state.todos.len(), "deleted todo");
        Ok(())
    }

    pub async fn toggle_status(
        &self,
        id: &str,
        current: TaskStatus,
    ) -> Result<TaskDto, ApiError> {
        self.update(id, &TaskPatch::status(current.flip())).await
    }

    fn record<T>(&self, result: Result<T, ApiError>, fallback: &str) -> Result<T, ApiError> {
        if let Err(err) = &result {
            warn!(error = %err, "todo operation failed");
            self.state.lock().error = Some(err.user_message(fallback));
        }
        result
    }
}

fn task_path(id: &str) -> String {
    format!("{TODOS_PATH}/{id}")
}
