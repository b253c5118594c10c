//! Todo creation workflow.
//!
//! Validation, optional attachment upload, persistence and event announcement,
//! in that order. Only the event step is retried, and its failure never fails
//! the creation: once the record is stored the todo exists.

use crate::domain::{NewTodoRecord, TodoCreatedEvent, TodoItem};
use crate::error::TodoError;
use crate::ports::{FileStorage, MessagePublisher, TodoRepository};
use crate::retry::{RetryError, RetryPolicy};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// How the todo-created event fared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered { attempts: u32 },
    Failed,
}

/// Result of a successful creation
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedTodo {
    /// The record as written to the repository
    pub record: NewTodoRecord,
    pub publish: PublishOutcome,
}

/// Orchestrates todo creation across the repository, file storage and queue
pub struct TodoService {
    repository: Arc<dyn TodoRepository>,
    file_storage: Arc<dyn FileStorage>,
    publisher: Arc<dyn MessagePublisher>,
    publish_retry: RetryPolicy,
}

impl TodoService {
    pub fn new(
        repository: Arc<dyn TodoRepository>,
        file_storage: Arc<dyn FileStorage>,
        publisher: Arc<dyn MessagePublisher>,
    ) -> Self {
        Self {
            repository,
            file_storage,
            publisher,
            publish_retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy used for event delivery
    pub fn with_publish_retry(mut self, policy: RetryPolicy) -> Self {
        self.publish_retry = policy;
        self
    }

    /// Create a todo, optionally attaching `file_data`.
    ///
    /// Empty or absent `file_data` means no attachment. Upload and persistence
    /// failures abort the call. A file uploaded before a persistence failure
    /// stays in storage. Event delivery failures are logged and reported in
    /// [`CreatedTodo::publish`] only.
    ///
    /// If `cancel` fires, the collaborator call in flight is dropped and
    /// [`TodoError::Cancelled`] is returned. Nothing already written is undone.
    #[instrument(skip(self, item, file_data, cancel), fields(todo_id = %item.id))]
    pub async fn create_todo(
        &self,
        mut item: TodoItem,
        file_data: Option<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<CreatedTodo, TodoError> {
        let started = Instant::now();

        if let Err(e) = item.validate() {
            warn!(error = %e, "todo validation failed");
            metrics::counter!("todo.validation.rejected").increment(1);
            return Err(e.into());
        }

        let todo_id = Uuid::parse_str(&item.id).map_err(|source| TodoError::InvalidIdentifier {
            id: item.id.clone(),
            source,
        })?;

        if let Some(data) = file_data.filter(|data| !data.is_empty()) {
            let key = generate_file_key(&item.id);
            let size_bytes = data.len();

            debug!(key = %key, size_bytes = size_bytes, "Uploading todo attachment");

            let file_id = until_cancelled(cancel, self.file_storage.upload(&key, data))
                .await?
                .map_err(|e| {
                    warn!(error = %e, key = %key, "failed to upload file");
                    TodoError::FileUpload(e)
                })?;

            metrics::counter!("todo.files.uploaded").increment(1);
            item.file_id = Some(file_id);
        }

        let record = NewTodoRecord::new(todo_id, &item, Utc::now());

        until_cancelled(cancel, self.repository.create(&record))
            .await?
            .map_err(|e| {
                warn!(
                    error = %e,
                    file_id = ?record.file_id,
                    "failed to save todo, attachment left in storage"
                );
                TodoError::Persistence(e)
            })?;

        info!(todo_id = %record.id, file_id = ?record.file_id, "Todo persisted");
        metrics::counter!("todo.created").increment(1);

        let event = TodoCreatedEvent::from(&record);
        let publish = match self.publish_todo_event(&event, cancel).await {
            Ok(attempts) => {
                metrics::counter!("todo.events.published").increment(1);
                PublishOutcome::Delivered { attempts }
            }
            Err(TodoError::Cancelled) => return Err(TodoError::Cancelled),
            Err(e) => {
                warn!(error = %e, "failed to publish todo event");
                metrics::counter!("todo.events.publish_failed").increment(1);
                PublishOutcome::Failed
            }
        };

        metrics::histogram!("todo.create.duration_seconds")
            .record(started.elapsed().as_secs_f64());

        Ok(CreatedTodo { record, publish })
    }

    /// Serialize and deliver the event, returning the attempts it took
    async fn publish_todo_event(
        &self,
        event: &TodoCreatedEvent,
        cancel: &CancellationToken,
    ) -> Result<u32, TodoError> {
        let payload = serde_json::to_string(event)?;

        self.publish_retry
            .run(cancel, |_| self.publisher.publish(&payload), |_| false)
            .await
            .map(|((), attempts)| attempts)
            .map_err(|e| match e {
                RetryError::Exhausted { attempts, error }
                | RetryError::Aborted { attempts, error } => TodoError::Publish {
                    attempts,
                    source: error,
                },
                RetryError::Cancelled => TodoError::Cancelled,
            })
    }
}

/// Storage key for an attachment: `todos/{todo_id}/{random}`
pub fn generate_file_key(todo_id: &str) -> String {
    format!("todos/{}/{}", todo_id, Uuid::new_v4())
}

async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, TodoError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TodoError::Cancelled),
        out = fut => Ok(out),
    }
}
