//! Outbound collaborators of the todo service.
//!
//! Concrete adapters live in [`crate::todo_store`], [`crate::s3_storage`] and
//! [`crate::kafka_publisher`]. Implementations must be safe to share across
//! concurrent requests.

use crate::domain::NewTodoRecord;
use anyhow::Result;
use async_trait::async_trait;

/// Durable store for todo records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TodoRepository: Send + Sync {
    /// Insert one record atomically
    async fn create(&self, record: &NewTodoRecord) -> Result<()>;
}

/// Blob storage for todo attachments
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store `data` under `key` and return the identifier to keep on the record
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<String>;
}

/// Queue receiving serialized events
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, message: &str) -> Result<()>;
}
