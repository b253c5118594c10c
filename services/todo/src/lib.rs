//! Todo Service
//!
//! Intake service for todo items. A creation request is validated, its
//! optional attachment is uploaded to S3, the item is persisted in PostgreSQL,
//! and a `todo_created` event is announced on Kafka.
//!
//! ## Failure policy
//!
//! - Validation and identifier errors are rejected before any I/O
//! - Upload or persistence failures abort the creation; an attachment uploaded
//!   before a persistence failure is left in the bucket
//! - Event delivery is retried (3 attempts, 500ms apart by default) and its
//!   failure is logged but never fails the creation
//!
//! ## Architecture
//!
//! ```text
//!  HTTP multipart           S3 Bucket              PostgreSQL           Kafka
//! ┌──────────────┐       ┌──────────────┐       ┌──────────────┐    ┌──────────────┐
//! │ POST         │       │ todos/       │       │ todo_items   │    │ todo.created │
//! │ /api/v1/     │       │   {id}/      │       └──────────────┘    └──────────────┘
//! │  upload      │       │   {random}   │              ▲                   ▲
//! └──────────────┘       └──────────────┘              │                   │
//!        │                      ▲                      │                   │
//!        ▼                      │                      │                   │
//! ┌──────────────┐  1   ┌──────────────┐  2   ┌──────────────┐  3  ┌──────────────┐
//! │ TodoService  │─────▶│ FileStorage  │      │ TodoRepo     │     │ Message      │
//! │              │─────────────────────────▶ │              │     │ Publisher    │
//! │              │──────────────────────────────────────────────▶  │ (retried)    │
//! └──────────────┘                           └──────────────┘     └──────────────┘
//! ```

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod kafka_publisher;
pub mod ports;
pub mod retry;
pub mod s3_storage;
pub mod todo_service;
pub mod todo_store;

pub use api::AppState;
pub use config::Config;
pub use domain::{NewTodoRecord, TodoCreatedEvent, TodoItem};
pub use error::{TodoError, ValidationError};
pub use kafka_publisher::KafkaPublisher;
pub use ports::{FileStorage, MessagePublisher, TodoRepository};
pub use retry::{RetryError, RetryPolicy};
pub use s3_storage::S3FileStorage;
pub use todo_service::{generate_file_key, CreatedTodo, PublishOutcome, TodoService};
pub use todo_store::PgTodoRepository;
