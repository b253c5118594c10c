use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A todo item as submitted by the intake layer
#[derive(Debug, Clone, PartialEq)]
pub struct TodoItem {
    /// Item identifier, expected to be a UUID string
    pub id: String,
    /// Free-form description
    pub description: String,
    /// When the item is due
    pub due_date: DateTime<Utc>,
    /// Storage key of the attachment, set once the upload succeeded
    pub file_id: Option<String>,
}

impl TodoItem {
    pub fn new(id: impl Into<String>, description: impl Into<String>, due_date: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            due_date,
            file_id: None,
        }
    }

    /// Check item invariants against the current clock
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_at(Utc::now())
    }

    /// Check item invariants against `now`. The due date must be strictly later.
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        if self.description.is_empty() {
            return Err(ValidationError::EmptyDescription);
        }
        if self.due_date <= now {
            return Err(ValidationError::DueDateNotInFuture);
        }
        Ok(())
    }
}

/// Row written to `todo_items`
#[derive(Debug, Clone, PartialEq)]
pub struct NewTodoRecord {
    pub id: Uuid,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub file_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewTodoRecord {
    /// Build a fresh record; both timestamps are `now`
    pub fn new(id: Uuid, item: &TodoItem, now: DateTime<Utc>) -> Self {
        Self {
            id,
            description: item.description.clone(),
            due_date: item.due_date,
            file_id: item.file_id.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Event announced on the queue once a todo is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoCreatedEvent {
    pub id: Uuid,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub file_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&NewTodoRecord> for TodoCreatedEvent {
    fn from(record: &NewTodoRecord) -> Self {
        Self {
            id: record.id,
            description: record.description.clone(),
            due_date: record.due_date,
            file_id: record.file_id.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn item(description: &str, due_date: DateTime<Utc>) -> TodoItem {
        TodoItem::new(Uuid::new_v4().to_string(), description, due_date)
    }

    #[test]
    fn test_validate_accepts_future_due_date() {
        let now = Utc::now();
        assert_eq!(item("Buy milk", now + Duration::hours(24)).validate_at(now), Ok(()));
    }

    #[test]
    fn test_validate_rejects_empty_description() {
        let now = Utc::now();
        assert_eq!(
            item("", now + Duration::hours(24)).validate_at(now),
            Err(ValidationError::EmptyDescription)
        );
    }

    #[test]
    fn test_validate_requires_strictly_future_due_date() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();

        assert_eq!(
            item("Buy milk", now).validate_at(now),
            Err(ValidationError::DueDateNotInFuture)
        );
        assert_eq!(
            item("Buy milk", now - Duration::hours(1)).validate_at(now),
            Err(ValidationError::DueDateNotInFuture)
        );
        assert!(item("Buy milk", now + Duration::milliseconds(1))
            .validate_at(now)
            .is_ok());
    }

    #[test]
    fn test_event_serializes_stable_field_names() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let todo = TodoItem::new(id.to_string(), "Buy milk", now + Duration::hours(24));
        let record = NewTodoRecord::new(id, &todo, now);

        let json = serde_json::to_value(TodoCreatedEvent::from(&record)).unwrap();

        assert_eq!(json["id"], "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(json["description"], "Buy milk");
        assert_eq!(json["due_date"], "2024-01-16T10:30:00Z");
        assert_eq!(json["file_id"], serde_json::Value::Null);
        assert_eq!(json["created_at"], json["updated_at"]);
        assert_eq!(json.as_object().unwrap().len(), 6);
    }
}
