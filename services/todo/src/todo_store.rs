use crate::config::DatabaseConfig;
use crate::domain::NewTodoRecord;
use crate::ports::TodoRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};

const INSERT_TODO: &str = r#"
    INSERT INTO todo_items (
        id, description, due_date, file_id, created_at, updated_at
    ) VALUES (
        $1, $2, $3, $4, $5, $6
    )
"#;

/// PostgreSQL-backed todo repository
pub struct PgTodoRepository {
    pool: PgPool,
}

impl PgTodoRepository {
    /// Create a new repository with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = pool_options(config)
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool (for health checks)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout())
        .idle_timeout(Some(config.idle_timeout()))
}

#[async_trait]
impl TodoRepository for PgTodoRepository {
    #[instrument(skip(self, record), fields(todo_id = %record.id))]
    async fn create(&self, record: &NewTodoRecord) -> Result<()> {
        sqlx::query(INSERT_TODO)
            .bind(record.id)
            .bind(&record.description)
            .bind(record.due_date)
            .bind(&record.file_id)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .context("Failed to insert todo item")?;

        debug!(file_id = ?record.file_id, "Todo row inserted");

        Ok(())
    }
}
