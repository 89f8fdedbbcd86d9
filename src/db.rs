use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::Result;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(path: &str) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Foreign keys stay enforced on every pooled connection: the
        // reports table relies on them to reject records for missing users.
        let options = SqliteConnectOptions::from_str(&url)?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                user_type TEXT NOT NULL,
                city TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // media_blob_id is a weak reference into blob_files on purpose:
        // blob release is best-effort, so a report row must stay deletable
        // even when its blob row is already gone (and vice versa).
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                fault_type TEXT NOT NULL,
                description TEXT,
                location_mode TEXT NOT NULL,
                city TEXT NOT NULL,
                street TEXT,
                house_number TEXT,
                latitude REAL,
                longitude REAL,
                media_blob_id TEXT,
                media_mime_type TEXT,
                created_by TEXT,
                creator_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'in-progress',
                municipality_response TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (creator_id) REFERENCES users(id),
                CHECK ((media_blob_id IS NULL) = (media_mime_type IS NULL))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Chunk rows are inserted before their blob_files row exists, so
        // blob_chunks carries no foreign key into blob_files.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blob_files (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                content_type TEXT NOT NULL,
                length INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blob_chunks (
                blob_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                data BLOB NOT NULL,
                PRIMARY KEY (blob_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Create indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_reports_creator_id ON reports(creator_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_reports_city ON reports(city)")
            .execute(&self.pool)
            .await?;

        tracing::info!("Database migrations completed");
        Ok(())
    }
}
