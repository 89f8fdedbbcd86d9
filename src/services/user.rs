use chrono::Utc;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{CreateUserRequest, Report, User, UserResponse};
use crate::services::ReportService;
use crate::storage::BlobStore;

/// User service
pub struct UserService;

impl UserService {
    /// Create a user account
    pub async fn create_user(db: &Database, req: CreateUserRequest) -> Result<UserResponse> {
        if req.username.trim().is_empty() || req.user_type.trim().is_empty() {
            return Err(AppError::Validation(
                "Missing registration details.".to_string(),
            ));
        }

        let city = req
            .city
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if req.user_type.eq_ignore_ascii_case("employee") && city.is_none() {
            return Err(AppError::Validation(
                "Employees must be assigned to a city.".to_string(),
            ));
        }

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
            .bind(&req.username)
            .fetch_optional(db.pool())
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict("Username already exists.".to_string()));
        }

        let user_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO users (id, username, user_type, city, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user_id)
        .bind(&req.username)
        .bind(&req.user_type)
        .bind(&city)
        .bind(&now)
        .execute(db.pool())
        .await?;

        Ok(UserResponse {
            id: user_id,
            username: req.username,
            user_type: req.user_type,
            city,
        })
    }

    /// List all users
    pub async fn list_users(db: &Database) -> Result<Vec<UserResponse>> {
        let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY created_at")
            .fetch_all(db.pool())
            .await?;

        Ok(users.into_iter().map(UserResponse::from).collect())
    }

    /// Delete a user together with every report they own.
    ///
    /// Reports are taken down one at a time so each media blob is released
    /// exactly once through the store; a bulk row delete would leave the
    /// blobs behind. A missing user still reports `NotFound` even when
    /// reports were removed, so a retry after partial failure only fails on
    /// the user lookup, never on the already-deleted reports.
    pub async fn delete_user(db: &Database, blobs: &BlobStore, user_id: &str) -> Result<u64> {
        let reports: Vec<Report> = sqlx::query_as("SELECT * FROM reports WHERE creator_id = ?")
            .bind(user_id)
            .fetch_all(db.pool())
            .await?;

        let mut deleted = 0u64;
        for report in reports {
            ReportService::release_media(blobs, &report).await;
            let result = sqlx::query("DELETE FROM reports WHERE id = ?")
                .bind(&report.id)
                .execute(db.pool())
                .await?;
            deleted += result.rows_affected();
        }
        tracing::info!("Deleted {} reports for user {}", deleted, user_id);

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(db.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found.".to_string()));
        }

        Ok(deleted)
    }
}
