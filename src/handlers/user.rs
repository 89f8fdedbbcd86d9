use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::{ApiResponse, Result};
use crate::handlers::ensure_uuid;
use crate::models::{CascadeDeleteResponse, CreateUserRequest, UserResponse};
use crate::services::UserService;
use crate::AppState;

/// Create a user account
/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserResponse>>)> {
    let user = UserService::create_user(&state.db, req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

/// List all users
/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>> {
    let users = UserService::list_users(&state.db).await?;
    Ok(Json(ApiResponse::success(users)))
}

/// Delete a user and every report they own
/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<CascadeDeleteResponse>>> {
    ensure_uuid(&id, "Invalid user ID format.")?;
    let deleted_report_count = UserService::delete_user(&state.db, &state.blobs, &id).await?;
    Ok(Json(ApiResponse::success(CascadeDeleteResponse {
        deleted_report_count,
    })))
}
