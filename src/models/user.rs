use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User model
///
/// Credentials live with the external authentication service; this record
/// only carries what report ownership and employee triage need.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub user_type: String,
    pub city: Option<String>,
    pub created_at: String,
}

/// Create user request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub user_type: String,
    pub city: Option<String>,
}

/// User listing entry
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub user_type: String,
    pub city: Option<String>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            user_type: user.user_type,
            city: user.city,
        }
    }
}

/// Response for a cascade user deletion
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeDeleteResponse {
    pub deleted_report_count: u64,
}
