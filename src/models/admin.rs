// src/models/admin.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'admins' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Admin {
    pub id: i64,

    /// Unique login name.
    pub username: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password_hash: String,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for admin login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 50, message = "Username is required"))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 128, message = "Password is required"))]
    pub password: String,
}

/// DTO for changing an admin password.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Username, current password, and new password are required"))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Username, current password, and new password are required"))]
    pub current_password: String,
    #[serde(default)]
    #[validate(length(
        min = 6,
        max = 128,
        message = "New password must be at least 6 characters long"
    ))]
    pub new_password: String,
}

/// DTO for renaming an admin account.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangeUsernameRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Current username, new username, and password are required"))]
    pub current_username: String,
    #[serde(default)]
    #[validate(length(
        min = 3,
        max = 50,
        message = "New username must be at least 3 characters long"
    ))]
    pub new_username: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Current username, new username, and password are required"))]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_password_requires_six_characters() {
        let request: ChangePasswordRequest = serde_json::from_value(serde_json::json!({
            "username": "admin",
            "currentPassword": "admin123",
            "newPassword": "12345"
        }))
        .unwrap();
        assert!(request.validate().is_err());

        let request: ChangePasswordRequest = serde_json::from_value(serde_json::json!({
            "username": "admin",
            "currentPassword": "admin123",
            "newPassword": "123456"
        }))
        .unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_change_username_requires_all_fields() {
        let request: ChangeUsernameRequest = serde_json::from_value(serde_json::json!({
            "currentUsername": "admin",
            "newUsername": "registrar"
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }
}
