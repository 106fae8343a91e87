// src/handlers/admin.rs

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::{AppError, is_unique_violation},
    models::admin::{Admin, ChangePasswordRequest, ChangeUsernameRequest, LoginRequest},
    utils::hash::{hash_password, verify_password},
};

async fn find_admin(pool: &SqlitePool, username: &str) -> Result<Option<Admin>, AppError> {
    let admin = sqlx::query_as::<_, Admin>(
        "SELECT id, username, password_hash, created_at FROM admins WHERE username = ?1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!("Admin lookup DB error: {:?}", e);
        AppError::from(e)
    })?;

    Ok(admin)
}

/// Checks admin credentials.
///
/// Unknown user and wrong password both answer 401 with the same message.
pub async fn login(
    State(pool): State<SqlitePool>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let admin = find_admin(&pool, payload.username.trim())
        .await?
        .ok_or(AppError::AuthError("Invalid credentials".to_string()))?;

    if !verify_password(&payload.password, &admin.password_hash)? {
        tracing::info!("Failed login for admin {}", admin.username);
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    tracing::info!("Admin {} logged in", admin.username);

    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "admin": { "id": admin.id, "username": admin.username },
    })))
}

/// Lists admin accounts, without their hashes.
pub async fn info(State(pool): State<SqlitePool>) -> Result<impl IntoResponse, AppError> {
    let admins = sqlx::query_as::<_, Admin>(
        "SELECT id, username, password_hash, created_at FROM admins ORDER BY id",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!({ "success": true, "admins": admins })))
}

pub async fn change_password(
    State(pool): State<SqlitePool>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let admin = find_admin(&pool, payload.username.trim())
        .await?
        .ok_or(AppError::NotFound("Admin not found".to_string()))?;

    if !verify_password(&payload.current_password, &admin.password_hash)? {
        return Err(AppError::AuthError("Current password is incorrect".to_string()));
    }

    let hashed_password = hash_password(&payload.new_password)?;

    sqlx::query("UPDATE admins SET password_hash = ?1 WHERE id = ?2")
        .bind(hashed_password)
        .bind(admin.id)
        .execute(&pool)
        .await?;

    tracing::info!("Password changed for admin {}", admin.username);

    Ok(Json(json!({
        "success": true,
        "message": "Password changed successfully",
    })))
}

pub async fn change_username(
    State(pool): State<SqlitePool>,
    payload: Result<Json<ChangeUsernameRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let admin = find_admin(&pool, payload.current_username.trim())
        .await?
        .ok_or(AppError::NotFound("Admin not found".to_string()))?;

    if !verify_password(&payload.password, &admin.password_hash)? {
        return Err(AppError::AuthError("Password is incorrect".to_string()));
    }

    let new_username = payload.new_username.trim();

    sqlx::query("UPDATE admins SET username = ?1 WHERE id = ?2")
        .bind(new_username)
        .bind(admin.id)
        .execute(&pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Username already exists".to_string())
            } else {
                tracing::error!("Failed to rename admin: {:?}", e);
                AppError::from(e)
            }
        })?;

    tracing::info!("Admin {} renamed to {}", admin.username, new_username);

    Ok(Json(json!({
        "success": true,
        "message": "Username changed successfully",
        "admin": { "id": admin.id, "username": new_username },
    })))
}
