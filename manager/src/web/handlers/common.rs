// Common types and utilities for API handlers

use axum::{http::StatusCode, response::Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::{ConfigError, ManagerError, SchedulingError};

// Helper type for API responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

pub fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiResponse<()>>) {
    (status, Json(ApiResponse::error(message.into())))
}

fn status_for(err: &ManagerError) -> StatusCode {
    match err {
        ManagerError::Scheduling(SchedulingError::SchedulingDisabled) => StatusCode::CONFLICT,
        ManagerError::Scheduling(SchedulingError::HostNotFound { .. }) => StatusCode::NOT_FOUND,
        ManagerError::Scheduling(SchedulingError::UnknownDependency { .. }) => {
            StatusCode::BAD_REQUEST
        }
        ManagerError::Scheduling(SchedulingError::HostInUse { .. }) => StatusCode::CONFLICT,
        ManagerError::Config(ConfigError::InvalidValue { .. }) => StatusCode::BAD_REQUEST,
        ManagerError::Device(_) => StatusCode::BAD_GATEWAY,
        ManagerError::Config(_) | ManagerError::Store(_) | ManagerError::Other(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Maps store, scheduling and device failures onto HTTP statuses
pub fn store_error(e: anyhow::Error) -> (StatusCode, Json<ApiResponse<()>>) {
    let err = ManagerError::from(e);
    let status = status_for(&err);
    if status.is_server_error() {
        error!("API request failed: {}", err);
    }
    api_error(status, err.to_string())
}

// Query parameters
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub host: Option<String>,
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct RepositoryQuery {
    #[serde(default)]
    pub subdir: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_failures_pick_their_status() {
        let (status, body) = store_error(SchedulingError::SchedulingDisabled.into());
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            body.0.message.as_deref(),
            Some("Scheduling error: Scheduling is disabled by the administrator")
        );

        let (status, _) = store_error(anyhow::Error::new(sqlx::Error::RowNotFound));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, _) = store_error(
            ConfigError::InvalidValue {
                field: "inventory_hour".into(),
                reason: "must be 0-23".into(),
            }
            .into(),
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
