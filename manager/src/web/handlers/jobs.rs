// Install job scheduling and history endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::common::{api_error, store_error, ApiResponse, ApiResult, HistoryQuery};
use crate::database::{InstallAction, InstallJob, InstallJobHistory, NewInstallJob};
use crate::errors::SchedulingError;
use crate::web::AppState;

#[derive(Debug, Deserialize)]
pub struct ScheduleInstallRequest {
    pub hostname: String,
    pub install_action: String,
    /// Defaults to now
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub packages: Vec<String>,
    /// Used when `packages` is empty
    pub software_profile: Option<String>,
    pub server_id: Option<i64>,
    #[serde(default)]
    pub server_directory: String,
    #[serde(default)]
    pub custom_command_profile_ids: Vec<i64>,
    pub dependency: Option<i64>,
    #[serde(default = "default_created_by")]
    pub created_by: String,
}

fn default_created_by() -> String {
    "admin".to_string()
}

/// List install jobs that have not been archived yet
pub async fn list_install_jobs(State(state): State<AppState>) -> ApiResult<Vec<InstallJob>> {
    let jobs = state.db.list_install_jobs().await.map_err(store_error)?;
    Ok(Json(ApiResponse::success(jobs)))
}

/// Schedule a new install job
pub async fn schedule_install_job(
    State(state): State<AppState>,
    Json(request): Json<ScheduleInstallRequest>,
) -> ApiResult<Value> {
    let options = state.db.get_system_option().await.map_err(store_error)?;
    if !options.can_schedule {
        warn!("Refusing install job for {}: scheduling disabled", request.hostname);
        return Err(store_error(SchedulingError::SchedulingDisabled.into()));
    }

    let install_action: InstallAction = request
        .install_action
        .parse()
        .map_err(|e: anyhow::Error| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    let host = state
        .db
        .get_host_by_name(&request.hostname)
        .await
        .map_err(store_error)?
        .ok_or_else(|| {
            store_error(
                SchedulingError::HostNotFound {
                    host: request.hostname.clone(),
                }
                .into(),
            )
        })?;

    let mut packages = request.packages;
    if packages.is_empty() {
        if let Some(profile_name) = &request.software_profile {
            let profile = state
                .db
                .get_software_profile(profile_name)
                .await
                .map_err(store_error)?
                .ok_or_else(|| {
                    api_error(
                        StatusCode::BAD_REQUEST,
                        format!("Unknown software profile '{}'", profile_name),
                    )
                })?;
            packages = profile.packages;
        }
    }

    let job = NewInstallJob {
        host_id: host.id,
        install_action,
        scheduled_time: request.scheduled_time.unwrap_or_else(Utc::now),
        packages,
        server_id: request.server_id,
        server_directory: request.server_directory,
        custom_command_profile_ids: request.custom_command_profile_ids,
        dependency: request.dependency,
        created_by: request.created_by,
    };

    let id = state.db.create_install_job(&job).await.map_err(store_error)?;
    info!(
        "Scheduled install job {} ({}) for {} at {}",
        id, install_action, host.hostname, job.scheduled_time
    );

    Ok(Json(ApiResponse::success(json!({
        "id": id,
        "hostname": host.hostname,
        "install_action": install_action.as_str(),
    }))))
}

/// Archived install jobs, newest first, optionally for one host
pub async fn list_install_history(
    Query(query): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> ApiResult<Vec<InstallJobHistory>> {
    let host_id = match &query.host {
        Some(hostname) => {
            let host = state
                .db
                .get_host_by_name(hostname)
                .await
                .map_err(store_error)?
                .ok_or_else(|| {
                    api_error(StatusCode::NOT_FOUND, format!("Unknown host '{}'", hostname))
                })?;
            Some(host.id)
        }
        None => None,
    };

    let history = state
        .db
        .list_install_history(host_id, query.limit.clamp(1, 1000))
        .await
        .map_err(store_error)?;
    Ok(Json(ApiResponse::success(history)))
}
