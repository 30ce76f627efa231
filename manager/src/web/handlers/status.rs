// Status, option toggles and repository listing

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use super::common::{api_error, store_error, ApiResponse, ApiResult, RepositoryQuery, ToggleRequest};
use crate::database::{SystemLog, SystemOption};
use crate::scheduler::PoolsStatus;
use crate::web::AppState;

pub async fn get_health(State(state): State<AppState>) -> ApiResult<Value> {
    let options = state.db.get_system_option().await.map_err(store_error)?;
    Ok(Json(ApiResponse::success(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "can_schedule": options.can_schedule,
        "can_install": options.can_install,
        "enable_inventory": options.enable_inventory,
    }))))
}

/// Queue depth and in-flight keys of every executor pool
pub async fn get_pools(State(state): State<AppState>) -> ApiResult<PoolsStatus> {
    Ok(Json(ApiResponse::success(state.pools.status().await)))
}

/// Kill switch for install dispatch; running jobs are not interrupted
pub async fn set_can_install(
    State(state): State<AppState>,
    Json(request): Json<ToggleRequest>,
) -> ApiResult<SystemOption> {
    info!("can_install set to {}", request.enabled);
    state
        .db
        .set_can_install(request.enabled)
        .await
        .map_err(store_error)?;
    let options = state.db.get_system_option().await.map_err(store_error)?;
    Ok(Json(ApiResponse::success(options)))
}

pub async fn set_can_schedule(
    State(state): State<AppState>,
    Json(request): Json<ToggleRequest>,
) -> ApiResult<SystemOption> {
    info!("can_schedule set to {}", request.enabled);
    state
        .db
        .set_can_schedule(request.enabled)
        .await
        .map_err(store_error)?;
    let options = state.db.get_system_option().await.map_err(store_error)?;
    Ok(Json(ApiResponse::success(options)))
}

pub async fn get_system_logs(State(state): State<AppState>) -> ApiResult<Vec<SystemLog>> {
    let logs = state.db.list_system_logs(200).await.map_err(store_error)?;
    Ok(Json(ApiResponse::success(logs)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RepositoryFile {
    pub name: String,
    pub platform: String,
    pub release: String,
    pub smu: bool,
}

/// Package files available in the local repository, with the platform and
/// release their names map to
pub async fn list_repository_files(
    Query(query): Query<RepositoryQuery>,
    State(state): State<AppState>,
) -> ApiResult<Vec<RepositoryFile>> {
    match state.file_transport.list(&query.subdir).await {
        Ok(files) => {
            let files = files
                .into_iter()
                .map(|name| RepositoryFile {
                    platform: state.matcher.platform(&name).to_string(),
                    release: state.matcher.release(&name),
                    smu: state.matcher.is_smu(&name),
                    name,
                })
                .collect();
            Ok(Json(ApiResponse::success(files)))
        }
        Err(e) => {
            error!("Failed to list repository '{}': {:#}", query.subdir, e);
            Err(api_error(StatusCode::BAD_REQUEST, format!("{:#}", e)))
        }
    }
}
