//! Read-only view of the hot-reloadable economics knobs, so a client can
//! show e.g. the live minimum stake without hardcoding it.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use wager_core::model::RuntimeConfigValues;

use crate::context::AppState;
use crate::error::AppError;

pub async fn get_config(State(state): State<Arc<AppState>>) -> Result<Json<RuntimeConfigValues>, AppError> {
    Ok(Json(*state.config.read().await))
}
