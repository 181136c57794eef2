//! HTTP handler for the wiring description endpoint.

use axum::{Json, extract::State};

use crate::{AppState, api::models::demo_info::DemoInfo};

#[tracing::instrument(skip_all)]
pub async fn get_demo_info(State(state): State<AppState>) -> Json<DemoInfo> {
    Json(DemoInfo::from(state.config.as_ref()))
}
