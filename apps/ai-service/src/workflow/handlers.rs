use axum::{extract::rejection::JsonRejection, extract::State, Json};

use crate::errors::AppError;
use crate::models::work_plan::{FillWorkPlanRequest, FillWorkPlanResponse, WorkPlanResult};
use crate::state::AppState;

/// POST /api/fill-work-plan
pub async fn handle_fill_work_plan(
    State(state): State<AppState>,
    payload: Result<Json<FillWorkPlanRequest>, JsonRejection>,
) -> Result<Json<FillWorkPlanResponse>, AppError> {
    let Json(req) = payload?;
    let theme = req.theme.as_deref().unwrap_or_default();

    match state.workflow.fill_work_plan(&req.activity, theme).await {
        WorkPlanResult::Success(response) => Ok(Json(response)),
        WorkPlanResult::Error(response) => Err(AppError::Generation(response)),
    }
}
