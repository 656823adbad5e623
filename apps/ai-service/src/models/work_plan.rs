use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /api/fill-work-plan`.
#[derive(Debug, Clone, Deserialize)]
pub struct FillWorkPlanRequest {
    pub activity: String,
    #[serde(default)]
    pub theme: Option<String>,
}

/// Successful generation result. `activity` is echoed from the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillWorkPlanResponse {
    pub activity: String,
    pub modules: Vec<String>,
    pub curriculum_refs: Vec<String>,
    pub objectives: Vec<String>,
}

/// Error body shared by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Polish, user-facing message.
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Terminal result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkPlanResult {
    Success(FillWorkPlanResponse),
    Error(ErrorResponse),
}

#[cfg(test)]
impl WorkPlanResult {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkPlanResult::Success(_))
    }
}
