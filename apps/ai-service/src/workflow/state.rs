//! Typed per-run workflow state.
//!
//! One `WorkflowState` is created per request and owned by the orchestrator.
//! Nodes never see the whole struct: each node function takes the fields it
//! reads and returns the fields it writes, and the orchestrator records them.

use serde_json::{Map, Value};

use crate::llm_client::Generation;
use crate::models::curriculum::{
    CurriculumRefRow, MajorCurriculumRefRow, ModuleRow, TrainingExample,
};
use crate::models::work_plan::WorkPlanResult;

/// Where a recorded failure came from. Drives error-code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Input,
    ContextLoad,
    Template,
    Upstream,
    Parsing,
    Modules,
    Curriculum,
    Objectives,
    /// No specific source. The formatter classifies these by message text.
    Internal,
}

/// A failure recorded by a node. `message` is Polish and user-presentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Context gathered by the parallel loaders. Each slice is written once.
#[derive(Debug, Clone, Default)]
pub struct LoadedContext {
    pub modules: Vec<ModuleRow>,
    pub curriculum_refs: Vec<CurriculumRefRow>,
    pub major_refs: Vec<MajorCurriculumRefRow>,
    pub examples: Vec<TrainingExample>,
    pub template: String,
}

#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    // Input (trimmed by the input validator)
    pub activity: String,
    pub theme: String,

    pub context: LoadedContext,

    pub prompt: Option<String>,

    /// Latest generation attempt.
    pub generation: Option<Generation>,
    pub generation_attempts: u32,

    pub parsed_output: Option<Map<String, Value>>,

    pub validation_passed: bool,
    /// Append-only across every node that ran.
    pub errors: Vec<StageError>,
    pub warnings: Vec<String>,

    pub result: Option<WorkPlanResult>,
}

impl WorkflowState {
    pub fn new(activity: &str, theme: &str) -> Self {
        Self {
            activity: activity.to_string(),
            theme: theme.to_string(),
            ..Default::default()
        }
    }

    /// Records a failure and marks the run as failed.
    pub fn fail(&mut self, error: StageError) {
        self.validation_passed = false;
        self.errors.push(error);
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }
}
