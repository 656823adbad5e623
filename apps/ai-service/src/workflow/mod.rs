//! Fill-work-plan pipeline.
//!
//! An explicit state machine over `Node`. Every run starts from a fresh
//! `WorkflowState` and always ends with exactly one terminal result:
//!
//! ```text
//! ValidateInput -> LoadContext -> BuildPrompt -> Generate -> Parse -> ValidateOutput
//!       |                             |             |          |            |
//!       +-----------------------------+-------------+----------+------------+--> FormatError
//!                                                                           +--> FormatSuccess
//! ```
//!
//! With `max_retry_attempts > 0`, failures in Generate/Parse/ValidateOutput
//! loop back to Generate until the budget is spent.

pub mod formatter;
pub mod handlers;
pub mod input;
pub mod output;
pub mod prompt_builder;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::context::loaders::load_context;
use crate::context::store::ContextStore;
use crate::llm_client::{LlmError, MetadataGenerator};
use crate::models::work_plan::WorkPlanResult;
use state::{ErrorKind, StageError, WorkflowState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    ValidateInput,
    LoadContext,
    BuildPrompt,
    Generate,
    Parse,
    ValidateOutput,
    FormatSuccess,
    FormatError,
    End,
}

pub struct Workflow {
    store: Arc<dyn ContextStore>,
    generator: Arc<dyn MetadataGenerator>,
    template_dir: PathBuf,
    cached_template: Option<String>,
    max_retry_attempts: u32,
}

impl Workflow {
    pub fn new(
        store: Arc<dyn ContextStore>,
        generator: Arc<dyn MetadataGenerator>,
        template_dir: impl Into<PathBuf>,
        max_retry_attempts: u32,
    ) -> Self {
        Self {
            store,
            generator,
            template_dir: template_dir.into(),
            cached_template: None,
            max_retry_attempts,
        }
    }

    /// Skips the per-request template read.
    pub fn with_cached_template(mut self, template: impl Into<String>) -> Self {
        self.cached_template = Some(template.into());
        self
    }

    pub async fn fill_work_plan(&self, activity: &str, theme: &str) -> WorkPlanResult {
        let state = self.run(activity, theme).await;
        state.result.unwrap_or_else(|| {
            WorkPlanResult::Error(formatter::format_error(&[StageError::new(
                ErrorKind::Internal,
                "Przepływ zakończył się bez wyniku",
            )]))
        })
    }

    /// Runs the pipeline and returns the final state, including telemetry,
    /// warnings and every recorded error.
    pub async fn run(&self, activity: &str, theme: &str) -> WorkflowState {
        let span = info_span!("fill_work_plan", request_id = %Uuid::new_v4());
        self.execute(WorkflowState::new(activity, theme))
            .instrument(span)
            .await
    }

    async fn execute(&self, mut state: WorkflowState) -> WorkflowState {
        info!(
            "Starting work plan generation ({} chars activity)",
            state.activity.chars().count()
        );

        let mut node = Node::ValidateInput;
        while node != Node::End {
            debug!("Entering {node:?}");
            node = match node {
                Node::ValidateInput => self.validate_input(&mut state),
                Node::LoadContext => self.load_context(&mut state).await,
                Node::BuildPrompt => self.build_prompt(&mut state),
                Node::Generate => self.generate(&mut state).await,
                Node::Parse => self.parse(&mut state),
                Node::ValidateOutput => self.validate_output(&mut state),
                Node::FormatSuccess => {
                    let output = state.parsed_output.clone().unwrap_or_default();
                    let response = formatter::format_success(&state.activity, &output);
                    info!(
                        "Work plan generated: {} modules, {} curriculum refs, {} objectives",
                        response.modules.len(),
                        response.curriculum_refs.len(),
                        response.objectives.len()
                    );
                    state.result = Some(WorkPlanResult::Success(response));
                    Node::End
                }
                Node::FormatError => {
                    let response = formatter::format_error(&state.errors);
                    warn!(
                        "Work plan generation failed with {}: {:?}",
                        response.error_code,
                        state.error_messages()
                    );
                    state.result = Some(WorkPlanResult::Error(response));
                    Node::End
                }
                Node::End => Node::End,
            };
        }

        state
    }

    fn validate_input(&self, state: &mut WorkflowState) -> Node {
        let validated = input::validate_input(&state.activity, &state.theme);
        let valid = validated.is_valid();
        state.activity = validated.activity;
        state.theme = validated.theme;

        if valid {
            Node::LoadContext
        } else {
            validated.errors.into_iter().for_each(|e| state.fail(e));
            Node::FormatError
        }
    }

    async fn load_context(&self, state: &mut WorkflowState) -> Node {
        let (context, errors) = load_context(
            self.store.as_ref(),
            &self.template_dir,
            self.cached_template.as_deref(),
        )
        .await;
        state.context = context;

        let template_failed = errors.iter().any(|e| e.kind == ErrorKind::Template);
        for e in errors {
            if e.kind == ErrorKind::Template {
                state.fail(e);
            } else {
                warn!("Continuing with degraded context: {}", e.message);
                state.errors.push(e);
            }
        }

        if template_failed {
            Node::FormatError
        } else {
            Node::BuildPrompt
        }
    }

    fn build_prompt(&self, state: &mut WorkflowState) -> Node {
        match prompt_builder::construct_prompt(&state.activity, &state.theme, &state.context) {
            Ok(prompt) => {
                debug!("Constructed prompt ({} chars)", prompt.chars().count());
                state.prompt = Some(prompt);
                Node::Generate
            }
            Err(e) => {
                error!("Prompt construction failed: {e}");
                state.fail(StageError::new(ErrorKind::Template, e.to_string()));
                Node::FormatError
            }
        }
    }

    async fn generate(&self, state: &mut WorkflowState) -> Node {
        state.generation_attempts += 1;
        state.generation = None;
        state.parsed_output = None;

        let Some(prompt) = state.prompt.as_deref() else {
            state.fail(StageError::new(
                ErrorKind::Template,
                "Brak skonstruowanego promptu",
            ));
            return Node::FormatError;
        };

        match self.generator.generate(prompt).await {
            Ok(generation) => {
                let usage = generation.usage;
                info!(
                    attempt = state.generation_attempts,
                    total_tokens = usage.total_tokens,
                    has_reasoning = generation.reasoning.is_some(),
                    "Generation received: {} in / {} out tokens, ${:.6}",
                    usage.input_tokens,
                    usage.output_tokens,
                    usage.estimated_cost
                );
                state.generation = Some(generation);
                Node::Parse
            }
            Err(e) => {
                error!("LLM generation failed: {e}");
                state.fail(generation_error(e));
                self.retry_or_fail(state)
            }
        }
    }

    fn parse(&self, state: &mut WorkflowState) -> Node {
        let raw = state
            .generation
            .as_ref()
            .map(|g| g.raw_response.as_str())
            .unwrap_or_default();

        match output::parse_llm_response(raw) {
            Ok(parsed) => {
                state.parsed_output = Some(parsed);
                Node::ValidateOutput
            }
            Err(e) => {
                state.fail(e);
                self.retry_or_fail(state)
            }
        }
    }

    fn validate_output(&self, state: &mut WorkflowState) -> Node {
        let parsed = state.parsed_output.take().unwrap_or_default();
        let validation =
            output::validate_output(parsed, &state.context.modules, &state.context.curriculum_refs);

        let passed = validation.passed();
        state.parsed_output = Some(validation.output);
        state.warnings.extend(validation.warnings);

        if passed {
            state.validation_passed = true;
            Node::FormatSuccess
        } else {
            validation.errors.into_iter().for_each(|e| state.fail(e));
            self.retry_or_fail(state)
        }
    }

    fn retry_or_fail(&self, state: &WorkflowState) -> Node {
        if state.generation_attempts <= self.max_retry_attempts {
            warn!(
                "Retrying generation (attempt {} of {})",
                state.generation_attempts + 1,
                self.max_retry_attempts + 1
            );
            Node::Generate
        } else {
            Node::FormatError
        }
    }
}

fn generation_error(e: LlmError) -> StageError {
    match e {
        LlmError::Parse(e) => {
            StageError::new(ErrorKind::Parsing, format!("Błąd parsowania JSON: {e}"))
        }
        other => StageError::new(
            ErrorKind::Upstream,
            format!("Błąd podczas generowania odpowiedzi LLM: {other}"),
        ),
    }
}
