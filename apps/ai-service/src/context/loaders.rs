//! Context loaders: the four independent reads that ground the prompt.
//!
//! Every loader swallows its own failure: it returns an empty slice plus
//! exactly one `StageError`. `load_context` runs all four with `tokio::join!`
//! so one failing read never cancels the others.

use std::path::Path;

use tracing::{debug, error};

use crate::context::store::ContextStore;
use crate::models::curriculum::{
    CurriculumRefRow, MajorCurriculumRefRow, ModuleRow, TrainingExample,
};
use crate::workflow::state::{ErrorKind, LoadedContext, StageError};

pub const TEMPLATE_FILE_NAME: &str = "fill_work_plan.txt";

/// Output of a single loader: its slice, and the error if the read failed.
#[derive(Debug)]
pub struct Loaded<T> {
    pub value: T,
    pub error: Option<StageError>,
}

impl<T: Default> Loaded<T> {
    fn ok(value: T) -> Self {
        Self { value, error: None }
    }

    fn failed(message: String) -> Self {
        Self {
            value: T::default(),
            error: Some(StageError::new(ErrorKind::ContextLoad, message)),
        }
    }
}

pub async fn load_modules(store: &dyn ContextStore) -> Loaded<Vec<ModuleRow>> {
    match store.list_modules().await {
        Ok(modules) => {
            debug!("Loaded {} modules", modules.len());
            Loaded::ok(modules)
        }
        Err(e) => {
            error!("Failed to load modules: {e:#}");
            Loaded::failed(format!(
                "Błąd podczas ładowania modułów z bazy danych: {e}"
            ))
        }
    }
}

/// Loads detailed references and their major sections together. A failure
/// in either query empties both slices.
pub async fn load_curriculum_refs(
    store: &dyn ContextStore,
) -> Loaded<(Vec<CurriculumRefRow>, Vec<MajorCurriculumRefRow>)> {
    let result = async {
        let refs = store.list_curriculum_refs().await?;
        let majors = store.list_major_refs().await?;
        anyhow::Ok((refs, majors))
    }
    .await;

    match result {
        Ok((refs, majors)) => {
            debug!(
                "Loaded {} curriculum refs in {} major sections",
                refs.len(),
                majors.len()
            );
            Loaded::ok((refs, majors))
        }
        Err(e) => {
            error!("Failed to load curriculum references: {e:#}");
            Loaded::failed(format!(
                "Błąd podczas ładowania podstawy programowej z bazy danych: {e}"
            ))
        }
    }
}

pub async fn load_examples(store: &dyn ContextStore) -> Loaded<Vec<TrainingExample>> {
    match store.list_examples().await {
        Ok(examples) => {
            debug!("Loaded {} training examples", examples.len());
            Loaded::ok(examples)
        }
        Err(e) => {
            error!("Failed to load training examples: {e:#}");
            Loaded::failed(format!(
                "Błąd podczas ładowania przykładów z bazy danych: {e}"
            ))
        }
    }
}

/// Reads the prompt template from `template_dir`, unless the caller already
/// cached it at startup.
pub async fn load_prompt_template(template_dir: &Path, cached: Option<&str>) -> Loaded<String> {
    if let Some(template) = cached.filter(|t| !t.is_empty()) {
        return Loaded::ok(template.to_string());
    }

    let path = template_dir.join(TEMPLATE_FILE_NAME);
    match tokio::fs::read_to_string(&path).await {
        Ok(template) => Loaded::ok(template),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error!("Prompt template missing at {}", path.display());
            Loaded::failed(format!("Plik szablonu nie istnieje: {}", path.display()))
        }
        Err(e) => {
            error!("Failed to read prompt template {}: {e}", path.display());
            Loaded::failed(format!("Błąd podczas ładowania szablonu promptu: {e}"))
        }
    }
}

/// Runs the four loaders concurrently and joins their results.
/// Returns the assembled context and the errors of the loaders that failed.
pub async fn load_context(
    store: &dyn ContextStore,
    template_dir: &Path,
    cached_template: Option<&str>,
) -> (LoadedContext, Vec<StageError>) {
    let (modules, curriculum, examples, template) = tokio::join!(
        load_modules(store),
        load_curriculum_refs(store),
        load_examples(store),
        load_prompt_template(template_dir, cached_template),
    );

    let mut errors = Vec::new();
    errors.extend(modules.error);
    errors.extend(curriculum.error);
    errors.extend(examples.error);
    // Template failures are a template problem, not a data problem.
    errors.extend(template.error.map(|e| StageError::new(ErrorKind::Template, e.message)));

    let (curriculum_refs, major_refs) = curriculum.value;
    let context = LoadedContext {
        modules: modules.value,
        curriculum_refs,
        major_refs,
        examples: examples.value,
        template: template.value,
    };

    (context, errors)
}
