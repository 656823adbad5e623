//! Terminal result shapes.
//!
//! The error code comes from the `ErrorKind` of the recorded errors. Errors
//! recorded without a specific kind are classified by their message text.

use serde_json::{json, Map, Value};

use crate::models::work_plan::{ErrorResponse, FillWorkPlanResponse};
use crate::workflow::state::{ErrorKind, StageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorCode {
    // Declaration order is selection precedence.
    Parsing,
    InvalidModules,
    InvalidCurriculumRefs,
    InvalidObjectives,
    InvalidInput,
    Template,
    Llm,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Parsing => "PARSING_ERROR",
            ErrorCode::InvalidModules => "INVALID_MODULES",
            ErrorCode::InvalidCurriculumRefs => "INVALID_CURRICULUM_REFS",
            ErrorCode::InvalidObjectives => "INVALID_OBJECTIVES",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::Template => "TEMPLATE_ERROR",
            ErrorCode::Llm => "LLM_ERROR",
            ErrorCode::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Option<Self> {
        match kind {
            ErrorKind::Parsing => Some(ErrorCode::Parsing),
            ErrorKind::Modules => Some(ErrorCode::InvalidModules),
            ErrorKind::Curriculum => Some(ErrorCode::InvalidCurriculumRefs),
            ErrorKind::Objectives => Some(ErrorCode::InvalidObjectives),
            ErrorKind::Input => Some(ErrorCode::InvalidInput),
            ErrorKind::Template => Some(ErrorCode::Template),
            ErrorKind::Upstream => Some(ErrorCode::Llm),
            // Degraded context never decides the code on its own.
            ErrorKind::ContextLoad => Some(ErrorCode::Internal),
            ErrorKind::Internal => None,
        }
    }
}

/// Keyword fallback for errors recorded without a specific kind.
pub fn classify_message(message: &str) -> ErrorCode {
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["json"]) {
        ErrorCode::Parsing
    } else if has(&["moduł"]) {
        ErrorCode::InvalidModules
    } else if has(&["podstawy programowej"]) {
        ErrorCode::InvalidCurriculumRefs
    } else if has(&["cel"]) {
        ErrorCode::InvalidObjectives
    } else if has(&["activity", "aktywność", "theme", "temat"]) {
        ErrorCode::InvalidInput
    } else if has(&["szablon", "template"]) {
        ErrorCode::Template
    } else if has(&["llm", "api"]) {
        ErrorCode::Llm
    } else {
        ErrorCode::Internal
    }
}

pub fn classify(error: &StageError) -> ErrorCode {
    ErrorCode::from_kind(error.kind).unwrap_or_else(|| classify_message(&error.message))
}

/// Builds the success body from the validated output. Non-string items
/// cannot appear after validation and are skipped.
pub fn format_success(activity: &str, output: &Map<String, Value>) -> FillWorkPlanResponse {
    let strings = |field: &str| -> Vec<String> {
        output
            .get(field)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    };

    FillWorkPlanResponse {
        activity: activity.to_string(),
        modules: strings("modules"),
        curriculum_refs: strings("curriculum_refs"),
        objectives: strings("objectives"),
    }
}

pub fn format_error(errors: &[StageError]) -> ErrorResponse {
    let code = errors
        .iter()
        .map(classify)
        .min()
        .unwrap_or(ErrorCode::Internal);

    let first_of = |code: ErrorCode| {
        errors
            .iter()
            .find(|e| classify(e) == code)
            .map(|e| e.message.as_str())
    };

    let message = match code {
        ErrorCode::Parsing => "Nie udało się przetworzyć odpowiedzi AI. \
             Odpowiedź nie zawiera prawidłowego formatu JSON. \
             Spróbuj ponownie z innym opisem aktywności."
            .to_string(),
        ErrorCode::InvalidModules => format!(
            "AI wygenerował nieprawidłowe moduły edukacyjne. {} \
             Spróbuj ponownie lub zmień opis aktywności.",
            first_of(code).unwrap_or("Sprawdź listę dostępnych modułów.")
        ),
        ErrorCode::InvalidCurriculumRefs => "AI wygenerował nieprawidłowe kody podstawy programowej. \
             Wszystkie kody zostały odfiltrowane jako nieprawidłowe. \
             Spróbuj ponownie z bardziej szczegółowym opisem aktywności."
            .to_string(),
        ErrorCode::InvalidObjectives => format!(
            "AI wygenerował nieprawidłowe cele edukacyjne. {} Spróbuj ponownie.",
            first_of(code).unwrap_or_default()
        ),
        ErrorCode::InvalidInput => format!(
            "Nieprawidłowe dane wejściowe. {}",
            first_of(code).unwrap_or("Sprawdź pole aktywności.")
        ),
        ErrorCode::Template => "Błąd wczytania szablonu promptu. \
             Skontaktuj się z administratorem systemu."
            .to_string(),
        ErrorCode::Llm => "Błąd komunikacji z systemem AI. \
             Sprawdź połączenie internetowe i spróbuj ponownie za chwilę."
            .to_string(),
        // Raw store and runtime text stays in `details`.
        ErrorCode::Internal => "Wystąpił nieoczekiwany błąd podczas generowania metadanych. \
             Spróbuj ponownie za chwilę."
            .to_string(),
    };

    let details = (!errors.is_empty()).then(|| {
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        json!({ "validation_errors": messages })
    });

    ErrorResponse {
        error: message,
        error_code: code.as_str().to_string(),
        details,
    }
}
