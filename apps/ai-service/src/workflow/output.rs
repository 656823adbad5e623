//! Parsing and lenient validation of the model's answer.
//!
//! Modules and objectives are checked strictly. Curriculum codes are
//! filtered: unknown codes are dropped with a warning and the run fails only
//! when nothing valid is left.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::llm_client::extraction;
use crate::llm_client::schema::REQUIRED_FIELDS;
use crate::models::curriculum::{CurriculumRefRow, ModuleRow};
use crate::workflow::state::{ErrorKind, StageError};

pub const MAX_MODULES: usize = 3;
pub const MAX_CURRICULUM_REFS: usize = 10;
pub const MAX_OBJECTIVES: usize = 5;
pub const MIN_OBJECTIVE_CHARS: usize = 10;

pub fn parse_llm_response(raw: &str) -> Result<Map<String, Value>, StageError> {
    extraction::extract_json(raw)
        .map(|extracted| extracted.object)
        .map_err(|e| {
            error!("Failed to parse LLM response: {e}");
            StageError::new(ErrorKind::Parsing, format!("Błąd parsowania JSON: {e}"))
        })
}

/// Result of output validation. `output` carries the filtered curriculum codes.
#[derive(Debug, Clone, Default)]
pub struct OutputValidation {
    pub output: Map<String, Value>,
    pub errors: Vec<StageError>,
    pub warnings: Vec<String>,
}

impl OutputValidation {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn validate_output(
    mut output: Map<String, Value>,
    modules: &[ModuleRow],
    curriculum_refs: &[CurriculumRefRow],
) -> OutputValidation {
    let missing: Vec<StageError> = REQUIRED_FIELDS
        .iter()
        .filter(|field| !output.contains_key(**field))
        .map(|field| {
            StageError::new(ErrorKind::Parsing, format!("Brak wymaganego pola: {field}"))
        })
        .collect();
    if !missing.is_empty() {
        for e in &missing {
            error!("Invalid output structure: {}", e.message);
        }
        return OutputValidation {
            output,
            errors: missing,
            warnings: Vec::new(),
        };
    }

    let valid_modules: HashSet<&str> = modules.iter().map(|m| m.module_name.as_str()).collect();
    let valid_codes: HashSet<&str> = curriculum_refs
        .iter()
        .map(|r| r.reference_code.as_str())
        .collect();

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    check_modules(&output["modules"], &valid_modules, &mut errors);

    if let Some(filtered) =
        check_curriculum_refs(&output["curriculum_refs"], &valid_codes, &mut errors, &mut warnings)
    {
        output.insert("curriculum_refs".to_string(), filtered);
    }

    check_objectives(&output["objectives"], &mut errors);

    for e in &errors {
        error!("Output validation failed: {}", e.message);
    }

    OutputValidation {
        output,
        errors,
        warnings,
    }
}

fn check_modules(value: &Value, valid: &HashSet<&str>, errors: &mut Vec<StageError>) {
    let fail = |message: String| StageError::new(ErrorKind::Modules, message);

    let Some(modules) = value.as_array() else {
        errors.push(fail("Pole 'modules' musi być listą".to_string()));
        return;
    };

    if modules.is_empty() {
        errors.push(fail("Wymagany co najmniej 1 moduł".to_string()));
    } else if modules.len() > MAX_MODULES {
        errors.push(fail(format!(
            "Zbyt wiele modułów ({}, max {MAX_MODULES})",
            modules.len()
        )));
    } else {
        let invalid: Vec<String> = modules
            .iter()
            .filter(|m| !m.as_str().is_some_and(|name| valid.contains(name)))
            .map(display_item)
            .collect();
        if !invalid.is_empty() {
            errors.push(fail(format!("Nieprawidłowe moduły: {}", invalid.join(", "))));
        }
    }
}

/// Returns the rewritten code list when filtering removed something and a
/// valid subset remains.
fn check_curriculum_refs(
    value: &Value,
    valid: &HashSet<&str>,
    errors: &mut Vec<StageError>,
    warnings: &mut Vec<String>,
) -> Option<Value> {
    let fail = |message: String| StageError::new(ErrorKind::Curriculum, message);

    let Some(codes) = value.as_array() else {
        errors.push(fail("Pole 'curriculum_refs' musi być listą".to_string()));
        return None;
    };

    if codes.is_empty() {
        errors.push(fail(
            "Wymagany co najmniej 1 kod podstawy programowej".to_string(),
        ));
        return None;
    }

    let (kept, dropped): (Vec<&Value>, Vec<&Value>) = codes
        .iter()
        .partition(|code| code.as_str().is_some_and(|c| valid.contains(c)));
    let dropped: Vec<String> = dropped.into_iter().map(display_item).collect();

    if !dropped.is_empty() {
        let warning = format!(
            "Odfiltrowano nieprawidłowe kody podstawy programowej: {}",
            dropped.join(", ")
        );
        warn!("{warning}");
        warnings.push(warning);
    }

    if kept.is_empty() {
        errors.push(fail(format!(
            "Wszystkie kody podstawy programowej są nieprawidłowe: {}",
            dropped.join(", ")
        )));
        return None;
    }
    if kept.len() > MAX_CURRICULUM_REFS {
        errors.push(fail(format!(
            "Zbyt wiele kodów podstawy programowej ({}, max {MAX_CURRICULUM_REFS})",
            kept.len()
        )));
    }

    (!dropped.is_empty()).then(|| Value::Array(kept.into_iter().cloned().collect()))
}

fn check_objectives(value: &Value, errors: &mut Vec<StageError>) {
    let fail = |message: String| StageError::new(ErrorKind::Objectives, message);

    let Some(objectives) = value.as_array() else {
        errors.push(fail("Pole 'objectives' musi być listą".to_string()));
        return;
    };

    if objectives.is_empty() {
        errors.push(fail("Wymagany co najmniej 1 cel edukacyjny".to_string()));
        return;
    }
    if objectives.len() > MAX_OBJECTIVES {
        errors.push(fail(format!(
            "Zbyt wiele celów edukacyjnych ({}, max {MAX_OBJECTIVES})",
            objectives.len()
        )));
        return;
    }

    for (i, objective) in objectives.iter().enumerate() {
        let n = i + 1;
        match objective.as_str() {
            None => errors.push(fail(format!("Cel {n} musi być tekstem"))),
            Some(text) if text.trim().chars().count() < MIN_OBJECTIVE_CHARS => errors.push(fail(
                format!("Cel {n} jest za krótki (min {MIN_OBJECTIVE_CHARS} znaków)"),
            )),
            Some(_) => {}
        }
    }
}

fn display_item(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
