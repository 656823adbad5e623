//! Prompt construction: formats the loaded context into text blocks and
//! interpolates them into the template.
//!
//! Placeholders are `{name}`; `{{` and `}}` produce literal braces so the
//! template can show JSON.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::models::curriculum::{
    CurriculumRefRow, MajorCurriculumRefRow, ModuleRow, TrainingExample,
};
use crate::workflow::state::LoadedContext;

pub const NO_THEME: &str = "(brak tematu)";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Szablon promptu jest pusty")]
    Empty,

    #[error("Brak wymaganego pola w szablonie: '{0}'")]
    UnknownPlaceholder(String),

    #[error("Niesparowany nawias klamrowy w szablonie (pozycja {0})")]
    UnbalancedBrace(usize),

    #[error("Nie udało się sformatować przykładów w szablonie: {0}")]
    Examples(#[from] serde_json::Error),
}

/// Values available to the template, keyed by placeholder name.
#[derive(Debug, Clone)]
pub struct PromptValues<'a> {
    pub activity: &'a str,
    pub theme: &'a str,
    pub modules_list: &'a str,
    pub curriculum_refs: &'a str,
    pub examples: &'a str,
}

impl PromptValues<'_> {
    fn get(&self, name: &str) -> Option<&str> {
        match name {
            "activity" => Some(self.activity),
            "theme" => Some(self.theme),
            "modules_list" => Some(self.modules_list),
            "curriculum_refs" => Some(self.curriculum_refs),
            "examples" => Some(self.examples),
            _ => None,
        }
    }
}

/// Module names sorted alphabetically, comma separated.
pub fn format_modules_list(modules: &[ModuleRow]) -> String {
    let mut names: Vec<&str> = modules.iter().map(|m| m.module_name.as_str()).collect();
    names.sort_unstable();
    names.join(", ")
}

/// References grouped under their major section, sections in load order.
/// Sections without references are omitted. References whose section was
/// not loaded are dropped with a warning.
pub fn format_curriculum_refs(
    major_refs: &[MajorCurriculumRefRow],
    curriculum_refs: &[CurriculumRefRow],
) -> String {
    let mut grouped: HashMap<i64, Vec<&CurriculumRefRow>> = HashMap::new();
    for reference in curriculum_refs {
        grouped
            .entry(reference.major_reference_id)
            .or_default()
            .push(reference);
    }

    let mut lines: Vec<String> = Vec::new();
    for major in major_refs {
        let Some(references) = grouped.remove(&major.id) else {
            continue;
        };
        lines.push(major.full_text.clone());
        lines.extend(
            references
                .iter()
                .map(|r| format!("{} - {}", r.reference_code, r.full_text)),
        );
        lines.push(String::new());
    }

    for orphan in grouped.values().flatten() {
        warn!(
            "Curriculum reference {} points to unknown major section {}; omitted from prompt",
            orphan.reference_code, orphan.major_reference_id
        );
    }

    lines.join("\n").trim_end().to_string()
}

/// The answer an example demonstrates, serialized in this field order.
#[derive(Serialize)]
struct ExampleAnswer<'a> {
    modules: &'a [String],
    curriculum_refs: &'a [String],
    objectives: Vec<&'a str>,
}

pub fn format_examples(examples: &[TrainingExample]) -> Result<String, TemplateError> {
    let mut blocks = Vec::with_capacity(examples.len());

    for (i, example) in examples.iter().enumerate() {
        let answer = ExampleAnswer {
            modules: &example.modules,
            curriculum_refs: &example.curriculum_codes,
            objectives: example.objective_lines(),
        };
        let json = serde_json::to_string_pretty(&answer)?;

        blocks.push(format!(
            "Przykład {}:\nTemat: {}\nAktywność: {}\n\nOdpowiedź:\n{}",
            i + 1,
            example.theme,
            example.activity,
            json
        ));
    }

    Ok(blocks.join("\n\n"))
}

pub fn render_template(template: &str, values: &PromptValues<'_>) -> Result<String, TemplateError> {
    if template.trim().is_empty() {
        return Err(TemplateError::Empty);
    }

    let mut out = String::with_capacity(template.len() * 2);
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|&(_, next)| next) == Some('{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, '{')) | None => return Err(TemplateError::UnbalancedBrace(pos)),
                        Some((_, ch)) => name.push(ch),
                    }
                }
                let value = values
                    .get(&name)
                    .ok_or(TemplateError::UnknownPlaceholder(name))?;
                out.push_str(value);
            }
            '}' if chars.peek().map(|&(_, next)| next) == Some('}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(TemplateError::UnbalancedBrace(pos)),
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Renders the final prompt from the trimmed input and loaded context.
pub fn construct_prompt(
    activity: &str,
    theme: &str,
    context: &LoadedContext,
) -> Result<String, TemplateError> {
    let modules_list = format_modules_list(&context.modules);
    let curriculum_refs = format_curriculum_refs(&context.major_refs, &context.curriculum_refs);
    let examples = format_examples(&context.examples)?;

    let theme = if theme.is_empty() { NO_THEME } else { theme };

    render_template(
        &context.template,
        &PromptValues {
            activity,
            theme,
            modules_list: &modules_list,
            curriculum_refs: &curriculum_refs,
            examples: &examples,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::FixtureStore;

    fn values() -> PromptValues<'static> {
        PromptValues {
            activity: "Zabawa w sklep",
            theme: "Jesień",
            modules_list: "MATEMATYKA",
            curriculum_refs: "4.15 - przelicza",
            examples: "",
        }
    }

    fn preschool_context(template: &str) -> LoadedContext {
        let store = FixtureStore::preschool();
        LoadedContext {
            modules: store.modules,
            curriculum_refs: store.curriculum_refs,
            major_refs: store.major_refs,
            examples: store.examples,
            template: template.to_string(),
        }
    }

    #[test]
    fn test_modules_sorted_and_joined() {
        let modules: Vec<ModuleRow> = ["MOTORYKA MAŁA", "JĘZYK", "MATEMATYKA"]
            .iter()
            .map(|name| ModuleRow {
                module_name: name.to_string(),
            })
            .collect();
        assert_eq!(
            format_modules_list(&modules),
            "JĘZYK, MATEMATYKA, MOTORYKA MAŁA"
        );
    }

    #[test]
    fn test_curriculum_grouped_by_major_section() {
        let store = FixtureStore::preschool();
        let block = format_curriculum_refs(&store.major_refs, &store.curriculum_refs);

        assert_eq!(
            block,
            "Fizyczny obszar rozwoju dziecka\n\
             1.1 - zgłasza potrzeby fizjologiczne\n\
             \n\
             Poznawczy obszar rozwoju dziecka\n\
             4.15 - przelicza elementy zbiorów\n\
             4.18 - rozpoznaje cyfry od 0 do 10"
        );
    }

    #[test]
    fn test_empty_sections_and_orphans_omitted() {
        let mut store = FixtureStore::preschool();
        store.curriculum_refs.retain(|r| r.major_reference_id == 4);
        store.curriculum_refs.push(CurriculumRefRow {
            reference_code: "9.1".to_string(),
            full_text: "bez sekcji".to_string(),
            major_reference_id: 9,
        });

        let block = format_curriculum_refs(&store.major_refs, &store.curriculum_refs);

        assert!(block.starts_with("Poznawczy obszar rozwoju dziecka\n"));
        assert!(!block.contains("Fizyczny"));
        assert!(!block.contains("9.1"));
    }

    #[test]
    fn test_examples_block_format() {
        let store = FixtureStore::preschool();
        let block = format_examples(&store.examples).unwrap();

        assert_eq!(
            block,
            "Przykład 1:\n\
             Temat: Jesień - zbiory\n\
             Aktywność: Liczenie jabłek w koszyku\n\
             \n\
             Odpowiedź:\n\
             {\n  \"modules\": [\n    \"MATEMATYKA\"\n  ],\n  \"curriculum_refs\": [\n    \"4.15\"\n  ],\n  \"objectives\": [\n    \"Dziecko przelicza w zakresie 5\",\n    \"Rozpoznaje cyfry\"\n  ]\n}"
        );
    }

    #[test]
    fn test_examples_separated_by_blank_line() {
        let mut store = FixtureStore::preschool();
        let mut second = store.examples[0].clone();
        second.activity = "Rysowanie liści".to_string();
        store.examples.push(second);

        let block = format_examples(&store.examples).unwrap();
        assert!(block.contains("}\n\nPrzykład 2:\n"));
    }

    #[test]
    fn test_render_replaces_placeholders() {
        let rendered = render_template("Temat: {theme}\nAktywność: {activity}", &values()).unwrap();
        assert_eq!(rendered, "Temat: Jesień\nAktywność: Zabawa w sklep");
    }

    #[test]
    fn test_doubled_braces_are_literal() {
        let rendered =
            render_template("{{\"modules\": [\"{modules_list}\"]}}", &values()).unwrap();
        assert_eq!(rendered, "{\"modules\": [\"MATEMATYKA\"]}");
    }

    #[test]
    fn test_values_are_not_reinterpreted() {
        let mut v = values();
        v.activity = "{theme} }{";
        assert_eq!(render_template("{activity}", &v).unwrap(), "{theme} }{");
    }

    #[test]
    fn test_unknown_placeholder_fails() {
        let err = render_template("{activity} {grade}", &values()).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownPlaceholder(ref name) if name == "grade"));
    }

    #[test]
    fn test_unbalanced_braces_fail() {
        assert!(matches!(
            render_template("{activity", &values()),
            Err(TemplateError::UnbalancedBrace(0))
        ));
        assert!(matches!(
            render_template("x } y", &values()),
            Err(TemplateError::UnbalancedBrace(2))
        ));
    }

    #[test]
    fn test_empty_template_fails() {
        assert!(matches!(
            render_template("  \n", &values()),
            Err(TemplateError::Empty)
        ));
    }

    #[test]
    fn test_construct_prompt_uses_placeholder_for_missing_theme() {
        let context = preschool_context("{theme} | {activity} | {modules_list}");
        let prompt = construct_prompt("Zabawa w sklep", "", &context).unwrap();
        assert_eq!(
            prompt,
            "(brak tematu) | Zabawa w sklep | FORMY PLASTYCZNE, JĘZYK, MATEMATYKA, MOTORYKA MAŁA"
        );
    }

    #[test]
    fn test_shipped_template_renders() {
        let context = preschool_context(include_str!("../../templates/fill_work_plan.txt"));
        let prompt = construct_prompt("Zabawa w sklep z owocami", "Jesień - zbiory", &context).unwrap();

        assert!(prompt.contains("Aktywność: Zabawa w sklep z owocami"));
        assert!(prompt.contains("\"curriculum_refs\": [\"4.15\"]"));
        assert!(!prompt.contains("{activity}"));
    }

    #[test]
    fn test_construct_prompt_is_deterministic() {
        let context =
            preschool_context("{modules_list}\n{curriculum_refs}\n{examples}\n{theme}\n{activity}");
        let first = construct_prompt("Zabawa", "Jesień", &context).unwrap();
        let second = construct_prompt("Zabawa", "Jesień", &context).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("4.15 - przelicza elementy zbiorów"));
        assert!(first.contains("Przykład 1:"));
    }
}
