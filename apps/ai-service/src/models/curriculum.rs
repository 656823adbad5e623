use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Educational module name (e.g. MATEMATYKA, JĘZYK).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ModuleRow {
    pub module_name: String,
}

/// Detailed curriculum paragraph (e.g. 4.15) under a major section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CurriculumRefRow {
    pub reference_code: String,
    pub full_text: String,
    pub major_reference_id: i64,
}

/// Top-level curriculum section (e.g. 1, 2, 3, 4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MajorCurriculumRefRow {
    pub id: i64,
    pub reference_code: String,
    pub full_text: String,
}

/// Raw example row as returned by the examples query. Module names and
/// reference codes arrive as `GROUP_CONCAT` strings.
#[derive(Debug, Clone, FromRow)]
pub struct ExampleRow {
    pub theme: Option<String>,
    pub activity: String,
    pub objectives: Option<String>,
    pub module_names: Option<String>,
    pub ref_codes: Option<String>,
}

/// A recorded work plan entry shown to the model as a few-shot demonstration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub theme: String,
    pub activity: String,
    pub modules: Vec<String>,
    /// One objective per line.
    pub objectives: String,
    pub curriculum_codes: Vec<String>,
}

impl TrainingExample {
    /// Objectives split on newlines, trimmed, with blank lines dropped.
    pub fn objective_lines(&self) -> Vec<&str> {
        self.objectives
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }
}

impl From<ExampleRow> for TrainingExample {
    fn from(row: ExampleRow) -> Self {
        Self {
            theme: row.theme.unwrap_or_default(),
            activity: row.activity,
            modules: split_sorted(row.module_names.as_deref()),
            objectives: row.objectives.unwrap_or_default(),
            curriculum_codes: split_sorted(row.ref_codes.as_deref()),
        }
    }
}

fn split_sorted(joined: Option<&str>) -> Vec<String> {
    let mut items: Vec<String> = joined
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    items.sort();
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_row_splits_and_sorts_concatenated_columns() {
        let row = ExampleRow {
            theme: None,
            activity: "Zabawa w sklep".to_string(),
            objectives: Some("Cel pierwszy\n\n  Cel drugi  ".to_string()),
            module_names: Some("MATEMATYKA,JĘZYK".to_string()),
            ref_codes: Some("4.18,4.15".to_string()),
        };
        let example = TrainingExample::from(row);

        assert_eq!(example.theme, "");
        assert_eq!(example.modules, vec!["JĘZYK", "MATEMATYKA"]);
        assert_eq!(example.curriculum_codes, vec!["4.15", "4.18"]);
        assert_eq!(example.objective_lines(), vec!["Cel pierwszy", "Cel drugi"]);
    }

    #[test]
    fn test_example_row_without_links_has_empty_lists() {
        let row = ExampleRow {
            theme: Some("Zima".to_string()),
            activity: "Lepienie bałwana".to_string(),
            objectives: None,
            module_names: None,
            ref_codes: None,
        };
        let example = TrainingExample::from(row);

        assert!(example.modules.is_empty());
        assert!(example.curriculum_codes.is_empty());
        assert!(example.objective_lines().is_empty());
    }
}
