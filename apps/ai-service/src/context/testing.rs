//! In-memory `ContextStore` for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::context::store::ContextStore;
use crate::models::curriculum::{
    CurriculumRefRow, MajorCurriculumRefRow, ModuleRow, TrainingExample,
};

#[derive(Default)]
pub struct FixtureStore {
    pub modules: Vec<ModuleRow>,
    pub curriculum_refs: Vec<CurriculumRefRow>,
    pub major_refs: Vec<MajorCurriculumRefRow>,
    pub examples: Vec<TrainingExample>,
    fail_modules: bool,
    fail_major_refs: bool,
    query_delay: Duration,
    /// Number of store calls made, across all four queries.
    pub calls: AtomicUsize,
}

impl FixtureStore {
    /// A small preschool curriculum with two major sections.
    pub fn preschool() -> Self {
        let module = |name: &str| ModuleRow {
            module_name: name.to_string(),
        };
        let reference = |code: &str, text: &str, major: i64| CurriculumRefRow {
            reference_code: code.to_string(),
            full_text: text.to_string(),
            major_reference_id: major,
        };

        Self {
            modules: vec![
                module("FORMY PLASTYCZNE"),
                module("JĘZYK"),
                module("MATEMATYKA"),
                module("MOTORYKA MAŁA"),
            ],
            curriculum_refs: vec![
                reference("1.1", "zgłasza potrzeby fizjologiczne", 1),
                reference("4.15", "przelicza elementy zbiorów", 4),
                reference("4.18", "rozpoznaje cyfry od 0 do 10", 4),
            ],
            major_refs: vec![
                MajorCurriculumRefRow {
                    id: 1,
                    reference_code: "1".to_string(),
                    full_text: "Fizyczny obszar rozwoju dziecka".to_string(),
                },
                MajorCurriculumRefRow {
                    id: 4,
                    reference_code: "4".to_string(),
                    full_text: "Poznawczy obszar rozwoju dziecka".to_string(),
                },
            ],
            examples: vec![TrainingExample {
                theme: "Jesień - zbiory".to_string(),
                activity: "Liczenie jabłek w koszyku".to_string(),
                modules: vec!["MATEMATYKA".to_string()],
                objectives: "Dziecko przelicza w zakresie 5\nRozpoznaje cyfry".to_string(),
                curriculum_codes: vec!["4.15".to_string()],
            }],
            ..Default::default()
        }
    }

    pub fn failing_modules(mut self) -> Self {
        self.fail_modules = true;
        self
    }

    pub fn failing_major_refs(mut self) -> Self {
        self.fail_major_refs = true;
        self
    }

    /// Every query sleeps this long before answering.
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
    }
}

#[async_trait]
impl ContextStore for FixtureStore {
    async fn list_modules(&self) -> Result<Vec<ModuleRow>> {
        self.record_call().await;
        if self.fail_modules {
            return Err(anyhow!("database is locked"));
        }
        Ok(self.modules.clone())
    }

    async fn list_curriculum_refs(&self) -> Result<Vec<CurriculumRefRow>> {
        self.record_call().await;
        Ok(self.curriculum_refs.clone())
    }

    async fn list_major_refs(&self) -> Result<Vec<MajorCurriculumRefRow>> {
        self.record_call().await;
        if self.fail_major_refs {
            return Err(anyhow!("no such table: major_curriculum_references"));
        }
        Ok(self.major_refs.clone())
    }

    async fn list_examples(&self) -> Result<Vec<TrainingExample>> {
        self.record_call().await;
        Ok(self.examples.clone())
    }
}
