//! Context store: read-only access to the lesson planner tables.
//!
//! Trait-based so the workflow can run against SQLite in production and an
//! in-memory fixture in tests. `Workflow` holds an `Arc<dyn ContextStore>`.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::models::curriculum::{
    CurriculumRefRow, ExampleRow, MajorCurriculumRefRow, ModuleRow, TrainingExample,
};

#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Module names ordered by name.
    async fn list_modules(&self) -> Result<Vec<ModuleRow>>;

    /// Curriculum references ordered numerically by (major, minor).
    async fn list_curriculum_refs(&self) -> Result<Vec<CurriculumRefRow>>;

    /// Major sections ordered numerically by code.
    async fn list_major_refs(&self) -> Result<Vec<MajorCurriculumRefRow>>;

    /// Work plan entries flagged as examples, oldest first.
    async fn list_examples(&self) -> Result<Vec<TrainingExample>>;
}

/// SQLite-backed store over the Django schema.
#[derive(Clone)]
pub struct SqliteContextStore {
    pool: SqlitePool,
}

impl SqliteContextStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    async fn list_modules(&self) -> Result<Vec<ModuleRow>> {
        Ok(sqlx::query_as::<_, ModuleRow>(
            "SELECT module_name FROM educational_modules ORDER BY module_name",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_curriculum_refs(&self) -> Result<Vec<CurriculumRefRow>> {
        Ok(sqlx::query_as::<_, CurriculumRefRow>(
            r#"
            SELECT reference_code, full_text, major_reference_id
            FROM curriculum_references
            ORDER BY
                CAST(SUBSTR(reference_code, 1, INSTR(reference_code, '.') - 1) AS INTEGER),
                CAST(SUBSTR(reference_code, INSTR(reference_code, '.') + 1) AS INTEGER)
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_major_refs(&self) -> Result<Vec<MajorCurriculumRefRow>> {
        Ok(sqlx::query_as::<_, MajorCurriculumRefRow>(
            r#"
            SELECT id, reference_code, full_text
            FROM major_curriculum_references
            ORDER BY CAST(reference_code AS INTEGER)
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_examples(&self) -> Result<Vec<TrainingExample>> {
        // Subqueries instead of JOIN + GROUP BY to avoid a cartesian product
        // between the two link tables.
        let rows = sqlx::query_as::<_, ExampleRow>(
            r#"
            SELECT
                wp.theme AS theme,
                wpe.activity AS activity,
                wpe.objectives AS objectives,
                (SELECT GROUP_CONCAT(em.module_name, ',')
                 FROM work_plan_entry_modules wpem
                 JOIN educational_modules em ON wpem.module_id = em.id
                 WHERE wpem.work_plan_entry_id = wpe.id) AS module_names,
                (SELECT GROUP_CONCAT(cr.reference_code, ',')
                 FROM work_plan_entry_curriculum_refs wpcr
                 JOIN curriculum_references cr ON wpcr.curriculum_reference_id = cr.id
                 WHERE wpcr.work_plan_entry_id = wpe.id) AS ref_codes
            FROM work_plan_entries wpe
            JOIN work_plans wp ON wpe.work_plan_id = wp.id
            WHERE wpe.is_example = 1
            ORDER BY wpe.created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TrainingExample::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::Executor;

    const SCHEMA: &str = r#"
        CREATE TABLE educational_modules (id INTEGER PRIMARY KEY, module_name TEXT NOT NULL);
        CREATE TABLE major_curriculum_references (
            id INTEGER PRIMARY KEY, reference_code TEXT NOT NULL, full_text TEXT NOT NULL);
        CREATE TABLE curriculum_references (
            id INTEGER PRIMARY KEY, reference_code TEXT NOT NULL, full_text TEXT NOT NULL,
            major_reference_id INTEGER NOT NULL);
        CREATE TABLE work_plans (id INTEGER PRIMARY KEY, theme TEXT);
        CREATE TABLE work_plan_entries (
            id INTEGER PRIMARY KEY, work_plan_id INTEGER NOT NULL, activity TEXT NOT NULL,
            objectives TEXT, is_example INTEGER NOT NULL DEFAULT 0, created_at TEXT NOT NULL);
        CREATE TABLE work_plan_entry_modules (work_plan_entry_id INTEGER, module_id INTEGER);
        CREATE TABLE work_plan_entry_curriculum_refs (
            work_plan_entry_id INTEGER, curriculum_reference_id INTEGER);

        INSERT INTO educational_modules (id, module_name) VALUES
            (1, 'MATEMATYKA'), (2, 'JĘZYK'), (3, 'FORMY PLASTYCZNE');
        INSERT INTO major_curriculum_references (id, reference_code, full_text) VALUES
            (10, '10', 'Obszar dziesiąty'),
            (4, '4', 'Poznawczy obszar rozwoju dziecka'),
            (1, '1', 'Fizyczny obszar rozwoju dziecka');
        INSERT INTO curriculum_references (id, reference_code, full_text, major_reference_id) VALUES
            (1, '4.18', 'rozpoznaje cyfry', 4),
            (2, '4.2', 'wyraża swoje rozumienie świata', 4),
            (3, '1.1', 'zgłasza potrzeby fizjologiczne', 1),
            (4, '4.15', 'przelicza elementy zbiorów', 4);
        INSERT INTO work_plans (id, theme) VALUES (1, 'Jesień - zbiory'), (2, NULL);
        INSERT INTO work_plan_entries (id, work_plan_id, activity, objectives, is_example, created_at) VALUES
            (1, 1, 'Zabawa w sklep z owocami', 'Dziecko przelicza do 5
Rozpoznaje cyfry', 1, '2024-10-02'),
            (2, 2, 'Rysowanie liści', 'Rozwija motorykę małą', 1, '2024-10-01'),
            (3, 1, 'Nie jest przykładem', 'x', 0, '2024-09-01');
        INSERT INTO work_plan_entry_modules VALUES (1, 1), (1, 2), (2, 3);
        INSERT INTO work_plan_entry_curriculum_refs VALUES (1, 1), (1, 4);
    "#;

    async fn seeded_store() -> SqliteContextStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        pool.execute(SCHEMA).await.unwrap();
        SqliteContextStore::new(pool)
    }

    #[tokio::test]
    async fn test_modules_ordered_by_name() {
        let store = seeded_store().await;
        let names: Vec<String> = store
            .list_modules()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.module_name)
            .collect();
        assert_eq!(names, vec!["FORMY PLASTYCZNE", "JĘZYK", "MATEMATYKA"]);
    }

    #[tokio::test]
    async fn test_curriculum_refs_ordered_numerically() {
        let store = seeded_store().await;
        let codes: Vec<String> = store
            .list_curriculum_refs()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.reference_code)
            .collect();
        assert_eq!(codes, vec!["1.1", "4.2", "4.15", "4.18"]);
    }

    #[tokio::test]
    async fn test_major_refs_ordered_numerically() {
        let store = seeded_store().await;
        let codes: Vec<String> = store
            .list_major_refs()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.reference_code)
            .collect();
        assert_eq!(codes, vec!["1", "4", "10"]);
    }

    #[tokio::test]
    async fn test_examples_only_flagged_rows_oldest_first() {
        let store = seeded_store().await;
        let examples = store.list_examples().await.unwrap();

        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].activity, "Rysowanie liści");
        assert_eq!(examples[0].theme, "");
        assert_eq!(examples[0].modules, vec!["FORMY PLASTYCZNE"]);
        assert!(examples[0].curriculum_codes.is_empty());

        assert_eq!(examples[1].theme, "Jesień - zbiory");
        assert_eq!(examples[1].modules, vec!["JĘZYK", "MATEMATYKA"]);
        assert_eq!(examples[1].curriculum_codes, vec!["4.15", "4.18"]);
        assert_eq!(
            examples[1].objective_lines(),
            vec!["Dziecko przelicza do 5", "Rozpoznaje cyfry"]
        );
    }

    #[tokio::test]
    async fn test_missing_table_surfaces_error() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteContextStore::new(pool);
        assert!(store.list_modules().await.is_err());
    }
}
