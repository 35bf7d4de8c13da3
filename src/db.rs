use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::import::{self, ImportPlan};
use crate::models::{
    Employee, EmployeeRecord, Evaluation, EvaluationComment, EvaluationRecord, ImportCounts,
};
use crate::store::EvaluationStore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EvaluationStore for PgStore {
    async fn employee(&self, id: Uuid) -> StoreResult<Employee> {
        sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "employee" })
    }

    async fn direct_reports(&self, manager_id: Uuid) -> StoreResult<Vec<Employee>> {
        let rows = sqlx::query_as::<_, Employee>(
            r#"
            SELECT * FROM employees
            WHERE manager_id = $1
            ORDER BY last_name ASC, first_name ASC
            "#,
        )
        .bind(manager_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn evaluations_for_year(
        &self,
        employee_ids: &[Uuid],
        year: i32,
    ) -> StoreResult<Vec<Evaluation>> {
        let rows = sqlx::query_as::<_, Evaluation>(
            r#"
            SELECT * FROM performance_evaluations
            WHERE employee_id = ANY($1) AND evaluation_year = $2
            "#,
        )
        .bind(employee_ids)
        .bind(year)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn evaluation_for_year(&self, employee_id: Uuid, year: i32) -> StoreResult<Evaluation> {
        sqlx::query_as::<_, Evaluation>(
            r#"
            SELECT * FROM performance_evaluations
            WHERE employee_id = $1 AND evaluation_year = $2
            "#,
        )
        .bind(employee_id)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "evaluation",
        })
    }

    async fn evaluations_for_employee(&self, employee_id: Uuid) -> StoreResult<Vec<Evaluation>> {
        let rows = sqlx::query_as::<_, Evaluation>(
            r#"
            SELECT * FROM performance_evaluations
            WHERE employee_id = $1
            ORDER BY evaluation_year ASC
            "#,
        )
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn comments(&self, evaluation_id: Uuid) -> StoreResult<Vec<EvaluationComment>> {
        let rows = sqlx::query_as::<_, EvaluationComment>(
            "SELECT * FROM evaluation_comments WHERE evaluation_id = $1 ORDER BY category",
        )
        .bind(evaluation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn evaluation_years(&self) -> StoreResult<Vec<i32>> {
        let years = sqlx::query_scalar::<_, i32>(
            "SELECT DISTINCT evaluation_year FROM performance_evaluations ORDER BY evaluation_year DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(years)
    }
}

/// Inserts or refreshes one batch of employees keyed on `employee_code`.
/// Returns the stored id for every code, which differs from the record's id
/// when the employee already existed.
pub async fn upsert_employees(
    conn: &mut PgConnection,
    batch: &[EmployeeRecord],
) -> anyhow::Result<Vec<(i32, Uuid)>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO employees (id, employee_code, rut, first_name, last_name, email) ",
    );
    builder.push_values(batch, |mut row, employee| {
        row.push_bind(employee.id)
            .push_bind(employee.employee_code)
            .push_bind(employee.rut.clone())
            .push_bind(employee.first_name.clone())
            .push_bind(employee.last_name.clone())
            .push_bind(employee.email.clone());
    });
    builder.push(
        r#"
        ON CONFLICT (employee_code) DO UPDATE
        SET rut = EXCLUDED.rut,
            first_name = EXCLUDED.first_name,
            last_name = EXCLUDED.last_name,
            email = EXCLUDED.email,
            updated_at = now()
        RETURNING employee_code, id
        "#,
    );

    let ids = builder
        .build_query_as::<(i32, Uuid)>()
        .fetch_all(&mut *conn)
        .await
        .context("failed to upsert employees")?;
    Ok(ids)
}

/// Points each employee at its manager by code. Employees whose manager code
/// is missing or unknown become top-level.
pub async fn link_managers(
    conn: &mut PgConnection,
    batch: &[EmployeeRecord],
) -> anyhow::Result<u64> {
    let codes: Vec<i32> = batch.iter().map(|e| e.employee_code).collect();
    let managers: Vec<Option<i32>> = batch.iter().map(|e| e.manager_code).collect();

    let result = sqlx::query(
        r#"
        UPDATE employees AS e
        SET manager_id = m.id, updated_at = now()
        FROM UNNEST($1::int4[], $2::int4[]) AS link (employee_code, manager_code)
        LEFT JOIN employees AS m ON m.employee_code = link.manager_code
        WHERE e.employee_code = link.employee_code
        "#,
    )
    .bind(codes)
    .bind(managers)
    .execute(&mut *conn)
    .await
    .context("failed to link managers")?;

    Ok(result.rows_affected())
}

const EVALUATION_COLUMNS: [&str; 21] = [
    "general_potential",
    "general_potential_label",
    "peer_client_score",
    "peer_client_label",
    "direct_manager_score",
    "direct_manager_label",
    "collaborator_score",
    "collaborator_label",
    "competencies_avg_score",
    "competencies_avg_label",
    "one_team_score",
    "one_team_label",
    "agility_score",
    "agility_label",
    "customer_passion_score",
    "customer_passion_label",
    "future_care_score",
    "future_care_label",
    "ipe",
    "evaluation_year",
    "employee_id",
];

/// Inserts or replaces one batch of evaluations keyed on
/// `(employee_id, evaluation_year)`.
pub async fn upsert_evaluations(
    conn: &mut PgConnection,
    batch: &[(Uuid, &EvaluationRecord)],
) -> anyhow::Result<u64> {
    if batch.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "INSERT INTO performance_evaluations (id, {}) ",
        EVALUATION_COLUMNS.join(", ")
    ));
    builder.push_values(batch, |mut row, (employee_id, e)| {
        row.push_bind(Uuid::new_v4())
            .push_bind(e.general_potential)
            .push_bind(e.general_potential_label.clone())
            .push_bind(e.peer_client_score)
            .push_bind(e.peer_client_label.clone())
            .push_bind(e.direct_manager_score)
            .push_bind(e.direct_manager_label.clone())
            .push_bind(e.collaborator_score)
            .push_bind(e.collaborator_label.clone())
            .push_bind(e.competencies_avg_score)
            .push_bind(e.competencies_avg_label.clone())
            .push_bind(e.one_team_score)
            .push_bind(e.one_team_label.clone())
            .push_bind(e.agility_score)
            .push_bind(e.agility_label.clone())
            .push_bind(e.customer_passion_score)
            .push_bind(e.customer_passion_label.clone())
            .push_bind(e.future_care_score)
            .push_bind(e.future_care_label.clone())
            .push_bind(e.ipe)
            .push_bind(e.evaluation_year)
            .push_bind(*employee_id);
    });

    let updates: Vec<String> = EVALUATION_COLUMNS[..19]
        .iter()
        .map(|column| format!("{column} = EXCLUDED.{column}"))
        .collect();
    builder.push(format!(
        " ON CONFLICT (employee_id, evaluation_year) DO UPDATE SET {}, updated_at = now()",
        updates.join(", ")
    ));

    let result = builder
        .build()
        .execute(&mut *conn)
        .await
        .context("failed to upsert evaluations")?;
    Ok(result.rows_affected())
}

pub async fn import_counts(pool: &PgPool, year: i32) -> anyhow::Result<ImportCounts> {
    let employees = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees")
        .fetch_one(pool)
        .await?;
    let evaluations = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM performance_evaluations WHERE evaluation_year = $1",
    )
    .bind(year)
    .fetch_one(pool)
    .await?;
    let managers = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(DISTINCT manager_id) FROM employees WHERE manager_id IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;

    Ok(ImportCounts {
        employees,
        evaluations,
        managers,
    })
}

/// Loads a manager with four direct reports and two years of evaluations.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    import::write_plan(pool, &seed_plan(), import::DEFAULT_BATCH_SIZE).await
}

fn seed_plan() -> ImportPlan {
    let person = |code: i32, first: &str, last: &str, manager: Option<i32>, rut: &str| {
        EmployeeRecord {
            id: Uuid::new_v4(),
            employee_code: code,
            first_name: first.to_string(),
            last_name: last.to_string(),
            manager_code: manager,
            rut: Some(rut.to_string()),
            email: Some(format!(
                "{}.{}@example.com",
                first.to_lowercase(),
                last.to_lowercase().replace('ñ', "n")
            )),
        }
    };

    let employees = vec![
        person(1000, "Carolina", "Fuentes", None, "12345678-5"),
        person(1001, "Anibal", "Retamal", Some(1000), "15111222-3"),
        person(1002, "Alvaro", "Marquez", Some(1000), "16222333-4"),
        person(1003, "Paula", "Roa", Some(1000), "17333444-5"),
        person(1004, "Angeles", "Zuñiga", Some(1000), "18444555-6"),
    ];

    // (code, year, potential, potential label, manager score, manager label,
    //  competency average, competency label, [team, agility, customer, future])
    #[allow(clippy::type_complexity)]
    let rows: [(i32, i32, f64, &str, f64, &str, f64, &str, [f64; 4]); 8] = [
        (1001, 2024, 2.5, "Medio (Calibrado)", 2.88, "Cumple Parcial", 2.88, "Cumple Parcial", [3.0, 3.0, 2.5, 3.0]),
        (1002, 2024, 2.4, "Bajo (Calibrado)", 3.13, "Cumple Satisfactorio", 3.38, "Sobresaliente", [3.33, 3.33, 3.5, 3.33]),
        (1003, 2024, 2.5, "Medio (Calibrado)", 3.75, "Sobresaliente", 3.75, "Sobresaliente", [4.0, 3.5, 3.5, 4.0]),
        (1004, 2024, 3.0, "Medio +", 3.38, "Sobresaliente", 3.14, "Cumple Satisfactorio", [3.25, 3.19, 3.19, 2.94]),
        (1001, 2023, 2.7, "Medio", 3.0, "Cumple Satisfactorio", 2.95, "Cumple Parcial", [3.0, 2.9, 2.8, 3.1]),
        (1002, 2023, 2.6, "Medio", 3.2, "Cumple Satisfactorio", 3.1, "Cumple Satisfactorio", [3.1, 3.0, 3.2, 3.1]),
        (1003, 2023, 3.1, "Medio +", 3.5, "Sobresaliente", 3.6, "Sobresaliente", [3.8, 3.4, 3.5, 3.7]),
        (1004, 2023, 2.9, "Medio", 3.1, "Cumple Satisfactorio", 3.0, "Cumple Satisfactorio", [3.0, 3.1, 2.9, 3.0]),
    ];

    let evaluations = rows
        .iter()
        .map(
            |&(code, year, potential, potential_label, manager, manager_label, avg, avg_label, c)| {
                EvaluationRecord {
                    employee_code: code,
                    evaluation_year: year,
                    general_potential: Some(potential),
                    general_potential_label: Some(potential_label.to_string()),
                    direct_manager_score: Some(manager),
                    direct_manager_label: Some(manager_label.to_string()),
                    competencies_avg_score: Some(avg),
                    competencies_avg_label: Some(avg_label.to_string()),
                    one_team_score: Some(c[0]),
                    agility_score: Some(c[1]),
                    customer_passion_score: Some(c[2]),
                    future_care_score: Some(c[3]),
                    ..Default::default()
                }
            },
        )
        .collect();

    ImportPlan {
        employees,
        evaluations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_plan_is_valid_and_linked() {
        let plan = seed_plan();
        assert!(import::validate(&plan.employees).is_ok());
        let codes: Vec<i32> = plan.employees.iter().map(|e| e.employee_code).collect();
        assert!(plan
            .evaluations
            .iter()
            .all(|e| codes.contains(&e.employee_code)));
        assert!(plan
            .employees
            .iter()
            .filter_map(|e| e.manager_code)
            .all(|m| codes.contains(&m)));
    }

    #[test]
    fn update_clause_skips_key_columns() {
        assert_eq!(EVALUATION_COLUMNS[19], "evaluation_year");
        assert_eq!(EVALUATION_COLUMNS[20], "employee_id");
    }
}
