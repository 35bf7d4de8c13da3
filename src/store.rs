use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{Employee, Evaluation, EvaluationComment};

/// Read-only queries the aggregation layer issues against the evaluation
/// tables. Single-row lookups report a missing row as `StoreError::NotFound`.
#[async_trait]
pub trait EvaluationStore: Send + Sync {
    async fn employee(&self, id: Uuid) -> StoreResult<Employee>;

    /// Employees whose `manager_id` is `manager_id`, ordered by last name
    /// then first name.
    async fn direct_reports(&self, manager_id: Uuid) -> StoreResult<Vec<Employee>>;

    async fn evaluations_for_year(
        &self,
        employee_ids: &[Uuid],
        year: i32,
    ) -> StoreResult<Vec<Evaluation>>;

    async fn evaluation_for_year(&self, employee_id: Uuid, year: i32) -> StoreResult<Evaluation>;

    /// Every evaluation of one employee, oldest year first.
    async fn evaluations_for_employee(&self, employee_id: Uuid) -> StoreResult<Vec<Evaluation>>;

    async fn comments(&self, evaluation_id: Uuid) -> StoreResult<Vec<EvaluationComment>>;

    /// Distinct evaluation years, most recent first.
    async fn evaluation_years(&self) -> StoreResult<Vec<i32>>;
}

#[cfg(test)]
pub mod memory {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use super::EvaluationStore;
    use crate::error::{StoreError, StoreResult};
    use crate::models::{Employee, Evaluation, EvaluationComment};

    /// Query families that can be made to fail independently.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Query {
        Employee,
        DirectReports,
        EvaluationsForYear,
        EvaluationForYear,
        EvaluationsForEmployee,
        Comments,
        Years,
    }

    #[derive(Default)]
    pub struct MemoryStore {
        pub employees: Vec<Employee>,
        pub evaluations: Vec<Evaluation>,
        pub comments: Vec<EvaluationComment>,
        pub failing: HashSet<Query>,
    }

    impl MemoryStore {
        pub fn failing(mut self, query: Query) -> Self {
            self.failing.insert(query);
            self
        }

        fn check(&self, query: Query) -> StoreResult<()> {
            if self.failing.contains(&query) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(())
        }
    }

    pub fn employee(code: i32, first: &str, last: &str, manager_id: Option<Uuid>) -> Employee {
        Employee {
            id: Uuid::new_v4(),
            employee_code: code,
            rut: format!("{code}-K"),
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: format!("{}.{}@example.com", first.to_lowercase(), last.to_lowercase()),
            manager_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn evaluation(employee_id: Uuid, year: i32) -> Evaluation {
        Evaluation {
            id: Uuid::new_v4(),
            employee_id,
            evaluation_year: year,
            general_potential: None,
            general_potential_label: None,
            peer_client_score: None,
            peer_client_label: None,
            direct_manager_score: None,
            direct_manager_label: None,
            collaborator_score: None,
            collaborator_label: None,
            competencies_avg_score: None,
            competencies_avg_label: None,
            one_team_score: None,
            one_team_label: None,
            agility_score: None,
            agility_label: None,
            customer_passion_score: None,
            customer_passion_label: None,
            future_care_score: None,
            future_care_label: None,
            ipe: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[async_trait]
    impl EvaluationStore for MemoryStore {
        async fn employee(&self, id: Uuid) -> StoreResult<Employee> {
            self.check(Query::Employee)?;
            self.employees
                .iter()
                .find(|e| e.id == id)
                .cloned()
                .ok_or(StoreError::NotFound { entity: "employee" })
        }

        async fn direct_reports(&self, manager_id: Uuid) -> StoreResult<Vec<Employee>> {
            self.check(Query::DirectReports)?;
            let mut reports: Vec<Employee> = self
                .employees
                .iter()
                .filter(|e| e.manager_id == Some(manager_id))
                .cloned()
                .collect();
            reports.sort_by(|a, b| {
                a.last_name
                    .cmp(&b.last_name)
                    .then_with(|| a.first_name.cmp(&b.first_name))
            });
            Ok(reports)
        }

        async fn evaluations_for_year(
            &self,
            employee_ids: &[Uuid],
            year: i32,
        ) -> StoreResult<Vec<Evaluation>> {
            self.check(Query::EvaluationsForYear)?;
            Ok(self
                .evaluations
                .iter()
                .filter(|e| e.evaluation_year == year && employee_ids.contains(&e.employee_id))
                .cloned()
                .collect())
        }

        async fn evaluation_for_year(
            &self,
            employee_id: Uuid,
            year: i32,
        ) -> StoreResult<Evaluation> {
            self.check(Query::EvaluationForYear)?;
            self.evaluations
                .iter()
                .find(|e| e.employee_id == employee_id && e.evaluation_year == year)
                .cloned()
                .ok_or(StoreError::NotFound { entity: "evaluation" })
        }

        async fn evaluations_for_employee(
            &self,
            employee_id: Uuid,
        ) -> StoreResult<Vec<Evaluation>> {
            self.check(Query::EvaluationsForEmployee)?;
            let mut rows: Vec<Evaluation> = self
                .evaluations
                .iter()
                .filter(|e| e.employee_id == employee_id)
                .cloned()
                .collect();
            rows.sort_by_key(|e| e.evaluation_year);
            Ok(rows)
        }

        async fn comments(&self, evaluation_id: Uuid) -> StoreResult<Vec<EvaluationComment>> {
            self.check(Query::Comments)?;
            Ok(self
                .comments
                .iter()
                .filter(|c| c.evaluation_id == evaluation_id)
                .cloned()
                .collect())
        }

        async fn evaluation_years(&self) -> StoreResult<Vec<i32>> {
            self.check(Query::Years)?;
            let mut years: Vec<i32> = self.evaluations.iter().map(|e| e.evaluation_year).collect();
            years.sort_unstable_by(|a, b| b.cmp(a));
            years.dedup();
            Ok(years)
        }
    }
}
