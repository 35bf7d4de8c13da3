use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Employee {
    pub id: Uuid,
    pub employee_code: i32,
    pub rut: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub manager_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// One row of `performance_evaluations`: scores are on a 1-5 scale and any
/// of them may be missing for a given year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Evaluation {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub evaluation_year: i32,

    pub general_potential: Option<f64>,
    pub general_potential_label: Option<String>,

    pub peer_client_score: Option<f64>,
    pub peer_client_label: Option<String>,
    pub direct_manager_score: Option<f64>,
    pub direct_manager_label: Option<String>,
    pub collaborator_score: Option<f64>,
    pub collaborator_label: Option<String>,
    pub competencies_avg_score: Option<f64>,
    pub competencies_avg_label: Option<String>,

    pub one_team_score: Option<f64>,
    pub one_team_label: Option<String>,
    pub agility_score: Option<f64>,
    pub agility_label: Option<String>,
    pub customer_passion_score: Option<f64>,
    pub customer_passion_label: Option<String>,
    pub future_care_score: Option<f64>,
    pub future_care_label: Option<String>,

    pub ipe: Option<f64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EvaluationComment {
    pub id: Uuid,
    pub evaluation_id: Uuid,
    pub category: String,
    pub comment_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamMember {
    pub employee: Employee,
    pub evaluation: Option<Evaluation>,
    pub full_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TeamSummary {
    pub total_direct_reports: usize,
    pub average_potential: f64,
    pub average_competencies: f64,
    pub high_performers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Competency {
    pub name: &'static str,
    pub score: f64,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeDetail {
    pub employee: Employee,
    pub evaluation: Option<Evaluation>,
    pub comments: Vec<EvaluationComment>,
    pub competencies: Vec<Competency>,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct YearCell {
    pub score: Option<f64>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub metric_name: &'static str,
    pub year_data: BTreeMap<i32, YearCell>,
    pub average: Option<f64>,
}

impl MetricRow {
    pub fn score_for(&self, year: i32) -> Option<f64> {
        self.year_data.get(&year).and_then(|cell| cell.score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricEvaluationData {
    pub employee: Employee,
    pub evaluations_by_year: BTreeMap<i32, Evaluation>,
    pub available_years: Vec<i32>,
    pub metrics: Vec<MetricRow>,
}

/// An employee as read from the hierarchy and performance CSVs, before it
/// is written. `manager_code` refers to another record's `employee_code`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeRecord {
    pub id: Uuid,
    pub employee_code: i32,
    pub first_name: String,
    pub last_name: String,
    pub manager_code: Option<i32>,
    pub rut: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvaluationRecord {
    pub employee_code: i32,
    pub evaluation_year: i32,
    pub general_potential: Option<f64>,
    pub general_potential_label: Option<String>,
    pub peer_client_score: Option<f64>,
    pub peer_client_label: Option<String>,
    pub direct_manager_score: Option<f64>,
    pub direct_manager_label: Option<String>,
    pub collaborator_score: Option<f64>,
    pub collaborator_label: Option<String>,
    pub competencies_avg_score: Option<f64>,
    pub competencies_avg_label: Option<String>,
    pub one_team_score: Option<f64>,
    pub one_team_label: Option<String>,
    pub agility_score: Option<f64>,
    pub agility_label: Option<String>,
    pub customer_passion_score: Option<f64>,
    pub customer_passion_label: Option<String>,
    pub future_care_score: Option<f64>,
    pub future_care_label: Option<String>,
    pub ipe: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportCounts {
    pub employees: i64,
    pub evaluations: i64,
    pub managers: i64,
}
