use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::models::{Competency, Employee, EmployeeDetail, Evaluation, TeamMember, TeamSummary};
use crate::store::EvaluationStore;

pub const HIGH_PERFORMER_POTENTIAL: f64 = 3.0;
pub const FALLBACK_YEAR: i32 = 2024;

/// Direct reports of `manager_id` paired with their evaluation for `year`.
///
/// A failed reports query yields an empty team; a failed evaluations query
/// yields the team with every evaluation missing. Both are logged.
pub async fn team_members(
    store: &dyn EvaluationStore,
    manager_id: Uuid,
    year: i32,
) -> Vec<TeamMember> {
    let employees = match store.direct_reports(manager_id).await {
        Ok(employees) => employees,
        Err(err) => {
            error!(%manager_id, error = %err, "failed to fetch direct reports");
            return Vec::new();
        }
    };

    if employees.is_empty() {
        return Vec::new();
    }

    let ids: Vec<Uuid> = employees.iter().map(|e| e.id).collect();
    let evaluations = match store.evaluations_for_year(&ids, year).await {
        Ok(evaluations) => evaluations,
        Err(err) => {
            error!(%manager_id, year, error = %err, "failed to fetch team evaluations");
            Vec::new()
        }
    };

    employees
        .into_iter()
        .map(|employee| {
            let evaluation = evaluations
                .iter()
                .find(|e| e.employee_id == employee.id)
                .cloned();
            TeamMember {
                full_name: employee.full_name(),
                employee,
                evaluation,
            }
        })
        .collect()
}

pub fn calculate_team_summary(members: &[TeamMember]) -> TeamSummary {
    let mut potential = Mean::default();
    let mut competencies = Mean::default();
    let mut high_performers = 0;

    for evaluation in members.iter().filter_map(|m| m.evaluation.as_ref()) {
        if let Some(score) = evaluation.general_potential {
            potential.push(score);
            if score >= HIGH_PERFORMER_POTENTIAL {
                high_performers += 1;
            }
        }
        if let Some(score) = evaluation.competencies_avg_score {
            competencies.push(score);
        }
    }

    TeamSummary {
        total_direct_reports: members.len(),
        average_potential: potential.value().unwrap_or(0.0),
        average_competencies: competencies.value().unwrap_or(0.0),
        high_performers,
    }
}

/// Running mean over present values only.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    pub(crate) fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub(crate) fn value(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

pub async fn employee_detail(
    store: &dyn EvaluationStore,
    employee_id: Uuid,
    year: i32,
) -> Option<EmployeeDetail> {
    let employee = match store.employee(employee_id).await {
        Ok(employee) => employee,
        Err(err) => {
            error!(%employee_id, error = %err, "failed to fetch employee");
            return None;
        }
    };

    let evaluation = match store.evaluation_for_year(employee_id, year).await {
        Ok(evaluation) => Some(evaluation),
        Err(err) if err.is_not_found() => {
            debug!(%employee_id, year, "no evaluation recorded");
            None
        }
        Err(err) => {
            error!(%employee_id, year, error = %err, "failed to fetch evaluation");
            None
        }
    };

    let comments = match &evaluation {
        Some(evaluation) => match store.comments(evaluation.id).await {
            Ok(comments) => comments,
            Err(err) => {
                error!(evaluation_id = %evaluation.id, error = %err, "failed to fetch comments");
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let competencies = evaluation.as_ref().map(competencies).unwrap_or_default();

    Some(EmployeeDetail {
        full_name: employee.full_name(),
        employee,
        evaluation,
        comments,
        competencies,
    })
}

/// The four competency pillars of one evaluation, for the radar view.
/// Missing scores are drawn as 0.
pub fn competencies(evaluation: &Evaluation) -> Vec<Competency> {
    vec![
        Competency {
            name: "Un Solo Equipo",
            score: evaluation.one_team_score.unwrap_or(0.0),
            label: evaluation.one_team_label.clone(),
        },
        Competency {
            name: "Agilmente",
            score: evaluation.agility_score.unwrap_or(0.0),
            label: evaluation.agility_label.clone(),
        },
        Competency {
            name: "Pasión Cliente",
            score: evaluation.customer_passion_score.unwrap_or(0.0),
            label: evaluation.customer_passion_label.clone(),
        },
        Competency {
            name: "Futuro",
            score: evaluation.future_care_score.unwrap_or(0.0),
            label: evaluation.future_care_label.clone(),
        },
    ]
}

pub async fn available_years(store: &dyn EvaluationStore) -> Vec<i32> {
    match store.evaluation_years().await {
        Ok(years) if !years.is_empty() => years,
        Ok(_) => vec![FALLBACK_YEAR],
        Err(err) => {
            error!(error = %err, "failed to fetch evaluation years");
            vec![FALLBACK_YEAR]
        }
    }
}

/// The manager followed by their direct reports, for the employee selector.
pub async fn manager_and_team(store: &dyn EvaluationStore, manager_id: Uuid) -> Vec<Employee> {
    let manager = match store.employee(manager_id).await {
        Ok(manager) => manager,
        Err(err) => {
            error!(%manager_id, error = %err, "failed to fetch manager");
            return Vec::new();
        }
    };

    let reports = match store.direct_reports(manager_id).await {
        Ok(reports) => reports,
        Err(err) => {
            warn!(%manager_id, error = %err, "failed to fetch direct reports");
            return vec![manager];
        }
    };

    let mut team = Vec::with_capacity(reports.len() + 1);
    let manager_id = manager.id;
    team.push(manager);
    team.extend(reports.into_iter().filter(|r| r.id != manager_id));
    team
}
