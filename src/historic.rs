use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::models::{Evaluation, HistoricEvaluationData, MetricRow, YearCell};
use crate::performance::Mean;
use crate::store::EvaluationStore;

pub struct MetricDefinition {
    pub name: &'static str,
    pub score: fn(&Evaluation) -> Option<f64>,
    pub label: fn(&Evaluation) -> Option<&str>,
}

fn no_label(_: &Evaluation) -> Option<&str> {
    None
}

/// Rows of the historic table, in display order.
pub const METRICS: [MetricDefinition; 10] = [
    MetricDefinition {
        name: "Potencial General",
        score: |e| e.general_potential,
        label: |e| e.general_potential_label.as_deref(),
    },
    MetricDefinition {
        name: "Evaluación Par",
        score: |e| e.peer_client_score,
        label: |e| e.peer_client_label.as_deref(),
    },
    MetricDefinition {
        name: "Evaluación Jefe",
        score: |e| e.direct_manager_score,
        label: |e| e.direct_manager_label.as_deref(),
    },
    MetricDefinition {
        name: "Evaluación Colaborador",
        score: |e| e.collaborator_score,
        label: |e| e.collaborator_label.as_deref(),
    },
    MetricDefinition {
        name: "Promedio Competencias",
        score: |e| e.competencies_avg_score,
        label: |e| e.competencies_avg_label.as_deref(),
    },
    MetricDefinition {
        name: "IPE",
        score: |e| e.ipe,
        label: no_label,
    },
    MetricDefinition {
        name: "Somos un Solo Equipo",
        score: |e| e.one_team_score,
        label: |e| e.one_team_label.as_deref(),
    },
    MetricDefinition {
        name: "Nos Movemos Agilmente",
        score: |e| e.agility_score,
        label: |e| e.agility_label.as_deref(),
    },
    MetricDefinition {
        name: "Nos Apasionamos por el Cliente",
        score: |e| e.customer_passion_score,
        label: |e| e.customer_passion_label.as_deref(),
    },
    MetricDefinition {
        name: "Cuidamos el Futuro",
        score: |e| e.future_care_score,
        label: |e| e.future_care_label.as_deref(),
    },
];

/// Every evaluation of one employee folded into a metric-by-year table.
pub async fn employee_historic_data(
    store: &dyn EvaluationStore,
    employee_id: Uuid,
) -> Option<HistoricEvaluationData> {
    let employee = match store.employee(employee_id).await {
        Ok(employee) => employee,
        Err(err) => {
            error!(%employee_id, error = %err, "failed to fetch employee");
            return None;
        }
    };

    let evaluations = match store.evaluations_for_employee(employee_id).await {
        Ok(evaluations) => evaluations,
        Err(err) => {
            error!(%employee_id, error = %err, "failed to fetch evaluation history");
            return None;
        }
    };

    let evaluations_by_year: BTreeMap<i32, Evaluation> = evaluations
        .into_iter()
        .map(|e| (e.evaluation_year, e))
        .collect();
    let available_years: Vec<i32> = evaluations_by_year.keys().copied().collect();
    let metrics = build_metric_rows(&evaluations_by_year, &available_years);

    Some(HistoricEvaluationData {
        employee,
        evaluations_by_year,
        available_years,
        metrics,
    })
}

pub fn build_metric_rows(
    evaluations_by_year: &BTreeMap<i32, Evaluation>,
    years: &[i32],
) -> Vec<MetricRow> {
    METRICS
        .iter()
        .map(|metric| {
            let mut mean = Mean::default();
            let year_data = years
                .iter()
                .map(|&year| {
                    let cell = match evaluations_by_year.get(&year) {
                        Some(evaluation) => YearCell {
                            score: (metric.score)(evaluation),
                            label: (metric.label)(evaluation).map(str::to_string),
                        },
                        None => YearCell::default(),
                    };
                    if let Some(score) = cell.score {
                        mean.push(score);
                    }
                    (year, cell)
                })
                .collect();

            MetricRow {
                metric_name: metric.name,
                year_data,
                average: mean.value(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortColumn {
    Year(i32),
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Sorts rows by one year's score or by the row average. Rows without a
/// value for the column go last in either direction; ties keep their order.
pub fn sort_metric_rows(rows: &mut [MetricRow], column: SortColumn, direction: SortDirection) {
    let key = |row: &MetricRow| match column {
        SortColumn::Year(year) => row.score_for(year),
        SortColumn::Average => row.average,
    };

    rows.sort_by(|a, b| match (key(a), key(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        }
    });
}
