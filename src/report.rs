use std::fmt::Write;

use crate::chat::SampleEmployee;
use crate::level::{performance_color, performance_level};
use crate::models::{EmployeeDetail, HistoricEvaluationData, TeamMember, TeamSummary};

fn score_cell(score: Option<f64>) -> String {
    match score {
        Some(value) => format!("{:.2} [{}]", value, performance_level(Some(value))),
        None => "N/A".to_string(),
    }
}

/// Averages of an empty team are zero; they are shown as N/A rather than as
/// a real 0.00.
fn summary_average(summary: &TeamSummary, value: f64) -> String {
    if summary.total_direct_reports == 0 {
        "N/A".to_string()
    } else {
        format!("{:.2}", value)
    }
}

pub fn build_team_report(year: i32, members: &[TeamMember], summary: &TeamSummary) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Team Performance {}", year);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Direct reports: {}", summary.total_direct_reports);
    let _ = writeln!(
        output,
        "- Average potential: {}",
        summary_average(summary, summary.average_potential)
    );
    let _ = writeln!(
        output,
        "- Average competencies: {}",
        summary_average(summary, summary.average_competencies)
    );
    let _ = writeln!(output, "- High performers: {}", summary.high_performers);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Team");

    if members.is_empty() {
        let _ = writeln!(output, "No team members found for this year.");
        return output;
    }

    for member in members {
        match &member.evaluation {
            Some(evaluation) => {
                let _ = writeln!(
                    output,
                    "- {} ({}) potential {} {}, competencies {}, manager {}",
                    member.full_name,
                    member.employee.employee_code,
                    score_cell(evaluation.general_potential),
                    evaluation.general_potential_label.as_deref().unwrap_or(""),
                    score_cell(evaluation.competencies_avg_score),
                    score_cell(evaluation.direct_manager_score),
                );
            }
            None => {
                let _ = writeln!(
                    output,
                    "- {} ({}) no evaluation",
                    member.full_name, member.employee.employee_code
                );
            }
        }
    }

    output
}

pub fn build_detail_report(year: i32, detail: &EmployeeDetail) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {} ({})", detail.full_name, year);
    let _ = writeln!(output, "{} | RUT {}", detail.employee.email, detail.employee.rut);
    let _ = writeln!(output);

    let Some(evaluation) = &detail.evaluation else {
        let _ = writeln!(output, "No evaluation recorded for this year.");
        return output;
    };

    let _ = writeln!(output, "## Scores");
    let rows = [
        ("Potential", evaluation.general_potential, &evaluation.general_potential_label),
        ("Peer/Client", evaluation.peer_client_score, &evaluation.peer_client_label),
        ("Direct manager", evaluation.direct_manager_score, &evaluation.direct_manager_label),
        ("Collaborators", evaluation.collaborator_score, &evaluation.collaborator_label),
        ("Competencies", evaluation.competencies_avg_score, &evaluation.competencies_avg_label),
    ];
    for (name, score, label) in rows {
        let _ = writeln!(
            output,
            "- {}: {} {}",
            name,
            score_cell(score),
            label.as_deref().unwrap_or("")
        );
    }
    let _ = writeln!(output, "- IPE: {}", score_cell(evaluation.ipe));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Competencies");
    for competency in &detail.competencies {
        let _ = writeln!(
            output,
            "- {}: {:.2} {}",
            competency.name,
            competency.score,
            competency.label.as_deref().unwrap_or("")
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Comments");
    if detail.comments.is_empty() {
        let _ = writeln!(output, "No comments.");
    } else {
        for comment in &detail.comments {
            let _ = writeln!(
                output,
                "- {}: {}",
                comment.category,
                comment.comment_text.as_deref().unwrap_or("")
            );
        }
    }

    output
}

pub fn build_historic_report(data: &HistoricEvaluationData) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# History for {}", data.employee.full_name());
    let _ = writeln!(output);

    if data.available_years.is_empty() {
        let _ = writeln!(output, "No evaluations recorded.");
        return output;
    }

    let mut header = String::from("| Metric |");
    let mut divider = String::from("|--------|");
    for year in &data.available_years {
        let _ = write!(header, " {} |", year);
        divider.push_str("------|");
    }
    header.push_str(" Average |");
    divider.push_str("---------|");
    let _ = writeln!(output, "{}", header);
    let _ = writeln!(output, "{}", divider);

    for row in &data.metrics {
        let mut line = format!("| {} |", row.metric_name);
        for year in &data.available_years {
            let _ = write!(line, " {} |", score_cell(row.score_for(*year)));
        }
        let _ = write!(line, " {} |", score_cell(row.average));
        let _ = writeln!(output, "{}", line);
    }

    output
}

fn plain_score(score: Option<f64>) -> String {
    match score {
        Some(value) => format!("{:.2}", value),
        None => "N/A".to_string(),
    }
}

/// Potential, direct-manager and collaborator scores year by year.
pub fn build_evolution_report(data: &HistoricEvaluationData) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "# Evolución de Métricas - {}",
        data.employee.full_name()
    );
    let _ = writeln!(output);

    if data.available_years.is_empty() {
        let _ = writeln!(output, "No evaluations recorded.");
        return output;
    }

    let _ = writeln!(
        output,
        "| Año | Potencial General | Evaluación Jefe | Evaluación Colaborador |"
    );
    let _ = writeln!(
        output,
        "|-----|-------------------|-----------------|------------------------|"
    );
    for year in &data.available_years {
        let evaluation = data.evaluations_by_year.get(year);
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} |",
            year,
            plain_score(evaluation.and_then(|e| e.general_potential)),
            plain_score(evaluation.and_then(|e| e.direct_manager_score)),
            plain_score(evaluation.and_then(|e| e.collaborator_score)),
        );
    }

    output
}

fn badge(score: f64) -> String {
    let color = performance_color(Some(score));
    format!("{:.2} [{} {}]", score, color.level, color.background)
}

/// Card shown under a chat reply for each employee the question mentions.
pub fn build_employee_card(employee: &SampleEmployee) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "[{}]", employee.full_name());
    let _ = writeln!(
        output,
        "  Potential: {} {}",
        badge(employee.potential),
        employee.potential_label
    );
    let _ = writeln!(
        output,
        "  Competencies: {} {}",
        badge(employee.competencies),
        employee.competencies_label.unwrap_or("")
    );
    let _ = writeln!(
        output,
        "  Direct manager: {} {}",
        badge(employee.direct_manager),
        employee.direct_manager_label
    );
    if let Some(alert) = employee.alert {
        let _ = writeln!(output, "  Alert: {}", alert.text);
    }

    output
}
