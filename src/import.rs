use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use csv::{ReaderBuilder, StringRecord, Trim};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::ImportError;
use crate::models::{EmployeeRecord, EvaluationRecord, ImportCounts};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_YEAR: i32 = 2024;

/// A CSV file with headers resolved to column positions. When a header
/// repeats, the last column with that name wins.
pub struct Table {
    columns: HashMap<String, usize>,
    rows: Vec<StringRecord>,
}

impl Table {
    pub fn read<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let columns = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim_start_matches('\u{feff}').to_string(), idx))
            .collect();
        let rows = reader
            .records()
            .filter(|row| !matches!(row, Ok(r) if r.iter().all(str::is_empty)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { columns, rows })
    }

    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        let file = std::fs::File::open(path).map_err(|err| ImportError::Csv {
            path: path.display().to_string(),
            source: err.into(),
        })?;
        Self::read(file).map_err(|source| ImportError::Csv {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn field<'a>(&self, row: &'a StringRecord, column: &str) -> Option<&'a str> {
        self.columns.get(column).and_then(|&idx| row.get(idx))
    }
}

/// Parses a score cell. Blank cells and `-` are missing; a decimal comma is
/// accepted.
pub fn to_decimal(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || value == "-" {
        return None;
    }
    value.replacen(',', ".", 1).parse().ok()
}

pub fn clean_string(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == "-" {
        None
    } else {
        Some(value.to_string())
    }
}

fn employee_code(value: Option<&str>) -> Result<i32, ImportError> {
    let value = value.unwrap_or_default();
    value
        .trim()
        .parse()
        .map_err(|_| ImportError::InvalidEmployeeCode {
            value: value.to_string(),
        })
}

/// Builds one employee per hierarchy row (`ID`, `Nombre`, `Apellido`,
/// `Identifier`). Managers outside the file leave the employee top-level.
pub fn process_hierarchy(table: &Table) -> Result<Vec<EmployeeRecord>, ImportError> {
    let mut employees = Vec::with_capacity(table.len());
    for row in &table.rows {
        employees.push(EmployeeRecord {
            id: Uuid::new_v4(),
            employee_code: employee_code(table.field(row, "ID"))?,
            first_name: table.field(row, "Nombre").unwrap_or_default().to_string(),
            last_name: table.field(row, "Apellido").unwrap_or_default().to_string(),
            manager_code: table
                .field(row, "Identifier")
                .and_then(|v| v.parse().ok()),
            rut: None,
            email: None,
        });
    }

    let known: std::collections::HashSet<i32> =
        employees.iter().map(|e| e.employee_code).collect();
    for employee in &mut employees {
        if let Some(manager) = employee.manager_code {
            if !known.contains(&manager) {
                warn!(
                    employee = employee.employee_code,
                    manager, "manager not found in hierarchy, importing as top-level"
                );
                employee.manager_code = None;
            }
        }
    }

    info!(count = employees.len(), "processed hierarchy");
    Ok(employees)
}

/// Fills RUT and email from the performance file and builds one evaluation
/// per known employee for `year`. The shared `Etiqueta` column labels every
/// score of the row.
pub fn process_performance(
    table: &Table,
    employees: &mut [EmployeeRecord],
    year: i32,
) -> Result<Vec<EvaluationRecord>, ImportError> {
    let by_code: HashMap<i32, usize> = employees
        .iter()
        .enumerate()
        .map(|(idx, e)| (e.employee_code, idx))
        .collect();

    let mut evaluations = Vec::with_capacity(table.len());
    for row in &table.rows {
        let code = employee_code(table.field(row, "ID"))?;
        let Some(&idx) = by_code.get(&code) else {
            warn!(employee = code, "performance row has no hierarchy entry, skipping");
            continue;
        };

        let text = |column: &str| table.field(row, column).and_then(clean_string);
        let score = |column: &str| table.field(row, column).and_then(to_decimal);

        let employee = &mut employees[idx];
        employee.rut = text("Rut");
        employee.email = text("Email");

        let label = text("Etiqueta");
        evaluations.push(EvaluationRecord {
            employee_code: code,
            evaluation_year: year,
            general_potential: score("General - Potencial"),
            general_potential_label: label.clone(),
            peer_client_score: score("Par/Cliente (Desempeño)"),
            peer_client_label: label.clone(),
            direct_manager_score: score("Jefe Directo (Desempeño)"),
            direct_manager_label: label.clone(),
            collaborator_score: score("Colaborador (Desempeño)"),
            collaborator_label: label.clone(),
            competencies_avg_score: score("Promedio de Competencias Desempeño"),
            competencies_avg_label: label.clone(),
            one_team_score: score("SOMOS UN SOLO EQUIPO"),
            one_team_label: label.clone(),
            agility_score: score("NOS MOVEMOS ÁGILMENTE"),
            agility_label: label.clone(),
            customer_passion_score: score("NOS APASIONAMOS POR EL CLIENTE"),
            customer_passion_label: label.clone(),
            future_care_score: score("CUIDAMOS EL FUTURO"),
            future_care_label: label,
            ipe: score("IPE"),
        });
    }

    info!(count = evaluations.len(), year, "processed performance data");
    Ok(evaluations)
}

/// Every employee needs a RUT and an email, and every code may appear only
/// once, before anything is written.
pub fn validate(employees: &[EmployeeRecord]) -> Result<(), ImportError> {
    let invalid: Vec<String> = employees
        .iter()
        .filter(|e| e.rut.is_none() || e.email.is_none())
        .map(|e| format!("{}: {} {}", e.employee_code, e.first_name, e.last_name))
        .collect();

    if !invalid.is_empty() {
        for employee in &invalid {
            warn!(%employee, "missing rut or email");
        }
        return Err(ImportError::MissingRequiredFields(invalid));
    }

    let mut seen = HashSet::new();
    let mut duplicates: Vec<i32> = employees
        .iter()
        .map(|e| e.employee_code)
        .filter(|code| !seen.insert(*code))
        .collect();
    if !duplicates.is_empty() {
        duplicates.sort_unstable();
        duplicates.dedup();
        warn!(codes = ?duplicates, "duplicate employee codes");
        return Err(ImportError::DuplicateEmployeeCodes(duplicates));
    }

    Ok(())
}

pub struct ImportPlan {
    pub employees: Vec<EmployeeRecord>,
    pub evaluations: Vec<EvaluationRecord>,
}

/// Pairs each evaluation with the id its employee is stored under. Codes
/// that were never stored are skipped.
fn assign_ids<'a>(
    evaluations: &'a [EvaluationRecord],
    stored_ids: &HashMap<i32, Uuid>,
) -> Vec<(Uuid, &'a EvaluationRecord)> {
    evaluations
        .iter()
        .filter_map(|e| match stored_ids.get(&e.employee_code) {
            Some(&id) => Some((id, e)),
            None => {
                warn!(code = e.employee_code, "no stored employee for evaluation");
                None
            }
        })
        .collect()
}

fn batches<T>(items: &[T], batch_size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(batch_size.max(1))
}

/// Writes the plan in one transaction, so a failed batch leaves nothing
/// behind.
pub async fn write_plan(pool: &PgPool, plan: &ImportPlan, batch_size: usize) -> anyhow::Result<()> {
    validate(&plan.employees)?;
    let mut tx = pool.begin().await.context("failed to start import")?;

    let mut stored_ids: HashMap<i32, Uuid> = HashMap::new();
    for (idx, batch) in batches(&plan.employees, batch_size).enumerate() {
        let ids = db::upsert_employees(&mut *tx, batch)
            .await
            .with_context(|| format!("employee batch {} failed", idx + 1))?;
        stored_ids.extend(ids);
        info!(
            imported = stored_ids.len(),
            total = plan.employees.len(),
            "imported employees"
        );
    }

    for batch in batches(&plan.employees, batch_size) {
        db::link_managers(&mut *tx, batch).await?;
    }

    let evaluations = assign_ids(&plan.evaluations, &stored_ids);
    let mut imported = 0;
    for (idx, batch) in batches(&evaluations, batch_size).enumerate() {
        db::upsert_evaluations(&mut *tx, batch)
            .await
            .with_context(|| format!("evaluation batch {} failed", idx + 1))?;
        imported += batch.len();
        info!(imported, total = evaluations.len(), "imported evaluations");
    }

    tx.commit().await.context("failed to commit import")?;
    Ok(())
}

pub async fn run_import(
    pool: &PgPool,
    hierarchy: &Path,
    performance: &Path,
    year: i32,
    batch_size: usize,
) -> anyhow::Result<ImportCounts> {
    let hierarchy_table = Table::from_path(hierarchy)?;
    let performance_table = Table::from_path(performance)?;
    info!(
        hierarchy = hierarchy_table.len(),
        performance = performance_table.len(),
        "read CSV files"
    );
    if performance_table.is_empty() {
        warn!(path = %performance.display(), "performance file has no rows");
    }

    let mut employees = process_hierarchy(&hierarchy_table)?;
    let evaluations = process_performance(&performance_table, &mut employees, year)?;

    let plan = ImportPlan {
        employees,
        evaluations,
    };
    write_plan(pool, &plan, batch_size).await?;

    let counts = db::import_counts(pool, year).await?;
    info!(
        employees = counts.employees,
        evaluations = counts.evaluations,
        managers = counts.managers,
        year,
        "verified import"
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIERARCHY: &str = "\u{feff}ID,Nombre,Apellido,Identifier\n\
        1000,Carolina,Fuentes,1\n\
        1001, Paula ,Roa,1000\n\
        \n\
        1002,Alvaro,Marquez,1000\n";

    const PERFORMANCE: &str = "ID,Rut,Email,General - Potencial,Etiqueta,Jefe Directo (Desempeño),SOMOS UN SOLO EQUIPO,CUIDAMOS EL FUTURO\n\
        1000,12345678-5,carolina@example.com,\"3,4\",Alto,-,3.5,\n\
        1001,17333444-5,paula@example.com,2.5,Medio (Calibrado),3.75,4.0,4\n\
        1002,16222333-4,alvaro@example.com,2.4,Bajo,3.13,abc,3.33\n\
        9999,1-9,ghost@example.com,3.0,Medio,3.0,3.0,3.0\n";

    fn tables() -> (Table, Table) {
        (
            Table::read(HIERARCHY.as_bytes()).expect("hierarchy"),
            Table::read(PERFORMANCE.as_bytes()).expect("performance"),
        )
    }

    #[test]
    fn decimals_accept_comma_and_placeholders() {
        assert_eq!(to_decimal("3,5"), Some(3.5));
        assert_eq!(to_decimal(" 2.88 "), Some(2.88));
        assert_eq!(to_decimal("-"), None);
        assert_eq!(to_decimal(""), None);
        assert_eq!(to_decimal("n/a"), None);
    }

    #[test]
    fn strings_are_trimmed_and_placeholders_dropped() {
        assert_eq!(clean_string("  Sobresaliente "), Some("Sobresaliente".to_string()));
        assert_eq!(clean_string("-"), None);
        assert_eq!(clean_string("   "), None);
    }

    #[test]
    fn hierarchy_resolves_managers_by_code() {
        let (hierarchy, _) = tables();
        let employees = process_hierarchy(&hierarchy).expect("hierarchy");
        assert_eq!(employees.len(), 3);
        assert_eq!(employees[0].manager_code, None);
        assert_eq!(employees[1].first_name, "Paula");
        assert_eq!(employees[1].manager_code, Some(1000));
        assert_ne!(employees[0].id, employees[1].id);
    }

    #[test]
    fn performance_enriches_employees_and_skips_unknown_codes() {
        let (hierarchy, performance) = tables();
        let mut employees = process_hierarchy(&hierarchy).expect("hierarchy");
        let evaluations =
            process_performance(&performance, &mut employees, 2024).expect("performance");

        assert_eq!(evaluations.len(), 3);
        assert_eq!(employees[1].email.as_deref(), Some("paula@example.com"));
        assert!(validate(&employees).is_ok());

        let carolina = &evaluations[0];
        assert_eq!(carolina.general_potential, Some(3.4));
        assert_eq!(carolina.direct_manager_score, None);
        assert_eq!(carolina.future_care_score, None);
        assert_eq!(carolina.one_team_label.as_deref(), Some("Alto"));
        assert_eq!(carolina.ipe, None);

        let alvaro = &evaluations[2];
        assert_eq!(alvaro.evaluation_year, 2024);
        assert_eq!(alvaro.one_team_score, None);
        assert_eq!(alvaro.future_care_score, Some(3.33));
    }

    #[test]
    fn missing_contact_fields_abort_the_import() {
        let (hierarchy, _) = tables();
        let mut employees = process_hierarchy(&hierarchy).expect("hierarchy");
        employees[0].rut = Some("1-9".to_string());
        employees[0].email = Some("a@example.com".to_string());
        employees[2].rut = Some("2-7".to_string());

        match validate(&employees) {
            Err(ImportError::MissingRequiredFields(names)) => {
                assert_eq!(
                    names,
                    vec!["1001: Paula Roa".to_string(), "1002: Alvaro Marquez".to_string()]
                );
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn invalid_employee_code_is_reported() {
        let table = Table::read("ID,Nombre,Apellido,Identifier\nabc,Ana,Soto,1\n".as_bytes())
            .expect("table");
        assert!(matches!(
            process_hierarchy(&table),
            Err(ImportError::InvalidEmployeeCode { .. })
        ));
    }

    #[test]
    fn repeated_headers_use_the_last_column() {
        let table = Table::read("ID,Etiqueta,Etiqueta\n1,first,second\n".as_bytes())
            .expect("table");
        assert_eq!(table.field(&table.rows[0], "Etiqueta"), Some("second"));
    }

    #[test]
    fn duplicate_codes_abort_the_import() {
        let (hierarchy, performance) = tables();
        let mut employees = process_hierarchy(&hierarchy).expect("hierarchy");
        process_performance(&performance, &mut employees, 2024).expect("performance");
        let mut again = employees[1].clone();
        again.id = Uuid::new_v4();
        employees.push(again);

        match validate(&employees) {
            Err(ImportError::DuplicateEmployeeCodes(codes)) => assert_eq!(codes, vec![1001]),
            other => panic!("expected duplicate codes, got {other:?}"),
        }
    }

    #[test]
    fn evaluations_use_the_stored_employee_id() {
        let (hierarchy, performance) = tables();
        let mut employees = process_hierarchy(&hierarchy).expect("hierarchy");
        let evaluations =
            process_performance(&performance, &mut employees, 2024).expect("performance");

        let existing = Uuid::new_v4();
        let stored_ids: HashMap<i32, Uuid> = [
            (1000, employees[0].id),
            (1001, existing),
        ]
        .into();

        let assigned = assign_ids(&evaluations, &stored_ids);
        let pairs: Vec<(Uuid, i32)> = assigned
            .iter()
            .map(|(id, e)| (*id, e.employee_code))
            .collect();
        assert_eq!(pairs, vec![(employees[0].id, 1000), (existing, 1001)]);
        assert_ne!(existing, employees[1].id);
    }

    #[test]
    fn batches_never_stall_and_keep_the_remainder() {
        let items: Vec<i32> = (0..5).collect();
        let sizes: Vec<usize> = batches(&items, 2).map(<[i32]>::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        let sizes: Vec<usize> = batches(&items, 0).map(<[i32]>::len).collect();
        assert_eq!(sizes, vec![1; 5]);

        let empty: [i32; 0] = [];
        assert_eq!(batches(&empty, 100).count(), 0);
    }
}
