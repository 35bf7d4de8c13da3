use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod chat;
mod config;
mod db;
mod error;
mod historic;
mod import;
mod level;
mod models;
mod performance;
mod report;
mod store;

use crate::config::Config;
use crate::historic::{SortColumn, SortDirection};

#[derive(Parser)]
#[command(name = "team-calibration")]
#[command(about = "Performance evaluation views and calibration assistant for managers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a sample team with two years of evaluations
    Seed,
    /// Import the hierarchy and performance CSV exports
    Import {
        #[arg(long)]
        hierarchy: PathBuf,
        #[arg(long)]
        performance: PathBuf,
        #[arg(long, default_value_t = import::DEFAULT_YEAR)]
        year: i32,
        #[arg(long, default_value_t = import::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// List the years that have evaluations
    Years {
        #[arg(long)]
        json: bool,
    },
    /// Show a manager's direct reports and team summary
    Team {
        #[arg(long)]
        manager: Uuid,
        #[arg(long, default_value_t = performance::FALLBACK_YEAR)]
        year: i32,
        #[arg(long)]
        json: bool,
    },
    /// List a manager and their direct reports
    Members {
        #[arg(long)]
        manager: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Show one employee's evaluation, competencies and comments
    Employee {
        #[arg(long)]
        id: Uuid,
        #[arg(long, default_value_t = performance::FALLBACK_YEAR)]
        year: i32,
        #[arg(long)]
        json: bool,
    },
    /// Show every metric of one employee across all evaluated years
    #[command(group(
        ArgGroup::new("sort")
            .args(["sort_year", "sort_average"])
            .multiple(false)
    ))]
    History {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        sort_year: Option<i32>,
        #[arg(long)]
        sort_average: bool,
        #[arg(long)]
        desc: bool,
        /// Show potential, manager and collaborator scores per year instead
        #[arg(long)]
        evolution: bool,
        #[arg(long)]
        json: bool,
    },
    /// Ask the calibration assistant a question
    Chat {
        /// JSON file with the earlier turns of the conversation
        #[arg(long)]
        history: Option<PathBuf>,
        #[arg(required = true)]
        message: Vec<String>,
    },
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let database_url = config.require_database_url()?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import {
            hierarchy,
            performance,
            year,
            batch_size,
        } => {
            let pool = connect(&config).await?;
            let counts =
                import::run_import(&pool, &hierarchy, &performance, year, batch_size).await?;
            println!(
                "Imported data: {} employees, {} evaluations for {}, {} managers.",
                counts.employees, counts.evaluations, year, counts.managers
            );
        }
        Commands::Years { json } => {
            let store = store_for(&config).await?;
            let years = performance::available_years(&store).await;
            if json {
                print_json(&years)?;
            } else {
                for year in years {
                    println!("{year}");
                }
            }
        }
        Commands::Team {
            manager,
            year,
            json,
        } => {
            let store = store_for(&config).await?;
            let members = performance::team_members(&store, manager, year).await;
            let summary = performance::calculate_team_summary(&members);
            if json {
                print_json(&serde_json::json!({ "members": members, "summary": summary }))?;
            } else {
                print!("{}", report::build_team_report(year, &members, &summary));
            }
        }
        Commands::Members { manager, json } => {
            let store = store_for(&config).await?;
            let team = performance::manager_and_team(&store, manager).await;
            if json {
                print_json(&team)?;
            } else if team.is_empty() {
                println!("No employees found.");
            } else {
                for employee in team {
                    println!("{} {}", employee.id, employee.full_name());
                }
            }
        }
        Commands::Employee { id, year, json } => {
            let store = store_for(&config).await?;
            match performance::employee_detail(&store, id, year).await {
                Some(detail) if json => print_json(&detail)?,
                Some(detail) => print!("{}", report::build_detail_report(year, &detail)),
                None => println!("Employee not available."),
            }
        }
        Commands::History {
            id,
            sort_year,
            sort_average,
            desc,
            evolution,
            json,
        } => {
            let store = store_for(&config).await?;
            let Some(mut data) = historic::employee_historic_data(&store, id).await else {
                println!("Employee not available.");
                return Ok(());
            };

            let column = match (sort_year, sort_average) {
                (Some(year), _) => Some(SortColumn::Year(year)),
                (None, true) => Some(SortColumn::Average),
                (None, false) => None,
            };
            if let Some(column) = column {
                let direction = if desc {
                    SortDirection::Descending
                } else {
                    SortDirection::Ascending
                };
                historic::sort_metric_rows(&mut data.metrics, column, direction);
            }

            if json {
                print_json(&data)?;
            } else if evolution {
                print!("{}", report::build_evolution_report(&data));
            } else {
                print!("{}", report::build_historic_report(&data));
            }
        }
        Commands::Chat { history, message } => {
            let dataset = chat::ReferenceDataset::sample();
            let message = message.join(" ");
            let relay = chat::ChatRelay::new(config.chat.clone(), &dataset)?;

            let mut turns: Vec<chat::ChatTurn> = match history {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    serde_json::from_str(&raw)
                        .with_context(|| format!("invalid chat history in {}", path.display()))?
                }
                None => Vec::new(),
            };
            turns.push(chat::ChatTurn::user(message.as_str()));

            let reply = relay.complete(&turns).await;
            println!("{reply}");

            for employee in dataset.mentioned(&message) {
                println!();
                print!("{}", report::build_employee_card(employee));
            }
        }
    }

    Ok(())
}

async fn store_for(config: &Config) -> anyhow::Result<db::PgStore> {
    Ok(db::PgStore::new(connect(config).await?))
}
