//! # tabulookup-cli
//!
//! Command-line administration and lookup for tabulookup datasets.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use tabulookup_core::{
    AnalyticsSummary, Dataset, DatasetId, Filters, LookupService, QueryLog, QueryResponse,
    Settings, SheetConfigUpdate, SheetConfiguration,
};
use tracing_subscriber::EnvFilter;

/// tabulookup - exact-match lookups over spreadsheet datasets
#[derive(Parser)]
#[command(name = "tabulookup")]
#[command(author, version, about = "Exact-match lookups over spreadsheet datasets", long_about = None)]
struct Cli {
    /// YAML settings file
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Directory holding the dataset registry and query log
    #[arg(short = 's', long = "state-dir", global = true)]
    state_dir: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short = 'f', long = "format", default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered datasets, newest first
    Datasets,
    /// Register a spreadsheet or CSV file as a dataset
    Register {
        name: String,
        path: PathBuf,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Point a dataset at a new file, keeping its configuration
    Replace { id: DatasetId, path: PathBuf },
    /// Activate or deactivate a dataset
    Toggle { id: DatasetId },
    /// Delete a dataset and its query logs
    Delete {
        id: DatasetId,
        /// Also delete the dataset's file
        #[arg(long)]
        remove_file: bool,
    },
    /// List the enabled sheets of a dataset
    Sheets { id: DatasetId },
    /// Show filter columns with their values
    Columns { id: DatasetId, sheet: String },
    /// Show the configuration of a sheet
    Config { id: DatasetId, sheet: String },
    /// Replace the configuration of a sheet
    Configure {
        id: DatasetId,
        sheet: String,
        /// Disable the sheet
        #[arg(long)]
        disable: bool,
        /// Filter column (repeatable)
        #[arg(long = "filter", value_name = "COLUMN")]
        filters: Vec<String>,
        /// Result column (repeatable)
        #[arg(long = "result", value_name = "COLUMN")]
        results: Vec<String>,
        /// Reject the change unless the dataset is at this version
        #[arg(long, value_name = "VERSION")]
        expect_version: Option<u64>,
    },
    /// Look up a row
    Query {
        id: DatasetId,
        sheet: String,
        /// Filter (COLUMN=VALUE, repeatable)
        #[arg(short = 'w', long = "where", value_name = "COLUMN=VALUE")]
        filters: Vec<String>,
        /// Name recorded with the query
        #[arg(long)]
        user: Option<String>,
    },
    /// Query statistics
    Analytics,
    /// Recent queries, newest first
    Logs {
        #[arg(short = 'n', long, default_value_t = 100)]
        limit: usize,
    },
}

/// Output format for results.
#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output (default)
    #[default]
    Table,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    let settings = load_settings(&cli)?;
    let service = LookupService::from_settings(settings)
        .await
        .context("Failed to open tabulookup state")?;
    run(&service, cli.command, cli.format).await
}

/// Settings from the config file, with the state directory defaulting to
/// the user's local data directory.
fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.state_dir {
        settings.state_dir = Some(dir.clone());
    }
    if settings.state_dir.is_none() {
        settings.state_dir = default_state_dir();
    }
    Ok(settings)
}

fn default_state_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|mut p| {
        p.push("tabulookup");
        p
    })
}

async fn run(service: &LookupService, command: Command, format: OutputFormat) -> Result<()> {
    match command {
        Command::Datasets => {
            let datasets = service.datasets().await;
            emit(format, &datasets, || {
                if datasets.is_empty() {
                    println!("(no datasets)");
                }
                for dataset in &datasets {
                    println!("{}", format_dataset(dataset));
                }
            })
        }
        Command::Register {
            name,
            path,
            description,
        } => {
            let dataset = service.register(&name, &description, path).await?;
            emit(format, &dataset, || {
                println!("{} {}", "Registered".green().bold(), format_dataset(&dataset));
            })
        }
        Command::Replace { id, path } => {
            let dataset = service.replace_source(id, path).await?;
            emit(format, &dataset, || {
                println!("{} {}", "Replaced".green().bold(), format_dataset(&dataset));
            })
        }
        Command::Toggle { id } => {
            let dataset = service.toggle_active(id).await?;
            emit(format, &dataset, || println!("{}", format_dataset(&dataset)))
        }
        Command::Delete { id, remove_file } => {
            let dataset = service.delete(id, remove_file).await?;
            emit(format, &dataset, || {
                println!("{} {}", "Deleted".red().bold(), dataset.name);
            })
        }
        Command::Sheets { id } => {
            let list = service.list_enabled_sheets(id).await?;
            emit(format, &list, || {
                println!("{}", list.dataset_name.cyan().bold());
                for sheet in &list.sheets {
                    println!("  {sheet}");
                }
            })
        }
        Command::Columns { id, sheet } => {
            let columns = service.filterable_columns(id, &sheet).await?;
            emit(format, &columns, || {
                for (column, values) in &columns.columns {
                    println!("{}: {}", column.yellow(), values.join(", "));
                }
                println!("{} {}", "results:".dimmed(), columns.result_columns.join(", "));
            })
        }
        Command::Config { id, sheet } => {
            let config = service.sheet_config(id, &sheet).await?;
            emit(format, &config, || print!("{}", format_config(&config)))
        }
        Command::Configure {
            id,
            sheet,
            disable,
            filters,
            results,
            expect_version,
        } => {
            let mut update = SheetConfigUpdate::new(!disable)
                .with_filters(filters)
                .with_results(results);
            update.expected_version = expect_version;
            let response = service.set_sheet_config(id, &sheet, update).await?;
            emit(format, &response, || {
                println!("{} {}", "Enabled sheets:".green(), response.enabled_sheets.join(", "));
            })
        }
        Command::Query {
            id,
            sheet,
            filters,
            user,
        } => {
            let filters = parse_filter_args(&filters)?;
            let response = service.query(id, &sheet, &filters, user.as_deref()).await?;
            emit(format, &response, || print!("{}", format_response(&response)))
        }
        Command::Analytics => {
            let summary = service.analytics().await?;
            emit(format, &summary, || print!("{}", format_summary(&summary)))
        }
        Command::Logs { limit } => {
            let logs = service.recent_queries(limit).await?;
            emit(format, &logs, || {
                for log in &logs {
                    println!("{}", format_log(log));
                }
            })
        }
    }
}

/// Print `value` as JSON or run the human-readable printer.
fn emit<T: Serialize>(format: OutputFormat, value: &T, table: impl FnOnce()) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Table => table(),
    }
    Ok(())
}

/// Parse `COLUMN=VALUE` arguments, keeping their order.
fn parse_filter_args(args: &[String]) -> Result<Filters> {
    let mut filters = Filters::new();
    for arg in args {
        let (column, value) = arg.split_once('=').with_context(|| {
            format!("Invalid filter format: '{arg}'. Expected COLUMN=VALUE format")
        })?;
        filters.insert(column.to_string(), value.to_string());
    }
    Ok(filters)
}

fn format_dataset(dataset: &Dataset) -> String {
    let status = if dataset.active {
        "active".green()
    } else {
        "inactive".red()
    };
    format!(
        "{} {} [{}] {} sheet(s), v{}",
        dataset.id.to_string().dimmed(),
        dataset.name.bold(),
        status,
        dataset.sheet_names.len(),
        dataset.version
    )
}

fn format_config(config: &SheetConfiguration) -> String {
    format!(
        "enabled: {}\nfilters: {}\nresults: {}\n",
        config.enabled,
        config.filter_columns.join(", "),
        config.result_columns.join(", ")
    )
}

fn format_response(response: &QueryResponse) -> String {
    let mut out = String::new();
    if response.found {
        out.push_str(&format!("{}\n", response.message.green()));
    } else {
        out.push_str(&format!("{}\n", response.message.yellow()));
    }
    if let Some(results) = &response.results {
        for (column, value) in results {
            out.push_str(&format!("  {column}: {value}\n"));
        }
    }
    out
}

fn format_summary(summary: &AnalyticsSummary) -> String {
    let mut out = format!(
        "queries: {} ({} successful, {:.1}%)\n",
        summary.total_queries, summary.successful_queries, summary.success_rate
    );
    if !summary.popular_datasets.is_empty() {
        out.push_str("popular:\n");
        for usage in &summary.popular_datasets {
            out.push_str(&format!("  {} ({})\n", usage.name, usage.query_count));
        }
    }
    if !summary.recent_queries.is_empty() {
        out.push_str("recent:\n");
        for log in &summary.recent_queries {
            out.push_str(&format!("  {}\n", format_log(log)));
        }
    }
    out
}

fn format_log(log: &QueryLog) -> String {
    let filters = log
        .filters_applied
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ");
    let outcome = if log.result_found {
        "found".green()
    } else {
        "not found".yellow()
    };
    format!(
        "{} {} {} [{}] {}",
        log.query_time.format("%Y-%m-%d %H:%M:%S"),
        log.sheet_name,
        outcome,
        filters,
        log.user.as_deref().unwrap_or("-")
    )
}
