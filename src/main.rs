// 🏠 Unit Ledger - CLI
// Schema init, unit registration, cell commits, terminal reports, CSV
// export and the save audit log.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::fs::File;
use std::io;
use std::path::PathBuf;

use unit_ledger::{aggregate, db, export, formula, model::Category, Period};

#[derive(Parser)]
#[command(name = "unit-ledger")]
#[command(author, version, about = "Per-unit expense ledger and reporting")]
struct Cli {
    /// SQLite database path
    #[arg(long, default_value = "ledger.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    Init,

    /// Register a unit
    AddUnit {
        unit_number: String,

        #[arg(short, long)]
        building: Option<String>,
    },

    /// Commit one cell (plain number or '='-formula)
    Set {
        /// Unit id
        unit: i64,

        /// Category key (sales, rental, electricity, ...)
        category: String,

        /// Raw cell text, e.g. "1,200" or "=50+25"
        value: String,

        #[arg(short, long)]
        year: i32,

        #[arg(short, long)]
        month: u32,
    },

    /// Terminal summary for one period
    Report {
        #[arg(short, long)]
        year: i32,

        #[arg(short, long)]
        month: u32,
    },

    /// Export one period as CSV
    Export {
        #[arg(short, long)]
        year: i32,

        #[arg(short, long)]
        month: u32,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Recent save audit events
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let conn = Connection::open(&cli.db)
        .with_context(|| format!("Failed to open database {:?}", cli.db))?;
    db::setup_database(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("✓ Database ready: {:?}", cli.db);
        }

        Commands::AddUnit {
            unit_number,
            building,
        } => {
            let id = db::insert_unit(&conn, &unit_number, building.as_deref())?;
            println!("✓ Unit {unit_number} registered (id {id})");
        }

        Commands::Set {
            unit,
            category,
            value,
            year,
            month,
        } => {
            let category = Category::from_key(&category)
                .with_context(|| format!("Unknown category '{category}'"))?;
            let cell = db::set_cell(&conn, unit, Period::new(year, month), category, &value, "cli")?;
            match cell.formula_text() {
                Some(text) => println!(
                    "✓ {} = {} ({})",
                    category.label(),
                    cell.value_str(),
                    text
                ),
                None => println!("✓ {} = {}", category.label(), cell.value_str()),
            }
        }

        Commands::Report { year, month } => {
            run_report(&conn, Period::new(year, month))?;
        }

        Commands::Export {
            year,
            month,
            output,
        } => {
            let snapshot = db::load_snapshot(&conn, Period::new(year, month))?;
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {path:?}"))?;
                    export::write_csv(&snapshot, file)?;
                    println!("✓ Exported {} units to {:?}", snapshot.units.len(), path);
                }
                None => export::write_csv(&snapshot, io::stdout().lock())?,
            }
        }

        Commands::History { limit } => {
            let events = db::recent_events(&conn, limit)?;
            if events.is_empty() {
                println!("No save events recorded.");
            }
            for event in events {
                println!(
                    "{}  {}  by {}  {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.event_type,
                    event.actor,
                    event.data
                );
            }
        }
    }

    Ok(())
}

fn run_report(conn: &Connection, period: Period) -> Result<()> {
    let snapshot = db::load_snapshot(conn, period)?;
    let previous = db::load_snapshot(conn, period.previous_month())?;

    println!("📊 Expense report {period}");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if snapshot.records.is_empty() {
        println!("No data for {period}.");
        return Ok(());
    }

    println!("\nNet earnings per unit:");
    for row in aggregate::unit_net_earnings(&snapshot) {
        println!(
            "   {:<12} {:>12}",
            row.unit_number,
            formula::format_amount(row.net)
        );
    }

    let totals = aggregate::category_totals(&snapshot);
    let top = aggregate::top_category(&totals);
    println!("\nExpense breakdown (top: {} {}%):", top.name, top.percent);
    for total in &totals {
        println!(
            "   {:<12} {:>12}  {:>3}%",
            total.name,
            formula::format_amount(total.amount),
            total.percent
        );
    }

    println!("\nTop units by expense:");
    for row in aggregate::top_units_by_expense(&snapshot, aggregate::TOP_UNITS_LIMIT) {
        println!(
            "   {:<12} {:>12}",
            row.unit_number,
            formula::format_amount(row.total)
        );
    }

    let pl = aggregate::pl_summary(&snapshot, &previous);
    println!("\nP&L vs {}:", period.previous_month());
    println!(
        "   Revenue   {:>12}  ({:+.1}%)",
        formula::format_amount(pl.current.revenue),
        pl.revenue_change
    );
    println!(
        "   Expenses  {:>12}  ({:+.1}%)",
        formula::format_amount(pl.current.expenses),
        pl.expenses_change
    );
    println!(
        "   Net       {:>12}  ({:+.1}%)",
        formula::format_amount(pl.current.net_income),
        pl.net_income_change
    );

    println!("\nROI:");
    for row in aggregate::roi_table(&snapshot) {
        println!(
            "   {:<12} {:>12}  {:>7.1}%  {}",
            row.name,
            formula::format_amount(row.net_profit),
            row.roi_percent,
            row.rating
        );
    }

    Ok(())
}
