// 🗄️ Record Store - SQLite + WAL
// Units, per-cell expense rows, bookings, issues, and an append-only audit
// trail of save operations. Every committed cell is re-evaluated here;
// client-supplied results are never trusted.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::formula;
use crate::model::{Category, CellValue, ExpenseRecord, Period, PeriodSnapshot, Unit};

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS units (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            unit_number TEXT NOT NULL,
            building TEXT
        )",
        [],
    )?;

    // One row per committed cell. Rejected edits simply never reach this
    // table, so the prior value stands.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS expense_cells (
            unit_id INTEGER NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            category TEXT NOT NULL,
            value TEXT NOT NULL,
            formula TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (unit_id, year, month, category)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bookings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            unit_id INTEGER NOT NULL,
            check_in TEXT NOT NULL,
            check_out TEXT NOT NULL,
            price REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS issues (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            unit_id INTEGER NOT NULL,
            date_added TEXT NOT NULL,
            cost REAL,
            kind TEXT NOT NULL
        )",
        [],
    )?;

    // Audit trail of save operations
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cells_period ON expense_cells(year, month)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bookings_unit ON bookings(unit_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_issues_date ON issues(date_added)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// UNITS
// ============================================================================

pub fn get_units(conn: &Connection) -> Result<Vec<Unit>> {
    let mut stmt = conn
        .prepare("SELECT id, unit_number, building FROM units ORDER BY unit_number")
        .context("Failed to prepare units query")?;

    let units = stmt
        .query_map([], |row| {
            Ok(Unit {
                id: row.get(0)?,
                unit_number: row.get(1)?,
                building: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to read units")?;

    Ok(units)
}

pub fn insert_unit(conn: &Connection, unit_number: &str, building: Option<&str>) -> Result<i64> {
    conn.execute(
        "INSERT INTO units (unit_number, building) VALUES (?1, ?2)",
        params![unit_number, building],
    )
    .context("Failed to insert unit")?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_booking(
    conn: &Connection,
    unit_id: i64,
    check_in: NaiveDate,
    check_out: NaiveDate,
    price: f64,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO bookings (unit_id, check_in, check_out, price) VALUES (?1, ?2, ?3, ?4)",
        params![unit_id, check_in.to_string(), check_out.to_string(), price],
    )
    .context("Failed to insert booking")?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_issue(
    conn: &Connection,
    unit_id: i64,
    date_added: NaiveDate,
    cost: Option<f64>,
    kind: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO issues (unit_id, date_added, cost, kind) VALUES (?1, ?2, ?3, ?4)",
        params![unit_id, date_added.to_string(), cost, kind],
    )
    .context("Failed to insert issue")?;
    Ok(conn.last_insert_rowid())
}

// ============================================================================
// EXPENSES: FETCH
// ============================================================================

/// All committed records for one period. An absent period is an empty map,
/// never an error.
pub fn get_expenses(conn: &Connection, period: Period) -> Result<HashMap<i64, ExpenseRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT unit_id, category, value, formula
             FROM expense_cells
             WHERE year = ?1 AND month = ?2",
        )
        .context("Failed to prepare expenses query")?;

    let mut records: HashMap<i64, ExpenseRecord> = HashMap::new();

    let rows = stmt.query_map(params![period.year, period.month], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    for row in rows {
        let (unit_id, category_key, value, formula_text) =
            row.context("Failed to read expense cell")?;

        let Some(category) = Category::from_key(&category_key) else {
            warn!(category = %category_key, "Skipping cell with unknown category");
            continue;
        };

        let cell = match formula_text {
            Some(text) => CellValue::Formula {
                text,
                result: value,
            },
            None => CellValue::Number(value),
        };

        records.entry(unit_id).or_default().set(category, cell);
    }

    debug!(%period, records = records.len(), "Loaded expense records");
    Ok(records)
}

/// Units plus the period's records: the aggregator's working set.
pub fn load_snapshot(conn: &Connection, period: Period) -> Result<PeriodSnapshot> {
    Ok(PeriodSnapshot {
        units: get_units(conn)?,
        records: get_expenses(conn, period)?,
    })
}

/// Distinct years with any expense data, newest first; the current year when
/// the sheet is empty.
pub fn expense_years(conn: &Connection) -> Result<Vec<i32>> {
    let mut stmt = conn.prepare("SELECT DISTINCT year FROM expense_cells ORDER BY year DESC")?;

    let years = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i32>, _>>()
        .context("Failed to read expense years")?;

    if years.is_empty() {
        Ok(vec![Utc::now().year()])
    } else {
        Ok(years)
    }
}

/// Resolved numeric values for every month of one year, optionally limited
/// to one building. Months 1-12 are always present; absent months carry a
/// zero for every category.
pub fn get_yearly_expenses(
    conn: &Connection,
    year: i32,
    building: Option<&str>,
) -> Result<(Vec<Unit>, HashMap<i64, BTreeMap<u32, HashMap<String, f64>>>)> {
    let units: Vec<Unit> = get_units(conn)?
        .into_iter()
        .filter(|unit| match building {
            None => true,
            Some(b) => unit.building.as_deref() == Some(b),
        })
        .collect();

    let mut yearly: HashMap<i64, BTreeMap<u32, HashMap<String, f64>>> = HashMap::new();
    for unit in &units {
        let mut months = BTreeMap::new();
        for month in 1..=12u32 {
            let zeroed: HashMap<String, f64> = Category::ALL
                .iter()
                .map(|c| (c.key().to_string(), 0.0))
                .collect();
            months.insert(month, zeroed);
        }
        yearly.insert(unit.id, months);
    }

    let mut stmt = conn.prepare(
        "SELECT unit_id, month, category, value
         FROM expense_cells
         WHERE year = ?1",
    )?;

    let rows = stmt.query_map(params![year], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, u32>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    for row in rows {
        let (unit_id, month, category_key, value) =
            row.context("Failed to read yearly expense cell")?;

        let Some(months) = yearly.get_mut(&unit_id) else {
            continue; // unit filtered out or removed
        };
        if let Some(cells) = months.get_mut(&month) {
            if Category::from_key(&category_key).is_some() {
                cells.insert(category_key, formula::parse_amount(&value));
            }
        }
    }

    Ok((units, yearly))
}

// ============================================================================
// EXPENSES: SAVE
// ============================================================================

/// Wire shape of a save request: unit id → flat category/`_formula` map.
pub type WireRecords = HashMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectedCell {
    pub unit_id: String,
    pub category: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SaveOutcome {
    pub saved: usize,
    pub rejected: Vec<RejectedCell>,
}

/// Persist one period's edits. Every cell is re-run through the evaluator;
/// cells that fail are skipped (the stored value stands) and reported back.
/// One audit event is appended per save.
pub fn save_expenses(
    conn: &Connection,
    period: Period,
    records: &WireRecords,
    actor: &str,
) -> Result<SaveOutcome> {
    let mut outcome = SaveOutcome::default();
    let now = Utc::now().to_rfc3339();

    for (unit_key, cells) in records {
        let Ok(unit_id) = unit_key.parse::<i64>() else {
            outcome.rejected.push(RejectedCell {
                unit_id: unit_key.clone(),
                category: "*".to_string(),
                reason: format!("'{unit_key}' is not a unit id"),
            });
            continue;
        };

        for category in Category::ALL {
            let formula_key = format!("{}_formula", category.key());
            // A formula entry wins over the flat value: the raw text is the
            // source of truth and the result is recomputed here.
            let raw = match cells.get(&formula_key) {
                Some(text) => text,
                None => match cells.get(category.key()) {
                    Some(value) => value,
                    None => continue,
                },
            };

            let cell = match CellValue::from_entry(raw) {
                Ok(cell) => cell,
                Err(err) => {
                    outcome.rejected.push(RejectedCell {
                        unit_id: unit_key.clone(),
                        category: category.key().to_string(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            match &cell {
                CellValue::Empty => {
                    conn.execute(
                        "DELETE FROM expense_cells
                         WHERE unit_id = ?1 AND year = ?2 AND month = ?3 AND category = ?4",
                        params![unit_id, period.year, period.month, category.key()],
                    )
                    .context("Failed to clear expense cell")?;
                }
                _ => {
                    conn.execute(
                        "INSERT INTO expense_cells
                             (unit_id, year, month, category, value, formula, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                         ON CONFLICT(unit_id, year, month, category) DO UPDATE SET
                             value = excluded.value,
                             formula = excluded.formula,
                             updated_at = excluded.updated_at",
                        params![
                            unit_id,
                            period.year,
                            period.month,
                            category.key(),
                            cell.value_str(),
                            cell.formula_text(),
                            now
                        ],
                    )
                    .context("Failed to upsert expense cell")?;
                }
            }
            outcome.saved += 1;
        }
    }

    let event = Event::new(
        "expenses_saved",
        serde_json::json!({
            "period": period.to_string(),
            "saved": outcome.saved,
            "rejected": outcome.rejected.len(),
        }),
        actor,
    );
    insert_event(conn, &event)?;

    info!(
        %period,
        saved = outcome.saved,
        rejected = outcome.rejected.len(),
        "Saved expense records"
    );
    Ok(outcome)
}

// ============================================================================
// BOOKINGS & ISSUES
// ============================================================================

fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .with_context(|| format!("Invalid period {year}-{month}"))?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .with_context(|| format!("Invalid period {year}-{month}"))?;
    Ok((start, end))
}

/// Booking revenue attributed to one month, prorated by nights: a booking
/// spanning month boundaries contributes `daily rate × nights inside the
/// month`.
pub fn monthly_revenue(conn: &Connection, year: i32, month: u32) -> Result<HashMap<i64, f64>> {
    let (start, end) = month_bounds(year, month)?;

    let mut stmt = conn.prepare(
        "SELECT unit_id, check_in, check_out, price
         FROM bookings
         WHERE check_in < ?2 AND check_out > ?1",
    )?;

    let rows = stmt.query_map(params![start.to_string(), end.to_string()], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, f64>(3)?,
        ))
    })?;

    let mut revenues: HashMap<i64, f64> = HashMap::new();
    for row in rows {
        let (unit_id, check_in, check_out, price) = row.context("Failed to read booking")?;

        let (Ok(check_in), Ok(check_out)) =
            (check_in.parse::<NaiveDate>(), check_out.parse::<NaiveDate>())
        else {
            warn!(unit_id, "Skipping booking with unparseable dates");
            continue;
        };

        let total_nights = (check_out - check_in).num_days();
        if total_nights <= 0 {
            continue;
        }

        let night_start = check_in.max(start);
        let night_end = check_out.min(end);
        let nights_in_month = (night_end - night_start).num_days();
        if nights_in_month <= 0 {
            continue;
        }

        let daily_rate = price / total_nights as f64;
        *revenues.entry(unit_id).or_insert(0.0) += daily_rate * nights_in_month as f64;
    }

    Ok(revenues)
}

/// Issue costs per unit for one month, optionally limited to one kind
/// (`repair` or `replace`). Issues without a cost are ignored.
pub fn monthly_issue_costs(
    conn: &Connection,
    year: i32,
    month: u32,
    kind: Option<&str>,
) -> Result<HashMap<i64, f64>> {
    let (start, end) = month_bounds(year, month)?;

    let mut costs: HashMap<i64, f64> = HashMap::new();

    let rows: Vec<(i64, f64)> = match kind {
        Some(kind) => {
            let mut stmt = conn.prepare(
                "SELECT unit_id, cost FROM issues
                 WHERE date_added >= ?1 AND date_added < ?2
                   AND cost IS NOT NULL AND kind = ?3",
            )?;
            let mapped = stmt.query_map(
                params![start.to_string(), end.to_string(), kind],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            mapped
                .collect::<std::result::Result<_, _>>()
                .context("Failed to read issue costs")?
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT unit_id, cost FROM issues
                 WHERE date_added >= ?1 AND date_added < ?2
                   AND cost IS NOT NULL",
            )?;
            let mapped = stmt.query_map(params![start.to_string(), end.to_string()], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            mapped
                .collect::<std::result::Result<_, _>>()
                .context("Failed to read issue costs")?
        }
    };

    for (unit_id, cost) in rows {
        *costs.entry(unit_id).or_insert(0.0) += cost;
    }

    Ok(costs)
}

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// One append-only audit record of a save operation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(event_type: &str, data: serde_json::Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, data, actor)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.data.to_string(),
            event.actor
        ],
    )
    .context("Failed to insert audit event")?;
    Ok(())
}

pub fn recent_events(conn: &Connection, limit: usize) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, data, actor
         FROM events ORDER BY id DESC LIMIT ?1",
    )?;

    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to read audit events")?;

    rows.into_iter()
        .map(|(event_id, timestamp, event_type, data, actor)| {
            Ok(Event {
                event_id,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .context("Bad event timestamp")?
                    .with_timezone(&Utc),
                event_type,
                data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
                actor,
            })
        })
        .collect()
}

/// Commit a single cell from the CLI: evaluate, store, report. Invalid input
/// errors out and leaves the stored value untouched.
pub fn set_cell(
    conn: &Connection,
    unit_id: i64,
    period: Period,
    category: Category,
    raw: &str,
    actor: &str,
) -> Result<CellValue> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM units WHERE id = ?1",
            params![unit_id],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to look up unit")?;
    if exists.is_none() {
        anyhow::bail!("No unit with id {unit_id}");
    }

    let mut cells = BTreeMap::new();
    match CellValue::from_entry(raw)? {
        CellValue::Formula { text, .. } => {
            cells.insert(format!("{}_formula", category.key()), text);
        }
        cell => {
            cells.insert(category.key().to_string(), cell.value_str().to_string());
        }
    }

    let mut records = WireRecords::new();
    records.insert(unit_id.to_string(), cells);
    let outcome = save_expenses(conn, period, &records, actor)?;
    if let Some(rejected) = outcome.rejected.first() {
        anyhow::bail!("Cell rejected: {}", rejected.reason);
    }

    let record = get_expenses(conn, period)?
        .remove(&unit_id)
        .unwrap_or_default();
    Ok(record.get(category).cloned().unwrap_or(CellValue::Empty))
}
