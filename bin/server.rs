// 🌐 Unit Ledger - JSON API Server
// The documented expense endpoints behind an axum router. Every handler
// works on its own freshly loaded snapshot; the connection is shared behind
// a mutex and held only across synchronous queries.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use clap::Parser;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;
use tracing_subscriber::EnvFilter;

use unit_ledger::{aggregate, db, export, Period, PeriodSnapshot, Unit, WireRecords};

#[derive(Parser)]
#[command(name = "unit-ledger-server")]
#[command(author, version, about = "Expense ledger JSON API")]
struct Args {
    /// SQLite database path
    #[arg(long, default_value = "ledger.db")]
    db: PathBuf,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0:3000")]
    listen: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
}

/// API response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<serde_json::Value> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

fn bad_request(message: &str) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::err(message)),
    )
        .into_response()
}

fn store_error(err: anyhow::Error) -> axum::response::Response {
    error!("Store error: {err:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::err(err.to_string())),
    )
        .into_response()
}

// ============================================================================
// Query shapes
// ============================================================================

#[derive(Deserialize)]
struct PeriodQuery {
    year: Option<i32>,
    month: Option<u32>,
}

impl PeriodQuery {
    fn period(&self) -> Option<Period> {
        match (self.year, self.month) {
            (Some(year), Some(month)) if (1..=12).contains(&month) => {
                Some(Period::new(year, month))
            }
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct YearlyQuery {
    year: Option<i32>,
    building: Option<String>,
}

#[derive(Deserialize)]
struct SummaryQuery {
    year: Option<i32>,
    month: Option<u32>,
    unit: Option<i64>,
    prev_year: Option<i32>,
    prev_month: Option<u32>,
}

#[derive(Deserialize)]
struct CostsQuery {
    year: Option<i32>,
    month: Option<u32>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct SaveRequest {
    year: Option<i32>,
    month: Option<u32>,
    expenses: Option<WireRecords>,
}

// ============================================================================
// Response shapes
// ============================================================================

#[derive(Serialize)]
struct ExpensesResponse {
    units: Vec<Unit>,
    /// unit id → flat category/`_formula` map
    expenses: BTreeMap<String, BTreeMap<String, String>>,
}

fn expenses_response(snapshot: PeriodSnapshot) -> ExpensesResponse {
    let expenses = snapshot
        .records
        .iter()
        .map(|(unit_id, record)| (unit_id.to_string(), record.to_wire()))
        .collect();
    ExpensesResponse {
        units: snapshot.units,
        expenses,
    }
}

#[derive(Serialize)]
struct SummaryResponse {
    period: Period,
    comparison_period: Period,
    net_earnings: Vec<aggregate::UnitNetEarnings>,
    category_totals: Vec<aggregate::CategoryTotal>,
    top_category: aggregate::CategoryShare,
    top_units: Vec<aggregate::UnitExpense>,
    pl: aggregate::PlSummary,
    roi: Vec<aggregate::RoiRow>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/get_units
async fn get_units(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match db::get_units(&conn) {
        Ok(units) => (StatusCode::OK, Json(ApiResponse::ok(units))).into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /api/expenses?year&month
async fn get_expenses(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> impl IntoResponse {
    let Some(period) = query.period() else {
        return bad_request("Year and month parameters are required");
    };

    let conn = state.db.lock().unwrap();
    match db::load_snapshot(&conn, period) {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(ApiResponse::ok(expenses_response(snapshot))),
        )
            .into_response(),
        Err(e) => store_error(e),
    }
}

/// POST /api/expenses
async fn save_expenses(
    State(state): State<AppState>,
    Json(request): Json<SaveRequest>,
) -> impl IntoResponse {
    let (Some(year), Some(month), Some(expenses)) =
        (request.year, request.month, request.expenses)
    else {
        return bad_request("year, month and expenses are required");
    };
    if !(1..=12).contains(&month) {
        return bad_request("month must be between 1 and 12");
    }

    let conn = state.db.lock().unwrap();
    match db::save_expenses(&conn, Period::new(year, month), &expenses, "api") {
        Ok(outcome) => (StatusCode::OK, Json(ApiResponse::ok(outcome))).into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /api/expenses/yearly?year&building
async fn get_yearly_expenses(
    State(state): State<AppState>,
    Query(query): Query<YearlyQuery>,
) -> impl IntoResponse {
    let Some(year) = query.year else {
        return bad_request("Year parameter is required");
    };
    let building = query
        .building
        .as_deref()
        .filter(|b| !b.is_empty() && *b != "all");

    let conn = state.db.lock().unwrap();
    match db::get_yearly_expenses(&conn, year, building) {
        Ok((units, expenses)) => {
            let expenses: BTreeMap<String, _> = expenses
                .into_iter()
                .map(|(unit_id, months)| (unit_id.to_string(), months))
                .collect();
            (
                StatusCode::OK,
                Json(ApiResponse::ok(serde_json::json!({
                    "units": units,
                    "expenses": expenses,
                }))),
            )
                .into_response()
        }
        Err(e) => store_error(e),
    }
}

/// GET /api/expenses/years
async fn get_expense_years(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match db::expense_years(&conn) {
        Ok(years) => (
            StatusCode::OK,
            Json(ApiResponse::ok(serde_json::json!({ "years": years }))),
        )
            .into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /api/expenses/summary?year&month[&unit][&prev_year&prev_month]
///
/// One consolidated payload for every analysis view, from a single pair of
/// snapshots.
async fn get_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> impl IntoResponse {
    let (Some(year), Some(month)) = (query.year, query.month) else {
        return bad_request("Year and month parameters are required");
    };
    if !(1..=12).contains(&month) {
        return bad_request("month must be between 1 and 12");
    }
    let period = Period::new(year, month);

    let comparison = match (query.prev_year, query.prev_month) {
        (Some(py), Some(pm)) if (1..=12).contains(&pm) => Period::new(py, pm),
        _ => period.previous_month(),
    };

    let conn = state.db.lock().unwrap();
    let (current, previous) = match (
        db::load_snapshot(&conn, period),
        db::load_snapshot(&conn, comparison),
    ) {
        (Ok(current), Ok(previous)) => (current, previous),
        (Err(e), _) | (_, Err(e)) => return store_error(e),
    };
    drop(conn);

    let current = current.filtered(query.unit);
    let previous = previous.filtered(query.unit);

    let category_totals = aggregate::category_totals(&current);
    let top_category = aggregate::top_category(&category_totals);

    let summary = SummaryResponse {
        period,
        comparison_period: comparison,
        net_earnings: aggregate::unit_net_earnings(&current),
        top_units: aggregate::top_units_by_expense(&current, aggregate::TOP_UNITS_LIMIT),
        pl: aggregate::pl_summary(&current, &previous),
        roi: aggregate::roi_table(&current),
        category_totals,
        top_category,
    };

    (StatusCode::OK, Json(ApiResponse::ok(summary))).into_response()
}

/// GET /api/expenses/yoy?year&month
async fn get_year_over_year(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> impl IntoResponse {
    let Some(period) = query.period() else {
        return bad_request("Year and month parameters are required");
    };

    let conn = state.db.lock().unwrap();
    let (current, previous) = match (
        db::load_snapshot(&conn, period),
        db::load_snapshot(&conn, period.previous_year()),
    ) {
        (Ok(current), Ok(previous)) => (current, previous),
        (Err(e), _) | (_, Err(e)) => return store_error(e),
    };

    let comparison = aggregate::year_over_year(&current, &previous);
    (StatusCode::OK, Json(ApiResponse::ok(comparison))).into_response()
}

/// GET /api/expenses/export?year&month - CSV attachment
async fn export_csv(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> impl IntoResponse {
    let Some(period) = query.period() else {
        return bad_request("Year and month parameters are required");
    };

    let conn = state.db.lock().unwrap();
    let snapshot = match db::load_snapshot(&conn, period) {
        Ok(snapshot) => snapshot,
        Err(e) => return store_error(e),
    };
    drop(conn);

    match export::to_csv_string(&snapshot) {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"expenses-{period}.csv\""),
                ),
            ],
            body,
        )
            .into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /api/bookings/monthly_revenue?year&month
async fn get_monthly_revenue(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> impl IntoResponse {
    let Some(period) = query.period() else {
        return bad_request("Year and month parameters are required");
    };

    let conn = state.db.lock().unwrap();
    match db::monthly_revenue(&conn, period.year, period.month) {
        Ok(revenues) => {
            let revenues: BTreeMap<String, f64> = revenues
                .into_iter()
                .map(|(unit_id, revenue)| (unit_id.to_string(), revenue))
                .collect();
            (
                StatusCode::OK,
                Json(ApiResponse::ok(serde_json::json!({ "revenues": revenues }))),
            )
                .into_response()
        }
        Err(e) => store_error(e),
    }
}

/// GET /api/issues/monthly_costs?year&month&type
async fn get_monthly_costs(
    State(state): State<AppState>,
    Query(query): Query<CostsQuery>,
) -> impl IntoResponse {
    let (Some(year), Some(month)) = (query.year, query.month) else {
        return bad_request("Year and month parameters are required");
    };
    if !(1..=12).contains(&month) {
        return bad_request("month must be between 1 and 12");
    }

    let conn = state.db.lock().unwrap();
    match db::monthly_issue_costs(&conn, year, month, query.kind.as_deref()) {
        Ok(costs) => {
            let costs: BTreeMap<String, f64> = costs
                .into_iter()
                .map(|(unit_id, cost)| (unit_id.to_string(), cost))
                .collect();
            (
                StatusCode::OK,
                Json(ApiResponse::ok(serde_json::json!({ "costs": costs }))),
            )
                .into_response()
        }
        Err(e) => store_error(e),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let conn = Connection::open(&args.db).expect("Failed to open database");
    db::setup_database(&conn).expect("Failed to set up schema");
    tracing::info!(db = ?args.db, "Database opened");

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/get_units", get(get_units))
        .route("/expenses", get(get_expenses).post(save_expenses))
        .route("/expenses/yearly", get(get_yearly_expenses))
        .route("/expenses/years", get(get_expense_years))
        .route("/expenses/summary", get(get_summary))
        .route("/expenses/yoy", get(get_year_over_year))
        .route("/expenses/export", get(export_csv))
        .route("/bookings/monthly_revenue", get(get_monthly_revenue))
        .route("/issues/monthly_costs", get(get_monthly_costs))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .expect("Failed to bind to address");

    tracing::info!(listen = %args.listen, "Server running");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
