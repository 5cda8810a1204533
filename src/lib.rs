// 🏠 Unit Ledger - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod aggregate;
pub mod db;
pub mod export;
pub mod formula;
pub mod model;
pub mod roles;

// Re-export commonly used types
pub use db::{
    expense_years, get_expenses, get_units, get_yearly_expenses, insert_booking, insert_event,
    insert_issue, insert_unit, load_snapshot, monthly_issue_costs, monthly_revenue, recent_events,
    save_expenses, set_cell, setup_database, Event, RejectedCell, SaveOutcome, WireRecords,
};
pub use formula::{evaluate_entry, evaluate_expression, format_amount, Evaluation, FormulaError};
pub use model::{Category, CellValue, ExpenseRecord, Period, PeriodSnapshot, Unit};
pub use roles::{Area, Permission, RolePermissions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
