// 🏠 Expense Model - Units, Categories, Cells, Records
// The per-unit monthly expense grid: twelve fixed categories, cells that
// hold plain values or formulas with a cached result, and the flat wire
// mapping the admin pages exchange.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::formula::{self, Evaluation, FormulaResult};

// ============================================================================
// CATEGORIES
// ============================================================================

/// The fixed expense-sheet categories, in wire and CSV column order.
/// `Sales` is revenue; the remaining eleven are costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Sales,
    Rental,
    Electricity,
    Water,
    Sewage,
    Internet,
    Cleaner,
    Laundry,
    Supplies,
    Repair,
    Replace,
    Other,
}

impl Category {
    pub const ALL: [Category; 12] = [
        Category::Sales,
        Category::Rental,
        Category::Electricity,
        Category::Water,
        Category::Sewage,
        Category::Internet,
        Category::Cleaner,
        Category::Laundry,
        Category::Supplies,
        Category::Repair,
        Category::Replace,
        Category::Other,
    ];

    /// The eleven cost categories (everything except `Sales`).
    pub const EXPENSES: [Category; 11] = [
        Category::Rental,
        Category::Electricity,
        Category::Water,
        Category::Sewage,
        Category::Internet,
        Category::Cleaner,
        Category::Laundry,
        Category::Supplies,
        Category::Repair,
        Category::Replace,
        Category::Other,
    ];

    /// Lowercase wire key, as used in JSON payloads and the database.
    pub fn key(&self) -> &'static str {
        match self {
            Category::Sales => "sales",
            Category::Rental => "rental",
            Category::Electricity => "electricity",
            Category::Water => "water",
            Category::Sewage => "sewage",
            Category::Internet => "internet",
            Category::Cleaner => "cleaner",
            Category::Laundry => "laundry",
            Category::Supplies => "supplies",
            Category::Repair => "repair",
            Category::Replace => "replace",
            Category::Other => "other",
        }
    }

    /// Display label, as used in reports and CSV headers.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Sales => "Sales",
            Category::Rental => "Rental",
            Category::Electricity => "Electricity",
            Category::Water => "Water",
            Category::Sewage => "Sewage",
            Category::Internet => "Internet",
            Category::Cleaner => "Cleaner",
            Category::Laundry => "Laundry",
            Category::Supplies => "Supplies",
            Category::Repair => "Repair",
            Category::Replace => "Replace",
            Category::Other => "Other",
        }
    }

    pub fn from_key(key: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.key() == key)
    }
}

// ============================================================================
// CELLS
// ============================================================================

/// One editable cell of the expense grid.
///
/// A formula cell always carries both the raw text and its last-evaluated
/// two-decimal result; only the cached result participates in aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    /// Plain entry, kept exactly as typed.
    Number(String),
    /// '='-formula with its cached result string.
    Formula { text: String, result: String },
}

impl CellValue {
    /// Commit raw user input into a cell, running it through the evaluator.
    /// Invalid expressions are rejected; the caller keeps the prior cell.
    pub fn from_entry(raw: &str) -> FormulaResult<CellValue> {
        match formula::evaluate_entry(raw)? {
            Evaluation::Empty => Ok(CellValue::Empty),
            Evaluation::Plain(_) => Ok(CellValue::Number(raw.trim().to_string())),
            Evaluation::Computed(value) => Ok(CellValue::Number(formula::format_amount(value))),
            Evaluation::Formula { text, value } => Ok(CellValue::Formula {
                text,
                result: formula::format_amount(value),
            }),
        }
    }

    /// Numeric resolution: empty is zero, formulas resolve through the
    /// cached result, unparseable text counts as zero.
    pub fn amount(&self) -> f64 {
        match self {
            CellValue::Empty => 0.0,
            CellValue::Number(s) => formula::parse_amount(s),
            CellValue::Formula { result, .. } => formula::parse_amount(result),
        }
    }

    /// The string shown in the grid and exported to CSV.
    pub fn value_str(&self) -> &str {
        match self {
            CellValue::Empty => "",
            CellValue::Number(s) => s,
            CellValue::Formula { result, .. } => result,
        }
    }

    pub fn formula_text(&self) -> Option<&str> {
        match self {
            CellValue::Formula { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// All committed cells for one unit in one period. Missing categories read
/// as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseRecord {
    cells: BTreeMap<Category, CellValue>,
}

impl ExpenseRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one cell. Empty cells are not stored; setting a cell to
    /// `CellValue::Empty` clears it.
    pub fn set(&mut self, category: Category, cell: CellValue) {
        if cell.is_empty() {
            self.cells.remove(&category);
        } else {
            self.cells.insert(category, cell);
        }
    }

    pub fn get(&self, category: Category) -> Option<&CellValue> {
        self.cells.get(&category)
    }

    pub fn cells(&self) -> impl Iterator<Item = (Category, &CellValue)> {
        self.cells.iter().map(|(c, v)| (*c, v))
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn amount(&self, category: Category) -> f64 {
        self.cells
            .get(&category)
            .map(CellValue::amount)
            .unwrap_or(0.0)
    }

    /// Sum of the eleven cost categories.
    pub fn expense_total(&self) -> f64 {
        Category::EXPENSES.iter().map(|c| self.amount(*c)).sum()
    }

    /// Sales minus all costs. Full precision; two decimals are a display
    /// concern.
    pub fn net_earnings(&self) -> f64 {
        self.amount(Category::Sales) - self.expense_total()
    }

    /// Flat wire object: `category` → value string, plus `category_formula`
    /// → raw text for formula cells. Formula text survives verbatim.
    pub fn to_wire(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (category, cell) in &self.cells {
            match cell {
                CellValue::Empty => {}
                CellValue::Number(s) => {
                    map.insert(category.key().to_string(), s.clone());
                }
                CellValue::Formula { text, result } => {
                    map.insert(category.key().to_string(), result.clone());
                    map.insert(format!("{}_formula", category.key()), text.clone());
                }
            }
        }
        map
    }
}

// ============================================================================
// PERIODS & UNITS
// ============================================================================

/// One calendar month of the ledger. Distinct periods are independent
/// collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn current() -> Self {
        let now = Utc::now();
        Self::new(now.year(), now.month())
    }

    /// The previous calendar month, wrapping January into December of the
    /// prior year.
    pub fn previous_month(&self) -> Period {
        if self.month <= 1 {
            Period::new(self.year - 1, 12)
        } else {
            Period::new(self.year, self.month - 1)
        }
    }

    /// The same month one year earlier.
    pub fn previous_year(&self) -> Period {
        Period::new(self.year - 1, self.month)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// A rentable unit. Owned by the surrounding application; referenced here
/// by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: i64,
    pub unit_number: String,
    #[serde(default)]
    pub building: Option<String>,
}

/// One period's units and records, the aggregator's working set.
#[derive(Debug, Clone, Default)]
pub struct PeriodSnapshot {
    pub units: Vec<Unit>,
    /// unit id → record
    pub records: HashMap<i64, ExpenseRecord>,
}

impl PeriodSnapshot {
    /// Restrict the snapshot to a single unit, or return it unchanged.
    pub fn filtered(&self, unit: Option<i64>) -> PeriodSnapshot {
        match unit {
            None => self.clone(),
            Some(id) => PeriodSnapshot {
                units: self.units.iter().filter(|u| u.id == id).cloned().collect(),
                records: self
                    .records
                    .iter()
                    .filter(|(unit_id, _)| **unit_id == id)
                    .map(|(unit_id, record)| (*unit_id, record.clone()))
                    .collect(),
            },
        }
    }
}
