// 📄 CSV Export - Expense Sheet Snapshot
// Writes one period's grid the way the dashboard shows it: the fixed column
// order, resolved values only (never formula text), Net Earn at two
// decimals, every field quoted.

use anyhow::{Context, Result};
use std::io::Write;

use crate::formula::format_amount;
use crate::model::{Category, PeriodSnapshot};

/// The header row, matching the on-screen table: unit number, the twelve
/// categories in wire order, then net earnings.
pub fn csv_header() -> Vec<String> {
    let mut header = Vec::with_capacity(Category::ALL.len() + 2);
    header.push("Unit".to_string());
    for category in Category::ALL {
        header.push(category.label().to_string());
    }
    header.push("Net Earn".to_string());
    header
}

/// Write the snapshot as CSV. Units appear in snapshot order; units with no
/// record export as empty cells with a zero net.
pub fn write_csv<W: Write>(snapshot: &PeriodSnapshot, writer: W) -> Result<()> {
    let mut csv = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(writer);

    csv.write_record(csv_header())
        .context("Failed to write CSV header")?;

    let empty = crate::model::ExpenseRecord::new();
    for unit in &snapshot.units {
        let record = snapshot.records.get(&unit.id).unwrap_or(&empty);

        let mut row = Vec::with_capacity(Category::ALL.len() + 2);
        row.push(unit.unit_number.clone());
        for category in Category::ALL {
            let value = record
                .get(category)
                .map(|cell| cell.value_str().to_string())
                .unwrap_or_default();
            row.push(value);
        }
        row.push(format_amount(record.net_earnings()));

        csv.write_record(&row)
            .with_context(|| format!("Failed to write CSV row for unit {}", unit.unit_number))?;
    }

    csv.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// The snapshot as a CSV string (the export endpoint's response body).
pub fn to_csv_string(snapshot: &PeriodSnapshot) -> Result<String> {
    let mut buf = Vec::new();
    write_csv(snapshot, &mut buf)?;
    String::from_utf8(buf).context("CSV output was not valid UTF-8")
}
