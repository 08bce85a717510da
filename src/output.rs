use crate::error::Result;
use crate::navigator::Crumb;
use crate::table::TableRow;
use crate::types::{Level, Overview, OverviewRow, SummaryRow};
use crate::util::format_int;
use serde::Serialize;
use std::path::Path;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

/// Markdown table of the visible rows, numbered for drill-down by position.
///
/// Returns `None` when no row is visible.
pub fn level_table(level: Level, table: &[TableRow], max_rows: usize) -> Option<String> {
    let mut builder = Builder::default();
    let mut header = vec!["#"];
    header.extend(SummaryRow::headers(level));
    header.push("Band");
    builder.push_record(header);

    let mut shown = 0usize;
    for (i, row) in table.iter().filter(|r| r.visible).enumerate().take(max_rows) {
        let mut record = vec![(i + 1).to_string()];
        record.extend(row.row.cells());
        record.push(row.row.percentage.band().as_str().to_string());
        builder.push_record(record);
        shown += 1;
    }
    if shown == 0 {
        return None;
    }
    Some(builder.build().with(Style::markdown()).to_string())
}

pub fn print_level_table(level: Level, table: &[TableRow], max_rows: usize) {
    let visible = table.iter().filter(|r| r.visible).count();
    match level_table(level, table, max_rows) {
        Some(t) => println!("{}", t),
        None => println!("(no rows)"),
    }
    if visible > max_rows {
        println!("({} more rows not shown)", visible - max_rows);
    }
    if visible < table.len() {
        println!("({} rows hidden by filter)", table.len() - visible);
    }
    println!();
}

/// `All states > SP > Campinas`.
pub fn breadcrumb_line(crumbs: &[Crumb]) -> String {
    let mut line = String::from("All states");
    for c in crumbs {
        line.push_str(" > ");
        line.push_str(&c.label);
    }
    line
}

pub fn overview_row(o: &Overview) -> OverviewRow {
    OverviewRow {
        percentage: o.percentage.to_string(),
        allocated: format_int(o.allocated),
        remaining: format_int(o.remaining),
        expected: format_int(o.expected),
    }
}
