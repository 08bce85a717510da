// Sorting and filtering shared by every level's table.
//
// Both work on the numeric `SummaryRow`s, never on formatted cell text, and
// neither drops rows: filtering only flips the `visible` flag.
use crate::types::SummaryRow;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortSpec {
    /// Highest allocation percentage first; ties keep their prior order.
    #[default]
    PercentageDesc,
    /// Dataset order.
    Unsorted,
}

impl SortSpec {
    pub fn from_active(active: bool) -> Self {
        if active {
            SortSpec::PercentageDesc
        } else {
            SortSpec::Unsorted
        }
    }

    pub fn is_active(self) -> bool {
        self == SortSpec::PercentageDesc
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub row: SummaryRow,
    pub visible: bool,
}

/// Stable sort; `slice::sort_by` never reorders equal elements.
pub fn sort_rows(rows: &mut [SummaryRow], spec: SortSpec) {
    if spec.is_active() {
        rows.sort_by(|a, b| {
            b.percentage
                .sort_key()
                .partial_cmp(&a.percentage.sort_key())
                .unwrap_or(Ordering::Equal)
        });
    }
}

/// Case-insensitive substring test against all visible cells joined together.
pub fn matches_filter(row: &SummaryRow, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    let text: String = row.cells().concat().to_lowercase();
    text.contains(&term.to_lowercase())
}

pub fn render(mut rows: Vec<SummaryRow>, spec: SortSpec, filter: &str) -> Vec<TableRow> {
    sort_rows(&mut rows, spec);
    rows.into_iter()
        .map(|row| {
            let visible = matches_filter(&row, filter);
            TableRow { row, visible }
        })
        .collect()
}

pub fn visible_rows(table: &[TableRow]) -> impl Iterator<Item = &SummaryRow> {
    table.iter().filter(|r| r.visible).map(|r| &r.row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Level;

    fn rows() -> Vec<SummaryRow> {
        vec![
            SummaryRow::new(Level::Function, "Fiscal de Sala", 5, 10),
            SummaryRow::new(Level::Function, "Chefe", 9, 10),
            SummaryRow::new(Level::Function, "Apoio", 1, 2),
            SummaryRow::new(Level::Function, "Vazio", 0, 0),
            SummaryRow::new(Level::Function, "Extra", 12, 10),
        ]
    }

    fn labels<'a>(rows: impl IntoIterator<Item = &'a SummaryRow>) -> Vec<&'a str> {
        rows.into_iter().map(|r| r.label.as_str()).collect()
    }

    #[test]
    fn sorts_by_percentage_descending_and_stably() {
        let mut r = rows();
        sort_rows(&mut r, SortSpec::PercentageDesc);
        assert_eq!(labels(&r), ["Extra", "Chefe", "Fiscal de Sala", "Apoio", "Vazio"]);
    }

    #[test]
    fn sorting_is_idempotent() {
        let mut once = rows();
        sort_rows(&mut once, SortSpec::PercentageDesc);
        let mut twice = once.clone();
        sort_rows(&mut twice, SortSpec::PercentageDesc);
        assert_eq!(once, twice);
    }

    #[test]
    fn numeric_not_lexical_order() {
        let mut r = vec![
            SummaryRow::new(Level::State, "A", 9, 100),
            SummaryRow::new(Level::State, "B", 10, 100),
            SummaryRow::new(Level::State, "C", 100, 100),
        ];
        sort_rows(&mut r, SortSpec::PercentageDesc);
        assert_eq!(labels(&r), ["C", "B", "A"]);
    }

    #[test]
    fn unsorted_keeps_dataset_order() {
        let mut r = rows();
        sort_rows(&mut r, SortSpec::Unsorted);
        assert_eq!(r, rows());
    }

    #[test]
    fn filter_matches_any_cell_case_insensitively() {
        let table = render(rows(), SortSpec::Unsorted, "FISCAL");
        assert_eq!(labels(visible_rows(&table)), ["Fiscal de Sala"]);
        assert_eq!(table.len(), 5);

        // "50.00%" only appears in the percentage cells of two rows.
        let table = render(rows(), SortSpec::Unsorted, "50.00%");
        assert_eq!(labels(visible_rows(&table)), ["Fiscal de Sala", "Apoio"]);

        let table = render(rows(), SortSpec::Unsorted, "n/a");
        assert_eq!(labels(visible_rows(&table)), ["Vazio"]);
    }

    #[test]
    fn empty_filter_shows_everything() {
        let table = render(rows(), SortSpec::PercentageDesc, "");
        assert!(table.iter().all(|r| r.visible));
    }

    #[test]
    fn filtering_twice_is_stable() {
        let table = render(rows(), SortSpec::PercentageDesc, "e");
        let first: Vec<SummaryRow> = visible_rows(&table).cloned().collect();
        assert!(!first.is_empty() && first.len() < table.len());
        let again = render(first.clone(), SortSpec::PercentageDesc, "e");
        assert!(again.iter().all(|r| r.visible));
        assert_eq!(visible_rows(&again).cloned().collect::<Vec<_>>(), first);
    }
}
