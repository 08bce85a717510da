use crate::error::{ReportError, Result};
use crate::navigator::{Crumb, Navigator};
use crate::reports::{aggregate, audit, overview};
use crate::table::{render, visible_rows, SortSpec, TableRow};
use crate::types::{Dataset, Finding, Level, Overview};

/// Everything the console shell reads from or drives.
///
/// Holds the loaded dataset by reference plus the navigation, filter and sort
/// state; rows are recomputed from the dataset on every request.
#[derive(Debug)]
pub struct ReportView<'a> {
    dataset: &'a Dataset,
    navigator: Navigator,
    filter: String,
    sort: SortSpec,
}

impl<'a> ReportView<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        ReportView {
            dataset,
            navigator: Navigator::new(),
            filter: String::new(),
            sort: SortSpec::default(),
        }
    }

    pub fn level(&self) -> Level {
        self.navigator.level()
    }

    pub fn filter_term(&self) -> &str {
        &self.filter
    }

    pub fn sort_active(&self) -> bool {
        self.sort.is_active()
    }

    /// The active level's table, sorted and with filter visibility applied.
    pub fn rows_for_current_level(&self) -> Result<Vec<TableRow>> {
        let level = self.navigator.level();
        let rows = aggregate(self.dataset, level, self.navigator.selection())?;
        let table = render(rows, self.sort, &self.filter);
        tracing::debug!(
            %level,
            rows = table.len(),
            visible = table.iter().filter(|r| r.visible).count(),
            "rendered table"
        );
        Ok(table)
    }

    pub fn breadcrumb(&self) -> Vec<Crumb> {
        self.navigator.breadcrumb()
    }

    pub fn overview(&self) -> Overview {
        overview(self.dataset)
    }

    pub fn findings(&self) -> Vec<Finding> {
        audit(self.dataset)
    }

    pub fn drill_into(&mut self, key: &str) -> Result<Level> {
        self.navigator.drill_into(self.dataset, key)
    }

    /// Drill into the `n`th visible row (1-based) of the current table.
    pub fn drill_into_row(&mut self, n: usize) -> Result<Level> {
        let table = self.rows_for_current_level()?;
        let label = n
            .checked_sub(1)
            .and_then(|i| visible_rows(&table).nth(i))
            .map(|r| r.label.clone())
            .ok_or_else(|| ReportError::NotFound {
                level: self.level(),
                key: format!("row {}", n),
            })?;
        self.drill_into(&label)
    }

    pub fn go_back_to(&mut self, level: Level) -> Result<()> {
        self.navigator.go_back_to(level)
    }

    pub fn back(&mut self) -> Result<Level> {
        self.navigator.back()
    }

    pub fn set_filter_term(&mut self, term: &str) {
        self.filter = term.to_string();
    }

    pub fn set_sort_active(&mut self, active: bool) {
        self.sort = SortSpec::from_active(active);
    }
}
