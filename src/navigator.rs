use crate::error::{ReportError, Result};
use crate::reports::has_child;
use crate::types::{Dataset, Level, Selection};

/// One breadcrumb entry: a chosen key and the table it was chosen from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crumb {
    pub label: String,
    pub level: Level,
}

/// Drill-down position: the single active level plus the keys chosen above it.
///
/// Starts at the state table with nothing selected. Moves go one level down
/// or back to any ancestor; a rejected move leaves the position untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigator {
    level: Level,
    selection: Selection,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator {
    pub fn new() -> Self {
        Navigator {
            level: Level::State,
            selection: Selection::default(),
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Select `key` in the active table and open its breakdown.
    pub fn drill_into(&mut self, dataset: &Dataset, key: &str) -> Result<Level> {
        let from = self.level;
        let Some(to) = from.child() else {
            return Err(reject(ReportError::InvalidTransition {
                from,
                to: from,
                reason: "function level has no breakdown",
            }));
        };
        if !has_child(dataset, from, &self.selection, key)? {
            return Err(reject(ReportError::NotFound {
                level: from,
                key: key.to_string(),
            }));
        }
        if let Some(slot) = self.selection.slot_mut(from) {
            *slot = Some(key.to_string());
        }
        self.level = to;
        tracing::debug!(%from, %to, key, "drilled down");
        Ok(to)
    }

    /// Jump back to a strict ancestor, dropping every key chosen at or below it.
    pub fn go_back_to(&mut self, target: Level) -> Result<()> {
        let from = self.level;
        if !target.is_strict_ancestor_of(from) {
            return Err(reject(ReportError::InvalidTransition {
                from,
                to: target,
                reason: "target is not an ancestor of the current level",
            }));
        }
        for level in Level::ALL.into_iter().filter(|l| *l >= target) {
            if let Some(slot) = self.selection.slot_mut(level) {
                *slot = None;
            }
        }
        self.level = target;
        tracing::debug!(%from, to = %target, "went back");
        Ok(())
    }

    /// Step back to the parent level.
    pub fn back(&mut self) -> Result<Level> {
        let Some(parent) = self.level.parent() else {
            return Err(reject(ReportError::InvalidTransition {
                from: self.level,
                to: self.level,
                reason: "already at the top level",
            }));
        };
        self.go_back_to(parent)?;
        Ok(parent)
    }

    /// Chosen keys, root first, each tagged with the table it was picked from.
    pub fn breadcrumb(&self) -> Vec<Crumb> {
        Level::ALL
            .into_iter()
            .filter_map(|level| {
                self.selection.key_for(level).map(|label| Crumb {
                    label: label.to_string(),
                    level,
                })
            })
            .collect()
    }
}

fn reject(err: ReportError) -> ReportError {
    tracing::error!(error = %err, "navigation rejected");
    err
}
