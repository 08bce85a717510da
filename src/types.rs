use crate::util::{de_count, percentage_of, whole_number};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tabled::Tabled;

/// Nested allocation data: state code -> city name -> city record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Dataset {
    pub states: BTreeMap<String, BTreeMap<String, CityRecord>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CityRecord {
    #[serde(deserialize_with = "de_count")]
    pub total_allocated: i64,
    #[serde(deserialize_with = "de_count")]
    pub total_expected: i64,
    /// School name -> job/function name -> job record.
    pub details: BTreeMap<String, SchoolRecord>,
}

pub type SchoolRecord = BTreeMap<String, JobRecord>;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JobRecord {
    #[serde(deserialize_with = "de_count")]
    pub allocated: i64,
    #[serde(deserialize_with = "de_count")]
    pub expected: i64,
    pub nro_coordenacao: Identifier,
    pub local_prova_id: Identifier,
}

/// Source identifiers arrive either as JSON numbers or strings.
///
/// Whole floats such as `1.0` read as numbers; other floats keep their text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged, from = "RawIdentifier")]
pub enum Identifier {
    Number(i64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIdentifier {
    Number(i64),
    Float(f64),
    Text(String),
}

impl From<RawIdentifier> for Identifier {
    fn from(raw: RawIdentifier) -> Self {
        match raw {
            RawIdentifier::Number(n) => Identifier::Number(n),
            RawIdentifier::Float(f) => match whole_number(f) {
                Some(n) => Identifier::Number(n),
                None => Identifier::Text(f.to_string()),
            },
            RawIdentifier::Text(s) => Identifier::Text(s),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Number(n) => write!(f, "{}", n),
            Identifier::Text(s) => f.write_str(s),
        }
    }
}

/// Hierarchy level of a report table, root first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    State,
    City,
    School,
    Function,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::State, Level::City, Level::School, Level::Function];

    pub fn depth(self) -> usize {
        self as usize
    }

    pub fn child(self) -> Option<Level> {
        Level::ALL.get(self.depth() + 1).copied()
    }

    pub fn parent(self) -> Option<Level> {
        self.depth().checked_sub(1).map(|d| Level::ALL[d])
    }

    pub fn is_strict_ancestor_of(self, other: Level) -> bool {
        self < other
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::State => "state",
            Level::City => "city",
            Level::School => "school",
            Level::Function => "function",
        }
    }

    pub fn parse(s: &str) -> Option<Level> {
        let s = s.trim();
        Level::ALL.into_iter().find(|l| l.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allocation percentage, already rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Percentage {
    Value(f64),
    /// Nothing was expected, so the ratio does not exist.
    Unavailable,
}

impl Percentage {
    pub fn from_counts(allocated: i64, expected: i64) -> Percentage {
        match percentage_of(allocated, expected) {
            Ok(p) => Percentage::Value(p),
            Err(e) => {
                tracing::debug!(error = %e, "substituting N/A percentage");
                Percentage::Unavailable
            }
        }
    }

    /// Numeric key used for ordering rows; N/A counts as zero.
    pub fn sort_key(self) -> f64 {
        match self {
            Percentage::Value(p) => p,
            Percentage::Unavailable => 0.0,
        }
    }

    pub fn band(self) -> Band {
        let p = match self {
            Percentage::Value(p) => p,
            Percentage::Unavailable => return Band::Unavailable,
        };
        if p < 41.0 {
            Band::Low
        } else if p < 61.0 {
            Band::MidLow
        } else if p < 81.0 {
            Band::MidHigh
        } else if p <= 100.0 {
            Band::High
        } else {
            Band::Overflow
        }
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Percentage::Value(p) => write!(f, "{:.2}%", p),
            Percentage::Unavailable => f.write_str("N/A"),
        }
    }
}

/// Color band of a percentage cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Low,
    MidLow,
    MidHigh,
    High,
    /// Overallocated: more than 100%.
    Overflow,
    Unavailable,
}

impl Band {
    pub fn as_str(self) -> &'static str {
        match self {
            Band::Low => "low",
            Band::MidLow => "mid-low",
            Band::MidHigh => "mid-high",
            Band::High => "high",
            Band::Overflow => "overflow",
            Band::Unavailable => "n/a",
        }
    }
}

/// Identifiers surfaced on school rows.
///
/// Read from the last job summed; the source data is assumed, not verified,
/// to carry the same values on every job of a school.
#[derive(Debug, Clone, PartialEq)]
pub struct SchoolIds {
    pub nro_coordenacao: Identifier,
    pub local_prova_id: Identifier,
}

/// Keys chosen on the way down, root first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub state: Option<String>,
    pub city: Option<String>,
    pub school: Option<String>,
}

impl Selection {
    /// The key that selects a row of `level`'s table, if chosen.
    pub fn key_for(&self, level: Level) -> Option<&str> {
        match level {
            Level::State => self.state.as_deref(),
            Level::City => self.city.as_deref(),
            Level::School => self.school.as_deref(),
            Level::Function => None,
        }
    }

    pub fn slot_mut(&mut self, level: Level) -> Option<&mut Option<String>> {
        match level {
            Level::State => Some(&mut self.state),
            Level::City => Some(&mut self.city),
            Level::School => Some(&mut self.school),
            Level::Function => None,
        }
    }
}

/// One derived table row for any level.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub level: Level,
    pub label: String,
    pub allocated: i64,
    pub expected: i64,
    /// Negative when overallocated.
    pub remaining: i64,
    pub percentage: Percentage,
    /// Owning state, shown on city rows.
    pub state: Option<String>,
    pub school_ids: Option<SchoolIds>,
}

impl SummaryRow {
    pub fn new(level: Level, label: impl Into<String>, allocated: i64, expected: i64) -> Self {
        SummaryRow {
            level,
            label: label.into(),
            allocated,
            expected,
            remaining: expected.saturating_sub(allocated),
            percentage: Percentage::from_counts(allocated, expected),
            state: None,
            school_ids: None,
        }
    }

    pub fn headers(level: Level) -> Vec<&'static str> {
        let mut h = match level {
            Level::State => vec!["UF"],
            Level::City => vec!["UF", "City"],
            Level::School => vec!["Coordination", "Exam Site", "School"],
            Level::Function => vec!["Function"],
        };
        h.extend(["Allocated %", "Allocated", "Remaining", "Expected"]);
        h
    }

    /// Visible cell text in column order, matching `headers`.
    pub fn cells(&self) -> Vec<String> {
        let mut cells = Vec::with_capacity(7);
        if let Some(state) = &self.state {
            cells.push(state.clone());
        }
        if self.level == Level::School {
            match &self.school_ids {
                Some(ids) => {
                    cells.push(ids.nro_coordenacao.to_string());
                    cells.push(ids.local_prova_id.to_string());
                }
                None => cells.extend([String::new(), String::new()]),
            }
        }
        cells.push(self.label.clone());
        cells.push(self.percentage.to_string());
        cells.push(self.allocated.to_string());
        cells.push(self.remaining.to_string());
        cells.push(self.expected.to_string());
        cells
    }
}

/// Grand totals over the whole dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub allocated: i64,
    pub expected: i64,
    pub remaining: i64,
    pub percentage: Percentage,
}

#[derive(Debug, Tabled, Clone)]
pub struct OverviewRow {
    #[tabled(rename = "Allocated %")]
    pub percentage: String,
    #[tabled(rename = "Allocated")]
    pub allocated: String,
    #[tabled(rename = "Remaining")]
    pub remaining: String,
    #[tabled(rename = "Expected")]
    pub expected: String,
}

/// One row of the flat spreadsheet export.
#[derive(Debug, Deserialize)]
pub struct RawRow {
    #[serde(rename = "UF")]
    pub uf: Option<String>,
    #[serde(rename = "Cidade")]
    pub city: Option<String>,
    #[serde(rename = "Local")]
    pub school: Option<String>,
    #[serde(rename = "Funcao")]
    pub function: Option<String>,
    #[serde(rename = "Alocados")]
    pub allocated: Option<String>,
    #[serde(rename = "Previstos")]
    pub expected: Option<String>,
    #[serde(rename = "NroCoordenacao")]
    pub nro_coordenacao: Option<String>,
    #[serde(rename = "LocalProvaID")]
    pub local_prova_id: Option<String>,
    #[serde(rename = "DiaTurno")]
    pub session: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingKind {
    TotalsMismatch,
    MixedIdentifiers,
    Overallocated,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FindingKind::TotalsMismatch => "totals mismatch",
            FindingKind::MixedIdentifiers => "mixed identifiers",
            FindingKind::Overallocated => "overallocated",
        })
    }
}

/// Data consistency observation; never alters the dataset.
#[derive(Debug, Tabled, Clone)]
pub struct Finding {
    #[tabled(rename = "Kind")]
    pub kind: FindingKind,
    #[tabled(rename = "Location")]
    pub location: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_moves_one_step() {
        assert_eq!(Level::State.child(), Some(Level::City));
        assert_eq!(Level::Function.child(), None);
        assert_eq!(Level::State.parent(), None);
        assert_eq!(Level::School.parent(), Some(Level::City));
        assert!(Level::State.is_strict_ancestor_of(Level::Function));
        assert!(!Level::City.is_strict_ancestor_of(Level::City));
        assert_eq!(Level::parse(" School "), Some(Level::School));
    }

    #[test]
    fn bands_follow_thresholds() {
        let band = |p| Percentage::Value(p).band();
        assert_eq!(band(0.0), Band::Low);
        assert_eq!(band(40.99), Band::Low);
        assert_eq!(band(41.0), Band::MidLow);
        assert_eq!(band(60.99), Band::MidLow);
        assert_eq!(band(61.0), Band::MidHigh);
        assert_eq!(band(80.99), Band::MidHigh);
        assert_eq!(band(81.0), Band::High);
        assert_eq!(band(100.0), Band::High);
        assert_eq!(band(100.01), Band::Overflow);
        assert_eq!(band(-5.0), Band::Low);
        assert_eq!(Percentage::Unavailable.band(), Band::Unavailable);
    }

    #[test]
    fn zero_expected_renders_sentinel() {
        let row = SummaryRow::new(Level::Function, "Proctor", 0, 0);
        assert_eq!(row.percentage, Percentage::Unavailable);
        assert_eq!(row.percentage.to_string(), "N/A");
        assert_eq!(row.percentage.sort_key(), 0.0);
    }

    #[test]
    fn overallocation_gives_negative_remaining() {
        let row = SummaryRow::new(Level::City, "Campinas", 12, 10);
        assert_eq!(row.remaining, -2);
        assert_eq!(row.percentage.to_string(), "120.00%");
        assert_eq!(row.percentage.band(), Band::Overflow);
    }

    #[test]
    fn identifiers_accept_numbers_and_strings() {
        let job: JobRecord = serde_json::from_str(
            r#"{"allocated": 1, "expected": 2, "nro_coordenacao": 7, "local_prova_id": "100"}"#,
        )
        .unwrap();
        assert_eq!(job.nro_coordenacao, Identifier::Number(7));
        assert_eq!(job.local_prova_id.to_string(), "100");
    }

    #[test]
    fn whole_floats_read_as_counts_and_ids() {
        let job: JobRecord = serde_json::from_str(
            r#"{"allocated": 8.0, "expected": 10, "nro_coordenacao": 1.0, "local_prova_id": 2.5}"#,
        )
        .unwrap();
        assert_eq!(job.allocated, 8);
        assert_eq!(job.nro_coordenacao, Identifier::Number(1));
        assert_eq!(job.local_prova_id, Identifier::Text("2.5".to_string()));

        let fractional = serde_json::from_str::<JobRecord>(
            r#"{"allocated": 8.5, "expected": 10, "nro_coordenacao": 1, "local_prova_id": 2}"#,
        );
        assert!(fractional.is_err());
    }

    #[test]
    fn extreme_counts_saturate() {
        let row = SummaryRow::new(Level::Function, "Huge", i64::MIN, i64::MAX);
        assert_eq!(row.remaining, i64::MAX);
    }
}
