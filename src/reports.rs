use crate::error::{ReportError, Result};
use crate::types::{
    CityRecord, Dataset, Finding, FindingKind, Level, Overview, Percentage, SchoolIds,
    SchoolRecord, Selection, SummaryRow,
};
use std::collections::BTreeMap;

/// Summary rows for one level of the hierarchy.
///
/// `selection` must name every ancestor of `level`; a missing or unknown key
/// is reported as `NotFound` for the level it should select from.
pub fn aggregate(dataset: &Dataset, level: Level, selection: &Selection) -> Result<Vec<SummaryRow>> {
    let rows = match level {
        Level::State => dataset
            .states
            .iter()
            .map(|(uf, cities)| {
                let (allocated, expected) = cities.values().fold((0i64, 0i64), |(a, e), c| {
                    (a.saturating_add(c.total_allocated), e.saturating_add(c.total_expected))
                });
                SummaryRow::new(Level::State, uf, allocated, expected)
            })
            .collect(),
        Level::City => {
            let (uf, cities) = cities_of(dataset, selection)?;
            cities
                .iter()
                .map(|(name, c)| {
                    let mut row =
                        SummaryRow::new(Level::City, name, c.total_allocated, c.total_expected);
                    row.state = Some(uf.to_string());
                    row
                })
                .collect()
        }
        Level::School => city_of(dataset, selection)?
            .details
            .iter()
            .map(|(name, jobs)| school_row(name, jobs))
            .collect(),
        Level::Function => school_of(dataset, selection)?
            .iter()
            .map(|(name, job)| SummaryRow::new(Level::Function, name, job.allocated, job.expected))
            .collect(),
    };
    Ok(rows)
}

fn school_row(name: &str, jobs: &SchoolRecord) -> SummaryRow {
    let mut allocated = 0i64;
    let mut expected = 0i64;
    let mut ids = None;
    for job in jobs.values() {
        allocated = allocated.saturating_add(job.allocated);
        expected = expected.saturating_add(job.expected);
        ids = Some(SchoolIds {
            nro_coordenacao: job.nro_coordenacao.clone(),
            local_prova_id: job.local_prova_id.clone(),
        });
    }
    let mut row = SummaryRow::new(Level::School, name, allocated, expected);
    row.school_ids = ids;
    row
}

fn require<'a>(selection: &'a Selection, level: Level) -> Result<&'a str> {
    selection.key_for(level).ok_or_else(|| ReportError::NotFound {
        level,
        key: "<none selected>".to_string(),
    })
}

fn cities_of<'d>(
    dataset: &'d Dataset,
    selection: &Selection,
) -> Result<(&'d str, &'d BTreeMap<String, CityRecord>)> {
    let uf = require(selection, Level::State)?;
    dataset
        .states
        .get_key_value(uf)
        .map(|(k, v)| (k.as_str(), v))
        .ok_or_else(|| ReportError::NotFound {
            level: Level::State,
            key: uf.to_string(),
        })
}

fn city_of<'d>(dataset: &'d Dataset, selection: &Selection) -> Result<&'d CityRecord> {
    let (_, cities) = cities_of(dataset, selection)?;
    let city = require(selection, Level::City)?;
    cities.get(city).ok_or_else(|| ReportError::NotFound {
        level: Level::City,
        key: city.to_string(),
    })
}

fn school_of<'d>(dataset: &'d Dataset, selection: &Selection) -> Result<&'d SchoolRecord> {
    let city = city_of(dataset, selection)?;
    let school = require(selection, Level::School)?;
    city.details.get(school).ok_or_else(|| ReportError::NotFound {
        level: Level::School,
        key: school.to_string(),
    })
}

/// Whether `key` labels a row of `level`'s table under `selection`.
pub fn has_child(dataset: &Dataset, level: Level, selection: &Selection, key: &str) -> Result<bool> {
    Ok(match level {
        Level::State => dataset.states.contains_key(key),
        Level::City => cities_of(dataset, selection)?.1.contains_key(key),
        Level::School => city_of(dataset, selection)?.details.contains_key(key),
        Level::Function => school_of(dataset, selection)?.contains_key(key),
    })
}

/// Grand totals over every city of every state.
pub fn overview(dataset: &Dataset) -> Overview {
    let (allocated, expected) = dataset
        .states
        .values()
        .flat_map(|cities| cities.values())
        .fold((0i64, 0i64), |(a, e), c| {
            (a.saturating_add(c.total_allocated), e.saturating_add(c.total_expected))
        });
    Overview {
        allocated,
        expected,
        remaining: expected.saturating_sub(allocated),
        percentage: Percentage::from_counts(allocated, expected),
    }
}

/// Consistency observations that the report relies on but never enforces.
pub fn audit(dataset: &Dataset) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (uf, cities) in &dataset.states {
        for (city_name, city) in cities {
            let location = format!("{} / {}", uf, city_name);
            let (allocated, expected) = city
                .details
                .values()
                .flat_map(|jobs| jobs.values())
                .fold((0i64, 0i64), |(a, e), j| {
                    (a.saturating_add(j.allocated), e.saturating_add(j.expected))
                });
            if !city.details.is_empty()
                && (allocated != city.total_allocated || expected != city.total_expected)
            {
                findings.push(Finding {
                    kind: FindingKind::TotalsMismatch,
                    location: location.clone(),
                    detail: format!(
                        "stored {}/{} but schools sum to {}/{}",
                        city.total_allocated, city.total_expected, allocated, expected
                    ),
                });
            }
            if city.total_allocated > city.total_expected {
                findings.push(Finding {
                    kind: FindingKind::Overallocated,
                    location: location.clone(),
                    detail: format!(
                        "{} allocated for {} expected",
                        city.total_allocated, city.total_expected
                    ),
                });
            }
            for (school_name, jobs) in &city.details {
                let mut ids = jobs
                    .values()
                    .map(|j| (&j.nro_coordenacao, &j.local_prova_id));
                if let Some(first) = ids.next() {
                    if ids.any(|other| other != first) {
                        findings.push(Finding {
                            kind: FindingKind::MixedIdentifiers,
                            location: format!("{} / {}", location, school_name),
                            detail: "jobs disagree on coordination or exam site id".to_string(),
                        });
                    }
                }
            }
        }
    }
    findings
}
