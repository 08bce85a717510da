// Consolidation of a flat spreadsheet export into the nested dataset.
//
// Rows are kept only for one exam session, grouped by state, city, school and
// function, and summed. Bad rows are counted and skipped.
use crate::error::{ReportError, Result};
use crate::types::{Dataset, Identifier, JobRecord, RawRow};
use crate::util::parse_count_safe;
use chrono::NaiveDate;
use csv::ReaderBuilder;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    /// Exports read successfully.
    pub files: usize,
    pub total_rows: usize,
    pub session_rows: usize,
    pub parse_errors: usize,
    pub groups: usize,
}

/// Exam day and shift, written `DD/MM/YYYY - Shift` in the export.
#[derive(Debug, Clone)]
pub struct Session {
    pub date: NaiveDate,
    pub shift: String,
}

impl Session {
    pub fn parse(s: &str) -> Option<Session> {
        let (date, shift) = s.split_once('-')?;
        let date = NaiveDate::parse_from_str(date.trim(), "%d/%m/%Y").ok()?;
        let shift = shift.trim();
        if shift.is_empty() {
            return None;
        }
        Some(Session {
            date,
            shift: shift.to_string(),
        })
    }

    pub fn matches(&self, other: &Session) -> bool {
        self.date == other.date && self.shift.eq_ignore_ascii_case(&other.shift)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.date.format("%d/%m/%Y"), self.shift)
    }
}

struct Group {
    allocated: i64,
    expected: i64,
    nro_coordenacao: Identifier,
    local_prova_id: Identifier,
}

fn identifier(cell: &str) -> Identifier {
    let cell = cell.trim();
    match parse_count_safe(Some(cell)) {
        Some(n) => Identifier::Number(n),
        None => Identifier::Text(cell.to_string()),
    }
}

fn text(cell: Option<String>) -> Option<String> {
    let t = cell?.trim().to_string();
    if t.is_empty() {
        None
    } else {
        Some(t)
    }
}

type GroupKey = (String, String, String, String);

fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| ReportError::LoadFailed {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn fold_file(
    path: &Path,
    session: &Session,
    groups: &mut BTreeMap<GroupKey, Group>,
    report: &mut ConsolidationReport,
) -> Result<()> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| ReportError::LoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    for result in rdr.deserialize::<RawRow>() {
        report.total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(_) => {
                report.parse_errors += 1;
                continue;
            }
        };

        match row.session.as_deref().and_then(Session::parse) {
            Some(s) if s.matches(session) => report.session_rows += 1,
            _ => continue,
        }

        let key = match (text(row.uf), text(row.city), text(row.school), text(row.function)) {
            (Some(uf), Some(city), Some(school), Some(function)) => (uf, city, school, function),
            _ => {
                report.parse_errors += 1;
                continue;
            }
        };
        let (allocated, expected) = match (
            parse_count_safe(row.allocated.as_deref()),
            parse_count_safe(row.expected.as_deref()),
        ) {
            (Some(a), Some(e)) => (a, e),
            _ => {
                report.parse_errors += 1;
                continue;
            }
        };

        // Identifiers come from the first row of each group.
        let g = groups.entry(key).or_insert_with(|| Group {
            allocated: 0,
            expected: 0,
            nro_coordenacao: identifier(row.nro_coordenacao.as_deref().unwrap_or_default()),
            local_prova_id: identifier(row.local_prova_id.as_deref().unwrap_or_default()),
        });
        g.allocated = g.allocated.saturating_add(allocated);
        g.expected = g.expected.saturating_add(expected);
    }
    tracing::debug!(path = %path.display(), "folded export");
    Ok(())
}

/// Consolidate one export, or every `*.csv` export in a directory.
///
/// In a directory all files feed the same groups, so a function split across
/// exports is summed once. A directory file that cannot be opened is skipped
/// with a warning; a single unreadable file is `LoadFailed`.
pub fn consolidate(path: &Path, session: &Session) -> Result<(Dataset, ConsolidationReport)> {
    let mut report = ConsolidationReport::default();
    let mut groups: BTreeMap<GroupKey, Group> = BTreeMap::new();

    if path.is_dir() {
        for file in csv_files(path)? {
            match fold_file(&file, session, &mut groups, &mut report) {
                Ok(()) => report.files += 1,
                Err(e) => tracing::warn!(error = %e, "skipping export"),
            }
        }
        if report.files == 0 {
            tracing::warn!(dir = %path.display(), "no readable CSV exports found");
        }
    } else {
        fold_file(path, session, &mut groups, &mut report)?;
        report.files = 1;
    }

    report.groups = groups.len();
    let mut dataset = Dataset::default();
    for ((uf, city, school, function), g) in groups {
        let record = dataset
            .states
            .entry(uf)
            .or_default()
            .entry(city)
            .or_default();
        record.total_allocated = record.total_allocated.saturating_add(g.allocated);
        record.total_expected = record.total_expected.saturating_add(g.expected);
        record.details.entry(school).or_default().insert(
            function,
            JobRecord {
                allocated: g.allocated,
                expected: g.expected,
                nro_coordenacao: g.nro_coordenacao,
                local_prova_id: g.local_prova_id,
            },
        );
    }

    tracing::info!(
        path = %path.display(),
        %session,
        files = report.files,
        rows = report.total_rows,
        kept = report.session_rows,
        errors = report.parse_errors,
        groups = report.groups,
        "consolidated export"
    );
    Ok((dataset, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::audit;
    use std::io::Write;

    const HEADER: &str =
        "UF,Cidade,Local,Funcao,Alocados,Previstos,NroCoordenacao,LocalProvaID,DiaTurno\n";

    fn export(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(HEADER.as_bytes()).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    fn afternoon() -> Session {
        Session::parse("05/11/2023 - Tarde").unwrap()
    }

    #[test]
    fn session_parsing() {
        let s = Session::parse(" 05/11/2023 -   tarde ").unwrap();
        assert!(s.matches(&afternoon()));
        assert_eq!(afternoon().to_string(), "05/11/2023 - Tarde");
        assert!(!Session::parse("05/11/2023 - Manhã").unwrap().matches(&afternoon()));
        assert!(Session::parse("2023-11-05").is_none());
        assert!(Session::parse("05/11/2023 - ").is_none());
    }

    #[test]
    fn groups_and_sums_matching_session() {
        let file = export(
            "SP,Campinas,School A,Proctor,3,5,1,100,05/11/2023 - Tarde\n\
             SP,Campinas,School A,Proctor,5,5,1,100,05/11/2023 - Tarde\n\
             SP,Campinas,School A,Chefe,1,1,1,100,05/11/2023 - Tarde\n\
             SP,Campinas,School B,Proctor,2,4,2,200,05/11/2023 - Tarde\n\
             SP,Campinas,School A,Proctor,9,9,1,100,05/11/2023 - Manhã\n\
             RJ,Rio,Escola,Fiscal,x,3,3,300,05/11/2023 - Tarde\n",
        );
        let (ds, report) = consolidate(file.path(), &afternoon()).unwrap();
        assert_eq!(
            report,
            ConsolidationReport {
                files: 1,
                total_rows: 6,
                session_rows: 5,
                parse_errors: 1,
                groups: 3,
            }
        );

        let campinas = &ds.states["SP"]["Campinas"];
        assert_eq!((campinas.total_allocated, campinas.total_expected), (11, 15));
        let proctor = &campinas.details["School A"]["Proctor"];
        assert_eq!((proctor.allocated, proctor.expected), (8, 10));
        assert_eq!(proctor.nro_coordenacao, Identifier::Number(1));
        assert!(!ds.states.contains_key("RJ"));
        assert!(audit(&ds).is_empty());
    }

    #[test]
    fn missing_export_is_load_failed() {
        let dir = tempfile::tempdir().unwrap();
        let err = consolidate(&dir.path().join("none.csv"), &afternoon()).unwrap_err();
        assert!(matches!(err, ReportError::LoadFailed { .. }));
    }

    #[test]
    fn directory_exports_share_one_group_map() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, body: &str| {
            std::fs::write(dir.path().join(name), format!("{}{}", HEADER, body)).unwrap();
        };
        write(
            "a.csv",
            "SP,Campinas,School A,Proctor,3,5,1,100,05/11/2023 - Tarde\n\
             SP,Campinas,School A,Chefe,1,1,1,100,05/11/2023 - Tarde\n",
        );
        write(
            "b.CSV",
            "SP,Campinas,School A,Proctor,5,5,9,900,05/11/2023 - Tarde\n\
             RJ,Rio,Escola,Fiscal,2,3,3,300,05/11/2023 - Tarde\n",
        );
        write("notes.txt", "not an export\n");

        let (ds, report) = consolidate(dir.path(), &afternoon()).unwrap();
        assert_eq!(report.files, 2);
        assert_eq!(report.total_rows, 4);
        assert_eq!(report.groups, 3);

        let campinas = &ds.states["SP"]["Campinas"];
        assert_eq!((campinas.total_allocated, campinas.total_expected), (9, 11));
        let proctor = &campinas.details["School A"]["Proctor"];
        assert_eq!((proctor.allocated, proctor.expected), (8, 10));
        // a.csv sorts first, so its identifiers win.
        assert_eq!(proctor.nro_coordenacao, Identifier::Number(1));
        assert_eq!(ds.states["RJ"]["Rio"].total_allocated, 2);
        assert!(audit(&ds).is_empty());
    }

    #[test]
    fn empty_directory_consolidates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (ds, report) = consolidate(dir.path(), &afternoon()).unwrap();
        assert!(ds.states.is_empty());
        assert_eq!(report, ConsolidationReport::default());
    }

    #[test]
    fn counts_saturate_when_summed() {
        let file = export(&format!(
            "SP,Campinas,School A,Proctor,{max},{max},1,100,05/11/2023 - Tarde\n\
             SP,Campinas,School A,Proctor,{max},{max},1,100,05/11/2023 - Tarde\n\
             SP,Campinas,School A,Chefe,{max},{max},1,100,05/11/2023 - Tarde\n",
            max = i64::MAX
        ));
        let (ds, _) = consolidate(file.path(), &afternoon()).unwrap();
        let campinas = &ds.states["SP"]["Campinas"];
        assert_eq!(campinas.details["School A"]["Proctor"].allocated, i64::MAX);
        assert_eq!(campinas.total_expected, i64::MAX);
    }
}
