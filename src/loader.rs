use crate::error::{ReportError, Result};
use crate::types::Dataset;
use once_cell::sync::OnceCell;
use serde_json::error::Category;
use std::path::{Path, PathBuf};
use std::time::Duration;

const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Read-once handle on the nested JSON dataset.
///
/// The first successful `load` caches the dataset; it is immutable from then on.
#[derive(Debug)]
pub struct DataSource {
    path: PathBuf,
    retries: u32,
    data: OnceCell<Dataset>,
}

impl DataSource {
    pub fn new(path: impl Into<PathBuf>, retries: u32) -> Self {
        DataSource {
            path: path.into(),
            retries,
            data: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the dataset, or return the cached copy.
    ///
    /// Unreadable files are retried up to `retries` times; malformed files fail
    /// immediately since re-reading them cannot help.
    pub fn load(&self) -> Result<&Dataset> {
        self.data.get_or_try_init(|| {
            let mut attempt = 0u32;
            loop {
                match read_dataset(&self.path) {
                    Ok(ds) => {
                        tracing::info!(
                            path = %self.path.display(),
                            states = ds.states.len(),
                            "dataset loaded"
                        );
                        return Ok(ds);
                    }
                    Err(e @ ReportError::LoadFailed { .. }) if attempt < self.retries => {
                        attempt += 1;
                        tracing::warn!(error = %e, attempt, "load failed, retrying");
                        std::thread::sleep(RETRY_BACKOFF * attempt);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "giving up on dataset load");
                        return Err(e);
                    }
                }
            }
        })
    }

    pub fn get(&self) -> Option<&Dataset> {
        self.data.get()
    }
}

/// Read and parse one dataset file without caching.
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    let text = std::fs::read_to_string(path).map_err(|e| ReportError::LoadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_dataset(path, &text)
}

pub fn parse_dataset(path: &Path, text: &str) -> Result<Dataset> {
    serde_json::from_str::<Dataset>(text).map_err(|e| match e.classify() {
        Category::Data => ReportError::SchemaError {
            path: path.to_path_buf(),
            detail: e.to_string(),
        },
        Category::Io | Category::Syntax | Category::Eof => ReportError::LoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identifier;
    use std::io::Write;

    const SAMPLE: &str = r#"{"SP": {"Campinas": {"total_allocated": 80, "total_expected": 100,
        "details": {"School A": {"Proctor": {"allocated": 8, "expected": 10,
        "nro_coordenacao": "1", "local_prova_id": "100"}}}}}}"#;

    #[test]
    fn loads_once_and_caches() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let source = DataSource::new(file.path(), 0);
        assert!(source.get().is_none());
        let ds = source.load().unwrap();
        assert_eq!(ds.states["SP"]["Campinas"].total_expected, 100);

        // A second load must not touch the file again.
        std::fs::write(file.path(), "not json").unwrap();
        assert_eq!(source.load().unwrap().states.len(), 1);
    }

    #[test]
    fn missing_file_is_load_failed() {
        let dir = tempfile::tempdir().unwrap();
        let source = DataSource::new(dir.path().join("absent.json"), 1);
        assert!(matches!(source.load(), Err(ReportError::LoadFailed { .. })));
        assert!(source.get().is_none());
    }

    #[test]
    fn syntax_error_is_load_failed() {
        let err = parse_dataset(Path::new("x.json"), "{\"SP\": ").unwrap_err();
        assert!(matches!(err, ReportError::LoadFailed { .. }));
    }

    #[test]
    fn wrong_shape_is_schema_error() {
        let err = parse_dataset(
            Path::new("x.json"),
            r#"{"SP": {"Campinas": {"total_allocated": "eighty"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ReportError::SchemaError { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn whole_float_counts_and_ids_load() {
        let text = r#"{"SP": {"Campinas": {"total_allocated": 80.0, "total_expected": 100,
            "details": {"School A": {"Proctor": {"allocated": 8.0, "expected": 10.0,
            "nro_coordenacao": 1.0, "local_prova_id": 100}}}}}}"#;
        let ds = parse_dataset(Path::new("x.json"), text).unwrap();
        let campinas = &ds.states["SP"]["Campinas"];
        assert_eq!(campinas.total_allocated, 80);
        let job = &campinas.details["School A"]["Proctor"];
        assert_eq!((job.allocated, job.expected), (8, 10));
        assert_eq!(job.nro_coordenacao, Identifier::Number(1));
    }

    #[test]
    fn fractional_count_is_schema_error() {
        let text = r#"{"SP": {"Campinas": {"total_allocated": 80.5, "total_expected": 100,
            "details": {}}}}"#;
        let err = parse_dataset(Path::new("x.json"), text).unwrap_err();
        assert!(matches!(err, ReportError::SchemaError { .. }));
    }
}
