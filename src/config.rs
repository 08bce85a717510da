// Runtime settings, read once from the environment with fixed defaults.
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_DATA_PATH: &str = "dados.json";
pub const DEFAULT_CSV_PATH: &str = "base_planilha.csv";
pub const DEFAULT_SESSION: &str = "05/11/2023 - Tarde";
pub const DEFAULT_LOAD_RETRIES: u32 = 2;
pub const DEFAULT_PREVIEW_ROWS: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Nested JSON dataset.
    pub data_path: PathBuf,
    /// Flat export consumed by the consolidation step.
    pub csv_path: PathBuf,
    /// `DD/MM/YYYY - Shift` session kept during consolidation.
    pub session: String,
    /// Extra load attempts after the first failure.
    pub load_retries: u32,
    pub preview_rows: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            csv_path: PathBuf::from(DEFAULT_CSV_PATH),
            session: DEFAULT_SESSION.to_string(),
            load_retries: DEFAULT_LOAD_RETRIES,
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup so tests need not touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        Config {
            data_path: lookup("ALLOC_REPORT_DATA")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            csv_path: lookup("ALLOC_REPORT_CSV")
                .map(PathBuf::from)
                .unwrap_or(defaults.csv_path),
            session: lookup("ALLOC_REPORT_SESSION").unwrap_or(defaults.session),
            load_retries: parse_or(&lookup, "ALLOC_REPORT_LOAD_RETRIES", defaults.load_retries),
            preview_rows: parse_or(&lookup, "ALLOC_REPORT_PREVIEW_ROWS", defaults.preview_rows),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, fallback = %default, "ignoring invalid setting");
            default
        }),
    }
}
