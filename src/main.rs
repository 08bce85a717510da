// Entry point and interactive console flow.
//
// The data file is loaded once at startup (option [1] retries a failed load);
// every other action works on the in-memory dataset through a single
// `ReportView`:
// - option [2] prints the current level's table,
// - options [3]-[5] drill down and navigate back,
// - options [6]-[7] change the filter term and sorting,
// - option [8] lists consistency findings,
// - option [9] rebuilds the data file from a flat CSV export.
mod config;
mod convert;
mod error;
mod loader;
mod navigator;
mod output;
mod reports;
mod table;
mod types;
mod util;
mod view;

use config::Config;
use error::ReportError;
use loader::DataSource;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;
use types::Level;
use view::ReportView;

/// One trimmed line, or `None` once input is closed or unreadable.
fn read_line_from<R: BufRead>(reader: &mut R) -> Option<String> {
    let mut buf = String::new();
    match reader.read_line(&mut buf) {
        Ok(0) => None,
        Ok(_) => Some(buf.trim().to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "cannot read input");
            None
        }
    }
}

/// Print `label` and read one line of input.
fn prompt(label: &str) -> Option<String> {
    print!("{}", label);
    let _ = io::stdout().flush();
    read_line_from(&mut io::stdin().lock())
}

fn read_choice() -> Option<String> {
    prompt("Enter choice: ")
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("alloc_report=info")),
        )
        .with_writer(io::stderr)
        .init();
}

fn report_error(e: &ReportError) {
    if e.is_fatal() {
        eprintln!("Failed to load data: {}", e);
        println!("No data loaded, so there are no tables to show.\n");
    } else {
        println!("Action rejected: {}\n", e);
    }
}

/// Load the data file into `view` unless a view already exists.
///
/// Runs at startup and again for option [1], which only has work to do after
/// a failed load. Returns whether a view is available afterwards.
fn load_view<'a>(
    source: &'a DataSource,
    view: &mut Option<ReportView<'a>>,
    config: &Config,
) -> bool {
    if view.is_some() {
        println!("Data already loaded from {}.\n", source.path().display());
        return true;
    }
    *view = handle_load(source, config);
    view.is_some()
}

/// Read the nested data file and build a fresh view on it.
fn handle_load<'a>(source: &'a DataSource, config: &Config) -> Option<ReportView<'a>> {
    match source.load() {
        Ok(dataset) => {
            let cities: usize = dataset.states.values().map(|c| c.len()).sum();
            println!(
                "Loaded {} ({} states, {} cities)\n",
                source.path().display(),
                util::format_int(dataset.states.len()),
                util::format_int(cities)
            );
            let findings = reports::audit(dataset);
            for f in &findings {
                tracing::warn!(kind = %f.kind, location = %f.location, detail = %f.detail, "data finding");
            }
            if !findings.is_empty() {
                println!("Note: {} consistency findings (option 8).\n", findings.len());
            }
            let view = ReportView::new(dataset);
            show(&view, config);
            Some(view)
        }
        Err(e) => {
            report_error(&e);
            None
        }
    }
}

/// Handle option [2]: overview, breadcrumb and the active table.
fn show(view: &ReportView<'_>, config: &Config) {
    if view.level() == Level::State {
        println!("Overall allocation");
        output::preview_table_rows(&[output::overview_row(&view.overview())], 1);
    }
    println!("{}", output::breadcrumb_line(&view.breadcrumb()));
    println!(
        "Level: {} | filter: {} | sorted by percentage: {}\n",
        view.level(),
        if view.filter_term().is_empty() { "(none)" } else { view.filter_term() },
        if view.sort_active() { "yes" } else { "no" }
    );
    match view.rows_for_current_level() {
        Ok(table) => output::print_level_table(view.level(), &table, config.preview_rows),
        Err(e) => report_error(&e),
    }
}

/// Handle option [3]: open a row by number or label.
fn handle_drill(view: &mut ReportView<'_>, config: &Config) {
    let Some(input) = prompt("Row number or label: ") else {
        return;
    };
    if input.is_empty() {
        return;
    }
    let result = match input.parse::<usize>() {
        Ok(n) => view.drill_into_row(n),
        Err(_) => view.drill_into(&input),
    };
    match result {
        Ok(_) => show(view, config),
        Err(e) => report_error(&e),
    }
}

/// Handle option [4]: jump to an ancestor through the breadcrumb.
fn handle_go_back(view: &mut ReportView<'_>, config: &Config) {
    let crumbs = view.breadcrumb();
    if crumbs.is_empty() {
        println!("Already at the state table.\n");
        return;
    }
    // The last entry is the table being shown, so it is not offered.
    let links = &crumbs[..crumbs.len() - 1];
    println!("[0] All states");
    for (i, c) in links.iter().enumerate() {
        println!("[{}] {}", i + 1, c.label);
    }
    let Some(input) = prompt("Go back to (number or level name): ") else {
        return;
    };
    let target = match input.parse::<usize>() {
        Ok(0) => Some(Level::State),
        Ok(n) => links.get(n - 1).and_then(|c| c.level.child()),
        Err(_) => Level::parse(&input),
    };
    let Some(target) = target else {
        println!("Invalid choice.\n");
        return;
    };
    match view.go_back_to(target) {
        Ok(()) => show(view, config),
        Err(e) => report_error(&e),
    }
}

fn handle_filter(view: &mut ReportView<'_>, config: &Config) {
    let Some(term) = prompt("Filter (empty to clear): ") else {
        return;
    };
    view.set_filter_term(&term);
    show(view, config);
}

/// Handle option [9]: rebuild the data file from the CSV export (a file or a
/// directory of exports).
///
/// The dataset already loaded in this session is left untouched.
fn handle_consolidate(config: &Config, loaded: bool) {
    let Some(session) = convert::Session::parse(&config.session) else {
        println!("Invalid session setting '{}', expected DD/MM/YYYY - Shift.\n", config.session);
        return;
    };
    match convert::consolidate(&config.csv_path, &session) {
        Ok((dataset, report)) => {
            println!(
                "Processing {}... ({} files, {} rows read, {} for {})",
                config.csv_path.display(),
                util::format_int(report.files),
                util::format_int(report.total_rows),
                util::format_int(report.session_rows),
                session
            );
            println!(
                "Note: {} rows skipped due to parse/validation errors.",
                util::format_int(report.parse_errors)
            );
            if report.groups == 0 {
                println!("Nothing to write: no rows matched the session.\n");
                return;
            }
            match output::write_json(&config.data_path, &dataset) {
                Ok(()) => println!("Consolidated data saved to {}\n", config.data_path.display()),
                Err(e) => eprintln!("Write error: {}\n", e),
            }
            if loaded {
                println!("Restart to report on the new file.\n");
            }
        }
        Err(e) => eprintln!("Failed to consolidate export: {}\n", e),
    }
}

fn main() {
    init_logging();
    let config = Config::from_env();
    tracing::info!(?config, "starting");
    let source = DataSource::new(config.data_path.clone(), config.load_retries);
    let mut view: Option<ReportView<'_>> = None;
    load_view(&source, &mut view, &config);

    loop {
        println!("Allocation Report:");
        println!("[1] Reload after a failed load");
        println!("[2] Show current table");
        println!("[3] Open a row");
        println!("[4] Go back to a level");
        println!("[5] Back one level");
        println!("[6] Set filter");
        println!("[7] Toggle sort by percentage");
        println!("[8] Data consistency findings");
        println!("[9] Consolidate CSV export");
        println!("[0] Exit\n");
        let Some(choice) = read_choice() else {
            println!("\nEnd of input. Exiting the program.");
            break;
        };
        println!();
        match choice.as_str() {
            "0" => {
                println!("Exiting the program.");
                break;
            }
            "1" => {
                load_view(&source, &mut view, &config);
            }
            "9" => handle_consolidate(&config, source.get().is_some()),
            "2" | "3" | "4" | "5" | "6" | "7" | "8" => {
                let Some(v) = view.as_mut() else {
                    println!("Error: No data loaded. Please load the data file first (option 1).\n");
                    continue;
                };
                match choice.as_str() {
                    "2" => show(v, &config),
                    "3" => handle_drill(v, &config),
                    "4" => handle_go_back(v, &config),
                    "5" => match v.back() {
                        Ok(_) => show(v, &config),
                        Err(e) => report_error(&e),
                    },
                    "6" => handle_filter(v, &config),
                    "7" => {
                        let active = !v.sort_active();
                        v.set_sort_active(active);
                        show(v, &config);
                    }
                    _ => {
                        let findings = v.findings();
                        println!("Data consistency findings\n");
                        output::preview_table_rows(&findings, findings.len());
                    }
                }
            }
            _ => println!("Invalid choice. Please enter 0-9.\n"),
        }
    }
}
