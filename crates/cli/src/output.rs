//! Output formatting for the CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use translit_harness::{Bucket, RunResult, SuiteReport, TestCase};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Log line format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Rows that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<Cell>;
}

impl TableDisplay for (Bucket, &TestCase) {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Bucket", "Category", "Grammar", "Len", "Input"]
    }

    fn row(&self) -> Vec<Cell> {
        let (bucket, case) = self;
        vec![
            Cell::new(&case.id),
            Cell::new(bucket),
            Cell::new(&case.category),
            Cell::new(&case.grammar_tag),
            Cell::new(format!("{:?}", case.length_bucket)),
            Cell::new(&case.input_text),
        ]
    }
}

impl TableDisplay for RunResult {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Bucket", "Verdict", "Time (ms)", "Detail"]
    }

    fn row(&self) -> Vec<Cell> {
        let verdict = if self.passed() {
            Cell::new("PASS").fg(Color::Green)
        } else if self.skipped() {
            Cell::new("NOT RUN").fg(Color::Yellow)
        } else {
            Cell::new("FAIL").fg(Color::Red)
        };
        let detail = self
            .failure_reason
            .as_ref()
            .map(|reason| reason.to_string())
            .unwrap_or_default();

        vec![
            Cell::new(&self.case_id),
            Cell::new(self.bucket),
            verdict,
            Cell::new(self.duration_ms),
            Cell::new(detail),
        ]
    }
}

fn table<T: TableDisplay>(rows: &[T]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(T::headers());
    for row in rows {
        table.add_row(row.row());
    }
    table
}

/// Print a list of rows
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No cases found.");
        return;
    }

    match format {
        OutputFormat::Table => println!("{}", table(items)),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
    }
}

/// Print the verdicts and the summary line
pub fn print_report(report: &SuiteReport, format: OutputFormat) {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        return;
    }

    if !report.results.is_empty() {
        println!("{}", table(&report.results));
    }

    let summary = format!(
        "{} passed, {} failed, {} not run of {} ({} ms, {} quiescence)",
        report.passed, report.failed, report.skipped, report.total, report.duration_ms, report.strategy
    );
    if report.success() {
        print_success(&summary);
    } else {
        print_error(&summary);
    }
    if let Some(fatal) = &report.fatal {
        print_error(&format!("Run aborted: {}", fatal));
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✅".green(), message.green());
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "❌".red(), message.red());
}

/// Print info message
pub fn print_info(message: &str) {
    println!("ℹ️  {}", message);
}
