//! 📊 progress.rs: "Are we there yet?" -- every pipeline, every time, forever.
//!
//! Two things live here:
//! - `LoadProgress`: an indicatif spinner counting lines as they are enqueued. Hidden
//!   automatically when stderr is not a terminal, so log files stay clean.
//! - `RunReport`: the end-of-run comfy-table, one row per file plus a total.
//!
//! ⚠️ Warning: Watching this spinner will not make it go faster. We've tried. Science says no.

use std::path::{Path, PathBuf};
use std::time::Duration;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};
use indicatif::{ProgressBar, ProgressStyle};

use crate::stats::LoadCounters;

/// 🔢 "1000000" → "1,000,000". You're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// 🌀 Spinner for one file being decompressed into the queue. Clone-able, Send-able,
/// because the reading happens on a blocking thread and the bar has to go with it.
#[derive(Debug, Clone)]
pub(crate) struct LoadProgress {
    progress_bar: ProgressBar,
}

impl LoadProgress {
    pub(crate) fn new(file: &Path) -> Self {
        let progress_bar = ProgressBar::new_spinner();
        // -- 🐛 template is hardcoded, but we still refuse to unwrap it
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}] {human_pos} lines ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        progress_bar.set_style(style);
        progress_bar.set_message(file.display().to_string());
        progress_bar.enable_steady_tick(Duration::from_millis(120));
        Self { progress_bar }
    }

    pub(crate) fn line_enqueued(&self) {
        self.progress_bar.inc(1);
    }

    pub(crate) fn finish(&self) {
        self.progress_bar.finish_and_clear();
    }
}

/// 📜 One row of the end-of-run table.
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub path: PathBuf,
    pub counters: LoadCounters,
}

/// 🍽️ Everything the run did, per file, ready to be judged and tabulated.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub files: Vec<FileReport>,
    pub normal_error_rate: f64,
}

impl RunReport {
    pub(crate) fn new(normal_error_rate: f64) -> Self {
        Self {
            files: Vec::new(),
            normal_error_rate,
        }
    }

    /// ➕ Sum of every file's counters.
    pub fn total(&self) -> LoadCounters {
        let mut total = LoadCounters::default();
        for file in &self.files {
            total.merge(file.counters);
        }
        total
    }

    /// ✅ One run-level verdict, from the aggregated totals.
    pub fn is_acceptable(&self) -> bool {
        self.total().is_acceptable(self.normal_error_rate)
    }

    /// 🍽️ Render the summary. Five columns, one row per file, a total at the bottom.
    pub fn render_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["file", "processed", "errors", "error rate", "verdict"]);

        for file in &self.files {
            table.add_row(self.row(&file.path.display().to_string(), file.counters));
        }
        table.add_row(self.row("TOTAL", self.total()));
        table
    }

    fn row(&self, label: &str, counters: LoadCounters) -> Vec<Cell> {
        let verdict = if counters.is_acceptable(self.normal_error_rate) {
            "✅ ok"
        } else {
            "💀 failed"
        };
        vec![
            Cell::new(label),
            Cell::new(format_number(counters.processed)).set_alignment(CellAlignment::Right),
            Cell::new(format_number(counters.errors)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.4}", counters.error_rate())).set_alignment(CellAlignment::Right),
            Cell::new(verdict),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn the_one_where_the_run_is_judged_on_its_totals() {
        let mut report = RunReport::new(0.01);
        report.files.push(FileReport {
            path: PathBuf::from("a.tsv.gz"),
            counters: LoadCounters { processed: 1000, errors: 0 },
        });
        report.files.push(FileReport {
            path: PathBuf::from("b.tsv.gz"),
            counters: LoadCounters { processed: 10, errors: 5 },
        });

        assert_eq!(report.total(), LoadCounters { processed: 1010, errors: 5 });
        assert!(report.is_acceptable());

        let rendered = report.render_table().to_string();
        assert!(rendered.contains("a.tsv.gz"));
        assert!(rendered.contains("TOTAL"));
        assert!(rendered.contains("1,010"));
    }

    #[test]
    fn the_one_where_an_empty_run_is_not_a_success() {
        assert!(!RunReport::new(0.01).is_acceptable());
    }
}
