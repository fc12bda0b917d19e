//! Reporters for finished runs.
//!
//! Reporters see the whole [`Results`] table once, after the last test.
//! Output is written in complete lines under a lock so concurrent runs in
//! one process never interleave mid-line.

use crate::config::{CompareMode, PrintOptions};
use crate::error::CronometroError;
use crate::result::{Results, TestResult};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

/// Something that consumes the results of a run.
pub trait Reporter: Send + Sync {
    fn report(&self, results: &Results) -> Result<(), CronometroError>;
}

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const GRAY: &str = "\x1b[90m";

/// Colors assigned to successful tests in print order, cycling.
const PALETTE: [&str; 8] = [
    "\x1b[31m", // red
    "\x1b[32m", // green
    "\x1b[33m", // yellow
    "\x1b[34m", // blue
    "\x1b[35m", // magenta
    "\x1b[36m", // cyan
    "\x1b[37m", // white
    "\x1b[90m", // gray
];

/// Prints one line per test, slowest first.
///
/// ```text
///   single: 1234.56 ops/s ± 0.42 %
/// multiple: Skipped since it threw errors.
/// ```
///
/// With `compare` each successful line also shows how much faster the test
/// is than the reference test chosen by [`CompareMode`].
pub struct ConsoleReporter {
    options: PrintOptions,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleReporter {
    /// Print to stdout.
    pub fn new(options: PrintOptions) -> Self {
        Self::with_sink(options, std::io::stdout())
    }

    /// Print to an arbitrary writer.
    pub fn with_sink(options: PrintOptions, sink: impl Write + Send + 'static) -> Self {
        Self {
            options,
            sink: Mutex::new(Box::new(sink)),
        }
    }

    /// Render the report without writing it.
    pub fn render(&self, results: &Results) -> Vec<String> {
        let mut entries: Vec<(&str, &TestResult)> = results.iter().collect();
        // Stable: equal means keep submission order. Failures (mean 0) sink to the bottom.
        entries.sort_by(|(_, a), (_, b)| b.mean.total_cmp(&a.mean));

        let rows = self.rows(&entries);
        let name_width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0);
        let ops_width = rows.iter().map(|r| r.ops.len()).max().unwrap_or(0);
        let err_width = rows.iter().map(|r| r.error.len()).max().unwrap_or(0);

        let mut color_index = 0;
        rows.iter()
            .map(|row| {
                let label = format!("{:>nw$}:", row.name, nw = name_width);
                if !row.success {
                    return self.paint(
                        GRAY,
                        &format!("{} Skipped since it threw errors.", label),
                    );
                }

                let color = PALETTE[color_index % PALETTE.len()];
                color_index += 1;

                let mut line = format!(
                    "{} {} {}",
                    self.paint(color, &label),
                    self.paint(BOLD, &format!("{:>ow$} ops/s", row.ops, ow = ops_width)),
                    self.paint(GRAY, &format!("± {:>ew$} %", row.error, ew = err_width)),
                );

                if self.options.compare {
                    line.push_str(" |");
                    if let Some((relative, reference)) = &row.relative {
                        line.push_str(&format!(
                            " {} than {}",
                            self.paint(GREEN, &self.paint(BOLD, &format!("{} % faster", relative))),
                            reference
                        ));
                    }
                }
                line
            })
            .collect()
    }

    fn rows<'a>(&self, entries: &[(&'a str, &TestResult)]) -> Vec<Row<'a>> {
        let mut reference: Option<(&str, f64)> = None;

        entries
            .iter()
            .map(|&(name, result)| {
                let (Some(ops), Some(error)) = (result.ops_per_sec(), result.relative_error()) else {
                    return Row {
                        name,
                        success: false,
                        ops: String::new(),
                        error: String::new(),
                        relative: None,
                    };
                };

                let relative = reference.and_then(|(ref_name, ref_mean)| {
                    let pct = (ref_mean / result.mean - 1.0) * 100.0;
                    // Anything that prints as zero is not worth a comparison.
                    (pct.abs() >= 0.005).then(|| (format!("{:.2}", pct), ref_name.to_string()))
                });

                match self.options.compare_mode {
                    CompareMode::Base if reference.is_none() => reference = Some((name, result.mean)),
                    CompareMode::Base => {}
                    CompareMode::Previous => reference = Some((name, result.mean)),
                }

                Row {
                    name,
                    success: true,
                    ops: format!("{:.2}", ops),
                    error: format!("{:.2}", error),
                    relative,
                }
            })
            .collect()
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.options.colors {
            format!("{}{}{}", code, text, RESET)
        } else {
            text.to_string()
        }
    }
}

struct Row<'a> {
    name: &'a str,
    success: bool,
    ops: String,
    error: String,
    relative: Option<(String, String)>,
}

impl Reporter for ConsoleReporter {
    fn report(&self, results: &Results) -> Result<(), CronometroError> {
        let mut output = self.render(results).join("\n");
        output.push('\n');

        // Ignore poison: a panicked writer leaves no partial line we care about.
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        sink.write_all(output.as_bytes())
            .and_then(|_| sink.flush())
            .map_err(|e| CronometroError::Report(e.to_string()))
    }
}

/// Writes the results table as pretty JSON to `<dir>/latest.json`.
///
/// The file can be read back with [`Results::load`].
pub struct JsonReporter {
    output_dir: PathBuf,
}

impl JsonReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.output_dir.join("latest.json")
    }

    fn write_results(&self, results: &Results) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let json = serde_json::to_string_pretty(results).map_err(std::io::Error::other)?;
        let path = self.latest_path();
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

impl Reporter for JsonReporter {
    fn report(&self, results: &Results) -> Result<(), CronometroError> {
        let path = self
            .write_results(results)
            .map_err(|e| CronometroError::Report(format!("{}: {}", self.output_dir.display(), e)))?;
        info!(path = %path.display(), "results written");
        Ok(())
    }
}

/// Fans a report out to several reporters.
///
/// A failing or panicking reporter is logged and does not stop the others.
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }

    pub fn push(&mut self, reporter: Box<dyn Reporter>) {
        self.reporters.push(reporter);
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl Reporter for MultiReporter {
    fn report(&self, results: &Results) -> Result<(), CronometroError> {
        for r in &self.reporters {
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| r.report(results))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "reporter failed"),
                Err(_) => warn!("reporter panicked"),
            }
        }
        Ok(())
    }
}
