//! Per-stage diagnostics and the run-scoped log handle.
//!
//! Each stage reports what it could not do as a [`Diagnostic`]. The kind
//! decides whether the run continues with a default or aborts. The
//! [`RunLog`] is created once per run and threaded through every stage; it
//! forwards to `tracing` and optionally mirrors lines into a run log file.

use chrono::Local;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::models::ExclusionReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A referenced field is absent from a table.
    MissingColumn,
    /// A reference lookup came out empty.
    EmptyMapping,
    /// The escalation tracker could not be used for this run.
    TrackerUnavailable,
    /// A date or number did not parse.
    UnparsableValue,
    /// A stage received no rows.
    EmptyScope,
    /// The primary input table could not be read.
    UnreadableInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    ContinueWithDefault,
    Abort,
}

impl DiagnosticKind {
    pub fn recovery(&self) -> Recovery {
        match self {
            DiagnosticKind::UnreadableInput => Recovery::Abort,
            _ => Recovery::ContinueWithDefault,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub stage: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
        }
    }

    pub fn missing_column(stage: &'static str, field: &str) -> Self {
        Self::new(
            DiagnosticKind::MissingColumn,
            stage,
            format!("{} column not found", field),
        )
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.recovery() == Recovery::Abort
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:?}: {}", self.stage, self.kind, self.message)
    }
}

/// Row accounting for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: &'static str,
    pub before: usize,
    pub after: usize,
    pub excluded: BTreeMap<ExclusionReason, usize>,
    pub skipped: bool,
}

impl StageReport {
    pub fn new(stage: &'static str, before: usize, after: usize) -> Self {
        Self {
            stage,
            before,
            after,
            excluded: BTreeMap::new(),
            skipped: false,
        }
    }

    pub fn skipped(stage: &'static str, rows: usize) -> Self {
        Self {
            skipped: true,
            ..Self::new(stage, rows, rows)
        }
    }

    pub fn with_excluded(mut self, reason: ExclusionReason, count: usize) -> Self {
        if count > 0 {
            *self.excluded.entry(reason).or_insert(0) += count;
        }
        self
    }

    pub fn removed(&self) -> usize {
        self.before - self.after
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return write!(f, "{}: skipped ({} rows)", self.stage, self.before);
        }
        write!(
            f,
            "{}: {} -> {} rows (removed {})",
            self.stage,
            self.before,
            self.after,
            self.removed()
        )?;
        for (reason, count) in &self.excluded {
            write!(f, " {}={}", reason, count)?;
        }
        Ok(())
    }
}

/// Logging handle scoped to a single run.
pub struct RunLog {
    path: Option<PathBuf>,
    file: Option<BufWriter<File>>,
    stages: Vec<StageReport>,
    diagnostics: Vec<Diagnostic>,
}

impl RunLog {
    /// A log that only emits `tracing` events.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            file: None,
            stages: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// A log that also appends to `<dir>/run_<timestamp>.txt`.
    pub fn to_directory(dir: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("run_{}.txt", Local::now().format("%Y%m%d_%H%M%S")));
        let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path: Some(path),
            file: Some(BufWriter::new(file)),
            stages: Vec::new(),
            diagnostics: Vec::new(),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{}", message);
        self.write_line("INFO", message);
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!("{}", message);
        self.write_line("WARN", message);
    }

    pub fn record_stage(&mut self, report: StageReport) {
        if report.skipped {
            tracing::info!(stage = report.stage, rows = report.before, "stage skipped");
        } else {
            tracing::info!(
                stage = report.stage,
                before = report.before,
                after = report.after,
                removed = report.removed(),
                "stage complete"
            );
        }
        self.write_line("STAGE", &report.to_string());
        self.stages.push(report);
    }

    pub fn diagnose(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_fatal() {
            tracing::error!(stage = diagnostic.stage, "{}", diagnostic.message);
            self.write_line("ERROR", &diagnostic.to_string());
        } else {
            tracing::warn!(stage = diagnostic.stage, "{}", diagnostic.message);
            self.write_line("WARN", &diagnostic.to_string());
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn stages(&self) -> &[StageReport] {
        &self.stages
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.flush() {
                tracing::warn!("could not flush run log: {}", e);
            }
        }
    }

    fn write_line(&mut self, level: &str, message: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let stamp = Local::now().format("%H:%M:%S");
        if let Err(e) = writeln!(file, "[{}] {} {}", stamp, level, message) {
            tracing::warn!("could not write run log: {}", e);
            self.file = None;
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unreadable_input_aborts() {
        assert_eq!(DiagnosticKind::UnreadableInput.recovery(), Recovery::Abort);
        for kind in [
            DiagnosticKind::MissingColumn,
            DiagnosticKind::EmptyMapping,
            DiagnosticKind::TrackerUnavailable,
            DiagnosticKind::UnparsableValue,
            DiagnosticKind::EmptyScope,
        ] {
            assert_eq!(kind.recovery(), Recovery::ContinueWithDefault);
        }
    }

    #[test]
    fn stage_report_display_lists_reasons() {
        let report = StageReport::new("filters", 10, 7)
            .with_excluded(ExclusionReason::WcPayer, 2)
            .with_excluded(ExclusionReason::VisitStatus, 1)
            .with_excluded(ExclusionReason::Escalation, 0);
        assert_eq!(report.removed(), 3);
        assert_eq!(
            report.to_string(),
            "filters: 10 -> 7 rows (removed 3) visit_status=1 wc_payer=2"
        );
    }

    #[test]
    fn run_log_writes_file_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let mut log = RunLog::to_directory(dir.path()).unwrap();
            log.info("started");
            log.record_stage(StageReport::skipped("escalation", 4));
            log.diagnose(Diagnostic::missing_column("workable", "Visit Type"));
            assert_eq!(log.stages().len(), 1);
            assert_eq!(log.diagnostics().len(), 1);
            log.path().unwrap().to_path_buf()
        };
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("INFO started"));
        assert!(content.contains("STAGE escalation: skipped (4 rows)"));
        assert!(content.contains("WARN [workable] MissingColumn: Visit Type column not found"));
    }
}
