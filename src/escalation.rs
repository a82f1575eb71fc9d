//! Removal of accounts already escalated in an external tracker.

use std::collections::HashSet;

use crate::diagnostics::{Diagnostic, DiagnosticKind, RunLog, StageReport};
use crate::filters::FilterOutcome;
use crate::headers::{self, ColumnBinding};
use crate::models::{ExcludedRow, ExclusionReason, Table};

const STAGE: &str = "escalation";

/// Tracker headers accepted for the account column, in priority order.
pub const TRACKER_ACCOUNT_HEADERS: [&str; 5] = [
    "acc#",
    "account number",
    "account",
    "acc",
    "patient account number",
];

const PLACEHOLDERS: [&str; 4] = ["", "nan", "none", "null"];

/// Trimmed account numbers from the tracker, without blanks or placeholders.
/// `None` when no accepted account header is present.
pub fn tracker_accounts(tracker: &Table) -> Option<HashSet<String>> {
    let normalized: Vec<String> = tracker
        .headers
        .iter()
        .map(|h| headers::normalize_header(h).to_lowercase())
        .collect();
    let col = TRACKER_ACCOUNT_HEADERS
        .iter()
        .find_map(|name| normalized.iter().position(|h| h == name))?;

    Some(
        tracker
            .rows
            .iter()
            .map(|row| row[col].trim().to_string())
            .filter(|account| !PLACEHOLDERS.contains(&account.to_lowercase().as_str()))
            .collect(),
    )
}

/// Drop working rows whose account number appears in the tracker. Every
/// problem with the tracker skips the stage instead of failing the run.
pub fn apply(table: Table, tracker: Option<&Table>, log: &mut RunLog) -> FilterOutcome {
    let skip = |table: Table, log: &mut RunLog, diagnostic: Option<Diagnostic>| {
        if let Some(diagnostic) = diagnostic {
            log.diagnose(diagnostic);
        }
        log.record_stage(StageReport::skipped(STAGE, table.len()));
        FilterOutcome {
            retained: table,
            excluded: Vec::new(),
        }
    };

    let Some(tracker) = tracker else {
        log.info("No escalation tracker provided - skipping escalation filter");
        return skip(table, log, None);
    };

    let Some(accounts) = tracker_accounts(tracker) else {
        let diagnostic = Diagnostic::new(
            DiagnosticKind::TrackerUnavailable,
            STAGE,
            format!(
                "account column not found in tracker (looked for {}); available: {}",
                TRACKER_ACCOUNT_HEADERS.join(", "),
                tracker.headers.join(", ")
            ),
        );
        return skip(table, log, Some(diagnostic));
    };

    if accounts.is_empty() {
        let diagnostic = Diagnostic::new(
            DiagnosticKind::TrackerUnavailable,
            STAGE,
            "tracker has no valid account numbers",
        );
        return skip(table, log, Some(diagnostic));
    }

    let Some(col) = ColumnBinding::bind(&table.headers).account_number else {
        let diagnostic = Diagnostic::missing_column(STAGE, headers::ACCOUNT_NUMBER.name);
        return skip(table, log, Some(diagnostic));
    };

    log.info(format!("Loaded {} account numbers from escalation tracker", accounts.len()));

    let before = table.len();
    let Table { headers, rows } = table;
    let (excluded, retained): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .partition(|row| accounts.contains(row[col].trim()));

    let excluded: Vec<ExcludedRow> = excluded
        .into_iter()
        .map(|values| ExcludedRow {
            values,
            reason: ExclusionReason::Escalation,
        })
        .collect();

    log.record_stage(
        StageReport::new(STAGE, before, retained.len())
            .with_excluded(ExclusionReason::Escalation, excluded.len()),
    );
    FilterOutcome {
        retained: Table {
            headers,
            rows: retained,
        },
        excluded,
    }
}
