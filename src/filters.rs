//! The ordered row filters.
//!
//! Every filter moves rows out of the working table into the excluded set
//! with a reason tag; nothing is dropped silently. A filter whose column is
//! missing lets every row through and records a diagnostic.

use crate::diagnostics::{Diagnostic, DiagnosticKind, RunLog, StageReport};
use crate::headers::{self, ColumnBinding};
use crate::models::{ExcludedRow, ExclusionReason, Table};
use crate::reference::{ReferenceMap, LOCATION_COLUMN, WORKABLE_COLUMN};

const STATUS_MARKERS: [&str; 2] = ["escalated on smartsheet", "escalated on teams"];
const CATEGORIZATION_MARKERS: [&str; 1] = ["phreesia"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub retained: Table,
    pub excluded: Vec<ExcludedRow>,
}

impl FilterOutcome {
    fn pass_through(table: Table) -> Self {
        Self {
            retained: table,
            excluded: Vec::new(),
        }
    }
}

/// Move every row matching `excluded_if` out of `table`, keeping row order.
fn split<F>(table: Table, reason: ExclusionReason, mut excluded_if: F) -> FilterOutcome
where
    F: FnMut(&[String]) -> bool,
{
    let Table { headers, rows } = table;
    let before = rows.len();
    let mut retained = Vec::with_capacity(before);
    let mut excluded = Vec::new();
    for row in rows {
        if excluded_if(&row) {
            excluded.push(ExcludedRow { values: row, reason });
        } else {
            retained.push(row);
        }
    }
    debug_assert_eq!(retained.len() + excluded.len(), before);
    FilterOutcome {
        retained: Table {
            headers,
            rows: retained,
        },
        excluded,
    }
}

fn finish(
    stage: &'static str,
    reason: ExclusionReason,
    before: usize,
    outcome: FilterOutcome,
    log: &mut RunLog,
) -> FilterOutcome {
    log.record_stage(
        StageReport::new(stage, before, outcome.retained.len())
            .with_excluded(reason, outcome.excluded.len()),
    );
    outcome
}

fn skip(stage: &'static str, table: Table, diagnostic: Diagnostic, log: &mut RunLog) -> FilterOutcome {
    log.diagnose(diagnostic);
    log.record_stage(StageReport::skipped(stage, table.len()));
    FilterOutcome::pass_through(table)
}

fn cell(row: &[String], column: usize) -> &str {
    row.get(column).map(String::as_str).unwrap_or("")
}

/// Keep only rows whose visit status starts with `PEN` or `PR`.
pub fn visit_status(table: Table, log: &mut RunLog) -> FilterOutcome {
    const STAGE: &str = "visit_status";
    let Some(col) = ColumnBinding::bind(&table.headers).visit_status else {
        return skip(STAGE, table, Diagnostic::missing_column(STAGE, headers::VISIT_STATUS.name), log);
    };
    let before = table.len();
    let outcome = split(table, ExclusionReason::VisitStatus, |row| {
        let status = cell(row, col).trim().to_uppercase();
        !(status.starts_with("PEN") || status.starts_with("PR"))
    });
    if outcome.retained.is_empty() && before > 0 {
        log.warn("visit status filter removed every row");
    }
    finish(STAGE, ExclusionReason::VisitStatus, before, outcome, log)
}

/// Drop workers' compensation payers: primary insurance containing `WC`.
pub fn wc_payer(table: Table, log: &mut RunLog) -> FilterOutcome {
    const STAGE: &str = "wc_payer";
    let Some(col) = ColumnBinding::bind(&table.headers).primary_insurance else {
        return skip(STAGE, table, Diagnostic::missing_column(STAGE, headers::PRIMARY_INSURANCE.name), log);
    };
    let before = table.len();
    let outcome = split(table, ExclusionReason::WcPayer, |row| {
        cell(row, col).to_uppercase().contains("WC")
    });
    finish(STAGE, ExclusionReason::WcPayer, before, outcome, log)
}

/// Drop rows whose visit type maps to exactly `N`. Unmapped visit types stay.
pub fn workable(table: Table, reference: &ReferenceMap, log: &mut RunLog) -> FilterOutcome {
    const STAGE: &str = "workable";
    if reference.visit_type_to_workable.is_empty() {
        return skip(
            STAGE,
            table,
            Diagnostic::new(
                DiagnosticKind::EmptyMapping,
                STAGE,
                "visit type to workable mapping not available",
            ),
            log,
        );
    }
    let Some(col) = ColumnBinding::bind(&table.headers).visit_type else {
        return skip(STAGE, table, Diagnostic::missing_column(STAGE, headers::VISIT_TYPE.name), log);
    };
    let before = table.len();
    let outcome = split(table, ExclusionReason::WorkableN, |row| {
        reference
            .workable_for(cell(row, col))
            .map(|flag| flag.eq_ignore_ascii_case("N"))
            .unwrap_or(false)
    });
    finish(STAGE, ExclusionReason::WorkableN, before, outcome, log)
}

/// Drop rows whose primary insurance is listed in the help table.
pub fn excluded_insurance(table: Table, reference: &ReferenceMap, log: &mut RunLog) -> FilterOutcome {
    const STAGE: &str = "excluded_insurance";
    if reference.excluded_insurance.is_empty() {
        return skip(
            STAGE,
            table,
            Diagnostic::new(
                DiagnosticKind::EmptyMapping,
                STAGE,
                "no excluded insurance names available",
            ),
            log,
        );
    }
    let Some(col) = ColumnBinding::bind(&table.headers).primary_insurance else {
        return skip(STAGE, table, Diagnostic::missing_column(STAGE, headers::PRIMARY_INSURANCE.name), log);
    };
    let before = table.len();
    let outcome = split(table, ExclusionReason::ExcludedInsurance, |row| {
        reference.is_excluded_insurance(cell(row, col))
    });
    finish(STAGE, ExclusionReason::ExcludedInsurance, before, outcome, log)
}

/// Drop rows already escalated elsewhere or handled through Phreesia.
///
/// Status columns (other than visit status) are checked for the escalation
/// markers; categorization columns for the Phreesia marker.
pub fn status_categorization(table: Table, log: &mut RunLog) -> FilterOutcome {
    const STAGE: &str = "status_categorization";
    let visit_status = ColumnBinding::bind(&table.headers).visit_status;
    let checks: Vec<(usize, &[&str])> = table
        .headers
        .iter()
        .enumerate()
        .flat_map(|(idx, header)| {
            let lower = header.to_lowercase();
            let mut found: Vec<(usize, &[&str])> = Vec::new();
            if lower.contains("status") && Some(idx) != visit_status {
                found.push((idx, &STATUS_MARKERS[..]));
            }
            if lower.contains("categorization") {
                found.push((idx, &CATEGORIZATION_MARKERS[..]));
            }
            found
        })
        .collect();

    if checks.is_empty() {
        log.record_stage(StageReport::skipped(STAGE, table.len()));
        return FilterOutcome::pass_through(table);
    }

    let before = table.len();
    let outcome = split(table, ExclusionReason::StatusCategorization, |row| {
        checks.iter().any(|(col, markers)| {
            let value = cell(row, *col).to_lowercase();
            markers.iter().any(|marker| value.contains(marker))
        })
    });
    finish(STAGE, ExclusionReason::StatusCategorization, before, outcome, log)
}

/// Optional cleanup run before the main chain: rows without a derived
/// location, rows whose workable status is `N` or `#N/A`, and rows whose
/// primary insurance is one of the given codes.
pub fn preclean(table: Table, insurance_codes: &[String], log: &mut RunLog) -> FilterOutcome {
    const STAGE: &str = "preclean";
    let before = table.len();
    let location = table.column_index(LOCATION_COLUMN);
    let workable = table.column_index(WORKABLE_COLUMN);
    let insurance = ColumnBinding::bind(&table.headers).primary_insurance;

    let mut by_location = split(table, ExclusionReason::MissingLocation, |row| {
        let value = location.map(|c| cell(row, c).trim()).unwrap_or("");
        value.is_empty() || value == "#N/A"
    });

    let by_workable = split(by_location.retained, ExclusionReason::WorkableN, |row| {
        let value = workable.map(|c| cell(row, c).trim().to_uppercase()).unwrap_or_default();
        value == "N" || value == "#N/A"
    });

    let by_code = match insurance {
        Some(col) => split(by_workable.retained, ExclusionReason::InsuranceCode, |row| {
            let value = cell(row, col).trim();
            insurance_codes.iter().any(|code| code == value)
        }),
        None => {
            log.diagnose(Diagnostic::missing_column(STAGE, headers::PRIMARY_INSURANCE.name));
            FilterOutcome::pass_through(by_workable.retained)
        }
    };

    log.record_stage(
        StageReport::new(STAGE, before, by_code.retained.len())
            .with_excluded(ExclusionReason::MissingLocation, by_location.excluded.len())
            .with_excluded(ExclusionReason::WorkableN, by_workable.excluded.len())
            .with_excluded(ExclusionReason::InsuranceCode, by_code.excluded.len()),
    );
    by_location.excluded.extend(by_workable.excluded);
    by_location.excluded.extend(by_code.excluded);
    FilterOutcome {
        retained: by_code.retained,
        excluded: by_location.excluded,
    }
}

/// Run the five main filters in order, accumulating exclusions.
pub fn run_chain(table: Table, reference: &ReferenceMap, log: &mut RunLog) -> FilterOutcome {
    let mut excluded = Vec::new();

    let step = visit_status(table, log);
    excluded.extend(step.excluded);
    let step = wc_payer(step.retained, log);
    excluded.extend(step.excluded);
    let step = workable(step.retained, reference, log);
    excluded.extend(step.excluded);
    let step = excluded_insurance(step.retained, reference, log);
    excluded.extend(step.excluded);
    let step = status_categorization(step.retained, log);
    excluded.extend(step.excluded);

    FilterOutcome {
        retained: step.retained,
        excluded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: [&str; 6] = [
        "Patient Acct No",
        "Visit Type",
        "Visit Status",
        "Primary Insurance Name",
        "Claim Status",
        "Categorization",
    ];

    fn row(values: [&str; 6]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn table(rows: Vec<Vec<String>>) -> Table {
        Table::from_rows(HEADERS.iter().map(|h| h.to_string()).collect(), rows)
    }

    fn reference() -> ReferenceMap {
        let mut map = ReferenceMap::default();
        map.visit_type_to_workable.insert("TELE".into(), "N".into());
        map.visit_type_to_workable.insert("OFFICE".into(), "Y".into());
        map.visit_type_to_workable.insert("LAB".into(), "NO".into());
        map.excluded_insurance.insert("MEDICAID".into());
        map
    }

    fn accounts(table: &Table) -> Vec<&str> {
        table.rows.iter().map(|r| r[0].as_str()).collect()
    }

    #[test]
    fn visit_status_keeps_pen_and_pr_prefixes() {
        let mut log = RunLog::in_memory();
        let input = table(vec![
            row(["1", "", " pen : pending", "", "", ""]),
            row(["2", "", "PR : Pending Referral", "", "", ""]),
            row(["3", "", "INS VER : Insurance Verified", "", "", ""]),
            row(["4", "", "", "", "", ""]),
        ]);
        let out = visit_status(input, &mut log);
        assert_eq!(accounts(&out.retained), vec!["1", "2"]);
        assert_eq!(out.excluded.len(), 2);
        assert!(out.excluded.iter().all(|e| e.reason == ExclusionReason::VisitStatus));
        assert_eq!(log.stages()[0].before, 4);
        assert_eq!(log.stages()[0].after, 2);
    }

    #[test]
    fn wc_payer_matches_anywhere_case_insensitive() {
        let mut log = RunLog::in_memory();
        let input = table(vec![
            row(["1", "", "", "BCBS WC OF TX", "", ""]),
            row(["2", "", "", "bcbs wc", "", ""]),
            row(["3", "", "", "Aetna", "", ""]),
        ]);
        let out = wc_payer(input, &mut log);
        assert_eq!(accounts(&out.retained), vec!["3"]);
        assert_eq!(out.excluded[0].reason, ExclusionReason::WcPayer);
    }

    #[test]
    fn workable_excludes_only_exact_n() {
        let mut log = RunLog::in_memory();
        let input = table(vec![
            row(["1", "Tele", "", "", "", ""]),
            row(["2", "office", "", "", "", ""]),
            row(["3", "lab", "", "", "", ""]),
            row(["4", "Unmapped", "", "", "", ""]),
        ]);
        let out = workable(input, &reference(), &mut log);
        assert_eq!(accounts(&out.retained), vec!["2", "3", "4"]);
        assert_eq!(out.excluded.len(), 1);
        assert_eq!(out.excluded[0].values[0], "1");
    }

    #[test]
    fn workable_without_mapping_is_skipped() {
        let mut log = RunLog::in_memory();
        let input = table(vec![row(["1", "Tele", "", "", "", ""])]);
        let out = workable(input, &ReferenceMap::default(), &mut log);
        assert_eq!(out.retained.len(), 1);
        assert!(log.stages()[0].skipped);
        assert_eq!(log.diagnostics()[0].kind, DiagnosticKind::EmptyMapping);
    }

    #[test]
    fn excluded_insurance_uses_normalized_names() {
        let mut log = RunLog::in_memory();
        let input = table(vec![
            row(["1", "", "", " medicaid ", "", ""]),
            row(["2", "", "", "Medicaid Plus", "", ""]),
        ]);
        let out = excluded_insurance(input, &reference(), &mut log);
        assert_eq!(accounts(&out.retained), vec!["2"]);
        assert_eq!(out.excluded[0].reason, ExclusionReason::ExcludedInsurance);
    }

    #[test]
    fn status_and_categorization_markers() {
        let mut log = RunLog::in_memory();
        let input = table(vec![
            row(["1", "", "Escalated on Teams", "", "", ""]),
            row(["2", "", "", "", "ESCALATED ON SMARTSHEET", ""]),
            row(["3", "", "", "", "", "via phreesia"]),
            row(["4", "", "", "", "Phreesia", "Escalated on Teams"]),
        ]);
        let out = status_categorization(input, &mut log);
        // visit status is not re-checked; a marker in the wrong column does not count
        assert_eq!(accounts(&out.retained), vec!["1", "4"]);
        assert_eq!(out.excluded.len(), 2);
    }

    #[test]
    fn missing_column_passes_everything_through() {
        let mut log = RunLog::in_memory();
        let input = Table::from_rows(vec!["Other".to_string()], vec![vec!["x".to_string()]]);
        let out = visit_status(input, &mut log);
        assert_eq!(out.retained.len(), 1);
        assert!(out.excluded.is_empty());
        assert_eq!(log.diagnostics()[0].kind, DiagnosticKind::MissingColumn);
    }

    #[test]
    fn chain_accounts_for_every_row() {
        let mut log = RunLog::in_memory();
        let input = table(vec![
            row(["1", "Office", "PEN", "Aetna", "", ""]),
            row(["2", "Office", "DONE", "Aetna", "", ""]),
            row(["3", "Office", "PEN", "WC Comp", "", ""]),
            row(["4", "Tele", "PEN", "Aetna", "", ""]),
            row(["5", "Office", "PR", "Medicaid", "", ""]),
            row(["6", "Office", "PR", "Aetna", "Escalated on Teams", ""]),
            row(["7", "New", "PR", "Aetna", "", ""]),
        ]);
        let out = run_chain(input, &reference(), &mut log);
        assert_eq!(out.retained.len() + out.excluded.len(), 7);
        assert_eq!(accounts(&out.retained), vec!["1", "7"]);
        let reasons: Vec<_> = out.excluded.iter().map(|e| e.reason).collect();
        assert_eq!(
            reasons,
            vec![
                ExclusionReason::VisitStatus,
                ExclusionReason::WcPayer,
                ExclusionReason::WorkableN,
                ExclusionReason::ExcludedInsurance,
                ExclusionReason::StatusCategorization,
            ]
        );
        for report in log.stages() {
            assert_eq!(report.before - report.after, report.excluded.values().sum::<usize>());
        }
    }

    #[test]
    fn preclean_drops_missing_location_and_codes() {
        let mut log = RunLog::in_memory();
        let mut input = table(vec![
            row(["1", "", "", "Aetna", "", ""]),
            row(["2", "", "", "Aetna", "", ""]),
            row(["3", "", "", " L107 ", "", ""]),
            row(["4", "", "", "Aetna", "", ""]),
        ]);
        input.push_column(
            LOCATION_COLUMN,
            vec!["TX".into(), "".into(), "FL".into(), "#N/A".into()],
        );
        let codes = vec!["L105".to_string(), "L107".to_string()];
        let out = preclean(input, &codes, &mut log);
        assert_eq!(accounts(&out.retained), vec!["1"]);
        let reasons: Vec<_> = out.excluded.iter().map(|e| e.reason).collect();
        assert_eq!(
            reasons,
            vec![
                ExclusionReason::MissingLocation,
                ExclusionReason::MissingLocation,
                ExclusionReason::InsuranceCode,
            ]
        );
    }

    #[test]
    fn preclean_drops_workable_n_and_na() {
        let mut log = RunLog::in_memory();
        let mut input = table(vec![
            row(["1", "", "", "Aetna", "", ""]),
            row(["2", "", "", "Aetna", "", ""]),
            row(["3", "", "", "Aetna", "", ""]),
            row(["4", "", "", "Aetna", "", ""]),
        ]);
        input.push_column(LOCATION_COLUMN, vec!["TX".into(); 4]);
        input.push_column(
            WORKABLE_COLUMN,
            vec!["Y".into(), " n ".into(), "#N/A".into(), "".into()],
        );
        let out = preclean(input, &[], &mut log);
        assert_eq!(accounts(&out.retained), vec!["1", "4"]);
        assert!(out.excluded.iter().all(|e| e.reason == ExclusionReason::WorkableN));
        assert_eq!(log.stages()[0].excluded[&ExclusionReason::WorkableN], 2);
    }
}
