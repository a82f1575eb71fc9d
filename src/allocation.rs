//! Allocation priority assignment.
//!
//! Rows are split into New-Patient and Follow-Up groups. NP rows form one
//! scope; FU rows form one scope per appointment location, taken in
//! ascending location order. Each scope is sorted and then cut into
//! `cycle_size` contiguous buckets whose sizes differ by at most one. The
//! bucket number becomes the sequence in the priority code (`NP003`).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::dates;
use crate::diagnostics::{Diagnostic, DiagnosticKind, RunLog, StageReport};
use crate::error::{PipelineError, Result};
use crate::headers::ColumnBinding;
use crate::models::{AllocationGroup, Table};

pub const GROUP_COLUMN: &str = "Allocation Group";
pub const SEQ_COLUMN: &str = "Allocation Seq";
pub const PRIORITY_COLUMN: &str = "Allocation Priority";

const STAGE: &str = "allocation";

/// Sizes of the `cycle_size` buckets for a scope of `total` rows: the first
/// `total % cycle_size` buckets get one extra row.
pub fn bucket_sizes(total: usize, cycle_size: usize) -> Vec<usize> {
    if cycle_size == 0 {
        return Vec::new();
    }
    let base = total / cycle_size;
    let extra = total % cycle_size;
    (0..cycle_size)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

/// Sequence number (1-based) for each position of a sorted scope.
pub fn sequence_numbers(total: usize, cycle_size: usize) -> Vec<usize> {
    bucket_sizes(total, cycle_size)
        .into_iter()
        .enumerate()
        .flat_map(|(i, size)| std::iter::repeat(i + 1).take(size))
        .collect()
}

/// `NP003`-style code. Empty without a group or a sequence.
pub fn priority_code(group: Option<AllocationGroup>, seq: Option<usize>) -> String {
    match (group, seq) {
        (Some(group), Some(seq)) => format!("{}{:03}", group.code(), seq),
        _ => String::new(),
    }
}

/// One bucketed population, for logging and the debug trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSummary {
    pub group: AllocationGroup,
    /// `None` for the global NP scope.
    pub location: Option<String>,
    pub bucket_sizes: Vec<usize>,
}

impl ScopeSummary {
    pub fn total(&self) -> usize {
        self.bucket_sizes.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub table: Table,
    pub scopes: Vec<ScopeSummary>,
}

pub struct AllocationEngine {
    cycle_size: usize,
}

impl AllocationEngine {
    pub fn new(cycle_size: usize) -> Result<Self> {
        if cycle_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "allocation cycle size must be at least 1".to_string(),
            ));
        }
        Ok(Self { cycle_size })
    }

    /// Assign group, sequence and priority code to every row.
    ///
    /// The output holds the same rows as the input, NP scope first, then FU
    /// scopes in location order, with three columns appended.
    pub fn allocate(&self, table: Table, log: &mut RunLog) -> Allocation {
        let binding = ColumnBinding::bind(&table.headers);
        let total = table.len();
        self.check_dates(&table, &binding, log);

        let Table { mut headers, rows } = table;

        let mut new_patients = Vec::new();
        let mut follow_ups: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
        for row in rows {
            match AllocationGroup::from_visit_type(sort_key(&row, binding.visit_type)) {
                AllocationGroup::NewPatient => new_patients.push(row),
                AllocationGroup::FollowUp => follow_ups
                    .entry(sort_key(&row, binding.location).to_string())
                    .or_default()
                    .push(row),
            }
        }

        let mut out_rows = Vec::with_capacity(total);
        let mut scopes = Vec::new();

        if !new_patients.is_empty() {
            new_patients.sort_by(|a, b| compare_fields(a, b, binding.location, binding.provider));
            scopes.push(self.emit(AllocationGroup::NewPatient, None, new_patients, &mut out_rows));
        }

        for (location, mut scope) in follow_ups {
            scope.sort_by(|a, b| compare_fields(a, b, binding.provider, binding.location));
            scopes.push(self.emit(AllocationGroup::FollowUp, Some(location), scope, &mut out_rows));
        }

        if total == 0 {
            log.diagnose(Diagnostic::new(
                DiagnosticKind::EmptyScope,
                STAGE,
                "no rows left to allocate",
            ));
        }
        for scope in &scopes {
            log.info(format!(
                "{} scope {}: {} rows, buckets {:?}",
                scope.group,
                scope.location.as_deref().unwrap_or("(all locations)"),
                scope.total(),
                scope.bucket_sizes
            ));
        }

        headers.push(GROUP_COLUMN.to_string());
        headers.push(SEQ_COLUMN.to_string());
        headers.push(PRIORITY_COLUMN.to_string());
        log.record_stage(StageReport::new(STAGE, total, out_rows.len()));

        Allocation {
            table: Table {
                headers,
                rows: out_rows,
            },
            scopes,
        }
    }

    fn emit(
        &self,
        group: AllocationGroup,
        location: Option<String>,
        scope: Vec<Vec<String>>,
        out: &mut Vec<Vec<String>>,
    ) -> ScopeSummary {
        let sizes = bucket_sizes(scope.len(), self.cycle_size);
        let sequence = sequence_numbers(scope.len(), self.cycle_size);
        for (mut row, seq) in scope.into_iter().zip(sequence) {
            row.push(group.code().to_string());
            row.push(seq.to_string());
            row.push(priority_code(Some(group), Some(seq)));
            out.push(row);
        }
        ScopeSummary {
            group,
            location,
            bucket_sizes: sizes,
        }
    }

    // Dates are parsed for reporting only; they are not part of the sort key.
    fn check_dates(&self, table: &Table, binding: &ColumnBinding, log: &mut RunLog) {
        let Some(col) = binding.date_of_service else {
            return;
        };
        let unparsable = table
            .rows
            .iter()
            .filter(|row| dates::parse_date(&row[col]).is_none())
            .count();
        if unparsable > 0 {
            log.diagnose(Diagnostic::new(
                DiagnosticKind::UnparsableValue,
                STAGE,
                format!("{} rows have an unparsable date of service (kept)", unparsable),
            ));
        }
    }
}

fn sort_key(row: &[String], col: Option<usize>) -> &str {
    col.and_then(|c| row.get(c)).map(String::as_str).unwrap_or("")
}

/// Compare two rows by one column, then another. Missing columns compare as
/// empty strings.
fn compare_fields(a: &[String], b: &[String], first: Option<usize>, second: Option<usize>) -> Ordering {
    sort_key(a, first)
        .cmp(sort_key(b, first))
        .then_with(|| sort_key(a, second).cmp(sort_key(b, second)))
}
