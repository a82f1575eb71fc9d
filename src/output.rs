//! Projection onto the upload template plus the audit and debug artifacts.

use csv::Writer;
use std::path::Path;

use crate::agents::AGENT_COLUMN;
use crate::allocation::{GROUP_COLUMN, PRIORITY_COLUMN, SEQ_COLUMN};
use crate::dates;
use crate::diagnostics::{Diagnostic, RunLog, StageReport};
use crate::error::Result;
use crate::headers::sanitize_header;
use crate::models::{ExcludedRow, Table, DEFAULT_ORGANIZATION};
use crate::reference::LOCATION_COLUMN;

pub const ORGANIZATION_FIELD: &str = "Organization";
pub const REASON_COLUMN: &str = "reason";

const DEBUG_COLUMNS: [&str; 11] = [
    "Patient Account Number",
    "Patient Acct No",
    "Patient Name",
    "Appointment Provider Name",
    LOCATION_COLUMN,
    "Appointment Date",
    "Visit Type",
    GROUP_COLUMN,
    PRIORITY_COLUMN,
    SEQ_COLUMN,
    AGENT_COLUMN,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    Constant(String),
    Column(String),
    AllocationCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputField {
    pub target: String,
    pub source: FieldSource,
    pub is_date: bool,
}

impl OutputField {
    fn column(target: &str, source: &str) -> Self {
        Self {
            target: target.to_string(),
            source: FieldSource::Column(source.to_string()),
            is_date: false,
        }
    }

    fn date(target: &str, source: &str) -> Self {
        Self {
            is_date: true,
            ..Self::column(target, source)
        }
    }
}

/// Target fields in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    pub fields: Vec<OutputField>,
}

impl Default for OutputSchema {
    fn default() -> Self {
        Self::with_organization(DEFAULT_ORGANIZATION)
    }
}

impl OutputSchema {
    pub fn with_organization(organization: &str) -> Self {
        let fields = vec![
            OutputField {
                target: ORGANIZATION_FIELD.to_string(),
                source: FieldSource::Constant(organization.to_string()),
                is_date: false,
            },
            OutputField::column("Primary Insurance Name", "Primary Insurance Name"),
            OutputField::column("Provider Name", "Appointment Provider Name"),
            OutputField::column("Primary Insurance ID", "Primary Insurance Subscriber No"),
            OutputField::column("Patient Account Number", "Patient Acct No"),
            OutputField::column("Patient Name", "Patient Name"),
            OutputField::date("DOB", "Patient DOB"),
            OutputField::date("Date of Service", "Appointment Date"),
            OutputField::column("Visit Type", "Visit Type"),
            OutputField::column("Appointment Location", LOCATION_COLUMN),
            OutputField::column("Appointment Time", "Appointment Start Time"),
            OutputField::column("Physician NPI", "Appointment Provider NPI"),
            OutputField::column("Secondary Insurance Name", "Secondary Insurance Name"),
            OutputField::column("Secondary Insurance ID", "Secondary Insurance Subscriber No"),
            OutputField::column("Tertiary Insurance Name", "Tertiary Insurance Name"),
            OutputField::column("Tertiary Insurance ID", "Tertiary Insurance Subscriber No"),
            OutputField {
                target: PRIORITY_COLUMN.to_string(),
                source: FieldSource::AllocationCode,
                is_date: false,
            },
        ];
        Self { fields }
    }

    /// Project `table` onto the schema. The organization field always comes
    /// first; missing source columns produce empty columns.
    pub fn build(&self, table: &Table, log: &mut RunLog) -> Table {
        const STAGE: &str = "output";
        let mut fields: Vec<&OutputField> = self.fields.iter().collect();
        // stable: only the organization field moves
        fields.sort_by_key(|f| sanitize_header(&f.target).trim() != ORGANIZATION_FIELD);

        let mut columns: Vec<Vec<String>> = Vec::with_capacity(fields.len());
        for field in &fields {
            let source = match &field.source {
                FieldSource::Constant(value) => {
                    columns.push(vec![value.clone(); table.len()]);
                    continue;
                }
                FieldSource::AllocationCode => PRIORITY_COLUMN,
                FieldSource::Column(name) => name.as_str(),
            };
            let Some(idx) = table.find_column(source) else {
                log.diagnose(Diagnostic::missing_column(STAGE, source));
                columns.push(vec![String::new(); table.len()]);
                continue;
            };
            columns.push(
                table
                    .rows
                    .iter()
                    .map(|row| {
                        if field.is_date {
                            dates::format_us_date(&row[idx])
                        } else {
                            row[idx].clone()
                        }
                    })
                    .collect(),
            );
        }

        let headers = fields
            .iter()
            .map(|f| sanitize_header(&f.target).trim().to_string())
            .collect();
        let rows = (0..table.len())
            .map(|r| columns.iter().map(|col| col[r].clone()).collect())
            .collect();

        log.record_stage(StageReport::new(STAGE, table.len(), table.len()));
        Table { headers, rows }
    }
}

/// The excluded-rows audit table: working headers plus a `reason` column.
pub fn audit_table(headers: &[String], excluded: &[ExcludedRow]) -> Table {
    let mut out_headers = headers.to_vec();
    out_headers.push(REASON_COLUMN.to_string());
    let rows = excluded
        .iter()
        .map(|row| {
            let mut values = row.values.clone();
            values.resize(headers.len(), String::new());
            values.push(row.reason.as_str().to_string());
            values
        })
        .collect();
    Table {
        headers: out_headers,
        rows,
    }
}

/// The identity and allocation columns of the final working table.
pub fn debug_trace(table: &Table) -> Table {
    table.select(&DEBUG_COLUMNS)
}

pub fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
