//! Lookups built from the help sheet, and the enrichment step that applies
//! them to the working table.

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{Diagnostic, DiagnosticKind, RunLog, StageReport};
use crate::headers::{self, ColumnBinding, FieldAliases};
use crate::models::{normalize_key, Table};

const STAGE: &str = "reference";
const ENRICH_STAGE: &str = "enrichment";

pub const LOCATION_COLUMN: &str = "Appointment Location";
pub const WORKABLE_COLUMN: &str = "Workable Status";

const HELP_PROVIDER: FieldAliases = FieldAliases {
    name: "Provider",
    exact: &[],
    contains: &["provider"],
};

const HELP_LOCATION: FieldAliases = FieldAliases {
    name: "State/Location",
    exact: &[],
    contains: &["state", "location"],
};

const HELP_VISIT_TYPE: FieldAliases = FieldAliases {
    name: "Visit Type",
    exact: &[],
    contains: &["visit type"],
};

const HELP_WORKABLE: FieldAliases = FieldAliases {
    name: "Workable",
    exact: &[],
    contains: &["workable"],
};

const HELP_PRIMARY_INSURANCE: FieldAliases = FieldAliases {
    name: "Primary Insurance Name",
    exact: &[],
    contains: &["primary insurance name"],
};

/// Read-only lookups shared by every later stage. Keys are normalized with
/// [`normalize_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMap {
    pub provider_to_location: HashMap<String, String>,
    pub visit_type_to_workable: HashMap<String, String>,
    pub excluded_insurance: HashSet<String>,
}

impl ReferenceMap {
    /// Build the lookups from an (optional) help table. A missing table or
    /// column leaves the matching lookup empty and logs a warning.
    pub fn from_help_table(help: Option<&Table>, log: &mut RunLog) -> Self {
        let Some(help) = help else {
            log.diagnose(Diagnostic::new(
                DiagnosticKind::EmptyMapping,
                STAGE,
                "no help table available - location, workable and insurance rules disabled",
            ));
            return Self::default();
        };

        let help = headers::normalize_table(help.clone());
        let provider_col = resolve(&HELP_PROVIDER, &help, log);
        let location_col = resolve(&HELP_LOCATION, &help, log);
        let visit_type_col = resolve(&HELP_VISIT_TYPE, &help, log);
        let workable_col = resolve(&HELP_WORKABLE, &help, log);
        let insurance_col = resolve(&HELP_PRIMARY_INSURANCE, &help, log);

        let mut map = Self::default();

        if let (Some(p), Some(l)) = (provider_col, location_col) {
            for row in &help.rows {
                let provider = row[p].trim();
                if !provider.is_empty() {
                    map.provider_to_location
                        .insert(provider.to_uppercase(), row[l].trim().to_string());
                }
            }
        }

        if let (Some(v), Some(w)) = (visit_type_col, workable_col) {
            for row in &help.rows {
                let visit_type = row[v].trim();
                if !visit_type.is_empty() {
                    map.visit_type_to_workable
                        .insert(visit_type.to_uppercase(), normalize_key(&row[w]));
                }
            }
        }

        if let Some(i) = insurance_col {
            map.excluded_insurance = help
                .rows
                .iter()
                .map(|row| normalize_key(&row[i]))
                .filter(|name| !name.is_empty())
                .collect();
        }

        log.info(format!(
            "Help table: {} provider locations, {} visit type workable flags, {} excluded insurances",
            map.provider_to_location.len(),
            map.visit_type_to_workable.len(),
            map.excluded_insurance.len()
        ));
        map
    }

    pub fn location_for(&self, provider: &str) -> Option<&str> {
        self.provider_to_location
            .get(&normalize_key(provider))
            .map(String::as_str)
    }

    pub fn workable_for(&self, visit_type: &str) -> Option<&str> {
        self.visit_type_to_workable
            .get(&normalize_key(visit_type))
            .map(String::as_str)
    }

    pub fn is_excluded_insurance(&self, insurance: &str) -> bool {
        self.excluded_insurance.contains(&normalize_key(insurance))
    }
}

fn resolve(field: &FieldAliases, help: &Table, log: &mut RunLog) -> Option<usize> {
    let idx = field.resolve(&help.headers);
    if idx.is_none() {
        log.diagnose(Diagnostic::missing_column(STAGE, field.name));
    }
    idx
}

/// Append the derived location and workable columns.
///
/// Location comes from the provider lookup. Rows the lookup cannot place
/// (no provider column, unknown provider, empty lookup) keep the value of an
/// existing location/state column.
pub fn enrich(mut table: Table, reference: &ReferenceMap, log: &mut RunLog) -> Table {
    let binding = ColumnBinding::bind(&table.headers);
    if binding.provider.is_none() {
        log.diagnose(Diagnostic::missing_column(ENRICH_STAGE, headers::PROVIDER.name));
    }

    let locations: Vec<String> = (0..table.len())
        .map(|row| {
            reference
                .location_for(table.cell(row, binding.provider))
                .unwrap_or_else(|| table.cell(row, binding.location).trim())
                .to_string()
        })
        .collect();

    let workable: Vec<String> = (0..table.len())
        .map(|row| {
            reference
                .workable_for(table.cell(row, binding.visit_type))
                .unwrap_or("")
                .to_string()
        })
        .collect();

    let unmapped = locations.iter().filter(|l| l.is_empty()).count();
    if unmapped > 0 {
        log.warn(format!("{} rows have no appointment location", unmapped));
    }

    table.push_column(LOCATION_COLUMN, locations);
    table.push_column(WORKABLE_COLUMN, workable);
    log.record_stage(StageReport::new(ENRICH_STAGE, table.len(), table.len()));
    table
}
