use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_file: String,
    pub help_file: Option<String>,
    pub escalation_file: Option<String>,
    pub output_directory: Option<String>,
    pub log_directory: Option<String>,
    // Written verbatim into the Organization column of every output row
    pub organization: String,
    pub agents: Vec<String>,
    pub allocation: AllocationConfig,
    pub preclean: PrecleanConfig,
    pub upload: Option<UploadConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    pub cycle_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecleanConfig {
    pub enabled: bool,
    pub insurance_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

pub const DEFAULT_CYCLE_SIZE: usize = 8;
pub const DEFAULT_ORGANIZATION: &str = "Audentes_Verification";

impl Default for Config {
    fn default() -> Self {
        Self {
            input_file: "inputs/ecw_export.csv".to_string(),
            help_file: Some("inputs/help.csv".to_string()),
            escalation_file: None,
            output_directory: Some("outputs".to_string()),
            log_directory: Some("logs".to_string()),
            organization: DEFAULT_ORGANIZATION.to_string(),
            agents: default_agents(),
            allocation: AllocationConfig::default(),
            preclean: PrecleanConfig::default(),
            upload: None,
        }
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            cycle_size: DEFAULT_CYCLE_SIZE,
        }
    }
}

impl Default for PrecleanConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            insurance_codes: ["L105", "L107", "L109C", "L109Q", "L109W"]
                .iter()
                .map(|code| code.to_string())
                .collect(),
        }
    }
}

pub fn default_agents() -> Vec<String> {
    (1..=DEFAULT_CYCLE_SIZE).map(|i| format!("Agent-{}", i)).collect()
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    /// Reject settings no stage can recover from.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.input_file.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("input_file is empty".to_string()));
        }
        if self.allocation.cycle_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "allocation.cycle_size must be at least 1".to_string(),
            ));
        }
        if self.agents.is_empty() {
            return Err(PipelineError::EmptyAgentPool);
        }
        Ok(())
    }

    pub fn output_dir(&self) -> &str {
        self.output_directory.as_deref().unwrap_or("outputs")
    }

    pub fn log_dir(&self) -> &str {
        self.log_directory.as_deref().unwrap_or("logs")
    }
}

/// A whole in-memory sheet. Every cell is text; rows are always as wide as
/// the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Build a table, padding or truncating each row to the header width.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Exact header lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Exact header lookup, falling back to a case-insensitive trimmed match.
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.column_index(name).or_else(|| {
            let wanted = name.trim().to_lowercase();
            self.headers
                .iter()
                .position(|h| h.trim().to_lowercase() == wanted)
        })
    }

    pub fn cell(&self, row: usize, column: Option<usize>) -> &str {
        column
            .and_then(|c| self.rows.get(row).and_then(|r| r.get(c)))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Append a derived column. Replaces the values of an existing column
    /// with the same header instead of duplicating it.
    pub fn push_column(&mut self, name: &str, values: Vec<String>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.headers.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }

    /// Project onto the named columns that exist, in the given order.
    pub fn select(&self, names: &[&str]) -> Table {
        let indices: Vec<usize> = names.iter().filter_map(|n| self.find_column(n)).collect();
        Table {
            headers: indices.iter().map(|&i| self.headers[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        }
    }
}

/// Which filter removed a row. Serialized as the audit `reason` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    MissingLocation,
    InsuranceCode,
    VisitStatus,
    WcPayer,
    WorkableN,
    ExcludedInsurance,
    StatusCategorization,
    Escalation,
}

impl ExclusionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionReason::MissingLocation => "missing_location",
            ExclusionReason::InsuranceCode => "insurance_code",
            ExclusionReason::VisitStatus => "visit_status",
            ExclusionReason::WcPayer => "wc_payer",
            ExclusionReason::WorkableN => "workable_n",
            ExclusionReason::ExcludedInsurance => "excluded_insurance",
            ExclusionReason::StatusCategorization => "status_categorization",
            ExclusionReason::Escalation => "escalation",
        }
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row moved out of the working table, kept for the audit artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedRow {
    pub values: Vec<String>,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AllocationGroup {
    NewPatient,
    FollowUp,
}

impl AllocationGroup {
    /// NP when the visit type mentions "new" anywhere, FU otherwise.
    pub fn from_visit_type(visit_type: &str) -> Self {
        if visit_type.to_lowercase().contains("new") {
            AllocationGroup::NewPatient
        } else {
            AllocationGroup::FollowUp
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AllocationGroup::NewPatient => "NP",
            AllocationGroup::FollowUp => "FU",
        }
    }
}

impl fmt::Display for AllocationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Normalize a lookup key: trimmed and upper-cased.
pub fn normalize_key(value: &str) -> String {
    value.trim().to_uppercase()
}
