use std::collections::HashMap;

use crate::diagnostics::{Diagnostic, RunLog, StageReport};
use crate::error::{PipelineError, Result};
use crate::headers::{self, ColumnBinding};
use crate::models::Table;

pub const AGENT_COLUMN: &str = "Assigned Agent";

/// Round-robin over a fixed agent pool, keyed by first appearance of each
/// provider in row order. A provider never spans two agents within a run.
pub struct AgentAssignor {
    pool: Vec<String>,
}

impl AgentAssignor {
    pub fn new(pool: Vec<String>) -> Result<Self> {
        if pool.is_empty() {
            return Err(PipelineError::EmptyAgentPool);
        }
        Ok(Self { pool })
    }

    /// Provider to agent mapping for providers in the given order.
    pub fn build_mapping<'a, I>(&self, providers: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut mapping = HashMap::new();
        let mut counter = 0usize;
        for provider in providers {
            if !mapping.contains_key(provider) {
                mapping.insert(
                    provider.to_string(),
                    self.pool[counter % self.pool.len()].clone(),
                );
                counter += 1;
            }
        }
        mapping
    }

    /// Append the assigned agent column.
    pub fn assign(&self, mut table: Table, log: &mut RunLog) -> Table {
        const STAGE: &str = "agents";
        let provider_col = ColumnBinding::bind(&table.headers).provider;
        if provider_col.is_none() {
            log.diagnose(Diagnostic::missing_column(STAGE, headers::PROVIDER.name));
        }

        let mapping = self.build_mapping((0..table.len()).map(|row| table.cell(row, provider_col)));
        let agents: Vec<String> = (0..table.len())
            .map(|row| mapping[table.cell(row, provider_col)].clone())
            .collect();

        log.info(format!(
            "Assigned {} providers across {} agents",
            mapping.len(),
            self.pool.len()
        ));
        table.push_column(AGENT_COLUMN, agents);
        log.record_stage(StageReport::new(STAGE, table.len(), table.len()));
        table
    }
}
