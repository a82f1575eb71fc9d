//! Stage orchestration for one run.
//!
//! [`run`] works on in-memory tables; [`run_from_files`] adds the loader and
//! the artifact writers around it.

use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

use crate::agents::AgentAssignor;
use crate::allocation::{AllocationEngine, ScopeSummary};
use crate::diagnostics::{Diagnostic, DiagnosticKind, RunLog};
use crate::error::{PipelineError, Result};
use crate::escalation;
use crate::filters;
use crate::headers;
use crate::loader::TableLoader;
use crate::models::{default_agents, Config, ExcludedRow, Table, DEFAULT_CYCLE_SIZE};
use crate::output::{self, OutputSchema};
use crate::reference::{self, ReferenceMap};

pub const WARNINGS_FILE: &str = "warnings.csv";
pub const DEBUG_FILE: &str = "allocation_debug.csv";

/// Everything a run needs besides the tables themselves.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub cycle_size: usize,
    pub agents: Vec<String>,
    pub schema: OutputSchema,
    /// Insurance codes for the pre-clean stage; `None` disables it.
    pub preclean_codes: Option<Vec<String>>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            cycle_size: DEFAULT_CYCLE_SIZE,
            agents: default_agents(),
            schema: OutputSchema::default(),
            preclean_codes: None,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cycle_size: config.allocation.cycle_size,
            agents: config.agents.clone(),
            schema: OutputSchema::with_organization(&config.organization),
            preclean_codes: config
                .preclean
                .enabled
                .then(|| config.preclean.insurance_codes.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Projected onto the output schema.
    pub output: Table,
    /// Excluded rows with their reason tag.
    pub audit: Table,
    pub debug: Table,
    /// Working table after allocation and agent assignment.
    pub allocated: Table,
    pub scopes: Vec<ScopeSummary>,
    pub excluded_count: usize,
}

impl PipelineOutput {
    pub fn processed_count(&self) -> usize {
        self.output.len()
    }
}

/// Paths of the written artifacts plus row counts, for the CLI summary.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output_path: PathBuf,
    pub warnings_path: PathBuf,
    pub debug_path: PathBuf,
    pub processed_count: usize,
    pub excluded_count: usize,
    pub scopes: Vec<ScopeSummary>,
}

/// Run every stage over an already loaded primary table.
pub fn run(
    raw: Table,
    help: Option<&Table>,
    tracker: Option<&Table>,
    settings: &PipelineSettings,
    log: &mut RunLog,
) -> Result<PipelineOutput> {
    let engine = AllocationEngine::new(settings.cycle_size)?;
    let assignor = AgentAssignor::new(settings.agents.clone())?;

    log.info(format!("Loaded {} rows", raw.len()));
    let table = headers::normalize_table(raw);
    let reference = ReferenceMap::from_help_table(help, log);
    let table = reference::enrich(table, &reference, log);
    let audit_headers = table.headers.clone();

    let mut excluded: Vec<ExcludedRow> = Vec::new();
    let table = match &settings.preclean_codes {
        Some(codes) => {
            let step = filters::preclean(table, codes, log);
            excluded.extend(step.excluded);
            step.retained
        }
        None => table,
    };

    let step = filters::run_chain(table, &reference, log);
    excluded.extend(step.excluded);
    let step = escalation::apply(step.retained, tracker, log);
    excluded.extend(step.excluded);

    let allocation = engine.allocate(step.retained, log);
    let allocated = assignor.assign(allocation.table, log);
    let output = settings.schema.build(&allocated, log);
    let audit = output::audit_table(&audit_headers, &excluded);
    let debug = output::debug_trace(&allocated);

    log.info(format!(
        "Processed {} rows, excluded {}",
        output.len(),
        excluded.len()
    ));
    Ok(PipelineOutput {
        output,
        audit,
        debug,
        allocated,
        scopes: allocation.scopes,
        excluded_count: excluded.len(),
    })
}

/// Load the configured inputs, run the pipeline and write the artifacts.
///
/// Only an unreadable primary input aborts. Help and tracker files that
/// cannot be read disable their stages for this run.
pub fn run_from_files(config: &Config, log: &mut RunLog) -> Result<RunSummary> {
    let loader = TableLoader::new();

    let raw = match loader.load_file(Path::new(&config.input_file)) {
        Ok(table) => table,
        Err(e) => {
            let diagnostic = Diagnostic::new(
                DiagnosticKind::UnreadableInput,
                "load",
                format!("cannot read {}: {}", config.input_file, e),
            );
            log.diagnose(diagnostic.clone());
            return Err(PipelineError::Aborted(diagnostic));
        }
    };

    let help = config.help_file.as_deref().and_then(|path| {
        loader
            .load_file(Path::new(path))
            .map_err(|e| log.warn(format!("Help file {} unavailable: {}", path, e)))
            .ok()
    });

    let tracker = config.escalation_file.as_deref().and_then(|path| {
        loader
            .load_file(Path::new(path))
            .map_err(|e| {
                log.diagnose(Diagnostic::new(
                    DiagnosticKind::TrackerUnavailable,
                    "escalation",
                    format!("cannot read tracker {}: {}", path, e),
                ))
            })
            .ok()
    });

    let settings = PipelineSettings::from_config(config);
    let result = run(raw, help.as_ref(), tracker.as_ref(), &settings, log)?;

    let output_dir = Path::new(config.output_dir());
    fs::create_dir_all(output_dir)?;
    let output_path = output_dir.join(format!(
        "HX_Final_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    let warnings_path = output_dir.join(WARNINGS_FILE);
    let debug_path = output_dir.join(DEBUG_FILE);

    output::write_csv(&result.output, &output_path)?;
    output::write_csv(&result.audit, &warnings_path)?;
    output::write_csv(&result.debug, &debug_path)?;
    log.info(format!("Wrote {}", output_path.display()));
    log.flush();

    Ok(RunSummary {
        output_path,
        warnings_path,
        debug_path,
        processed_count: result.processed_count(),
        excluded_count: result.excluded_count,
        scopes: result.scopes,
    })
}
