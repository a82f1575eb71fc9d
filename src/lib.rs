//! Filter-and-allocation pipeline for appointment verification exports.

pub mod agents;
pub mod allocation;
pub mod dates;
pub mod diagnostics;
pub mod error;
pub mod escalation;
pub mod filters;
pub mod headers;
pub mod loader;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod reference;
pub mod upload;

pub use error::{PipelineError, Result};
pub use models::{Config, Table};
