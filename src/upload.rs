use std::path::Path;
use std::process::Command;

use crate::error::{PipelineError, Result};
use crate::models::UploadConfig;

/// Hands the final output file to whatever delivers it downstream.
pub trait Uploader {
    fn upload(&self, path: &Path) -> Result<()>;
}

/// Runs an external program as `<command> <args...> <path>`.
#[derive(Debug, Clone)]
pub struct CommandUploader {
    command: String,
    args: Vec<String>,
}

impl CommandUploader {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }
}

impl Uploader for CommandUploader {
    fn upload(&self, path: &Path) -> Result<()> {
        tracing::info!(command = %self.command, file = %path.display(), "uploading");
        let status = Command::new(&self.command)
            .args(&self.args)
            .arg(path)
            .status()?;

        if !status.success() {
            return Err(PipelineError::UploadFailed {
                command: self.command.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}
