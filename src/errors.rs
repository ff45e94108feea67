use std::path::PathBuf;

use thiserror::Error;

/// Problems detected before any external process is started.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{}", missing_checkpoint_dir(.0))]
    MissingCheckpointDir(Option<PathBuf>),

    #[error(
        "No checkpoint found in '{}'. Run a full backup with the same checkpoint_dir before an incremental one.",
        .0.display()
    )]
    MissingCheckpoint(PathBuf),

    #[error("Incremental backups are only supported by the xtrabackup engine (got {0})")]
    IncrementalUnsupported(String),

    #[error("Could not locate '{0}'. Install it or set its path under 'utilities' in the config.")]
    UtilityNotFound(String),

    #[error(
        "Entries #{first} and #{second} in 'databases' would both write '{file}'; give each a distinct 'id'"
    )]
    DuplicateDumpFile {
        file: String,
        first: usize,
        second: usize,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn missing_checkpoint_dir(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(
            "Checkpoint directory '{}' does not exist. Create it before starting a new full backup lineage.",
            path.display()
        ),
        None => "Incremental backups require 'checkpoint_dir' to be set".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A pipeline ran and at least one of its stages failed.
    #[error("{0}")]
    Execution(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AppError {
    #[cfg(test)]
    pub fn is_config(&self) -> bool {
        matches!(self, AppError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
