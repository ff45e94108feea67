mod logic;
pub(crate) mod compressor;
pub(crate) mod engine;
pub(crate) mod pipeline;
pub(crate) mod privilege;
pub(crate) mod report;
pub(crate) mod validator;

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::AppConfig;

pub use logic::DumpPlan;

/// Where one database's artifact (and hot-copy staging directory) goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpLocation {
    pub dir: PathBuf,
    pub filename: String,
}

impl DumpLocation {
    pub fn new(dir: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        DumpLocation {
            dir: dir.into(),
            filename: filename.into(),
        }
    }

    /// `<dir>/<filename>`; the pipeline appends the extensions.
    pub fn stem(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }

    pub fn staging_dir_name(&self) -> String {
        format!("{}.bkpdir", self.filename)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.dir.join(self.staging_dir_name())
    }
}

/// Public entry point for the backup process.
/// Runs every configured database in order and stops at the first failure.
pub async fn run_backup_flow(app_config: &AppConfig) -> Result<Vec<PathBuf>> {
    let compressor = app_config
        .compressor
        .as_ref()
        .map(|c| compressor::from_config(c, &app_config.utilities))
        .transpose()
        .context("Invalid compressor configuration")?;

    let mut artifacts = Vec::with_capacity(app_config.databases.len());
    for config in &app_config.databases {
        let artifact = logic::perform_backup_orchestration(app_config, config, compressor.as_deref())
            .await
            .with_context(|| format!("{} failed", config.label()))?;
        artifacts.push(artifact);
    }
    Ok(artifacts)
}

/// Resolves every database's pipeline without running anything.
pub fn plan_backup_flow(app_config: &AppConfig) -> Result<Vec<DumpPlan>> {
    let compressor = app_config
        .compressor
        .as_ref()
        .map(|c| compressor::from_config(c, &app_config.utilities))
        .transpose()
        .context("Invalid compressor configuration")?;

    app_config
        .databases
        .iter()
        .map(|config| {
            logic::plan_database_backup(app_config, config, compressor.as_deref())
                .with_context(|| format!("{} is not runnable", config.label()))
        })
        .collect()
}
