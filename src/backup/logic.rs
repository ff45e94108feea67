use chrono::Local;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::backup::compressor::Compressor;
use crate::backup::engine::{self, BuildContext, DumpCommand};
use crate::backup::pipeline::{PipelineOrchestrator, PipelineStage};
use crate::backup::{DumpLocation, privilege, report, validator};
use crate::config::{AppConfig, BackupConfig};
use crate::errors::{self, ConfigError};

/// Everything needed to run one database's pipeline, resolved up front.
#[derive(Debug, Clone)]
pub struct DumpPlan {
    pub label: String,
    pub location: DumpLocation,
    pub dump: PipelineStage,
    pub compression: Option<PipelineStage>,
    pub orchestrator: PipelineOrchestrator,
    /// The dump stage with secrets masked, for logs and `check`.
    pub redacted_script: String,
}

impl DumpPlan {
    /// Stage scripts in run order with the dump stage redacted.
    pub fn describe(&self) -> (Vec<String>, PathBuf) {
        let (mut stages, artifact) = self.orchestrator.assemble(
            self.dump.clone(),
            self.compression.clone(),
            &self.location.stem(),
        );
        stages[0].script = self.redacted_script.clone();
        (stages.into_iter().map(|s| s.script).collect(), artifact)
    }
}

/// Validation, utility lookup and command synthesis. Nothing is started
/// here, so every configuration problem surfaces before any process runs.
pub fn plan_database_backup(
    app_config: &AppConfig,
    config: &BackupConfig,
    compressor: Option<&dyn Compressor>,
) -> Result<DumpPlan, ConfigError> {
    validator::validate(config)?;

    let utilities = &app_config.utilities;
    let location = DumpLocation::new(app_config.dump_path(), config.dump_filename());
    let ctx = BuildContext {
        utilities,
        location: &location,
    };
    let DumpCommand { script, extension } = engine::build(config, &ctx)?;

    let sudo = match &config.sudo_user {
        Some(_) => utilities.resolve("sudo")?,
        None => String::new(),
    };
    let sudo_user = config.sudo_user.as_deref();
    let dump = PipelineStage::new(config.engine.to_string(), privilege::wrap(script.render(), &sudo, sudo_user))
        .with_extension(extension);
    let redacted_script = privilege::wrap(script.render_redacted(), &sudo, sudo_user);

    let mut compression = None;
    if let Some(compressor) = compressor {
        compressor.compress_with(&mut |command, ext| {
            compression = Some(PipelineStage::new("compressor", command).with_extension(ext));
        });
    }

    Ok(DumpPlan {
        label: config.label(),
        location,
        dump,
        compression,
        orchestrator: PipelineOrchestrator::new(utilities.resolve("cat")?),
        redacted_script,
    })
}

/// Runs one database backup end to end and returns the artifact path.
pub async fn perform_backup_orchestration(
    app_config: &AppConfig,
    config: &BackupConfig,
    compressor: Option<&dyn Compressor>,
) -> errors::Result<PathBuf> {
    let started_at = Local::now();
    info!("{} Started...", config.label());

    let plan = plan_database_backup(app_config, config, compressor)?;
    debug!(script = %plan.redacted_script, "dump stage");

    tokio::fs::create_dir_all(&plan.location.dir).await?;

    let DumpPlan {
        label,
        location,
        dump,
        compression,
        orchestrator,
        ..
    } = plan;
    let result = tokio::task::spawn_blocking(move || {
        orchestrator.run(dump, compression, &location.stem())
    })
    .await?;

    report::report(&label, started_at, &result)?;
    Ok(result.artifact)
}
