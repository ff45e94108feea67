// mysql-dumper/src/backup/report.rs
use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::backup::pipeline::PipelineResult;
use crate::errors::{self, AppError};

pub const FAILURE_MARKER: &str = "Dump Failed!";

/// Stages that wrote to stderr, in declared order, with the trimmed text.
pub fn stderr_notes(result: &PipelineResult) -> Vec<(&str, &str)> {
    result
        .stages
        .iter()
        .map(|s| (s.label.as_str(), s.stderr.trim()))
        .filter(|(_, stderr)| !stderr.is_empty())
        .collect()
}

/// Turns a finished pipeline into the run's outcome.
///
/// Failure becomes an execution error carrying every failed stage's
/// diagnostics. On success anything the stages wrote to stderr is logged
/// as a warning before the run is announced as finished.
pub fn report(label: &str, started_at: DateTime<Local>, result: &PipelineResult) -> errors::Result<()> {
    if !result.success {
        for stage in result.stages.iter().filter(|s| !s.success) {
            warn!(stage = %stage.label, status = ?stage.status, "pipeline stage failed");
        }
        return Err(AppError::Execution(format!(
            "{}\n{}",
            FAILURE_MARKER, result.diagnostics
        )));
    }

    for (stage, stderr) in stderr_notes(result) {
        warn!(stage = %stage, "{}", stderr);
    }

    let elapsed = Local::now().signed_duration_since(started_at);
    info!(
        artifact = %result.artifact.display(),
        elapsed_secs = elapsed.num_seconds(),
        "{} Finished!",
        label
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::pipeline::{PipelineOrchestrator, PipelineStage};

    #[test]
    fn test_failure_carries_marker_and_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let result = PipelineOrchestrator::new("cat").run(
            PipelineStage::new("mysqldump", "echo 'Got error: 1045' >&2; exit 2"),
            None,
            &dir.path().join("MySQL"),
        );

        let err = report("Database::MySQL", Local::now(), &result).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Dump Failed!\n"));
        assert!(message.contains("Got error: 1045"));
        assert!(!err.is_config());
    }

    #[test]
    fn test_success_returns_control() {
        let dir = tempfile::tempdir().unwrap();
        let result = PipelineOrchestrator::new("cat").run(
            PipelineStage::new("mysqldump", "echo ok"),
            None,
            &dir.path().join("MySQL"),
        );
        assert!(report("Database::MySQL", Local::now(), &result).is_ok());
    }

    #[test]
    fn test_success_keeps_stage_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let result = PipelineOrchestrator::new("cat").run(
            PipelineStage::new("mysqldump", "echo 'Warning: Using a password' >&2; echo data"),
            Some(PipelineStage::new("compressor", "cat")),
            &dir.path().join("MySQL"),
        );

        assert!(report("Database::MySQL", Local::now(), &result).is_ok());
        assert_eq!(
            stderr_notes(&result),
            [("mysqldump", "Warning: Using a password")]
        );
    }
}
