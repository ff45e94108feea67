// mysql-dumper/src/backup/validator.rs
use std::path::Path;

use crate::config::{BackupConfig, Engine};
use crate::errors::ConfigError;

/// Written by xtrabackup into `--extra-lsndir`; records the LSN an
/// incremental run continues from.
pub const CHECKPOINT_MARKER: &str = "xtrabackup_checkpoints";

/// Checks the on-disk checkpoint state an xtrabackup run depends on.
///
/// Runs before any command is built. Only reads the filesystem; the marker
/// itself is always produced by the external tool.
pub fn validate(config: &BackupConfig) -> Result<(), ConfigError> {
    if config.engine != Engine::StreamingIncremental {
        return Ok(());
    }

    match (config.checkpoint_dir.as_deref(), config.incremental) {
        (None, true) => Err(ConfigError::MissingCheckpointDir(None)),
        (Some(dir), true) => {
            if has_checkpoint(dir) {
                Ok(())
            } else {
                Err(ConfigError::MissingCheckpoint(dir.to_path_buf()))
            }
        }
        (Some(dir), false) => {
            if dir.is_dir() {
                Ok(())
            } else {
                Err(ConfigError::MissingCheckpointDir(Some(dir.to_path_buf())))
            }
        }
        (None, false) => Ok(()),
    }
}

fn has_checkpoint(dir: &Path) -> bool {
    dir.join(CHECKPOINT_MARKER).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn streaming() -> crate::config::BackupConfigBuilder {
        BackupConfig::builder().engine(Engine::StreamingIncremental)
    }

    #[test]
    fn test_incremental_without_dir_is_rejected() {
        let config = streaming().incremental(true).build().unwrap();
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCheckpointDir(None)));
    }

    #[test]
    fn test_incremental_without_marker_names_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = streaming()
            .incremental(true)
            .checkpoint_dir(dir.path())
            .build()
            .unwrap();

        let err = validate(&config).unwrap_err();
        assert!(matches!(&err, ConfigError::MissingCheckpoint(path) if path == dir.path()));
        let message = err.to_string();
        assert!(message.contains(&dir.path().display().to_string()));
        assert!(message.contains("full backup"));
    }

    #[test]
    fn test_incremental_with_marker_passes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CHECKPOINT_MARKER), "backup_type = full-backuped\n").unwrap();
        let config = streaming()
            .incremental(true)
            .checkpoint_dir(dir.path())
            .build()
            .unwrap();

        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_full_run_requires_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("lineage");
        let config = streaming().checkpoint_dir(&missing).build().unwrap();

        let err = validate(&config).unwrap_err();
        assert!(matches!(&err, ConfigError::MissingCheckpointDir(Some(path)) if *path == missing));
        assert!(err.to_string().contains(&missing.display().to_string()));

        fs::create_dir(&missing).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_plain_streaming_run_needs_nothing() {
        assert!(validate(&streaming().build().unwrap()).is_ok());
    }

    #[test]
    fn test_other_engines_skip_the_check() {
        let config = BackupConfig::builder()
            .engine(Engine::HotCopy)
            .checkpoint_dir("/definitely/not/here")
            .build()
            .unwrap();
        assert!(validate(&config).is_ok());
    }
}
