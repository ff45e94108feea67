use super::{BuildContext, CommandBuilder, DumpCommand, connectivity_options, credential_options, quiet};
use crate::config::BackupConfig;
use crate::errors::ConfigError;
use crate::utils::shell::{Quote, ShellCommand};

/// `xtrabackup --backup --stream=xbstream`, full or incremental.
pub struct Xtrabackup;

impl CommandBuilder for Xtrabackup {
    fn build(&self, config: &BackupConfig, ctx: &BuildContext<'_>) -> Result<DumpCommand, ConfigError> {
        let mut cmd = ShellCommand::new(ctx.utilities.resolve("xtrabackup")?);
        cmd = credential_options(cmd, config);
        cmd = connectivity_options(cmd, config);
        cmd = cmd
            .raws(config.additional_options.iter().cloned())
            .raw("--backup")
            .raw("--stream=xbstream");

        if let Some(dir) = &config.checkpoint_dir {
            cmd = cmd.opt("--extra-lsndir", dir.display().to_string(), Quote::Double);
        }
        if config.incremental {
            let dir = config
                .checkpoint_dir
                .as_ref()
                .ok_or(ConfigError::MissingCheckpointDir(None))?;
            cmd = cmd.opt("--incremental-basedir", dir.display().to_string(), Quote::Double);
        }

        Ok(DumpCommand {
            script: quiet(cmd, config).into(),
            extension: "xbstream",
        })
    }
}
