use super::{BuildContext, CommandBuilder, DumpCommand, connectivity_options, credential_options, quiet};
use crate::config::BackupConfig;
use crate::errors::ConfigError;
use crate::utils::shell::{Quote, ShellCommand, ShellScript};

/// `innobackupex`: copy into the staging directory, optionally apply the
/// log, then stream the directory out as a tar archive.
///
/// The staging directory is created by the copy phase and deleted by tar
/// (`--remove-files`) as it is archived.
pub struct Innobackupex;

impl CommandBuilder for Innobackupex {
    fn build(&self, config: &BackupConfig, ctx: &BuildContext<'_>) -> Result<DumpCommand, ConfigError> {
        let innobackupex = ctx.utilities.resolve("innobackupex")?;
        let tar = ctx.utilities.resolve("tar")?;
        let staging_dir = ctx.location.staging_dir().display().to_string();

        let mut create = ShellCommand::new(innobackupex.as_str());
        create = credential_options(create, config);
        create = connectivity_options(create, config);
        create = create
            .raws(config.additional_options.iter().cloned())
            .raw("--no-timestamp")
            .value(staging_dir.as_str(), Quote::Single);
        let mut script = ShellScript::new().then(quiet(create, config));

        if config.prepare_after_create {
            let prepare = ShellCommand::new(innobackupex.as_str())
                .raw("--apply-log")
                .value(staging_dir.as_str(), Quote::Single)
                .raws(config.prepare_options.iter().cloned());
            script = script.then(quiet(prepare, config));
        }

        let archive = ShellCommand::new(tar)
            .raw("--remove-files")
            .raw("-cf")
            .raw("-")
            .raw("-C")
            .value(ctx.location.dir.display().to_string(), Quote::Single)
            .value(ctx.location.staging_dir_name(), Quote::Single);

        Ok(DumpCommand {
            script: script.then(archive),
            extension: "tar",
        })
    }
}
