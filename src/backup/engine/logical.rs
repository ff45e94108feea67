use super::{BuildContext, CommandBuilder, DumpCommand, connectivity_options, credential_options, quiet};
use crate::config::{BackupConfig, DatabaseName};
use crate::errors::ConfigError;
use crate::utils::shell::{Quote, ShellCommand};

/// `mysqldump`: one command writing SQL text to stdout.
pub struct Mysqldump;

impl CommandBuilder for Mysqldump {
    fn build(&self, config: &BackupConfig, ctx: &BuildContext<'_>) -> Result<DumpCommand, ConfigError> {
        let mut cmd = ShellCommand::new(ctx.utilities.resolve("mysqldump")?)
            .raws(config.additional_options.iter().cloned());
        cmd = credential_options(cmd, config);
        cmd = connectivity_options(cmd, config);

        cmd = match &config.name {
            DatabaseName::All => cmd.raw("--all-databases"),
            DatabaseName::Named(name) => config
                .only_tables
                .iter()
                .fold(cmd.value(name.as_str(), Quote::Escaped), |cmd, table| {
                    cmd.value(table.as_str(), Quote::Escaped)
                }),
        };

        for table in &config.skip_tables {
            cmd = cmd.opt("--ignore-table", qualified_table(&config.name, table), Quote::Single);
        }

        Ok(DumpCommand {
            script: quiet(cmd, config).into(),
            extension: "sql",
        })
    }
}

/// `db.table` names pass through; bare names get the current database.
fn qualified_table(name: &DatabaseName, table: &str) -> String {
    match name {
        DatabaseName::Named(db) if !table.contains('.') => format!("{}.{}", db, table),
        _ => table.to_string(),
    }
}
