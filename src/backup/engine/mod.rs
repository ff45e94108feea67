//! Per-engine command synthesis.
//!
//! Each engine turns a [`BackupConfig`] into the script for the dump stage
//! of the pipeline plus the base extension of the artifact it writes.

mod hot_copy;
mod logical;
mod streaming;

pub use hot_copy::Innobackupex;
pub use logical::Mysqldump;
pub use streaming::Xtrabackup;

use crate::backup::DumpLocation;
use crate::config::{BackupConfig, Engine};
use crate::errors::ConfigError;
use crate::utils::Utilities;
use crate::utils::shell::{Quote, ShellCommand, ShellScript};

/// Output of an engine: the dump-stage script and what it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpCommand {
    pub script: ShellScript,
    /// `sql`, `tar` or `xbstream`.
    pub extension: &'static str,
}

pub struct BuildContext<'a> {
    pub utilities: &'a Utilities,
    pub location: &'a DumpLocation,
}

pub trait CommandBuilder: Sync {
    fn build(&self, config: &BackupConfig, ctx: &BuildContext<'_>) -> Result<DumpCommand, ConfigError>;
}

pub fn for_engine(engine: Engine) -> &'static dyn CommandBuilder {
    match engine {
        Engine::LogicalDump => &Mysqldump,
        Engine::HotCopy => &Innobackupex,
        Engine::StreamingIncremental => &Xtrabackup,
    }
}

/// Builds the dump command for whichever engine `config` selects.
pub fn build(config: &BackupConfig, ctx: &BuildContext<'_>) -> Result<DumpCommand, ConfigError> {
    for_engine(config.engine).build(config, ctx)
}

fn credential_options(cmd: ShellCommand, config: &BackupConfig) -> ShellCommand {
    let cmd = match &config.username {
        Some(user) => cmd.opt("--user", user.as_str(), Quote::Escaped),
        None => cmd,
    };
    match &config.password {
        Some(password) => cmd.secret("--password", password.as_str()),
        None => cmd,
    }
}

fn connectivity_options(cmd: ShellCommand, config: &BackupConfig) -> ShellCommand {
    if let Some(socket) = &config.socket {
        return cmd.opt("--socket", socket.as_str(), Quote::Single);
    }
    let cmd = match &config.host {
        Some(host) => cmd.opt("--host", host.as_str(), Quote::Single),
        None => cmd,
    };
    match config.port {
        Some(port) => cmd.opt("--port", port.to_string(), Quote::Single),
        None => cmd,
    }
}

/// stderr goes to /dev/null unless the run is verbose.
fn quiet(cmd: ShellCommand, config: &BackupConfig) -> ShellCommand {
    cmd.discard_stderr(!config.verbose)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn utilities() -> Utilities {
        ["mysqldump", "innobackupex", "xtrabackup", "tar", "cat", "sudo"]
            .into_iter()
            .fold(Utilities::default(), |u, name| {
                u.with_override(name, format!("/usr/bin/{}", name))
            })
    }

    pub fn location() -> DumpLocation {
        DumpLocation::new("/backups/nightly/databases", "MySQL")
    }

    pub fn build(config: &BackupConfig) -> DumpCommand {
        let utilities = utilities();
        let location = location();
        let ctx = BuildContext {
            utilities: &utilities,
            location: &location,
        };
        super::build(config, &ctx).expect("command should build")
    }
}
