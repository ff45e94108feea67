// mysql-dumper/src/backup/compressor.rs
use crate::config::CompressorConfig;
use crate::errors::ConfigError;
use crate::utils::Utilities;
use crate::utils::shell::ShellCommand;

/// A filter stage placed between the dump and the sink write.
pub trait Compressor: Send + Sync {
    fn command(&self) -> String;

    /// Suffix appended to the artifact name, dot included (`.gz`).
    fn extension(&self) -> &str;

    /// Hands the stage command and its suffix to `f`.
    fn compress_with(&self, f: &mut dyn FnMut(String, &str)) {
        f(self.command(), self.extension());
    }
}

pub struct Gzip {
    program: String,
    level: Option<u32>,
    rsyncable: bool,
}

impl Compressor for Gzip {
    fn command(&self) -> String {
        let mut cmd = ShellCommand::new(self.program.as_str());
        if let Some(level) = self.level {
            cmd = cmd.raw(format!("-{}", level));
        }
        if self.rsyncable {
            cmd = cmd.raw("--rsyncable");
        }
        cmd.render()
    }

    fn extension(&self) -> &str {
        ".gz"
    }
}

pub struct Bzip2 {
    program: String,
    level: Option<u32>,
}

impl Compressor for Bzip2 {
    fn command(&self) -> String {
        let cmd = ShellCommand::new(self.program.as_str());
        match self.level {
            Some(level) => cmd.raw(format!("-{}", level)).render(),
            None => cmd.render(),
        }
    }

    fn extension(&self) -> &str {
        ".bz2"
    }
}

/// User-supplied filter command, taken verbatim.
pub struct Custom {
    command: String,
    extension: String,
}

impl Compressor for Custom {
    fn command(&self) -> String {
        self.command.clone()
    }

    fn extension(&self) -> &str {
        &self.extension
    }
}

fn check_level(level: Option<u32>) -> Result<Option<u32>, ConfigError> {
    match level {
        Some(level) if !(1..=9).contains(&level) => Err(ConfigError::Invalid(format!(
            "compression level must be between 1 and 9, got {}",
            level
        ))),
        level => Ok(level),
    }
}

/// Resolves the configured compressor's program before anything runs.
pub fn from_config(config: &CompressorConfig, utilities: &Utilities) -> Result<Box<dyn Compressor>, ConfigError> {
    Ok(match config {
        CompressorConfig::Gzip { level, rsyncable } => Box::new(Gzip {
            program: utilities.resolve("gzip")?,
            level: check_level(*level)?,
            rsyncable: *rsyncable,
        }),
        CompressorConfig::Bzip2 { level } => Box::new(Bzip2 {
            program: utilities.resolve("bzip2")?,
            level: check_level(*level)?,
        }),
        CompressorConfig::Custom { command, extension } => {
            if command.trim().is_empty() {
                return Err(ConfigError::Invalid("custom compressor needs a command".to_string()));
            }
            let extension = if extension.starts_with('.') || extension.is_empty() {
                extension.clone()
            } else {
                format!(".{}", extension)
            };
            Box::new(Custom {
                command: command.clone(),
                extension,
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utilities() -> Utilities {
        Utilities::default()
            .with_override("gzip", "/usr/bin/gzip")
            .with_override("bzip2", "/usr/bin/bzip2")
    }

    fn collected(compressor: &dyn Compressor) -> (String, String) {
        let mut out = (String::new(), String::new());
        compressor.compress_with(&mut |command, ext| out = (command, ext.to_string()));
        out
    }

    #[test]
    fn test_gzip_flags() {
        let config = CompressorConfig::Gzip {
            level: Some(9),
            rsyncable: true,
        };
        let compressor = from_config(&config, &utilities()).unwrap();
        assert_eq!(
            collected(compressor.as_ref()),
            ("/usr/bin/gzip -9 --rsyncable".to_string(), ".gz".to_string())
        );
    }

    #[test]
    fn test_bzip2_default_level() {
        let compressor = from_config(&CompressorConfig::Bzip2 { level: None }, &utilities()).unwrap();
        assert_eq!(
            collected(compressor.as_ref()),
            ("/usr/bin/bzip2".to_string(), ".bz2".to_string())
        );
    }

    #[test]
    fn test_custom_extension_gets_a_dot() {
        let config = CompressorConfig::Custom {
            command: "zstd -q -T0".to_string(),
            extension: "zst".to_string(),
        };
        let compressor = from_config(&config, &utilities()).unwrap();
        assert_eq!(compressor.command(), "zstd -q -T0");
        assert_eq!(compressor.extension(), ".zst");
    }

    #[test]
    fn test_level_out_of_range() {
        let config = CompressorConfig::Gzip {
            level: Some(12),
            rsyncable: false,
        };
        assert!(matches!(
            from_config(&config, &utilities()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
