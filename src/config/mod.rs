// mysql-dumper/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;
use crate::utils::Utilities;

const DEFAULT_TMP_PATH: &str = "./tmp";

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawJsonConfig {
    pub trigger: String,
    pub tmp_path: Option<PathBuf>,
    #[serde(default)]
    pub utilities: BTreeMap<String, PathBuf>,
    pub compressor: Option<CompressorConfig>,
    #[serde(default)]
    pub defaults: RawDatabaseConfig,
    #[serde(default)]
    pub databases: Vec<RawDatabaseConfig>,
}

/// One `databases` entry, or the shared `defaults` block. Every field is
/// optional so an entry can be layered over the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDatabaseConfig {
    pub id: Option<String>,
    pub name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub socket: Option<String>,
    pub skip_tables: Option<Vec<String>>,
    pub only_tables: Option<Vec<String>>,
    pub additional_options: Option<Vec<String>>,
    pub prepare_options: Option<Vec<String>>,
    pub backup_engine: Option<Engine>,
    pub prepare_backup: Option<bool>,
    pub checkpoint_dir: Option<PathBuf>,
    pub incremental: Option<bool>,
    pub sudo_user: Option<String>,
    pub verbose: Option<bool>,
}

impl RawDatabaseConfig {
    /// Fields set on `self` win; unset ones fall back to `defaults`.
    /// The id is never inherited since it names the artifact.
    pub fn merged_over(self, defaults: &RawDatabaseConfig) -> RawDatabaseConfig {
        let d = defaults.clone();
        RawDatabaseConfig {
            id: self.id,
            name: self.name.or(d.name),
            username: self.username.or(d.username),
            password: self.password.or(d.password),
            host: self.host.or(d.host),
            port: self.port.or(d.port),
            socket: self.socket.or(d.socket),
            skip_tables: self.skip_tables.or(d.skip_tables),
            only_tables: self.only_tables.or(d.only_tables),
            additional_options: self.additional_options.or(d.additional_options),
            prepare_options: self.prepare_options.or(d.prepare_options),
            backup_engine: self.backup_engine.or(d.backup_engine),
            prepare_backup: self.prepare_backup.or(d.prepare_backup),
            checkpoint_dir: self.checkpoint_dir.or(d.checkpoint_dir),
            incremental: self.incremental.or(d.incremental),
            sudo_user: self.sudo_user.or(d.sudo_user),
            verbose: self.verbose.or(d.verbose),
        }
    }

    pub fn into_backup_config(self) -> Result<BackupConfig, ConfigError> {
        let mut builder = BackupConfig::builder()
            .skip_tables(self.skip_tables.unwrap_or_default())
            .only_tables(self.only_tables.unwrap_or_default())
            .additional_options(self.additional_options.unwrap_or_default())
            .prepare_options(self.prepare_options.unwrap_or_default())
            .incremental(self.incremental.unwrap_or(false))
            .verbose(self.verbose.unwrap_or(false));

        if let Some(id) = self.id {
            builder = builder.id(id);
        }
        if let Some(name) = self.name {
            builder = builder.name(DatabaseName::parse(&name));
        }
        if let Some(username) = self.username {
            builder = builder.username(username);
        }
        if let Some(password) = self.password {
            builder = builder.password(password);
        }
        if let Some(host) = self.host {
            builder = builder.host(host);
        }
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(socket) = self.socket {
            builder = builder.socket(socket);
        }
        if let Some(engine) = self.backup_engine {
            builder = builder.engine(engine);
        }
        if let Some(prepare) = self.prepare_backup {
            builder = builder.prepare_after_create(prepare);
        }
        if let Some(dir) = self.checkpoint_dir {
            builder = builder.checkpoint_dir(dir);
        }
        if let Some(user) = self.sudo_user {
            builder = builder.sudo_user(user);
        }
        builder.build()
    }
}

/// Compression stage spliced between the dump and the sink.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum CompressorConfig {
    Gzip {
        level: Option<u32>,
        #[serde(default)]
        rsyncable: bool,
    },
    Bzip2 {
        level: Option<u32>,
    },
    Custom {
        command: String,
        extension: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum Engine {
    /// Flat SQL text from mysqldump.
    #[default]
    #[serde(rename = "mysqldump")]
    LogicalDump,
    /// innobackupex copy + apply-log, tarred from a staging directory.
    #[serde(rename = "innobackupex")]
    HotCopy,
    /// xtrabackup xbstream, optionally incremental.
    #[serde(rename = "xtrabackup")]
    StreamingIncremental,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Engine::LogicalDump => "mysqldump",
            Engine::HotCopy => "innobackupex",
            Engine::StreamingIncremental => "xtrabackup",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DatabaseName {
    #[default]
    All,
    Named(String),
}

impl DatabaseName {
    /// `all` (or `:all`) selects every database on the server.
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "all" | ":all" => DatabaseName::All,
            other => DatabaseName::Named(other.to_string()),
        }
    }

    #[cfg(test)]
    pub fn is_all(&self) -> bool {
        matches!(self, DatabaseName::All)
    }
}

/// Everything one database backup run needs. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
    pub id: Option<String>,
    pub name: DatabaseName,
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Takes precedence over `host`/`port`.
    pub socket: Option<String>,
    pub skip_tables: Vec<String>,
    /// Ignored when dumping all databases.
    pub only_tables: Vec<String>,
    pub additional_options: Vec<String>,
    pub prepare_options: Vec<String>,
    pub engine: Engine,
    pub prepare_after_create: bool,
    pub checkpoint_dir: Option<PathBuf>,
    pub incremental: bool,
    pub sudo_user: Option<String>,
    pub verbose: bool,
}

impl BackupConfig {
    pub fn builder() -> BackupConfigBuilder {
        BackupConfigBuilder::default()
    }

    pub fn dump_filename(&self) -> String {
        match &self.id {
            Some(id) => format!("MySQL-{}", id),
            None => "MySQL".to_string(),
        }
    }

    /// Label used in log lines and diagnostics.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => format!("Database::MySQL ({})", id),
            None => "Database::MySQL".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackupConfigBuilder {
    id: Option<String>,
    name: DatabaseName,
    username: Option<String>,
    password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    socket: Option<String>,
    skip_tables: Vec<String>,
    only_tables: Vec<String>,
    additional_options: Vec<String>,
    prepare_options: Vec<String>,
    engine: Engine,
    prepare_after_create: Option<bool>,
    checkpoint_dir: Option<PathBuf>,
    incremental: bool,
    sudo_user: Option<String>,
    verbose: bool,
}

impl BackupConfigBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: DatabaseName) -> Self {
        self.name = name;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    pub fn skip_tables(mut self, tables: Vec<String>) -> Self {
        self.skip_tables = tables;
        self
    }

    pub fn only_tables(mut self, tables: Vec<String>) -> Self {
        self.only_tables = tables;
        self
    }

    pub fn additional_options(mut self, options: Vec<String>) -> Self {
        self.additional_options = options;
        self
    }

    pub fn prepare_options(mut self, options: Vec<String>) -> Self {
        self.prepare_options = options;
        self
    }

    pub fn engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn prepare_after_create(mut self, prepare: bool) -> Self {
        self.prepare_after_create = Some(prepare);
        self
    }

    pub fn checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn sudo_user(mut self, user: impl Into<String>) -> Self {
        self.sudo_user = Some(user.into());
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Applies defaults and rejects combinations no engine can honour.
    /// A missing checkpoint directory is left to the incremental validator.
    pub fn build(self) -> Result<BackupConfig, ConfigError> {
        if self.incremental && self.engine != Engine::StreamingIncremental {
            return Err(ConfigError::IncrementalUnsupported(self.engine.to_string()));
        }
        if let DatabaseName::Named(name) = &self.name {
            if name.is_empty() {
                return Err(ConfigError::Invalid("database name cannot be empty".to_string()));
            }
        }

        self.reject_control_chars()?;

        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        Ok(BackupConfig {
            id: non_blank(self.id),
            name: self.name,
            username: self.username,
            password: self.password,
            host: non_blank(self.host),
            port: self.port,
            socket: non_blank(self.socket),
            skip_tables: self.skip_tables,
            only_tables: self.only_tables,
            additional_options: self.additional_options,
            prepare_options: self.prepare_options,
            engine: self.engine,
            prepare_after_create: self.prepare_after_create.unwrap_or(true),
            checkpoint_dir: self
                .checkpoint_dir
                .filter(|dir| !dir.as_os_str().is_empty()),
            incremental: self.incremental,
            sudo_user: non_blank(self.sudo_user),
            verbose: self.verbose,
        })
    }
}

impl BackupConfigBuilder {
    /// Every value ends up inside a shell script, and for `sudo_user` inside a
    /// heredoc, where a newline could end the block early.
    fn reject_control_chars(&self) -> Result<(), ConfigError> {
        let scalars = [
            ("id", self.id.as_deref()),
            ("username", self.username.as_deref()),
            ("password", self.password.as_deref()),
            ("host", self.host.as_deref()),
            ("socket", self.socket.as_deref()),
            ("sudo_user", self.sudo_user.as_deref()),
        ];
        for (field, value) in scalars {
            if let Some(value) = value {
                reject_control_chars(field, value)?;
            }
        }
        if let DatabaseName::Named(name) = &self.name {
            reject_control_chars("name", name)?;
        }
        if let Some(dir) = &self.checkpoint_dir {
            reject_control_chars("checkpoint_dir", &dir.to_string_lossy())?;
        }
        let lists = [
            ("skip_tables", &self.skip_tables),
            ("only_tables", &self.only_tables),
            ("additional_options", &self.additional_options),
            ("prepare_options", &self.prepare_options),
        ];
        for (field, values) in lists {
            for value in values {
                reject_control_chars(field, value)?;
            }
        }
        Ok(())
    }
}

fn reject_control_chars(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.chars().any(char::is_control) {
        return Err(ConfigError::Invalid(format!(
            "'{}' must not contain control characters such as newlines",
            field
        )));
    }
    Ok(())
}

// Application's internal configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub trigger: String,
    pub tmp_path: PathBuf,
    pub utilities: Utilities,
    pub compressor: Option<CompressorConfig>,
    pub databases: Vec<BackupConfig>,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;
        Self::from_raw(raw_json_config)
    }

    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let trigger = raw.trigger.trim().to_string();
        if trigger.is_empty() || trigger.contains('/') || trigger.chars().any(char::is_control) {
            return Err(ConfigError::Invalid(format!(
                "trigger must be a non-empty name without '/', got {:?}",
                raw.trigger
            ))
            .into());
        }
        if let Some(tmp_path) = &raw.tmp_path {
            reject_control_chars("tmp_path", &tmp_path.to_string_lossy())?;
        }
        if raw.databases.is_empty() {
            return Err(ConfigError::Invalid("at least one entry is required in 'databases'".to_string()).into());
        }

        let mut databases = Vec::with_capacity(raw.databases.len());
        let mut seen = HashMap::new();
        for (index, entry) in raw.databases.into_iter().enumerate() {
            let config = entry
                .merged_over(&raw.defaults)
                .into_backup_config()
                .with_context(|| format!("Invalid entry #{} in 'databases'", index + 1))?;
            if let Some(first) = seen.insert(config.dump_filename(), index + 1) {
                return Err(ConfigError::DuplicateDumpFile {
                    file: config.dump_filename(),
                    first,
                    second: index + 1,
                }
                .into());
            }
            databases.push(config);
        }

        Ok(AppConfig {
            trigger,
            tmp_path: raw.tmp_path.unwrap_or_else(|| PathBuf::from(DEFAULT_TMP_PATH)),
            utilities: Utilities::new(raw.utilities),
            compressor: raw.compressor,
            databases,
        })
    }

    /// `<tmp_path>/<trigger>/databases`
    pub fn dump_path(&self) -> PathBuf {
        self.tmp_path.join(&self.trigger).join("databases")
    }
}
