// mysql-dumper/src/backup/pipeline.rs
use std::ffi::OsString;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::utils::shell::{Quote, ShellCommand};

const DEFAULT_SHELL: &str = "sh";

/// One process of the pipeline: a script run by `sh -c`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStage {
    pub label: String,
    pub script: String,
    /// Appended to the artifact name, e.g. `sql` then `.gz`.
    pub extension: Option<String>,
    pub success_codes: Vec<i32>,
}

impl PipelineStage {
    pub fn new(label: impl Into<String>, script: impl Into<String>) -> Self {
        PipelineStage {
            label: label.into(),
            script: script.into(),
            extension: None,
            success_codes: vec![0],
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    #[cfg(test)]
    pub fn with_success_codes(mut self, codes: Vec<i32>) -> Self {
        self.success_codes = codes;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Exited(i32),
    /// Killed by a signal, e.g. SIGPIPE after the reader went away.
    Signaled,
    NotStarted(String),
    /// Started, then killed because a later stage could not start.
    Aborted,
    WaitFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub label: String,
    pub status: StageStatus,
    pub success: bool,
    pub stderr: String,
}

impl StageOutcome {
    fn new(stage: &PipelineStage, status: StageStatus, stderr: String) -> Self {
        let success = matches!(status, StageStatus::Exited(code) if stage.success_codes.contains(&code));
        StageOutcome {
            label: stage.label.clone(),
            status,
            success,
            stderr,
        }
    }

    fn diagnostic(&self) -> String {
        let headline = match &self.status {
            StageStatus::Exited(code) => format!("`{}` returned exit code: {}", self.label, code),
            StageStatus::Signaled => format!("`{}` was terminated by a signal", self.label),
            StageStatus::NotStarted(err) => format!("`{}` could not be started: {}", self.label, err),
            StageStatus::Aborted => format!("`{}` was stopped because a later stage could not start", self.label),
            StageStatus::WaitFailed(err) => format!("`{}` could not be waited on: {}", self.label, err),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            headline
        } else {
            format!("{}\n{}", headline, stderr)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    /// True only if every stage succeeded.
    pub success: bool,
    pub stages: Vec<StageOutcome>,
    /// Diagnostics of the failed stages, in declared order.
    pub diagnostics: String,
    pub artifact: PathBuf,
}

impl PipelineResult {
    fn new(stages: Vec<StageOutcome>, artifact: PathBuf) -> Self {
        let success = !stages.is_empty() && stages.iter().all(|s| s.success);
        let diagnostics = stages
            .iter()
            .filter(|s| !s.success)
            .map(StageOutcome::diagnostic)
            .collect::<Vec<_>>()
            .join("\n");
        PipelineResult {
            success,
            stages,
            diagnostics,
            artifact,
        }
    }
}

/// Chains dump, optional compression and the sink write into one OS pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOrchestrator {
    cat: String,
    shell: String,
}

impl PipelineOrchestrator {
    pub fn new(cat: impl Into<String>) -> Self {
        PipelineOrchestrator {
            cat: cat.into(),
            shell: DEFAULT_SHELL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Stages in run order and the artifact they write:
    /// `<stem>.<dump ext>[<compression ext>]`.
    pub fn assemble(
        &self,
        dump: PipelineStage,
        compression: Option<PipelineStage>,
        stem: &Path,
    ) -> (Vec<PipelineStage>, PathBuf) {
        let mut stages = vec![dump];
        stages.extend(compression);

        let mut name = OsString::from(stem.as_os_str());
        name.push(".");
        for extension in stages.iter().filter_map(|s| s.extension.as_deref()) {
            name.push(extension);
        }
        let artifact = PathBuf::from(name);

        let sink = ShellCommand::new(self.cat.as_str())
            .raw(">")
            .value(artifact.display().to_string(), Quote::Single);
        stages.push(PipelineStage::new("cat", sink.render()));
        (stages, artifact)
    }

    /// Starts every stage, waits for all of them, then aggregates.
    /// Blocks the calling thread until the last stage has exited.
    pub fn run(&self, dump: PipelineStage, compression: Option<PipelineStage>, stem: &Path) -> PipelineResult {
        let (stages, artifact) = self.assemble(dump, compression, stem);
        PipelineResult::new(self.execute(&stages), artifact)
    }

    /// Every stage joins the head stage's process group, so anything a
    /// stage's shell starts can be stopped together with it.
    fn execute(&self, stages: &[PipelineStage]) -> Vec<StageOutcome> {
        let mut children: Vec<Child> = Vec::with_capacity(stages.len());
        let mut upstream: Option<ChildStdout> = None;

        for (index, stage) in stages.iter().enumerate() {
            let last = index + 1 == stages.len();
            let stdin = upstream.take().map_or_else(Stdio::null, Stdio::from);
            let stdout = if last { Stdio::null() } else { Stdio::piped() };
            let group = children.first().map(Child::id);

            debug!(stage = %stage.label, "starting pipeline stage");
            match spawn_stage(&self.shell, stage, stdin, stdout, group) {
                Ok(mut child) => {
                    upstream = child.stdout.take();
                    children.push(child);
                }
                Err(err) => return abort(stages, children, err),
            }
        }

        collect(stages, children)
    }
}

/// `group: None` starts a new process group led by the spawned shell.
fn spawn_stage(
    shell: &str,
    stage: &PipelineStage,
    stdin: Stdio,
    stdout: Stdio,
    group: Option<u32>,
) -> std::io::Result<Child> {
    Command::new(shell)
        .arg("-c")
        .arg(&stage.script)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(Stdio::piped())
        .process_group(group.map_or(0, |id| id as i32))
        .spawn()
}

/// Drains each stage's stderr and waits for it on its own thread, so no
/// stage blocks on a full pipe while another is being waited on.
fn collect(stages: &[PipelineStage], children: Vec<Child>) -> Vec<StageOutcome> {
    thread::scope(|scope| {
        let handles: Vec<_> = children
            .into_iter()
            .zip(stages)
            .map(|(mut child, stage)| {
                scope.spawn(move || {
                    let stderr = drain_stderr(&mut child);
                    let status = match child.wait() {
                        Ok(status) => exit_status(status),
                        Err(err) => StageStatus::WaitFailed(err.to_string()),
                    };
                    StageOutcome::new(stage, status, stderr)
                })
            })
            .collect();

        handles
            .into_iter()
            .zip(stages)
            .map(|(handle, stage)| {
                handle.join().unwrap_or_else(|_| {
                    StageOutcome::new(stage, StageStatus::WaitFailed("monitor thread panicked".to_string()), String::new())
                })
            })
            .collect()
    })
}

fn drain_stderr(child: &mut Child) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = child.stderr.take() {
        // A read error only loses diagnostics; the exit status still decides.
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn exit_status(status: ExitStatus) -> StageStatus {
    match status.code() {
        Some(code) => StageStatus::Exited(code),
        None => StageStatus::Signaled,
    }
}

/// A stage failed to spawn: stop everything already running.
///
/// The whole process group is killed before any stderr is drained; killing
/// only the `sh -c` leaders would leave their children holding the pipes open.
fn abort(stages: &[PipelineStage], children: Vec<Child>, err: std::io::Error) -> Vec<StageOutcome> {
    if let Some(leader) = children.first() {
        if let Err(errno) = killpg(Pid::from_raw(leader.id() as i32), Signal::SIGKILL) {
            warn!(pgid = leader.id(), error = %errno, "could not stop pipeline process group");
        }
    }

    let started = children.len();
    let mut outcomes = Vec::with_capacity(started + 1);
    for (mut child, stage) in children.into_iter().zip(stages) {
        let _ = child.kill();
        let stderr = drain_stderr(&mut child);
        let _ = child.wait();
        outcomes.push(StageOutcome::new(stage, StageStatus::Aborted, stderr));
    }
    outcomes.push(StageOutcome::new(
        &stages[started],
        StageStatus::NotStarted(err.to_string()),
        String::new(),
    ));
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn orchestrator() -> PipelineOrchestrator {
        PipelineOrchestrator::new("cat")
    }

    #[test]
    fn test_artifact_name_appends_extensions() {
        let (stages, artifact) = orchestrator().assemble(
            PipelineStage::new("mysqldump", "true").with_extension("sql"),
            Some(PipelineStage::new("gzip", "gzip").with_extension(".gz")),
            Path::new("/backups/nightly/databases/MySQL"),
        );

        assert_eq!(artifact, PathBuf::from("/backups/nightly/databases/MySQL.sql.gz"));
        let labels: Vec<&str> = stages.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["mysqldump", "gzip", "cat"]);
        assert_eq!(stages[2].script, "cat > '/backups/nightly/databases/MySQL.sql.gz'");
    }

    #[test]
    fn test_data_flows_through_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let result = orchestrator().run(
            PipelineStage::new("dump", "printf 'hello pipeline'").with_extension("txt"),
            Some(PipelineStage::new("upper", "tr a-z A-Z").with_extension(".up")),
            &dir.path().join("out"),
        );

        assert!(result.success, "{}", result.diagnostics);
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.artifact, dir.path().join("out.txt.up"));
        assert_eq!(fs::read_to_string(&result.artifact).unwrap(), "HELLO PIPELINE");
    }

    #[test]
    fn test_upstream_failure_fails_the_run_even_if_sink_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let result = orchestrator().run(
            PipelineStage::new("dump", "echo 'access denied' >&2; exit 3").with_extension("sql"),
            None,
            &dir.path().join("MySQL"),
        );

        assert!(!result.success);
        assert!(result.stages[1].success, "sink should have exited cleanly");
        assert_eq!(result.stages[0].status, StageStatus::Exited(3));
        assert!(result.diagnostics.contains("`dump` returned exit code: 3"));
        assert!(result.diagnostics.contains("access denied"));
    }

    #[test]
    fn test_diagnostics_follow_declared_order_not_finish_order() {
        let dir = tempfile::tempdir().unwrap();
        let result = orchestrator().run(
            PipelineStage::new("slow", "sleep 0.3; echo first >&2; exit 1"),
            Some(PipelineStage::new("fast", "echo second >&2; exit 2")),
            &dir.path().join("x"),
        );

        assert!(!result.success);
        let first = result.diagnostics.find("first").unwrap();
        let second = result.diagnostics.find("second").unwrap();
        assert!(first < second, "{}", result.diagnostics);
        assert_eq!(result.stages.len(), 3);
    }

    #[test]
    fn test_custom_success_codes_count_as_success() {
        let dir = tempfile::tempdir().unwrap();
        let result = orchestrator().run(
            PipelineStage::new("tar", "echo warning >&2; exit 1").with_success_codes(vec![0, 1]),
            None,
            &dir.path().join("x"),
        );
        assert!(result.success, "{}", result.diagnostics);
    }

    #[test]
    fn test_large_streams_do_not_deadlock() {
        let dir = tempfile::tempdir().unwrap();
        let result = orchestrator().run(
            PipelineStage::new("noisy", "head -c 300000 /dev/zero >&2; head -c 2000000 /dev/zero")
                .with_extension("bin"),
            None,
            &dir.path().join("big"),
        );

        assert!(result.success, "{}", result.diagnostics);
        assert_eq!(fs::metadata(&result.artifact).unwrap().len(), 2_000_000);
        assert_eq!(result.stages[0].stderr.len(), 300_000);
    }

    #[test]
    fn test_missing_shell_reports_instead_of_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let result = orchestrator()
            .with_shell("/definitely/not/a/shell")
            .run(PipelineStage::new("dump", "true"), None, &dir.path().join("x"));

        assert!(!result.success);
        assert_eq!(result.stages.len(), 1);
        assert!(matches!(result.stages[0].status, StageStatus::NotStarted(_)));
        assert!(result.diagnostics.contains("`dump` could not be started"));
    }

    #[test]
    fn test_abort_stops_processes_started_by_a_stage() {
        let stages = [
            PipelineStage::new("innobackupex", "sleep 5 && echo done >&2"),
            PipelineStage::new("cat", "cat"),
        ];
        let child = spawn_stage(DEFAULT_SHELL, &stages[0], Stdio::null(), Stdio::null(), None).unwrap();
        thread::sleep(std::time::Duration::from_millis(300));

        let started = std::time::Instant::now();
        let outcomes = abort(
            &stages,
            vec![child],
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );

        assert!(
            started.elapsed() < std::time::Duration::from_secs(2),
            "abort waited {:?} on a leftover process",
            started.elapsed()
        );
        assert_eq!(outcomes[0].status, StageStatus::Aborted);
        assert!(!outcomes[0].stderr.contains("done"));
        assert!(matches!(outcomes[1].status, StageStatus::NotStarted(_)));
    }
}
