/// Build orchestrator - produces the native dlib shared library
///
/// Two external steps run in the checkout's build directory:
/// - Configure (`cmake ..`)
/// - Compile (`make`)
/// followed by a check that the shared library actually exists. The first
/// failure aborts the sequence; nothing is rolled back or cleaned up.
use crate::error::{MarsupialError, Result};
use std::cell::Cell;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Name of the expected shared library inside the build directory
pub const DLIB_ARTIFACT: &str = "libdlib.so";

/// Environment variable overriding the directory holding the checkout
pub const ROOT_ENV: &str = "MARSUPIAL_ROOT";

/// One external tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new<S: Into<String>>(program: S, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Locations and commands used by the orchestrator
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory whose presence means "already built"
    pub cache_dir: PathBuf,
    /// Checkout of the native library
    pub source_dir: PathBuf,
    /// Where configure and compile run
    pub build_dir: PathBuf,
    /// File that must exist after compiling
    pub artifact: PathBuf,
    pub configure: ToolCommand,
    pub compile: ToolCommand,
}

impl BuildConfig {
    /// Standard layout under `root`: `build/`, `dlib/`, `dlib/build/libdlib.so`
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        let source_dir = root.join("dlib");
        let build_dir = source_dir.join("build");
        Self {
            cache_dir: root.join("build"),
            artifact: build_dir.join(DLIB_ARTIFACT),
            source_dir,
            build_dir,
            configure: ToolCommand::new("cmake", &[".."]),
            compile: ToolCommand::new("make", &[]),
        }
    }

    /// Layout rooted at `$MARSUPIAL_ROOT`, or the current directory
    pub fn from_env() -> Result<Self> {
        let root = match std::env::var_os(ROOT_ENV) {
            Some(root) => PathBuf::from(root),
            None => std::env::current_dir()?,
        };
        Ok(Self::new(root))
    }
}

/// Where the orchestrator is in its linear sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    NotStarted,
    Configuring,
    Compiling,
    Verified,
    Failed,
}

/// Successful end states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The cache directory existed; no tool was run
    AlreadyBuilt,
    /// Both steps ran and the artifact is present
    Built { artifact: PathBuf },
}

/// Captured output of a successful tool run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external build tools
pub trait CommandRunner {
    /// Run `command` in `cwd`; a non-zero exit is an error
    fn run(&self, command: &ToolCommand, cwd: &Path) -> Result<ToolOutput>;
}

/// Spawns real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &ToolCommand, cwd: &Path) -> Result<ToolOutput> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .current_dir(cwd)
            .output()
            .map_err(|source| MarsupialError::ToolLaunch {
                tool: command.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(MarsupialError::build_failure(
                command.to_string(),
                output.status.code(),
                stderr,
            ));
        }
        Ok(ToolOutput { stdout, stderr })
    }
}

/// Drives configure -> compile -> verify
pub struct BuildOrchestrator<R: CommandRunner = SystemRunner> {
    config: BuildConfig,
    runner: R,
    stage: Cell<BuildStage>,
}

impl BuildOrchestrator<SystemRunner> {
    pub fn new(config: BuildConfig) -> Self {
        Self::with_runner(config, SystemRunner)
    }
}

impl<R: CommandRunner> BuildOrchestrator<R> {
    pub fn with_runner(config: BuildConfig, runner: R) -> Self {
        Self {
            config,
            runner,
            stage: Cell::new(BuildStage::NotStarted),
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn stage(&self) -> BuildStage {
        self.stage.get()
    }

    fn enter(&self, stage: BuildStage) {
        log::info!("Build stage: {:?}", stage);
        self.stage.set(stage);
    }

    /// Build the native library unless a previous build is present
    pub fn run(&self) -> Result<BuildOutcome> {
        if self.config.cache_dir.exists() {
            log::info!(
                "DLib already built ({} exists)",
                self.config.cache_dir.display()
            );
            self.enter(BuildStage::Verified);
            return Ok(BuildOutcome::AlreadyBuilt);
        }

        match self.build() {
            Ok(artifact) => {
                self.enter(BuildStage::Verified);
                Ok(BuildOutcome::Built { artifact })
            }
            Err(err) => {
                self.enter(BuildStage::Failed);
                Err(err)
            }
        }
    }

    fn build(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.build_dir)?;

        self.enter(BuildStage::Configuring);
        self.step(&self.config.configure)?;

        self.enter(BuildStage::Compiling);
        self.step(&self.config.compile)?;

        if !self.config.artifact.is_file() {
            return Err(MarsupialError::ArtifactMissing(self.config.artifact.clone()));
        }
        Ok(self.config.artifact.clone())
    }

    fn step(&self, command: &ToolCommand) -> Result<()> {
        log::info!("Running `{}` in {}", command, self.config.build_dir.display());
        let output = self.runner.run(command, &self.config.build_dir)?;
        // Tool output goes to the operator, not the log
        if !output.stdout.is_empty() {
            println!("{}", output.stdout.trim_end());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records invocations; optionally creates the artifact when `make` runs
    struct FakeRunner {
        calls: Mutex<Vec<(String, PathBuf)>>,
        fail_on: Option<&'static str>,
        produce: Option<PathBuf>,
    }

    impl FakeRunner {
        fn new(fail_on: Option<&'static str>, produce: Option<PathBuf>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on,
                produce,
            }
        }

        fn calls(&self) -> Vec<(String, PathBuf)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for &FakeRunner {
        fn run(&self, command: &ToolCommand, cwd: &Path) -> Result<ToolOutput> {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), cwd.to_path_buf()));

            if self.fail_on == Some(command.program.as_str()) {
                return Err(MarsupialError::build_failure(
                    command.to_string(),
                    Some(2),
                    "boom",
                ));
            }
            if command.program == "make" {
                if let Some(artifact) = &self.produce {
                    fs::write(artifact, b"\x7fELF").unwrap();
                }
            }
            Ok(ToolOutput {
                stdout: format!("{} ok", command),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn test_existing_cache_dir_short_circuits() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("build")).unwrap();

        let runner = FakeRunner::new(None, None);
        let orchestrator = BuildOrchestrator::with_runner(BuildConfig::new(root.path()), &runner);

        assert_eq!(orchestrator.run().unwrap(), BuildOutcome::AlreadyBuilt);
        assert!(runner.calls().is_empty());
        assert!(!root.path().join("dlib").exists());
    }

    #[test]
    fn test_configure_then_compile_then_verify() {
        let root = tempfile::tempdir().unwrap();
        let config = BuildConfig::new(root.path());
        let runner = FakeRunner::new(None, Some(config.artifact.clone()));
        let orchestrator = BuildOrchestrator::with_runner(config.clone(), &runner);

        let outcome = orchestrator.run().unwrap();
        assert_eq!(
            outcome,
            BuildOutcome::Built {
                artifact: config.artifact.clone()
            }
        );
        assert_eq!(orchestrator.stage(), BuildStage::Verified);
        assert_eq!(
            runner.calls(),
            vec![
                ("cmake ..".to_string(), config.build_dir.clone()),
                ("make".to_string(), config.build_dir.clone()),
            ]
        );
    }

    #[test]
    fn test_missing_artifact_after_successful_compile() {
        let root = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new(None, None);
        let orchestrator = BuildOrchestrator::with_runner(BuildConfig::new(root.path()), &runner);

        let err = orchestrator.run().unwrap_err();
        assert!(matches!(err, MarsupialError::ArtifactMissing(_)));
        assert_eq!(orchestrator.stage(), BuildStage::Failed);
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn test_configure_failure_aborts_before_compile() {
        let root = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new(Some("cmake"), None);
        let orchestrator = BuildOrchestrator::with_runner(BuildConfig::new(root.path()), &runner);

        let err = orchestrator.run().unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
        assert_eq!(orchestrator.stage(), BuildStage::Failed);
        assert_eq!(runner.calls().len(), 1);
        // No rollback: the build directory stays behind
        assert!(root.path().join("dlib").join("build").is_dir());
    }

    #[test]
    fn test_tool_command_display() {
        assert_eq!(ToolCommand::new("cmake", &[".."]).to_string(), "cmake ..");
        assert_eq!(ToolCommand::new("make", &[]).to_string(), "make");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_reports_exit_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let command = ToolCommand::new("sh", &["-c", "echo nope >&2; exit 3"]);

        let err = SystemRunner.run(&command, dir.path()).unwrap_err();
        match err {
            MarsupialError::BuildFailure {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr.trim(), "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let command = ToolCommand::new("marsupial-no-such-tool", &[]);

        let err = SystemRunner.run(&command, dir.path()).unwrap_err();
        assert!(matches!(err, MarsupialError::ToolLaunch { .. }));
    }
}
