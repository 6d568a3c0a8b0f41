//! Service launching and child lifetime management

use crate::config::{ServiceSpec, SubstitutionContext};
use crate::runtime::reader::StreamKind;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio_util::sync::CancellationToken;

/// A service with its templates resolved against the root path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    /// Service name
    pub name: String,
    /// Executable
    pub command: String,
    /// Expanded arguments
    pub args: Vec<String>,
    /// Working directory (root joined with the service path)
    pub working_dir: PathBuf,
}

impl ResolvedService {
    /// Resolve a service spec: working dir first, then `$path` and env expansion
    pub fn resolve(spec: &ServiceSpec, root: &Path) -> Self {
        let working_dir = spec.working_dir(root);
        let ctx = SubstitutionContext::new().with_path(&working_dir);

        Self {
            name: spec.name.clone(),
            command: spec.command.clone(),
            args: ctx.substitute_all(&spec.args),
            working_dir,
        }
    }
}

/// A launched service whose streams have not been consumed yet
#[derive(Debug)]
pub struct RunningService {
    /// Service name, the prefix identity of its lines
    pub name: String,
    /// Child standard output
    pub stdout: ChildStdout,
    /// Child standard error
    pub stderr: ChildStderr,
    /// Handle used to wait for or terminate the child
    pub handle: ServiceHandle,
}

/// Exit status of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceExit {
    /// Service name
    pub name: String,
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one
    pub signal: Option<i32>,
}

impl ServiceExit {
    fn from_status(name: String, status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            name,
            code: status.code(),
            signal,
        }
    }

    /// Check if the service exited with code 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ServiceExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "{} exited with code {}", self.name, code),
            (None, Some(signal)) => write!(f, "{} terminated by signal {}", self.name, signal),
            (None, None) => write!(f, "{} exited with unknown status", self.name),
        }
    }
}

/// Owns a child process until it exits
#[derive(Debug)]
pub struct ServiceHandle {
    name: String,
    child: Child,
}

impl ServiceHandle {
    /// Wait for the child to exit on its own or terminate it on cancellation.
    ///
    /// On cancellation the child gets SIGTERM and `grace` to exit before it
    /// is killed.
    pub async fn wait(mut self, cancel: CancellationToken, grace: Duration) -> ServiceExit {
        let natural = tokio::select! {
            status = self.child.wait() => Some(status),
            () = cancel.cancelled() => None,
        };

        let status = match natural {
            Some(status) => status,
            None => self.terminate(grace).await,
        };

        match status {
            Ok(status) => {
                let exit = ServiceExit::from_status(self.name, status);
                log::info!("[{}] {}", exit.name, exit);
                exit
            }
            Err(e) => {
                log::error!("[{}] Error waiting for process: {}", self.name, e);
                ServiceExit {
                    name: self.name,
                    code: None,
                    signal: None,
                }
            }
        }
    }

    async fn terminate(&mut self, grace: Duration) -> std::io::Result<ExitStatus> {
        log::info!("[{}] Stopping process...", self.name);

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                log::warn!(
                    "[{}] Process did not exit gracefully, forcing kill",
                    self.name
                );
                self.child.kill().await?;
                self.child.wait().await
            }
        }
    }
}

/// Launch a single service.
///
/// Must be called from within a tokio runtime. The child starts executing
/// immediately; it is killed if the returned value is dropped.
pub fn launch(service: &ResolvedService) -> Result<RunningService, LaunchError> {
    if !service.working_dir.is_dir() {
        return Err(LaunchError::MissingWorkingDir {
            name: service.name.clone(),
            path: service.working_dir.clone(),
        });
    }

    log::info!(
        "Running in {:?}: {} {:?}",
        service.working_dir,
        service.command,
        service.args
    );

    let mut cmd = Command::new(&service.command);
    cmd.args(&service.args)
        .current_dir(&service.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| LaunchError::Spawn {
        name: service.name.clone(),
        command: service.command.clone(),
        source: e,
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| LaunchError::StreamUnavailable {
            name: service.name.clone(),
            stream: StreamKind::Stdout,
        })?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| LaunchError::StreamUnavailable {
            name: service.name.clone(),
            stream: StreamKind::Stderr,
        })?;

    log::debug!(
        "[{}] Process started with PID: {}",
        service.name,
        child.id().unwrap_or(0)
    );

    Ok(RunningService {
        name: service.name.clone(),
        stdout,
        stderr,
        handle: ServiceHandle {
            name: service.name.clone(),
            child,
        },
    })
}

/// Result of launching one service
pub type LaunchOutcome = Result<RunningService, LaunchError>;

/// Launch every service, reporting each outcome separately
pub fn launch_all(services: &[ResolvedService]) -> Vec<LaunchOutcome> {
    services.iter().map(launch).collect()
}

/// Launch plan for dry-run mode
#[derive(Debug)]
pub struct LaunchPlan {
    /// Root every service path is resolved against
    pub root_path: PathBuf,
    /// Services in launch order
    pub services: Vec<ResolvedService>,
}

impl LaunchPlan {
    /// Resolve every service of a services file
    pub fn new(root_path: &Path, specs: &[ServiceSpec]) -> Self {
        Self {
            root_path: root_path.to_path_buf(),
            services: specs
                .iter()
                .map(|spec| ResolvedService::resolve(spec, root_path))
                .collect(),
        }
    }
}

impl fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Launch Plan")?;
        writeln!(f, "===========")?;
        writeln!(f)?;
        writeln!(f, "Root: {}", self.root_path.display())?;
        writeln!(f)?;

        writeln!(f, "Services (in launch order):")?;
        for (i, service) in self.services.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "  {}. {}", i + 1, service.name)?;
            writeln!(f, "     Directory: {}", service.working_dir.display())?;
            writeln!(
                f,
                "     Command: {} {}",
                service.command,
                service.args.join(" ")
            )?;
            writeln!(
                f,
                "     Prefixes: {}, {}",
                StreamKind::Stdout.prefix(&service.name),
                StreamKind::Stderr.prefix(&service.name)
            )?;
        }

        Ok(())
    }
}

/// Errors that can occur when launching a service
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Working directory for service '{name}' does not exist: {}", .path.display())]
    MissingWorkingDir { name: String, path: PathBuf },

    #[error("Failed to spawn service '{name}' ({command}): {source}")]
    Spawn {
        name: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Service '{name}' has no {stream} handle")]
    StreamUnavailable { name: String, stream: StreamKind },
}

impl LaunchError {
    /// Name of the service that failed to launch
    pub fn service(&self) -> &str {
        match self {
            LaunchError::MissingWorkingDir { name, .. }
            | LaunchError::Spawn { name, .. }
            | LaunchError::StreamUnavailable { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(name: &str, dir: &Path, script: &str) -> ResolvedService {
        ResolvedService {
            name: name.to_string(),
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_resolve_expands_path_then_env() {
        std::env::set_var("SERVICEMUX_LAUNCHER_TEST", "cfg");
        let args = ["$path/data", "--conf=$SERVICEMUX_LAUNCHER_TEST", "plain"];
        let spec = ServiceSpec::new("api", "go", "api").with_args(args);

        let resolved = ResolvedService::resolve(&spec, Path::new("/srv"));
        assert_eq!(resolved.working_dir, PathBuf::from("/srv/api"));
        assert_eq!(resolved.args, vec!["/srv/api/data", "--conf=cfg", "plain"]);
    }

    #[test]
    fn test_resolve_does_not_mutate_spec() {
        let spec = ServiceSpec::new("api", "go", "api").with_args(["$path"]);
        let _ = ResolvedService::resolve(&spec, Path::new("/srv"));
        assert_eq!(spec.args, vec!["$path"]);
    }

    #[tokio::test]
    async fn test_launch_missing_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let service = sh("ghost", &dir.path().join("missing"), "echo hi");

        let err = launch(&service).unwrap_err();
        assert!(matches!(err, LaunchError::MissingWorkingDir { .. }));
        assert_eq!(err.service(), "ghost");
    }

    #[tokio::test]
    async fn test_launch_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let service = ResolvedService {
            name: "nope".to_string(),
            command: "servicemux-no-such-binary".to_string(),
            args: Vec::new(),
            working_dir: dir.path().to_path_buf(),
        };

        assert!(matches!(launch(&service), Err(LaunchError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_launch_runs_in_working_dir() {
        use tokio::io::AsyncReadExt;

        let dir = tempfile::tempdir().unwrap();
        let mut running = launch(&sh("pwd", dir.path(), "pwd -P")).unwrap();

        let mut out = String::new();
        running.stdout.read_to_string(&mut out).await.unwrap();
        let printed = std::fs::canonicalize(out.trim()).unwrap();
        assert_eq!(printed, std::fs::canonicalize(dir.path()).unwrap());

        let exit = running
            .handle
            .wait(CancellationToken::new(), Duration::from_secs(1))
            .await;
        assert!(exit.success());
    }

    #[tokio::test]
    async fn test_wait_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let running = launch(&sh("fail", dir.path(), "exit 3")).unwrap();

        let exit = running
            .handle
            .wait(CancellationToken::new(), Duration::from_secs(1))
            .await;
        assert_eq!(exit.code, Some(3));
        assert!(!exit.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_terminates_child() {
        let dir = tempfile::tempdir().unwrap();
        let running = launch(&sh("sleeper", dir.path(), "exec sleep 30")).unwrap();
        let cancel = CancellationToken::new();

        let waiter = tokio::spawn(running.handle.wait(cancel.clone(), Duration::from_secs(5)));
        cancel.cancel();

        let exit = tokio::time::timeout(Duration::from_secs(10), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit.code, None);
        assert_eq!(exit.signal, Some(nix::sys::signal::Signal::SIGTERM as i32));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_kills_child_ignoring_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let script = "trap '' TERM; while true; do sleep 1; done";
        let running = launch(&sh("stubborn", dir.path(), script)).unwrap();
        let cancel = CancellationToken::new();

        // give the shell time to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();

        let exit = tokio::time::timeout(
            Duration::from_secs(10),
            running.handle.wait(cancel, Duration::from_millis(200)),
        )
        .await
        .unwrap();
        assert_eq!(exit.signal, Some(nix::sys::signal::Signal::SIGKILL as i32));
    }

    #[test]
    fn test_plan_display() {
        let specs = vec![ServiceSpec::new("api", "go", "api").with_args(["run", "$path/main.go"])];
        let plan = LaunchPlan::new(Path::new("/srv"), &specs);
        let text = plan.to_string();

        assert!(text.contains("1. api"));
        assert!(text.contains("Command: go run /srv/api/main.go"));
        assert!(text.contains("Prefixes: api, api:error"));
    }
}
