//! Supervisor - launches services, drains the merged streams and applies
//! the stop-on-error policy

use crate::config::ServiceSpec;
use crate::runtime::launcher::{launch_all, LaunchError, ResolvedService, ServiceExit};
use crate::runtime::multiplexer::{Multiplexer, ServiceStreams};
use crate::runtime::reader::OutputLine;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Directory service paths are resolved against
    pub root_path: PathBuf,
    /// End the run on the first stderr line
    pub stop_on_error: bool,
    /// Time children and readers get to finish after cancellation
    pub grace_period: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
            stop_on_error: false,
            grace_period: Duration::from_secs(5),
        }
    }
}

/// Destination of the merged streams
pub trait OutputSink: Send {
    /// A line from some service's stdout
    fn on_output(&mut self, line: &OutputLine);
    /// A line from some service's stderr, when it does not stop the run
    fn on_error(&mut self, line: &OutputLine);
}

/// Prints output lines to stdout and logs error lines
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn on_output(&mut self, line: &OutputLine) {
        let mut stdout = std::io::stdout().lock();
        let mut bytes = line.to_bytes();
        bytes.push(b'\n');
        if let Err(e) = stdout.write_all(&bytes) {
            log::error!("Failed to write output: {}", e);
        }
    }

    fn on_error(&mut self, line: &OutputLine) {
        log::warn!("{}", line);
    }
}

/// Summary of a run that ended without a fatal error
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Lines delivered from stdout streams
    pub output_lines: usize,
    /// Lines delivered from stderr streams
    pub error_lines: usize,
    /// Exit status of every service, in launch order
    pub exits: Vec<ServiceExit>,
    /// Whether the run was cancelled from outside (e.g. Ctrl+C)
    pub interrupted: bool,
}

/// How the drain loop ended
enum Drained {
    Exhausted,
    Interrupted,
    StoppedOnError(OutputLine),
}

/// Runs a set of services until their streams are exhausted, the token is
/// cancelled, or (with `stop_on_error`) a service writes to stderr.
pub struct Supervisor {
    config: SupervisorConfig,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Create a new supervisor
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token shared by every launch and reader; cancelling it stops the run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Launch all services and drive their output into `sink`.
    pub async fn run<S: OutputSink>(
        self,
        services: &[ServiceSpec],
        sink: &mut S,
    ) -> Result<RunSummary, SupervisorError> {
        let resolved: Vec<ResolvedService> = services
            .iter()
            .map(|spec| ResolvedService::resolve(spec, &self.config.root_path))
            .collect();
        let launch_order: Vec<&str> = resolved.iter().map(|s| s.name.as_str()).collect();

        log::info!("Launching {} services...", resolved.len());

        let mut streams = Vec::new();
        let mut watchers = JoinSet::new();
        let mut first_failure: Option<LaunchError> = None;

        for outcome in launch_all(&resolved) {
            match outcome {
                Ok(running) => {
                    streams.push(ServiceStreams {
                        name: running.name,
                        stdout: running.stdout,
                        stderr: running.stderr,
                    });
                    watchers.spawn(
                        running
                            .handle
                            .wait(self.cancel.clone(), self.config.grace_period),
                    );
                }
                Err(e) => {
                    log::error!("{}", e);
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }

        // Nothing is read until every service launched
        if let Some(failure) = first_failure {
            drop(streams);
            self.cancel.cancel();
            self.collect_exits(&mut watchers, &launch_order, None).await;
            return Err(SupervisorError::Launch(failure));
        }

        let mut mux = Multiplexer::start(streams, &self.cancel, self.config.grace_period);
        let mut summary = RunSummary::default();

        let drained = self.drain(&mut mux, sink, &mut summary).await;

        match drained {
            Drained::StoppedOnError(line) => {
                log::info!("Stopping all services after error from '{}'", line.prefix);
                self.cancel.cancel();
                mux.close();
                let exits = self.collect_exits(&mut watchers, &launch_order, None).await;
                mux.join().await;
                Err(SupervisorError::ServiceError {
                    line: line.to_string(),
                    exits,
                })
            }
            Drained::Interrupted | Drained::Exhausted => {
                summary.interrupted = matches!(drained, Drained::Interrupted);
                mux.join().await;
                summary.exits = self
                    .collect_exits(&mut watchers, &launch_order, Some(self.config.grace_period))
                    .await;
                log::info!("All services finished");
                Ok(summary)
            }
        }
    }

    /// Forward merged lines until both channels close or the policy stops the run.
    ///
    /// An external cancellation does not end the loop: readers drain what the
    /// terminating children still write, then close their channels.
    async fn drain<S: OutputSink>(
        &self,
        mux: &mut Multiplexer,
        sink: &mut S,
        summary: &mut RunSummary,
    ) -> Drained {
        let mut output_open = true;
        let mut errors_open = true;
        let mut interrupted = false;

        while output_open || errors_open {
            tokio::select! {
                line = mux.output.recv(), if output_open => match line {
                    Some(line) => {
                        summary.output_lines += 1;
                        sink.on_output(&line);
                    }
                    None => output_open = false,
                },

                line = mux.errors.recv(), if errors_open => match line {
                    Some(line) if self.config.stop_on_error && !interrupted => {
                        return Drained::StoppedOnError(line);
                    }
                    Some(line) => {
                        summary.error_lines += 1;
                        sink.on_error(&line);
                    }
                    None => errors_open = false,
                },

                () = self.cancel.cancelled(), if !interrupted => {
                    log::info!("Shutdown requested, stopping all services...");
                    interrupted = true;
                }
            }
        }

        if interrupted {
            Drained::Interrupted
        } else {
            Drained::Exhausted
        }
    }

    /// Wait for every exit watcher.
    ///
    /// With `patience`, children still alive after that long are cancelled.
    async fn collect_exits(
        &self,
        watchers: &mut JoinSet<ServiceExit>,
        launch_order: &[&str],
        patience: Option<Duration>,
    ) -> Vec<ServiceExit> {
        let deadline = patience.map(|p| Instant::now() + p);
        let mut exits = Vec::with_capacity(watchers.len());

        loop {
            let next = match deadline {
                Some(deadline) if !self.cancel.is_cancelled() => {
                    match tokio::time::timeout_at(deadline, watchers.join_next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            log::info!(
                                "Services still running after their output ended, stopping them"
                            );
                            self.cancel.cancel();
                            continue;
                        }
                    }
                }
                _ => watchers.join_next().await,
            };

            match next {
                Some(Ok(exit)) => exits.push(exit),
                Some(Err(e)) => log::error!("Exit watcher task failed: {}", e),
                None => break,
            }
        }

        exits.sort_by_key(|exit| launch_order.iter().position(|name| *name == exit.name));
        exits
    }
}

/// Errors that end a supervised run
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Launch failed: {0}")]
    Launch(#[from] LaunchError),

    #[error("{line}")]
    ServiceError {
        /// The first stderr line, with its prefix
        line: String,
        /// Exit status of every service after the shutdown
        exits: Vec<ServiceExit>,
    },
}
