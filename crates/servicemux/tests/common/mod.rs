//! Test helpers for supervisor scenarios

#![allow(dead_code)]

use servicemux::{OutputLine, OutputSink, ServiceSpec, SupervisorConfig};
use std::path::Path;
use std::time::Duration;

/// Sink that keeps every line it receives
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub output: Vec<String>,
    pub errors: Vec<String>,
}

impl OutputSink for CollectingSink {
    fn on_output(&mut self, line: &OutputLine) {
        self.output.push(line.to_string());
    }

    fn on_error(&mut self, line: &OutputLine) {
        self.errors.push(line.to_string());
    }
}

/// A service running `sh -c <script>` in `root/path`
pub fn sh_service(name: &str, path: &str, script: &str) -> ServiceSpec {
    ServiceSpec::new(name, "sh", path).with_args(["-c", script])
}

/// Supervisor config rooted at `root` with a short grace period
pub fn test_config(root: &Path, stop_on_error: bool) -> SupervisorConfig {
    SupervisorConfig {
        root_path: root.to_path_buf(),
        stop_on_error,
        grace_period: Duration::from_millis(500),
    }
}

/// Upper bound for a whole scenario
pub const SCENARIO_TIMEOUT: Duration = Duration::from_secs(20);
