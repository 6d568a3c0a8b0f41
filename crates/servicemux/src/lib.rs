//! Servicemux
//!
//! Launches a set of services and merges their output into two streams.
//!
//! # Overview
//!
//! - Every service runs in `rootPath/path`, with `$path` and environment
//!   references expanded in its arguments
//! - Each stdout line is printed as `name: line`, each stderr line is
//!   logged as `name:error: line`
//! - Clear-screen, backspace and carriage-return sequences are stripped and
//!   empty lines are dropped
//! - With `--stop-on-error` the first stderr line stops every service
//!
//! # Example Services File
//!
//! ```json
//! {
//!   "rootPath": "/home/me/project",
//!   "services": [
//!     { "name": "api", "command": "cargo", "path": "api", "args": ["run"] },
//!     { "name": "web", "command": "npm", "path": "web",
//!       "args": ["start", "--config", "$path/config/${APP_ENV}.json"] }
//!   ]
//! }
//! ```

pub mod cli;
pub mod config;
pub mod runtime;

pub use cli::MuxArgs;
pub use config::{ServiceSpec, ServicesFile, ServicesFileError, SubstitutionContext};
pub use runtime::{
    ConsoleSink, LaunchError, LaunchPlan, Multiplexer, OutputLine, OutputSink, ResolvedService,
    RunSummary, RunningService, ServiceExit, StreamEnd, StreamKind, Supervisor, SupervisorConfig,
    SupervisorError,
};
