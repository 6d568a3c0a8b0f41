//! Command-line interface for servicemux

use argh::FromArgs;
use std::time::Duration;

/// Launch services and merge their output into one prefixed stream
#[derive(FromArgs, Debug)]
pub struct MuxArgs {
    /// path to the json (or yaml) file containing the list of services
    #[argh(option, short = 'f')]
    pub file: Option<String>,

    /// stop every service on the first line written to stderr
    #[argh(switch)]
    pub stop_on_error: bool,

    /// show launch plan without executing
    #[argh(switch)]
    pub dry_run: bool,

    /// validate services file and exit
    #[argh(switch)]
    pub validate: bool,

    /// milliseconds services get to exit after a shutdown before being killed
    #[argh(option, default = "5000")]
    pub grace_ms: u64,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,
}

impl MuxArgs {
    /// Grace period as a duration
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// Log filter for env_logger, falling back to `info` for unknown levels
    pub fn log_filter(&self) -> &'static str {
        match self.log_level.to_lowercase().as_str() {
            "error" => "error",
            "warn" => "warn",
            "info" => "info",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<MuxArgs, argh::EarlyExit> {
        MuxArgs::from_args(&["servicemux"], args)
    }

    #[test]
    fn test_parse_file_and_policy() {
        let args = parse(&["--file", "services.json", "--stop-on-error"]).unwrap();
        assert_eq!(args.file.as_deref(), Some("services.json"));
        assert!(args.stop_on_error);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]).unwrap();
        assert!(args.file.is_none());
        assert!(!args.stop_on_error);
        assert_eq!(args.grace_period(), Duration::from_secs(5));
        assert_eq!(args.log_filter(), "info");
    }

    #[test]
    fn test_log_filter_normalizes() {
        let args = parse(&["-l", "DEBUG"]).unwrap();
        assert_eq!(args.log_filter(), "debug");

        let args = parse(&["-l", "verbose"]).unwrap();
        assert_eq!(args.log_filter(), "info");
    }

    #[test]
    fn test_grace_ms() {
        let args = parse(&["--grace-ms", "250"]).unwrap();
        assert_eq!(args.grace_period(), Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(parse(&["--bogus"]).is_err());
    }
}
