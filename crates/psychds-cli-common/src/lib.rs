//! Shared CLI global options for the `psychds` binary (spec.md §6).
//!
//! Plays the same role `lintel-cli-common` plays for `lintel`: one small
//! crate holding the flags and the tracing setup every entry point shares,
//! kept separate from the binary so it stays testable without a process
//! boundary.

use bpaf::Bpaf;
use tracing_subscriber::prelude::*;

/// `--debug` accepts the `logging`-module level names (spec.md §6), not
/// `tracing`'s own vocabulary — `NOTSET`/`CRITICAL` have no direct `tracing`
/// equivalent and are mapped onto the nearest filter in [`setup_tracing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DebugLevel {
    /// No minimum: every event passes.
    NotSet,
    Debug,
    Info,
    Warning,
    #[default]
    Error,
    /// `tracing` has no level above `ERROR`; treated as `ERROR`.
    Critical,
}

impl core::str::FromStr for DebugLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOTSET" => Ok(Self::NotSet),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(format!(
                "expected one of NOTSET, DEBUG, INFO, WARNING, ERROR, CRITICAL, got '{s}'"
            )),
        }
    }
}

impl core::fmt::Display for DebugLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::NotSet => "NOTSET",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// Global options shared by the single `psychds` entry point (spec.md §6).
#[derive(Debug, Clone, Bpaf)]
#[bpaf(generate(cli_global_options))]
#[allow(clippy::upper_case_acronyms)]
pub struct CLIGlobalOptions {
    /// Output additional detail about the files processed.
    #[bpaf(short('v'), long("verbose"), switch, fallback(false))]
    pub verbose: bool,

    /// Include warning-level issues in the printed issue list.
    #[bpaf(short('w'), long("showWarnings"), switch, fallback(false))]
    pub show_warnings: bool,

    /// Logging threshold, from most to least verbose.
    #[bpaf(
        long("debug"),
        argument("NOTSET|DEBUG|INFO|WARNING|ERROR|CRITICAL"),
        fallback(DebugLevel::Error),
        display_fallback
    )]
    pub debug: DebugLevel,
}

/// Set up a `tracing` subscriber from `--debug`, falling back to the
/// `psychDS_LOG` env var when `--debug` is `NOTSET`, matching `lintel`'s
/// `LINTEL_LOG` fallback and hierarchical console layout.
pub fn setup_tracing(global: &CLIGlobalOptions) {
    let filter = match global.debug {
        DebugLevel::NotSet => match tracing_subscriber::EnvFilter::try_from_env("psychDS_LOG") {
            Ok(f) => f,
            Err(_) => return,
        },
        DebugLevel::Debug => tracing_subscriber::EnvFilter::new("debug"),
        DebugLevel::Info => tracing_subscriber::EnvFilter::new("info"),
        DebugLevel::Warning => tracing_subscriber::EnvFilter::new("warn"),
        DebugLevel::Error | DebugLevel::Critical => tracing_subscriber::EnvFilter::new("error"),
    };

    tracing_subscriber::registry()
        .with(
            tracing_tree::HierarchicalLayer::new(2)
                .with_targets(true)
                .with_bracketed_fields(true)
                .with_indent_lines(true)
                .with_timer(tracing_tree::time::Uptime::default())
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpaf::Parser;

    fn opts() -> bpaf::OptionParser<CLIGlobalOptions> {
        cli_global_options().to_options()
    }

    #[test]
    fn defaults() {
        let parsed = opts().run_inner(&[]).unwrap();
        assert!(!parsed.verbose);
        assert!(!parsed.show_warnings);
        assert_eq!(parsed.debug, DebugLevel::Error);
    }

    #[test]
    fn verbose_and_show_warnings_short_flags() {
        let parsed = opts().run_inner(&["-v", "-w"]).unwrap();
        assert!(parsed.verbose);
        assert!(parsed.show_warnings);
    }

    #[test]
    fn debug_level_parses_each_name() {
        for (raw, expected) in [
            ("NOTSET", DebugLevel::NotSet),
            ("DEBUG", DebugLevel::Debug),
            ("INFO", DebugLevel::Info),
            ("WARNING", DebugLevel::Warning),
            ("ERROR", DebugLevel::Error),
            ("CRITICAL", DebugLevel::Critical),
        ] {
            let parsed = opts().run_inner(&["--debug", raw]).unwrap();
            assert_eq!(parsed.debug, expected);
        }
    }

    #[test]
    fn debug_level_rejects_unknown_name() {
        assert!(opts().run_inner(&["--debug", "verbose"]).is_err());
    }
}
