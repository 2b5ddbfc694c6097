use crate::ops::ImplementationFilter;
use crate::profile::ThreadsKey;
use crate::summary::CallTreeSummaryStrategy;
use crate::transforms::Transform;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "sampleview")]
#[command(about = "Filtered call trees over recorded sampling profiles")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the threads of a profile
    Threads {
        /// Profile database file (defaults to most recent)
        file: Option<PathBuf>,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// Print the call tree of a thread after filtering
    Tree {
        /// Profile database file (defaults to most recent)
        file: Option<PathBuf>,

        #[command(flatten)]
        view: ViewArgs,

        /// Deepest call node level to print
        #[arg(long, short = 'd')]
        depth: Option<usize>,

        /// Minimum percentage of the total to print a node
        #[arg(long, short = 't', default_value = "0")]
        threshold: f64,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print the heaviest functions of a thread after filtering
    Top {
        /// Profile database file (defaults to most recent)
        file: Option<PathBuf>,

        #[command(flatten)]
        view: ViewArgs,

        /// Number of entries to display
        #[arg(long, short = 'n', default_value = "20")]
        top: usize,

        /// Minimum self percentage to display
        #[arg(long, short = 't', default_value = "0")]
        threshold: f64,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List saved profile databases
    List {
        /// Directory to search (defaults to current directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// View parameters shared by every command that reads a thread.
#[derive(Args, Debug, Clone)]
pub struct ViewArgs {
    /// Thread index, or comma separated indexes to merge
    #[arg(long, default_value = "0", value_parser = parse_threads_key)]
    pub thread: ThreadsKey,

    /// Committed range, offsets from the profile start (e.g. 1s..2s, 250..900)
    #[arg(long, value_parser = parse_time_range)]
    pub range: Option<TimeRange>,

    /// Preview selection inside the committed range, same offsets as --range
    #[arg(long, value_parser = parse_time_range)]
    pub preview: Option<TimeRange>,

    /// Transform to apply, in order (e.g. mf-3, f-combined-0,1)
    #[arg(long = "transform", short = 'x', value_parser = parse_transform)]
    pub transforms: Vec<Transform>,

    /// Implementation filter: combined, js or cpp
    #[arg(long, default_value = "combined", value_parser = parse_implementation)]
    pub implementation: ImplementationFilter,

    /// Keep only samples whose stack matches; comma separated terms match any
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Invert call stacks
    #[arg(long)]
    pub invert: bool,

    /// What the call tree sums up
    #[arg(long, default_value = "timing", value_parser = parse_summary)]
    pub summary: CallTreeSummaryStrategy,

    /// Only show frames of this browser tab
    #[arg(long)]
    pub tab: Option<u64>,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct OutputArgs {
    /// Output as JSON
    #[arg(long, conflicts_with = "csv")]
    pub json: bool,

    /// Output as CSV
    #[arg(long)]
    pub csv: bool,
}

/// `START..END` offsets from the start of the profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: Duration,
    pub end: Duration,
}

impl TimeRange {
    pub fn start_ms(&self) -> f64 {
        self.start.as_secs_f64() * 1000.0
    }

    pub fn end_ms(&self) -> f64 {
        self.end.as_secs_f64() * 1000.0
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    // Try humantime first
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }

    // Try bare number as milliseconds
    if let Ok(ms) = s.parse::<f64>()
        && ms.is_finite()
        && ms >= 0.0
    {
        return Ok(Duration::from_secs_f64(ms / 1000.0));
    }

    Err(format!(
        "Invalid duration '{}'. Examples: 250ms, 1s, 2m, 1s500ms, 250",
        s
    ))
}

fn parse_time_range(s: &str) -> Result<TimeRange, String> {
    let (start, end) = s
        .split_once("..")
        .ok_or_else(|| format!("Invalid range '{}'. Expected START..END", s))?;
    let range = TimeRange {
        start: parse_duration(start.trim())?,
        end: parse_duration(end.trim())?,
    };
    if range.start > range.end {
        return Err(format!("Range '{}' ends before it starts", s));
    }
    Ok(range)
}

fn parse_threads_key(s: &str) -> Result<ThreadsKey, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}

fn parse_transform(s: &str) -> Result<Transform, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}

fn parse_implementation(s: &str) -> Result<ImplementationFilter, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}

fn parse_summary(s: &str) -> Result<CallTreeSummaryStrategy, String> {
    s.parse().map_err(|e: crate::Error| e.to_string())
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        let view = match &self.command {
            Command::Threads { view, .. }
            | Command::Tree { view, .. }
            | Command::Top { view, .. } => view,
            Command::List { .. } | Command::Completions { .. } => return Ok(()),
        };

        if let (Some(preview), Some(range)) = (view.preview, view.range)
            && (preview.start < range.start || preview.end > range.end)
        {
            return Err("--preview must lie inside --range".to_string());
        }

        match &self.command {
            Command::Tree { threshold, .. } | Command::Top { threshold, .. }
                if !(0.0..=100.0).contains(threshold) =>
            {
                Err(format!(
                    "Threshold must be between 0 and 100, got {}",
                    threshold
                ))
            }
            _ => Ok(()),
        }
    }

    /// Log filter for `env_logger`, unless `RUST_LOG` overrides it.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_default_to_milliseconds() {
        assert_eq!(parse_duration("250"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn ranges_parse() {
        let range = parse_time_range("1s..1500").unwrap();
        assert_eq!(range.start_ms(), 1000.0);
        assert_eq!(range.end_ms(), 1500.0);
        assert!(parse_time_range("5..1").is_err());
        assert!(parse_time_range("5").is_err());
    }

    #[test]
    fn tree_arguments() {
        let cli = Cli::try_parse_from([
            "sampleview",
            "tree",
            "p.sampleview.db",
            "--thread",
            "0,2",
            "-x",
            "mf-3",
            "-x",
            "ff-1",
            "--implementation",
            "js",
            "--invert",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.log_level(), log::LevelFilter::Trace);
        let Command::Tree { view, .. } = &cli.command else {
            panic!("expected tree");
        };
        assert_eq!(view.thread.to_string(), "0,2");
        assert_eq!(view.transforms.len(), 2);
        assert_eq!(view.implementation, ImplementationFilter::Js);
        assert!(view.invert);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn preview_outside_range_is_rejected() {
        let cli = Cli::try_parse_from([
            "sampleview",
            "top",
            "p.sampleview.db",
            "--range",
            "10..20",
            "--preview",
            "5..15",
        ])
        .unwrap();
        assert!(cli.validate().is_err());
    }
}
