use anyhow::Context;
use clap::Parser;
use sampleview::cli::{Cli, Command};
use sampleview::error::exit_code;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS as u8),
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(err) = e.downcast_ref::<sampleview::Error>() {
                ExitCode::from(err.exit_code() as u8)
            } else {
                ExitCode::from(exit_code::GENERAL_ERROR as u8)
            }
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    // Validate CLI arguments
    cli.validate()
        .map_err(sampleview::Error::InvalidArgument)
        .context("Invalid arguments")?;

    match &cli.command {
        Command::Threads { file, view } => {
            let file = &resolve_profile(file.as_deref())?;
            sampleview::commands::threads::run(file, view)
                .with_context(|| format!("Failed to list threads of {}", file.display()))?;
        }
        Command::Tree {
            file,
            view,
            depth,
            threshold,
            output,
        } => {
            let file = &resolve_profile(file.as_deref())?;
            sampleview::commands::tree::run(file, view, *depth, *threshold, *output)
                .with_context(|| format!("Failed to build call tree of {}", file.display()))?;
        }
        Command::Top {
            file,
            view,
            top,
            threshold,
            output,
        } => {
            let file = &resolve_profile(file.as_deref())?;
            sampleview::commands::top::run(file, view, *top, *threshold, *output)
                .with_context(|| format!("Failed to summarize {}", file.display()))?;
        }
        Command::List { dir } => {
            sampleview::commands::list::run(dir.as_deref())?;
        }
        Command::Completions { shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "sampleview", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn resolve_profile(file: Option<&Path>) -> anyhow::Result<PathBuf> {
    match file {
        Some(f) => Ok(f.to_path_buf()),
        None => {
            // Find most recent profile
            sampleview::commands::list::most_recent_profile(Path::new("."))?.ok_or_else(|| {
                anyhow::anyhow!(
                    "No profiles found. Run 'sampleview list' to see available profiles."
                )
            })
        }
    }
}
