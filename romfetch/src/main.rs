use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use romfetch::config::AppConfig;
use romfetch::exit::ExitStatus;
use romfetch::runtime::{self, SyncRuntime};
use romfetch::sync::SyncReport;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "romfetch",
    version,
    about = "Mirror starred Google Drive ROM folders into a RetroPie tree"
)]
struct Cli {
    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
enum Command {
    /// Reconcile every starred folder with its local directory (default)
    Sync {
        /// Report what would change without touching the disk
        #[arg(long)]
        dry_run: bool,
        /// Print the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Authorize read-only Drive access and store the credentials
    Login,
    /// Remove stored credentials
    Logout,
}

impl Default for Command {
    fn default() -> Self {
        Command::Sync {
            dry_run: false,
            json: false,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let command = cli.command.unwrap_or_default();
    let status = tokio::select! {
        status = execute(command) => status,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            ExitStatus::Interrupted
        }
    };
    status.into()
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn execute(command: Command) -> ExitStatus {
    let result = match command {
        Command::Sync { dry_run, json } => sync(dry_run, json).await,
        Command::Login => login().await,
        Command::Logout => runtime::logout().map(|()| ExitStatus::Synced),
    };
    result.unwrap_or_else(|err| {
        error!("{err:#}");
        ExitStatus::from_error(&err)
    })
}

async fn sync(dry_run: bool, json: bool) -> anyhow::Result<ExitStatus> {
    let config = AppConfig::from_env()?;
    let runtime = SyncRuntime::bootstrap(config).await?;
    let report = runtime.run(dry_run).await?;
    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        println!("{rendered}");
    } else {
        print_summary(&report);
    }
    Ok(status_for(&report))
}

async fn login() -> anyhow::Result<ExitStatus> {
    let config = AppConfig::from_env()?;
    runtime::login(&config).await?;
    Ok(ExitStatus::Synced)
}

fn status_for(report: &SyncReport) -> ExitStatus {
    if report.has_failures() {
        ExitStatus::PartialFailure
    } else {
        ExitStatus::Synced
    }
}

fn print_summary(report: &SyncReport) {
    for folder in &report.folders {
        let prefix = if folder.dry_run { "would " } else { "" };
        println!(
            "{}: {prefix}delete {}, {prefix}download {}, failed {}",
            folder.folder,
            folder.deleted.len(),
            folder.downloaded.len(),
            folder.failed.len()
        );
        for failure in &folder.failed {
            println!("  ! {}: {}", failure.name, failure.error);
        }
    }
    if !report.skipped.is_empty() {
        let names: Vec<_> = report
            .skipped
            .iter()
            .map(|skipped| skipped.folder.as_str())
            .collect();
        println!("skipped: {}", names.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use romfetch::sync::{FileFailure, FolderReport};

    #[test]
    fn defaults_to_sync() {
        let cli = Cli::try_parse_from(["romfetch"]).unwrap();
        assert_eq!(cli.command.unwrap_or_default(), Command::default());
    }

    #[test]
    fn parses_sync_flags_and_verbosity() {
        let cli = Cli::try_parse_from(["romfetch", "-vv", "sync", "--dry-run", "--json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.command,
            Some(Command::Sync {
                dry_run: true,
                json: true
            })
        );
    }

    #[test]
    fn parses_login_and_logout() {
        let login = Cli::try_parse_from(["romfetch", "login"]).unwrap();
        assert_eq!(login.command, Some(Command::Login));
        let logout = Cli::try_parse_from(["romfetch", "logout"]).unwrap();
        assert_eq!(logout.command, Some(Command::Logout));
    }

    #[test]
    fn rejects_unknown_arguments() {
        assert!(Cli::try_parse_from(["romfetch", "--purge"]).is_err());
    }

    #[test]
    fn failed_files_yield_partial_status() {
        let mut folder = FolderReport::new("NES", "/roms/nes", false);
        let mut report = SyncReport::default();
        report.folders.push(folder.clone());
        assert_eq!(status_for(&report), ExitStatus::Synced);

        folder.failed.push(FileFailure {
            name: "zelda.nes".into(),
            error: "timed out".into(),
        });
        report.folders.push(folder);
        assert_eq!(status_for(&report), ExitStatus::PartialFailure);
    }
}
