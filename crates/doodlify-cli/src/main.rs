mod cmd_clear;
mod cmd_phase;
mod cmd_restore;
mod cmd_status;
mod logging;
mod settings;

use clap::{Parser, Subcommand};
use cmd_phase::Phase;
use doodlify_conductor::{AnalyzeOptions, ProcessOptions, PushOptions};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "doodlify",
    version,
    about = "Re-runnable event theming: analyze, process, push"
)]
struct Cli {
    /// Configuration file (JSON, or YAML with a .yaml/.yml extension)
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze the project and file improvement suggestions as issues
    Analyze {
        /// Ignore the cached analysis
        #[arg(long)]
        force: bool,
        /// File every suggestion regardless of reportSuggestions
        #[arg(long)]
        report_all: bool,
    },
    /// Transform files for active events and commit them on event branches
    Process {
        /// Process only this event, ignoring its date window
        #[arg(long)]
        event_id: Option<String>,
        /// Restrict to these paths or glob patterns (comma-separated or repeated)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
        /// Reprocess files that already have a .original backup
        #[arg(long)]
        force: bool,
    },
    /// Push processed event branches and open pull requests
    Push {
        #[arg(long)]
        event_id: Option<String>,
    },
    /// analyze, process and push in one go
    Run {
        #[arg(long)]
        event_id: Option<String>,
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        report_all: bool,
    },
    /// Put .original backups back in place on an event branch
    Restore {
        #[arg(long)]
        event_id: String,
        /// Files to restore (comma-separated); defaults to every modified file
        #[arg(long, value_delimiter = ',')]
        files: Vec<String>,
        /// Working tree to restore in (defaults to the workspace clone)
        #[arg(long)]
        workdir: Option<PathBuf>,
    },
    /// Forget processing state so events start over
    Clear {
        #[arg(long, required_unless_present = "all", conflicts_with = "all")]
        event_id: Option<String>,
        /// Clear every event record
        #[arg(long)]
        all: bool,
    },
    /// Show ledger state for each configured event
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Directory holding the configuration file (and its `.doodlify/` ledger).
pub(crate) fn config_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();
    let config = cli.config.as_path();

    let ok = match cli.cmd {
        Command::Analyze { force, report_all } => cmd_phase::execute(
            config,
            &[Phase::Analyze(AnalyzeOptions { force, report_all })],
        )?,
        Command::Process {
            event_id,
            only,
            force,
        } => cmd_phase::execute(
            config,
            &[Phase::Process(ProcessOptions {
                event_id,
                only,
                force,
            })],
        )?,
        Command::Push { event_id } => {
            cmd_phase::execute(config, &[Phase::Push(PushOptions { event_id })])?
        }
        Command::Run {
            event_id,
            only,
            force,
            report_all,
        } => cmd_phase::execute(
            config,
            &[
                Phase::Analyze(AnalyzeOptions {
                    force: false,
                    report_all,
                }),
                Phase::Process(ProcessOptions {
                    event_id: event_id.clone(),
                    only,
                    force,
                }),
                Phase::Push(PushOptions { event_id }),
            ],
        )?,
        Command::Restore {
            event_id,
            files,
            workdir,
        } => cmd_restore::execute(config, &event_id, &files, workdir)?,
        Command::Clear { event_id, all: _ } => {
            cmd_clear::execute(config, event_id.as_deref())?;
            true
        }
        Command::Status { json } => {
            cmd_status::execute(config, json)?;
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const CONFIG: &str = r#"{
        "project": {"name": "shop"},
        "events": [
            {"id": "halloween", "name": "Halloween", "startDate": "2026-10-01", "endDate": "2026-10-31", "branch": "halloween"}
        ]
    }"#;

    #[test]
    fn parses_process_flags() {
        let cli = Cli::try_parse_from([
            "doodlify",
            "process",
            "--event-id",
            "halloween",
            "--only",
            "a.png,public/*.jpg",
            "--force",
            "--config",
            "site/doodlify.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("site/doodlify.yaml"));
        match cli.cmd {
            Command::Process {
                event_id,
                only,
                force,
            } => {
                assert_eq!(event_id.as_deref(), Some("halloween"));
                assert_eq!(only, vec!["a.png", "public/*.jpg"]);
                assert!(force);
            }
            _ => panic!("expected process"),
        }
    }

    #[test]
    fn clear_needs_a_target() {
        assert!(Cli::try_parse_from(["doodlify", "clear"]).is_err());
        assert!(Cli::try_parse_from(["doodlify", "clear", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["doodlify", "clear", "--all", "--event-id", "x"]).is_err());
    }

    #[test]
    fn restore_splits_files() {
        let cli = Cli::try_parse_from([
            "doodlify",
            "restore",
            "--event-id",
            "halloween",
            "--files",
            "a.png,b.json",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("config.json"));
        match cli.cmd {
            Command::Restore { files, .. } => assert_eq!(files, vec!["a.png", "b.json"]),
            _ => panic!("expected restore"),
        }
    }

    #[test]
    fn config_dir_of_bare_file_name_is_cwd() {
        assert_eq!(config_dir(Path::new("config.json")), PathBuf::from("."));
        assert_eq!(config_dir(Path::new("site/config.json")), PathBuf::from("site"));
    }
}
