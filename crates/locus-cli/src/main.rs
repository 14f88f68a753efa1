#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use cmd::Workspace;
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "locus: replay and inspect outline tree sync state",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format. Overrides `--json` and the `FORMAT` env var.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Tree state file. Defaults to `.locus/tree.json` in the current directory.
    #[arg(long, global = true, value_name = "PATH")]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Apply a JSON Lines event log to the saved tree",
        long_about = "Apply local edits, fetch results, selections and removals from a JSON\n\
                      Lines event log, then save the resulting tree. Each line is one\n\
                      {\"type\": ..., \"payload\": ...} object.",
        after_help = "EXAMPLES:\n    # Apply a log to .locus/tree.json\n    locus replay events.jsonl\n\n\
                      # Start over from a seeded tree with a fixed clock\n    locus replay events.jsonl --fresh --now 1700000000000\n\n\
                      # Read events from stdin without saving\n    cat events.jsonl | locus replay - --dry-run"
    )]
    Replay(cmd::replay::ReplayArgs),

    #[command(
        about = "Show the outline below a node",
        after_help = "EXAMPLES:\n    # Whole tree\n    locus show\n\n\
                      # One list\n    locus show list-1\n\n\
                      # Tree view as JSON (nodeDBMap / nodeUIMap)\n    locus show --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(about = "Check the child index against the node records")]
    Verify,

    #[command(about = "List nodes pinned to the dashboard")]
    Pinned,

    #[command(about = "Deterministic sync simulation")]
    Sim(cmd::sim::SimArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOCUS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "locus=debug,info"
        } else {
            "locus=info,warn"
        })
    });

    let format = env::var("LOCUS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Pick the output mode: an explicit `--format` first, then the mode
/// resolved with project and user config.
fn output_mode(cli: &Cli, workspace: Option<&Workspace>) -> OutputMode {
    if let Some(mode) = cli.format {
        return mode;
    }
    workspace
        .and_then(|ws| OutputMode::from_str(&ws.config.resolved_output, true).ok())
        .unwrap_or_else(|| resolve_output_mode(None, cli.json))
}

fn run(cli: &Cli, workspace: &Workspace, output: OutputMode) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Replay(args) => cmd::replay::run_replay(args, output, workspace),
        Commands::Show(args) => cmd::show::run_show(args, output, workspace),
        Commands::Verify => cmd::verify::run_verify(output, workspace),
        Commands::Pinned => cmd::pinned::run_pinned(output, workspace),
        Commands::Sim(args) => cmd::sim::run_sim(args, output),
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let result = env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|root| Workspace::open(&root, cli.state.clone(), cli.json));
    let (output, result) = match result {
        Ok(workspace) => {
            let output = output_mode(&cli, Some(&workspace));
            (output, run(&cli, &workspace, output))
        }
        Err(err) => (output_mode(&cli, None), Err(err)),
    };

    if let Err(err) = result {
        if render_error(output, &CliError::from(&err)).is_err() {
            eprintln!("error: {err:#}");
        }
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_parses_after_subcommand() {
        let cli = Cli::parse_from(["locus", "verify", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Verify));
    }

    #[test]
    fn format_flag_wins_over_json() {
        let cli = Cli::parse_from(["locus", "--json", "--format", "text", "pinned"]);
        assert_eq!(output_mode(&cli, None), OutputMode::Text);
    }

    #[test]
    fn state_flag_is_global() {
        let cli = Cli::parse_from(["locus", "show", "--state", "/tmp/t.json", "list-1"]);
        assert_eq!(cli.state, Some(PathBuf::from("/tmp/t.json")));
        let Commands::Show(args) = cli.command else {
            panic!("expected show");
        };
        assert_eq!(args.id.as_deref(), Some("list-1"));
    }

    #[test]
    fn replay_flags_parse() {
        let cli = Cli::parse_from([
            "locus", "replay", "log.jsonl", "--fresh", "--dry-run", "--now", "1700000000000",
        ]);
        let Commands::Replay(args) = cli.command else {
            panic!("expected replay");
        };
        assert!(args.fresh && args.dry_run);
        assert_eq!(args.now, Some(1_700_000_000_000));
    }

    #[test]
    fn sim_replay_flattens_params() {
        let cli = Cli::parse_from(["locus", "sim", "replay", "--seed", "7", "--writers", "3"]);
        let Commands::Sim(args) = cli.command else {
            panic!("expected sim");
        };
        let cmd::sim::SimCommand::Replay(replay) = args.command else {
            panic!("expected replay");
        };
        assert_eq!(replay.seed, 7);
        assert_eq!(replay.params.writers, 3);
        assert_eq!(replay.params.rounds, 32);
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
