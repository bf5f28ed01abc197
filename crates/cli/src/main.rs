use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use recomp_correlate::commands::{
    correlate_command, init_project_command, list_events_command, list_matches_command,
    list_runs_command, project_info_command, show_entity_command, CorrelateArgs,
};
use recomp_correlate::init_logging;

/// Address correlation between an original binary and its recompilation.
///
/// This CLI is a thin wrapper around `correlate-core` (exposed in code as
/// `correlate_core`). All substantive logic lives in the library so it can be
/// tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "recomp-correlate",
    version,
    about = "Correlate original and recompiled binary entities",
    long_about = None
)]
struct Cli {
    /// Log debug output to stderr (overridden by RUST_LOG).
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new correlation project at the given root.
    ///
    /// This will:
    /// - Create a `.correlate` metadata directory and a `reports` directory.
    /// - Write a `.correlate/project.json` config file.
    /// - Create the project database.
    InitProject {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Optional project name. If omitted, the name is derived from the root directory.
        #[arg(long)]
        name: Option<String>,
    },

    /// Show config, layout, and run count of an existing project.
    ProjectInfo {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Ingest a bundle, run every matching pass, verify, and record the run.
    Correlate {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Ingestion bundle (`.json`, `.yaml` or `.yml`).
        #[arg(long)]
        input: String,

        /// Original binary (PE or ELF) used to read strings and verify.
        #[arg(long)]
        orig_image: Option<String>,

        /// Recompiled binary (PE or ELF) used to read strings.
        #[arg(long)]
        recomp_image: Option<String>,

        /// Run label. Defaults to the bundle's file name.
        #[arg(long)]
        label: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List matched entities saved by the last run.
    ListMatches {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Only list entities of this type (e.g. function, vtable).
        #[arg(long)]
        entity_type: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show the saved entity at an orig or recomp address.
    #[command(group(ArgGroup::new("side").required(true).args(["orig", "recomp"])))]
    Show {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Orig address (hex `0x..` or decimal).
        #[arg(long)]
        orig: Option<String>,

        /// Recomp address (hex `0x..` or decimal).
        #[arg(long)]
        recomp: Option<String>,

        /// Fall back to the nearest entity below the address.
        #[arg(long, default_value_t = false)]
        floor: bool,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List recorded correlation runs.
    ListRuns {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the events recorded for one run.
    ListEvents {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Run id as shown by `list-runs`.
        #[arg(long)]
        run_id: i64,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Command::InitProject { root, name } => init_project_command(&root, name)?,
        Command::ProjectInfo { root, json } => project_info_command(&root, json)?,
        Command::Correlate { root, input, orig_image, recomp_image, label, json } => {
            let args = CorrelateArgs { input, orig_image, recomp_image, label };
            correlate_command(&root, &args, json)?;
        }
        Command::ListMatches { root, entity_type, json } => {
            list_matches_command(&root, entity_type.as_deref(), json)?
        }
        Command::Show { root, orig, recomp, floor, json } => {
            show_entity_command(&root, orig.as_deref(), recomp.as_deref(), floor, json)?
        }
        Command::ListRuns { root, json } => list_runs_command(&root, json)?,
        Command::ListEvents { root, run_id, json } => list_events_command(&root, run_id, json)?,
    }

    Ok(())
}
