//! Binary entry point for the `pokedex` CSV loader.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;
#[path = "cli/ui.rs"]
mod ui;

use std::error::Error;
use std::io;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use pokedex::{
    cli::import_export::{NoProgress, Progress, TableStatus},
    open_store, run_export, run_import,
    schema::{pokedex as builtin, SchemaRegistry},
    ConnectionUri, ExportConfig, ImportConfig,
};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use config::{CliConfig, Settings};
use ui::{Theme, Ui, UiProgress};

const USAGE_NOTES: &str = "\
These commands are only useful for developers:
  import {uri} [dir]    Import data from a set of CSVs to the database given by the URI.
  export {uri} [dir]    Export data from the database given by the URI to a set of CSVs.
                        Directory defaults to the current directory.";

#[derive(Parser, Debug)]
#[command(
    name = "pokedex",
    version,
    about = "pokedex -- a command-line Pokédex interface",
    after_help = USAGE_NOTES,
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "POKEDEX_CONFIG",
        value_name = "FILE",
        help = "CLI config file (defaults to <config dir>/pokedex/cli.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_name = "NAME", help = "Config profile to use")]
    profile: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "TOML schema file replacing the built-in Pokédex tables"
    )]
    schema: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for the run summary"
    )]
    format: OutputFormat,

    #[arg(long, global = true, help = "Plain output without colors or spinners")]
    quiet: bool,

    #[arg(long, global = true, value_enum, default_value_t = ThemeArg::Auto)]
    theme: ThemeArg,

    #[arg(
        long,
        global = true,
        value_name = "FILTER",
        help = "Log filter, e.g. `info` or `pokedex=debug` (overrides RUST_LOG)"
    )]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug)]
struct TransferCmd {
    #[arg(value_name = "URI", help = "Database URI, e.g. sqlite:///pokedex.db")]
    uri: Option<String>,

    #[arg(value_name = "DIR", help = "Directory holding <table>.csv files")]
    directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(
        about = "Import data from a set of CSVs to the database",
        visible_alias = "csvimport"
    )]
    Import(TransferCmd),

    #[command(
        about = "Export data from the database to a set of CSVs",
        visible_alias = "csvexport"
    )]
    Export(TransferCmd),

    #[command(about = "Displays this message")]
    Help,

    #[command(about = "Print shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ThemeArg {
    Auto,
    Light,
    Dark,
    Plain,
}

impl From<ThemeArg> for Theme {
    fn from(theme: ThemeArg) -> Self {
        match theme {
            ThemeArg::Auto => Theme::Auto,
            ThemeArg::Light => Theme::Light,
            ThemeArg::Dark => Theme::Dark,
            ThemeArg::Plain => Theme::Plain,
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // Unknown commands fall back to the usage text.
        Err(err) if err.kind() == ErrorKind::InvalidSubcommand => return print_help(),
        Err(err) => err.exit(),
    };
    install_tracing_subscriber(cli.log_level.as_deref())?;

    match &cli.command {
        None | Some(Command::Help) => print_help()?,
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "pokedex", &mut io::stdout());
        }
        Some(Command::Import(cmd)) => {
            let job = Job::resolve(&cli, cmd)?;
            let mut store = open_store(&job.uri)?;
            let ui = Ui::new(cli.theme.into(), cli.quiet);
            let summary = run_import(
                store.as_mut(),
                &job.registry,
                &ImportConfig {
                    directory: job.directory,
                },
                progress_for(&cli, &ui).as_mut(),
            )?;
            emit(cli.format, &summary, || {
                let loaded = summary
                    .tables
                    .iter()
                    .filter(|t| t.status == TableStatus::Loaded)
                    .count();
                ui.success(&format!(
                    "Imported {} rows into {} of {} tables",
                    summary.rows_imported,
                    loaded,
                    summary.tables.len()
                ));
            })?;
        }
        Some(Command::Export(cmd)) => {
            let job = Job::resolve(&cli, cmd)?;
            let mut store = open_store(&job.uri)?;
            let ui = Ui::new(cli.theme.into(), cli.quiet);
            let summary = run_export(
                store.as_mut(),
                &job.registry,
                &ExportConfig {
                    directory: job.directory,
                },
                progress_for(&cli, &ui).as_mut(),
            )?;
            emit(cli.format, &summary, || {
                ui.success(&format!(
                    "Exported {} rows from {} tables",
                    summary.rows_exported,
                    summary.tables.len()
                ));
            })?;
        }
    }

    Ok(())
}

/// Everything an import or export needs, after merging arguments and config.
struct Job {
    uri: ConnectionUri,
    directory: PathBuf,
    registry: SchemaRegistry,
}

impl Job {
    fn resolve(cli: &Cli, cmd: &TransferCmd) -> Result<Self, Box<dyn Error>> {
        let config = CliConfig::load(cli.config.clone())?;
        debug!(path = ?config.path(), "cli.config_loaded");
        let Settings {
            database,
            directory,
            schema,
        } = config.resolve(cli.profile.as_deref())?;

        // The registry is loaded before anything touches the database.
        let registry = match cli.schema.clone().or(schema) {
            Some(path) => SchemaRegistry::load(&path)?,
            None => builtin::registry()?,
        };

        let raw_uri = cmd.uri.clone().or(database).ok_or(
            "no database URI given; pass one or set [database] default in the config file",
        )?;
        let uri: ConnectionUri = raw_uri.parse()?;
        let directory = cmd
            .directory
            .clone()
            .or(directory)
            .unwrap_or_else(|| PathBuf::from("."));
        debug!(%uri, engine = uri.engine_name(), directory = %directory.display(), tables = registry.len(), "cli.job");

        Ok(Self {
            uri,
            directory,
            registry,
        })
    }
}

fn progress_for<'a>(cli: &Cli, ui: &'a Ui) -> Box<dyn Progress + 'a> {
    match cli.format {
        OutputFormat::Text => Box::new(UiProgress::new(ui)),
        OutputFormat::Json => Box::new(NoProgress),
    }
}

fn print_help() -> Result<(), Box<dyn Error>> {
    Cli::command().print_help()?;
    println!();
    Ok(())
}

fn install_tracing_subscriber(level: Option<&str>) -> Result<(), Box<dyn Error>> {
    let filter = match level {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}
