//! cube-export - push tabular rows into a BI server dataset
//!
//! The main entry point for cube-export, handling:
//! - Full exports from a schema file and a JSON Lines row stream
//! - Project listing and folder browsing for configuration pickers
//! - Configuration checks

use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use cube_common::{format_error_human, Error, OutputFormat, ProjectId, Result, Schema, StructuredError};
use cube_config::{load_settings, read_settings, validate_connection, LoadedSettings, Settings};
use cube_core::catalog::{self, Choice, FolderPath};
use cube_core::exit_codes::ExitCode;
use cube_core::http::HttpSession;
use cube_core::input::RowReader;
use cube_core::log_event;
use cube_core::logging::{
    event_names, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use cube_core::{ExportSummary, Exporter};

/// cube-export - Load pipeline rows into BI server datasets
#[derive(Parser)]
#[command(name = "cube-export")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv); also logs the URL and bodies of failing requests
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log line format on stderr (human or jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Export rows into the configured dataset
    Export(ExportArgs),

    /// List projects visible to the configured user
    Projects,

    /// List folder choices of a project
    Browse(BrowseArgs),

    /// Validate configuration without contacting the server
    Check,

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Schema file: {"columns": [{"name": ..., "type": ...}]}
    #[arg(long)]
    schema: PathBuf,

    /// JSON Lines rows; `-` reads stdin
    #[arg(long, default_value = "-")]
    rows: String,
}

#[derive(Args, Debug)]
struct BrowseArgs {
    /// Project id
    #[arg(long)]
    project: String,

    /// Current folder path as stored by a picker ({"names": [...], "ids": [...]})
    #[arg(long)]
    path: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let ctx = LogContext::generate();
    let result = match &cli.command {
        Commands::Export(args) => run_export(&cli.global, args, &ctx),
        Commands::Projects => run_projects(&cli.global, &ctx),
        Commands::Browse(args) => run_browse(&cli.global, args, &ctx),
        Commands::Check => run_check(&cli.global),
        Commands::Version => {
            print_version(&cli.global);
            Ok(ExitCode::Clean)
        }
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => report_error(&cli.global, &e),
    };
    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_export(global: &GlobalOpts, args: &ExportArgs, ctx: &LogContext) -> Result<ExitCode> {
    let loaded = load_settings(global.config.as_deref())?;
    log_loaded(ctx, &loaded);

    let schema = Schema::from_json(&std::fs::read_to_string(&args.schema)?)?;
    let reader = open_rows(&args.rows)?;

    log_event!(
        ctx,
        INFO,
        event_names::RUN_STARTED,
        Stage::Init,
        "Export starting",
        columns = schema.len() as u64
    );

    let settings = with_cli_overrides(loaded.settings, global);
    let mut exporter = Exporter::new(settings.export, &settings.plugin, ctx.clone())?;
    exporter.open(schema.clone())?;
    for row in RowReader::new(reader, schema) {
        exporter.write_row(row?)?;
    }
    let summary = exporter.close()?;

    log_event!(
        ctx,
        INFO,
        event_names::RUN_FINISHED,
        Stage::Close,
        "Export finished",
        rows = summary.rows_written,
        chunks = summary.chunks_sent
    );
    print_summary(global, &summary);

    Ok(if summary.publish.is_complete() {
        ExitCode::Clean
    } else {
        ExitCode::PublishUnknown
    })
}

fn run_projects(global: &GlobalOpts, ctx: &LogContext) -> Result<ExitCode> {
    let mut http = connect(global, ctx)?;
    let result = catalog::project_choices(&mut http);
    http.logout();
    print_choices(global, "projects", &result?);
    Ok(ExitCode::Clean)
}

fn run_browse(global: &GlobalOpts, args: &BrowseArgs, ctx: &LogContext) -> Result<ExitCode> {
    let path = FolderPath::parse(args.path.as_deref().unwrap_or(""))?;
    let project = ProjectId::new(args.project.trim());
    let mut http = connect(global, ctx)?;
    let result = catalog::folder_choices(&mut http, &project, &path);
    http.logout();
    print_choices(global, "folders", &result?);
    Ok(ExitCode::Clean)
}

fn run_check(global: &GlobalOpts) -> Result<ExitCode> {
    let loaded = load_settings(global.config.as_deref())?;
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "status": "ok",
                "config_source": loaded.paths.source.to_string(),
                "snapshot": loaded.snapshot,
            });
            println!("{}", to_pretty(&response));
        }
        OutputFormat::Human => {
            let summary = &loaded.snapshot.summary;
            println!("✓ configuration ok ({})", loaded.paths.source);
            println!("  server:  {}", summary.base_url);
            println!("  user:    {}", summary.username);
            println!(
                "  target:  {} / {}",
                summary.project.as_deref().unwrap_or("-"),
                summary.dataset_name
            );
            println!("  buffer:  {} rows", summary.buffer_size);
        }
    }
    Ok(ExitCode::Clean)
}

fn print_version(global: &GlobalOpts) {
    let version = env!("CARGO_PKG_VERSION");
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "name": "cube-export",
                "version": version,
                "config_schema_version": cube_config::CONFIG_SCHEMA_VERSION,
            });
            println!("{}", to_pretty(&response));
        }
        OutputFormat::Human => println!("cube-export {}", version),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Session for commands that only browse: needs server and credentials only.
fn connect(global: &GlobalOpts, ctx: &LogContext) -> Result<HttpSession> {
    let loaded = read_settings(global.config.as_deref())?;
    validate_connection(&loaded.settings)?;
    log_loaded(ctx, &loaded);

    let settings = with_cli_overrides(loaded.settings, global);
    Ok(HttpSession::connect(
        &settings.plugin,
        settings.export.credentials,
        settings.export.upload.token_lease(),
        ctx.clone(),
    ))
}

/// `-v` turns on request logging for failed calls on top of the config.
fn with_cli_overrides(mut settings: Settings, global: &GlobalOpts) -> Settings {
    settings.plugin.server.verbose |= global.verbose > 0;
    settings
}

fn log_loaded(ctx: &LogContext, loaded: &LoadedSettings) {
    let source = loaded.paths.source.to_string();
    log_event!(
        ctx,
        DEBUG,
        event_names::CONFIG_LOADED,
        Stage::Init,
        "Configuration loaded",
        source = source.as_str(),
        config_hash = loaded.snapshot.config_hash.as_deref().unwrap_or("")
    );
}

fn open_rows(rows: &str) -> Result<Box<dyn BufRead>> {
    if rows == "-" {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(Path::new(rows))?;
    Ok(Box::new(BufReader::new(file)))
}

fn print_summary(global: &GlobalOpts, summary: &ExportSummary) {
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "status": "ok",
                "summary": summary,
            });
            println!("{}", to_pretty(&response));
        }
        OutputFormat::Human => {
            let publish = if summary.publish.is_complete() {
                "published"
            } else {
                "publish status unknown"
            };
            println!(
                "✓ {} rows in {} chunks to dataset {} ({})",
                summary.rows_written, summary.chunks_sent, summary.dataset_id, publish
            );
        }
    }
}

fn print_choices(global: &GlobalOpts, kind: &str, choices: &[Choice]) {
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({ kind: choices });
            println!("{}", to_pretty(&response));
        }
        OutputFormat::Human => {
            if choices.is_empty() {
                println!("No {} found.", kind);
            }
            for choice in choices {
                println!("{:<40} {}", choice.label, choice.value);
            }
        }
    }
}

fn to_pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Human form on stderr, structured form on stdout in JSON mode.
fn report_error(global: &GlobalOpts, err: &Error) -> ExitCode {
    let exit_code = ExitCode::from_error(err);
    let use_color = !global.no_color && io::stderr().is_terminal();
    eprintln!("{}", format_error_human(err, use_color));
    if global.format == OutputFormat::Json {
        let structured =
            StructuredError::from(err).with_context("exit_code", exit_code.code_name());
        println!("{}", structured.to_json_pretty());
    }
    exit_code
}
