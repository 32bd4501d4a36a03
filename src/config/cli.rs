use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::domain::exports::ExportFormat;

/// Command-line arguments for the Deckport binary.
#[derive(Debug, Parser)]
#[command(name = "deckport", version, about = "Deck export service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "DECKPORT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API together with export workers and the reconciler.
    Serve(Box<ServeArgs>),
    /// Run export workers and the reconciler without the HTTP API.
    Worker(Box<WorkerArgs>),
    /// Render a deck JSON file to disk without touching the database.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the jobs database pool size.
    #[arg(long = "database-jobs-max-connections", value_name = "COUNT")]
    pub database_jobs_max_connections: Option<u32>,

    /// Override the number of exports rendered at once.
    #[arg(long = "jobs-export-concurrency", value_name = "COUNT")]
    pub jobs_export_concurrency: Option<u32>,

    /// Override the per-export render time limit.
    #[arg(long = "jobs-render-timeout-seconds", value_name = "SECONDS")]
    pub jobs_render_timeout_seconds: Option<u64>,

    /// Override how long a job may stay processing before it is failed.
    #[arg(long = "jobs-stale-processing-seconds", value_name = "SECONDS")]
    pub jobs_stale_processing_seconds: Option<u64>,

    /// Override how often stale jobs are swept.
    #[arg(long = "jobs-reconcile-interval-seconds", value_name = "SECONDS")]
    pub jobs_reconcile_interval_seconds: Option<u64>,

    /// Override the artifact directory.
    #[arg(long = "artifacts-directory", value_name = "PATH")]
    pub artifacts_directory: Option<PathBuf>,

    /// Override the base URL used to build download links.
    #[arg(long = "artifacts-public-base-url", value_name = "URL")]
    pub artifacts_public_base_url: Option<String>,

    /// Override the theme used when a deck names none or an unknown one.
    #[arg(long = "render-default-theme", value_name = "THEME")]
    pub render_default_theme: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub overrides: WorkerOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub worker: WorkerOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the HTTP database pool size.
    #[arg(long = "database-http-max-connections", value_name = "COUNT")]
    pub database_http_max_connections: Option<u32>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Deck document (JSON) to render.
    #[arg(value_name = "DECK_JSON", value_hint = ValueHint::FilePath)]
    pub deck: PathBuf,

    /// Output format.
    #[arg(long, value_name = "FORMAT", value_parser = parse_export_format)]
    pub format: ExportFormat,

    /// Where to write the rendered file.
    #[arg(long, short = 'o', value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// Theme to apply; defaults to the deck's own theme, then the configured default.
    #[arg(long, value_name = "THEME")]
    pub theme: Option<String>,

    /// Fix the document timestamp (RFC 3339) for reproducible output.
    #[arg(long = "generated-at", value_name = "TIMESTAMP")]
    pub generated_at: Option<String>,
}

fn parse_export_format(value: &str) -> Result<ExportFormat, String> {
    value.parse::<ExportFormat>().map_err(|err| err.to_string())
}
