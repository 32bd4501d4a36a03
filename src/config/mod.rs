//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{
    CliArgs, Command, LoggingOverrides, RenderArgs, ServeArgs, ServeOverrides, WorkerArgs,
    WorkerOverrides,
};

use crate::application::render::find_theme;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "deckport";
const ENV_PREFIX: &str = "DECKPORT";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_HTTP_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_JOBS_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_EXPORT_CONCURRENCY: u32 = 2;
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_STALE_PROCESSING_SECS: u64 = 900;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_ARTIFACT_DIR: &str = "artifacts";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:3000";
pub(crate) const DEFAULT_THEME: &str = "default";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub jobs: JobsSettings,
    pub artifacts: ArtifactSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub http_max_connections: NonZeroU32,
    pub jobs_max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub export_concurrency: NonZeroU32,
    pub render_timeout: Duration,
    /// Jobs in `processing` longer than this are failed by the reconciler.
    pub stale_processing: Duration,
    pub reconcile_interval: Duration,
    pub max_attempts: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub directory: PathBuf,
    /// Without a trailing slash.
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub default_theme: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Worker(args)) => raw.apply_worker_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_logging_overrides(&args.logging),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    jobs: RawJobsSettings,
    artifacts: RawArtifactSettings,
    render: RawRenderSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(max) = overrides.database_http_max_connections {
            self.database.http_max_connections = Some(max);
        }

        self.apply_worker_overrides(&overrides.worker);
    }

    fn apply_worker_overrides(&mut self, overrides: &WorkerOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_jobs_max_connections {
            self.database.jobs_max_connections = Some(max);
        }
        if let Some(value) = overrides.jobs_export_concurrency {
            self.jobs.export_concurrency = Some(value);
        }
        if let Some(seconds) = overrides.jobs_render_timeout_seconds {
            self.jobs.render_timeout_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.jobs_stale_processing_seconds {
            self.jobs.stale_processing_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.jobs_reconcile_interval_seconds {
            self.jobs.reconcile_interval_seconds = Some(seconds);
        }
        if let Some(directory) = overrides.artifacts_directory.as_ref() {
            self.artifacts.directory = Some(directory.clone());
        }
        if let Some(url) = overrides.artifacts_public_base_url.as_ref() {
            self.artifacts.public_base_url = Some(url.clone());
        }
        if let Some(theme) = overrides.render_default_theme.as_ref() {
            self.render.default_theme = Some(theme.clone());
        }

        self.apply_logging_overrides(&overrides.logging);
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            jobs,
            artifacts,
            render,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            jobs: build_jobs_settings(jobs)?,
            artifacts: build_artifact_settings(artifacts)?,
            render: build_render_settings(render)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_shutdown = positive_seconds(
        server
            .graceful_shutdown_seconds
            .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS),
        "server.graceful_shutdown_seconds",
    )?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let http_value = database
        .http_max_connections
        .unwrap_or(DEFAULT_DB_HTTP_MAX_CONNECTIONS);
    let jobs_value = database
        .jobs_max_connections
        .unwrap_or(DEFAULT_DB_JOBS_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url,
        http_max_connections: non_zero_u32(http_value.into(), "database.http_max_connections")?,
        jobs_max_connections: non_zero_u32(jobs_value.into(), "database.jobs_max_connections")?,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let export_concurrency = non_zero_u32(
        jobs.export_concurrency
            .unwrap_or(DEFAULT_EXPORT_CONCURRENCY)
            .into(),
        "jobs.export_concurrency",
    )?;
    let max_attempts = non_zero_u32(
        jobs.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).into(),
        "jobs.max_attempts",
    )?;
    i32::try_from(max_attempts.get())
        .map_err(|_| LoadError::invalid("jobs.max_attempts", "value exceeds supported range"))?;

    let render_timeout = positive_seconds(
        jobs.render_timeout_seconds
            .unwrap_or(DEFAULT_RENDER_TIMEOUT_SECS),
        "jobs.render_timeout_seconds",
    )?;
    let stale_processing = positive_seconds(
        jobs.stale_processing_seconds
            .unwrap_or(DEFAULT_STALE_PROCESSING_SECS),
        "jobs.stale_processing_seconds",
    )?;
    let reconcile_interval = positive_seconds(
        jobs.reconcile_interval_seconds
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS),
        "jobs.reconcile_interval_seconds",
    )?;

    if stale_processing <= render_timeout {
        return Err(LoadError::invalid(
            "jobs.stale_processing_seconds",
            "must be greater than jobs.render_timeout_seconds",
        ));
    }

    Ok(JobsSettings {
        export_concurrency,
        render_timeout,
        stale_processing,
        reconcile_interval,
        max_attempts,
    })
}

fn build_artifact_settings(artifacts: RawArtifactSettings) -> Result<ArtifactSettings, LoadError> {
    let directory = artifacts
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "artifacts.directory",
            "path must not be empty",
        ));
    }

    let raw_url = artifacts
        .public_base_url
        .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());
    let parsed = Url::parse(raw_url.trim())
        .map_err(|err| LoadError::invalid("artifacts.public_base_url", err.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "artifacts.public_base_url",
            "scheme must be http or https",
        ));
    }

    Ok(ArtifactSettings {
        directory,
        public_base_url: parsed.as_str().trim_end_matches('/').to_string(),
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let default_theme = render
        .default_theme
        .map(|theme| theme.trim().to_string())
        .unwrap_or_else(|| DEFAULT_THEME.to_string());

    if find_theme(&default_theme).is_none() {
        return Err(LoadError::invalid(
            "render.default_theme",
            format!("unknown theme `{default_theme}`"),
        ));
    }

    Ok(RenderSettings { default_theme })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    http_max_connections: Option<u32>,
    jobs_max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    export_concurrency: Option<u32>,
    render_timeout_seconds: Option<u64>,
    stale_processing_seconds: Option<u64>,
    reconcile_interval_seconds: Option<u64>,
    max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawArtifactSettings {
    directory: Option<PathBuf>,
    public_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    default_theme: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
