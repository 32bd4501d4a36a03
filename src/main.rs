use std::{process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use deckport::{
    application::{
        error::AppError,
        exports::ExportService,
        jobs::{ExportWorkerContext, JobsExportQueue, process_export_job, spawn_reconciler},
        render::{
            InFlightRenders, RenderPipelineConfig, RenderRequest, RenderService,
            configure_render_service, render_service,
        },
        repos::{ArtifactStore, DecksRepo, ExportJobsRepo, ExportQueue, JobsRepo},
    },
    config,
    domain::{deck::Deck, types::JobType},
    infra::{
        artifacts::FilesystemArtifactStore,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        telemetry,
    },
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;
    configure_render_service(RenderPipelineConfig::from(&settings.render))
        .map_err(|err| AppError::unexpected(err.to_string()))?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Worker(_) => run_worker(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (http_repositories, job_repositories) = init_repositories(&settings).await?;
    let artifacts = init_artifact_store(&settings)?;

    let decks_repo: Arc<dyn DecksRepo> = http_repositories.clone();
    let export_jobs_repo: Arc<dyn ExportJobsRepo> = http_repositories.clone();
    let jobs_repo: Arc<dyn JobsRepo> = http_repositories.clone();
    let queue: Arc<dyn ExportQueue> = Arc::new(JobsExportQueue::new(
        jobs_repo,
        settings.jobs.max_attempts.get(),
    ));

    let exports = Arc::new(ExportService::new(
        decks_repo,
        export_jobs_repo,
        queue,
        artifacts.clone(),
        settings.render.default_theme.clone(),
    ));
    let api_state = ApiState::new(exports);

    let worker_context = build_worker_context(job_repositories.clone(), artifacts, &settings);
    let monitor_handle = spawn_job_monitor(job_repositories.clone(), worker_context, &settings.jobs);
    let reconcile_handle = spawn_reconciler(
        job_repositories,
        settings.jobs.reconcile_interval,
        settings.jobs.stale_processing,
    );

    let result = serve_http(&settings, api_state).await;

    for handle in [monitor_handle, reconcile_handle] {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn run_worker(settings: config::Settings) -> Result<(), AppError> {
    let (_, job_repositories) = init_repositories(&settings).await?;
    let artifacts = init_artifact_store(&settings)?;

    let worker_context = build_worker_context(job_repositories.clone(), artifacts, &settings);
    let monitor_handle = spawn_job_monitor(job_repositories.clone(), worker_context, &settings.jobs);
    let reconcile_handle = spawn_reconciler(
        job_repositories,
        settings.jobs.reconcile_interval,
        settings.jobs.stale_processing,
    );

    info!(
        target = "deckport::worker",
        concurrency = settings.jobs.export_concurrency.get(),
        "export worker running"
    );
    shutdown_signal().await;
    info!(target = "deckport::worker", "shutting down export worker");

    for handle in [monitor_handle, reconcile_handle] {
        handle.abort();
        let _ = handle.await;
    }

    Ok(())
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let raw = tokio::fs::read(&args.deck)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let deck: Deck = serde_json::from_slice(&raw).map_err(|err| {
        AppError::validation(format!("{} is not a deck: {err}", args.deck.display()))
    })?;

    let theme = args
        .theme
        .clone()
        .or_else(|| deck.meta.theme_id.clone())
        .unwrap_or_else(|| settings.render.default_theme.clone());

    let mut request = RenderRequest::new(deck, args.format, theme);
    if let Some(value) = args.generated_at.as_deref() {
        let generated_at = OffsetDateTime::parse(value, &Rfc3339).map_err(|err| {
            AppError::validation(format!("--generated-at must be RFC 3339: {err}"))
        })?;
        request = request.with_generated_at(generated_at);
    }

    let renderer = render_service();
    let artifact = tokio::task::spawn_blocking(move || renderer.render(&request))
        .await
        .map_err(|err| AppError::unexpected(format!("render task failed: {err}")))?
        .map_err(|err| AppError::unexpected(format!("render failed: {err}")))?;

    tokio::fs::write(&args.output, &artifact.bytes)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "deckport::render",
        output = %args.output.display(),
        format = %artifact.format,
        theme = artifact.theme_id,
        slides = artifact.slide_count,
        bytes = artifact.bytes.len(),
        "deck rendered"
    );
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<(Arc<PostgresRepositories>, Arc<PostgresRepositories>), AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let http_pool =
        PostgresRepositories::connect(database_url, settings.database.http_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&http_pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let jobs_pool =
        PostgresRepositories::connect(database_url, settings.database.jobs_max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok((
        Arc::new(PostgresRepositories::new(http_pool)),
        Arc::new(PostgresRepositories::new(jobs_pool)),
    ))
}

fn init_artifact_store(settings: &config::Settings) -> Result<Arc<dyn ArtifactStore>, AppError> {
    let store = FilesystemArtifactStore::new(settings.artifacts.directory.clone())
        .map_err(|err| AppError::from(InfraError::Io(err)))?;
    Ok(Arc::new(store))
}

fn build_worker_context(
    repositories: Arc<PostgresRepositories>,
    artifacts: Arc<dyn ArtifactStore>,
    settings: &config::Settings,
) -> ExportWorkerContext {
    ExportWorkerContext {
        decks: repositories.clone(),
        jobs: repositories,
        artifacts,
        renderer: render_service(),
        inflight_renders: InFlightRenders::new(),
        public_base_url: settings.artifacts.public_base_url.clone(),
        render_timeout: settings.jobs.render_timeout,
    }
}

fn spawn_job_monitor(
    repositories: Arc<PostgresRepositories>,
    context: ExportWorkerContext,
    jobs: &config::JobsSettings,
) -> JoinHandle<()> {
    let export_storage = PostgresStorage::new_with_config(
        repositories.pool().clone(),
        ApalisSqlConfig::new(JobType::ExportDeck.as_str()),
    );

    let export_worker = WorkerBuilder::new("export-deck-worker")
        .concurrency(jobs.export_concurrency.get() as usize)
        .data(context)
        .backend(export_storage)
        .build_fn(process_export_job);

    let monitor = Monitor::new().register(export_worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    })
}

async fn serve_http(settings: &config::Settings, api_state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(api_state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "deckport::http",
        addr = %settings.server.addr,
        "listening"
    );

    let (stopping_tx, stopping_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            info!(target = "deckport::http", "draining connections");
            let _ = stopping_tx.send(());
        },
    );

    let grace = settings.server.graceful_shutdown;
    let deadline = async move {
        if stopping_rx.await.is_err() {
            // Server finished without a shutdown signal.
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        _ = deadline => {
            warn!(
                target = "deckport::http",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
