use std::{future::IntoFuture, pin::pin, process, sync::Arc};

use docdash::{
    application::{error::AppError, import, registry::CollectionRegistry, store::DocumentStore},
    cache::CacheConfig,
    config,
    infra::{
        db::PostgresDocumentStore,
        error::InfraError,
        http::{self, AppState},
        memory::MemoryDocumentStore,
        telemetry,
    },
};
use tokio::sync::watch;
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

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Import(args) => run_import(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let registry = init_registry(&settings).await?;
    let state = AppState::new(registry);
    serve_http(&settings, state).await
}

async fn run_import(settings: config::Settings, args: config::ImportArgs) -> Result<(), AppError> {
    let registry = init_registry(&settings).await?;
    let path = args.file;

    info!(
        target = "docdash::import",
        path = %path.display(),
        "Starting import"
    );

    let summary = import::import_file(&registry, &path).await?;
    info!(
        target = "docdash::import",
        collections = summary.collections,
        documents = summary.documents,
        "Import completed"
    );
    Ok(())
}

async fn init_store(settings: &config::Settings) -> Result<Arc<dyn DocumentStore>, AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        warn!("database url is not configured; documents are kept in memory only");
        return Ok(Arc::new(MemoryDocumentStore::new()));
    };

    let pool =
        PostgresDocumentStore::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresDocumentStore::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresDocumentStore::new(pool)))
}

async fn init_registry(settings: &config::Settings) -> Result<Arc<CollectionRegistry>, AppError> {
    let store = init_store(settings).await?;
    let cache = CacheConfig::from(&settings.cache);
    info!(
        collections = ?settings.collections.allowed,
        cache_enabled = cache.enabled,
        ttl_seconds = cache.ttl_seconds,
        "collection registry ready"
    );
    Ok(Arc::new(CollectionRegistry::new(
        store,
        cache,
        settings.collections.allowed.iter().cloned(),
    )))
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            let _ = shutdown_rx.changed().await;
        },
    );
    let mut server = pin!(server.into_future());

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        () = shutdown_signal() => {
            info!("shutdown requested; draining connections");
            let _ = shutdown_tx.send(true);
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(_) => {
            warn!(
                grace_seconds = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
