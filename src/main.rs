use std::{process, sync::Arc, time::Duration};

use stashkit::{
    application::{
        error::AppError,
        users::{UserDirectory, UserService},
    },
    cache::{CacheEngine, MemoryStorage},
    config,
    context::BackgroundTasks,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
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
        .map_err(|err| AppError::Infra(InfraError::configuration(err.to_string())))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(config::ServeArgs::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = settings.cache.engine_config();
    let storage = Arc::new(MemoryStorage::new(&cache_config));
    let engine = CacheEngine::new(storage, cache_config);
    let background = BackgroundTasks::new();
    let users = UserService::new(engine.clone(), Arc::new(UserDirectory::seeded()))?;

    let state = HttpState {
        users: Arc::new(users),
        engine,
        background: background.clone(),
    };

    let result = serve_http(&settings, state).await;
    drain_background(&background, settings.server.graceful_shutdown).await;
    result
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn drain_background(background: &BackgroundTasks, limit: Duration) {
    let pending = background.pending();
    if pending == 0 {
        return;
    }
    info!(pending, "waiting for background cache work");
    let drained = tokio::time::timeout(limit, background.wait_idle()).await;
    if drained.is_err() {
        warn!(
            pending = background.pending(),
            timeout_secs = limit.as_secs(),
            "background cache work still running at shutdown"
        );
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
