//! # Atelier Server
//!
//! Serves the HTTP API and, when enabled, runs the dispatcher poll loop in
//! the same process.

use anyhow::Context;
use atelier_config::{AppConfig, ConfigLoader};
use atelier_core::telemetry::init_tracing;
use atelier_server::{
    app::build_dispatcher, create_router, di::build_module, startup, AppState,
};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_loader =
        ConfigLoader::from_default_location().context("Failed to load configuration")?;
    let config = config_loader.get().await;

    init_tracing(&config.observability.tracing_config()).context("Failed to initialize logging")?;

    startup::print_banner();
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);

    if let Err(e) = run(config).await {
        error!("Application error: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let metrics = startup::install_metrics_recorder(&config.observability)?;

    let module = build_module(&config)
        .await
        .context("Failed to build dependency injection module")?;

    let database = module.database();
    if config.database.run_migrations {
        database.run_migrations().await?;
    }

    let dispatcher = build_dispatcher(&module.collaborators(), &config);

    let mut state = AppState::new(
        module.job_service(),
        dispatcher.clone(),
        config.worker.secret.clone(),
    )
    .with_database(database.clone());
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }

    let router = create_router(state, &config.server);

    let dispatcher_task = config.dispatcher.enabled.then(|| {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run().await })
    });

    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    startup::print_startup_info(&config);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    dispatcher.stop();
    if let Some(task) = dispatcher_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Dispatcher exited with error"),
            Err(e) => error!(error = %e, "Dispatcher task panicked"),
        }
    }

    database.close().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
