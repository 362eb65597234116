//! Dungeon relay API server entry point.

use std::error::Error;
use std::sync::Arc;

use dungeon_api::config::Config;
use dungeon_api::engine::CommandEngine;
use dungeon_api::mailbox::Mailbox;
use dungeon_api::router::{CommandRouter, RoutePolicy};
use dungeon_api::routes;
use dungeon_api::state::AppState;
use dungeon_core::clock::SystemClock;
use dungeon_dispatch::{Dispatcher, DispatcherParts};
use dungeon_store::FileStoryRepository;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting dungeon relay API server");

    let config = Config::from_env()?;
    let addr = config.addr()?;

    // Wire the dispatcher and its collaborators.
    let mailbox = Arc::new(Mailbox::new());
    let (dispatcher, worker) = Dispatcher::spawn(
        config.dispatcher_config(),
        DispatcherParts {
            engine: Arc::new(CommandEngine::new(config.engine_command.clone())),
            outbox: mailbox.clone(),
            repository: Arc::new(FileStoryRepository::new(config.storage_dir.clone())),
            voice: None,
            clock: Arc::new(SystemClock),
        },
    );
    let router = CommandRouter::new(
        dispatcher.clone(),
        RoutePolicy {
            channel: config.channel.clone(),
            admin_role: config.admin_role.clone(),
        },
    );
    let shutdown = dispatcher.shutdown_token();
    let app_state = AppState::new(dispatcher, router, mailbox);

    let app = routes::app()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    tracing::info!(channel = %config.channel, "Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                _ = tokio::signal::ctrl_c() => shutdown.cancel(),
            }
        })
        .await?;

    worker.await?;
    tracing::info!("Dungeon relay stopped");

    Ok(())
}
