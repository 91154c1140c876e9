//! # board-server
//!
//! Shared real-time task board served over HTTP.
//!
//! Clients poll `GET /tasks` with the watermark of their previous poll and
//! listen on `GET /events` for a push telling them a newer watermark exists.
//! Mutations go through [`Board`], which serializes them over one store
//! handle and notifies observers once each one commits.

mod board;
mod config;
mod error;
mod notifier;
mod server;
mod sse;

pub use board::{Board, ListQuery};
pub use config::{
    BoardConfig, DatabaseConfig, LockingConfig, NotifierConfig, ServerConfig, DEFAULT_CONFIG_FILE,
};
pub use error::{ApiError, ConfigError};
pub use notifier::{ChangeNotifier, SubscriberId, Subscription, DEFAULT_CHANNEL_CAPACITY};
pub use server::{router, AppState, Created, SharedState, TOKEN_HEADER};
pub use sse::Notification;

use board_core::SystemClock;
use board_storage::Database;
use std::sync::Arc;
use tracing::info;

/// Opens the store described by `config` and builds a board over it.
pub async fn open_board(config: &BoardConfig) -> anyhow::Result<Board> {
    let db = Database::open(&config.database.path).await?;
    db.init_schema().await?;

    let notifier = Arc::new(ChangeNotifier::with_capacity(config.notifier.capacity));
    Ok(Board::new(db, notifier, Arc::new(SystemClock))
        .with_transfer_cooldown(config.locking.transfer_cooldown_ms))
}

/// Run the board server until Ctrl+C
pub async fn run(config: BoardConfig) -> anyhow::Result<()> {
    let board = open_board(&config).await?;
    let app = router(AppState::new(board));

    let addr = config.server.address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        address = %addr,
        database = %config.database.path.display(),
        "Task board listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Task board stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
