use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use tokio::sync::Notify;

mod api;
mod config;
mod db;
mod handler;
mod http;
mod logger;
mod server;
mod spatial;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn main() -> Result<(), BoxError> {
    // Optional config path (without extension) as the first argument
    let cfg = match std::env::args().nth(1) {
        Some(path) => config::Config::load_from(&path)?,
        None => config::Config::load()?,
    };
    logger::init(&cfg.logging)?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), BoxError> {
    let addr = cfg.get_socket_addr()?;

    let db = match db::Database::connect(&cfg.database).await {
        Ok(db) => db,
        Err(e) => {
            // Keep serving: readiness reports 503 until the database comes up
            logger::log_warning(&format!("Database unreachable at startup: {e}"));
            db::Database::connect_lazy(&cfg.database)?
        }
    };

    let listener = server::create_reusable_listener(addr)?;
    let state = Arc::new(config::AppState::new(&cfg, db));
    let active_connections = Arc::new(AtomicUsize::new(0));
    let shutdown = Arc::new(Notify::new());
    server::spawn_signal_listener(Arc::clone(&shutdown))?;

    logger::log_server_start(&addr, &cfg);

    // Connections are spawned with spawn_local
    let local = tokio::task::LocalSet::new();
    local
        .run_until(server::serve(
            listener,
            Arc::clone(&state),
            active_connections,
            shutdown,
        ))
        .await;

    state.db.close().await;
    tracing::info!("Server stopped");
    Ok(())
}
