pub mod audit;
pub mod authn;
pub mod authz;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod http;
pub mod request;
pub mod router;
pub mod server;
pub mod telemetry;

use std::sync::Arc;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::AppError;
pub use http::AppState;
pub use telemetry::CorrelationId;

/// Resolve configuration into shared application state.
///
/// Fails fast on configuration problems, including a missing or corrupt
/// master key; the daemon never starts serving with a broken key setup.
pub fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let dispatcher = config::build_dispatcher(config)?;
    Ok(AppState::new(Arc::new(dispatcher)))
}

/// Run the daemon to completion.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let state = build_state(&config)?;
    let router = http::router(state);
    server::serve(&config.server.socket, router).await
}
