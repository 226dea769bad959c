mod app;
mod auth;
mod config;
mod db;
mod error;
mod logging;
mod retry;
mod state;
mod storage;
mod users;

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    logging::init(&config.env);
    tracing::info!(env = %config.env, "logger is working");

    let state = AppState::init(config).await?;
    let config = state.config.clone();

    let app = app::build_app(state);
    app::serve(app, &config).await
}
