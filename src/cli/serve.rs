//! Serve command implementation

use crate::api;
use crate::config::Config;
use crate::state::StateStore;
use anyhow::Context;
use clap::Args;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address (overrides API_BIND_ADDR)
    #[arg(long)]
    pub bind: Option<String>,
}

impl ServeArgs {
    pub async fn execute(
        &self,
        config: &Config,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let bind = self.bind.as_deref().unwrap_or(&config.api.bind_addr);

        let store = StateStore::open(config.state.dir.clone()).await?;
        tracing::info!(
            state_dir = %store.dir().display(),
            origins = ?config.api.allow_origins,
            "Starting read API"
        );

        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("Failed to bind {bind}"))?;
        let app = api::router(store, &config.api.allow_origins);

        api::serve(listener, app, shutdown).await?;
        Ok(())
    }
}
