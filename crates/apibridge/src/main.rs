use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use apibridge::config::Config;
use apibridge::mapping::loader::DocumentStore;
use apibridge::mapping::store::RegistryStore;
use apibridge::orchestrate::Orchestrator;
use apibridge::server::{AppState, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.init();

	let config = Config::parse();
	info!(
		config_dir = %config.config_dir.display(),
		v1_base_url = %config.v1_base_url,
		"starting apibridge"
	);

	url::Url::parse(&config.v1_base_url)
		.with_context(|| format!("invalid v1 base url {:?}", config.v1_base_url))?;

	let registry = Arc::new(RegistryStore::new(DocumentStore::new(&config.config_dir)));
	registry.initial_load().await;
	Arc::clone(&registry).spawn_watcher();

	let orchestrator = Arc::new(
		Orchestrator::new(&config.v1_base_url, config.v1_timeout())
			.context("failed to build upstream client")?,
	);

	let app = build_router(
		AppState {
			registry,
			orchestrator,
		},
		&config.cors_origin,
	);

	let listener = tokio::net::TcpListener::bind(config.bind)
		.await
		.with_context(|| format!("failed to bind {}", config.bind))?;
	info!(addr = %config.bind, "listening");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await
		.context("server error")?;

	info!("shutdown complete");
	Ok(())
}

async fn shutdown_signal() {
	let _ = tokio::signal::ctrl_c().await;
}
