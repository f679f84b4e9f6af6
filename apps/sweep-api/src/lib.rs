pub mod routes;
pub mod state;

use std::{env, net::SocketAddr, path::PathBuf};

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(
	version = sweep_cli::VERSION,
	rename_all = "kebab",
	styles = sweep_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let mut config = sweep_config::load(&args.config)?;

	apply_credentials(
		&mut config,
		env::var("JIRA_EMAIL").ok(),
		env::var("JIRA_TOKEN").ok(),
	);
	init_tracing(&config)?;

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let state = AppState::new(config)?;
	let app = routes::router(state);
	let listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	axum::serve(listener, app).await?;

	Ok(())
}

/// Environment credentials win over the file; blank values are ignored.
pub fn apply_credentials(
	config: &mut sweep_config::Config,
	email: Option<String>,
	token: Option<String>,
) {
	let present = |value: Option<String>| {
		value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
	};

	if let Some(email) = present(email) {
		config.upstream.email = Some(email);
	}
	if let Some(token) = present(token) {
		config.upstream.api_token = token;
	}
}

fn init_tracing(config: &sweep_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}
