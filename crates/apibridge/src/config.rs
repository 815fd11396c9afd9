// Runtime configuration from CLI flags and environment

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Configuration-driven V2 adapter over a legacy V1 API.
#[derive(Debug, Parser)]
#[command(name = "apibridge", version, about)]
pub struct Config {
	/// Directory of YAML mapping documents
	#[arg(long, env = "CONFIG_DIR", default_value = "configs")]
	pub config_dir: PathBuf,

	/// Base URL of the legacy V1 API
	#[arg(long, env = "V1_BASE_URL", default_value = "http://localhost:8001")]
	pub v1_base_url: String,

	/// Address to serve the V2 API on
	#[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8000")]
	pub bind: SocketAddr,

	/// Per-call timeout for upstream requests, in seconds
	#[arg(long, env = "V1_TIMEOUT_SECS", default_value_t = 30)]
	pub v1_timeout_secs: u64,

	/// Allowed CORS origin for the management UI
	#[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:3000")]
	pub cors_origin: String,
}

impl Config {
	pub fn v1_timeout(&self) -> Duration {
		Duration::from_secs(self.v1_timeout_secs)
	}
}
