//! HTTP server for the xSwap API.
//!
//! Exposes read-only engine queries, delegate deployment, hashing helpers
//! for relayers, step submission, and signed withdrawals under the `/api`
//! base path.

use crate::apis::{delegates, hashes, life, nonces, swaps, withdrawals};
use axum::{
	extract::DefaultBodyLimit,
	http::HeaderValue,
	routing::{get, post},
	Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
	cors::{Any, CorsLayer},
	timeout::TimeoutLayer,
	trace::TraceLayer,
};
use xswap_config::ApiConfig;
use xswap_core::SwapEngine;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<SwapEngine>,
}

fn cors_layer(api_config: &ApiConfig) -> CorsLayer {
	match &api_config.cors {
		Some(cors) => {
			let origins: Vec<HeaderValue> = cors
				.allowed_origins
				.iter()
				.filter_map(|origin| match origin.parse() {
					Ok(value) => Some(value),
					Err(_) => {
						tracing::warn!(%origin, "Ignoring invalid CORS origin");
						None
					},
				})
				.collect();
			CorsLayer::new()
				.allow_origin(origins)
				.allow_methods(Any)
				.allow_headers(Any)
		},
		None => CorsLayer::permissive(),
	}
}

/// Builds the API router.
pub fn router(state: AppState, api_config: &ApiConfig) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route(
					"/delegates/{account}",
					get(delegates::get_delegate).post(delegates::deploy_delegate),
				)
				.route(
					"/delegates/{account}/withdrawals",
					post(withdrawals::withdraw_delegate),
				)
				.route("/nonces/{account}/{nonce}", get(nonces::get_nonce))
				.route("/life", get(life::get_life))
				.route("/hashes/step", post(hashes::hash_step))
				.route("/hashes/swap", post(hashes::hash_swap))
				.route("/hashes/stealth", post(hashes::hash_stealth))
				.route("/swaps", post(swaps::submit_swap))
				.route("/swaps/stealth", post(swaps::submit_stealth_swap))
				.route("/withdrawals", post(withdrawals::withdraw)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(cors_layer(api_config))
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(state)
}

/// Starts the HTTP server for the API.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<SwapEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState { engine }, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("xSwap API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}
