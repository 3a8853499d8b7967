//! Push HTTP surface: the only inbound web endpoints the engine itself
//! owns. The admin CRUD API lives elsewhere and drives the same store and
//! bus.

// crates.io
use axum::{
	Router,
	body::Bytes,
	extract::{Path, State},
	http::StatusCode,
	routing::get,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
// self
use crate::{_prelude::*, bus::Bus, store::Store};

#[derive(Clone)]
struct PushState {
	store: Store,
	bus: Bus,
}

/// Build the push router: `GET`/`POST /api/push/{test_id}/{vanity}`.
///
/// The vanity segment exists so operators can hand out readable URLs; only
/// the test id is validated.
pub fn router(store: Store, bus: Bus) -> Router {
	Router::new()
		.route("/api/push/{test_id}/{vanity}", get(push_get).post(push_post))
		.with_state(PushState { store, bus })
}

/// Serve the router until shutdown.
pub async fn serve(router: Router, port: u16, shutdown: CancellationToken) -> Result<()> {
	let listener = TcpListener::bind(("0.0.0.0", port)).await?;

	tracing::info!(port, "push endpoint listening");

	axum::serve(listener, router)
		.with_graceful_shutdown(async move { shutdown.cancelled().await })
		.await?;

	Ok(())
}

async fn push_get(
	State(state): State<PushState>,
	Path((test_id, _vanity)): Path<(String, String)>,
) -> (StatusCode, String) {
	accept(state, test_id, Vec::new()).await
}

async fn push_post(
	State(state): State<PushState>,
	Path((test_id, _vanity)): Path<(String, String)>,
	body: Bytes,
) -> (StatusCode, String) {
	accept(state, test_id, body.to_vec()).await
}

async fn accept(state: PushState, test_id: String, payload: Vec<u8>) -> (StatusCode, String) {
	if state.store.get_test(&test_id).await.is_err() {
		return (StatusCode::BAD_REQUEST, "invalid test id".into());
	}

	match state.bus.publish(&format!("push:{test_id}"), payload).await {
		Ok(()) => (StatusCode::OK, "push request received".into()),
		Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
	}
}
