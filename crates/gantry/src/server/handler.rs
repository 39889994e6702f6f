//! RPC Handler
//!
//! Decodes call envelopes from the request body and routes them through
//! the registry on the blocking pool, so a slow handler never stalls the
//! server's async workers.

use axum::Json;
use axum::extract::State;
use tracing::{error, warn};

use gantry_api::{Envelope, error_json};

use super::state::AppState;

/// Handle one call exchange
///
/// The body is decoded here rather than by an extractor so a malformed
/// request still produces a decodable error reply instead of a
/// transport-level rejection.
pub async fn handle_rpc(State(state): State<AppState>, body: String) -> Json<Envelope> {
    let request: Envelope = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            return Json(Envelope {
                service: String::new(),
                function: String::new(),
                data: error_json(format!("invalid request: {e}")),
            });
        }
    };

    let dispatched = {
        let registry = state.registry().clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || registry.dispatch(&request))
    };

    let reply = match tokio::time::timeout(state.call_timeout(), dispatched).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            error!("Dispatch task failed: {e}");
            request.reply_error(format!("{}.{} failed: {e}", request.service, request.function))
        }
        Err(_) => {
            // The handler thread keeps running; only the reply gives up.
            warn!(
                service = %request.service,
                function = %request.function,
                "Call timed out"
            );
            request.reply_error(format!(
                "{}.{} timed out after {}s",
                request.service,
                request.function,
                state.call_timeout().as_secs()
            ))
        }
    };

    Json(reply)
}
