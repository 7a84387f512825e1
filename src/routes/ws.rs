//! WebSocket handler — hands each upgraded socket to a client session.
//!
//! DESIGN
//! ======
//! The socket is split so the session's inbound pump owns the read half and
//! its outbound pump owns the write half. Everything past the upgrade is
//! session and hub logic; this module only adapts axum to it.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::StreamExt;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::session;
use crate::state::AppState;

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| {
        let conn_id = Uuid::new_v4();
        run_ws(socket, state).instrument(info_span!("ws", %conn_id))
    })
}

async fn run_ws(socket: WebSocket, state: AppState) {
    let (sink, source) = socket.split();
    info!("ws: connection accepted");

    match session::run(Arc::clone(&state.hub), source, sink, state.config.close_grace).await {
        Ok(client) => info!(name = %client.name, "ws: client disconnected"),
        Err(e) => debug!(error = %e, "ws: connection rejected"),
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
