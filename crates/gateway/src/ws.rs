use std::{net::SocketAddr, sync::Arc};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, StreamExt, future},
    tracing::{debug, info},
};

use parley_protocol::ChatRequest;

use crate::{
    handler::{SessionError, SessionHandler},
    session::SessionSink,
    state::GatewayState,
};

/// Run one chat connection from upgrade to disconnect.
pub async fn handle_connection(
    socket: WebSocket,
    state: Arc<GatewayState>,
    remote_addr: SocketAddr,
) {
    let conn_id = state.next_conn_id();
    info!(%conn_id, %remote_addr, "client connected, waiting for authentication");

    let (mut ws_tx, ws_rx) = socket.split();
    let (sink, mut outbound) = SessionSink::channel(conn_id.clone());

    // Write loop: ends once every clone of the sink is dropped or the
    // socket refuses a write.
    let write_conn_id = conn_id.clone();
    let write_loop = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                debug!(conn_id = %write_conn_id, error = %e, "websocket write failed");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let inbound = ws_rx.filter_map(|msg| future::ready(decode_message(msg)));
    let result = SessionHandler::new(state, sink).run(inbound).await;

    match result {
        Ok(()) => info!(%conn_id, "client disconnected"),
        Err(e) => info!(%conn_id, error = %e, "client dropped"),
    }
    let _ = write_loop.await;
}

/// Map a WebSocket message to a request. Control frames yield `None`.
fn decode_message(
    msg: Result<Message, axum::Error>,
) -> Option<Result<ChatRequest, SessionError>> {
    let decoded = match msg {
        Ok(Message::Text(text)) => ChatRequest::decode(text.as_str()),
        Ok(Message::Binary(bytes)) => ChatRequest::decode_bytes(&bytes),
        // The stream yields nothing after a close frame.
        Ok(Message::Close(_) | Message::Ping(_) | Message::Pong(_)) => return None,
        Err(e) => return Some(Err(SessionError::Transport(e.to_string()))),
    };
    Some(Ok(decoded.unwrap_or_else(|e| {
        debug!(error = %e, "undecodable frame");
        ChatRequest::Unknown
    })))
}
