//! WebSocket and HTTP surface. Every socket becomes one hub subscriber
//! backed by a bounded frame queue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    extract::{
        State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_server::tls_rustls::RustlsConfig;
use futures_util::StreamExt;
use lib_sheetcast::core::dispatcher::encode_full;
use lib_sheetcast::{Hub, MpscChannel};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::sheet_logic::config::Settings;

#[derive(Clone)]
pub struct DownstreamState {
    pub hub: Arc<Hub>,
    pub channel_capacity: usize,
}

pub fn router(state: DownstreamState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/snapshot", get(snapshot_handler))
        .with_state(state)
}

pub async fn run(settings: Settings, hub: Arc<Hub>, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
    let app = router(DownstreamState {
        hub,
        channel_capacity: settings.channel_capacity,
    });
    let addr: SocketAddr = settings.addr;

    if let Some(tls) = settings.tls {
        let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
            .await
            .with_context(|| format!("Failed to load TLS configuration from {}", tls.cert.display()))?;

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.recv().await.ok();
            info!("Downstream server shutting down.");
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
        });

        info!("Downstream server listening on wss://{}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .context("TLS server failed")?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("Downstream server listening on ws://{}", addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.recv().await.ok();
                info!("Downstream server shutting down.");
            })
            .await
            .context("Server failed")?;
    }
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<DownstreamState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn snapshot_handler(State(state): State<DownstreamState>) -> Response {
    match encode_full(&state.hub.current()) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!("Failed to encode snapshot: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: DownstreamState) {
    let (channel, mut frames) = MpscChannel::new(state.channel_capacity);
    let subscriber = state.hub.connect(Arc::new(channel));
    let client_id = subscriber.id();

    loop {
        tokio::select! {
            // Frames queued by the hub for this client
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if socket.send(Message::Text(Utf8Bytes::from(&*frame))).await.is_err() {
                    break; // client disconnected
                }
            }
            // Anything the client sends is ignored apart from close
            incoming = socket.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.disconnect(client_id);
    debug!(client_id, "Socket task finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use lib_sheetcast::{Snapshot, WireMessage};
    use tokio_tungstenite::connect_async;
    use tower::ServiceExt;

    fn state_with(entries: &[(&str, f64)]) -> DownstreamState {
        let hub = Arc::new(Hub::new());
        hub.publish(entries.iter().map(|(k, v)| (k.to_string(), *v)).collect());
        DownstreamState { hub, channel_capacity: 8 }
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = router(state_with(&[]));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
    }

    #[tokio::test]
    async fn snapshot_returns_the_full_message() {
        let app = router(state_with(&[("A", 1.0), ("B", 2.5)]));
        let response = app
            .oneshot(Request::builder().uri("/snapshot").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let message: WireMessage = serde_json::from_str(&body_text(response).await).unwrap();
        let expected: Snapshot = [("A".to_string(), 1.0), ("B".to_string(), 2.5)].into_iter().collect();
        assert_eq!(message, WireMessage::Full(expected));
    }

    #[tokio::test]
    async fn socket_gets_full_then_updates() {
        let state = state_with(&[("A", 1.0)]);
        let hub = state.hub.clone();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();

        let first = ws.next().await.unwrap().unwrap();
        assert_eq!(first.to_text().unwrap(), r#"{"type":"full","data":{"A":1.0}}"#);
        assert_eq!(hub.subscriber_count(), 1);

        hub.publish([("B".to_string(), 2.0)].into_iter().collect());
        let second = ws.next().await.unwrap().unwrap();
        assert_eq!(second.to_text().unwrap(), r#"{"type":"update","data":{"A":null,"B":2.0}}"#);

        ws.close(None).await.unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while hub.subscriber_count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hub.subscriber_count(), 0);
    }
}
