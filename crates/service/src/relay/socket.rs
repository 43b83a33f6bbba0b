use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use common::prelude::RelayMessage;

use super::{Connection, Relay};

/// Drive one WebSocket until the client goes away. A writer task drains
/// the connection's outbound queue while this task reads.
pub async fn serve_socket(socket: WebSocket, relay: Relay) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<RelayMessage>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = message.to_json();
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let connection = Connection::new(relay, tx);
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => connection.handle_text(&text).await,
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => connection.handle_text(text).await,
                Err(_) => connection.handle_text("").await,
            },
            Ok(Message::Close(_)) => break,
            // ping and pong are answered by axum
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection = connection.id(), "socket error: {}", e);
                break;
            }
        }
    }

    // dropping the connection releases its subscriptions and, with them,
    // the last senders feeding the writer
    drop(connection);
    let _ = writer.await;
}
