use common::prelude::{ClientMessage, RelayMessage};
use common::relay::ProtocolError;

use super::{ConnectionId, MessageSender, Relay};

/// One client's view of the relay. Messages are handled in the order they
/// arrive; everything the relay says back goes through `sender`.
pub struct Connection {
    id: ConnectionId,
    relay: Relay,
    sender: MessageSender,
}

impl Connection {
    pub fn new(relay: Relay, sender: MessageSender) -> Self {
        let id = relay.next_connection_id();
        tracing::debug!(connection = id, "relay connection opened");
        Self { id, relay, sender }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, message: RelayMessage) {
        let _ = self.sender.send(message);
    }

    pub async fn handle_text(&self, text: &str) {
        tracing::trace!(connection = self.id, message = text, "received");
        match ClientMessage::from_json(text) {
            Ok(ClientMessage::Req { id, filters }) => {
                self.relay
                    .subscribe(self.id, id, filters, self.sender.clone())
                    .await;
            }
            Ok(ClientMessage::Close { id }) => {
                if !self.relay.unsubscribe(self.id, &id) {
                    tracing::debug!(connection = self.id, subscription = %id, "close for unknown subscription");
                }
            }
            Ok(ClientMessage::Event(event)) => {
                let event_id = event.id.clone();
                let (accepted, message) = match self.relay.publish(*event).await {
                    Ok(published) => (true, published.message().to_string()),
                    Err(e) => {
                        tracing::warn!(connection = self.id, event = %event_id, "rejected event: {}", e);
                        (false, e.to_string())
                    }
                };
                self.send(RelayMessage::Ok {
                    event_id,
                    accepted,
                    message,
                });
            }
            Err(ProtocolError::InvalidFilter { id, reason }) => {
                tracing::warn!(connection = self.id, subscription = %id, "bad filter: {}", reason);
                self.send(RelayMessage::Closed {
                    subscription_id: id,
                    message: format!("error: {}", reason),
                });
            }
            Err(e) => {
                tracing::warn!(connection = self.id, "{}", e);
                self.send(RelayMessage::Notice(e.to_string()));
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let removed = self.relay.unsubscribe_all(self.id);
        tracing::debug!(
            connection = self.id,
            subscriptions = removed,
            "relay connection closed"
        );
    }
}
