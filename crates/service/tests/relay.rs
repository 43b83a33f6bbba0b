mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use ::common::prelude::{ClientMessage, Filter, RelayMessage};
use ::common::testkit::TestSigner;

use self::common::*;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn listen(svc: &TestService) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = svc.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{}/", addr)).await.unwrap();
    client
}

async fn send(client: &mut Client, message: ClientMessage) {
    client.send(Message::Text(message.to_json())).await.unwrap();
}

async fn recv(client: &mut Client) -> RelayMessage {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("relay answered in time")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = next {
            return RelayMessage::from_json(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_publish_and_subscribe_over_websocket() {
    let alice = TestSigner::generate();
    let svc = service(&[&alice]).await;
    let addr = listen(&svc).await;

    let stored = alice.event(1, "before", &[&["t", "augury"]], now() - 10);
    let mut publisher = connect(addr).await;
    send(&mut publisher, ClientMessage::Event(Box::new(stored.clone()))).await;
    match recv(&mut publisher).await {
        RelayMessage::Ok {
            event_id, accepted, ..
        } => {
            assert_eq!(event_id, stored.id);
            assert!(accepted);
        }
        other => panic!("expected OK, got {:?}", other),
    }

    let mut subscriber = connect(addr).await;
    send(
        &mut subscriber,
        ClientMessage::Req {
            id: "feed".into(),
            filters: vec![Filter::new().tag("t", ["augury"])],
        },
    )
    .await;
    match recv(&mut subscriber).await {
        RelayMessage::Event {
            subscription_id,
            event,
        } => {
            assert_eq!(subscription_id, "feed");
            assert_eq!(event.id, stored.id);
        }
        other => panic!("expected the stored event, got {:?}", other),
    }
    assert_eq!(
        recv(&mut subscriber).await,
        RelayMessage::Eose("feed".into())
    );

    // live events follow EOSE; unrelated ones are filtered out
    let unrelated = alice.event(1, "off topic", &[&["t", "other"]], now());
    let live = alice.event(1, "after", &[&["t", "augury"]], now());
    send(&mut publisher, ClientMessage::Event(Box::new(unrelated))).await;
    recv(&mut publisher).await;
    send(&mut publisher, ClientMessage::Event(Box::new(live.clone()))).await;
    recv(&mut publisher).await;

    match recv(&mut subscriber).await {
        RelayMessage::Event { event, .. } => assert_eq!(event.id, live.id),
        other => panic!("expected the live event, got {:?}", other),
    }

    send(&mut subscriber, ClientMessage::Close { id: "feed".into() }).await;
    subscriber.close(None).await.unwrap();
    publisher.close(None).await.unwrap();
}

#[tokio::test]
async fn test_rejected_author_and_garbage() {
    let alice = TestSigner::generate();
    let mallory = TestSigner::generate();
    let svc = service(&[&alice]).await;
    let addr = listen(&svc).await;
    let mut client = connect(addr).await;

    let event = mallory.event(1, "let me in", &[], now());
    send(&mut client, ClientMessage::Event(Box::new(event.clone()))).await;
    match recv(&mut client).await {
        RelayMessage::Ok {
            event_id,
            accepted,
            message,
        } => {
            assert_eq!(event_id, event.id);
            assert!(!accepted);
            assert!(message.starts_with("restricted:"), "{}", message);
        }
        other => panic!("expected OK false, got {:?}", other),
    }

    client
        .send(Message::Text("not json".into()))
        .await
        .unwrap();
    assert_eq!(
        recv(&mut client).await,
        RelayMessage::Notice("Unable to parse message".into())
    );
}

#[tokio::test]
async fn test_disconnect_releases_subscriptions() {
    let svc = service(&[]).await;
    let addr = listen(&svc).await;
    let mut client = connect(addr).await;

    send(
        &mut client,
        ClientMessage::Req {
            id: "all".into(),
            filters: vec![Filter::new()],
        },
    )
    .await;
    assert_eq!(recv(&mut client).await, RelayMessage::Eose("all".into()));
    assert_eq!(svc.state.relay().subscription_count(), 1);

    client.close(None).await.unwrap();
    drop(client);

    let mut remaining = 1;
    for _ in 0..50 {
        remaining = svc.state.relay().subscription_count();
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining, 0);
}
