//! Lokaler RTC Server für Tests
//!
//! Nimmt genau eine WebSocket-Verbindung an und spricht JSON-Frames.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use super::RtcEvent;

pub(crate) const TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) struct TestServer {
    listener: TcpListener,
    pub url: String,
}

impl TestServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        Self { listener, url }
    }

    /// Wartet auf den Client und liest dessen Login
    pub async fn accept(&self) -> (TestPeer, Value) {
        let (stream, _) = tokio::time::timeout(TIMEOUT, self.listener.accept())
            .await
            .unwrap()
            .unwrap();
        let ws = accept_async(stream).await.unwrap();
        let mut peer = TestPeer { ws };
        let login = peer.recv_method("login").await;
        (peer, login)
    }
}

pub(crate) struct TestPeer {
    ws: WebSocketStream<TcpStream>,
}

impl TestPeer {
    pub async fn send(&mut self, value: Value) {
        self.ws.send(Message::Text(value.to_string())).await.unwrap();
    }

    /// Nächster JSON-Frame, `None` bei Close oder Verbindungsende
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            let frame = tokio::time::timeout(TIMEOUT, self.ws.next()).await.unwrap();
            match frame {
                Some(Ok(Message::Text(text))) => return Some(serde_json::from_str(&text).unwrap()),
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => {}
            }
        }
    }

    /// Überspringt Frames bis zum Request mit `method`
    pub async fn recv_method(&mut self, method: &str) -> Value {
        loop {
            let frame = self.recv().await.unwrap();
            if frame["method"] == method {
                return frame;
            }
        }
    }

    /// Überspringt Frames bis zur Bestätigung für `id`
    pub async fn recv_ack(&mut self, id: &str) -> Value {
        loop {
            let frame = self.recv().await.unwrap();
            if frame["id"] == id && frame.get("result").is_some() {
                return frame;
            }
        }
    }

    pub async fn close(&mut self) {
        self.ws.close(None).await.unwrap();
    }
}

/// Nächstes Event mit Timeout
pub(crate) async fn next_event(events: &mut broadcast::Receiver<RtcEvent>) -> RtcEvent {
    tokio::time::timeout(TIMEOUT, events.recv())
        .await
        .unwrap()
        .unwrap()
}
