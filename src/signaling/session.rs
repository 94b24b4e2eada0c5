//! Signaling Session
//!
//! `init_session` registriert die Listener, verbindet den Client und
//! wartet auf das erste `Ready`. Das Ready-Signal wird höchstens einmal
//! gesetzt, spätere Events ändern nichts mehr am Ergebnis.

use super::client::{ClientOptions, RtcClient, RtcEvent};
use crate::call::{Call, CallOptions};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Der Server hat die Sitzung abgelehnt (Details nur im Log)
    #[error("Signaling session rejected")]
    Rejected,

    #[error("Signaling client stopped before it became ready")]
    Aborted,
}

// ============================================================================
// READY SIGNAL
// ============================================================================

type ReadyResult = Result<(), SessionError>;

/// Einmal setzbares Ergebnis des Verbindungsaufbaus
pub(crate) struct ReadySignal {
    tx: Mutex<Option<oneshot::Sender<ReadyResult>>>,
}

impl ReadySignal {
    pub(crate) fn new() -> (Self, oneshot::Receiver<ReadyResult>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Setzt das Ergebnis, gibt `false` zurück wenn es schon gesetzt war
    pub(crate) fn settle(&self, result: ReadyResult) -> bool {
        match self.tx.lock().take() {
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Bereite Signaling-Sitzung
#[derive(Clone, Debug)]
pub struct Session {
    client: Arc<RtcClient>,
}

impl Session {
    /// Neuer ausgehender Anruf
    pub fn new_call(&self, options: CallOptions) -> Call {
        self.client.new_call(options)
    }

    /// Schließt die Sitzung endgültig
    pub fn close(&self) {
        self.client.disconnect();
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Event-Receiver für Benachrichtigungen
    pub fn subscribe(&self) -> broadcast::Receiver<RtcEvent> {
        self.client.subscribe()
    }

    /// Sitzung über einem Loopback-Client, ohne Ready-Handshake
    #[cfg(test)]
    pub(crate) fn for_client(client: Arc<RtcClient>) -> Self {
        Self { client }
    }
}

/// Erstellt einen Client für den Login-Token und baut die Sitzung auf
pub async fn init_session(options: ClientOptions) -> Result<Session, SessionError> {
    connect_session(Arc::new(RtcClient::new(options))).await
}

/// Registriert die Listener und verbindet einen vorhandenen Client
pub async fn connect_session(client: Arc<RtcClient>) -> Result<Session, SessionError> {
    let (signal, ready_rx) = ReadySignal::new();
    let events = client.subscribe();

    tokio::spawn(listen(Arc::clone(&client), events, signal));

    client.connect();

    match ready_rx.await {
        Ok(Ok(())) => {
            tracing::info!("Signaling session ready");
            Ok(Session { client })
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(SessionError::Aborted),
    }
}

/// Lifecycle-Listener, läuft so lange wie der Client
async fn listen(
    client: Arc<RtcClient>,
    mut events: broadcast::Receiver<RtcEvent>,
    signal: ReadySignal,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Session listener skipped {} events", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            RtcEvent::SocketClose => {
                tracing::info!("socket closed");
                client.disconnect();
            }
            RtcEvent::SocketError(error) => {
                tracing::error!("socket error: {}", error);
                client.disconnect();
            }
            RtcEvent::Error(error) => {
                tracing::error!("error: {}", error);
                if !signal.settle(Err(SessionError::Rejected)) {
                    tracing::debug!("Session already settled, ignoring error");
                }
            }
            RtcEvent::Ready => {
                if !signal.settle(Ok(())) {
                    tracing::debug!("Session already settled, ignoring ready");
                }
            }
            // Benachrichtigungen verarbeitet der Call Controller
            RtcEvent::Notification(_) => {}
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
