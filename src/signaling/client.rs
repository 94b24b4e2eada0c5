//! RTC Client
//!
//! Handle auf die Verbindung zum Telnyx RTC Server:
//! - `connect()` startet den Verbindungs-Task und kehrt sofort zurück
//! - Alles Weitere kommt als `RtcEvent` über einen Broadcast-Kanal
//! - Anrufe und `disconnect()` gehen als Kommandos an den Task

use super::connection;
use crate::call::{Call, CallDirection, CallOptions, CallState};
use crate::config::Config;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone)]
pub enum SignalingError {
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Failed to send message: {0}")]
    SendFailed(String),

    #[error("Server error: {code} - {message}")]
    ServerError { code: i64, message: String },
}

// ============================================================================
// EVENTS & COMMANDS
// ============================================================================

/// Events die vom RtcClient ausgelöst werden
#[derive(Debug, Clone)]
pub enum RtcEvent {
    /// WebSocket wurde geschlossen
    SocketClose,

    /// WebSocket-Fehler (auch fehlgeschlagener Verbindungsaufbau)
    SocketError(String),

    /// Protokollfehler vom Server, z.B. Login abgelehnt
    Error(SignalingError),

    /// Login erfolgreich, Client kann Anrufe machen
    Ready,

    /// Alles Weitere (Call Updates etc.)
    Notification(Notification),
}

/// Benachrichtigung vom Client
#[derive(Debug, Clone)]
pub enum Notification {
    /// Zustand eines Anrufs hat sich geändert
    CallUpdate(Call),

    /// Unbekannte Server-Methode
    Other { kind: String, payload: Value },
}

/// Kommandos an den Verbindungs-Task
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Invite { call: Call, options: CallOptions },
    Answer { call_id: Uuid },
    Hangup { call_id: Uuid },
    Disconnect,
}

// ============================================================================
// CLIENT OPTIONS
// ============================================================================

#[derive(Clone)]
pub struct ClientOptions {
    pub rtc_url: String,
    pub login_token: String,
    pub ice_servers: Vec<String>,
}

impl ClientOptions {
    pub fn new(config: &Config, login_token: String) -> Self {
        Self {
            rtc_url: config.rtc_url.clone(),
            login_token,
            ice_servers: vec![config.stun_url.clone()],
        }
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("rtc_url", &self.rtc_url)
            .field("ice_servers", &self.ice_servers)
            .finish()
    }
}

// ============================================================================
// CLIENT STATE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub(crate) struct ClientState {
    pub is_connected: bool,
    pub is_ready: bool,
    pub is_closed: bool,
}

// ============================================================================
// RTC CLIENT
// ============================================================================

pub struct RtcClient {
    options: ClientOptions,
    sessid: String,
    state: Arc<RwLock<ClientState>>,
    command_tx: mpsc::UnboundedSender<ClientCommand>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<ClientCommand>>>,
    event_tx: broadcast::Sender<RtcEvent>,
}

impl RtcClient {
    /// Erstellt einen neuen RtcClient (noch nicht verbunden)
    pub fn new(options: ClientOptions) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Self {
            options,
            sessid: Uuid::new_v4().to_string(),
            state: Arc::new(RwLock::new(ClientState::default())),
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            event_tx,
        }
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<RtcEvent> {
        self.event_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().is_ready
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().is_closed
    }

    /// Startet den Verbindungsaufbau im Hintergrund
    ///
    /// Erfolg meldet `RtcEvent::Ready`, Fehler `RtcEvent::SocketError`
    /// bzw. `RtcEvent::Error`.
    pub fn connect(&self) {
        let Some(commands) = self.command_rx.lock().take() else {
            tracing::warn!("RTC client already connected");
            return;
        };

        tracing::info!("Connecting to RTC server: {}", self.options.rtc_url);

        let context = connection::ConnectionContext {
            options: self.options.clone(),
            sessid: self.sessid.clone(),
            state: Arc::clone(&self.state),
            event_tx: self.event_tx.clone(),
            command_tx: self.command_tx.clone(),
        };
        tokio::spawn(connection::run(context, commands));
    }

    /// Schließt die Verbindung endgültig (kein Reconnect)
    pub fn disconnect(&self) {
        {
            let mut state = self.state.write();
            if state.is_closed {
                tracing::debug!("RTC client already closed");
                return;
            }
            state.is_closed = true;
        }

        tracing::info!("Disconnecting RTC client");
        let _ = self.command_tx.send(ClientCommand::Disconnect);
    }

    /// Startet einen ausgehenden Anruf
    ///
    /// Das Ergebnis wird nicht abgewartet, Fortschritt kommt als
    /// `Notification::CallUpdate`.
    pub fn new_call(&self, options: CallOptions) -> Call {
        let call = Call::new(
            Uuid::new_v4(),
            CallDirection::Outbound,
            options.destination_number.clone(),
            String::new(),
            CallState::New,
            self.command_tx.clone(),
        );

        tracing::info!("New call {} to {}", call.id(), options.destination_number);

        if self
            .command_tx
            .send(ClientCommand::Invite {
                call: call.clone(),
                options,
            })
            .is_err()
        {
            tracing::warn!("RTC client stopped, call {} not sent", call.id());
        }

        call
    }

    /// Client ohne Netzwerk: Kommandos landen im zurückgegebenen Receiver
    #[cfg(test)]
    pub(crate) fn loopback() -> (Self, mpsc::UnboundedReceiver<ClientCommand>) {
        let client = Self::new(ClientOptions {
            rtc_url: "wss://rtc.invalid".to_string(),
            login_token: "test-token".to_string(),
            ice_servers: vec![],
        });
        let commands = client.command_rx.lock().take().expect("fresh client");
        (client, commands)
    }

    /// Simuliert ein Event vom Server
    #[cfg(test)]
    pub(crate) fn emit(&self, event: RtcEvent) {
        let _ = self.event_tx.send(event);
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}

impl std::fmt::Debug for RtcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtcClient")
            .field("options", &self.options)
            .field("sessid", &self.sessid)
            .field("state", &*self.state.read())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn options(destination: &str) -> CallOptions {
        CallOptions {
            destination_number: destination.to_string(),
            caller_name: "u1".to_string(),
            caller_number: String::new(),
            audio: true,
            video: false,
        }
    }

    #[test]
    fn test_new_call_sends_invite() {
        let (client, mut commands) = RtcClient::loopback();

        let call = client.new_call(options("sip:100@sip.telnyx.com"));

        assert_eq!(call.direction(), CallDirection::Outbound);
        assert_eq!(call.state(), CallState::New);
        assert_eq!(
            commands.try_recv().unwrap(),
            ClientCommand::Invite {
                call: call.clone(),
                options: options("sip:100@sip.telnyx.com"),
            }
        );
    }

    #[test]
    fn test_disconnect_once() {
        let (client, mut commands) = RtcClient::loopback();

        client.disconnect();
        client.disconnect();

        assert!(client.is_closed());
        assert_eq!(commands.try_recv().unwrap(), ClientCommand::Disconnect);
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_after_loopback_is_noop() {
        let (client, _commands) = RtcClient::loopback();
        client.connect();
        assert!(!client.is_connected());
    }
}
