//! Signaling Module - WebSocket Client für den Telnyx RTC Server
//!
//! Dieses Modul verwaltet die Verbindung zum Signaling-Server:
//! - Login mit kurzlebigem Token
//! - JSON-RPC Nachrichten senden und empfangen
//! - Sitzung aufbauen und bei Socket-Fehlern endgültig schließen
//!

mod client;
mod connection;
mod messages;
mod session;
#[cfg(test)]
mod test_server;

pub use client::{
    ClientCommand, ClientOptions, Notification, RtcClient, RtcEvent, SignalingError,
};
pub use messages::*;
pub use session::{connect_session, init_session, Session, SessionError};
