//! Call Handle
//!
//! Ein `Call` ist ein billig klonbarer Verweis auf einen Anruf. Der Zustand
//! wird vom RTC Client aktualisiert, `answer()` und `hangup()` schicken nur
//! Kommandos an den Client und warten nicht auf eine Bestätigung.

use crate::signaling::ClientCommand;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

// ============================================================================
// CALL STATE
// ============================================================================

/// Zustand eines Anrufs (Namen wie im Telnyx Protokoll)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Angelegt, noch nichts gesendet
    New,
    /// Invite wird gesendet
    Requesting,
    /// Invite bestätigt, Gegenstelle wird gesucht
    Trying,
    /// Eingehender Anruf wartet auf Antwort
    Ringing,
    /// Answer wird gesendet
    Answering,
    /// Early Media (Gegenstelle klingelt)
    Early,
    /// Anruf aktiv
    Active,
    /// Anruf wird beendet
    Hangup,
    /// Anruf beendet, Ressourcen freigegeben
    Destroy,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::New => "new",
            CallState::Requesting => "requesting",
            CallState::Trying => "trying",
            CallState::Ringing => "ringing",
            CallState::Answering => "answering",
            CallState::Early => "early",
            CallState::Active => "active",
            CallState::Hangup => "hangup",
            CallState::Destroy => "destroy",
        }
    }

    /// Anruf ist vorbei
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Hangup | CallState::Destroy)
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

// ============================================================================
// CALL OPTIONS
// ============================================================================

/// Parameter für einen ausgehenden Anruf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOptions {
    /// Ziel, z.B. `sip:15551234567@sip.telnyx.com`
    pub destination_number: String,
    /// Pflichtfeld, sonst schlägt der Anruf ohne Begründung fehl
    pub caller_name: String,
    pub caller_number: String,
    /// Audio wird auch für reine Nachrichten gebraucht
    pub audio: bool,
    pub video: bool,
}

// ============================================================================
// CALL
// ============================================================================

struct CallInner {
    id: Uuid,
    direction: CallDirection,
    /// Gegenstelle: bei Outbound das Ziel, bei Inbound die Anrufer-Nummer
    remote_number: String,
    remote_name: String,
    state: RwLock<CallState>,
    commands: mpsc::UnboundedSender<ClientCommand>,
}

/// Handle auf einen Anruf
#[derive(Clone)]
pub struct Call {
    inner: Arc<CallInner>,
}

impl Call {
    pub(crate) fn new(
        id: Uuid,
        direction: CallDirection,
        remote_number: String,
        remote_name: String,
        state: CallState,
        commands: mpsc::UnboundedSender<ClientCommand>,
    ) -> Self {
        Self {
            inner: Arc::new(CallInner {
                id,
                direction,
                remote_number,
                remote_name,
                state: RwLock::new(state),
                commands,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn direction(&self) -> CallDirection {
        self.inner.direction
    }

    pub fn remote_number(&self) -> &str {
        &self.inner.remote_number
    }

    pub fn remote_name(&self) -> &str {
        &self.inner.remote_name
    }

    /// Aktueller Zustand
    pub fn state(&self) -> CallState {
        *self.inner.state.read()
    }

    pub(crate) fn set_state(&self, state: CallState) {
        *self.inner.state.write() = state;
    }

    /// Nimmt einen klingelnden Anruf an
    pub fn answer(&self) {
        if self.state() != CallState::Ringing {
            tracing::warn!("Ignoring answer for call {} in state {}", self.id(), self.state());
            return;
        }

        self.set_state(CallState::Answering);
        self.send(ClientCommand::Answer { call_id: self.id() });
    }

    /// Legt auf
    pub fn hangup(&self) {
        if self.state().is_terminal() {
            tracing::debug!("Call {} already ended", self.id());
            return;
        }

        self.set_state(CallState::Hangup);
        self.send(ClientCommand::Hangup { call_id: self.id() });
    }

    fn send(&self, command: ClientCommand) {
        if self.inner.commands.send(command).is_err() {
            tracing::warn!("RTC client gone, dropping command for call {}", self.id());
        }
    }
}

// Gleich heißt: derselbe Anruf, nicht nur derselbe Zustand
impl PartialEq for Call {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Call {}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("id", &self.inner.id)
            .field("direction", &self.inner.direction)
            .field("remote_number", &self.inner.remote_number)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
