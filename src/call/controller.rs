//! Call Controller
//!
//! Ausgehende Anrufe aus dem Formular und automatisches Annehmen
//! eingehender Anrufe. Beide schreiben nur den einen `active_call` der
//! Page Session.

use super::{Call, CallOptions, CallState};
use crate::app::PageSession;
use crate::signaling::{Notification, RtcEvent};
use crate::ui::MessageForm;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// SIP-Adresse für eine eingegebene Nummer
pub fn sip_address(destination: &str, domain: &str) -> String {
    format!("sip:{}@{}", destination, domain)
}

/// Startet einen Anruf zur Nummer aus dem Formular
///
/// Die Eingabe wird nicht validiert. Der Nachrichtentext wird gelesen,
/// aber von keinem Anruf verschickt.
pub fn originate(page: &PageSession, form: &MessageForm) -> Call {
    let MessageForm { to, message } = form;
    tracing::debug!("Submit to {} ({} chars message, not sent)", to, message.len());

    let sip_username = page.credentials().sip_username.clone();
    page.session().new_call(CallOptions {
        destination_number: sip_address(to, page.sip_domain()),
        caller_name: sip_username,
        caller_number: String::new(),
        audio: true,
        video: false,
    })
}

/// Verarbeitet eine Benachrichtigung des RTC Clients
pub fn handle_notification(page: &PageSession, notification: &Notification) {
    match notification {
        Notification::CallUpdate(call) => {
            page.set_active_call(call.clone());
            tracing::info!("activeCall: {:?}", call);

            if call.state() == CallState::Ringing {
                call.answer();
            }
        }
        other => tracing::info!("notification: {:?}", other),
    }
}

/// Leitet Benachrichtigungen an `handle_notification` weiter
pub fn spawn_notification_listener(
    page: Arc<PageSession>,
    mut events: broadcast::Receiver<RtcEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RtcEvent::Notification(notification)) => {
                    handle_notification(&page, &notification)
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Notification listener skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

// ============================================================================
// TESTS
// ============================================================================
