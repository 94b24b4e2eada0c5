//! UI Binder
//!
//! Die Oberfläche ist ein kleines Formular (`message_form` mit den Feldern
//! `to` und `message`) und eine Anzeige für den eigenen SIP-Usernamen
//! (`my_username`). Die Inputs sind deaktiviert bis `bind` gelaufen ist.

use crate::app::PageSession;
use crate::call::controller;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Inhalt von `message_form` beim Absenden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageForm {
    pub to: String,
    pub message: String,
}

/// Handler für das Absenden des Formulars
pub type SubmitHandler = Arc<dyn Fn(MessageForm) + Send + Sync>;

/// Die Elemente die wir lesen und schreiben
pub trait UiSurface: Send + Sync {
    /// Schreibt den Usernamen in `my_username`
    fn show_username(&self, username: &str);

    /// Aktiviert/deaktiviert alle Inputs von `message_form`
    fn set_form_enabled(&self, enabled: bool);

    /// Registriert den Submit-Handler von `message_form`
    fn on_submit(&self, handler: SubmitHandler);
}

/// Bindet die Oberfläche an eine bereite Page Session
///
/// Läuft nur einmal, weitere Aufrufe ändern nichts und geben `false` zurück.
pub fn bind(page: &Arc<PageSession>, surface: &dyn UiSurface) -> bool {
    if !page.mark_ui_bound() {
        tracing::debug!("UI already bound");
        return false;
    }

    let handler_page = Arc::clone(page);
    surface.on_submit(Arc::new(move |form: MessageForm| {
        // Ergebnis wird nicht beobachtet, Fortschritt kommt als Call Update
        let _ = controller::originate(&handler_page, &form);
    }));

    surface.show_username(&page.credentials().sip_username);
    surface.set_form_enabled(true);

    true
}

// ============================================================================
// TESTS
// ============================================================================
