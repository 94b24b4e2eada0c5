//! Lifecycle Guard
//!
//! Läuft wenn das Fenster geschlossen wird: aktiven Anruf auflegen,
//! Sitzung schließen. Beides wird nur angestoßen, auf eine Bestätigung
//! wird nicht gewartet.

use crate::app::PageSession;

/// Räumt die Page Session beim Beenden auf
pub fn teardown(page: &PageSession) {
    tracing::info!("beforeunload");

    if let Some(call) = page.active_call() {
        call.hangup();
    }

    page.session().close();
}
