//! Page Session
//!
//! Der gesamte Zustand einer Sitzung an einem Ort: Credentials, die
//! Signaling-Sitzung und der aktuelle Anruf. Handler bekommen eine
//! Referenz darauf statt globaler Variablen.

use crate::call::{controller, Call};
use crate::config::{Config, ConfigError};
use crate::credentials::{CredentialError, CredentialFetcher, Credentials};
use crate::signaling::{connect_session, ClientOptions, RtcClient, Session, SessionError};
use crate::ui::{self, UiSurface};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

// ============================================================================
// PAGE SESSION
// ============================================================================

pub struct PageSession {
    credentials: Credentials,
    session: Session,
    sip_domain: String,
    /// Letzter Anruf aus einer Call-Update-Benachrichtigung
    active_call: Mutex<Option<Call>>,
    ui_bound: AtomicBool,
}

impl PageSession {
    pub fn new(credentials: Credentials, session: Session, sip_domain: String) -> Self {
        Self {
            credentials,
            session,
            sip_domain,
            active_call: Mutex::new(None),
            ui_bound: AtomicBool::new(false),
        }
    }

    /// Credentials holen, Sitzung aufbauen, Handler registrieren, UI binden
    ///
    /// Jeder Fehler bricht die Initialisierung ab, das Formular bleibt dann
    /// deaktiviert.
    pub async fn start(
        config: &Config,
        surface: Arc<dyn UiSurface>,
    ) -> Result<Arc<Self>, AppError> {
        let credentials = CredentialFetcher::new(config).get_credentials().await?;

        let client = Arc::new(RtcClient::new(ClientOptions::new(
            config,
            credentials.login_token.clone(),
        )));

        // Vor dem Verbinden abonnieren, verarbeitet wird erst nach Ready
        let notifications = client.subscribe();
        let session = connect_session(client).await?;

        let page = Arc::new(Self::new(credentials, session, config.sip_domain.clone()));

        controller::spawn_notification_listener(Arc::clone(&page), notifications);
        ui::bind(&page, surface.as_ref());

        tracing::info!("Ready as {}", page.credentials.sip_username);
        Ok(page)
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sip_domain(&self) -> &str {
        &self.sip_domain
    }

    pub fn active_call(&self) -> Option<Call> {
        self.active_call.lock().clone()
    }

    pub(crate) fn set_active_call(&self, call: Call) {
        *self.active_call.lock() = Some(call);
    }

    /// Formular ist aktiv sobald die UI gebunden wurde
    pub fn form_enabled(&self) -> bool {
        self.ui_bound.load(Ordering::SeqCst)
    }

    /// Markiert die UI als gebunden, `false` wenn das schon passiert ist
    pub(crate) fn mark_ui_bound(&self) -> bool {
        !self.ui_bound.swap(true, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for PageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSession")
            .field("sip_username", &self.credentials.sip_username)
            .field("session", &self.session)
            .field("active_call", &self.active_call())
            .field("form_enabled", &self.form_enabled())
            .finish()
    }
}

/// Page Session über einem Loopback-Client für Tests
#[cfg(test)]
pub(crate) fn test_page() -> (
    Arc<PageSession>,
    tokio::sync::mpsc::UnboundedReceiver<crate::signaling::ClientCommand>,
) {
    let (client, commands) = RtcClient::loopback();
    let page = PageSession::new(
        Credentials {
            sip_username: "u1".to_string(),
            login_token: "tok123".to_string(),
        },
        Session::for_client(Arc::new(client)),
        "sip.telnyx.com".to_string(),
    );
    (Arc::new(page), commands)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::SubmitHandler;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NullSurface;

    impl UiSurface for NullSurface {
        fn show_username(&self, _username: &str) {}
        fn set_form_enabled(&self, _enabled: bool) {}
        fn on_submit(&self, _handler: SubmitHandler) {}
    }

    #[test]
    fn test_new_page_has_no_call_and_disabled_form() {
        let (page, _commands) = test_page();
        assert!(page.active_call().is_none());
        assert!(!page.form_enabled());
    }

    #[test]
    fn test_mark_ui_bound_once() {
        let (page, _commands) = test_page();
        assert!(page.mark_ui_bound());
        assert!(!page.mark_ui_bound());
        assert!(page.form_enabled());
    }

    #[tokio::test]
    async fn test_start_fails_when_credentials_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/telephony_credentials"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let uri = server.uri();
        let config = Config::from_lookup(move |name| match name {
            "TELNYX_API_KEY" => Some("KEY".to_string()),
            "TELNYX_SIP_CONNECTION_ID" => Some("conn".to_string()),
            "TELNYX_API_URL" => Some(uri.clone()),
            _ => None,
        })
        .unwrap();

        let result = PageSession::start(&config, Arc::new(NullSurface)).await;
        assert!(matches!(result, Err(AppError::Credentials(_))));
    }
}
