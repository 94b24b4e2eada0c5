//! Tauri Shell
//!
//! Hostet `dist/index.html`. Die Seite hört auf `ui:*` Events und ruft
//! beim Absenden des Formulars `submit_message` auf. Schließen des
//! Fensters löst den Lifecycle Guard aus.

use crate::app::{AppError, PageSession};
use crate::config::Config;
use crate::lifecycle;
use crate::ui::{MessageForm, SubmitHandler, UiSurface};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tauri::{AppHandle, Emitter, Manager, State, WindowEvent};

// ============================================================================
// UI SURFACE
// ============================================================================

/// UiSurface über Tauri Events
struct TauriSurface {
    app_handle: AppHandle,
    username: Mutex<Option<String>>,
    form_enabled: Mutex<bool>,
    submit: Mutex<Option<SubmitHandler>>,
}

impl TauriSurface {
    fn new(app_handle: AppHandle) -> Self {
        Self {
            app_handle,
            username: Mutex::new(None),
            form_enabled: Mutex::new(false),
            submit: Mutex::new(None),
        }
    }
}

impl UiSurface for TauriSurface {
    fn show_username(&self, username: &str) {
        *self.username.lock() = Some(username.to_string());
        let _ = self.app_handle.emit("ui:username", username);
    }

    fn set_form_enabled(&self, enabled: bool) {
        *self.form_enabled.lock() = enabled;
        let _ = self.app_handle.emit("ui:form_enabled", enabled);
    }

    fn on_submit(&self, handler: SubmitHandler) {
        *self.submit.lock() = Some(handler);
    }
}

// ============================================================================
// APPLICATION STATE
// ============================================================================

struct DesktopState {
    surface: Arc<TauriSurface>,
    page: RwLock<Option<Arc<PageSession>>>,
}

/// Aktueller Stand für eine frisch geladene Seite
#[derive(serde::Serialize)]
struct UiSnapshot {
    username: Option<String>,
    form_enabled: bool,
}

// ============================================================================
// TAURI COMMANDS
// ============================================================================

/// Formular wurde abgeschickt
#[tauri::command]
async fn submit_message(
    to: String,
    message: String,
    state: State<'_, Arc<DesktopState>>,
) -> Result<(), String> {
    let handler = state
        .surface
        .submit
        .lock()
        .clone()
        .ok_or("Form is disabled")?;

    handler(MessageForm { to, message });
    Ok(())
}

/// Gibt Username und Formular-Status zurück
#[tauri::command]
async fn get_ui_state(state: State<'_, Arc<DesktopState>>) -> Result<UiSnapshot, String> {
    Ok(UiSnapshot {
        username: state.surface.username.lock().clone(),
        form_enabled: *state.surface.form_enabled.lock(),
    })
}

// ============================================================================
// STARTUP
// ============================================================================

async fn init(state: Arc<DesktopState>) -> Result<(), AppError> {
    let config = Config::from_env()?;
    tracing::info!("Starting with {:?}", config);

    let surface: Arc<dyn UiSurface> = Arc::clone(&state.surface) as Arc<dyn UiSurface>;
    let page = PageSession::start(&config, surface).await?;
    *state.page.write() = Some(page);

    Ok(())
}

/// Startet die Tauri-Anwendung
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    crate::init_logging();

    let result = tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(|app, _args, _cwd| {
            if let Some(window) = app.get_webview_window("main") {
                let _ = window.set_focus();
            }
        }))
        .setup(|app| {
            let state = Arc::new(DesktopState {
                surface: Arc::new(TauriSurface::new(app.handle().clone())),
                page: RwLock::new(None),
            });
            app.manage(Arc::clone(&state));

            tauri::async_runtime::spawn(async move {
                if let Err(e) = init(state).await {
                    tracing::error!("Initialization failed: {}", e);
                }
            });

            Ok(())
        })
        .on_window_event(|window, event| {
            if !matches!(
                event,
                WindowEvent::CloseRequested { .. } | WindowEvent::Destroyed
            ) {
                return;
            }

            if let Some(state) = window.try_state::<Arc<DesktopState>>() {
                let page = state.page.read().clone();
                if let Some(page) = page {
                    lifecycle::teardown(&page);
                }
            }
        })
        .invoke_handler(tauri::generate_handler![submit_message, get_ui_state])
        .run(tauri::generate_context!());

    if let Err(e) = result {
        tracing::error!("Error while running tauri application: {}", e);
    }
}
