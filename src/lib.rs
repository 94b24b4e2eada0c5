//! Telnyx Call App - WebRTC Voice Client
//!
//! Ein minimaler Voice-Client für Telnyx mit:
//! - Kurzlebigen Credentials über die Telnyx REST API
//! - WebRTC Signaling über den Telnyx RTC Server
//! - Ausgehenden Anrufen per Formular und Auto-Answer für eingehende
//! - Tauri-Oberfläche (Feature `desktop`)

pub mod app;
pub mod call;
pub mod config;
pub mod credentials;
pub mod lifecycle;
pub mod signaling;
pub mod ui;

#[cfg(feature = "desktop")]
mod desktop;

pub use app::{AppError, PageSession};
pub use config::Config;

#[cfg(feature = "desktop")]
pub use desktop::run;

/// Initialisiert das Logging (`RUST_LOG` überschreibt die Defaults)
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("call_app_lib=debug,webrtc=warn"));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("Logging already initialized");
    }
}
