//! Call Module - Anrufe und WebRTC Media
//!
//! Dieses Modul verwaltet:
//! - Call Handles (Zustand, annehmen, auflegen)
//! - Ausgehende Anrufe aus dem Formular
//! - Automatisches Annehmen eingehender Anrufe
//! - SDP-Aushandlung über WebRTC Peer Connections

pub mod controller;
mod handle;
mod media;

pub use handle::{Call, CallDirection, CallOptions, CallState};
pub use media::{MediaError, MediaOptions, MediaSession, SAMPLE_RATE};
