//! Credentials Module - Telnyx REST API
//!
//! Holt pro Sitzung einen kurzlebigen Login-Token:
//! - Telephony Credential für die SIP Connection anlegen
//! - Token für dieses Credential ausstellen lassen
//!

mod fetcher;
mod messages;

pub use fetcher::{CredentialError, CredentialFetcher, Credentials};
pub use messages::*;
