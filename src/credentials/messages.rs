//! Request/Response Types der Telnyx REST API

use serde::{Deserialize, Serialize};

// ============================================================================
// REQUESTS
// ============================================================================

/// Neues Telephony Credential für eine SIP Connection anlegen
#[derive(Debug, Clone, Serialize)]
pub struct CreateCredentialRequest {
    pub connection_id: String,
}

impl CreateCredentialRequest {
    pub fn new(connection_id: String) -> Self {
        Self { connection_id }
    }
}

/// Leerer Body für die Token-Anfrage
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmptyRequest {}

// ============================================================================
// RESPONSES
// ============================================================================

/// Antwort auf `POST /v2/telephony_credentials`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCredentialResponse {
    pub data: TelephonyCredential,
}

/// Das angelegte Credential (nur die Felder die wir brauchen)
#[derive(Debug, Clone, Deserialize)]
pub struct TelephonyCredential {
    pub id: String,
    pub sip_username: String,
}
