//! Message Types für das Telnyx RTC Protokoll
//!
//! JSON-RPC 2.0 über WebSocket. Client-Requests werden typisiert
//! serialisiert, Server-Nachrichten erst generisch geparst und dann
//! nach Methode klassifiziert.

use crate::call::CallOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const JSONRPC_VERSION: &str = "2.0";

// Methoden
pub const METHOD_LOGIN: &str = "login";
pub const METHOD_CLIENT_READY: &str = "telnyx_rtc.clientReady";
pub const METHOD_INVITE: &str = "telnyx_rtc.invite";
pub const METHOD_ANSWER: &str = "telnyx_rtc.answer";
pub const METHOD_MEDIA: &str = "telnyx_rtc.media";
pub const METHOD_BYE: &str = "telnyx_rtc.bye";
pub const METHOD_PING: &str = "telnyx_rtc.ping";

/// Hangup-Grund bei normalem Auflegen
pub const CAUSE_NORMAL_CLEARING: &str = "NORMAL_CLEARING";
pub const CAUSE_CODE_NORMAL_CLEARING: u16 = 16;

// ============================================================================
// CLIENT → SERVER MESSAGES
// ============================================================================

/// JSON-RPC Request
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<P: Serialize> {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: &'static str,
    pub params: P,
}

impl<P: Serialize> RpcRequest<P> {
    pub fn new(method: &'static str, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Uuid::new_v4().to_string(),
            method,
            params,
        }
    }
}

/// Antwort auf einen Server-Request (z.B. Ping oder Invite)
#[derive(Debug, Clone, Serialize)]
pub struct RpcAck {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub result: AckResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct AckResult {
    pub method: String,
}

impl RpcAck {
    pub fn new(id: Value, method: String) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: AckResult { method },
        }
    }
}

/// Login mit kurzlebigem Token
#[derive(Debug, Clone, Serialize)]
pub struct LoginParams {
    pub login_token: String,
    #[serde(rename = "userVariables")]
    pub user_variables: serde_json::Map<String, Value>,
    #[serde(rename = "loginParams")]
    pub login_params: serde_json::Map<String, Value>,
    pub sessid: String,
}

impl LoginParams {
    pub fn new(login_token: String, sessid: String) -> Self {
        Self {
            login_token,
            user_variables: serde_json::Map::new(),
            login_params: serde_json::Map::new(),
            sessid,
        }
    }
}

/// Dialog-Parameter eines Anrufs
#[derive(Debug, Clone, Serialize)]
pub struct DialogParams {
    #[serde(rename = "callID")]
    pub call_id: Uuid,
    pub destination_number: String,
    pub caller_id_name: String,
    pub caller_id_number: String,
    pub remote_caller_id_name: String,
    pub remote_caller_id_number: String,
    pub audio: bool,
    pub video: bool,
}

impl DialogParams {
    /// Für einen ausgehenden Anruf
    pub fn outbound(call_id: Uuid, options: &CallOptions) -> Self {
        Self {
            call_id,
            destination_number: options.destination_number.clone(),
            caller_id_name: options.caller_name.clone(),
            caller_id_number: options.caller_number.clone(),
            remote_caller_id_name: String::new(),
            remote_caller_id_number: options.destination_number.clone(),
            audio: options.audio,
            video: options.video,
        }
    }

    /// Für einen eingehenden Anruf (Anrufer ist die Gegenstelle)
    pub fn inbound(call_id: Uuid, remote_name: &str, remote_number: &str) -> Self {
        Self {
            call_id,
            destination_number: remote_number.to_string(),
            caller_id_name: String::new(),
            caller_id_number: String::new(),
            remote_caller_id_name: remote_name.to_string(),
            remote_caller_id_number: remote_number.to_string(),
            audio: true,
            video: false,
        }
    }
}

/// Invite oder Answer mit SDP
#[derive(Debug, Clone, Serialize)]
pub struct SdpParams {
    pub sessid: String,
    pub sdp: String,
    #[serde(rename = "dialogParams")]
    pub dialog_params: DialogParams,
}

/// Auflegen
#[derive(Debug, Clone, Serialize)]
pub struct ByeParams {
    pub sessid: String,
    #[serde(rename = "dialogParams")]
    pub dialog_params: DialogParams,
    pub cause: &'static str,
    #[serde(rename = "causeCode")]
    pub cause_code: u16,
}

impl ByeParams {
    pub fn normal_clearing(sessid: String, dialog_params: DialogParams) -> Self {
        Self {
            sessid,
            dialog_params,
            cause: CAUSE_NORMAL_CLEARING,
            cause_code: CAUSE_CODE_NORMAL_CLEARING,
        }
    }
}

// ============================================================================
// SERVER → CLIENT MESSAGES
// ============================================================================

/// JSON-RPC Fehlerobjekt
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Rohform jeder Server-Nachricht
#[derive(Debug, Clone, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Klassifizierte Server-Nachricht
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Request oder Event vom Server
    Request {
        id: Option<Value>,
        method: String,
        params: Value,
    },

    /// Erfolgreiche Antwort auf einen unserer Requests
    Response { id: Option<Value>, result: Value },

    /// Fehlerantwort auf einen unserer Requests
    Error { id: Option<Value>, error: RpcError },
}

impl ServerMessage {
    /// Parst einen WebSocket Text-Frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawMessage = serde_json::from_str(text)?;

        // Manche Fehler kommen als `result.error`
        let nested_error = raw
            .result
            .as_ref()
            .and_then(|r| r.get("error"))
            .and_then(|e| serde_json::from_value::<RpcError>(e.clone()).ok());

        Ok(match (raw.method, raw.error.or(nested_error)) {
            (Some(method), _) => ServerMessage::Request {
                id: raw.id,
                method,
                params: raw.params.unwrap_or(Value::Null),
            },
            (None, Some(error)) => ServerMessage::Error { id: raw.id, error },
            (None, None) => ServerMessage::Response {
                id: raw.id,
                result: raw.result.unwrap_or(Value::Null),
            },
        })
    }
}

/// Params von invite/answer/media/bye vom Server
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallEventParams {
    #[serde(rename = "callID")]
    pub call_id: Uuid,
    #[serde(default)]
    pub sdp: Option<String>,
    #[serde(default)]
    pub caller_id_name: Option<String>,
    #[serde(default)]
    pub caller_id_number: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
}

// ============================================================================
// TESTS
// ============================================================================
