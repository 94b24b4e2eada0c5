//! Verbindungs-Task
//!
//! Hält die WebSocket-Verbindung, übersetzt Server-Nachrichten in
//! `RtcEvent`s und führt Kommandos der Call-Handles aus. Läuft bis der
//! Socket schließt oder `Disconnect` kommt, danach gibt es keinen
//! Reconnect.

use super::client::{ClientCommand, ClientOptions, ClientState, Notification, RtcEvent, SignalingError};
use super::messages::*;
use crate::call::{Call, CallDirection, CallOptions, CallState, MediaError, MediaOptions, MediaSession};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Alles was der Task vom Client braucht
pub(crate) struct ConnectionContext {
    pub options: ClientOptions,
    pub sessid: String,
    pub state: Arc<RwLock<ClientState>>,
    pub event_tx: broadcast::Sender<RtcEvent>,
    pub command_tx: mpsc::UnboundedSender<ClientCommand>,
}

/// Ein Anruf aus Sicht der Verbindung
struct CallLeg {
    call: Call,
    dialog: DialogParams,
    /// SDP Offer eines eingehenden Anrufs, bis er angenommen wird
    remote_offer: Option<String>,
    media: Option<MediaSession>,
}

struct Connection {
    ctx: ConnectionContext,
    write: WsSink,
    calls: HashMap<Uuid, CallLeg>,
}

// ============================================================================
// TASK
// ============================================================================

pub(crate) async fn run(ctx: ConnectionContext, mut commands: mpsc::UnboundedReceiver<ClientCommand>) {
    let (ws_stream, _) = match connect_async(ctx.options.rtc_url.as_str()).await {
        Ok(connected) => connected,
        Err(e) => {
            let error = SignalingError::ConnectionFailed(e.to_string());
            tracing::error!("{}", error);
            let _ = ctx.event_tx.send(RtcEvent::SocketError(error.to_string()));
            return;
        }
    };

    ctx.state.write().is_connected = true;
    tracing::info!("Connected to RTC server");

    let (write, mut read) = ws_stream.split();
    let mut conn = Connection {
        ctx,
        write,
        calls: HashMap::new(),
    };

    let login = RpcRequest::new(
        METHOD_LOGIN,
        LoginParams::new(conn.ctx.options.login_token.clone(), conn.ctx.sessid.clone()),
    );
    if let Err(e) = conn.send(&login).await {
        tracing::error!("Failed to send login: {}", e);
        conn.emit(RtcEvent::SocketError(e.to_string()));
        conn.shutdown().await;
        return;
    }

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => conn.handle_text(&text).await,
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("WebSocket closed by server");
                    conn.emit(RtcEvent::SocketClose);
                    break;
                }
                Some(Err(e)) => {
                    tracing::error!("WebSocket error: {}", e);
                    conn.emit(RtcEvent::SocketError(e.to_string()));
                    break;
                }
                Some(Ok(_)) => {}
            },
            command = commands.recv() => match command {
                Some(ClientCommand::Disconnect) | None => {
                    let _ = conn.write.send(Message::Close(None)).await;
                    break;
                }
                Some(command) => conn.handle_command(command).await,
            },
        }
    }

    conn.shutdown().await;
}

// ============================================================================
// CONNECTION
// ============================================================================

impl Connection {
    fn emit(&self, event: RtcEvent) {
        let _ = self.ctx.event_tx.send(event);
    }

    fn notify_call(&self, call: &Call) {
        tracing::debug!("Call {} is {}", call.id(), call.state());
        self.emit(RtcEvent::Notification(Notification::CallUpdate(call.clone())));
    }

    async fn send<T: Serialize>(&mut self, message: &T) -> Result<(), SignalingError> {
        let text =
            serde_json::to_string(message).map_err(|e| SignalingError::SendFailed(e.to_string()))?;
        tracing::debug!("-> {}", text);
        self.write
            .send(Message::Text(text))
            .await
            .map_err(|e| SignalingError::SendFailed(e.to_string()))
    }

    /// Media schließen und Zustand zurücksetzen
    async fn shutdown(&mut self) {
        for (_, leg) in self.calls.drain() {
            if let Some(media) = leg.media {
                media.close().await;
            }
        }

        let mut state = self.ctx.state.write();
        state.is_connected = false;
        state.is_ready = false;
    }

    fn media_options(&self, audio: bool, video: bool) -> MediaOptions {
        MediaOptions {
            audio,
            video,
            ice_servers: self.ctx.options.ice_servers.clone(),
        }
    }

    // ========================================================================
    // SERVER MESSAGES
    // ========================================================================

    async fn handle_text(&mut self, text: &str) {
        tracing::debug!("<- {}", text);

        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Unparseable message from RTC server: {}", e);
                return;
            }
        };

        match message {
            ServerMessage::Response { .. } => {}

            ServerMessage::Error { error, .. } => {
                tracing::error!("RTC server error {}: {}", error.code, error.message);
                self.emit(RtcEvent::Error(SignalingError::ServerError {
                    code: error.code,
                    message: error.message,
                }));
            }

            ServerMessage::Request { id, method, params } => {
                // Jeder Server-Request wird bestätigt
                if let Some(id) = id {
                    if let Err(e) = self.send(&RpcAck::new(id, method.clone())).await {
                        tracing::warn!("Failed to acknowledge {}: {}", method, e);
                    }
                }

                self.handle_request(method, params).await;
            }
        }
    }

    async fn handle_request(&mut self, method: String, params: Value) {
        match method.as_str() {
            METHOD_CLIENT_READY => {
                self.ctx.state.write().is_ready = true;
                tracing::info!("RTC client ready");
                self.emit(RtcEvent::Ready);
            }
            METHOD_PING => {}
            METHOD_INVITE => self.on_invite(params),
            METHOD_ANSWER => self.on_remote_sdp(params, CallState::Active).await,
            METHOD_MEDIA => self.on_remote_sdp(params, CallState::Early).await,
            METHOD_BYE => self.on_bye(params).await,
            _ => self.emit(RtcEvent::Notification(Notification::Other {
                kind: method,
                payload: params,
            })),
        }
    }

    fn call_params(params: Value) -> Option<CallEventParams> {
        match serde_json::from_value::<CallEventParams>(params) {
            Ok(params) => Some(params),
            Err(e) => {
                tracing::warn!("Invalid call event params: {}", e);
                None
            }
        }
    }

    /// Eingehender Anruf
    fn on_invite(&mut self, params: Value) {
        let Some(params) = Self::call_params(params) else {
            return;
        };

        let remote_name = params.caller_id_name.unwrap_or_default();
        let remote_number = params.caller_id_number.unwrap_or_default();
        tracing::info!(
            "Incoming call {} from {} ({})",
            params.call_id,
            remote_name,
            remote_number
        );

        let call = Call::new(
            params.call_id,
            CallDirection::Inbound,
            remote_number.clone(),
            remote_name.clone(),
            CallState::Ringing,
            self.ctx.command_tx.clone(),
        );

        self.calls.insert(
            params.call_id,
            CallLeg {
                call: call.clone(),
                dialog: DialogParams::inbound(params.call_id, &remote_name, &remote_number),
                remote_offer: params.sdp,
                media: None,
            },
        );

        self.notify_call(&call);
    }

    /// Answer oder Early Media der Gegenstelle
    async fn on_remote_sdp(&mut self, params: Value, new_state: CallState) {
        let Some(params) = Self::call_params(params) else {
            return;
        };
        let Some(leg) = self.calls.get(&params.call_id) else {
            tracing::warn!("Remote SDP for unknown call {}", params.call_id);
            return;
        };

        if let (Some(media), Some(sdp)) = (leg.media.as_ref(), params.sdp) {
            if let Err(e) = media.apply_answer(sdp).await {
                tracing::error!("Call {}: failed to apply remote SDP: {}", params.call_id, e);
            }
        }

        let call = leg.call.clone();
        call.set_state(new_state);
        self.notify_call(&call);
    }

    /// Gegenstelle hat aufgelegt
    async fn on_bye(&mut self, params: Value) {
        let Some(params) = Self::call_params(params) else {
            return;
        };
        let Some(leg) = self.calls.remove(&params.call_id) else {
            tracing::debug!("Bye for unknown call {}", params.call_id);
            return;
        };

        tracing::info!(
            "Call {} ended by remote ({})",
            params.call_id,
            params.cause.as_deref().unwrap_or("unknown cause")
        );

        if let Some(media) = leg.media {
            media.close().await;
        }

        leg.call.set_state(CallState::Hangup);
        self.notify_call(&leg.call);
        leg.call.set_state(CallState::Destroy);
        self.notify_call(&leg.call);
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Invite { call, options } => self.invite(call, options).await,
            ClientCommand::Answer { call_id } => self.answer(call_id).await,
            ClientCommand::Hangup { call_id } => self.hangup(call_id).await,
            ClientCommand::Disconnect => {}
        }
    }

    async fn invite(&mut self, call: Call, options: CallOptions) {
        let call_id = call.id();
        call.set_state(CallState::Requesting);
        self.notify_call(&call);

        let dialog = DialogParams::outbound(call_id, &options);
        let media_options = self.media_options(options.audio, options.video);

        let result = async {
            let media = MediaSession::new(call_id, media_options).await?;
            let sdp = media.create_offer().await?;
            let request = RpcRequest::new(
                METHOD_INVITE,
                SdpParams {
                    sessid: self.ctx.sessid.clone(),
                    sdp,
                    dialog_params: dialog.clone(),
                },
            );
            self.send(&request)
                .await
                .map_err(|e| MediaError::WebRTC(e.to_string()))?;
            Ok::<_, MediaError>(media)
        }
        .await;

        match result {
            Ok(media) => {
                call.set_state(CallState::Trying);
                self.calls.insert(
                    call_id,
                    CallLeg {
                        call: call.clone(),
                        dialog,
                        remote_offer: None,
                        media: Some(media),
                    },
                );
                self.notify_call(&call);
            }
            Err(e) => {
                tracing::error!("Call {}: invite failed: {}", call_id, e);
                call.set_state(CallState::Destroy);
                self.notify_call(&call);
            }
        }
    }

    async fn answer(&mut self, call_id: Uuid) {
        let Some(leg) = self.calls.get_mut(&call_id) else {
            tracing::warn!("Answer for unknown call {}", call_id);
            return;
        };
        let (offer, dialog, call) = (leg.remote_offer.take(), leg.dialog.clone(), leg.call.clone());

        // Ohne Offer kann nicht angenommen werden, Anruf beenden
        let Some(offer) = offer else {
            tracing::warn!("Call {} has no offer to answer", call_id);
            self.hangup(call_id).await;
            return;
        };

        let media_options = self.media_options(dialog.audio, dialog.video);
        let result = async {
            let media = MediaSession::new(call_id, media_options).await?;
            let sdp = media.create_answer(offer).await?;
            let request = RpcRequest::new(
                METHOD_ANSWER,
                SdpParams {
                    sessid: self.ctx.sessid.clone(),
                    sdp,
                    dialog_params: dialog,
                },
            );
            self.send(&request)
                .await
                .map_err(|e| MediaError::WebRTC(e.to_string()))?;
            Ok::<_, MediaError>(media)
        }
        .await;

        match result {
            Ok(media) => {
                if let Some(leg) = self.calls.get_mut(&call_id) {
                    leg.media = Some(media);
                }
                call.set_state(CallState::Active);
                self.notify_call(&call);
            }
            Err(e) => {
                tracing::error!("Call {}: answer failed: {}", call_id, e);
                self.hangup(call_id).await;
            }
        }
    }

    async fn hangup(&mut self, call_id: Uuid) {
        let Some(leg) = self.calls.remove(&call_id) else {
            tracing::debug!("Hangup for unknown call {}", call_id);
            return;
        };

        let bye = RpcRequest::new(
            METHOD_BYE,
            ByeParams::normal_clearing(self.ctx.sessid.clone(), leg.dialog.clone()),
        );
        if let Err(e) = self.send(&bye).await {
            tracing::warn!("Call {}: failed to send bye: {}", call_id, e);
        }

        if let Some(media) = leg.media {
            media.close().await;
        }

        leg.call.set_state(CallState::Destroy);
        self.notify_call(&leg.call);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use crate::signaling::test_server::{next_event, TestServer, TIMEOUT};
    use crate::signaling::RtcClient;
    use super::*;
    use serde_json::json;

    fn client(url: &str) -> (RtcClient, broadcast::Receiver<RtcEvent>) {
        let client = RtcClient::new(ClientOptions {
            rtc_url: url.to_string(),
            login_token: "tok".to_string(),
            ice_servers: vec![],
        });
        let events = client.subscribe();
        client.connect();
        (client, events)
    }

    /// Wartet auf ein Call Update, in dem der Anruf `state` erreicht hat
    async fn wait_for_call(events: &mut broadcast::Receiver<RtcEvent>, state: CallState) -> Call {
        loop {
            if let RtcEvent::Notification(Notification::CallUpdate(call)) = next_event(events).await {
                if call.state() == state {
                    return call;
                }
            }
        }
    }

    fn invite(id: &str, call_id: Uuid) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": METHOD_INVITE,
            "params": {
                "callID": call_id,
                "caller_id_name": "Alice",
                "caller_id_number": "+15550001111",
            },
        })
    }

    #[tokio::test]
    async fn test_login_then_ready() {
        let server = TestServer::bind().await;
        let (client, mut events) = client(&server.url);

        let (mut peer, login) = server.accept().await;
        assert_eq!(login["jsonrpc"], "2.0");
        assert_eq!(login["params"]["login_token"], "tok");
        assert!(login["params"]["userVariables"].is_object());
        assert!(login["params"]["sessid"].is_string());

        peer.send(json!({"jsonrpc": "2.0", "id": "r1", "method": METHOD_CLIENT_READY, "params": {}}))
            .await;

        let ack = peer.recv_ack("r1").await;
        assert_eq!(ack["result"]["method"], METHOD_CLIENT_READY);
        assert!(matches!(next_event(&mut events).await, RtcEvent::Ready));
        assert!(client.is_connected());
        assert!(client.is_ready());
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = TestServer::bind().await;
        let (client, mut events) = client(&server.url);

        let (mut peer, login) = server.accept().await;
        peer.send(json!({
            "jsonrpc": "2.0",
            "id": login["id"],
            "error": {"code": -32001, "message": "Authentication Required"},
        }))
        .await;

        match next_event(&mut events).await {
            RtcEvent::Error(SignalingError::ServerError { code, message }) => {
                assert_eq!(code, -32001);
                assert_eq!(message, "Authentication Required");
            }
            other => panic!("Expected server error, got {:?}", other),
        }
        assert!(!client.is_ready());
    }

    #[tokio::test]
    async fn test_ping_is_acknowledged() {
        let server = TestServer::bind().await;
        let (_client, _events) = client(&server.url);

        let (mut peer, _) = server.accept().await;
        peer.send(json!({"jsonrpc": "2.0", "id": "p1", "method": METHOD_PING, "params": {}}))
            .await;

        let ack = peer.recv_ack("p1").await;
        assert_eq!(ack, json!({"jsonrpc": "2.0", "id": "p1", "result": {"method": METHOD_PING}}));
    }

    #[tokio::test]
    async fn test_unknown_method_is_notification() {
        let server = TestServer::bind().await;
        let (_client, mut events) = client(&server.url);

        let (mut peer, _) = server.accept().await;
        peer.send(json!({"jsonrpc": "2.0", "method": "telnyx_rtc.punt", "params": {"x": 1}}))
            .await;

        match next_event(&mut events).await {
            RtcEvent::Notification(Notification::Other { kind, payload }) => {
                assert_eq!(kind, "telnyx_rtc.punt");
                assert_eq!(payload, json!({"x": 1}));
            }
            other => panic!("Expected notification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inbound_invite_then_remote_bye() {
        let server = TestServer::bind().await;
        let (_client, mut events) = client(&server.url);
        let call_id = Uuid::new_v4();

        let (mut peer, _) = server.accept().await;
        peer.send(invite("i1", call_id)).await;
        assert_eq!(peer.recv_ack("i1").await["result"]["method"], METHOD_INVITE);

        let call = wait_for_call(&mut events, CallState::Ringing).await;
        assert_eq!(call.id(), call_id);
        assert_eq!(call.direction(), CallDirection::Inbound);
        assert_eq!(call.remote_name(), "Alice");
        assert_eq!(call.remote_number(), "+15550001111");

        peer.send(json!({
            "jsonrpc": "2.0",
            "id": "b1",
            "method": METHOD_BYE,
            "params": {"callID": call_id, "cause": "USER_BUSY"},
        }))
        .await;

        let ended = wait_for_call(&mut events, CallState::Destroy).await;
        assert_eq!(ended, call);
    }

    #[tokio::test]
    async fn test_answer_without_offer_ends_call() {
        let server = TestServer::bind().await;
        let (_client, mut events) = client(&server.url);
        let call_id = Uuid::new_v4();

        let (mut peer, _) = server.accept().await;
        peer.send(invite("i1", call_id)).await;
        let call = wait_for_call(&mut events, CallState::Ringing).await;

        call.answer();

        let bye = peer.recv_method(METHOD_BYE).await;
        assert_eq!(bye["params"]["cause"], CAUSE_NORMAL_CLEARING);
        assert_eq!(bye["params"]["causeCode"], 16);
        assert_eq!(bye["params"]["dialogParams"]["callID"], call_id.to_string());

        wait_for_call(&mut events, CallState::Destroy).await;
        assert_eq!(call.state(), CallState::Destroy);
    }

    #[tokio::test]
    async fn test_outbound_invite_sends_offer() {
        let server = TestServer::bind().await;
        let (client, mut events) = client(&server.url);

        let (mut peer, _) = server.accept().await;
        let call = client.new_call(CallOptions {
            destination_number: "sip:100@sip.telnyx.com".to_string(),
            caller_name: "u1".to_string(),
            caller_number: String::new(),
            audio: true,
            video: false,
        });

        let request = peer.recv_method(METHOD_INVITE).await;
        let params = &request["params"];
        assert!(params["sdp"].as_str().unwrap().to_lowercase().contains("opus"));
        assert_eq!(params["dialogParams"]["callID"], call.id().to_string());
        assert_eq!(params["dialogParams"]["destination_number"], "sip:100@sip.telnyx.com");
        assert_eq!(params["dialogParams"]["caller_id_name"], "u1");

        wait_for_call(&mut events, CallState::Trying).await;

        peer.send(json!({
            "jsonrpc": "2.0",
            "id": "a1",
            "method": METHOD_ANSWER,
            "params": {"callID": call.id()},
        }))
        .await;

        wait_for_call(&mut events, CallState::Active).await;
        assert_eq!(call.state(), CallState::Active);
    }

    #[tokio::test]
    async fn test_server_close_emits_socket_close() {
        let server = TestServer::bind().await;
        let (client, mut events) = client(&server.url);

        let (mut peer, _) = server.accept().await;
        peer.close().await;

        assert!(matches!(next_event(&mut events).await, RtcEvent::SocketClose));
        tokio::time::timeout(TIMEOUT, async {
            while client.is_connected() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_failed_connect_emits_socket_error() {
        let url = {
            let server = TestServer::bind().await;
            server.url.clone()
        };
        let (client, mut events) = client(&url);

        assert!(matches!(next_event(&mut events).await, RtcEvent::SocketError(_)));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_closes_socket() {
        let server = TestServer::bind().await;
        let (client, _events) = client(&server.url);

        let (mut peer, _) = server.accept().await;
        client.disconnect();

        assert_eq!(peer.recv().await, None);
    }
}
