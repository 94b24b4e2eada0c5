//! WebRTC Media Session
//!
//! Eine Peer Connection pro Anruf. Hier wird nur SDP ausgehandelt,
//! Mikrofon und Lautsprecher werden nicht angebunden.

use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;

/// Sample Rate für Opus
pub const SAMPLE_RATE: u32 = 48000;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("WebRTC error: {0}")]
    WebRTC(String),

    #[error("Invalid SDP: {0}")]
    InvalidSdp(String),

    #[error("No local description after negotiation")]
    NoLocalDescription,
}

impl From<webrtc::Error> for MediaError {
    fn from(e: webrtc::Error) -> Self {
        MediaError::WebRTC(e.to_string())
    }
}

// ============================================================================
// MEDIA OPTIONS
// ============================================================================

/// Welche Medien ausgehandelt werden und über welche ICE Server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaOptions {
    pub audio: bool,
    pub video: bool,
    pub ice_servers: Vec<String>,
}

// ============================================================================
// MEDIA SESSION
// ============================================================================

/// Peer Connection eines einzelnen Anrufs
pub struct MediaSession {
    call_id: Uuid,
    pc: Arc<RTCPeerConnection>,
    options: MediaOptions,
}

impl MediaSession {
    /// Erstellt eine neue Peer Connection
    pub async fn new(call_id: Uuid, options: MediaOptions) -> Result<Self, MediaError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        // Interceptors für RTCP, NACK etc.
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if options.ice_servers.is_empty() {
            vec![]
        } else {
            vec![RTCIceServer {
                urls: options.ice_servers.clone(),
                ..Default::default()
            }]
        };
        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(config).await?);

        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            tracing::info!("Call {}: peer connection state {:?}", call_id, s);
            Box::pin(async {})
        }));

        pc.on_track(Box::new(move |track, _, _| {
            Box::pin(async move {
                tracing::info!("Call {}: remote track {:?}", call_id, track.codec());
            })
        }));

        Ok(Self {
            call_id,
            pc,
            options,
        })
    }

    /// SDP Offer für einen ausgehenden Anruf
    pub async fn create_offer(&self) -> Result<String, MediaError> {
        self.add_local_media().await?;

        let offer = self.pc.create_offer(None).await?;
        self.set_local_and_gather(offer).await
    }

    /// SDP Answer auf das Offer eines eingehenden Anrufs
    pub async fn create_answer(&self, offer_sdp: String) -> Result<String, MediaError> {
        let offer = RTCSessionDescription::offer(offer_sdp)
            .map_err(|e| MediaError::InvalidSdp(e.to_string()))?;
        self.pc.set_remote_description(offer).await?;

        self.add_local_media().await?;

        let answer = self.pc.create_answer(None).await?;
        self.set_local_and_gather(answer).await
    }

    /// Verarbeitet das SDP Answer (oder Early Media SDP) der Gegenstelle
    pub async fn apply_answer(&self, answer_sdp: String) -> Result<(), MediaError> {
        if self.pc.remote_description().await.is_some() {
            tracing::debug!("Call {}: remote description already set", self.call_id);
            return Ok(());
        }

        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|e| MediaError::InvalidSdp(e.to_string()))?;
        self.pc.set_remote_description(answer).await?;
        Ok(())
    }

    /// Schließt die Peer Connection
    pub async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            tracing::warn!("Call {}: failed to close peer connection: {}", self.call_id, e);
        }
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    async fn add_local_media(&self) -> Result<(), MediaError> {
        if self.options.audio {
            let audio_track = Arc::new(TrackLocalStaticRTP::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_string(),
                    clock_rate: SAMPLE_RATE,
                    channels: 1,
                    ..Default::default()
                },
                "audio".to_string(),
                format!("call-{}", self.call_id),
            ));

            self.pc
                .add_track(Arc::clone(&audio_track) as Arc<dyn TrackLocal + Send + Sync>)
                .await?;
        }

        if self.options.video {
            self.pc
                .add_transceiver_from_kind(
                    RTPCodecType::Video,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await?;
        }

        Ok(())
    }

    /// Setzt die Local Description und wartet auf alle ICE Candidates,
    /// Telnyx erwartet sie im SDP (kein Trickle ICE)
    async fn set_local_and_gather(
        &self,
        description: RTCSessionDescription,
    ) -> Result<String, MediaError> {
        let mut gathering_complete = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(description).await?;
        let _ = gathering_complete.recv().await;

        self.pc
            .local_description()
            .await
            .map(|d| d.sdp)
            .ok_or(MediaError::NoLocalDescription)
    }
}

impl std::fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSession")
            .field("call_id", &self.call_id)
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
