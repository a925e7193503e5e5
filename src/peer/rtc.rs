//! webrtc-rs implementation of the peer transport capability
//!
//! Wraps one `RTCPeerConnection` per remote participant. Negotiation data
//! crosses the relay as an opaque JSON payload; [`SignalPayload`] is its
//! shape on both ends of a connection.

use super::transport::{PeerEventSender, PeerRole, PeerTransport, PeerTransportEvent};
use crate::ice::IceServer;
use crate::media::{MediaStream, MediaTrack, TrackKind};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Negotiation data exchanged between two transports via the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SignalPayload {
    /// Initiator's session description
    Offer {
        /// SDP text
        sdp: String,
    },
    /// Responder's session description
    Answer {
        /// SDP text
        sdp: String,
    },
    /// A trickled ICE candidate
    Candidate {
        /// JSON-encoded candidate init
        candidate: String,
    },
}

impl SignalPayload {
    fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| {
            Error::SerializationError(format!("Failed to serialize signal payload: {e}"))
        })
    }

    fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::UnroutableSignal(format!("Malformed signal payload: {e}")))
    }
}

/// Factory producing [`RtcPeerTransport`] connections
pub struct RtcTransportFactory {
    ice_servers: Vec<IceServer>,
}

impl RtcTransportFactory {
    /// Create a factory using the given negotiation servers
    pub fn new(ice_servers: Vec<IceServer>) -> Self {
        Self { ice_servers }
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers: Vec<RTCIceServer> = self
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

/// One `RTCPeerConnection` wrapped behind the transport capability
pub struct RtcPeerTransport {
    peer_id: String,
    peer_connection: Arc<RTCPeerConnection>,
    /// Video RTP sender, retained so the outgoing track can be swapped
    /// without renegotiation
    video_sender: Arc<RTCRtpSender>,
    events: PeerEventSender,
}

impl RtcPeerTransport {
    async fn new(
        factory: &RtcTransportFactory,
        peer_id: &str,
        local_stream: MediaStream,
        events: PeerEventSender,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {e}")))?;

        let interceptor_registry = register_default_interceptors(Default::default(), &mut media_engine)
            .map_err(|e| Error::WebRtcError(format!("Failed to register interceptors: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let peer_connection = Arc::new(
            api.new_peer_connection(factory.rtc_configuration())
                .await
                .map_err(|e| Error::WebRtcError(format!("Failed to create peer connection: {e}")))?,
        );

        // Outgoing tracks carry the ids of the local handles so swaps stay
        // traceable in logs.
        let audio = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: 2,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            local_stream.audio_track().id().to_string(),
            local_stream.id().to_string(),
        ));
        peer_connection
            .add_track(audio as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add audio track: {e}")))?;

        let video = Arc::new(TrackLocalStaticSample::new(
            video_codec_capability(),
            local_stream.video_track().id().to_string(),
            local_stream.id().to_string(),
        ));
        let video_sender = peer_connection
            .add_track(video as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to add video track: {e}")))?;

        Self::install_candidate_handler(&peer_connection, peer_id, events.clone());
        Self::install_track_handler(&peer_connection, peer_id, events.clone());
        Self::install_state_handler(&peer_connection, peer_id, events.clone());

        Ok(Self {
            peer_id: peer_id.to_string(),
            peer_connection,
            video_sender,
            events,
        })
    }

    fn install_candidate_handler(
        peer_connection: &Arc<RTCPeerConnection>,
        peer_id: &str,
        events: PeerEventSender,
    ) {
        let peer_id = peer_id.to_string();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let peer_id = peer_id.clone();
            let events = events.clone();

            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("ICE gathering complete for peer {}", peer_id);
                    return;
                };

                let init = match candidate.to_json() {
                    Ok(init) => init,
                    Err(e) => {
                        warn!("Failed to serialize ICE candidate: {}", e);
                        return;
                    }
                };

                let json = match serde_json::to_string(&init) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to encode ICE candidate: {}", e);
                        return;
                    }
                };

                let payload = SignalPayload::Candidate { candidate: json };
                if let Ok(value) = payload.to_value() {
                    let _ = events.send((peer_id, PeerTransportEvent::Signal { payload: value }));
                }
            })
        }));
    }

    fn install_track_handler(
        peer_connection: &Arc<RTCPeerConnection>,
        peer_id: &str,
        events: PeerEventSender,
    ) {
        let peer_id = peer_id.to_string();
        // The remote side sends one audio and one video track; surface a
        // single stream handle on the first arrival.
        let media_seen = Arc::new(AtomicBool::new(false));

        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let peer_id = peer_id.clone();
            let events = events.clone();
            let media_seen = Arc::clone(&media_seen);

            Box::pin(async move {
                debug!(
                    "Remote track {} from peer {}: {}",
                    track.id(),
                    peer_id,
                    track.codec().capability.mime_type
                );

                if media_seen.swap(true, Ordering::SeqCst) {
                    return;
                }

                // Carry the wire-level id of the arriving track into the
                // matching slot; the other slot's track has not been seen
                // yet, so its handle keeps a generated id.
                let (audio, video) = match track.kind() {
                    RTPCodecType::Audio => (
                        MediaTrack::remote_with_id(&track.id(), TrackKind::Audio),
                        MediaTrack::remote(TrackKind::Video),
                    ),
                    _ => (
                        MediaTrack::remote(TrackKind::Audio),
                        MediaTrack::remote_with_id(&track.id(), TrackKind::Video),
                    ),
                };

                match MediaStream::new(audio, video) {
                    Ok(stream) => {
                        info!("First media arrived from peer {}", peer_id);
                        let _ = events.send((peer_id, PeerTransportEvent::MediaArrived { stream }));
                    }
                    Err(e) => warn!("Failed to build remote stream: {}", e),
                }
            })
        }));
    }

    fn install_state_handler(
        peer_connection: &Arc<RTCPeerConnection>,
        peer_id: &str,
        events: PeerEventSender,
    ) {
        let peer_id = peer_id.to_string();
        let closed_seen = Arc::new(AtomicBool::new(false));

        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                let peer_id = peer_id.clone();
                let events = events.clone();
                let closed_seen = Arc::clone(&closed_seen);

                Box::pin(async move {
                    debug!("Peer {} connection state: {}", peer_id, state);

                    let reason = match state {
                        RTCPeerConnectionState::Failed => "connection failed",
                        RTCPeerConnectionState::Disconnected => "connection dropped",
                        RTCPeerConnectionState::Closed => "connection closed",
                        _ => return,
                    };

                    if closed_seen.swap(true, Ordering::SeqCst) {
                        return;
                    }

                    let _ = events.send((
                        peer_id,
                        PeerTransportEvent::Closed {
                            reason: reason.to_string(),
                        },
                    ));
                })
            },
        ));
    }

    /// Start negotiation: create the offer and emit it as a signal
    async fn send_offer(&self) -> Result<()> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {e}")))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {e}")))?;

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::SdpError("No local description after offer".to_string()))?;

        debug!("Created offer for peer {}", self.peer_id);
        self.emit_signal(SignalPayload::Offer {
            sdp: local_desc.sdp,
        })
    }

    async fn answer_offer(&self, sdp: String) -> Result<()> {
        let offer = RTCSessionDescription::offer(sdp)
            .map_err(|e| Error::SdpError(format!("Failed to parse offer: {e}")))?;

        self.peer_connection
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {e}")))?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {e}")))?;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {e}")))?;

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| Error::SdpError("No local description after answer".to_string()))?;

        debug!("Created answer for peer {}", self.peer_id);
        self.emit_signal(SignalPayload::Answer {
            sdp: local_desc.sdp,
        })
    }

    async fn accept_answer(&self, sdp: String) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp)
            .map_err(|e| Error::SdpError(format!("Failed to parse answer: {e}")))?;

        self.peer_connection
            .set_remote_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {e}")))?;

        debug!("Accepted answer from peer {}", self.peer_id);
        Ok(())
    }

    async fn add_candidate(&self, candidate: String) -> Result<()> {
        let init: RTCIceCandidateInit = serde_json::from_str(&candidate)
            .map_err(|e| Error::IceCandidateError(format!("Failed to parse ICE candidate: {e}")))?;

        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {e}")))?;

        Ok(())
    }

    fn emit_signal(&self, payload: SignalPayload) -> Result<()> {
        let value = payload.to_value()?;
        let _ = self
            .events
            .send((self.peer_id.clone(), PeerTransportEvent::Signal { payload: value }));
        Ok(())
    }
}

#[async_trait::async_trait]
impl PeerTransport for RtcPeerTransport {
    async fn apply_signal(&self, payload: serde_json::Value) -> Result<()> {
        match SignalPayload::from_value(payload)? {
            SignalPayload::Offer { sdp } => self.answer_offer(sdp).await,
            SignalPayload::Answer { sdp } => self.accept_answer(sdp).await,
            SignalPayload::Candidate { candidate } => self.add_candidate(candidate).await,
        }
    }

    async fn replace_video_track(&self, track: MediaTrack) -> Result<()> {
        if track.kind() != TrackKind::Video {
            return Err(Error::MediaTrackError(
                "replace_video_track requires a video track".to_string(),
            ));
        }

        let local = Arc::new(TrackLocalStaticSample::new(
            video_codec_capability(),
            track.id().to_string(),
            format!("stream-{}", self.peer_id),
        ));

        self.video_sender
            .replace_track(Some(local as Arc<dyn TrackLocal + Send + Sync>))
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to replace video track: {e}")))?;

        debug!("Replaced outgoing video track for peer {}", self.peer_id);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!("Closing connection to peer {}", self.peer_id);
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::TransportFailure(format!("Failed to close connection: {e}")))
    }
}

fn video_codec_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: "video/VP8".to_string(),
        clock_rate: 90000,
        channels: 0,
        sdp_fmtp_line: String::new(),
        rtcp_feedback: vec![],
    }
}

#[async_trait::async_trait]
impl super::transport::PeerTransportFactory for RtcTransportFactory {
    async fn create(
        &self,
        peer_id: &str,
        role: PeerRole,
        local_stream: MediaStream,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerTransport>> {
        info!("Creating {:?} connection to peer {}", role, peer_id);

        let transport = RtcPeerTransport::new(self, peer_id, local_stream, events).await?;

        if role == PeerRole::Initiator {
            transport.send_offer().await?;
        }

        Ok(Arc::new(transport))
    }
}
