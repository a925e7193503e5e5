//! Call session coordinator
//!
//! [`CallSession`] owns the lifecycle of one call: local capture, the
//! relay connection, the peer registry, and the outgoing track state.
//! All mutation funnels through a single session lock, so signaling
//! dispatch, track toggles, and screen-share substitution never
//! interleave mid-operation.
//!
//! Every `join` mints a new session epoch from a monotonic counter.
//! Work belonging to an older epoch discovers it is stale at its next
//! suspension point and unwinds without touching current state.

use crate::config::CallConfig;
use crate::events::SessionEvent;
use crate::ice::build_ice_servers;
use crate::media::{MediaDevices, MediaStream, MediaTrack};
use crate::peer::{
    PeerRegistry, PeerRole, PeerTransportEvent, PeerTransportFactory, RtcTransportFactory,
};
use crate::signaling::{
    ClientMessage, RelayMessage, SignalingConnection, SignalingConnector, WebSocketConnector,
};
use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// What the video slot of the local stream currently carries
enum VideoSource {
    Camera,
    Screen {
        /// Camera enablement at share start, restored on stop
        prior_video_enabled: bool,
    },
}

/// State owned by one joined call
struct ActiveCall {
    epoch: u64,
    local_peer_id: String,
    stream: MediaStream,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    registry: PeerRegistry,
    video_source: VideoSource,
    peer_events_tx: mpsc::UnboundedSender<(String, PeerTransportEvent)>,
}

/// Coordinator for one participant's presence in a peer-mesh call
///
/// Constructed once per application; `join`/`leave` cycle through calls.
/// State changes reach the host through the [`SessionEvent`] receiver
/// returned by [`new`](Self::new).
pub struct CallSession {
    config: CallConfig,
    devices: Arc<dyn MediaDevices>,
    transports: Arc<dyn PeerTransportFactory>,
    connector: Arc<dyn SignalingConnector>,
    events: mpsc::UnboundedSender<SessionEvent>,

    /// Monotonic join counter; the current value is the live epoch
    epoch: AtomicU64,

    /// Serializes capture requests against the device layer
    capture_gate: Mutex<()>,

    /// The session lock: every state mutation goes through here
    active: Mutex<Option<ActiveCall>>,
}

impl CallSession {
    /// Create a session with explicit capability implementations
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `config` fails validation.
    pub fn new(
        config: CallConfig,
        devices: Arc<dyn MediaDevices>,
        transports: Arc<dyn PeerTransportFactory>,
        connector: Arc<dyn SignalingConnector>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>)> {
        config.validate()?;

        let (events, events_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            config,
            devices,
            transports,
            connector,
            events,
            epoch: AtomicU64::new(0),
            capture_gate: Mutex::new(()),
            active: Mutex::new(None),
        });

        Ok((session, events_rx))
    }

    /// Create a session wired to the production stack
    ///
    /// Uses the WebSocket relay connector and webrtc-rs transports built
    /// from the negotiation servers in `config`.
    pub fn with_default_stack(
        config: CallConfig,
        devices: Arc<dyn MediaDevices>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>)> {
        let transports = Arc::new(RtcTransportFactory::new(build_ice_servers(&config)));
        let connector = Arc::new(WebSocketConnector::new(&config.relay_url));
        Self::new(config, devices, transports, connector)
    }

    /// Join the call as `identity`
    ///
    /// Captures local media, connects to the relay, and starts dispatching
    /// signaling. The call starts with microphone and camera disabled; the
    /// host enables them explicitly.
    ///
    /// Joining while already joined tears the previous call down first.
    ///
    /// # Errors
    ///
    /// - `Error::DeviceUnavailable` if local capture fails (nothing joins)
    /// - `Error::StaleSession` if a newer `join` superseded this one while
    ///   it was waiting on capture or the relay
    /// - signaling errors from the relay connection
    pub async fn join(self: &Arc<Self>, identity: &str) -> Result<()> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Joining call as '{}' (session {})", identity, epoch);

        let stream = {
            let _gate = self.capture_gate.lock().await;
            self.devices.capture_media().await?
        };

        if self.is_stale(epoch) {
            debug!("Session {} superseded during capture, releasing media", epoch);
            stream.stop_all();
            return Err(Error::StaleSession(epoch));
        }

        // Start muted and camera-off; tracks stay attached so enabling is
        // instant.
        stream.audio_track().set_enabled(false);
        stream.video_track().set_enabled(false);

        let connection = match self.connector.connect(identity).await {
            Ok(connection) => connection,
            Err(e) => {
                stream.stop_all();
                return Err(e);
            }
        };

        let SignalingConnection {
            local_peer_id,
            outbound,
            inbound,
        } = connection;

        let (peer_events_tx, peer_events_rx) = mpsc::unbounded_channel();

        {
            let mut active = self.active.lock().await;

            // Decisive staleness check: made under the session lock, so a
            // newer join cannot interleave with the store below.
            if self.is_stale(epoch) {
                debug!("Session {} superseded during connect, releasing media", epoch);
                drop(active);
                stream.stop_all();
                return Err(Error::StaleSession(epoch));
            }

            if let Some(previous) = active.take() {
                info!("Replacing previous call (session {})", previous.epoch);
                self.teardown(previous).await;
            }

            *active = Some(ActiveCall {
                epoch,
                local_peer_id: local_peer_id.clone(),
                stream: stream.clone(),
                outbound,
                registry: PeerRegistry::new(self.config.max_peers),
                video_source: VideoSource::Camera,
                peer_events_tx,
            });
        }

        info!("Joined call as peer {} (session {})", local_peer_id, epoch);
        self.emit(SessionEvent::LocalStreamReady { stream });

        let session = Arc::clone(self);
        tokio::spawn(async move { session.relay_pump(epoch, inbound).await });

        let session = Arc::clone(self);
        tokio::spawn(async move { session.peer_pump(epoch, peer_events_rx).await });

        Ok(())
    }

    /// Leave the current call
    ///
    /// Stops local capture, closes every peer connection, and drops the
    /// relay connection. Idempotent: leaving with no active call is a
    /// no-op.
    pub async fn leave(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(call) => {
                info!("Leaving call (session {})", call.epoch);
                self.teardown(call).await;
            }
            None => debug!("Leave with no active call, ignoring"),
        }
        Ok(())
    }

    /// Enable or disable the local microphone
    ///
    /// Mute flips the track's enabled flag; the track stays attached to
    /// every connection, so no renegotiation happens and no announcement
    /// is sent.
    pub async fn set_audio_enabled(&self, enabled: bool) -> Result<()> {
        let mut active = self.active.lock().await;
        let call = active.as_mut().ok_or(Error::NotInCall)?;

        call.stream.audio_track().set_enabled(enabled);
        debug!("Local audio {}", if enabled { "enabled" } else { "muted" });
        Ok(())
    }

    /// Enable or disable the local video track
    ///
    /// During a screen share this toggles the screen track. Announces the
    /// new state to the mesh exactly once per call.
    pub async fn set_video_enabled(&self, enabled: bool) -> Result<()> {
        let mut active = self.active.lock().await;
        let call = active.as_mut().ok_or(Error::NotInCall)?;

        call.stream.video_track().set_enabled(enabled);
        Self::announce_video(call, enabled);
        self.emit(SessionEvent::LocalVideoToggled { enabled });
        debug!("Local video {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Start sharing the screen instead of the camera
    ///
    /// Captures a screen track, substitutes it into every live connection
    /// without renegotiation, stops the camera, and forces the video
    /// toggle on. Records the camera's prior enablement for restore. A
    /// no-op when already sharing.
    ///
    /// If the platform ends the capture (native "stop sharing" UI), the
    /// restore path runs automatically.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if screen capture fails; the
    /// call is left exactly as it was.
    pub async fn start_screen_share(self: &Arc<Self>) -> Result<()> {
        let mut active = self.active.lock().await;
        let call = active.as_mut().ok_or(Error::NotInCall)?;

        if matches!(call.video_source, VideoSource::Screen { .. }) {
            debug!("Already sharing the screen, ignoring");
            return Ok(());
        }

        let screen = {
            let _gate = self.capture_gate.lock().await;
            self.devices.capture_display().await?
        };

        let prior_video_enabled = call.stream.video_track().is_enabled();
        info!(
            "Starting screen share (camera was {})",
            if prior_video_enabled { "on" } else { "off" }
        );

        for transport in call.registry.transports() {
            if let Err(e) = transport.replace_video_track(screen.clone()).await {
                warn!("Failed to substitute screen track: {}", e);
            }
        }

        let camera = call.stream.swap_video_track(screen.clone())?;
        camera.stop();

        // Screen content is always visible while sharing.
        screen.set_enabled(true);
        call.video_source = VideoSource::Screen {
            prior_video_enabled,
        };

        Self::announce_video(call, true);
        self.emit(SessionEvent::LocalVideoToggled { enabled: true });

        self.spawn_share_watch(call.epoch, screen);
        Ok(())
    }

    /// Stop sharing the screen and restore the camera
    ///
    /// Re-acquires a camera track, substitutes it into every live
    /// connection, stops the screen track, and restores the video toggle
    /// recorded at share start. A no-op when not sharing.
    ///
    /// # Errors
    ///
    /// Returns `Error::ScreenShareRestoreFailure` if the camera cannot be
    /// re-acquired. The screen track stays in place but disabled, and the
    /// share remains stoppable, so a later retry can still restore.
    pub async fn stop_screen_share(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        let call = active.as_mut().ok_or(Error::NotInCall)?;

        let VideoSource::Screen {
            prior_video_enabled,
        } = call.video_source
        else {
            debug!("Not sharing the screen, ignoring");
            return Ok(());
        };

        self.restore_camera(call, prior_video_enabled).await
    }

    /// Whether the session is currently in a call
    pub async fn is_joined(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// The relay-assigned local participant id, if joined
    pub async fn local_peer_id(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|call| call.local_peer_id.clone())
    }

    /// Number of known remote participants
    pub async fn peer_count(&self) -> usize {
        self.active
            .lock()
            .await
            .as_ref()
            .map_or(0, |call| call.registry.len())
    }

    fn is_stale(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != epoch
    }

    fn emit(&self, event: SessionEvent) {
        // A departed host is not an error.
        let _ = self.events.send(event);
    }

    fn announce_video(call: &ActiveCall, enabled: bool) {
        if call
            .outbound
            .send(ClientMessage::AnnounceVideoToggled { enabled })
            .is_err()
        {
            warn!("Relay connection gone, video announcement dropped");
        }
    }

    async fn teardown(&self, call: ActiveCall) {
        call.stream.stop_all();

        let mut call = call;
        for (peer_id, entry) in call.registry.drain() {
            if let Some(transport) = entry.transport {
                if let Err(e) = transport.close().await {
                    warn!("Failed to close connection to peer {}: {}", peer_id, e);
                }
            }
            self.emit(SessionEvent::PeerRemoved { peer_id });
        }

        // Dropping the outbound sender lets the relay channel close.
    }

    /// Dispatch loop for relay events belonging to one epoch
    async fn relay_pump(
        self: Arc<Self>,
        epoch: u64,
        mut inbound: mpsc::UnboundedReceiver<RelayMessage>,
    ) {
        while let Some(message) = inbound.recv().await {
            if self.is_stale(epoch) {
                break;
            }
            if let Err(e) = self.handle_relay_message(epoch, message).await {
                if e.is_stale() {
                    break;
                }
                warn!("Failed to handle relay event: {}", e);
            }
        }
        debug!("Relay dispatch for session {} terminated", epoch);
    }

    async fn handle_relay_message(&self, epoch: u64, message: RelayMessage) -> Result<()> {
        let mut active = self.active.lock().await;
        let call = match active.as_mut() {
            Some(call) if call.epoch == epoch => call,
            _ => return Err(Error::StaleSession(epoch)),
        };

        match message {
            // The registration ack is consumed by the connector; a
            // duplicate is harmless.
            RelayMessage::Registered { .. } => {}

            RelayMessage::Introduction { peers } => {
                info!("Introduced to {} existing participant(s)", peers.len());
                for (peer_id, intro) in peers {
                    if peer_id == call.local_peer_id {
                        continue;
                    }
                    // Existing participants initiate toward us; their entry
                    // gets a transport when their first signal arrives.
                    match call
                        .registry
                        .insert(&peer_id, &intro.display_name, intro.video_enabled)
                    {
                        Ok(true) => self.emit(SessionEvent::PeerAdded {
                            peer_id,
                            display_name: intro.display_name,
                            video_enabled: intro.video_enabled,
                        }),
                        Ok(false) => {}
                        Err(e) => warn!("Ignoring introduced peer {}: {}", peer_id, e),
                    }
                }
            }

            RelayMessage::ParticipantJoined {
                peer_id,
                display_name,
            } => {
                if peer_id == call.local_peer_id {
                    return Ok(());
                }
                match call.registry.insert(&peer_id, &display_name, false) {
                    Ok(true) => {
                        info!("Participant {} ({}) joined", peer_id, display_name);
                        self.emit(SessionEvent::PeerAdded {
                            peer_id: peer_id.clone(),
                            display_name,
                            video_enabled: false,
                        });
                        // We were here first, so we initiate.
                        self.open_transport(call, &peer_id, PeerRole::Initiator)
                            .await?;
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Ignoring joining participant {}: {}", peer_id, e),
                }
            }

            RelayMessage::ParticipantLeft { peer_id } => {
                self.close_peer(call, &peer_id, "participant left").await;
            }

            RelayMessage::Signal { to, from, payload } => {
                if to != call.local_peer_id {
                    warn!(
                        "Dropping misaddressed signal (to {}, we are {})",
                        to, call.local_peer_id
                    );
                    return Ok(());
                }
                if from == call.local_peer_id {
                    warn!("Dropping signal claiming to be from ourselves");
                    return Ok(());
                }

                // A signal can precede any membership event for its sender.
                if !call.registry.contains(&from) {
                    match call.registry.insert(&from, &from, false) {
                        Ok(true) => self.emit(SessionEvent::PeerAdded {
                            peer_id: from.clone(),
                            display_name: from.clone(),
                            video_enabled: false,
                        }),
                        Ok(false) => {}
                        Err(e) => {
                            warn!("Ignoring signal from {}: {}", from, e);
                            return Ok(());
                        }
                    }
                }

                let transport = match call.registry.transport(&from) {
                    Some(transport) => transport,
                    // First signal from an initiator: we answer.
                    None => {
                        self.open_transport(call, &from, PeerRole::Responder)
                            .await?
                    }
                };

                if let Err(e) = transport.apply_signal(payload).await {
                    match e {
                        Error::UnroutableSignal(_) => {
                            warn!("Dropping unroutable signal from {}: {}", from, e)
                        }
                        other => warn!("Failed to apply signal from {}: {}", from, other),
                    }
                }
            }

            RelayMessage::ParticipantVideoToggled { peer_id, enabled } => {
                match call.registry.set_remote_video(&peer_id, enabled) {
                    Ok(()) => self.emit(SessionEvent::PeerVideoToggled { peer_id, enabled }),
                    Err(_) => debug!("Video toggle for unknown peer {}, ignoring", peer_id),
                }
            }
        }

        Ok(())
    }

    async fn open_transport(
        &self,
        call: &mut ActiveCall,
        peer_id: &str,
        role: PeerRole,
    ) -> Result<Arc<dyn crate::peer::PeerTransport>> {
        // The transport captures the current outgoing tracks, so a peer
        // appearing mid-share receives the screen track.
        let transport = self
            .transports
            .create(
                peer_id,
                role,
                call.stream.clone(),
                call.peer_events_tx.clone(),
            )
            .await?;

        call.registry.attach_transport(peer_id, transport.clone())?;
        Ok(transport)
    }

    async fn close_peer(&self, call: &mut ActiveCall, peer_id: &str, reason: &str) {
        let Some(entry) = call.registry.remove(peer_id) else {
            debug!("Removal of unknown peer {}, ignoring", peer_id);
            return;
        };

        info!("Removing peer {} ({})", peer_id, reason);
        if let Some(transport) = entry.transport {
            if let Err(e) = transport.close().await {
                warn!("Failed to close connection to peer {}: {}", peer_id, e);
            }
        }
        self.emit(SessionEvent::PeerRemoved {
            peer_id: peer_id.to_string(),
        });
    }

    /// Dispatch loop for transport events belonging to one epoch
    async fn peer_pump(
        self: Arc<Self>,
        epoch: u64,
        mut events: mpsc::UnboundedReceiver<(String, PeerTransportEvent)>,
    ) {
        while let Some((peer_id, event)) = events.recv().await {
            if self.is_stale(epoch) {
                break;
            }
            if let Err(e) = self.handle_peer_event(epoch, &peer_id, event).await {
                if e.is_stale() {
                    break;
                }
                warn!("Failed to handle event from peer {}: {}", peer_id, e);
            }
        }
        debug!("Peer dispatch for session {} terminated", epoch);
    }

    async fn handle_peer_event(
        &self,
        epoch: u64,
        peer_id: &str,
        event: PeerTransportEvent,
    ) -> Result<()> {
        let mut active = self.active.lock().await;
        let call = match active.as_mut() {
            Some(call) if call.epoch == epoch => call,
            _ => return Err(Error::StaleSession(epoch)),
        };

        match event {
            PeerTransportEvent::Signal { payload } => {
                let envelope = ClientMessage::Signal {
                    to: peer_id.to_string(),
                    from: call.local_peer_id.clone(),
                    payload,
                };
                if call.outbound.send(envelope).is_err() {
                    return Err(Error::SignalingError(
                        "Relay connection gone, signal dropped".to_string(),
                    ));
                }
            }

            PeerTransportEvent::MediaArrived { stream } => {
                // Only the Pending -> Connected transition surfaces media.
                if call.registry.mark_connected(peer_id)? {
                    info!("Peer {} connected", peer_id);
                    self.emit(SessionEvent::PeerStream {
                        peer_id: peer_id.to_string(),
                        stream,
                    });
                }
            }

            PeerTransportEvent::Closed { reason } => {
                self.close_peer(call, peer_id, &reason).await;
            }
        }

        Ok(())
    }

    async fn restore_camera(&self, call: &mut ActiveCall, prior_video_enabled: bool) -> Result<()> {
        let captured = {
            let _gate = self.capture_gate.lock().await;
            self.devices.capture_camera().await
        };

        let camera = match captured {
            Ok(camera) => camera,
            Err(e) => {
                warn!("Failed to re-acquire camera after screen share: {}", e);
                // The share stays stopped visually: screen track disabled
                // but still in the slot, so a retry can restore later.
                call.stream.video_track().set_enabled(false);
                Self::announce_video(call, false);
                self.emit(SessionEvent::LocalVideoToggled { enabled: false });
                return Err(Error::ScreenShareRestoreFailure(e.to_string()));
            }
        };

        info!(
            "Stopping screen share, restoring camera ({})",
            if prior_video_enabled { "on" } else { "off" }
        );
        camera.set_enabled(prior_video_enabled);

        for transport in call.registry.transports() {
            if let Err(e) = transport.replace_video_track(camera.clone()).await {
                warn!("Failed to restore camera track: {}", e);
            }
        }

        let screen = call.stream.swap_video_track(camera)?;
        screen.stop();
        call.video_source = VideoSource::Camera;

        Self::announce_video(call, prior_video_enabled);
        self.emit(SessionEvent::LocalVideoToggled {
            enabled: prior_video_enabled,
        });
        Ok(())
    }

    /// Run the restore path when the platform ends the screen capture
    fn spawn_share_watch(self: &Arc<Self>, epoch: u64, screen: MediaTrack) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            screen.ended().await;

            let mut active = session.active.lock().await;
            let Some(call) = active.as_mut() else { return };
            if call.epoch != epoch {
                return;
            }
            let VideoSource::Screen {
                prior_video_enabled,
            } = call.video_source
            else {
                return;
            };
            // A swap already replaced this track; nothing to restore.
            if call.stream.video_track().id() != screen.id() {
                return;
            }

            info!("Screen capture ended by the platform, restoring camera");
            if let Err(e) = session.restore_camera(call, prior_video_enabled).await {
                warn!("Automatic screen share stop failed: {}", e);
            }
        });
    }
}
