//! Call-flow test harness
//!
//! In-memory implementations of the three capability seams
//! ([`MediaDevices`](meshcall::MediaDevices), transport factory, relay
//! connector) so integration tests can drive a `CallSession` end to end
//! without devices, sockets, or a live relay:
//!
//! 1. Build a session with `session_with(...)`
//! 2. Feed relay events through the connector's [`RelayHandle`]
//! 3. Inspect outbound frames, created transports, and emitted events

use meshcall::{
    CallConfig, CallSession, ClientMessage, MediaDevices, MediaStream, MediaTrack,
    PeerEventSender, PeerRole, PeerTransport, PeerTransportFactory, RelayMessage, Result,
    SessionEvent, SignalingConnection, SignalingConnector, TrackKind, TrackSource,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Default timeout for event expectations
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Initialize test logging (call once per test)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,meshcall=debug")
        .try_init();
}

// ============================================================================
// Capture devices
// ============================================================================

/// Scriptable capture devices
///
/// Captures succeed instantly by default; failures and deliberate blocking
/// are opt-in per test.
pub struct MockDevices {
    fail_media: AtomicBool,
    fail_display: AtomicBool,
    fail_camera: AtomicBool,
    block_next_media: Mutex<Option<oneshot::Receiver<()>>>,
    block_next_display: Mutex<Option<oneshot::Receiver<()>>>,
    captured_streams: Mutex<Vec<MediaStream>>,
}

impl MockDevices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_media: AtomicBool::new(false),
            fail_display: AtomicBool::new(false),
            fail_camera: AtomicBool::new(false),
            block_next_media: Mutex::new(None),
            block_next_display: Mutex::new(None),
            captured_streams: Mutex::new(Vec::new()),
        })
    }

    pub fn set_fail_display(&self, fail: bool) {
        self.fail_display.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_camera(&self, fail: bool) {
        self.fail_camera.store(fail, Ordering::SeqCst);
    }

    /// Make the next `capture_media` wait until the returned sender fires
    pub fn block_next_media(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.block_next_media.lock().unwrap() = Some(rx);
        tx
    }

    /// Make the next `capture_display` wait until the returned sender fires
    pub fn block_next_display(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.block_next_display.lock().unwrap() = Some(rx);
        tx
    }

    /// Streams handed out so far, in capture order
    pub fn captured_streams(&self) -> Vec<MediaStream> {
        self.captured_streams.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MediaDevices for MockDevices {
    async fn capture_media(&self) -> Result<MediaStream> {
        let block = self.block_next_media.lock().unwrap().take();
        if let Some(rx) = block {
            let _ = rx.await;
        }

        if self.fail_media.load(Ordering::SeqCst) {
            return Err(meshcall::Error::DeviceUnavailable(
                "camera permission denied".to_string(),
            ));
        }

        let stream = MediaStream::new(
            MediaTrack::new(TrackKind::Audio, TrackSource::Microphone),
            MediaTrack::new(TrackKind::Video, TrackSource::Camera),
        )?;
        self.captured_streams.lock().unwrap().push(stream.clone());
        Ok(stream)
    }

    async fn capture_display(&self) -> Result<MediaTrack> {
        let block = self.block_next_display.lock().unwrap().take();
        if let Some(rx) = block {
            let _ = rx.await;
        }

        if self.fail_display.load(Ordering::SeqCst) {
            return Err(meshcall::Error::DeviceUnavailable(
                "screen capture cancelled".to_string(),
            ));
        }
        Ok(MediaTrack::new(TrackKind::Video, TrackSource::Screen))
    }

    async fn capture_camera(&self) -> Result<MediaTrack> {
        if self.fail_camera.load(Ordering::SeqCst) {
            return Err(meshcall::Error::DeviceUnavailable(
                "camera is busy".to_string(),
            ));
        }
        Ok(MediaTrack::new(TrackKind::Video, TrackSource::Camera))
    }
}

// ============================================================================
// Peer transports
// ============================================================================

/// Recording transport double
pub struct MockTransport {
    applied: Mutex<Vec<serde_json::Value>>,
    replaced: Mutex<Vec<MediaTrack>>,
    closed: AtomicBool,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            applied: Mutex::new(Vec::new()),
            replaced: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn applied_signals(&self) -> Vec<serde_json::Value> {
        self.applied.lock().unwrap().clone()
    }

    pub fn replaced_tracks(&self) -> Vec<MediaTrack> {
        self.replaced.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PeerTransport for MockTransport {
    async fn apply_signal(&self, payload: serde_json::Value) -> Result<()> {
        self.applied.lock().unwrap().push(payload);
        Ok(())
    }

    async fn replace_video_track(&self, track: MediaTrack) -> Result<()> {
        self.replaced.lock().unwrap().push(track);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// One transport the factory created, with everything a test needs to
/// impersonate its remote side
pub struct CreatedTransport {
    pub peer_id: String,
    pub role: PeerRole,
    pub transport: Arc<MockTransport>,
    pub local_stream: MediaStream,
    /// Sender the transport would use to surface events
    pub events: PeerEventSender,
}

/// Factory recording every created transport
pub struct MockTransportFactory {
    created: Mutex<Vec<Arc<CreatedTransport>>>,
}

impl MockTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn created(&self) -> Vec<Arc<CreatedTransport>> {
        self.created.lock().unwrap().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    /// The transport created for `peer_id`, if any
    pub fn transport_for(&self, peer_id: &str) -> Option<Arc<CreatedTransport>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.peer_id == peer_id)
            .cloned()
    }
}

#[async_trait::async_trait]
impl PeerTransportFactory for MockTransportFactory {
    async fn create(
        &self,
        peer_id: &str,
        role: PeerRole,
        local_stream: MediaStream,
        events: PeerEventSender,
    ) -> Result<Arc<dyn PeerTransport>> {
        let transport = MockTransport::new();
        self.created.lock().unwrap().push(Arc::new(CreatedTransport {
            peer_id: peer_id.to_string(),
            role,
            transport: transport.clone(),
            local_stream,
            events,
        }));
        Ok(transport)
    }
}

// ============================================================================
// Relay connector
// ============================================================================

/// The relay's side of one signaling connection
#[derive(Clone)]
pub struct RelayHandle {
    /// Feed relay events into the session
    pub inbound: mpsc::UnboundedSender<RelayMessage>,
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    outbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<ClientMessage>>>,
}

impl RelayHandle {
    pub fn feed(&self, message: RelayMessage) {
        self.inbound.send(message).expect("session dropped inbound");
    }

    /// Frames the session has sent so far
    pub fn sent(&self) -> Vec<ClientMessage> {
        let mut sent = self.sent.lock().unwrap();
        let mut rx = self.outbound_rx.lock().unwrap();
        while let Ok(message) = rx.try_recv() {
            sent.push(message);
        }
        sent.clone()
    }

    pub fn announcements(&self) -> Vec<bool> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::AnnounceVideoToggled { enabled } => Some(enabled),
                _ => None,
            })
            .collect()
    }

    pub fn sent_signals(&self) -> Vec<(String, String, serde_json::Value)> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::Signal { to, from, payload } => Some((to, from, payload)),
                _ => None,
            })
            .collect()
    }
}

/// Connector handing out in-memory relay connections
pub struct MockConnector {
    local_peer_id: String,
    fail_connect: AtomicBool,
    handles: Mutex<Vec<RelayHandle>>,
}

impl MockConnector {
    pub fn new(local_peer_id: &str) -> Arc<Self> {
        Arc::new(Self {
            local_peer_id: local_peer_id.to_string(),
            fail_connect: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// The relay side of the most recent connection
    pub fn handle(&self) -> RelayHandle {
        self.handles
            .lock()
            .unwrap()
            .last()
            .expect("no connection established yet")
            .clone()
    }
}

#[async_trait::async_trait]
impl SignalingConnector for MockConnector {
    async fn connect(&self, _identity: &str) -> Result<SignalingConnection> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(meshcall::Error::SignalingError(
                "relay unreachable".to_string(),
            ));
        }

        let (outbound, outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        self.handles.lock().unwrap().push(RelayHandle {
            inbound: inbound_tx,
            sent: Arc::new(Mutex::new(Vec::new())),
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
        });

        Ok(SignalingConnection {
            local_peer_id: self.local_peer_id.clone(),
            outbound,
            inbound,
        })
    }
}

// ============================================================================
// Session wiring and expectation helpers
// ============================================================================

/// Everything a call-flow test needs in one place
pub struct TestCall {
    pub session: Arc<CallSession>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub devices: Arc<MockDevices>,
    pub factory: Arc<MockTransportFactory>,
    pub connector: Arc<MockConnector>,
}

/// Build a session over fresh mocks; the local peer id is "7"
pub fn test_call() -> TestCall {
    init_logging();

    let devices = MockDevices::new();
    let factory = MockTransportFactory::new();
    let connector = MockConnector::new("7");

    let (session, events) = CallSession::new(
        CallConfig::default(),
        devices.clone(),
        factory.clone(),
        connector.clone(),
    )
    .expect("default config must validate");

    TestCall {
        session,
        events,
        devices,
        factory,
        connector,
    }
}

impl TestCall {
    /// Join and consume the `LocalStreamReady` event, returning the stream
    pub async fn join(&mut self, identity: &str) -> MediaStream {
        self.session.join(identity).await.expect("join failed");
        match self.next_event().await {
            SessionEvent::LocalStreamReady { stream } => stream,
            other => panic!("expected LocalStreamReady, got {other:?}"),
        }
    }

    /// Next session event, failing the test on timeout
    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("event channel closed")
    }

    /// Next event if one arrives shortly, `None` otherwise
    pub async fn try_next_event(&mut self) -> Option<SessionEvent> {
        tokio::time::timeout(Duration::from_millis(100), self.events.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Poll `condition` until it holds, failing the test on timeout
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting until {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
