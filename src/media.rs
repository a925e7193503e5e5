//! Local media capture handles and the capture capability
//!
//! The coordinator never talks to capture hardware directly. It owns
//! [`MediaTrack`]/[`MediaStream`] handles and asks a [`MediaDevices`]
//! implementation for new ones. Disabling a track flips its enabled flag
//! (the sender emits silence/black) rather than detaching it, so no
//! renegotiation round-trip is needed; screen-share substitution swaps the
//! video slot instead.

use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Media track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

/// Where a track's media comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    /// Local microphone capture
    Microphone,
    /// Local camera capture
    Camera,
    /// Local screen capture
    Screen,
    /// Received from a remote peer
    Remote,
}

struct TrackInner {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    enabled: AtomicBool,
    stopped: AtomicBool,
    ended_tx: watch::Sender<bool>,
}

/// Cheaply clonable handle to one media track
///
/// Clones share the same underlying state, like handles to a platform
/// capture object.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    /// Create a new local track handle (enabled, not stopped)
    pub fn new(kind: TrackKind, source: TrackSource) -> Self {
        let (ended_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(TrackInner {
                id: uuid::Uuid::new_v4().to_string(),
                kind,
                source,
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
                ended_tx,
            }),
        }
    }

    /// Create a handle representing a remote peer's track
    pub fn remote(kind: TrackKind) -> Self {
        Self::new(kind, TrackSource::Remote)
    }

    /// Create a remote track handle carrying the wire-level track id
    ///
    /// Used when the transport knows the remote track's identity, so the
    /// host can correlate the handle with the actual media.
    pub fn remote_with_id(id: &str, kind: TrackKind) -> Self {
        let (ended_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(TrackInner {
                id: id.to_string(),
                kind,
                source: TrackSource::Remote,
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
                ended_tx,
            }),
        }
    }

    /// Get the track id
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Get the track kind
    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    /// Get the track source
    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    /// Whether the track currently produces media
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Enable or disable the track without detaching it
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether the track has been stopped
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Stop the track, releasing its capture device
    ///
    /// Idempotent. Returns `true` only for the call that performed the
    /// stop, so release accounting stays exact across racing owners.
    pub fn stop(&self) -> bool {
        let first = !self.inner.stopped.swap(true, Ordering::SeqCst);
        if first {
            debug!(track_id = %self.inner.id, kind = ?self.inner.kind, "Stopping track");
            self.inner.ended_tx.send_replace(true);
        }
        first
    }

    /// Platform hook: the user ended this capture from native UI
    ///
    /// Wakes every [`ended`](Self::ended) waiter. The track is considered
    /// stopped afterwards.
    pub fn mark_ended(&self) {
        self.stop();
    }

    /// Wait until the track ends (stopped locally or via platform UI)
    pub async fn ended(&self) {
        let mut rx = self.inner.ended_tx.subscribe();
        // The sender lives inside our own Arc, so this cannot error while
        // `self` exists.
        let _ = rx.wait_for(|ended| *ended).await;
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("source", &self.inner.source)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

struct StreamInner {
    id: String,
    audio: MediaTrack,
    video: std::sync::RwLock<MediaTrack>,
}

/// Handle to a captured media stream: exactly one audio and one video track
///
/// The video slot is swappable so screen-share substitution never leaves
/// the stream without a video track.
#[derive(Clone)]
pub struct MediaStream {
    inner: Arc<StreamInner>,
}

impl MediaStream {
    /// Create a stream from one audio and one video track
    ///
    /// # Errors
    ///
    /// Returns `Error::MediaTrackError` if the track kinds are mismatched.
    pub fn new(audio: MediaTrack, video: MediaTrack) -> Result<Self> {
        if audio.kind() != TrackKind::Audio {
            return Err(Error::MediaTrackError(
                "audio slot requires an Audio track".to_string(),
            ));
        }
        if video.kind() != TrackKind::Video {
            return Err(Error::MediaTrackError(
                "video slot requires a Video track".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(StreamInner {
                id: uuid::Uuid::new_v4().to_string(),
                audio,
                video: std::sync::RwLock::new(video),
            }),
        })
    }

    /// Get the stream id
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Get the audio track
    pub fn audio_track(&self) -> MediaTrack {
        self.inner.audio.clone()
    }

    /// Get the current video track
    pub fn video_track(&self) -> MediaTrack {
        self.inner
            .video
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the video track, returning the previous one
    ///
    /// # Errors
    ///
    /// Returns `Error::MediaTrackError` if `video` is not a video track.
    pub fn swap_video_track(&self, video: MediaTrack) -> Result<MediaTrack> {
        if video.kind() != TrackKind::Video {
            return Err(Error::MediaTrackError(
                "video slot requires a Video track".to_string(),
            ));
        }

        let mut slot = self.inner.video.write().unwrap_or_else(|e| e.into_inner());
        Ok(std::mem::replace(&mut *slot, video))
    }

    /// Stop both tracks
    pub fn stop_all(&self) {
        self.audio_track().stop();
        self.video_track().stop();
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.inner.id)
            .field("audio", &self.inner.audio)
            .field("video", &self.video_track())
            .finish()
    }
}

/// Capability interface over platform media capture
///
/// Implementations wrap whatever the target environment provides
/// (getUserMedia/getDisplayMedia in a browser host, a desktop capture
/// stack natively). All failures surface as `Error::DeviceUnavailable`.
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Capture a microphone + camera stream
    async fn capture_media(&self) -> Result<MediaStream>;

    /// Capture a screen video track
    async fn capture_display(&self) -> Result<MediaTrack>;

    /// Capture a camera video track (screen-share restore path)
    async fn capture_camera(&self) -> Result<MediaTrack>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_stream() -> MediaStream {
        MediaStream::new(
            MediaTrack::new(TrackKind::Audio, TrackSource::Microphone),
            MediaTrack::new(TrackKind::Video, TrackSource::Camera),
        )
        .unwrap()
    }

    #[test]
    fn test_track_enabled_toggle() {
        let track = MediaTrack::new(TrackKind::Audio, TrackSource::Microphone);
        assert!(track.is_enabled());

        track.set_enabled(false);
        assert!(!track.is_enabled());

        track.set_enabled(true);
        assert!(track.is_enabled());
    }

    #[test]
    fn test_track_stop_is_idempotent() {
        let track = MediaTrack::new(TrackKind::Video, TrackSource::Camera);
        assert!(!track.is_stopped());

        assert!(track.stop());
        assert!(track.is_stopped());

        // Second stop reports that it did nothing.
        assert!(!track.stop());
    }

    #[test]
    fn test_clones_share_state() {
        let track = MediaTrack::new(TrackKind::Video, TrackSource::Screen);
        let clone = track.clone();

        track.set_enabled(false);
        assert!(!clone.is_enabled());

        clone.stop();
        assert!(track.is_stopped());
    }

    #[tokio::test]
    async fn test_ended_fires_on_mark_ended() {
        let track = MediaTrack::new(TrackKind::Video, TrackSource::Screen);
        let waiter = track.clone();

        let handle = tokio::spawn(async move { waiter.ended().await });
        track.mark_ended();
        handle.await.unwrap();

        assert!(track.is_stopped());
    }

    #[test]
    fn test_remote_with_id_keeps_wire_identity() {
        let track = MediaTrack::remote_with_id("remote-video-3", TrackKind::Video);
        assert_eq!(track.id(), "remote-video-3");
        assert_eq!(track.source(), TrackSource::Remote);
        assert!(track.is_enabled());
    }

    #[test]
    fn test_stream_rejects_mismatched_kinds() {
        let audio = MediaTrack::new(TrackKind::Audio, TrackSource::Microphone);
        let video = MediaTrack::new(TrackKind::Video, TrackSource::Camera);
        assert!(MediaStream::new(video.clone(), audio.clone()).is_err());
        assert!(MediaStream::new(audio, video).is_ok());
    }

    #[test]
    fn test_swap_video_track_returns_previous() {
        let stream = camera_stream();
        let camera = stream.video_track();

        let screen = MediaTrack::new(TrackKind::Video, TrackSource::Screen);
        let previous = stream.swap_video_track(screen.clone()).unwrap();

        assert_eq!(previous.id(), camera.id());
        assert_eq!(stream.video_track().id(), screen.id());
    }

    #[test]
    fn test_swap_video_track_rejects_audio() {
        let stream = camera_stream();
        let audio = MediaTrack::new(TrackKind::Audio, TrackSource::Microphone);
        assert!(stream.swap_video_track(audio).is_err());
    }

    #[test]
    fn test_stop_all() {
        let stream = camera_stream();
        stream.stop_all();
        assert!(stream.audio_track().is_stopped());
        assert!(stream.video_track().is_stopped());
    }
}
