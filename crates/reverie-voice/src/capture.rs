//! **Media Capture Gate**: exclusive camera and microphone access.
//!
//! The gate owns at most one video track and one audio track. Acquiring a new
//! track always stops the previous one first, and every track still held when the
//! gate is dropped is stopped. `capture_frame` is a synchronous probe so callers
//! can poll it both for readiness and for the final snapshot.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Encoded still image (JPEG/PNG) taken from the camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self::new("image/jpeg", bytes)
    }
}

/// Encoded audio blob produced by a finished recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl AudioPayload {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn wav(bytes: Vec<u8>) -> Self {
        Self::new("audio/wav", bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A live camera track. `grab_frame` returns `None` until the track has buffered a valid frame.
pub trait VideoTrack: Send {
    fn grab_frame(&self) -> Option<ImagePayload>;
    /// Release the underlying hardware. Must be idempotent.
    fn stop(&mut self);
}

/// A live microphone track that accumulates audio between `begin` and `finish`.
pub trait AudioTrack: Send {
    fn begin(&mut self) -> VoiceResult<()>;
    /// End accumulation and return everything recorded since `begin` as one blob.
    fn finish(&mut self) -> VoiceResult<AudioPayload>;
    /// Release the underlying hardware. Must be idempotent.
    fn stop(&mut self);
}

/// Host environment that grants device access. Fails with `VoiceError::PermissionDenied`
/// when the user refuses or the device is missing.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open_camera(&self) -> VoiceResult<Box<dyn VideoTrack>>;
    async fn open_microphone(&self) -> VoiceResult<Box<dyn AudioTrack>>;
}

struct MicState {
    track: Box<dyn AudioTrack>,
    recording: bool,
}

/// Exclusive owner of the camera and microphone for one session.
pub struct CaptureGate {
    devices: Arc<dyn MediaDevices>,
    video: Mutex<Option<Box<dyn VideoTrack>>>,
    audio: Mutex<Option<MicState>>,
}

impl CaptureGate {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            video: Mutex::new(None),
            audio: Mutex::new(None),
        }
    }

    /// Acquire the camera, releasing any previously held video track first.
    pub async fn request_video_stream(&self) -> VoiceResult<()> {
        self.release_video();
        let track = self.devices.open_camera().await?;
        if let Some(mut previous) = self.video.lock().replace(track) {
            previous.stop();
        }
        info!("CaptureGate: camera acquired");
        Ok(())
    }

    /// Acquire the microphone, releasing any previously held audio track first.
    pub async fn request_audio_stream(&self) -> VoiceResult<()> {
        self.release_audio();
        let track = self.devices.open_microphone().await?;
        let state = MicState {
            track,
            recording: false,
        };
        if let Some(mut previous) = self.audio.lock().replace(state) {
            previous.track.stop();
        }
        info!("CaptureGate: microphone acquired");
        Ok(())
    }

    /// Ask for camera and microphone together, the way the "record current status"
    /// action does. The camera stays held; the microphone is released again once
    /// access is confirmed and reopened when a recording starts.
    pub async fn request_permissions(&self) -> VoiceResult<()> {
        self.request_video_stream().await?;
        if let Err(e) = self.request_audio_stream().await {
            self.release_video();
            return Err(e);
        }
        self.release_audio();
        Ok(())
    }

    /// Probe the camera for a frame. `None` means no camera or not enough data yet.
    pub fn capture_frame(&self) -> Option<ImagePayload> {
        self.video.lock().as_ref().and_then(|track| track.grab_frame())
    }

    /// Start accumulating audio. Returns `Ok(false)` when a recording is already running.
    pub fn start_audio_recording(&self) -> VoiceResult<bool> {
        let mut guard = self.audio.lock();
        let state = guard.as_mut().ok_or_else(|| {
            VoiceError::CaptureNotReady("microphone has not been acquired".to_string())
        })?;
        if state.recording {
            debug!("CaptureGate: recording already running");
            return Ok(false);
        }
        state.track.begin()?;
        state.recording = true;
        info!("CaptureGate: recording started");
        Ok(true)
    }

    /// Stop the running recording, release the microphone, and hand back the blob.
    /// Returns `Ok(None)` when nothing was recording.
    pub fn stop_audio_recording(&self) -> VoiceResult<Option<AudioPayload>> {
        let taken = {
            let mut guard = self.audio.lock();
            match guard.as_ref() {
                Some(s) if s.recording => guard.take(),
                _ => None,
            }
        };
        let Some(mut state) = taken else {
            return Ok(None);
        };
        let payload = state.track.finish();
        state.track.stop();
        let payload = payload?;
        info!(bytes = payload.bytes.len(), "CaptureGate: recording finished");
        Ok(Some(payload))
    }

    pub fn is_recording(&self) -> bool {
        self.audio.lock().as_ref().is_some_and(|s| s.recording)
    }

    pub fn has_video(&self) -> bool {
        self.video.lock().is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.lock().is_some()
    }

    pub fn release_video(&self) {
        if let Some(mut track) = self.video.lock().take() {
            track.stop();
            debug!("CaptureGate: camera released");
        }
    }

    pub fn release_audio(&self) {
        if let Some(mut state) = self.audio.lock().take() {
            if state.recording {
                warn!("CaptureGate: discarding unfinished recording");
            }
            state.track.stop();
            debug!("CaptureGate: microphone released");
        }
    }

    pub fn release_all(&self) {
        self.release_video();
        self.release_audio();
    }
}

impl Drop for CaptureGate {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        cameras_opened: AtomicUsize,
        cameras_stopped: AtomicUsize,
        mics_opened: AtomicUsize,
        mics_stopped: AtomicUsize,
        deny_mic: AtomicBool,
    }

    struct FakeCamera {
        counters: Arc<Counters>,
        ready: bool,
        stopped: bool,
    }

    impl VideoTrack for FakeCamera {
        fn grab_frame(&self) -> Option<ImagePayload> {
            self.ready.then(|| ImagePayload::jpeg(vec![0xFF, 0xD8]))
        }

        fn stop(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.counters.cameras_stopped.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct FakeMic {
        counters: Arc<Counters>,
        stopped: bool,
    }

    impl AudioTrack for FakeMic {
        fn begin(&mut self) -> VoiceResult<()> {
            Ok(())
        }

        fn finish(&mut self) -> VoiceResult<AudioPayload> {
            Ok(AudioPayload::wav(b"RIFF".to_vec()))
        }

        fn stop(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.counters.mics_stopped.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct FakeDevices {
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl MediaDevices for FakeDevices {
        async fn open_camera(&self) -> VoiceResult<Box<dyn VideoTrack>> {
            self.counters.cameras_opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeCamera {
                counters: Arc::clone(&self.counters),
                ready: true,
                stopped: false,
            }))
        }

        async fn open_microphone(&self) -> VoiceResult<Box<dyn AudioTrack>> {
            if self.counters.deny_mic.load(Ordering::SeqCst) {
                return Err(VoiceError::PermissionDenied("microphone".to_string()));
            }
            self.counters.mics_opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeMic {
                counters: Arc::clone(&self.counters),
                stopped: false,
            }))
        }
    }

    fn gate() -> (CaptureGate, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let devices = Arc::new(FakeDevices {
            counters: Arc::clone(&counters),
        });
        (CaptureGate::new(devices), counters)
    }

    #[tokio::test]
    async fn reacquiring_camera_releases_previous_track() {
        let (gate, counters) = gate();
        gate.request_video_stream().await.unwrap();
        gate.request_video_stream().await.unwrap();
        assert_eq!(counters.cameras_opened.load(Ordering::SeqCst), 2);
        assert_eq!(counters.cameras_stopped.load(Ordering::SeqCst), 1);
        assert!(gate.capture_frame().is_some());
    }

    #[test]
    fn capture_without_camera_is_not_ready() {
        let (gate, _) = gate();
        assert!(gate.capture_frame().is_none());
    }

    #[tokio::test]
    async fn starting_twice_is_a_no_op() {
        let (gate, counters) = gate();
        gate.request_audio_stream().await.unwrap();
        assert!(gate.start_audio_recording().unwrap());
        assert!(!gate.start_audio_recording().unwrap());
        let blob = gate.stop_audio_recording().unwrap().unwrap();
        assert_eq!(blob.mime_type, "audio/wav");
        assert_eq!(counters.mics_stopped.load(Ordering::SeqCst), 1);
        assert!(!gate.has_audio());
        assert!(gate.stop_audio_recording().unwrap().is_none());
    }

    #[tokio::test]
    async fn denied_microphone_releases_camera() {
        let (gate, counters) = gate();
        counters.deny_mic.store(true, Ordering::SeqCst);
        let err = gate.request_permissions().await.unwrap_err();
        assert!(err.is_permission_denied());
        assert!(!gate.has_video());
        assert_eq!(counters.cameras_stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_releases_everything() {
        let (gate, counters) = gate();
        gate.request_video_stream().await.unwrap();
        gate.request_audio_stream().await.unwrap();
        drop(gate);
        assert_eq!(counters.cameras_stopped.load(Ordering::SeqCst), 1);
        assert_eq!(counters.mics_stopped.load(Ordering::SeqCst), 1);
    }
}
