//! Still-frame camera and the host device bundle used by headless front ends.
//!
//! Hosts with a real camera supply their own `VideoTrack`. `StillFrameCamera`
//! serves a fixed image from disk and behaves like a warming-up device: it
//! reports "not ready" until the warm-up interval has elapsed.

use crate::audio::CpalMicrophone;
use crate::capture::{AudioTrack, ImagePayload, MediaDevices, VideoTrack};
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

pub struct StillFrameCamera {
    frame: ImagePayload,
    opened_at: Instant,
    warmup: Duration,
    stopped: bool,
}

impl StillFrameCamera {
    pub fn from_payload(frame: ImagePayload, warmup: Duration) -> Self {
        Self {
            frame,
            opened_at: Instant::now(),
            warmup,
            stopped: false,
        }
    }

    /// Load the frame from disk. An unreadable or empty file counts as a refused camera.
    pub async fn load(path: &Path, warmup: Duration) -> VoiceResult<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            VoiceError::PermissionDenied(format!("camera frame {}: {}", path.display(), e))
        })?;
        if bytes.is_empty() {
            return Err(VoiceError::PermissionDenied(format!(
                "camera frame {} is empty",
                path.display()
            )));
        }
        let mime = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
            _ => "image/jpeg",
        };
        info!("Camera: serving still frame {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_payload(ImagePayload::new(mime, bytes), warmup))
    }
}

impl VideoTrack for StillFrameCamera {
    fn grab_frame(&self) -> Option<ImagePayload> {
        if self.stopped || self.opened_at.elapsed() < self.warmup {
            return None;
        }
        Some(self.frame.clone())
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Camera from a still frame on disk plus the default cpal microphone.
#[derive(Debug, Clone)]
pub struct HostDevices {
    pub camera_frame: Option<PathBuf>,
    pub camera_warmup: Duration,
}

impl HostDevices {
    pub fn new(camera_frame: Option<PathBuf>, camera_warmup: Duration) -> Self {
        Self {
            camera_frame,
            camera_warmup,
        }
    }
}

#[async_trait]
impl MediaDevices for HostDevices {
    async fn open_camera(&self) -> VoiceResult<Box<dyn VideoTrack>> {
        let path = self
            .camera_frame
            .as_deref()
            .ok_or_else(|| VoiceError::PermissionDenied("no camera configured".to_string()))?;
        let camera = StillFrameCamera::load(path, self.camera_warmup).await?;
        Ok(Box::new(camera))
    }

    async fn open_microphone(&self) -> VoiceResult<Box<dyn AudioTrack>> {
        let mic = tokio::task::spawn_blocking(CpalMicrophone::open_default)
            .await
            .map_err(|e| VoiceError::AudioDevice(e.to_string()))??;
        Ok(Box::new(mic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn frame_is_withheld_during_warmup() {
        let mut camera =
            StillFrameCamera::from_payload(ImagePayload::jpeg(vec![1, 2, 3]), Duration::from_millis(600));
        assert!(camera.grab_frame().is_none());
        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(camera.grab_frame().unwrap().bytes, vec![1, 2, 3]);
        camera.stop();
        assert!(camera.grab_frame().is_none());
    }

    #[tokio::test]
    async fn missing_frame_is_permission_denied() {
        let devices = HostDevices::new(None, Duration::ZERO);
        let err = devices.open_camera().await.err().unwrap();
        assert!(err.is_permission_denied());
    }
}
