//! Rendering front end seam.

use crate::engine::ExperienceHandle;
use crate::session::ExperienceView;
use reverie_voice::SpeechView;

/// Receives state and draws it. Inputs travel back through `ExperienceHandle::send`.
pub trait RenderFrontend: Send {
    fn render(&mut self, view: &ExperienceView, speech: &SpeechView);
}

/// Render once, then again on every change of either channel, until the experience stops.
pub async fn drive_frontend<F: RenderFrontend + ?Sized>(handle: &ExperienceHandle, frontend: &mut F) {
    let mut view = handle.subscribe_view();
    let mut speech = handle.subscribe_speech();
    loop {
        {
            let v = view.borrow_and_update().clone();
            let s = speech.borrow_and_update().clone();
            frontend.render(&v, &s);
        }
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = speech.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PlaceholderBackend;
    use crate::config::ExperienceConfig;
    use crate::engine::{Experience, ExperienceDeps, ExperienceEvent};
    use crate::phase::Phase;
    use async_trait::async_trait;
    use reverie_voice::{
        AudioTrack, MediaDevices, NullAmbient, PlaceholderTts, SilentSink, VideoTrack,
        VoiceError, VoiceResult,
    };
    use std::sync::Arc;

    struct NoDevices;

    #[async_trait]
    impl MediaDevices for NoDevices {
        async fn open_camera(&self) -> VoiceResult<Box<dyn VideoTrack>> {
            Err(VoiceError::PermissionDenied("camera".to_string()))
        }

        async fn open_microphone(&self) -> VoiceResult<Box<dyn AudioTrack>> {
            Err(VoiceError::PermissionDenied("microphone".to_string()))
        }
    }

    #[derive(Default)]
    struct Recorder {
        phases: Vec<Phase>,
    }

    impl RenderFrontend for Recorder {
        fn render(&mut self, view: &ExperienceView, _speech: &SpeechView) {
            if self.phases.last() != Some(&view.phase) {
                self.phases.push(view.phase);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn renders_until_shutdown() {
        let deps = ExperienceDeps {
            config: ExperienceConfig::default(),
            backend: Arc::new(PlaceholderBackend),
            tts: Arc::new(PlaceholderTts),
            sink: Arc::new(SilentSink::default()),
            ambient: Arc::new(NullAmbient),
            devices: Arc::new(NoDevices),
        };
        let (experience, handle) = Experience::new(deps);
        let running = tokio::spawn(experience.run());

        let driver = {
            let handle = handle.clone();
            tokio::spawn(async move {
                let mut recorder = Recorder::default();
                drive_frontend(&handle, &mut recorder).await;
                recorder
            })
        };

        handle.send(ExperienceEvent::PointerDown).await.unwrap();
        handle.wait_for_phase(Phase::Clearing).await.unwrap();
        handle.send(ExperienceEvent::Shutdown).await.unwrap();
        running.await.unwrap().unwrap();
        drop(handle);

        let recorder = driver.await.unwrap();
        assert_eq!(recorder.phases.first(), Some(&Phase::Foggy));
        assert!(recorder.phases.contains(&Phase::Clearing));
    }
}
