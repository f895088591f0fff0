//! **Speech Playback Coordinator**: one line of dialogue at a time.
//!
//! `speak` shows the line, supersedes whatever was speaking, resolves audio
//! (cache first, then the TTS backend), plays it or waits out a reading pause,
//! and optionally suspends until the user acknowledges. Every request gets an
//! id from a process-wide increasing counter (sinks outlive coordinators and
//! order lines by it); only the latest request may touch the published
//! `SpeechView`, so a slow, superseded request resolves silently.

use crate::ack::AckGate;
use crate::voice_output::{EncodedAudio, SpeechSink, TtsBackend};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

/// What the front end shows for the dialogue box.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeechView {
    pub text: String,
    pub visible: bool,
    pub speaking: bool,
    pub awaiting_ack: bool,
}

/// Pauses used when no voice can be played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechTiming {
    /// Floor for the reading pause (default 2s).
    pub min_pause: Duration,
    /// Reading time per character (default 200ms).
    pub per_char_pause: Duration,
    /// Pause after a playback error (default 2s).
    pub error_pause: Duration,
}

impl Default for SpeechTiming {
    fn default() -> Self {
        Self {
            min_pause: Duration::from_millis(2000),
            per_char_pause: Duration::from_millis(200),
            error_pause: Duration::from_millis(2000),
        }
    }
}

impl SpeechTiming {
    /// Reading pause for a line with no voice: `max(min_pause, chars * per_char_pause)`.
    pub fn fallback_pause(&self, text: &str) -> Duration {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        self.min_pause.max(self.per_char_pause.saturating_mul(chars))
    }
}

/// How a `speak` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Played (or paused) to the end; no acknowledgment requested.
    Finished,
    /// The user acknowledged the line.
    Acknowledged,
    /// A newer request took over before this one completed.
    Superseded,
    /// The session was torn down.
    Closed,
}

pub struct SpeechCoordinator {
    tts: Arc<dyn TtsBackend>,
    sink: Arc<dyn SpeechSink>,
    cache: DashMap<String, EncodedAudio>,
    latest: AtomicU64,
    issued: AtomicU64,
    view: Arc<watch::Sender<SpeechView>>,
    ack: AckGate,
    alive: CancellationToken,
    timing: SpeechTiming,
}

impl SpeechCoordinator {
    pub fn new(
        tts: Arc<dyn TtsBackend>,
        sink: Arc<dyn SpeechSink>,
        timing: SpeechTiming,
        alive: CancellationToken,
    ) -> Self {
        let (view, _) = watch::channel(SpeechView::default());
        Self::with_view(tts, sink, timing, alive, Arc::new(view))
    }

    /// Publish into an existing channel (reset to the default view), so
    /// subscribers outlive this coordinator.
    pub fn with_view(
        tts: Arc<dyn TtsBackend>,
        sink: Arc<dyn SpeechSink>,
        timing: SpeechTiming,
        alive: CancellationToken,
        view: Arc<watch::Sender<SpeechView>>,
    ) -> Self {
        view.send_replace(SpeechView::default());
        Self {
            tts,
            sink,
            cache: DashMap::new(),
            latest: AtomicU64::new(0),
            issued: AtomicU64::new(0),
            view,
            ack: AckGate::new(),
            alive,
            timing,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SpeechView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> SpeechView {
        self.view.borrow().clone()
    }

    /// Number of `speak` requests this coordinator has issued.
    pub fn requests_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn cached_lines(&self) -> usize {
        self.cache.len()
    }

    fn is_current(&self, request_id: u64) -> bool {
        !self.alive.is_cancelled() && self.latest.load(Ordering::SeqCst) == request_id
    }

    /// Speak one line. Never fails: synthesis and playback errors degrade to pauses.
    pub async fn speak(&self, text: &str, wait_for_user: bool) -> SpeechOutcome {
        if self.alive.is_cancelled() {
            return SpeechOutcome::Closed;
        }

        // Supersede: newer id, halt old audio, drop any pending acknowledgment.
        let request_id = NEXT_REQUEST.fetch_add(1, Ordering::SeqCst);
        self.latest.fetch_max(request_id, Ordering::SeqCst);
        self.issued.fetch_add(1, Ordering::SeqCst);
        self.sink.stop();
        self.ack.release();
        self.publish(request_id, |v| {
            v.text = text.to_string();
            v.visible = true;
            v.speaking = true;
            v.awaiting_ack = false;
        });
        debug!(request_id, wait_for_user, "speech request issued");

        let audio = self.resolve_audio(text).await;

        if self.is_current(request_id) {
            match audio {
                Some(audio) => {
                    let played = tokio::select! {
                        result = self.sink.play(request_id, &audio) => result,
                        _ = self.alive.cancelled() => Ok(()),
                    };
                    if let Err(e) = played {
                        warn!(request_id, error = %e, "speech playback failed; pausing instead");
                        self.pause(self.timing.error_pause).await;
                    }
                }
                None => self.pause(self.timing.fallback_pause(text)).await,
            }
        }

        if !self.is_current(request_id) {
            debug!(request_id, "stale speech request resolved without effect");
            return self.stale_outcome();
        }
        self.publish(request_id, |v| v.speaking = false);

        if !wait_for_user {
            return SpeechOutcome::Finished;
        }

        self.publish(request_id, |v| v.awaiting_ack = true);
        let acknowledged = self.ack.wait(&self.alive).await;
        if !self.is_current(request_id) {
            return self.stale_outcome();
        }
        self.publish(request_id, |v| v.awaiting_ack = false);
        if acknowledged {
            SpeechOutcome::Acknowledged
        } else {
            SpeechOutcome::Superseded
        }
    }

    /// Resolve the live acknowledgment wait. No effect when nothing is awaiting.
    pub fn acknowledge(&self) -> bool {
        let resolved = self.ack.acknowledge();
        if resolved {
            debug!("speech acknowledged");
        }
        resolved
    }

    pub fn is_awaiting_ack(&self) -> bool {
        self.ack.is_pending()
    }

    /// Show a caption without speaking it (e.g. while a reply is being generated).
    pub fn show_caption(&self, text: &str) {
        self.publish_while_alive(|v| {
            v.text = text.to_string();
            v.visible = true;
        });
    }

    pub fn hide(&self) {
        self.publish_while_alive(|v| v.visible = false);
    }

    /// Teardown: silence audio and release any pending acknowledgment.
    pub fn shutdown(&self) {
        self.sink.stop();
        self.ack.release();
        info!("speech coordinator shut down");
    }

    /// Apply `f` only if `request_id` is still the live request. The check runs
    /// under the channel's write lock, so it cannot interleave with the reset a
    /// newer coordinator performs on the shared channel.
    fn publish<F: FnOnce(&mut SpeechView)>(&self, request_id: u64, f: F) -> bool {
        self.view.send_if_modified(|v| {
            if !self.is_current(request_id) {
                return false;
            }
            f(v);
            true
        })
    }

    fn publish_while_alive<F: FnOnce(&mut SpeechView)>(&self, f: F) -> bool {
        self.view.send_if_modified(|v| {
            if self.alive.is_cancelled() {
                return false;
            }
            f(v);
            true
        })
    }

    fn stale_outcome(&self) -> SpeechOutcome {
        if self.alive.is_cancelled() {
            SpeechOutcome::Closed
        } else {
            SpeechOutcome::Superseded
        }
    }

    async fn resolve_audio(&self, text: &str) -> Option<EncodedAudio> {
        if let Some(hit) = self.cache.get(text) {
            debug!("speech cache hit");
            return Some(hit.value().clone());
        }
        let synthesized = tokio::select! {
            result = self.tts.synthesize(text) => result,
            _ = self.alive.cancelled() => return None,
        };
        match synthesized {
            Ok(Some(audio)) if !audio.is_empty() => {
                if !self.alive.is_cancelled() {
                    self.cache.insert(text.to_string(), audio.clone());
                }
                Some(audio)
            }
            Ok(_) => {
                debug!("no voice for line; using reading pause");
                None
            }
            Err(e) => {
                warn!(error = %e, "speech synthesis failed; using reading pause");
                None
            }
        }
    }

    async fn pause(&self, length: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(length) => {}
            _ = self.alive.cancelled() => {}
        }
    }
}
