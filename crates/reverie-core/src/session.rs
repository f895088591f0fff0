//! One run of the experience, from the fog to the closing line.
//!
//! A `Session` owns everything a run mutates: the published `ExperienceView`,
//! the speech coordinator, the capture gate, and fog state. Its cancellation
//! token is the liveness flag; once cancelled, every mutator is a no-op so
//! continuations that resume after a restart cannot touch the new run.

use crate::appearance::UserAppearance;
use crate::config::ExperienceConfig;
use crate::fog::{cleared_fraction, FogMask, FogTracker};
use crate::phase::Phase;
use crate::script::{ProblemKind, INTRO_LINES};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reverie_voice::{
    CaptureGate, MediaDevices, SpeechCoordinator, SpeechSink, SpeechView, TtsBackend,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Everything the rendering front end needs besides the dialogue box.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperienceView {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub phase: Phase,
    /// Set once, after analysis.
    pub appearance: Option<UserAppearance>,
    /// Set once, at `ChoosingProblem`.
    pub selection: Option<ProblemKind>,
    pub hovered: Option<ProblemKind>,
    /// Digit shown during the capture countdown.
    pub countdown: Option<u32>,
    pub loading_caption: Option<&'static str>,
    /// Index of the intro line last spoken during `Awakened`.
    pub intro_index: usize,
    /// User-visible notice (permission failures).
    pub notice: Option<String>,
    pub recording_voice: bool,
    pub cleared_fraction: f32,
}

impl ExperienceView {
    pub(crate) fn fresh(session_id: Uuid) -> Self {
        Self {
            session_id,
            started_at: Utc::now(),
            phase: Phase::INITIAL,
            appearance: None,
            selection: None,
            hovered: None,
            countdown: None,
            loading_caption: None,
            intro_index: 0,
            notice: None,
            recording_voice: false,
            cleared_fraction: 0.0,
        }
    }

    pub fn is_last_intro_line(&self) -> bool {
        self.intro_index + 1 >= INTRO_LINES.len()
    }

    /// The "record current status" action is offered.
    pub fn offers_record_action(&self) -> bool {
        self.phase == Phase::Awakened && self.is_last_intro_line()
    }

    pub fn offers_restart_action(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// What a clearance check concluded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FogCheck {
    Skipped,
    Fogged(f32),
    Cleared(f32),
}

struct FogState {
    mask: FogMask,
    tracker: FogTracker,
}

pub struct Session {
    id: Uuid,
    view: Arc<watch::Sender<ExperienceView>>,
    speech: SpeechCoordinator,
    capture: CaptureGate,
    alive: CancellationToken,
    fog: Mutex<FogState>,
    clear_threshold: f32,
    sample_width: u32,
    permission_in_flight: AtomicBool,
    voice_in_flight: AtomicBool,
}

impl Session {
    pub fn new(
        config: &ExperienceConfig,
        tts: Arc<dyn TtsBackend>,
        sink: Arc<dyn SpeechSink>,
        devices: Arc<dyn MediaDevices>,
        view: Arc<watch::Sender<ExperienceView>>,
        speech_view: Arc<watch::Sender<SpeechView>>,
    ) -> Self {
        let id = Uuid::new_v4();
        let alive = CancellationToken::new();
        view.send_replace(ExperienceView::fresh(id));
        let speech = SpeechCoordinator::with_view(
            tts,
            sink,
            config.speech.timing(),
            alive.clone(),
            speech_view,
        );
        info!(session = %id, "session started");
        Self {
            id,
            view,
            speech,
            capture: CaptureGate::new(devices),
            alive,
            fog: Mutex::new(FogState {
                mask: FogMask::new(config.fog.geometry()),
                tracker: FogTracker::new(config.timing.fog_check_throttle()),
            }),
            clear_threshold: config.fog.clear_threshold,
            sample_width: config.fog.sample_width,
            permission_in_flight: AtomicBool::new(false),
            voice_in_flight: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn speech(&self) -> &SpeechCoordinator {
        &self.speech
    }

    pub fn capture(&self) -> &CaptureGate {
        &self.capture
    }

    pub fn alive(&self) -> &CancellationToken {
        &self.alive
    }

    pub fn is_alive(&self) -> bool {
        !self.alive.is_cancelled()
    }

    pub fn view(&self) -> ExperienceView {
        self.view.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.view.borrow().phase
    }

    /// Mutate the published view. No-op once torn down. The ownership check runs
    /// under the channel's write lock, so a continuation racing a restart can
    /// never land on the next session's view.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut ExperienceView),
    {
        self.view.send_if_modified(|v| {
            if !self.owns(v) {
                return false;
            }
            f(v);
            true
        });
    }

    fn owns(&self, view: &ExperienceView) -> bool {
        self.is_alive() && view.session_id == self.id
    }

    /// Compare-and-set the phase. Succeeds only while alive, while the phase is
    /// still `from`, and when the table allows `from -> to`.
    pub fn transition(&self, from: Phase, to: Phase) -> bool {
        if !self.is_alive() {
            debug!(%from, %to, "transition dropped: session torn down");
            return false;
        }
        if !from.can_transition_to(to) {
            warn!(%from, %to, "illegal transition refused");
            return false;
        }
        let mut moved = false;
        self.view.send_if_modified(|v| {
            if self.owns(v) && v.phase == from {
                v.phase = to;
                moved = true;
            }
            moved
        });
        if moved {
            info!(session = %self.id, phase = %to, "phase changed");
            if from.is_camera_active() && !to.is_camera_active() {
                self.capture.release_video();
            }
        } else {
            debug!(%from, %to, current = %self.phase(), "transition dropped: phase moved on");
        }
        moved
    }

    /// Record the analysed appearance if none is set yet.
    pub fn set_appearance(&self, appearance: UserAppearance) -> bool {
        self.view.send_if_modified(|v| {
            if !self.owns(v) || v.appearance.is_some() {
                return false;
            }
            v.appearance = Some(appearance);
            true
        })
    }

    /// Choose the archetype and enter `NpcAskingDetail` in one step. Fails when a
    /// selection already exists or the phase is not `ChoosingProblem`.
    pub fn select_problem(&self, kind: ProblemKind) -> bool {
        let chosen = self.view.send_if_modified(|v| {
            if !self.owns(v) || v.phase != Phase::ChoosingProblem || v.selection.is_some() {
                return false;
            }
            v.selection = Some(kind);
            v.hovered = None;
            v.phase = Phase::NpcAskingDetail;
            true
        });
        if chosen {
            info!(session = %self.id, problem = %kind, phase = %Phase::NpcAskingDetail, "problem chosen");
        }
        chosen
    }

    /// Wipe the fog at a pointer position. Returns `true` when a chime should ring.
    pub fn wipe_fog(&self, x: f32, y: f32) -> bool {
        let mut fog = self.fog.lock();
        fog.mask.wipe(x, y);
        fog.tracker.on_move(x, y, &mut rand::thread_rng())
    }

    /// Throttled clearance check of the session's own fog mask.
    pub fn check_fog(&self) -> FogCheck {
        let fraction = {
            let mut fog = self.fog.lock();
            if !fog.tracker.should_check(Instant::now()) {
                return FogCheck::Skipped;
            }
            fog.mask.cleared_fraction(self.sample_width)
        };
        self.judge_fog(fraction)
    }

    /// Clearance check of a host-rendered fog buffer. The host decides the cadence.
    pub fn check_fog_snapshot(&self, width: u32, height: u32, alpha: &[u8]) -> FogCheck {
        self.judge_fog(cleared_fraction(width, height, alpha, self.sample_width))
    }

    fn judge_fog(&self, fraction: f32) -> FogCheck {
        self.update(|v| v.cleared_fraction = fraction);
        if fraction > self.clear_threshold {
            FogCheck::Cleared(fraction)
        } else {
            FogCheck::Fogged(fraction)
        }
    }

    /// Claim the single permission-request slot. Returns `false` if one is already running.
    pub fn begin_permission_request(&self) -> bool {
        !self.permission_in_flight.swap(true, Ordering::SeqCst)
    }

    pub fn end_permission_request(&self) {
        self.permission_in_flight.store(false, Ordering::SeqCst);
    }

    /// Claim the single voice-toggle slot. Returns `false` if a toggle is already running.
    pub fn begin_voice_toggle(&self) -> bool {
        !self.voice_in_flight.swap(true, Ordering::SeqCst)
    }

    pub fn end_voice_toggle(&self) {
        self.voice_in_flight.store(false, Ordering::SeqCst);
    }

    /// Cancel every continuation, release the devices, and silence speech.
    pub fn teardown(&self) {
        if self.alive.is_cancelled() {
            return;
        }
        self.alive.cancel();
        self.capture.release_all();
        self.speech.shutdown();
        info!(session = %self.id, "session torn down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}
