//! **Phase Transition Engine**: the event loop and the scripted sequences.
//!
//! `Experience::run` consumes `ExperienceEvent`s one at a time. Short reactions
//! (fog, clicks, hover) happen inline; anything that awaits speech, devices,
//! or the backend runs as a spawned task holding the current `Session`. Those
//! tasks re-check liveness and phase (via compare-and-set transitions) after
//! every await, so a restart or a superseded step leaves them inert.

use crate::backend::GenerativeBackend;
use crate::config::ExperienceConfig;
use crate::error::{BackendError, ExperienceError, ExperienceResult};
use crate::phase::Phase;
use crate::script::{
    reply_context, ProblemKind, CLOSING_LINE, HEAVY_QUESTION, INTRO_LINES, LOADING_CAPTIONS,
    MIRROR_LINES, PERMISSION_NOTICE, PROCESSING_CAPTION, REPLY_EMPTY_FALLBACK,
    REPLY_ERROR_FALLBACK, TRANSITION_LINE,
};
use crate::session::{ExperienceView, FogCheck, Session};
use crate::timers::{poll_until, CaptionTicker, PollOutcome};
use reverie_voice::{
    AmbientSounds, AudioPayload, ImagePayload, MediaDevices, SpeechOutcome, SpeechSink,
    SpeechView, TtsBackend,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 64;

/// Input from the rendering front end.
#[derive(Debug, Clone, PartialEq)]
pub enum ExperienceEvent {
    /// Pointer or touch pressed on the fog.
    PointerDown,
    /// Pointer or touch moved; wipes the session's own fog mask.
    PointerMove { x: f32, y: f32 },
    /// A host-rendered fog buffer (one alpha byte per pixel, row-major).
    FogSnapshot {
        width: u32,
        height: u32,
        alpha: Vec<u8>,
    },
    /// Click/tap anywhere: advances intro lines or acknowledges the current line.
    Click,
    /// The "record current status" action.
    RecordStatus,
    SelectProblem(ProblemKind),
    HoverProblem(Option<ProblemKind>),
    /// Start or stop the voice reply recording.
    ToggleVoiceRecording,
    Restart,
    Shutdown,
}

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct ExperienceDeps {
    pub config: ExperienceConfig,
    pub backend: Arc<dyn GenerativeBackend>,
    pub tts: Arc<dyn TtsBackend>,
    pub sink: Arc<dyn SpeechSink>,
    pub ambient: Arc<dyn AmbientSounds>,
    pub devices: Arc<dyn MediaDevices>,
}

/// Front-end side of a running experience.
#[derive(Clone)]
pub struct ExperienceHandle {
    events: mpsc::Sender<ExperienceEvent>,
    view: watch::Receiver<ExperienceView>,
    speech: watch::Receiver<SpeechView>,
}

impl ExperienceHandle {
    pub async fn send(&self, event: ExperienceEvent) -> ExperienceResult<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| ExperienceError::Closed)
    }

    pub async fn click(&self) -> ExperienceResult<()> {
        self.send(ExperienceEvent::Click).await
    }

    pub fn view(&self) -> ExperienceView {
        self.view.borrow().clone()
    }

    pub fn speech(&self) -> SpeechView {
        self.speech.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<ExperienceView> {
        self.view.clone()
    }

    pub fn subscribe_speech(&self) -> watch::Receiver<SpeechView> {
        self.speech.clone()
    }

    /// Resolve once the published phase equals `phase`.
    pub async fn wait_for_phase(&self, phase: Phase) -> ExperienceResult<()> {
        let mut rx = self.view.clone();
        loop {
            if rx.borrow_and_update().phase == phase {
                return Ok(());
            }
            rx.changed().await.map_err(|_| ExperienceError::Closed)?;
        }
    }
}

pub struct Experience {
    deps: Arc<ExperienceDeps>,
    events: mpsc::Receiver<ExperienceEvent>,
    view_tx: Arc<watch::Sender<ExperienceView>>,
    speech_tx: Arc<watch::Sender<SpeechView>>,
    session: Arc<Session>,
}

impl Experience {
    pub fn new(deps: ExperienceDeps) -> (Self, ExperienceHandle) {
        let deps = Arc::new(deps);
        let (events_tx, events) = mpsc::channel(EVENT_BUFFER);
        let (view_tx, view_rx) = watch::channel(ExperienceView::fresh(uuid::Uuid::nil()));
        let (speech_tx, speech_rx) = watch::channel(SpeechView::default());
        let view_tx = Arc::new(view_tx);
        let speech_tx = Arc::new(speech_tx);
        let session = Arc::new(new_session(&deps, &view_tx, &speech_tx));
        let handle = ExperienceHandle {
            events: events_tx,
            view: view_rx,
            speech: speech_rx,
        };
        (
            Self {
                deps,
                events,
                view_tx,
                speech_tx,
                session,
            },
            handle,
        )
    }

    /// Process events until `Shutdown` arrives or every handle is dropped.
    pub async fn run(mut self) -> ExperienceResult<()> {
        info!("experience running");
        while let Some(event) = self.events.recv().await {
            match event {
                ExperienceEvent::Shutdown => break,
                ExperienceEvent::Restart => self.restart(),
                other => self.dispatch(other),
            }
        }
        self.session.teardown();
        info!("experience stopped");
        Ok(())
    }

    fn restart(&mut self) {
        info!(previous = %self.session.id(), "restarting experience");
        self.session.teardown();
        self.session = Arc::new(new_session(&self.deps, &self.view_tx, &self.speech_tx));
    }

    fn dispatch(&self, event: ExperienceEvent) {
        let session = &self.session;
        let phase = session.phase();
        match event {
            ExperienceEvent::PointerDown => {
                if phase == Phase::Foggy {
                    session.transition(Phase::Foggy, Phase::Clearing);
                }
            }
            ExperienceEvent::PointerMove { x, y } => {
                if !phase.is_fog_active() {
                    return;
                }
                if phase == Phase::Foggy {
                    session.transition(Phase::Foggy, Phase::Clearing);
                }
                if session.wipe_fog(x, y) {
                    self.deps.ambient.chime();
                }
                self.on_fog_check(session.check_fog());
            }
            ExperienceEvent::FogSnapshot {
                width,
                height,
                alpha,
            } => {
                if !phase.is_fog_active() {
                    return;
                }
                if phase == Phase::Foggy {
                    session.transition(Phase::Foggy, Phase::Clearing);
                }
                self.on_fog_check(session.check_fog_snapshot(width, height, &alpha));
            }
            ExperienceEvent::Click => self.on_click(phase),
            ExperienceEvent::RecordStatus => self.on_record_status(),
            ExperienceEvent::SelectProblem(kind) => {
                if session.select_problem(kind) {
                    self.spawn(problem_detail(Arc::clone(session), kind));
                } else {
                    debug!(%phase, problem = %kind, "selection ignored");
                }
            }
            ExperienceEvent::HoverProblem(kind) => {
                if phase == Phase::ChoosingProblem {
                    session.update(|v| v.hovered = kind);
                }
            }
            ExperienceEvent::ToggleVoiceRecording => {
                if phase != Phase::ListeningToUser {
                    debug!(%phase, "voice toggle ignored");
                    return;
                }
                if !session.begin_voice_toggle() {
                    debug!("voice toggle already in flight");
                    return;
                }
                self.spawn(toggle_voice(Arc::clone(session), Arc::clone(&self.deps)));
            }
            ExperienceEvent::Restart | ExperienceEvent::Shutdown => {}
        }
    }

    fn on_fog_check(&self, check: FogCheck) {
        let FogCheck::Cleared(fraction) = check else {
            return;
        };
        if self.session.transition(Phase::Clearing, Phase::Awakened) {
            info!(cleared = fraction, "fog cleared");
            self.deps.ambient.singing_bowl();
            self.spawn(awakening(Arc::clone(&self.session), Arc::clone(&self.deps)));
        }
    }

    fn on_click(&self, phase: Phase) {
        if !phase.accepts_dialogue_clicks() {
            debug!(%phase, "click ignored");
            return;
        }
        let session = &self.session;
        let speech = session.speech();
        if phase == Phase::Awakened && speech.requests_issued() > 0 {
            let view = session.view();
            if !view.is_last_intro_line() {
                let next = view.intro_index + 1;
                session.update(|v| v.intro_index = next);
                let session = Arc::clone(session);
                self.spawn(async move {
                    session.speech().speak(INTRO_LINES[next], false).await;
                });
                return;
            }
        }
        if !speech.acknowledge() {
            debug!(%phase, "click ignored: nothing awaiting acknowledgment");
        }
    }

    fn on_record_status(&self) {
        let session = &self.session;
        if !session.view().offers_record_action() {
            debug!(phase = %session.phase(), "record action not offered");
            return;
        }
        if !session.begin_permission_request() {
            debug!("permission request already in flight");
            return;
        }
        self.spawn(request_recording(
            Arc::clone(session),
            Arc::clone(&self.deps),
        ));
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(task);
    }
}

fn new_session(
    deps: &ExperienceDeps,
    view_tx: &Arc<watch::Sender<ExperienceView>>,
    speech_tx: &Arc<watch::Sender<SpeechView>>,
) -> Session {
    Session::new(
        &deps.config,
        Arc::clone(&deps.tts),
        Arc::clone(&deps.sink),
        Arc::clone(&deps.devices),
        Arc::clone(view_tx),
        Arc::clone(speech_tx),
    )
}

/// Run `fut` unless the session is torn down first.
async fn unless_closed<F: Future>(session: &Session, fut: F) -> Option<F::Output> {
    tokio::select! {
        out = fut => Some(out),
        _ = session.alive().cancelled() => None,
    }
}

fn proceeds(outcome: SpeechOutcome) -> bool {
    matches!(outcome, SpeechOutcome::Finished | SpeechOutcome::Acknowledged)
}

// ---------------------------------------------------------------------------
// Scripted sequences
// ---------------------------------------------------------------------------

async fn awakening(session: Arc<Session>, deps: Arc<ExperienceDeps>) {
    let delay = deps.config.timing.awakening_delay();
    if unless_closed(&session, tokio::time::sleep(delay)).await.is_none() {
        return;
    }
    if session.phase() == Phase::Awakened {
        session.speech().speak(INTRO_LINES[0], false).await;
    }
}

async fn request_recording(session: Arc<Session>, deps: Arc<ExperienceDeps>) {
    let granted = session.capture().request_permissions().await;
    session.end_permission_request();
    if let Err(e) = granted {
        warn!(error = %e, "camera/microphone access refused");
        session.update(|v| v.notice = Some(PERMISSION_NOTICE.to_string()));
        return;
    }
    if !session.transition(Phase::Awakened, Phase::Recording) {
        session.capture().release_video();
        return;
    }
    session.update(|v| v.notice = None);
    session.speech().hide();
    capture_snapshot(session, deps).await;
}

/// Readiness polling, countdown, capture. Repeats until a frame is captured.
async fn capture_snapshot(session: Arc<Session>, deps: Arc<ExperienceDeps>) {
    let timing = &deps.config.timing;
    loop {
        let readiness = poll_until(timing.readiness_policy(), session.alive(), || {
            session.capture().capture_frame().map(|_| ())
        })
        .await;
        match readiness {
            None => return,
            Some(PollOutcome::Exhausted) => {
                warn!("camera not ready after polling; starting countdown anyway")
            }
            Some(PollOutcome::Ready(())) => debug!("camera ready"),
        }

        let fired = timing
            .countdown()
            .run(session.alive(), |digit| session.update(|v| v.countdown = digit))
            .await;
        if !fired {
            return;
        }
        session.update(|v| v.countdown = None);

        match session.capture().capture_frame() {
            Some(image) => {
                if session.transition(Phase::Recording, Phase::Analyzing) {
                    analyze(session, deps, image).await;
                }
                return;
            }
            None => {
                warn!("capture failed: no frame; retrying");
                if !session.transition(Phase::Recording, Phase::Recording) {
                    return;
                }
            }
        }
    }
}

async fn analyze(session: Arc<Session>, deps: Arc<ExperienceDeps>, image: ImagePayload) {
    let timing = &deps.config.timing;
    let captions = session.alive().child_token();
    let ticker = CaptionTicker::new(&LOADING_CAPTIONS, timing.loading_caption_interval());
    let ticking = {
        let session = Arc::clone(&session);
        let captions = captions.clone();
        tokio::spawn(async move {
            ticker
                .run(&captions, |caption| {
                    session.update(|v| v.loading_caption = Some(caption))
                })
                .await;
        })
    };

    let analysis = tokio::time::timeout(
        timing.analysis_timeout(),
        deps.backend.analyze_appearance(&image),
    );
    let result = unless_closed(&session, analysis).await;
    captions.cancel();
    if let Err(e) = ticking.await {
        warn!(error = %e, "loading caption ticker failed");
    }

    let appearance = match result {
        None => return,
        Some(Ok(Ok(appearance))) => appearance,
        Some(Ok(Err(e))) => {
            warn!(error = %e, "appearance analysis failed; using default colours");
            Default::default()
        }
        Some(Err(_)) => {
            let e = BackendError::Timeout(timing.analysis_timeout());
            warn!(error = %e, "appearance analysis failed; using default colours");
            Default::default()
        }
    };
    session.set_appearance(appearance);
    session.update(|v| v.loading_caption = None);
    if !session.transition(Phase::Analyzing, Phase::Mirroring) {
        return;
    }
    reflection(session).await;
}

/// Mirroring lines, the transition line, then the heavy question.
async fn reflection(session: Arc<Session>) {
    let speech = session.speech();
    for line in MIRROR_LINES {
        if !proceeds(speech.speak(line, true).await) {
            return;
        }
    }
    if !session.transition(Phase::Mirroring, Phase::Transitioning) {
        return;
    }
    if !proceeds(speech.speak(TRANSITION_LINE, true).await) {
        return;
    }
    if !session.transition(Phase::Transitioning, Phase::Transformed) {
        return;
    }
    if !proceeds(speech.speak(HEAVY_QUESTION, true).await) {
        return;
    }
    session.transition(Phase::Transformed, Phase::ChoosingProblem);
}

async fn problem_detail(session: Arc<Session>, kind: ProblemKind) {
    let script = kind.script();
    let speech = session.speech();
    if !proceeds(speech.speak(script.response, true).await) {
        return;
    }
    if !proceeds(speech.speak(script.question, true).await) {
        return;
    }
    speech.hide();
    session.transition(Phase::NpcAskingDetail, Phase::ListeningToUser);
}

/// Start or stop the reply recording. A finished recording leaves
/// `ListeningToUser` before the toggle slot is released, so no later toggle can
/// reopen the microphone for a reply that is already being processed.
async fn toggle_voice(session: Arc<Session>, deps: Arc<ExperienceDeps>) {
    let mut submission = None;
    if session.capture().is_recording() {
        if let Some(audio) = stop_voice(&session) {
            if session.transition(Phase::ListeningToUser, Phase::ProcessingReply) {
                submission = Some(audio);
            }
        }
    } else {
        start_voice(&session).await;
    }
    session.end_voice_toggle();
    if let Some(audio) = submission {
        submit_reply(session, deps, audio).await;
    }
}

async fn start_voice(session: &Session) {
    let capture = session.capture();
    if let Err(e) = capture.request_audio_stream().await {
        warn!(error = %e, "microphone unavailable");
        session.update(|v| v.notice = Some(PERMISSION_NOTICE.to_string()));
        return;
    }
    if session.phase() != Phase::ListeningToUser {
        debug!(phase = %session.phase(), "phase moved on while opening the microphone");
        capture.release_audio();
        return;
    }
    match capture.start_audio_recording() {
        Ok(_) => session.update(|v| {
            v.recording_voice = true;
            v.notice = None;
        }),
        Err(e) => {
            warn!(error = %e, "could not start recording");
            capture.release_audio();
        }
    }
}

fn stop_voice(session: &Session) -> Option<AudioPayload> {
    session.update(|v| v.recording_voice = false);
    match session.capture().stop_audio_recording() {
        Ok(Some(audio)) if !audio.is_empty() => Some(audio),
        Ok(_) => {
            warn!("recording produced no audio");
            None
        }
        Err(e) => {
            warn!(error = %e, "recording failed");
            None
        }
    }
}

/// Runs in `ProcessingReply`: caption, generate, then speak the reply and close.
async fn submit_reply(session: Arc<Session>, deps: Arc<ExperienceDeps>, audio: AudioPayload) {
    let speech = session.speech();
    speech.show_caption(PROCESSING_CAPTION);

    let context = reply_context(session.view().selection);
    let timeout = deps.config.timing.reply_timeout();
    let call = tokio::time::timeout(timeout, deps.backend.generate_reply(&audio, context));
    let reply = match unless_closed(&session, call).await {
        None => return,
        Some(Ok(Ok(text))) if !text.trim().is_empty() => text,
        Some(Ok(Ok(_))) | Some(Ok(Err(BackendError::EmptyResponse))) => {
            warn!("reply generation returned nothing; using fallback");
            REPLY_EMPTY_FALLBACK.to_string()
        }
        Some(Ok(Err(e))) => {
            warn!(error = %e, "reply generation failed; using fallback");
            REPLY_ERROR_FALLBACK.to_string()
        }
        Some(Err(_)) => {
            let e = BackendError::Timeout(timeout);
            warn!(error = %e, "reply generation failed; using fallback");
            REPLY_ERROR_FALLBACK.to_string()
        }
    };

    if !session.transition(Phase::ProcessingReply, Phase::Refining) {
        return;
    }
    if !proceeds(speech.speak(&reply, true).await) {
        return;
    }
    if session.transition(Phase::Refining, Phase::Conclusion) {
        speech.speak(CLOSING_LINE, false).await;
    }
}
