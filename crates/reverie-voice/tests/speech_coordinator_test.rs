//! Integration tests for the speech playback coordinator
//!
//! All tests run on paused time, so pauses and clip lengths are exact.

use async_trait::async_trait;
use reverie_voice::{
    EncodedAudio, PlaceholderTts, SilentSink, SpeechCoordinator, SpeechOutcome, SpeechSink,
    SpeechTiming, SpeechView, TtsBackend, VoiceError, VoiceResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One second of 24 kHz mono silence, matching the hosted TTS format.
fn one_second_clip() -> EncodedAudio {
    EncodedAudio::pcm16_mono(24_000, vec![0u8; 48_000])
}

#[derive(Default)]
struct CountingTts {
    calls: AtomicUsize,
}

#[async_trait]
impl TtsBackend for CountingTts {
    async fn synthesize(&self, _text: &str) -> VoiceResult<Option<EncodedAudio>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(one_second_clip()))
    }
}

/// Takes five seconds to answer for the line "slow", answers nothing otherwise.
struct SlowTts;

#[async_trait]
impl TtsBackend for SlowTts {
    async fn synthesize(&self, text: &str) -> VoiceResult<Option<EncodedAudio>> {
        if text == "slow" {
            tokio::time::sleep(Duration::from_secs(5)).await;
            return Ok(Some(one_second_clip()));
        }
        Ok(None)
    }
}

struct BrokenTts;

#[async_trait]
impl TtsBackend for BrokenTts {
    async fn synthesize(&self, _text: &str) -> VoiceResult<Option<EncodedAudio>> {
        Err(VoiceError::Tts("quota exhausted".to_string()))
    }
}

fn coordinator(tts: Arc<dyn TtsBackend>) -> (Arc<SpeechCoordinator>, CancellationToken) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let alive = CancellationToken::new();
    let coordinator = SpeechCoordinator::new(
        tts,
        Arc::new(SilentSink::default()),
        SpeechTiming::default(),
        alive.clone(),
    );
    (Arc::new(coordinator), alive)
}

async fn wait_for_ack(coordinator: &SpeechCoordinator) {
    while !coordinator.is_awaiting_ack() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn short_line_without_voice_pauses_for_the_minimum() {
    let (speech, _alive) = coordinator(Arc::new(PlaceholderTts));
    let start = Instant::now();

    let outcome = speech.speak("你好", false).await;

    assert_eq!(outcome, SpeechOutcome::Finished);
    assert_eq!(start.elapsed(), Duration::from_secs(2));
    let view = speech.view();
    assert_eq!(view.text, "你好");
    assert!(view.visible);
    assert!(!view.speaking);
}

#[tokio::test(start_paused = true)]
async fn long_line_without_voice_pauses_per_character() {
    let (speech, _alive) = coordinator(Arc::new(BrokenTts));
    let line = "试着触碰它。它正在感受你的心火。";
    let start = Instant::now();

    speech.speak(line, false).await;

    let expected = Duration::from_millis(200) * line.chars().count() as u32;
    assert_eq!(start.elapsed(), expected);
}

#[tokio::test(start_paused = true)]
async fn repeated_line_is_synthesized_once() {
    let tts = Arc::new(CountingTts::default());
    let (speech, _alive) = coordinator(tts.clone());

    let start = Instant::now();
    speech.speak("记住这光芒的样子。", false).await;
    speech.speak("记住这光芒的样子。", false).await;

    assert_eq!(tts.calls.load(Ordering::SeqCst), 1);
    assert_eq!(speech.cached_lines(), 1);
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn newer_request_wins_over_a_slow_one() {
    let (speech, _alive) = coordinator(Arc::new(SlowTts));

    let first = {
        let speech = Arc::clone(&speech);
        tokio::spawn(async move { speech.speak("slow", true).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let second = speech.speak("fast", false).await;
    assert_eq!(second, SpeechOutcome::Finished);
    assert_eq!(speech.requests_issued(), 2);

    let first = first.await.unwrap();
    assert_eq!(first, SpeechOutcome::Superseded);

    let view = speech.view();
    assert_eq!(view.text, "fast");
    assert!(!view.speaking);
    assert!(!view.awaiting_ack);
    assert!(!speech.is_awaiting_ack());
}

#[tokio::test(start_paused = true)]
async fn acknowledgment_resolves_only_the_live_wait() {
    let (speech, _alive) = coordinator(Arc::new(PlaceholderTts));
    assert!(!speech.acknowledge(), "nothing pending yet");

    let pending = {
        let speech = Arc::clone(&speech);
        tokio::spawn(async move { speech.speak("准备好了吗？", true).await })
    };
    wait_for_ack(&speech).await;
    assert!(speech.view().awaiting_ack);

    assert!(speech.acknowledge());
    assert_eq!(pending.await.unwrap(), SpeechOutcome::Acknowledged);
    assert!(!speech.view().awaiting_ack);
    assert!(!speech.acknowledge(), "second click is ignored");
}

#[tokio::test(start_paused = true)]
async fn teardown_releases_a_pending_wait() {
    let (speech, alive) = coordinator(Arc::new(PlaceholderTts));

    let pending = {
        let speech = Arc::clone(&speech);
        tokio::spawn(async move { speech.speak("再见", true).await })
    };
    wait_for_ack(&speech).await;

    alive.cancel();
    speech.shutdown();

    assert_eq!(pending.await.unwrap(), SpeechOutcome::Closed);
    assert_eq!(speech.speak("之后", false).await, SpeechOutcome::Closed);
}

#[tokio::test(start_paused = true)]
async fn torn_down_coordinator_cannot_touch_the_shared_view() {
    let (view, mut rx) = watch::channel(SpeechView::default());
    let view = Arc::new(view);
    let sink: Arc<dyn SpeechSink> = Arc::new(SilentSink::default());

    let old_alive = CancellationToken::new();
    let old = SpeechCoordinator::with_view(
        Arc::new(PlaceholderTts),
        Arc::clone(&sink),
        SpeechTiming::default(),
        old_alive.clone(),
        Arc::clone(&view),
    );
    old.show_caption("旧的字幕");
    old_alive.cancel();
    old.shutdown();

    let fresh = SpeechCoordinator::with_view(
        Arc::new(PlaceholderTts),
        sink,
        SpeechTiming::default(),
        CancellationToken::new(),
        Arc::clone(&view),
    );
    let _ = rx.borrow_and_update();

    old.show_caption("旧的字幕");
    old.hide();
    assert_eq!(old.speak("迟到的一句", true).await, SpeechOutcome::Closed);
    assert!(!rx.has_changed().unwrap());
    assert_eq!(fresh.view(), SpeechView::default());
}

#[tokio::test(start_paused = true)]
async fn replacement_coordinator_still_plays_through_a_shared_sink() {
    let sink: Arc<dyn SpeechSink> = Arc::new(SilentSink::default());
    let tts = Arc::new(CountingTts::default());
    let build = |alive: &CancellationToken| {
        SpeechCoordinator::new(
            tts.clone(),
            Arc::clone(&sink),
            SpeechTiming::default(),
            alive.clone(),
        )
    };

    let first_alive = CancellationToken::new();
    let first = build(&first_alive);
    for line in ["一", "二", "三"] {
        first.speak(line, false).await;
    }
    first_alive.cancel();

    let second = build(&CancellationToken::new());
    let started = Instant::now();
    assert_eq!(second.speak("重新开始", false).await, SpeechOutcome::Finished);
    assert_eq!(started.elapsed(), Duration::from_secs(1));
}
