//! **VoiceOutput**: speech synthesis seam and exclusive speech playback.
//!
//! `TtsBackend` turns a line of dialogue into audio; `SpeechSink` plays it and
//! resolves when playback ends or is stopped. `RodioSpeaker` creates one `Sink`
//! per utterance so `stop()` silences exactly the current line.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Synthesized speech ready for playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedAudio {
    /// Little-endian signed 16-bit PCM, as returned by the Gemini TTS model (24 kHz mono).
    Pcm16 {
        sample_rate: u32,
        channels: u16,
        bytes: Vec<u8>,
    },
    /// WAV/MP3/OGG container, decoded by rodio.
    Container(Vec<u8>),
}

impl EncodedAudio {
    pub fn pcm16_mono(sample_rate: u32, bytes: Vec<u8>) -> Self {
        Self::Pcm16 {
            sample_rate,
            channels: 1,
            bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            EncodedAudio::Pcm16 { bytes, .. } => bytes.len() < 2,
            EncodedAudio::Container(bytes) => bytes.is_empty(),
        }
    }

    /// Playback length for raw PCM. Containers report `None`.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            EncodedAudio::Pcm16 {
                sample_rate,
                channels,
                bytes,
            } => {
                let frames = bytes.len() as u64 / 2 / u64::from((*channels).max(1));
                let rate = u64::from((*sample_rate).max(1));
                Some(Duration::from_micros(frames * 1_000_000 / rate))
            }
            EncodedAudio::Container(_) => None,
        }
    }

    fn into_source(self) -> VoiceResult<Box<dyn Source<Item = f32> + Send>> {
        match self {
            EncodedAudio::Pcm16 {
                sample_rate,
                channels,
                bytes,
            } => {
                let samples: Vec<i16> = bytes
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]))
                    .collect();
                let buffer = SamplesBuffer::new(channels.max(1), sample_rate, samples);
                Ok(Box::new(buffer.convert_samples::<f32>()))
            }
            EncodedAudio::Container(bytes) => {
                let decoder = rodio::Decoder::new(Cursor::new(bytes))
                    .map_err(|e| VoiceError::Playback(format!("Decode failed: {}", e)))?;
                Ok(Box::new(decoder.convert_samples::<f32>()))
            }
        }
    }
}

/// Backend that turns dialogue text into audio. `Ok(None)` means "no voice available",
/// which callers treat like a failure and cover with a reading pause.
#[async_trait]
pub trait TtsBackend: Send + Sync {
    async fn synthesize(&self, text: &str) -> VoiceResult<Option<EncodedAudio>>;
}

/// Placeholder TTS: never returns audio, so every line falls back to a reading pause.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

#[async_trait]
impl TtsBackend for PlaceholderTts {
    async fn synthesize(&self, _text: &str) -> VoiceResult<Option<EncodedAudio>> {
        Ok(None)
    }
}

/// Exclusive narrated-speech channel. At most one source plays at a time.
#[async_trait]
pub trait SpeechSink: Send + Sync {
    /// Play to the end. Resolves early (with `Ok`) when `stop` is called, and
    /// immediately when a request newer than `request_id` has already played.
    async fn play(&self, request_id: u64, audio: &EncodedAudio) -> VoiceResult<()>;
    fn stop(&self);
}

/// Sink without an output device: waits out the clip's duration so timing stays realistic.
#[derive(Debug, Default)]
pub struct SilentSink {
    stopped: Notify,
    newest: AtomicU64,
}

#[async_trait]
impl SpeechSink for SilentSink {
    async fn play(&self, request_id: u64, audio: &EncodedAudio) -> VoiceResult<()> {
        if self.newest.fetch_max(request_id, Ordering::SeqCst) > request_id {
            debug!(request_id, "SilentSink: superseded before playback");
            return Ok(());
        }
        let length = audio.duration().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(length) => {}
            _ = self.stopped.notified() => {}
        }
        Ok(())
    }

    fn stop(&self) {
        self.stopped.notify_waiters();
    }
}

/// Default output device, kept open by a dedicated thread (`OutputStream` is not `Send`).
/// Dropping the last handle closes the device.
pub struct OutputDevice {
    handle: OutputStreamHandle,
    _keepalive: mpsc::Sender<()>,
}

impl OutputDevice {
    pub fn open_default() -> VoiceResult<Arc<Self>> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (keepalive_tx, keepalive_rx) = mpsc::channel::<()>();

        thread::spawn(move || match OutputStream::try_default() {
            Ok((stream, handle)) => {
                let _ = ready_tx.send(Ok(handle));
                // Returns once every sender is dropped.
                let _ = keepalive_rx.recv();
                drop(stream);
            }
            Err(e) => {
                let _ = ready_tx.send(Err(VoiceError::Playback(e.to_string())));
            }
        });

        let handle = ready_rx
            .recv()
            .map_err(|_| VoiceError::Playback("output thread exited".to_string()))??;
        info!("OutputDevice: default output ready");
        Ok(Arc::new(Self {
            handle,
            _keepalive: keepalive_tx,
        }))
    }

    pub fn handle(&self) -> &OutputStreamHandle {
        &self.handle
    }
}

/// The line currently owning the output, and the newest request that ever did.
#[derive(Default)]
struct CurrentLine {
    newest: u64,
    sink: Option<Arc<Sink>>,
}

impl CurrentLine {
    /// Install `sink` for `request_id`, stopping whatever played before. Refused
    /// when a newer request already claimed the output.
    fn claim(&mut self, request_id: u64, sink: &Arc<Sink>) -> bool {
        if request_id < self.newest {
            return false;
        }
        self.newest = request_id;
        if let Some(previous) = self.sink.replace(Arc::clone(sink)) {
            previous.stop();
        }
        true
    }

    fn finish(&mut self, sink: &Arc<Sink>) {
        if self.sink.as_ref().is_some_and(|c| Arc::ptr_eq(c, sink)) {
            self.sink = None;
        }
    }

    fn stop(&mut self) -> bool {
        match self.sink.take() {
            Some(sink) => {
                sink.stop();
                true
            }
            None => false,
        }
    }
}

/// Speech playback on the default output device.
pub struct RodioSpeaker {
    device: Arc<OutputDevice>,
    current: Mutex<CurrentLine>,
}

impl RodioSpeaker {
    pub fn new(device: Arc<OutputDevice>) -> Self {
        Self {
            device,
            current: Mutex::new(CurrentLine::default()),
        }
    }
}

#[async_trait]
impl SpeechSink for RodioSpeaker {
    async fn play(&self, request_id: u64, audio: &EncodedAudio) -> VoiceResult<()> {
        if audio.is_empty() {
            return Ok(());
        }
        let source = audio.clone().into_source()?;
        let sink = Arc::new(
            Sink::try_new(self.device.handle()).map_err(|e| VoiceError::Playback(e.to_string()))?,
        );
        if !self.current.lock().claim(request_id, &sink) {
            debug!(request_id, "RodioSpeaker: superseded before playback");
            return Ok(());
        }
        sink.append(source);

        let waiter = Arc::clone(&sink);
        tokio::task::spawn_blocking(move || waiter.sleep_until_end())
            .await
            .map_err(|e| VoiceError::Playback(e.to_string()))?;

        self.current.lock().finish(&sink);
        Ok(())
    }

    fn stop(&self) {
        if self.current.lock().stop() {
            debug!("RodioSpeaker: stopped current line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_tts_returns_nothing() {
        let tts = PlaceholderTts;
        assert!(tts.synthesize("hello").await.unwrap().is_none());
    }

    #[test]
    fn pcm_duration_follows_sample_rate() {
        let audio = EncodedAudio::pcm16_mono(24_000, vec![0u8; 48_000]);
        assert_eq!(audio.duration(), Some(Duration::from_secs(1)));
        assert!(!audio.is_empty());
        assert!(EncodedAudio::pcm16_mono(24_000, vec![0]).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_sink_stops_early() {
        let sink = Arc::new(SilentSink::default());
        let audio = EncodedAudio::pcm16_mono(24_000, vec![0u8; 48_000 * 10]);
        let player = Arc::clone(&sink);
        let started = tokio::time::Instant::now();
        let task = tokio::spawn(async move { player.play(1, &audio).await });
        tokio::time::sleep(Duration::from_millis(500)).await;
        sink.stop();
        task.await.unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_sink_skips_superseded_requests() {
        let sink = SilentSink::default();
        let audio = EncodedAudio::pcm16_mono(24_000, vec![0u8; 48_000]);
        let started = tokio::time::Instant::now();
        sink.play(2, &audio).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(1));

        sink.play(1, &audio).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn older_line_cannot_take_the_output_back() {
        let (newer, _newer_queue) = Sink::new_idle();
        let (older, _older_queue) = Sink::new_idle();
        let (newer, older) = (Arc::new(newer), Arc::new(older));
        let mut line = CurrentLine::default();

        assert!(line.claim(2, &newer));
        assert!(!line.claim(1, &older));
        assert!(line.sink.as_ref().is_some_and(|s| Arc::ptr_eq(s, &newer)));

        line.finish(&older);
        assert!(line.sink.is_some());
        line.finish(&newer);
        assert!(line.sink.is_none());
        assert!(!line.stop());
    }
}
