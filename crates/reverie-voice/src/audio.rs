//! Microphone capture using CPAL, encoded to WAV with hound.
//!
//! The cpal `Stream` is not `Send` on every platform, so each recording owns a
//! dedicated thread that builds the stream, keeps it alive until told to stop,
//! and drops it on exit. Samples are downmixed to mono as they arrive.

use crate::capture::{AudioPayload, AudioTrack};
use crate::error::{VoiceError, VoiceResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, StreamConfig};
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{info, warn};

/// Encode mono f32 PCM (-1.0..1.0) as a 16-bit WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> VoiceResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32).round() as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

struct RecordingWorker {
    stop_tx: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
    samples: Arc<Mutex<Vec<f32>>>,
}

impl RecordingWorker {
    fn shutdown(self) -> Vec<f32> {
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            warn!("Microphone: capture thread panicked");
        }
        std::mem::take(&mut *self.samples.lock())
    }
}

/// Default-input microphone. Opening it checks that a device exists; the stream
/// itself only runs between `begin` and `finish`.
pub struct CpalMicrophone {
    device: Device,
    stream_config: StreamConfig,
    worker: Option<RecordingWorker>,
}

impl CpalMicrophone {
    /// Open the default input device. A missing device is reported as a permission failure,
    /// which is how the host surfaces a refused or absent microphone.
    pub fn open_default() -> VoiceResult<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::PermissionDenied("no input device available".to_string()))?;

        info!(
            "Microphone: using input device {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let stream_config: StreamConfig = device.default_input_config()?.into();
        Ok(Self {
            device,
            stream_config,
            worker: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.stream_config.sample_rate.0
    }

    /// List available input devices
    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices()?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

impl AudioTrack for CpalMicrophone {
    fn begin(&mut self) -> VoiceResult<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let samples = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<VoiceResult<()>>();

        let device = self.device.clone();
        let config = self.stream_config.clone();
        let channels = usize::from(config.channels.max(1));
        let sink = Arc::clone(&samples);

        let handle = thread::spawn(move || {
            let stream = device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut buffer = sink.lock();
                    for frame in data.chunks(channels) {
                        buffer.push(frame.iter().sum::<f32>() / frame.len() as f32);
                    }
                },
                move |err| {
                    warn!("Microphone stream error: {}", err);
                },
                None,
            );
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(e.into()));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            // Blocks until `shutdown` sends or the sender is dropped.
            let _ = stop_rx.recv();
            drop(stream);
        });

        ready_rx
            .recv()
            .map_err(|_| VoiceError::AudioStream("capture thread exited before starting".to_string()))??;

        info!("Microphone: capture started ({} Hz)", self.sample_rate());
        self.worker = Some(RecordingWorker {
            stop_tx,
            handle,
            samples,
        });
        Ok(())
    }

    fn finish(&mut self) -> VoiceResult<AudioPayload> {
        let worker = self
            .worker
            .take()
            .ok_or_else(|| VoiceError::CaptureNotReady("microphone is not recording".to_string()))?;
        let samples = worker.shutdown();
        info!("Microphone: captured {} samples", samples.len());
        Ok(AudioPayload::wav(encode_wav(&samples, self.sample_rate())?))
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}
