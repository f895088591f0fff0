//! # Reverie Voice - Media and Speech for the Reverie Experience
//!
//! Device access and narrated speech for a single experience session. The
//! capture gate owns the camera and microphone exclusively; the speech
//! coordinator plays one line at a time and lets the newest request win.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Reverie Voice                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ Still Camera │→ │ Capture Gate │← │  Microphone  │       │
//! │  │   (frame)    │  │ (exclusive)  │  │ (cpal, WAV)  │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! │                                                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ TTS Backend  │→ │   Speech     │→ │ Speech Sink  │       │
//! │  │  + cache     │  │ Coordinator  │  │   (rodio)    │       │
//! │  └──────────────┘  └──────┬───────┘  └──────────────┘       │
//! │                           ↓                                 │
//! │                    ┌──────────────┐  ┌──────────────┐       │
//! │                    │   Ack Gate   │  │   Ambient    │       │
//! │                    │ (user click) │  │ chime / bowl │       │
//! │                    └──────────────┘  └──────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod ack;
pub mod ambient;
pub mod audio;
pub mod camera;
pub mod capture;
pub mod error;
pub mod speech;
pub mod voice_output;

pub use ack::AckGate;
pub use ambient::{AmbientSounds, NullAmbient, RodioAmbient, Tone};
pub use audio::{encode_wav, CpalMicrophone};
pub use camera::{HostDevices, StillFrameCamera};
pub use capture::{AudioPayload, AudioTrack, CaptureGate, ImagePayload, MediaDevices, VideoTrack};
pub use error::{VoiceError, VoiceResult};
pub use speech::{SpeechCoordinator, SpeechOutcome, SpeechTiming, SpeechView};
pub use voice_output::{
    EncodedAudio, OutputDevice, PlaceholderTts, RodioSpeaker, SilentSink, SpeechSink, TtsBackend,
};
