//! # Reverie Core - Experience State Machine & Async Flow Controller
//!
//! Sequences the guided narrative: fog clearing, camera capture, appearance
//! analysis, the scripted dialogue, archetype choice, and the voice reply.
//! The engine consumes front-end events, runs the asynchronous steps as
//! cancelable tasks, and publishes state over `watch` channels.
//!
//! ```text
//! Foggy → Clearing → Awakened → Recording → Analyzing → Mirroring
//!       → Transitioning → Transformed → ChoosingProblem → NpcAskingDetail
//!       → ListeningToUser → ProcessingReply → Refining → Conclusion
//! ```

pub mod appearance;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod fog;
pub mod frontend;
pub mod phase;
pub mod script;
pub mod session;
pub mod timers;

pub use appearance::{parse_appearance, HexColor, UserAppearance};
pub use backend::{GeminiClient, GenerativeBackend, PlaceholderBackend};
pub use config::{
    DeviceConfig, ExperienceConfig, FogConfig, GeminiConfig, SpeechConfig, TimingConfig,
};
pub use engine::{Experience, ExperienceDeps, ExperienceEvent, ExperienceHandle};
pub use error::{BackendError, ExperienceError, ExperienceResult};
pub use fog::{cleared_fraction, FogMask, FogTracker};
pub use frontend::{drive_frontend, RenderFrontend};
pub use phase::Phase;
pub use script::{ProblemKind, ProblemScript};
pub use session::{ExperienceView, FogCheck, Session};
pub use timers::{poll_until, CaptionTicker, Countdown, PollOutcome, PollPolicy};
