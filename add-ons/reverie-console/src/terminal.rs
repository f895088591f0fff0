//! Line-oriented renderer: prints what changed since the last frame.

use reverie_core::script::{RECORD_ACTION_LABEL, RESTART_ACTION_LABEL};
use reverie_core::{ExperienceView, Phase, ProblemKind, RenderFrontend};
use reverie_voice::SpeechView;

#[derive(Default)]
pub struct TerminalFrontend {
    last: Option<ExperienceView>,
    last_speech: SpeechView,
}

impl TerminalFrontend {
    pub fn new() -> Self {
        Self::default()
    }

    fn phase_banner(view: &ExperienceView) {
        println!();
        println!("── {} ──", view.phase);
        match view.phase {
            Phase::Foggy => println!("SKY: REBORN · 重 塑 自 我   (wipe the screen to fly)"),
            Phase::ChoosingProblem => {
                for kind in ProblemKind::ALL {
                    println!("  {} {}  [choose {}]", kind.icon(), kind.card_label(), kind.id());
                }
            }
            Phase::ListeningToUser => println!("  (mic) hold nothing, type `mic` to start and again to stop"),
            _ => {}
        }
    }
}

impl RenderFrontend for TerminalFrontend {
    fn render(&mut self, view: &ExperienceView, speech: &SpeechView) {
        let previous = self.last.take();
        let changed_session = previous.as_ref().map(|p| p.session_id) != Some(view.session_id);
        let prev = previous.filter(|_| !changed_session);

        if prev.as_ref().map(|p| p.phase) != Some(view.phase) {
            Self::phase_banner(view);
        }
        if view.countdown != prev.as_ref().and_then(|p| p.countdown) {
            if let Some(n) = view.countdown {
                println!("      {}", n);
            }
        }
        if view.loading_caption != prev.as_ref().and_then(|p| p.loading_caption) {
            if let Some(caption) = view.loading_caption {
                println!("  … {}", caption);
            }
        }
        if view.appearance.is_some() && prev.as_ref().and_then(|p| p.appearance.as_ref()).is_none() {
            if let Some(a) = &view.appearance {
                println!(
                    "  avatar: skin {} · hair {} · clothing {}",
                    a.skin_color, a.hair_color, a.clothing_color
                );
            }
        }
        if view.hovered != prev.as_ref().and_then(|p| p.hovered) {
            if let Some(kind) = view.hovered {
                println!("  {} “{}”", kind.script().title, kind.description());
            }
        }
        if view.notice != prev.as_ref().and_then(|p| p.notice.clone()) {
            if let Some(notice) = &view.notice {
                println!("  ! {}", notice);
            }
        }
        if view.recording_voice != prev.as_ref().is_some_and(|p| p.recording_voice) {
            println!("  {}", if view.recording_voice { "● recording" } else { "■ stopped" });
        }
        if view.offers_record_action() && !prev.as_ref().is_some_and(|p| p.offers_record_action()) {
            println!("  {}  [record]", RECORD_ACTION_LABEL);
        }
        if view.offers_restart_action() && !prev.as_ref().is_some_and(|p| p.offers_restart_action()) {
            println!("  {}  [restart]", RESTART_ACTION_LABEL);
        }

        if speech.visible && (speech.text != self.last_speech.text || !self.last_speech.visible) {
            println!("  「{}」", speech.text);
        }
        if speech.awaiting_ack && !self.last_speech.awaiting_ack {
            println!("  (click to continue)");
        }

        self.last = Some(view.clone());
        self.last_speech = speech.clone();
    }
}
