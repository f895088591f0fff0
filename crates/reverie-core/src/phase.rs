//! The narrative phase and its transition table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exactly one phase is active per session. Ordered by narrative progression only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Foggy,
    Clearing,
    Awakened,
    Recording,
    Analyzing,
    Mirroring,
    Transitioning,
    Transformed,
    ChoosingProblem,
    NpcAskingDetail,
    ListeningToUser,
    ProcessingReply,
    Refining,
    Conclusion,
}

impl Phase {
    pub const INITIAL: Phase = Phase::Foggy;

    pub const ALL: [Phase; 14] = [
        Phase::Foggy,
        Phase::Clearing,
        Phase::Awakened,
        Phase::Recording,
        Phase::Analyzing,
        Phase::Mirroring,
        Phase::Transitioning,
        Phase::Transformed,
        Phase::ChoosingProblem,
        Phase::NpcAskingDetail,
        Phase::ListeningToUser,
        Phase::ProcessingReply,
        Phase::Refining,
        Phase::Conclusion,
    ];

    /// Whether the table allows moving from `self` to `next`.
    ///
    /// Besides the forward edges, two recoverable edges exist:
    /// `Recording -> Recording` (capture retry) and `Analyzing -> Mirroring`
    /// (which is also the forward edge, taken on success or failure alike).
    /// `Conclusion` is terminal; a restart builds a fresh session instead.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Foggy, Clearing)
                | (Clearing, Awakened)
                | (Awakened, Recording)
                | (Recording, Recording)
                | (Recording, Analyzing)
                | (Analyzing, Mirroring)
                | (Mirroring, Transitioning)
                | (Transitioning, Transformed)
                | (Transformed, ChoosingProblem)
                | (ChoosingProblem, NpcAskingDetail)
                | (NpcAskingDetail, ListeningToUser)
                | (ListeningToUser, ProcessingReply)
                | (ProcessingReply, Refining)
                | (Refining, Conclusion)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Conclusion
    }

    /// The fog overlay is drawn and accepts wipes.
    pub fn is_fog_active(self) -> bool {
        matches!(self, Phase::Foggy | Phase::Clearing)
    }

    /// The camera feed is held open.
    pub fn is_camera_active(self) -> bool {
        matches!(self, Phase::Recording | Phase::Analyzing)
    }

    /// Clicks advance dialogue rather than being ignored.
    pub fn accepts_dialogue_clicks(self) -> bool {
        !matches!(self, Phase::Foggy | Phase::Clearing | Phase::Recording)
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Foggy => "foggy",
            Phase::Clearing => "clearing",
            Phase::Awakened => "awakened",
            Phase::Recording => "recording",
            Phase::Analyzing => "analyzing",
            Phase::Mirroring => "mirroring",
            Phase::Transitioning => "transitioning",
            Phase::Transformed => "transformed",
            Phase::ChoosingProblem => "choosing_problem",
            Phase::NpcAskingDetail => "npc_asking_detail",
            Phase::ListeningToUser => "listening_to_user",
            Phase::ProcessingReply => "processing_reply",
            Phase::Refining => "refining",
            Phase::Conclusion => "conclusion",
        }
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::INITIAL
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_a_legal_chain() {
        let path = [
            Phase::Foggy,
            Phase::Clearing,
            Phase::Awakened,
            Phase::Recording,
            Phase::Analyzing,
            Phase::Mirroring,
            Phase::Transitioning,
            Phase::Transformed,
            Phase::ChoosingProblem,
            Phase::NpcAskingDetail,
            Phase::ListeningToUser,
            Phase::ProcessingReply,
            Phase::Refining,
            Phase::Conclusion,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn no_skipping_required_intermediates() {
        assert!(!Phase::Recording.can_transition_to(Phase::Mirroring));
        assert!(!Phase::Foggy.can_transition_to(Phase::Awakened));
        assert!(!Phase::ChoosingProblem.can_transition_to(Phase::ListeningToUser));
        assert!(!Phase::ListeningToUser.can_transition_to(Phase::Refining));
    }

    #[test]
    fn conclusion_is_terminal() {
        assert!(Phase::Conclusion.is_terminal());
        for next in Phase::ALL {
            assert!(!Phase::Conclusion.can_transition_to(next));
        }
    }

    #[test]
    fn only_capture_may_repeat() {
        for phase in Phase::ALL {
            assert_eq!(phase.can_transition_to(phase), phase == Phase::Recording);
        }
    }
}
