//! The fixed narrative: every line the guide speaks and the five problem archetypes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Spoken after the awakening, one per click.
pub const INTRO_LINES: [&str; 3] = [
    "你掉进来了……这里是云端的裂缝。",
    "在这里，所有的复杂都会化作光点。如果你找不到方向，心火就会逐渐熄灭。",
    "想要离开，你必须点亮那个代表你‘理想自我’的先祖。请回忆你现在的样子。我会把你的光影和声音刻在云里，作为路标。",
];

/// Spoken once the reflection has been built from the camera snapshot.
pub const MIRROR_LINES: [&str; 2] = [
    "看，这就是被裂缝剥离后的你。虽然有些模糊，但那是你灵魂最初的形状。",
    "试着触碰它。它正在感受你的心火。",
];

pub const TRANSITION_LINE: &str =
    "现在的光芒还太微弱，无法飞跃这片云海。只有找到心中最沉重的牵挂，愿望的力量才能带你离开。准备好了吗？";

pub const HEAVY_QUESTION: &str =
    "在云端，所有的重量都会变成坠落的理由。告诉我，此刻让你飞不起来的是什么？";

pub const CLOSING_LINE: &str =
    "记住这光芒的样子。即使在黑暗中，你的声音也能点亮前路。带着这份温暖，起飞吧。";

pub const PROCESSING_CAPTION: &str = "正在解析灵魂频率...";

/// Rotated while the appearance analysis runs.
pub const LOADING_CAPTIONS: [&str; 4] = [
    "正在点亮心火...",
    "收集星光...",
    "重构灵魂形状...",
    "唤醒先祖记忆...",
];

/// Used when the reply service answers with nothing.
pub const REPLY_EMPTY_FALLBACK: &str = "你的声音让数据的噪点平息了。看，你灵魂的轮廓正在变得清晰。";

/// Used when the reply service fails or times out.
pub const REPLY_ERROR_FALLBACK: &str =
    "我听到了。随着你的诉说，这里混乱的线条正在重新排列，你的形态变得更加完整了。";

/// Context label sent with the reply when no archetype was chosen.
pub const UNKNOWN_CONTEXT: &str = "未知";

pub const PERMISSION_NOTICE: &str = "需要权限才能继续 / Camera access required";

pub const RECORD_ACTION_LABEL: &str = "[ 记录现状 ]";
pub const RESTART_ACTION_LABEL: &str = "再 次 进 入";

/// The scripted pair spoken after an archetype is chosen, plus the label given to the reply service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProblemScript {
    pub title: &'static str,
    pub response: &'static str,
    pub question: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    Fog,
    Mask,
    Hourglass,
    Tangle,
    Custom,
}

impl ProblemKind {
    pub const ALL: [ProblemKind; 5] = [
        ProblemKind::Fog,
        ProblemKind::Mask,
        ProblemKind::Hourglass,
        ProblemKind::Tangle,
        ProblemKind::Custom,
    ];

    pub fn id(self) -> &'static str {
        match self {
            ProblemKind::Fog => "fog",
            ProblemKind::Mask => "mask",
            ProblemKind::Hourglass => "hourglass",
            ProblemKind::Tangle => "tangle",
            ProblemKind::Custom => "custom",
        }
    }

    pub fn script(self) -> ProblemScript {
        match self {
            ProblemKind::Fog => ProblemScript {
                title: "迷雾",
                response: "这里的雾气确实很重，但似乎你心里的雾比这更厚。",
                question: "你是因为眼前的选择太多而看不清路，还是觉得根本没有路可以选？试着描述一下这种‘看不见’的感觉。",
            },
            ProblemKind::Mask => ProblemScript {
                title: "面具",
                response: "戴着厚重的壳在云中行走，是很消耗心火的。",
                question: "在谁的面前，你觉得表演得最辛苦？如果现在可以彻底摘下它，你第一句想说的话会是什么？",
            },
            ProblemKind::Hourglass => ProblemScript {
                title: "漏斗",
                response: "云流在这里是静止的，但我听到了你心里时钟疯狂走动的声音。",
                question: "你是因为害怕落后于别人而焦虑，还是因为没能完成对自己许下的某个承诺？那个让你一直放不下的‘截止日期’是什么？",
            },
            ProblemKind::Tangle => ProblemScript {
                title: "乱麻",
                response: "你的频率很乱。太多的丝线缠绕在一起，让你无法呼吸了。",
                question: "如果这团乱麻里有一根‘主线’，你觉得它是关于‘不自信’，还是关于‘对未知的恐惧’？试着抓出那根线告诉我。",
            },
            ProblemKind::Custom => ProblemScript {
                title: "未知心事",
                response: "有些重量无法被归类，它们只能通过诉说来释放。",
                question: "我在听。请告诉我，此刻压在你心头的是什么？",
            },
        }
    }

    /// Text on the selection card.
    pub fn card_label(self) -> &'static str {
        match self {
            ProblemKind::Fog => "迷 雾",
            ProblemKind::Mask => "面 具",
            ProblemKind::Hourglass => "漏 斗",
            ProblemKind::Tangle => "乱 麻",
            ProblemKind::Custom => "我有话说",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            ProblemKind::Fog => "🌁",
            ProblemKind::Mask => "🎭",
            ProblemKind::Hourglass => "⏳",
            ProblemKind::Tangle => "🕸️",
            ProblemKind::Custom => "🗣️",
        }
    }

    /// First-person description shown while the card is hovered.
    pub fn description(self) -> &'static str {
        match self {
            ProblemKind::Fog => "我对未来毫无头绪，只有无尽的空白。",
            ProblemKind::Mask => "我疲于应对社交和期待，快要找不到真实的自己。",
            ProblemKind::Hourglass => "时间在飞逝，我却感觉被困在原地，一事无成。",
            ProblemKind::Tangle => "内耗和焦虑像杂草一样，占据了我所有的情绪。",
            ProblemKind::Custom => "并没有特定的形状，我只想说出此时此刻的感受。",
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProblemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ProblemKind::ALL
            .into_iter()
            .find(|kind| kind.id() == needle || kind.script().title == s.trim())
            .ok_or_else(|| {
                format!("unknown problem '{s}' (expected fog, mask, hourglass, tangle or custom)")
            })
    }
}

/// Context label for the reply service.
pub fn reply_context(selection: Option<ProblemKind>) -> &'static str {
    selection.map_or(UNKNOWN_CONTEXT, |kind| kind.script().title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_and_titles() {
        assert_eq!("Fog".parse::<ProblemKind>().unwrap(), ProblemKind::Fog);
        assert_eq!(" hourglass ".parse::<ProblemKind>().unwrap(), ProblemKind::Hourglass);
        assert_eq!("面具".parse::<ProblemKind>().unwrap(), ProblemKind::Mask);
        assert!("anger".parse::<ProblemKind>().is_err());
    }

    #[test]
    fn context_defaults_to_unknown() {
        assert_eq!(reply_context(None), UNKNOWN_CONTEXT);
        assert_eq!(reply_context(Some(ProblemKind::Tangle)), "乱麻");
    }
}
