//! Stdin command parsing.

use reverie_core::ProblemKind;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Sweep the pointer across the next band of fog.
    Wipe,
    Click,
    Record,
    Choose(ProblemKind),
    Hover(Option<ProblemKind>),
    Mic,
    Restart,
    Help,
    Quit,
}

pub const HELP: &str = "commands: wipe | click | record | choose <fog|mask|hourglass|tangle|custom> | hover <kind|none> | mic | restart | help | quit";

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        let arg = words.next();
        match (verb.as_str(), arg) {
            ("wipe" | "w", _) => Ok(Command::Wipe),
            ("click" | "c" | "", _) => Ok(Command::Click),
            ("record", _) => Ok(Command::Record),
            ("choose", Some(kind)) => kind.parse().map(Command::Choose),
            ("choose", None) => Err("choose needs an archetype".to_string()),
            ("hover", None) | ("hover", Some("none")) => Ok(Command::Hover(None)),
            ("hover", Some(kind)) => kind.parse().map(|k| Command::Hover(Some(k))),
            ("mic" | "m", _) => Ok(Command::Mic),
            ("restart", _) => Ok(Command::Restart),
            ("help" | "?", _) => Ok(Command::Help),
            ("quit" | "exit" | "q", _) => Ok(Command::Quit),
            (other, _) => Err(format!("unknown command '{}'", other)),
        }
    }
}
