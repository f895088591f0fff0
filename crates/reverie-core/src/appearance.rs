//! Visitor appearance derived from the camera snapshot.
//!
//! The analysis service answers with loosely-typed JSON. It is parsed into a
//! lenient wire struct and then into `UserAppearance`, whose fields are always
//! valid colours: anything missing or malformed takes that field's default.

use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `#RRGGBB`, upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(String);

impl HexColor {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Red, green, blue components.
    pub fn rgb(&self) -> (u8, u8, u8) {
        let channel = |i: usize| u8::from_str_radix(&self.0[i..i + 2], 16).unwrap_or(0);
        (channel(1), channel(3), channel(5))
    }
}

impl FromStr for HexColor {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let digits = raw.trim().trim_start_matches('#');
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("not a hex colour: {raw:?}"));
        }
        let expanded = match digits.len() {
            6 => digits.to_string(),
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            _ => return Err(format!("not a hex colour: {raw:?}")),
        };
        Ok(HexColor(format!("#{}", expanded.to_ascii_uppercase())))
    }
}

impl TryFrom<String> for HexColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HexColor> for String {
    fn from(value: HexColor) -> Self {
        value.0
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const DEFAULT_SKIN: &str = "#F5C396";
pub const DEFAULT_HAIR: &str = "#333333";
pub const DEFAULT_CLOTHING: &str = "#5DADE2";

fn fixed(hex: &str) -> HexColor {
    HexColor(hex.to_string())
}

/// Always fully populated; set once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAppearance {
    pub skin_color: HexColor,
    pub hair_color: HexColor,
    pub clothing_color: HexColor,
}

impl Default for UserAppearance {
    fn default() -> Self {
        Self {
            skin_color: fixed(DEFAULT_SKIN),
            hair_color: fixed(DEFAULT_HAIR),
            clothing_color: fixed(DEFAULT_CLOTHING),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppearanceWire {
    skin_color: Option<String>,
    hair_color: Option<String>,
    clothing_color: Option<String>,
}

fn or_default(raw: Option<String>, default: &str) -> HexColor {
    raw.and_then(|r| r.parse().ok()).unwrap_or_else(|| fixed(default))
}

impl From<AppearanceWire> for UserAppearance {
    fn from(wire: AppearanceWire) -> Self {
        Self {
            skin_color: or_default(wire.skin_color, DEFAULT_SKIN),
            hair_color: or_default(wire.hair_color, DEFAULT_HAIR),
            clothing_color: or_default(wire.clothing_color, DEFAULT_CLOTHING),
        }
    }
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.strip_suffix("```").unwrap_or(rest);
    let body = body.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    body.trim()
}

/// Parse the analysis service's text answer. Fails only when the text is not a JSON object.
pub fn parse_appearance(raw: &str) -> Result<UserAppearance, BackendError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(BackendError::EmptyResponse);
    }
    let wire: AppearanceWire = serde_json::from_str(body)?;
    Ok(wire.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_lower_case_colours_are_normalised() {
        let c: HexColor = "#abc".parse().unwrap();
        assert_eq!(c.as_str(), "#AABBCC");
        let c: HexColor = "5dade2".parse().unwrap();
        assert_eq!(c.as_str(), "#5DADE2");
        assert_eq!(c.rgb(), (0x5D, 0xAD, 0xE2));
        assert!("#12345".parse::<HexColor>().is_err());
        assert!("#GGGGGG".parse::<HexColor>().is_err());
    }

    #[test]
    fn fenced_json_is_accepted() {
        let raw = "```json\n{\"skinColor\":\"#E0AC69\",\"hairColor\":\"#1a1a1a\",\"clothingColor\":\"#FF0000\"}\n```";
        let appearance = parse_appearance(raw).unwrap();
        assert_eq!(appearance.skin_color.as_str(), "#E0AC69");
        assert_eq!(appearance.hair_color.as_str(), "#1A1A1A");
        assert_eq!(appearance.clothing_color.as_str(), "#FF0000");
    }

    #[test]
    fn bad_fields_take_their_own_default() {
        let appearance =
            parse_appearance(r##"{"skinColor":"tan","clothingColor":"#000000"}"##).unwrap();
        assert_eq!(appearance.skin_color.as_str(), DEFAULT_SKIN);
        assert_eq!(appearance.hair_color.as_str(), DEFAULT_HAIR);
        assert_eq!(appearance.clothing_color.as_str(), "#000000");
    }

    #[test]
    fn non_json_is_an_error() {
        assert!(matches!(
            parse_appearance("I cannot see anyone"),
            Err(BackendError::Malformed(_))
        ));
        assert!(matches!(parse_appearance("  "), Err(BackendError::EmptyResponse)));
    }
}
