//! Gemini `generateContent` client: speech synthesis, appearance analysis, and replies.
//!
//! API key: `GEMINI_API_KEY` (or `API_KEY`) in `.env`, or `gemini.api_key` in the config file.

use super::GenerativeBackend;
use crate::appearance::{parse_appearance, UserAppearance};
use crate::config::{ExperienceConfig, GeminiConfig};
use crate::error::BackendError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reverie_voice::{
    AudioPayload, EncodedAudio, ImagePayload, TtsBackend, VoiceError, VoiceResult,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Gemini TTS answers with raw 16-bit PCM at this rate unless the MIME type says otherwise.
const TTS_SAMPLE_RATE: u32 = 24_000;

const APPEARANCE_PROMPT: &str = "Analyze the person in this image. Identify the dominant color of their skin, hair, and upper body clothing. Return ONLY a valid JSON object with keys: 'skinColor', 'hairColor', 'clothingColor' using Hex codes (e.g. #FFFFFF).";

/// Guide persona prompt for the reply; `{context}` is the chosen archetype's title.
const REPLY_PROMPT: &str = "你是一个处于虚空裂缝中的神秘向导（NPC）。
场景背景：用户之前选择了“{context}”作为他们心中的困扰。
你刚刚听到了用户关于这个困扰的语音倾诉。

任务：
1. 倾听用户的录音，理解他们的情绪和故事。
2. 给予一句深刻、治愈且富有哲理的回应（不要像普通客服）。
3. **重要**：在回应的最后，请描述用户在裂缝中的“方块模型/灵魂形态”发生了什么变化。告诉用户，因为他们的坦诚，他们的模型变得更加“精细”、“清晰”或“平滑”了。

输出要求：
- 语言：中文。
- 风格：神秘、空灵、甚至带一点点代码/数字化的隐喻。
- 篇幅：60字以内。
- 直接输出向导要说的话。";

pub fn reply_prompt(context: &str) -> String {
    REPLY_PROMPT.replace("{context}", context)
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    fn inline(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: BASE64.encode(bytes),
            }),
        }
    }
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .into_iter()
            .flat_map(|c| c.content.parts.iter())
    }

    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.parts()
            .filter_map(|p| p.text.as_deref())
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn inline_data(&self) -> Option<&InlineData> {
        self.parts().find_map(|p| p.inline_data.as_ref())
    }
}

fn tts_request(text: &str, voice: &str) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![Part::text(text.trim())],
        }],
        generation_config: Some(GenerationConfig {
            response_modalities: Some(vec!["AUDIO"]),
            speech_config: Some(serde_json::json!({
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
            })),
            response_mime_type: None,
            response_schema: None,
        }),
    }
}

fn appearance_request(image: &ImagePayload) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            parts: vec![
                Part::inline(&image.mime_type, &image.bytes),
                Part::text(APPEARANCE_PROMPT),
            ],
        }],
        generation_config: Some(GenerationConfig {
            response_modalities: None,
            speech_config: None,
            response_mime_type: Some("application/json"),
            response_schema: Some(serde_json::json!({
                "type": "OBJECT",
                "properties": {
                    "skinColor": { "type": "STRING" },
                    "hairColor": { "type": "STRING" },
                    "clothingColor": { "type": "STRING" }
                }
            })),
        }),
    }
}

fn reply_request(audio: &AudioPayload, context: &str) -> GenerateRequest {
    let mime = if audio.mime_type.is_empty() {
        "audio/wav"
    } else {
        audio.mime_type.as_str()
    };
    GenerateRequest {
        contents: vec![Content {
            parts: vec![Part::inline(mime, &audio.bytes), Part::text(reply_prompt(context))],
        }],
        generation_config: None,
    }
}

/// `audio/L16;codec=pcm;rate=24000` -> 24000.
fn sample_rate_from_mime(mime: &str) -> Option<u32> {
    mime.split(';')
        .filter_map(|p| p.trim().strip_prefix("rate="))
        .find_map(|r| r.parse().ok())
}

fn decode_speech(inline: &InlineData) -> Result<EncodedAudio, BackendError> {
    let bytes = BASE64
        .decode(inline.data.as_bytes())
        .map_err(|e| BackendError::Malformed(format!("audio payload: {}", e)))?;
    let mime = inline.mime_type.to_ascii_lowercase();
    if mime.starts_with("audio/l16") || mime.contains("pcm") {
        let rate = sample_rate_from_mime(&mime).unwrap_or(TTS_SAMPLE_RATE);
        Ok(EncodedAudio::pcm16_mono(rate, bytes))
    } else if mime.is_empty() {
        Ok(EncodedAudio::pcm16_mono(TTS_SAMPLE_RATE, bytes))
    } else {
        Ok(EncodedAudio::Container(bytes))
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    api_key: String,
    config: GeminiConfig,
    timeout: Duration,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Build from config, resolving the key from the environment when the file has none.
    /// Returns `None` when no key is available.
    pub fn from_config(config: &ExperienceConfig) -> Option<Self> {
        let key = config.gemini.resolve_api_key()?;
        Some(Self::new(
            key,
            config.gemini.clone(),
            config.timing.http_timeout(),
        ))
    }

    pub fn new(api_key: String, config: GeminiConfig, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: api_key.trim().to_string(),
            config,
            timeout,
            client,
        }
    }

    /// Per-request limit applied by the HTTP client.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            model
        )
    }

    async fn generate(
        &self,
        model: &str,
        body: &GenerateRequest,
    ) -> Result<GenerateResponse, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::MissingApiKey);
        }
        let res = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let raw = res.text().await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Synthesize one line. `Ok(None)` for blank text.
    pub async fn speech(&self, text: &str) -> Result<Option<EncodedAudio>, BackendError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let response = self
            .generate(&self.config.tts_model, &tts_request(text, &self.config.voice))
            .await?;
        let Some(inline) = response.inline_data() else {
            return Err(BackendError::EmptyResponse);
        };
        let audio = decode_speech(inline)?;
        debug!(chars = text.chars().count(), "Gemini speech synthesized");
        Ok(Some(audio))
    }
}

#[async_trait]
impl TtsBackend for GeminiClient {
    async fn synthesize(&self, text: &str) -> VoiceResult<Option<EncodedAudio>> {
        self.speech(text).await.map_err(|e| {
            warn!(error = %e, "Gemini TTS failed");
            VoiceError::Tts(e.to_string())
        })
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn analyze_appearance(
        &self,
        image: &ImagePayload,
    ) -> Result<UserAppearance, BackendError> {
        let response = self
            .generate(&self.config.vision_model, &appearance_request(image))
            .await?;
        let appearance = parse_appearance(&response.text())?;
        debug!(?appearance, "Gemini appearance analysis");
        Ok(appearance)
    }

    async fn generate_reply(
        &self,
        audio: &AudioPayload,
        context: &str,
    ) -> Result<String, BackendError> {
        let response = self
            .generate(&self.config.reply_model, &reply_request(audio, context))
            .await?;
        let text = response.text();
        if text.is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(text)
    }
}
