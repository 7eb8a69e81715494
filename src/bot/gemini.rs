//! Gemini API client for answering student questions and images.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MODEL: &str = "gemini-2.5-flash";

const SYSTEM_INSTRUCTION: &str = "You are a helpful study assistant for university students. \
Answer concisely and clearly.";

/// Prompt used when a photo arrives without a caption.
pub const DEFAULT_IMAGE_PROMPT: &str = "Describe this image, point out anything useful to students, \
and suggest 5 possible exam-style questions about the content of the image.";

/// Something that can answer questions. Implemented by [`GeminiClient`].
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String, String>;

    async fn describe_image(
        &self,
        image: Vec<u8>,
        media_type: &str,
        question: &str,
    ) -> Result<String, String>;
}

pub struct GeminiClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest {
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self, String> {
        Self::with_base_url(api_key, GEMINI_API_URL.to_string())
    }

    /// Point the client at a different API root (proxies, tests).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn generate(&self, parts: Vec<Part>) -> Result<String, String> {
        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text {
                    text: SYSTEM_INSTRUCTION.to_string(),
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts,
            }],
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, MODEL);

        // Errors are logged and forwarded to the log chat; keep URLs out of them.
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {}", e.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {}", e.without_url()))?;

        debug!("Gemini response status: {status}");

        if !status.is_success() {
            return Err(format!("API error {status}: {body}"));
        }

        extract_text(&body)
    }
}

/// Pull the answer text out of a `generateContent` response body.
fn extract_text(body: &str) -> Result<String, String> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| format!("Failed to parse response: {e}"))?;

    if let Some(error) = parsed.error {
        return Err(format!("Gemini error: {}", error.message));
    }

    let candidates = parsed.candidates.ok_or("No candidates in response")?;
    let candidate = candidates.first().ok_or("Empty candidates array")?;
    let content = candidate
        .content
        .as_ref()
        .ok_or("No content in candidate")?;

    let text: String = content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect();

    if text.trim().is_empty() {
        return Err("No text in response".to_string());
    }
    Ok(text)
}

#[async_trait]
impl Assistant for GeminiClient {
    async fn ask(&self, question: &str) -> Result<String, String> {
        info!("🤖 Asking Gemini ({} chars)", question.len());
        self.generate(vec![Part::Text {
            text: question.to_string(),
        }])
        .await
    }

    async fn describe_image(
        &self,
        image: Vec<u8>,
        media_type: &str,
        question: &str,
    ) -> Result<String, String> {
        info!("🖼️ Sending image to Gemini ({} bytes, {})", image.len(), media_type);
        let data = base64::engine::general_purpose::STANDARD.encode(&image);
        self.generate(vec![
            Part::Text {
                text: question.to_string(),
            },
            Part::Inline {
                inline_data: InlineData {
                    mime_type: media_type.to_string(),
                    data,
                },
            },
        ])
        .await
    }
}
