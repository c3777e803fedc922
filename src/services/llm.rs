//! OpenAI-style chat-completions client plus the backend seam the composer
//! and the tests plug into.

use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::models::{QualityReport, Usage};

/// Approximate gpt-4o-mini prices, dollars per million tokens.
const INPUT_COST_PER_MTOK: f64 = 0.15;
const OUTPUT_COST_PER_MTOK: f64 = 0.60;

const AUTHOR_SYSTEM_PROMPT: &str = "You are an experienced professional author. Your job is to produce high-quality text that is coherent and logical from start to finish, grammatically correct, natural to read, and well organized with an introduction, a development and a conclusion.\n\nCRITICAL COMPLETENESS RULES:\n1. ALWAYS end with a complete, grammatically correct sentence\n2. ALWAYS end with appropriate punctuation (period, exclamation mark or question mark)\n3. NEVER stop mid-sentence, mid-thought or on incomplete punctuation\n4. ALWAYS include a logical, satisfying conclusion\n5. The final sentence must close the thought naturally";

const ANALYST_SYSTEM_PROMPT: &str = "You are an expert text analyst. Analyze the provided text and rate:\n1. Logical and narrative coherence (0-100)\n2. Syntactic correctness (0-100)\n3. Flow and readability (0-100)\n4. Specific suggestions to improve the text\n\nRespond ONLY with valid JSON in the following format:\n{\"coherence\": number, \"syntax\": number, \"readability\": number, \"suggestions\": [\"suggestion1\", \"suggestion2\"]}";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("OPENAI_API_KEY not configured")]
    MissingApiKey,
    #[error("{message}")]
    Upstream { status: u16, message: String },
    #[error("generation request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("the model returned a malformed response")]
    MalformedReply,
}

/// One generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub context: Option<String>,
    pub max_tokens: Option<u32>,
}

/// What a generation call produced.
#[derive(Debug, Clone)]
pub struct GenerationReply {
    pub content: String,
    pub usage: Usage,
}

/// Seam between the composer and the actual text-generation endpoint.
pub trait GenerationBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReply, LlmError>;
}

pub struct LlmClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        LlmClient {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
        max_tokens: u32,
        json_only: bool,
    ) -> Result<GenerationReply, LlmError> {
        let Some(api_key) = &self.api_key else {
            return Err(LlmError::MissingApiKey);
        };

        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": temperature,
            "max_tokens": max_tokens,
        });
        if json_only {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let raw = response.text().await.unwrap_or_default();
            tracing::warn!(status, "upstream generation call failed");
            return Err(LlmError::Upstream {
                status,
                message: friendly_upstream_message(status, &raw),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|_| LlmError::MalformedReply)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let usage = parsed
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
                cost: (u.prompt_tokens as f64 / 1_000_000.0) * INPUT_COST_PER_MTOK
                    + (u.completion_tokens as f64 / 1_000_000.0) * OUTPUT_COST_PER_MTOK,
            })
            .unwrap_or_default();

        Ok(GenerationReply { content, usage })
    }

    /// Runs the quality-check analysis; the model is asked for strict JSON
    /// and anything else is reported as a malformed reply.
    pub async fn quality_check(&self, content: &str) -> Result<(QualityReport, Usage), LlmError> {
        let user = format!("Analyze this text:\n\n{content}");
        let reply = self.chat(ANALYST_SYSTEM_PROMPT, &user, 0.3, 1000, true).await?;
        let report: QualityReport =
            serde_json::from_str(&reply.content).map_err(|_| LlmError::MalformedReply)?;
        Ok((report, reply.usage))
    }
}

impl GenerationBackend for LlmClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReply, LlmError> {
        let user = match request.context.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(context) => format!(
                "Project context:\n{context}\n\nNew request: {}\n\nGenerate content that integrates naturally with the existing context, staying consistent with what was written before.",
                request.prompt
            ),
            None => request.prompt.clone(),
        };
        // Hard safety cap of 4000 tokens regardless of what the caller asks.
        let max_tokens = request.max_tokens.filter(|&t| t > 0).unwrap_or(2000).min(4000);
        self.chat(AUTHOR_SYSTEM_PROMPT, &user, 0.7, max_tokens, false)
            .await
    }
}

/// Maps the most common upstream failures onto messages a user can act on;
/// everything else is surfaced as-is (or a generic fallback when the body
/// is empty).
fn friendly_upstream_message(status: u16, raw: &str) -> String {
    if status == 401 || raw.contains("Unauthorized") {
        return "Invalid API key. Check the OPENAI_API_KEY configuration".to_string();
    }
    if raw.contains("insufficient_quota") {
        return "Insufficient credits. Top up your API account".to_string();
    }
    if status == 429 {
        return "Rate limit exceeded. Try again later".to_string();
    }
    if raw.trim().is_empty() {
        return "Error while generating content".to_string();
    }
    raw.trim().to_string()
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friendly_messages_for_common_failures() {
        assert!(friendly_upstream_message(401, "").contains("API key"));
        assert!(friendly_upstream_message(429, "{}").contains("Rate limit"));
        assert!(
            friendly_upstream_message(429, "insufficient_quota for project")
                .contains("Insufficient credits")
        );
        assert_eq!(
            friendly_upstream_message(500, "upstream exploded"),
            "upstream exploded"
        );
        assert_eq!(
            friendly_upstream_message(500, "  "),
            "Error while generating content"
        );
    }
}
