//! OpenAI-compatible chat completions client
//!
//! Blocking `reqwest` client; the server runs it on the blocking pool.
//! Responses are requested in JSON mode and parsed by [`parse_enhancement`]
//! and [`parse_explanation`], which are pure and testable offline.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{
    EnhancedQuery, EnhancementContext, EnhancementError, ExplanationError, LlmError,
    QueryEnhancer, ResultExplainer, ResultExplanation, EXPLAIN_TOP_N,
};
use crate::models::QueryResult;

pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const ENHANCER_SYSTEM_PROMPT: &str = r#"You are a music discovery assistant. Analyze the user's search query and return JSON with these keys:
- "intent": what the user is looking for, in a few words
- "implicit_metadata": {"genre", "mood" (list), "era", "cultural_origin", "energy_level", "tempo"} inferred from the wording, null when unknown
- "enhanced_query": a richer search query using precise musical vocabulary
- "suggested_filters": {"genre_filter" (list), "mood_filter" (list), "tempo_range" ([min_bpm, max_bpm] or null), "cultural_origin_filter" (list)}
- "alternative_queries": 2-3 alternative phrasings
- "search_strategy": one of "broad", "targeted", "hybrid"
- "explanation": one sentence on how the query was interpreted
Only suggest filters the query clearly implies."#;

const EXPLAINER_SYSTEM_PROMPT: &str = r#"You are a music expert helping users understand search results. Explain why the tracks were retrieved for the query, what they have in common, how to listen to them, and how to explore further. Be concise and music-savvy."#;

/// Connection settings
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Minimal chat-completions client
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::NotConfigured("API key is empty".to_string()));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout.max(Duration::from_secs(1)))
            .build()
            .map_err(|e| LlmError::Request(format!("http client: {e}")))?;
        tracing::info!(model = %config.model, base_url = %config.base_url, "LLM client initialized");
        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// One JSON-mode completion, returning the message content
    pub fn chat_json(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": temperature,
            "max_tokens": max_tokens,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| LlmError::Request(format!("invalid response body: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

// ============================================================================
// ENHANCER
// ============================================================================

/// Query enhancer backed by a chat model
#[derive(Debug, Clone)]
pub struct OpenAiQueryEnhancer {
    client: OpenAiClient,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiQueryEnhancer {
    pub fn new(client: OpenAiClient) -> Self {
        Self {
            client,
            temperature: 0.3,
            max_tokens: 800,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

fn enhancement_prompt(query: &str, context: Option<&EnhancementContext>) -> String {
    let mut prompt = format!("User query: {query}");
    if let Some(context) = context {
        if !context.previous_queries.is_empty() {
            prompt.push_str("\n\nPrevious queries: ");
            prompt.push_str(&context.previous_queries.join("; "));
        }
        if !context.preferences.is_empty() {
            if let Ok(prefs) = serde_json::to_string(&context.preferences) {
                prompt.push_str("\n\nUser preferences: ");
                prompt.push_str(&prefs);
            }
        }
    }
    prompt
}

/// Parse a JSON enhancement response for `query`
pub fn parse_enhancement(query: &str, content: &str) -> Result<EnhancedQuery, EnhancementError> {
    let mut value: Value = serde_json::from_str(content)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("original_query".to_string(), Value::String(query.to_string()));
    }
    let mut enhanced: EnhancedQuery = serde_json::from_value(value)?;
    if enhanced.enhanced_query.trim().is_empty() {
        enhanced.enhanced_query = query.to_string();
    }
    Ok(enhanced)
}

impl QueryEnhancer for OpenAiQueryEnhancer {
    fn enhance(
        &self,
        query: &str,
        context: Option<&EnhancementContext>,
    ) -> Result<EnhancedQuery, EnhancementError> {
        let prompt = enhancement_prompt(query, context);
        let content = self.client.chat_json(
            ENHANCER_SYSTEM_PROMPT,
            &prompt,
            self.temperature,
            self.max_tokens,
        )?;
        let enhanced = parse_enhancement(query, &content)?;
        tracing::info!(query, enhanced = %enhanced.enhanced_query, "Query enhanced");
        Ok(enhanced)
    }
}

// ============================================================================
// EXPLAINER
// ============================================================================

/// Result explainer backed by a chat model
#[derive(Debug, Clone)]
pub struct OpenAiResultExplainer {
    client: OpenAiClient,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiResultExplainer {
    pub fn new(client: OpenAiClient) -> Self {
        Self {
            client,
            temperature: 0.7,
            max_tokens: 1000,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

fn result_line(result: &QueryResult) -> String {
    let item = &result.music_item;
    let meta = &item.metadata;
    let mut parts = vec![format!("Title: {}", item.title), format!("Artist: {}", item.artist)];
    if let Some(genre) = &meta.genre {
        parts.push(format!("Genre: {genre}"));
    }
    if !meta.mood.is_empty() {
        parts.push(format!("Mood: {}", meta.mood.join(", ")));
    }
    if let Some(tempo) = meta.tempo {
        parts.push(format!("Tempo: {tempo} BPM"));
    }
    if let Some(key) = &meta.key {
        parts.push(format!("Key: {key}"));
    }
    if let Some(era) = &meta.era {
        parts.push(format!("Era: {era}"));
    }
    parts.push(format!("Relevance Score: {:.3}", result.score));
    parts.join(" | ")
}

fn explanation_prompt(query: &str, results: &[QueryResult]) -> String {
    let top: Vec<String> = results
        .iter()
        .take(EXPLAIN_TOP_N)
        .enumerate()
        .map(|(i, r)| format!("{}. {}", i + 1, result_line(r)))
        .collect();
    format!(
        r#"Query: "{query}"

Top {n} Results:
{results}

Respond as JSON:
{{
  "summary": "what these results have in common (2-3 sentences)",
  "explanations": [{{"title": "track title", "explanation": "why it matches"}}],
  "listening_recommendations": "suggested order or groupings",
  "musical_insights": "keys, tempos, moods, cultural themes",
  "discovery_suggestions": ["suggestion"]
}}"#,
        n = top.len(),
        results = top.join("\n\n"),
    )
}

/// Parse a JSON explanation response
pub fn parse_explanation(content: &str) -> Result<ResultExplanation, ExplanationError> {
    Ok(serde_json::from_str(content)?)
}

impl ResultExplainer for OpenAiResultExplainer {
    fn explain(
        &self,
        query: &str,
        results: &[QueryResult],
    ) -> Result<ResultExplanation, ExplanationError> {
        let prompt = explanation_prompt(query, results);
        let content = self.client.chat_json(
            EXPLAINER_SYSTEM_PROMPT,
            &prompt,
            self.temperature,
            self.max_tokens,
        )?;
        let explanation = parse_explanation(&content)?;
        tracing::info!(query, results = results.len(), "Generated result explanation");
        Ok(explanation)
    }
}
