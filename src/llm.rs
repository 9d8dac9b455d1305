use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collab::Generator;
use crate::error::RefineError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Connection settings for [`LlmClient`].
///
/// Deserialises with every field optional; missing fields take the
/// [`Default`] values.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".into(),
            api_key: String::new(),
            model: "claude-3-5-sonnet-20241022".into(),
            max_tokens: 1024,
            timeout_secs: 60,
            temperature: None,
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl LlmConfig {
    /// Read `ANTHROPIC_API_KEY` (required), `ANTHROPIC_BASE_URL`,
    /// `REFINE_MODEL`, `REFINE_MAX_TOKENS` and `REFINE_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, RefineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RefineError> {
        let mut config = Self {
            api_key: lookup("ANTHROPIC_API_KEY")
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| RefineError::invalid("ANTHROPIC_API_KEY is not set"))?,
            ..Self::default()
        };

        if let Some(url) = lookup("ANTHROPIC_BASE_URL") {
            config.base_url = url;
        }
        if let Some(model) = lookup("REFINE_MODEL") {
            config.model = model;
        }
        if let Some(raw) = lookup("REFINE_MAX_TOKENS") {
            config.max_tokens = parse_var("REFINE_MAX_TOKENS", &raw)?;
        }
        if let Some(raw) = lookup("REFINE_TIMEOUT_SECS") {
            config.timeout_secs = parse_var("REFINE_TIMEOUT_SECS", &raw)?;
        }
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, RefineError> {
        serde_json::from_str(json).map_err(|e| RefineError::invalid(format!("llm config: {e}")))
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, RefineError> {
    raw.trim()
        .parse()
        .map_err(|_| RefineError::invalid(format!("{name}: not a number: '{raw}'")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token counts the API reports for a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ApiUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Blocking client for the Anthropic Messages API.
pub struct LlmClient {
    config: LlmConfig,
    agent: ureq::Agent,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();
        Self { config, agent }
    }

    pub fn from_env() -> Result<Self, RefineError> {
        Ok(Self::new(LlmConfig::from_env()?))
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Start a request. Chain turns, then [`send`](LlmRequest::send).
    pub fn request(&self) -> LlmRequest<'_> {
        LlmRequest {
            client: self,
            system: None,
            messages: vec![],
            max_tokens: None,
        }
    }
}

impl Generator for LlmClient {
    fn generate(&mut self, prompt: &str) -> Result<String, RefineError> {
        self.request().user(prompt).send()
    }
}

/// A pending Messages API call.
pub struct LlmRequest<'a> {
    client: &'a LlmClient,
    system: Option<String>,
    messages: Vec<Message>,
    max_tokens: Option<u32>,
}

impl LlmRequest<'_> {
    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.system = Some(text.into());
        self
    }

    pub fn user(mut self, text: impl Into<String>) -> Self {
        self.messages.push(Message::user(text));
        self
    }

    pub fn assistant(mut self, text: impl Into<String>) -> Self {
        self.messages.push(Message::assistant(text));
        self
    }

    /// Replay earlier turns, e.g. a running chat history.
    pub fn messages(mut self, history: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(history);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// The JSON body this request would send.
    pub fn body(&self) -> serde_json::Value {
        let config = &self.client.config;
        let mut body = serde_json::json!({
            "model": config.model,
            "max_tokens": self.max_tokens.unwrap_or(config.max_tokens),
            "messages": self.messages,
        });
        if let Some(system) = &self.system {
            body["system"] = serde_json::json!(system);
        }
        if let Some(temperature) = config.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        body
    }

    /// Send and return the concatenated text of the reply.
    pub fn send(self) -> Result<String, RefineError> {
        if self.messages.is_empty() {
            return Err(RefineError::invalid("request has no messages"));
        }

        let config = &self.client.config;
        let body = self.body();
        let raw = self
            .client
            .agent
            .post(config.messages_url())
            .header("x-api-key", config.api_key.as_str())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send_json(&body)?
            .body_mut()
            .read_to_string()?;

        let (text, usage) = parse_reply(&raw)?;
        if let Some(usage) = usage {
            debug!(
                model = %config.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "llm reply"
            );
        }
        Ok(text)
    }
}

fn parse_reply(raw: &str) -> Result<(String, Option<ApiUsage>), RefineError> {
    let reply: MessagesResponse = serde_json::from_str(raw)?;
    let text: String = reply
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();

    if text.is_empty() {
        return Err(RefineError::other("reply contained no text"));
    }
    Ok((text, reply.usage))
}
