//! The transcript owned by a session.

use super::message::{Message, MessageRole};
use crate::error::{ParleyError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound accepted for `temperature`.
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Resolves the provider name for a model identifier.
///
/// An explicit `provider/model` prefix wins; otherwise well-known model
/// families are mapped to their provider.
pub fn provider_for_model(model: &str) -> String {
    if let Some((provider, rest)) = model.split_once('/')
        && !provider.is_empty()
        && !rest.is_empty()
    {
        return provider.to_lowercase();
    }

    let lower = model.to_lowercase();
    let provider = if lower.starts_with("claude") {
        "anthropic"
    } else if lower.starts_with("gpt")
        || lower.starts_with("o1")
        || lower.starts_with("o3")
        || lower.starts_with("o4")
    {
        "openai"
    } else if lower.starts_with("gemini") {
        "google"
    } else if lower.starts_with("llama")
        || lower.starts_with("mistral")
        || lower.starts_with("qwen")
    {
        "ollama"
    } else {
        "unknown"
    };
    provider.to_string()
}

/// The ordered transcript of a session plus its generation settings.
///
/// `model` and `provider` are always set together through [`Conversation::set_model`].
/// The system prompt is never stored as a message; it is injected by
/// [`Conversation::history_for_generation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Mirrors the owning session's id
    pub id: String,
    pub model: String,
    pub provider: String,
    /// `None` means "use the backend default"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Creates an empty conversation for the given session id and model.
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        let model = model.into();
        Self {
            id: id.into(),
            provider: provider_for_model(&model),
            model,
            temperature: None,
            max_tokens: None,
            system_prompt: None,
            created: now,
            updated: now,
            messages: Vec::new(),
        }
    }

    /// Sets the model and derives the provider from it.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
        self.provider = provider_for_model(&self.model);
        self.updated = Utc::now();
    }

    /// Sets the sampling temperature; must lie in `[0.0, 2.0]`.
    pub fn set_temperature(&mut self, temperature: Option<f32>) -> Result<()> {
        if let Some(t) = temperature
            && !(0.0..=MAX_TEMPERATURE).contains(&t)
        {
            return Err(ParleyError::invalid_argument(format!(
                "temperature {} outside [0.0, {}]",
                t, MAX_TEMPERATURE
            )));
        }
        self.temperature = temperature;
        self.updated = Utc::now();
        Ok(())
    }

    /// Sets the completion token limit; zero is rejected.
    pub fn set_max_tokens(&mut self, max_tokens: Option<u32>) -> Result<()> {
        if max_tokens == Some(0) {
            return Err(ParleyError::invalid_argument("max_tokens must be > 0"));
        }
        self.max_tokens = max_tokens;
        self.updated = Utc::now();
        Ok(())
    }

    pub fn set_system_prompt(&mut self, prompt: Option<String>) {
        self.system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self.updated = Utc::now();
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.updated = Utc::now();
    }

    /// Clears the transcript. Settings are kept.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.updated = Utc::now();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The history handed to the generation backend, system prompt first.
    pub fn history_for_generation(&self) -> Vec<Message> {
        let mut history = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            let mut system = Message::new(MessageRole::System, prompt.clone());
            system.timestamp = self.created;
            history.push(system);
        }
        history.extend(self.messages.iter().cloned());
        history
    }
}
