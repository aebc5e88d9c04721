use serde::{Deserialize, Serialize};

use crate::constants::{MAX_CHAT_MESSAGES, MAX_COMPLETION_TOKENS, MAX_IMAGE_PROMPT_CHARS};
use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.messages.is_empty() {
            return Err(ValidationError::EmptyMessages);
        }
        if self.messages.len() > MAX_CHAT_MESSAGES {
            return Err(ValidationError::TooManyMessages {
                count: self.messages.len(),
                max: MAX_CHAT_MESSAGES,
            });
        }
        if let Some(index) = self
            .messages
            .iter()
            .position(|m| m.content.trim().is_empty())
        {
            return Err(ValidationError::EmptyMessageContent { index });
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ValidationError::TemperatureOutOfRange(t));
            }
        }
        if let Some(value) = self.max_tokens {
            if value == 0 || value > MAX_COMPLETION_TOKENS {
                return Err(ValidationError::MaxTokensOutOfRange {
                    value,
                    max: MAX_COMPLETION_TOKENS,
                });
            }
        }
        Ok(())
    }

    pub fn has_system_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == ChatRole::System)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub message: ChatMessage,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub owned_by: String,
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1024x1024")]
    Square,
    #[serde(rename = "1792x1024")]
    Landscape,
    #[serde(rename = "1024x1792")]
    Portrait,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    #[default]
    Standard,
    Hd,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStyle {
    #[default]
    Vivid,
    Natural,
}

/// Body of `POST /api/images/generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub size: ImageSize,
    #[serde(default)]
    pub quality: ImageQuality,
    #[serde(default)]
    pub style: ImageStyle,
    /// Owner of the library entry created for the image, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ImageGenerationRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        let len = prompt.chars().count();
        if len > MAX_IMAGE_PROMPT_CHARS {
            return Err(ValidationError::PromptTooLong {
                len,
                max: MAX_IMAGE_PROMPT_CHARS,
            });
        }
        if matches!(&self.user_id, Some(id) if id.trim().is_empty()) {
            return Err(ValidationError::BlankUserId);
        }
        Ok(())
    }

    /// Title for the library entry: the explicit title, else the prompt cut
    /// to 60 characters.
    pub fn library_title(&self) -> String {
        match &self.title {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => {
                let prompt = self.prompt.trim();
                if prompt.chars().count() > 60 {
                    let cut: String = prompt.chars().take(57).collect();
                    format!("{cut}...")
                } else {
                    prompt.to_string()
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
    /// Id of the `library_materials` record, when one was saved.
    pub library_id: Option<String>,
}
