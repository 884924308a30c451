//! Model boundary: conversation turns, completions, and the collaborator
//! traits the orchestrator invokes models through.
//!
//! Concrete providers live outside this crate. They implement [`ChatModel`]
//! (one model handle) and [`ModelFactory`] (handle construction from a model
//! id), and surface any native tool-call data through [`Completion::extra`]
//! so the detectors in [`detect`] can find it.

pub mod detect;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Content of a user turn: plain text or multimodal blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl UserContent {
    /// Text portion of the content (first text block for multimodal turns).
    pub fn text(&self) -> &str {
        match self {
            UserContent::Text(text) => text,
            UserContent::Blocks(blocks) => blocks
                .iter()
                .find_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .unwrap_or(""),
        }
    }
}

/// One block of a multimodal user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One message in a conversation sent to or received from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    System {
        content: String,
    },
    User {
        content: UserContent,
    },
    Assistant {
        content: String,
    },
    ToolResult {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
    },
}

impl Turn {
    /// Create a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Create a plain-text user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: UserContent::Text(content.into()),
        }
    }

    /// Create a multimodal user turn from content blocks.
    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::User {
            content: UserContent::Blocks(blocks),
        }
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
        }
    }

    /// Create a tool-result turn carrying the model's correlation id.
    pub fn tool_result(content: impl Into<String>, tool_call_id: Option<String>) -> Self {
        Self::ToolResult {
            content: content.into(),
            tool_call_id,
        }
    }

    /// Text content of the turn, whatever the variant.
    pub fn text(&self) -> &str {
        match self {
            Turn::System { content } | Turn::Assistant { content } => content,
            Turn::User { content } => content.text(),
            Turn::ToolResult { content, .. } => content,
        }
    }
}

/// A finished model response.
///
/// `extra` carries whatever provider-native structure came back alongside the
/// text (function-call fields, tool_use blocks, a tool_calls array); the
/// tool-call detectors inspect it without this crate knowing the vendor shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl Completion {
    /// A text-only completion with no provider extras.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            extra: serde_json::Value::Null,
        }
    }

    /// A completion with provider-native extra fields attached.
    pub fn with_extra(content: impl Into<String>, extra: serde_json::Value) -> Self {
        Self {
            content: content.into(),
            extra,
        }
    }
}

/// One element of a streamed response.
#[derive(Debug, Clone)]
pub enum Chunk {
    /// Incremental content.
    Delta(String),
    /// Terminal chunk: the assembled completion, extras included.
    Final(Completion),
}

/// Streamed response: content deltas followed by a final completion.
pub type ChunkStream = BoxStream<'static, Result<Chunk, ModelError>>;

/// Errors crossing the model boundary.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no model configured")]
    NotConfigured,

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("provider error: {0}")]
    Provider(String),
}

impl ModelError {
    /// Map the error to the string shown to the user in place of a response.
    ///
    /// Provider messages are classified by the substrings the upstream SDKs
    /// put in their error text; anything unrecognized falls through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            ModelError::NotConfigured => {
                "⚠️ Failed to initialize default model. Please check settings.".to_string()
            }
            ModelError::UnknownModel(_) => {
                "⚠️ Failed to initialize the requested model. Please check settings.".to_string()
            }
            ModelError::Auth(_) => {
                "⚠️ Error: Invalid API key. Please check your API key in settings.".to_string()
            }
            ModelError::Provider(msg) => classify_provider_message(msg),
        }
    }
}

/// Classify a raw provider error message into a user-facing response string.
pub fn classify_provider_message(msg: &str) -> String {
    let lower = msg.to_lowercase();
    if msg.contains("NotFoundError") && msg.contains("does not exist") {
        "⚠️ Error: The selected model is not available. Please check the model ID in settings."
            .to_string()
    } else if msg.contains("AuthenticationError") || lower.contains("api_key") {
        "⚠️ Error: Invalid API key. Please check your API key in settings.".to_string()
    } else if msg.contains("RateLimitError") {
        "⚠️ Error: Rate limit exceeded. Please try again in a moment.".to_string()
    } else if msg.contains("InvalidRequestError") {
        "⚠️ Error: Invalid request. Please try again with different input.".to_string()
    } else if msg.contains("ServiceUnavailableError") {
        "⚠️ Error: Service is currently unavailable. Please try again later.".to_string()
    } else if msg.contains("ConnectionError") || msg.contains("Connection refused") {
        "⚠️ Error: Could not connect to the API server. Please check your internet connection and the base URL in settings."
            .to_string()
    } else {
        format!("⚠️ Error: {msg}")
    }
}

/// One model handle: a configured connection to a specific model id.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Identifier of the model this handle talks to.
    fn model_id(&self) -> &str;

    /// Single-shot completion.
    async fn invoke(&self, turns: &[Turn]) -> Result<Completion, ModelError>;

    /// Streaming completion. The default implementation degrades to a
    /// single-shot invoke emitted as one delta plus the final chunk, for
    /// providers without a native streaming API.
    async fn stream(&self, turns: &[Turn]) -> Result<ChunkStream, ModelError> {
        let completion = self.invoke(turns).await?;
        let delta = Chunk::Delta(completion.content.clone());
        let chunks = vec![Ok::<_, ModelError>(delta), Ok(Chunk::Final(completion))];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Constructs model handles from model ids.
///
/// `None` asks for the configured default model; `temperature` is baked
/// into the handle at construction. Construction failures (missing
/// credentials, unknown id) come back as [`ModelError`] and are folded
/// into a user-visible response string by the orchestrator; they never
/// abort the pipeline.
pub trait ModelFactory: Send + Sync {
    fn create(
        &self,
        model_id: Option<&str>,
        temperature: f32,
    ) -> Result<Arc<dyn ChatModel>, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_serialization_round_trip() {
        let turns = vec![
            Turn::system("base"),
            Turn::user("hello"),
            Turn::assistant("hi"),
            Turn::tool_result("data", Some("call_1".into())),
        ];
        let json = serde_json::to_string(&turns).unwrap();
        let back: Vec<Turn> = serde_json::from_str(&json).unwrap();
        assert_eq!(turns, back);
    }

    #[test]
    fn test_multimodal_user_content_text_accessor() {
        let turn = Turn::user_blocks(vec![
            ContentBlock::Text {
                text: "what is this?".into(),
            },
            ContentBlock::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/png;base64,AAAA".into(),
                },
            },
        ]);
        assert_eq!(turn.text(), "what is this?");
    }

    #[test]
    fn test_user_content_untagged_round_trip() {
        let text = Turn::user("plain");
        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json["content"], "plain");

        let blocks = Turn::user_blocks(vec![ContentBlock::Text { text: "t".into() }]);
        let json = serde_json::to_value(&blocks).unwrap();
        assert!(json["content"].is_array());
        let back: Turn = serde_json::from_value(json).unwrap();
        assert_eq!(back, blocks);
    }

    #[test]
    fn test_classify_auth_error() {
        let msg = classify_provider_message("AuthenticationError: bad key");
        assert!(msg.contains("Invalid API key"));
        let msg = classify_provider_message("missing api_key in request");
        assert!(msg.contains("Invalid API key"));
    }

    #[test]
    fn test_classify_rate_limit() {
        let msg = classify_provider_message("RateLimitError: slow down");
        assert!(msg.contains("Rate limit exceeded"));
    }

    #[test]
    fn test_classify_connection_refused() {
        let msg = classify_provider_message("Connection refused by host");
        assert!(msg.contains("Could not connect"));
    }

    #[test]
    fn test_classify_unknown_falls_through() {
        let msg = classify_provider_message("something odd");
        assert_eq!(msg, "⚠️ Error: something odd");
    }

    #[test]
    fn test_default_stream_degrades_to_invoke() {
        use futures::StreamExt;

        struct Fixed;

        #[async_trait]
        impl ChatModel for Fixed {
            fn model_id(&self) -> &str {
                "fixed"
            }
            async fn invoke(&self, _turns: &[Turn]) -> Result<Completion, ModelError> {
                Ok(Completion::text("whole response"))
            }
        }

        tokio_test::block_on(async {
            let mut stream = Fixed.stream(&[Turn::user("q")]).await.unwrap();
            let first = stream.next().await.unwrap().unwrap();
            match first {
                Chunk::Delta(text) => assert_eq!(text, "whole response"),
                _ => panic!("expected delta first"),
            }
            let last = stream.next().await.unwrap().unwrap();
            match last {
                Chunk::Final(completion) => assert_eq!(completion.content, "whole response"),
                _ => panic!("expected final chunk"),
            }
            assert!(stream.next().await.is_none());
        });
    }
}
