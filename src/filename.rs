//! Filename suggestion for saved responses.
//!
//! Builds a constrained prompt from the most recent user query plus the
//! head of the content, asks the model directly (no pipeline), and enforces
//! the extension implied by the last compose-mode language. Any failure
//! falls back to a timestamped name.

use crate::config::OrchestratorConfig;
use crate::model::{ChatModel, Turn};
use crate::prompts;
use chrono::Utc;
use tracing::warn;

/// How much of the content rides along in the suggestion prompt.
const CONTENT_HEAD_CHARS: usize = 500;

/// Map a detected fence language to a file extension.
pub fn extension_for(language: &str) -> Option<&'static str> {
    let ext = match language.to_lowercase().as_str() {
        "python" | "py" => ".py",
        "javascript" | "js" => ".js",
        "typescript" | "ts" => ".ts",
        "java" => ".java",
        "c" => ".c",
        "cpp" | "c++" => ".cpp",
        "csharp" | "c#" => ".cs",
        "go" => ".go",
        "rust" => ".rs",
        "ruby" => ".rb",
        "php" => ".php",
        "swift" => ".swift",
        "kotlin" => ".kt",
        "html" => ".html",
        "css" => ".css",
        "sql" => ".sql",
        "shell" | "bash" | "sh" => ".sh",
        "json" => ".json",
        "xml" => ".xml",
        "yaml" | "yml" => ".yaml",
        "markdown" | "md" => ".md",
        "text" | "plaintext" => ".txt",
        _ => return None,
    };
    Some(ext)
}

/// Timestamped fallback when the model cannot be asked.
pub fn fallback_filename(language: Option<&str>) -> String {
    let extension = language.and_then(extension_for).unwrap_or(".md");
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    format!("sidekick_response_{timestamp}{extension}")
}

/// Ask the model for a filename and sanitize the answer.
pub async fn suggest_filename(
    model: &dyn ChatModel,
    config: &OrchestratorConfig,
    recent_query: &str,
    content: &str,
    language: Option<&str>,
) -> String {
    let extension = language.and_then(extension_for).unwrap_or(".md");
    let extension_hint = match language {
        Some(language) if extension_for(language).is_some() => {
            format!("(use {extension} extension for this {language} code)")
        }
        _ => String::new(),
    };

    let content_head: String = content.chars().take(CONTENT_HEAD_CHARS).collect();
    let prompt = prompts::FILENAME_SUGGESTION_TEMPLATE
        .replace("{file_extension}", extension)
        .replace("{extension_hint}", &extension_hint)
        .replace("{recent_query}", recent_query)
        .replace("{content}", &content_head);

    let messages = [
        Turn::system(prompts::system_prompt(config.custom_instructions.as_deref())),
        Turn::user(prompt),
    ];

    match model.invoke(&messages).await {
        Ok(completion) => sanitize(&completion.content, extension),
        Err(e) => {
            warn!(error = %e, "filename suggestion failed, using fallback");
            fallback_filename(language)
        }
    }
}

/// Trim quoting and enforce the expected extension.
fn sanitize(raw: &str, extension: &str) -> String {
    let mut name = raw.trim().trim_matches(['"', '\'']).trim().to_string();
    if !name.ends_with(extension) {
        if let Some(stem) = name.split('.').next() {
            name = stem.to_string();
        }
        name.push_str(extension);
    }
    name
}
