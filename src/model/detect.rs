//! Tool-call detection over model completions.
//!
//! Providers surface tool invocations in several shapes: a custom in-text
//! marker (`<<TOOL: name {json}>>`) or one of three vendor-native fields in
//! [`Completion::extra`]. Each shape gets its own detector; detectors are
//! tried in priority order and the first hit wins. Unparseable JSON anywhere
//! is a miss, not an error; the response is then delivered as-is.

use crate::model::Completion;
use crate::tools::ToolCallRequest;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// A detected tool call, plus the visible response with any in-text marker
/// stripped out.
#[derive(Debug, Clone)]
pub struct Detection {
    pub request: ToolCallRequest,
    /// Replacement for the visible response text; `None` leaves it unchanged.
    pub cleaned_content: Option<String>,
}

/// One way of recognizing a tool call in a completion.
pub trait ToolCallDetector: Send + Sync {
    fn name(&self) -> &'static str;
    fn detect(&self, completion: &Completion) -> Option<Detection>;
}

/// The detector stack in priority order: marker first, then the known
/// provider-native encodings. New providers register a new detector instead
/// of growing a conditional.
pub fn default_detectors() -> Vec<Box<dyn ToolCallDetector>> {
    vec![
        Box::new(MarkerDetector),
        Box::new(FunctionCallDetector),
        Box::new(ToolUseDetector),
        Box::new(ToolCallsArrayDetector),
    ]
}

/// Run the detectors in order; first match wins.
pub fn detect_tool_call(
    detectors: &[Box<dyn ToolCallDetector>],
    completion: &Completion,
) -> Option<Detection> {
    for detector in detectors {
        if let Some(detection) = detector.detect(completion) {
            debug!(
                detector = detector.name(),
                tool = %detection.request.tool,
                id = %detection.request.id,
                "tool call detected"
            );
            return Some(detection);
        }
    }
    None
}

/// Generate a correlation id when the provider did not supply one.
pub fn synthetic_call_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("call_{}", &hex[..24])
}

fn id_or_synthetic(value: Option<&JsonValue>) -> String {
    value
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(synthetic_call_id)
}

/// In-text marker: `<<TOOL: name {json-args}>>`, stripped from the visible
/// response on a hit.
pub struct MarkerDetector;

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<<TOOL:\s*(\w+)\s*(\{.*?\})>>").unwrap())
}

fn marker_strip_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<<TOOL:.*?>>").unwrap())
}

impl ToolCallDetector for MarkerDetector {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn detect(&self, completion: &Completion) -> Option<Detection> {
        if !completion.content.contains("<<TOOL:") {
            return None;
        }
        let captures = match marker_regex().captures(&completion.content) {
            Some(c) => c,
            None => {
                warn!("tool marker present but not in the expected format");
                return None;
            }
        };
        let tool = captures.get(1)?.as_str().to_string();
        let args: JsonValue = match serde_json::from_str(captures.get(2)?.as_str()) {
            Ok(args) => args,
            Err(e) => {
                warn!(error = %e, "tool marker args are not valid JSON, ignoring");
                return None;
            }
        };
        let cleaned = marker_strip_regex()
            .replace_all(&completion.content, "")
            .trim()
            .to_string();
        Some(Detection {
            request: ToolCallRequest::new(tool, args, synthetic_call_id()),
            cleaned_content: Some(cleaned),
        })
    }
}

/// Legacy OpenAI single `function_call` field with stringified arguments.
pub struct FunctionCallDetector;

impl ToolCallDetector for FunctionCallDetector {
    fn name(&self) -> &'static str {
        "function_call"
    }

    fn detect(&self, completion: &Completion) -> Option<Detection> {
        let call = completion.extra.get("function_call")?;
        let name = call.get("name")?.as_str()?;
        let args_str = call.get("arguments")?.as_str()?;
        let args: JsonValue = match serde_json::from_str(args_str) {
            Ok(args) => args,
            Err(e) => {
                warn!(error = %e, "function_call arguments are not valid JSON, ignoring");
                return None;
            }
        };
        let id = id_or_synthetic(call.get("id"));
        Some(Detection {
            request: ToolCallRequest::new(name, args, id),
            cleaned_content: None,
        })
    }
}

/// Anthropic-style `tool_use` block: arguments arrive as a JSON object.
pub struct ToolUseDetector;

impl ToolCallDetector for ToolUseDetector {
    fn name(&self) -> &'static str {
        "tool_use"
    }

    fn detect(&self, completion: &Completion) -> Option<Detection> {
        let block = completion.extra.get("tool_use")?;
        let name = block.get("name")?.as_str()?;
        let input = block.get("input")?.clone();
        if !input.is_object() {
            return None;
        }
        let id = id_or_synthetic(block.get("id"));
        Some(Detection {
            request: ToolCallRequest::new(name, input, id),
            cleaned_content: None,
        })
    }
}

/// `tool_calls` array, covering both the nested-function encoding
/// (`{"function": {"name", "arguments": "<json>"}}`) and the flat one
/// (`{"name", "args": {...}}`). Only the first element is considered.
pub struct ToolCallsArrayDetector;

impl ToolCallDetector for ToolCallsArrayDetector {
    fn name(&self) -> &'static str {
        "tool_calls"
    }

    fn detect(&self, completion: &Completion) -> Option<Detection> {
        let first = completion.extra.get("tool_calls")?.as_array()?.first()?;

        if let Some(function) = first.get("function").filter(|f| f.is_object()) {
            let name = function.get("name")?.as_str()?;
            let args_str = function.get("arguments").and_then(JsonValue::as_str).unwrap_or("{}");
            let args: JsonValue = match serde_json::from_str(args_str) {
                Ok(args) => args,
                Err(e) => {
                    warn!(error = %e, "tool_calls arguments are not valid JSON, ignoring");
                    return None;
                }
            };
            let id = id_or_synthetic(first.get("id"));
            return Some(Detection {
                request: ToolCallRequest::new(name, args, id),
                cleaned_content: None,
            });
        }

        let name = first.get("name")?.as_str()?;
        let args = first.get("args").cloned().unwrap_or_else(|| serde_json::json!({}));
        let id = id_or_synthetic(first.get("id"));
        Some(Detection {
            request: ToolCallRequest::new(name, args, id),
            cleaned_content: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detect(completion: &Completion) -> Option<Detection> {
        detect_tool_call(&default_detectors(), completion)
    }

    #[test]
    fn test_marker_detected_and_stripped() {
        let completion = Completion::text(
            "Let me look that up. <<TOOL: web_search {\"query\":\"x\"}>> One moment.",
        );
        let detection = detect(&completion).unwrap();
        assert_eq!(detection.request.tool, "web_search");
        assert_eq!(detection.request.args, json!({"query": "x"}));
        assert!(detection.request.id.starts_with("call_"));
        assert_eq!(
            detection.cleaned_content.as_deref(),
            Some("Let me look that up.  One moment.")
        );
    }

    #[test]
    fn test_marker_with_bad_json_is_a_miss() {
        let completion = Completion::text("<<TOOL: web_search {not json}>>");
        assert!(detect(&completion).is_none());
    }

    #[test]
    fn test_function_call_with_string_arguments() {
        let completion = Completion::with_extra(
            "",
            json!({"function_call": {"name": "web_search", "arguments": "{\"query\":\"rust\"}"}}),
        );
        let detection = detect(&completion).unwrap();
        assert_eq!(detection.request.tool, "web_search");
        assert_eq!(detection.request.args, json!({"query": "rust"}));
        assert!(detection.cleaned_content.is_none());
    }

    #[test]
    fn test_function_call_bad_json_falls_through() {
        let completion = Completion::with_extra(
            "",
            json!({"function_call": {"name": "web_search", "arguments": "{oops"}}),
        );
        assert!(detect(&completion).is_none());
    }

    #[test]
    fn test_tool_use_block() {
        let completion = Completion::with_extra(
            "",
            json!({"tool_use": {"name": "system_info", "input": {"field": "os"}, "id": "toolu_1"}}),
        );
        let detection = detect(&completion).unwrap();
        assert_eq!(detection.request.tool, "system_info");
        assert_eq!(detection.request.id, "toolu_1");
        assert_eq!(detection.request.args, json!({"field": "os"}));
    }

    #[test]
    fn test_tool_calls_nested_function_encoding() {
        let completion = Completion::with_extra(
            "",
            json!({"tool_calls": [{
                "id": "call_9",
                "function": {"name": "web_search", "arguments": "{\"query\":\"a\"}"}
            }]}),
        );
        let detection = detect(&completion).unwrap();
        assert_eq!(detection.request.tool, "web_search");
        assert_eq!(detection.request.id, "call_9");
    }

    #[test]
    fn test_tool_calls_flat_encoding_without_id() {
        let completion = Completion::with_extra(
            "",
            json!({"tool_calls": [{"name": "web_search", "args": {"query": "a"}}]}),
        );
        let detection = detect(&completion).unwrap();
        assert_eq!(detection.request.args, json!({"query": "a"}));
        assert!(detection.request.id.starts_with("call_"));
    }

    #[test]
    fn test_marker_takes_priority_over_native_fields() {
        let completion = Completion::with_extra(
            "<<TOOL: from_marker {\"a\":1}>>",
            json!({"tool_use": {"name": "from_native", "input": {}}}),
        );
        let detection = detect(&completion).unwrap();
        assert_eq!(detection.request.tool, "from_marker");
    }

    #[test]
    fn test_plain_completion_has_no_tool_call() {
        assert!(detect(&Completion::text("just an answer")).is_none());
    }

    #[test]
    fn test_synthetic_id_shape() {
        let id = synthetic_call_id();
        assert_eq!(id.len(), "call_".len() + 24);
        assert!(id.starts_with("call_"));
    }
}
