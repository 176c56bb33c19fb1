//! Tool-call parsing: native function-call parts first, a restrictive
//! regex over `ACTION: tool(...)` lines as the fallback for providers
//! without native calling.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use zantara_llm::RawResponse;

use crate::{ToolArgs, ToolCall};

/// Extract a tool call from the provider's structured response parts.
pub fn parse_native_function_call(raw: &RawResponse) -> Option<ToolCall> {
    let call = raw.function_call()?;
    if call.name.is_empty() {
        warn!("native function call with empty tool name, ignoring");
        return None;
    }
    info!(tool = %call.name, "native function call detected");
    Some(ToolCall::new(call.name.clone(), call.args.clone()))
}

fn action_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ACTION:\s*(\w+)\((.*)\)").expect("valid action regex"))
}

/// Fallback parser for ReAct-style text. Intentionally restrictive:
/// single-level parentheses, `key=value` pairs or one quoted argument, no
/// nested JSON.
pub fn parse_tool_call_regex(text: &str) -> Option<ToolCall> {
    let captures = action_regex().captures(text)?;
    let tool_name = captures.get(1)?.as_str().to_string();
    let args_str = captures.get(2)?.as_str();

    let arguments = if args_str.contains('=') {
        let mut map = Map::new();
        for item in args_str.split(',') {
            let (key, value) = item.split_once('=')?;
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if key.is_empty() {
                return None;
            }
            map.insert(key.to_string(), coerce_scalar(value));
        }
        map
    } else {
        // Single bare argument: pick the parameter name by tool.
        let value = args_str.trim().trim_matches('"').trim_matches('\'');
        let mut map = Map::new();
        match tool_name.as_str() {
            "vector_search" | "web_search" => {
                map.insert("query".to_string(), Value::String(value.to_string()));
            }
            "calculator" => {
                map.insert("expression".to_string(), Value::String(value.to_string()));
            }
            _ => {}
        }
        map
    };

    debug!(tool = %tool_name, "regex fallback parsed tool call");
    Some(ToolCall::new(tool_name, arguments))
}

/// Universal parser: native first when a raw response is available, then
/// regex over the text.
pub fn parse_tool_call(raw: Option<&RawResponse>, text: &str) -> Option<ToolCall> {
    if let Some(raw) = raw {
        if let Some(call) = parse_native_function_call(raw) {
            return Some(call);
        }
    }
    parse_tool_call_regex(text)
}

/// Numbers stay numbers so `top_k=5` arrives as an integer.
fn coerce_scalar(value: &str) -> Value {
    if let Ok(int) = value.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Ok(float) = value.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    Value::String(value.to_string())
}

/// Convenience for tests and internal callers.
pub fn args_from(pairs: &[(&str, Value)]) -> ToolArgs {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use zantara_llm::{Candidate, FunctionCall, ResponsePart};

    fn raw_with_call(name: &str) -> RawResponse {
        let mut args = Map::new();
        args.insert("query".to_string(), json!("visa requirements"));
        RawResponse {
            candidates: vec![Candidate {
                parts: vec![
                    ResponsePart { text: Some("checking".to_string()), function_call: None },
                    ResponsePart {
                        text: None,
                        function_call: Some(FunctionCall { name: name.to_string(), args }),
                    },
                ],
            }],
        }
    }

    #[test]
    fn native_call_is_extracted() {
        let call = parse_native_function_call(&raw_with_call("vector_search")).unwrap();
        assert_eq!(call.tool_name, "vector_search");
        assert_eq!(call.arguments["query"], "visa requirements");
    }

    #[test]
    fn native_call_with_empty_name_is_ignored() {
        assert!(parse_native_function_call(&raw_with_call("")).is_none());
    }

    #[test]
    fn regex_parses_key_value_args() {
        let text = r#"THOUGHT: need docs
ACTION: vector_search(query="visa requirements", collection="visa_oracle", top_k=3)"#;
        let call = parse_tool_call_regex(text).unwrap();
        assert_eq!(call.tool_name, "vector_search");
        assert_eq!(call.arguments["query"], "visa requirements");
        assert_eq!(call.arguments["collection"], "visa_oracle");
        assert_eq!(call.arguments["top_k"], 3);
    }

    #[test]
    fn regex_maps_single_arg_to_query() {
        let call = parse_tool_call_regex(r#"ACTION: vector_search("kitas cost")"#).unwrap();
        assert_eq!(call.arguments["query"], "kitas cost");
    }

    #[test]
    fn regex_maps_single_arg_to_expression_for_calculator() {
        let call = parse_tool_call_regex(r#"ACTION: calculator("1000000 * 0.25")"#).unwrap();
        assert_eq!(call.arguments["expression"], "1000000 * 0.25");
    }

    #[test]
    fn regex_rejects_plain_text() {
        assert!(parse_tool_call_regex("Final Answer: the cost is Rp 12,500,000").is_none());
        assert!(parse_tool_call_regex("").is_none());
    }

    #[test]
    fn universal_parser_prefers_native() {
        let raw = raw_with_call("get_pricing");
        let text = r#"ACTION: calculator("1+1")"#;
        let call = parse_tool_call(Some(&raw), text).unwrap();
        assert_eq!(call.tool_name, "get_pricing");
    }

    #[test]
    fn universal_parser_falls_back_to_regex_without_raw() {
        let call = parse_tool_call(None, r#"ACTION: calculator("1+1")"#).unwrap();
        assert_eq!(call.tool_name, "calculator");
    }
}
