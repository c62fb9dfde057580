//! Extracting and parsing the JSON payload out of a raw model response,
//! which may or may not be wrapped in a markdown code fence.

use serde::Deserialize;

/// Parses JSON from an LLM response, unwrapping a ` ```json ... ``` ` or
/// ` ``` ... ``` ` fence if present.
pub fn parse_json<T: for<'de> Deserialize<'de>>(text: &str) -> std::result::Result<T, serde_json::Error> {
  let json_str = extract_code_block(text).unwrap_or_else(|| text.trim());
  serde_json::from_str(json_str)
}

fn extract_code_block(text: &str) -> Option<&str> {
  let text = text.trim();
  if !text.starts_with("```") {
    return None;
  }
  let first_newline = text.find('\n')?;
  let after_fence = &text[first_newline + 1..];
  let end = after_fence.rfind("```")?;
  Some(after_fence[..end].trim())
}

/// Locates the outermost `{...}` object in `text`, tolerating leading/
/// trailing prose the model may have added around the JSON.
pub fn extract_outermost_object(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let mut depth = 0i32;
  for (offset, ch) in text[start..].char_indices() {
    match ch {
      '{' => depth += 1,
      '}' => {
        depth -= 1;
        if depth == 0 {
          return Some(&text[start..start + offset + 1]);
        }
      }
      _ => {}
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extracts_json_fenced_block() {
    let text = "```json\n{\"key\": \"value\"}\n```";
    assert_eq!(extract_code_block(text), Some(r#"{"key": "value"}"#));
  }

  #[test]
  fn extracts_plain_fenced_block() {
    let text = "```\n{\"key\": \"value\"}\n```";
    assert_eq!(extract_code_block(text), Some(r#"{"key": "value"}"#));
  }

  #[test]
  fn no_fence_returns_none() {
    assert_eq!(extract_code_block(r#"{"key": "value"}"#), None);
  }

  #[test]
  fn parse_json_handles_raw_and_fenced() {
    let raw: serde_json::Value = parse_json(r#"{"key": "value"}"#).unwrap();
    assert_eq!(raw["key"], "value");
    let fenced: serde_json::Value = parse_json("```json\n{\"key\": \"value\"}\n```").unwrap();
    assert_eq!(fenced["key"], "value");
  }

  #[test]
  fn outermost_object_ignores_surrounding_prose() {
    let text = "Sure, here you go:\n{\"a\": 1, \"b\": {\"c\": 2}}\nlet me know if you need anything else.";
    assert_eq!(extract_outermost_object(text), Some(r#"{"a": 1, "b": {"c": 2}}"#));
  }

  #[test]
  fn outermost_object_returns_none_when_unterminated() {
    assert_eq!(extract_outermost_object("{\"a\": 1"), None);
  }
}
