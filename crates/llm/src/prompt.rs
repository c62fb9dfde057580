//! Prompt template for span enrichment.

/// Context fed into the enrichment prompt for a single span.
pub struct EnrichmentContext<'a> {
  pub lang: &'a str,
  pub symbol: &'a str,
  pub file_path: &'a str,
  pub snippet: &'a str,
}

pub const ENRICHMENT_SCHEMA_VERSION: &str = "enrichment.v1";

/// Builds the prompt sent to the model for a single span. Demands JSON-only
/// output matching the enrichment schema.
pub fn build_enrichment_prompt(ctx: &EnrichmentContext) -> String {
  format!(
    r#"You are documenting a single code span for a developer-facing index.
Respond with JSON only, no prose, no markdown fences, matching exactly:

{{
  "summary_120w": "<=120 word summary of what this code does",
  "tags": ["short", "lowercase", "tags"],
  "evidence": [{{"field": "<name of another field in this object that this cites>", "lines": [<start line>, <end line>]}}],
  "inputs": ["parameters, arguments, or inputs this code depends on"],
  "outputs": ["return values or outputs this code produces"],
  "side_effects": ["I/O, mutation, or other effects outside its return value"],
  "pitfalls": ["gotchas a caller should know"],
  "usage_snippet": "a short example of how to call or use this"
}}

File: {file_path}
Language: {lang}
Symbol: {symbol}

```{lang}
{snippet}
```
"#,
    file_path = ctx.file_path,
    lang = ctx.lang,
    symbol = ctx.symbol,
    snippet = ctx.snippet,
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prompt_includes_schema_and_context() {
    let ctx = EnrichmentContext {
      lang: "rust",
      symbol: "parse_json",
      file_path: "src/json.rs",
      snippet: "fn parse_json() {}",
    };
    let prompt = build_enrichment_prompt(&ctx);
    assert!(prompt.contains("summary_120w"));
    assert!(prompt.contains("parse_json"));
    assert!(prompt.contains("src/json.rs"));
  }
}
