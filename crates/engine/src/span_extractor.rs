//! Turns a file's bytes into a list of span candidates ready for
//! `replace_spans`. Full language parsing is an external collaborator (see
//! module docs); `LineHeuristicExtractor` is the built-in fallback used when
//! no richer extractor is configured, and is what the test suite and `tick`
//! dry-runs exercise end to end.

use std::path::Path;

/// One candidate span pulled out of a file, prior to hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanCandidate {
  pub symbol: String,
  pub kind: String,
  pub start_line: u32,
  pub end_line: u32,
  pub byte_start: u64,
  pub byte_end: u64,
}

/// Extracts spans from a single file's contents. The richer tree-sitter-based
/// implementation this crate defers to in production implements this trait;
/// `LineHeuristicExtractor` below is the built-in, dependency-free default.
pub trait SpanExtractor: Send + Sync {
  fn extract(&self, path: &Path, lang: &str, bytes: &[u8]) -> Vec<SpanCandidate>;
}

/// Line-prefix boundary detection for a handful of common languages, falling
/// back to whole-file-as-one-span when nothing matches or the language is
/// unrecognized. Not a substitute for real parsing, but a span per top-level
/// definition is enough to drive enrichment/embedding end to end.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineHeuristicExtractor;

impl SpanExtractor for LineHeuristicExtractor {
  fn extract(&self, path: &Path, lang: &str, bytes: &[u8]) -> Vec<SpanCandidate> {
    let source = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() {
      return Vec::new();
    }

    let boundaries = find_boundaries(&lines, lang);
    if boundaries.is_empty() {
      return vec![whole_file_span(&source, path, lang)];
    }

    let mut spans = Vec::with_capacity(boundaries.len());
    let line_offsets = line_byte_offsets(&source);
    for (idx, &start) in boundaries.iter().enumerate() {
      let end = boundaries.get(idx + 1).copied().unwrap_or(lines.len());
      let symbol = extract_symbol_from_line(lines[start], lang).unwrap_or_else(|| format!("span_{}", start + 1));
      let kind = determine_kind(lines[start], lang);
      spans.push(SpanCandidate {
        symbol,
        kind,
        start_line: (start + 1) as u32,
        end_line: end as u32,
        byte_start: line_offsets[start],
        byte_end: line_offsets.get(end).copied().unwrap_or(bytes.len() as u64),
      });
    }
    spans
  }
}

/// Byte offset of the start of each line, plus one trailing entry for the
/// end of the file, so `byte_end` for the last span is never out of range.
fn line_byte_offsets(source: &str) -> Vec<u64> {
  let mut offsets = Vec::new();
  let mut pos = 0u64;
  for line in source.lines() {
    offsets.push(pos);
    pos += line.len() as u64 + 1;
  }
  offsets.push(source.len() as u64);
  offsets
}

fn whole_file_span(source: &str, path: &Path, lang: &str) -> SpanCandidate {
  let symbol = path
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or("file")
    .to_string();
  SpanCandidate {
    symbol,
    kind: determine_kind(source, lang),
    start_line: 1,
    end_line: source.lines().count().max(1) as u32,
    byte_start: 0,
    byte_end: source.len() as u64,
  }
}

fn find_boundaries(lines: &[&str], lang: &str) -> Vec<usize> {
  let mut boundaries = Vec::new();
  for (i, line) in lines.iter().enumerate() {
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }
    if is_boundary_line(trimmed, lang) {
      boundaries.push(i);
    }
  }
  boundaries
}

fn is_boundary_line(trimmed: &str, lang: &str) -> bool {
  match lang {
    "rust" => {
      trimmed.starts_with("pub fn ")
        || trimmed.starts_with("fn ")
        || trimmed.starts_with("pub struct ")
        || trimmed.starts_with("struct ")
        || trimmed.starts_with("pub enum ")
        || trimmed.starts_with("enum ")
        || trimmed.starts_with("impl ")
        || trimmed.starts_with("pub trait ")
        || trimmed.starts_with("trait ")
    }
    "python" => {
      trimmed.starts_with("def ") || trimmed.starts_with("async def ") || trimmed.starts_with("class ")
    }
    "typescript" | "javascript" => {
      trimmed.starts_with("function ")
        || trimmed.starts_with("async function ")
        || trimmed.starts_with("export function ")
        || trimmed.starts_with("export async function ")
        || trimmed.starts_with("export default function ")
        || trimmed.starts_with("class ")
        || trimmed.starts_with("export class ")
        || trimmed.starts_with("interface ")
        || trimmed.starts_with("export interface ")
    }
    "go" => {
      trimmed.starts_with("func ") || (trimmed.starts_with("type ") && trimmed.contains("struct"))
    }
    _ => false,
  }
}

fn determine_kind(content: &str, lang: &str) -> String {
  let trimmed = content.trim();
  let kind = match lang {
    "rust" => {
      if trimmed.contains("fn ") {
        "function"
      } else if trimmed.contains("struct ") || trimmed.contains("impl ") || trimmed.contains("enum ") {
        "class"
      } else if trimmed.starts_with("use ") {
        "import"
      } else {
        "block"
      }
    }
    "python" => {
      if trimmed.contains("def ") {
        "function"
      } else if trimmed.contains("class ") {
        "class"
      } else if trimmed.starts_with("import ") || trimmed.starts_with("from ") {
        "import"
      } else {
        "block"
      }
    }
    "typescript" | "javascript" => {
      if trimmed.contains("function ") {
        "function"
      } else if trimmed.contains("class ") || trimmed.contains("interface ") {
        "class"
      } else if trimmed.starts_with("import ") {
        "import"
      } else {
        "block"
      }
    }
    "go" => {
      if trimmed.contains("func ") {
        "function"
      } else if trimmed.contains("type ") && trimmed.contains("struct") {
        "class"
      } else if trimmed.starts_with("import ") {
        "import"
      } else {
        "block"
      }
    }
    _ => "block",
  };
  kind.to_string()
}

fn extract_symbol_from_line(line: &str, lang: &str) -> Option<String> {
  let trimmed = line.trim();
  match lang {
    "rust" => {
      if let Some(rest) = trimmed.strip_prefix("pub fn ").or(trimmed.strip_prefix("fn ")) {
        return rest.split('(').next().map(|s| s.trim().to_string());
      }
      if let Some(rest) = trimmed.strip_prefix("pub struct ").or(trimmed.strip_prefix("struct ")) {
        return rest.split([' ', '<', '{']).next().map(|s| s.trim().to_string());
      }
      if let Some(rest) = trimmed.strip_prefix("pub enum ").or(trimmed.strip_prefix("enum ")) {
        return rest.split([' ', '<', '{']).next().map(|s| s.trim().to_string());
      }
      if let Some(rest) = trimmed.strip_prefix("impl ") {
        let rest = rest.strip_prefix('<').unwrap_or(rest);
        return rest.split([' ', '<', '{']).next().map(|s| s.trim().to_string());
      }
    }
    "python" => {
      if let Some(rest) = trimmed.strip_prefix("def ").or(trimmed.strip_prefix("async def ")) {
        return rest.split('(').next().map(|s| s.trim().to_string());
      }
      if let Some(rest) = trimmed.strip_prefix("class ") {
        return rest.split(['(', ':']).next().map(|s| s.trim().to_string());
      }
    }
    "typescript" | "javascript" => {
      if let Some(rest) = trimmed.strip_prefix("function ").or(trimmed.strip_prefix("async function ")) {
        return rest.split('(').next().map(|s| s.trim().to_string());
      }
      if let Some(rest) = trimmed
        .strip_prefix("export function ")
        .or(trimmed.strip_prefix("export async function "))
        .or(trimmed.strip_prefix("export default function "))
      {
        return rest.split('(').next().map(|s| s.trim().to_string());
      }
      if let Some(rest) = trimmed.strip_prefix("class ").or(trimmed.strip_prefix("export class ")) {
        return rest.split([' ', '{', '<']).next().map(|s| s.trim().to_string());
      }
      if let Some(rest) = trimmed
        .strip_prefix("interface ")
        .or(trimmed.strip_prefix("export interface "))
      {
        return rest.split([' ', '{', '<']).next().map(|s| s.trim().to_string());
      }
    }
    "go" => {
      if let Some(rest) = trimmed.strip_prefix("func ") {
        let rest = if rest.starts_with('(') {
          rest.split(')').nth(1).unwrap_or(rest).trim()
        } else {
          rest
        };
        return rest.split('(').next().map(|s| s.trim().to_string());
      }
      if let Some(rest) = trimmed.strip_prefix("type ") {
        return rest.split_whitespace().next().map(|s| s.to_string());
      }
    }
    _ => {}
  }
  None
}

/// File-extension-based language detection, mirroring the set of languages
/// `find_boundaries` knows how to split on plus the common catch-all
/// extensions a repo scan will encounter.
pub fn detect_language(path: &Path) -> Option<&'static str> {
  let ext = path.extension()?.to_str()?;
  Some(match ext {
    "rs" => "rust",
    "py" => "python",
    "ts" | "tsx" => "typescript",
    "js" | "jsx" | "mjs" | "cjs" => "javascript",
    "go" => "go",
    "java" => "java",
    "c" | "h" => "c",
    "cpp" | "cc" | "hpp" => "cpp",
    "cs" => "csharp",
    "rb" => "ruby",
    "php" => "php",
    "swift" => "swift",
    "kt" => "kotlin",
    "md" | "mdx" => "markdown",
    "yaml" | "yml" => "yaml",
    "toml" => "toml",
    "json" => "json",
    _ => return None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn small_rust_file_is_one_span_when_no_boundary() {
    let extractor = LineHeuristicExtractor;
    let source = b"let x = 1;\nlet y = 2;\n";
    let spans = extractor.extract(Path::new("a.rs"), "rust", source);
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].start_line, 1);
  }

  #[test]
  fn splits_rust_file_on_fn_boundaries() {
    let extractor = LineHeuristicExtractor;
    let source = b"fn one() {\n    1\n}\n\nfn two() {\n    2\n}\n";
    let spans = extractor.extract(Path::new("a.rs"), "rust", source);
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].symbol, "one");
    assert_eq!(spans[1].symbol, "two");
    assert_eq!(spans[0].kind, "function");
  }

  #[test]
  fn byte_ranges_cover_the_whole_file_without_gaps() {
    let extractor = LineHeuristicExtractor;
    let source = b"fn one() {\n    1\n}\n\nfn two() {\n    2\n}\n";
    let spans = extractor.extract(Path::new("a.rs"), "rust", source);
    assert_eq!(spans[0].byte_start, 0);
    assert_eq!(spans.last().unwrap().byte_end, source.len() as u64);
  }

  #[test]
  fn extracts_python_class_and_function_symbols() {
    let extractor = LineHeuristicExtractor;
    let source = b"def one():\n    pass\n\nclass Two:\n    pass\n";
    let spans = extractor.extract(Path::new("a.py"), "python", source);
    assert_eq!(spans[0].symbol, "one");
    assert_eq!(spans[1].symbol, "Two");
    assert_eq!(spans[1].kind, "class");
  }

  #[test]
  fn unrecognized_language_yields_whole_file_span() {
    let extractor = LineHeuristicExtractor;
    let source = b"some\nrandom\ntext\n";
    let spans = extractor.extract(Path::new("a.unknown"), "plaintext", source);
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].start_line, 1);
    assert_eq!(spans[0].end_line, 3);
  }

  #[test]
  fn detects_common_languages_by_extension() {
    assert_eq!(detect_language(Path::new("main.rs")), Some("rust"));
    assert_eq!(detect_language(Path::new("app.py")), Some("python"));
    assert_eq!(detect_language(Path::new("index.tsx")), Some("typescript"));
    assert_eq!(detect_language(Path::new("readme.txt")), None);
  }
}
