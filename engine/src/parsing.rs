//! Structure extraction from generated text
//!
//! Model output is prose with embedded blocks. Extraction either finds the
//! block or fails with `EngineError::Parse` carrying the raw text; there is no
//! silent fallback.

use regex::Regex;
use sdk::errors::EngineError;
use serde_json::Value;
use std::sync::OnceLock;

static FENCE: OnceLock<Option<Regex>> = OnceLock::new();

fn fence() -> Option<&'static Regex> {
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```").ok())
        .as_ref()
}

struct Fenced<'a> {
    lang: &'a str,
    body: &'a str,
}

fn fenced_blocks(text: &str) -> Vec<Fenced<'_>> {
    let Some(re) = fence() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|cap| {
            let lang = cap.get(1).map(|m| m.as_str()).unwrap_or("");
            let body = cap.get(2)?.as_str();
            Some(Fenced { lang, body })
        })
        .collect()
}

/// Body of the last fenced code block, preferring ```python fences.
///
/// # Errors
/// `EngineError::Parse` when there is no closed fence or the chosen block is empty.
pub fn extract_code_block(text: &str) -> Result<String, EngineError> {
    let blocks = fenced_blocks(text);

    let chosen = blocks
        .iter()
        .rev()
        .find(|b| b.lang.eq_ignore_ascii_case("python") || b.lang.eq_ignore_ascii_case("py"))
        .or_else(|| blocks.iter().rev().find(|b| b.lang.is_empty()))
        .or_else(|| blocks.last());

    match chosen {
        Some(block) if !block.body.trim().is_empty() => Ok(block.body.trim_end().to_string()),
        Some(_) => Err(EngineError::parse("code block is empty", text)),
        None if text.contains("```") => Err(EngineError::parse("unterminated code fence", text)),
        None => Err(EngineError::parse("no fenced code block in output", text)),
    }
}

/// First JSON value in the text: a ```json fence, the whole text, or the
/// first balanced object/array embedded in prose.
///
/// # Errors
/// `EngineError::Parse` when nothing parses as JSON.
pub fn extract_json_block(text: &str) -> Result<Value, EngineError> {
    for block in fenced_blocks(text) {
        if block.lang.is_empty() || block.lang.eq_ignore_ascii_case("json") {
            if let Ok(value) = serde_json::from_str(block.body.trim()) {
                return Ok(value);
            }
        }
    }

    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    for (pos, ch) in trimmed.char_indices() {
        if ch == '{' || ch == '[' {
            if let Some(candidate) = extract_balanced(&trimmed[pos..]) {
                if let Ok(value) = serde_json::from_str(candidate) {
                    return Ok(value);
                }
            }
        }
    }

    Err(EngineError::parse("no JSON value in output", text))
}

/// Balanced `{...}` or `[...]` prefix of `s`, respecting string literals
fn extract_balanced(s: &str) -> Option<&str> {
    let (open, close) = match s.chars().next()? {
        '{' => ('{', '}'),
        '[' => ('[', ']'),
        _ => return None,
    };
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
