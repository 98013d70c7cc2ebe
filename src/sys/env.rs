// src/sys/env.rs
//
// 🛡️ Best-effort `.env` reader. Foreign dialects are expected to contain noise,
// so malformed lines are dropped instead of reported.

use indexmap::IndexMap;

/// Ordered `KEY -> value` mapping recovered from one environment file.
pub type EnvironmentMap = IndexMap<String, String>;

/// Parses raw `.env` content. Last write wins for duplicated keys; the key
/// keeps the position of its first occurrence.
pub fn parse(content: &str) -> EnvironmentMap {
    let mut env = EnvironmentMap::new();

    for raw_line in content.split('\n') {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let line = match line.strip_prefix("export ") {
            Some(rest) => rest.trim_start(),
            None => line,
        };

        let Some((key, raw_value)) = line.split_once('=') else {
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        env.insert(key.to_string(), parse_value(raw_value.trim()));
    }

    env
}

fn parse_value(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    if let Some(inner) = strip_quotes(raw, '"') {
        return unescape_double_quoted(inner);
    }
    if let Some(inner) = strip_quotes(raw, '\'') {
        // Single quotes are literal: no escape processing at all.
        return inner.to_string();
    }

    strip_inline_comment(raw).trim().to_string()
}

fn strip_quotes(raw: &str, quote: char) -> Option<&str> {
    if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
        Some(&raw[1..raw.len() - 1])
    } else {
        None
    }
}

fn unescape_double_quoted(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(escaped @ ('\\' | '"' | '$')) => out.push(escaped),
            // Unknown sequence: keep the backslash, the next char is handled normally.
            _ => {
                out.push('\\');
                continue;
            }
        }
        chars.next();
    }

    out
}

/// Cuts `value # comment` / `value ; comment` tails off unquoted values.
fn strip_inline_comment(raw: &str) -> &str {
    let mut prev_was_space = false;
    for (idx, c) in raw.char_indices() {
        if prev_was_space && (c == '#' || c == ';') {
            return &raw[..idx];
        }
        prev_was_space = c.is_whitespace();
    }
    raw
}
