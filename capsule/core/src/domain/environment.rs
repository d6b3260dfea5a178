// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Runtime environment document (`.env`)
//!
//! A line-oriented `KEY=VALUE` document. Comments, blank lines and keys the
//! engine does not override are kept byte-for-byte; only overridden entries
//! are re-rendered. Rendering is deterministic, so writing the same template
//! with the same overrides always produces the same bytes.

/// One line of a runtime environment document
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Entry {
        key: String,
        value: String,
        exported: bool,
        /// Original text, emitted as-is until the entry is overridden
        raw: Option<String>,
    },
    Verbatim(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    lines: Vec<Line>,
}

impl RuntimeEnvironment {
    pub fn parse(content: &str) -> Self {
        let lines = content.lines().map(parse_line).collect();
        Self { lines }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Keys in document order (duplicates included)
    pub fn keys(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Entry { key, .. } => Some(key.as_str()),
                Line::Verbatim(_) => None,
            })
            .collect()
    }

    /// Set `key` everywhere it occurs, appending it when absent
    pub fn put(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        let mut found = false;

        for line in self.lines.iter_mut() {
            if let Line::Entry { key: k, value: v, raw, .. } = line {
                if k == key {
                    found = true;
                    *v = value.clone();
                    *raw = None;
                }
            }
        }

        if !found {
            self.lines.push(Line::Entry {
                key: key.to_string(),
                value,
                exported: false,
                raw: None,
            });
        }
        self
    }

    /// Apply overrides in order
    pub fn apply<K, V>(&mut self, overrides: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in overrides {
            self.put(key.as_ref(), value);
        }
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Verbatim(text) => out.push_str(text),
                Line::Entry { raw: Some(text), .. } => out.push_str(text),
                Line::Entry { key, value, exported, raw: None } => {
                    if *exported {
                        out.push_str("export ");
                    }
                    out.push_str(key);
                    out.push('=');
                    out.push_str(&quote_value(value));
                }
            }
            out.push('\n');
        }
        out
    }
}

fn parse_line(text: &str) -> Line {
    let trimmed = text.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Line::Verbatim(text.to_string());
    }

    let (exported, body) = match trimmed.strip_prefix("export ") {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };

    let Some((key, value)) = body.split_once('=') else {
        return Line::Verbatim(text.to_string());
    };
    let key = key.trim();
    if !is_valid_key(key) {
        return Line::Verbatim(text.to_string());
    }

    Line::Entry {
        key: key.to_string(),
        value: unquote_value(value.trim()),
        exported,
        raw: Some(text.to_string()),
    }
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn unquote_value(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                }
            } else {
                out.push(c);
            }
        }
        return out;
    }
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }
    // Unquoted: an inline comment starts at " #"
    match value.find(" #") {
        Some(idx) => value[..idx].trim_end().to_string(),
        None => value.to_string(),
    }
}

fn quote_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '\\' | '$' | '`'));
    if !needs_quotes {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
