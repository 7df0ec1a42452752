//! Safe parser for composite cells (employment-type maps, keyword lists).
//!
//! Accepted forms, tried in order:
//! 1. the versioned JSON envelope `{"schema_version": 1, "value": ...}`
//! 2. a bare JSON string, list of strings, or flat string map
//! 3. the quoted list/dict literal notation the upstream scrapers emit,
//!    restricted to strings, lists of strings, and flat string maps.
//!
//! Nothing is ever evaluated; anything outside this grammar reads as `None`.

use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::Chars;

use serde_json::Value as JsonValue;

pub const COMPOSITE_SCHEMA_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeValue {
    Text(String),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl CompositeValue {
    /// Flattened non-empty items: list entries, map values, or the text itself.
    pub fn items(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            CompositeValue::Text(text) => vec![text.as_str()],
            CompositeValue::List(items) => items.iter().map(String::as_str).collect(),
            CompositeValue::Map(map) => map.values().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            CompositeValue::Map(map) => map.get(key).map(String::as_str),
            _ => None,
        }
    }

    /// One item per line, suitable for a description section.
    pub fn render_lines(&self) -> String {
        match self {
            CompositeValue::Map(map) => map
                .iter()
                .filter(|(_, v)| !v.trim().is_empty())
                .map(|(k, v)| format!("{k}: {}", v.trim()))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.items().join("\n"),
        }
    }
}

pub fn parse_composite(input: &str) -> Option<CompositeValue> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(json) = serde_json::from_str::<JsonValue>(trimmed) {
        return from_json(json);
    }
    LiteralParser::new(trimmed).parse_document()
}

fn from_json(value: JsonValue) -> Option<CompositeValue> {
    if let JsonValue::Object(map) = &value {
        if let Some(version) = map.get("schema_version") {
            if version.as_u64() != Some(COMPOSITE_SCHEMA_VERSION) {
                return None;
            }
            return from_json(map.get("value")?.clone());
        }
    }

    match value {
        JsonValue::String(text) => Some(CompositeValue::Text(text)),
        JsonValue::Array(items) => items
            .into_iter()
            .map(|item| match item {
                JsonValue::String(s) => Some(s),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(CompositeValue::List),
        JsonValue::Object(map) => map
            .into_iter()
            .map(|(k, v)| match v {
                JsonValue::String(s) => Some((k, s)),
                _ => None,
            })
            .collect::<Option<BTreeMap<_, _>>>()
            .map(CompositeValue::Map),
        _ => None,
    }
}

struct LiteralParser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> LiteralParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn parse_document(mut self) -> Option<CompositeValue> {
        self.skip_ws();
        let value = match self.chars.peek()? {
            '[' => CompositeValue::List(self.parse_list()?),
            '{' => CompositeValue::Map(self.parse_map()?),
            '\'' | '"' => CompositeValue::Text(self.parse_string()?),
            _ => return None,
        };
        self.skip_ws();
        if self.chars.next().is_some() {
            return None;
        }
        Some(value)
    }

    fn skip_ws(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn consume(&mut self, wanted: char) -> Option<()> {
        self.skip_ws();
        (self.chars.next()? == wanted).then_some(())
    }

    /// Consumes a separator and reports whether the sequence continues.
    fn next_in_sequence(&mut self, close: char) -> Option<bool> {
        self.skip_ws();
        match self.chars.next()? {
            ',' => {
                self.skip_ws();
                if self.chars.peek() == Some(&close) {
                    self.chars.next();
                    Some(false)
                } else {
                    Some(true)
                }
            }
            c if c == close => Some(false),
            _ => None,
        }
    }

    fn parse_list(&mut self) -> Option<Vec<String>> {
        self.consume('[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.chars.peek() == Some(&']') {
            self.chars.next();
            return Some(items);
        }
        loop {
            items.push(self.parse_string()?);
            if !self.next_in_sequence(']')? {
                return Some(items);
            }
        }
    }

    fn parse_map(&mut self) -> Option<BTreeMap<String, String>> {
        self.consume('{')?;
        let mut map = BTreeMap::new();
        self.skip_ws();
        if self.chars.peek() == Some(&'}') {
            self.chars.next();
            return Some(map);
        }
        loop {
            let key = self.parse_string()?;
            self.consume(':')?;
            let value = self.parse_string()?;
            map.insert(key, value);
            if !self.next_in_sequence('}')? {
                return Some(map);
            }
        }
    }

    fn parse_string(&mut self) -> Option<String> {
        self.skip_ws();
        let quote = match self.chars.next()? {
            q @ ('\'' | '"') => q,
            _ => return None,
        };
        let mut out = String::new();
        loop {
            match self.chars.next()? {
                '\\' => match self.chars.next()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    c @ ('\\' | '\'' | '"') => out.push(c),
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                },
                c if c == quote => return Some(out),
                c => out.push(c),
            }
        }
    }
}
