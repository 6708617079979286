//! LDAP-style property filters.
//!
//! Supported syntax: `(key=value)`, `(key=*)` presence, `(key=pre*mid*post)`
//! substrings, `(key~=value)` approximate, `(key>=value)`, `(key<=value)`,
//! and the `&`, `|`, `!` combinators. `\` escapes the next character in a
//! value. Attribute names match case-insensitively.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::endpoint::Properties;
use crate::endpoint::PropertyValue;
use crate::FilterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyFilter {
    And(Vec<PropertyFilter>),
    Or(Vec<PropertyFilter>),
    Not(Box<PropertyFilter>),
    Present(String),
    Equal(String, String),
    Approx(String, String),
    GreaterEq(String, String),
    LessEq(String, String),
    /// Pattern split on `*`: first part anchors the start, last part anchors
    /// the end, the rest must appear in order.
    Substring(String, Vec<String>),
}

impl PropertyFilter {
    /// Shorthand for `(key=value)`.
    pub fn equal(
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        PropertyFilter::Equal(key.into(), value.into())
    }

    pub fn matches(
        &self,
        properties: &Properties,
    ) -> bool {
        match self {
            PropertyFilter::And(filters) => filters.iter().all(|f| f.matches(properties)),
            PropertyFilter::Or(filters) => filters.iter().any(|f| f.matches(properties)),
            PropertyFilter::Not(filter) => !filter.matches(properties),
            PropertyFilter::Present(key) => lookup(properties, key).is_some(),
            PropertyFilter::Equal(key, v) => compare(properties, key, |value| equal(value, v)),
            PropertyFilter::Approx(key, v) => compare(properties, key, |value| approx(value, v)),
            PropertyFilter::GreaterEq(key, v) => compare(properties, key, |value| {
                matches!(ordering(value, v), Some(Ordering::Greater | Ordering::Equal))
            }),
            PropertyFilter::LessEq(key, v) => compare(properties, key, |value| {
                matches!(ordering(value, v), Some(Ordering::Less | Ordering::Equal))
            }),
            PropertyFilter::Substring(key, parts) => compare(properties, key, |value| match value {
                PropertyValue::String(s) => substring(s, parts),
                _ => false,
            }),
        }
    }
}

fn lookup<'a>(
    properties: &'a Properties,
    key: &str,
) -> Option<&'a PropertyValue> {
    properties.get(key).or_else(|| {
        properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

/// Applies `test` to the value, or to each element of a string list.
fn compare<F>(
    properties: &Properties,
    key: &str,
    test: F,
) -> bool
where
    F: Fn(&PropertyValue) -> bool,
{
    match lookup(properties, key) {
        None => false,
        Some(PropertyValue::StringList(items)) => items.iter().any(|item| test(&PropertyValue::String(item.clone()))),
        Some(value) => test(value),
    }
}

fn equal(
    value: &PropertyValue,
    expected: &str,
) -> bool {
    match value {
        PropertyValue::String(s) => s == expected,
        PropertyValue::Long(n) => expected.trim().parse::<i64>().map(|e| e == *n).unwrap_or(false),
        PropertyValue::Boolean(b) => expected.trim().eq_ignore_ascii_case(if *b { "true" } else { "false" }),
        PropertyValue::StringList(_) => false,
    }
}

fn approx(
    value: &PropertyValue,
    expected: &str,
) -> bool {
    let normalize = |s: &str| -> String { s.chars().filter(|c| !c.is_whitespace()).flat_map(char::to_lowercase).collect() };
    match value {
        PropertyValue::String(s) => normalize(s) == normalize(expected),
        other => equal(other, expected),
    }
}

fn ordering(
    value: &PropertyValue,
    expected: &str,
) -> Option<Ordering> {
    match value {
        PropertyValue::String(s) => Some(s.as_str().cmp(expected)),
        PropertyValue::Long(n) => expected.trim().parse::<i64>().ok().map(|e| n.cmp(&e)),
        _ => None,
    }
}

fn substring(
    value: &str,
    parts: &[String],
) -> bool {
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return true,
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return value == first,
    };

    if !value.starts_with(first.as_str()) {
        return false;
    }
    let mut cursor = first.len();
    for part in middle {
        match value[cursor..].find(part.as_str()) {
            Some(idx) => cursor += idx + part.len(),
            None => return false,
        }
    }
    value.len() - cursor >= last.len() && value.ends_with(last.as_str())
}

impl FromStr for PropertyFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser {
            chars: s.chars().collect(),
            pos: 0,
            depth: 0,
        };
        let filter = parser.parse_filter()?;
        parser.skip_ws();
        if parser.pos < parser.chars.len() {
            return Err(FilterError::TrailingInput(parser.pos));
        }
        Ok(filter)
    }
}

/// Deepest accepted nesting of parenthesized filters. The parser recurses
/// once per level.
pub const MAX_FILTER_DEPTH: usize = 64;

struct Parser {
    chars: Vec<char>,
    pos: usize,
    /// Open parentheses around the filter being parsed
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(
        &mut self,
        expected: char,
    ) -> Result<(), FilterError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(found) => Err(FilterError::UnexpectedChar {
                found,
                position: self.pos,
            }),
            None => Err(FilterError::UnexpectedEnd(self.pos)),
        }
    }

    fn parse_filter(&mut self) -> Result<PropertyFilter, FilterError> {
        self.skip_ws();
        if self.depth == MAX_FILTER_DEPTH {
            return Err(FilterError::TooDeep(self.pos));
        }
        self.expect('(')?;
        self.depth += 1;
        self.skip_ws();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                PropertyFilter::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                PropertyFilter::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                PropertyFilter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(FilterError::UnexpectedEnd(self.pos)),
        };
        self.skip_ws();
        self.expect(')')?;
        self.depth -= 1;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<PropertyFilter>, FilterError> {
        let mut filters = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some('(') => filters.push(self.parse_filter()?),
                Some(_) if !filters.is_empty() => return Ok(filters),
                Some(found) => {
                    return Err(FilterError::UnexpectedChar {
                        found,
                        position: self.pos,
                    })
                }
                None => return Err(FilterError::UnexpectedEnd(self.pos)),
            }
        }
    }

    fn parse_item(&mut self) -> Result<PropertyFilter, FilterError> {
        let start = self.pos;
        let mut key = String::new();
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '<' | '>' | '(' | ')') {
                break;
            }
            key.push(c);
            self.pos += 1;
        }
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(FilterError::MissingAttribute(start));
        }

        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                '='
            }
            Some(c @ ('~' | '<' | '>')) => {
                self.pos += 1;
                self.expect('=')?;
                c
            }
            Some(found) => {
                return Err(FilterError::UnexpectedChar {
                    found,
                    position: self.pos,
                })
            }
            None => return Err(FilterError::UnexpectedEnd(self.pos)),
        };

        let parts = self.parse_value()?;
        let filter = match op {
            '~' => PropertyFilter::Approx(key, parts.join("*")),
            '>' => PropertyFilter::GreaterEq(key, parts.join("*")),
            '<' => PropertyFilter::LessEq(key, parts.join("*")),
            _ if parts.len() == 1 => PropertyFilter::Equal(key, parts.into_iter().collect()),
            _ if parts.len() == 2 && parts.iter().all(String::is_empty) => PropertyFilter::Present(key),
            _ => PropertyFilter::Substring(key, parts),
        };
        Ok(filter)
    }

    /// Value split on unescaped `*`.
    fn parse_value(&mut self) -> Result<Vec<String>, FilterError> {
        let mut parts = vec![String::new()];
        loop {
            match self.peek() {
                Some(')') => return Ok(parts),
                Some('(') => {
                    return Err(FilterError::UnexpectedChar {
                        found: '(',
                        position: self.pos,
                    })
                }
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or(FilterError::UnexpectedEnd(self.pos))?;
                    if let Some(last) = parts.last_mut() {
                        last.push(escaped);
                    }
                    self.pos += 1;
                }
                Some('*') => {
                    self.pos += 1;
                    parts.push(String::new());
                }
                Some(c) => {
                    if let Some(last) = parts.last_mut() {
                        last.push(c);
                    }
                    self.pos += 1;
                }
                None => return Err(FilterError::UnexpectedEnd(self.pos)),
            }
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for PropertyFilter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            PropertyFilter::And(filters) | PropertyFilter::Or(filters) => {
                f.write_str(if matches!(self, PropertyFilter::And(_)) { "(&" } else { "(|" })?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            PropertyFilter::Not(filter) => write!(f, "(!{filter})"),
            PropertyFilter::Present(key) => write!(f, "({key}=*)"),
            PropertyFilter::Equal(key, v) => write!(f, "({key}={})", escape(v)),
            PropertyFilter::Approx(key, v) => write!(f, "({key}~={})", escape(v)),
            PropertyFilter::GreaterEq(key, v) => write!(f, "({key}>={})", escape(v)),
            PropertyFilter::LessEq(key, v) => write!(f, "({key}<={})", escape(v)),
            PropertyFilter::Substring(key, parts) => {
                let parts: Vec<String> = parts.iter().map(|p| escape(p)).collect();
                write!(f, "({key}={})", parts.join("*"))
            }
        }
    }
}
