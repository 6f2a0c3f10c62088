//! Serializer
//!
//! Renders a value tree back to text. `BigInt` nodes are written as their
//! exact digits, so a parse of the output gives the same integer back.

use super::value::{Value, BIGINT_THRESHOLD};
use crate::error::{Error, Result};

/// Widest indentation written per nesting level
pub const MAX_INDENT: usize = 10;

/// Pretty-printing indentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Indent {
    /// Indent each level by this many spaces
    Spaces(usize),
    /// Indent each level with this literal text
    Text(String),
}

impl Indent {
    /// Per-level indentation, capped at [`MAX_INDENT`] characters
    fn unit(&self) -> String {
        match self {
            Self::Spaces(n) => " ".repeat((*n).min(MAX_INDENT)),
            Self::Text(text) => text.chars().take(MAX_INDENT).collect(),
        }
    }

    /// Interpret a dynamic indent argument
    ///
    /// Numbers give a space count, strings are used literally and anything
    /// else means no indentation. Counts above [`MAX_INDENT`] are clamped.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) if *n >= 1.0 => {
                Some(Self::Spaces(n.min(MAX_INDENT as f64).trunc() as usize))
            }
            Value::BigInt(n) if *n > 0 => {
                Some(Self::Spaces(usize::try_from(*n).map_or(MAX_INDENT, |n| n.min(MAX_INDENT))))
            }
            Value::String(s) if !s.is_empty() => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

/// Per-member transform applied while writing
pub enum Replacer<'f> {
    /// Called with each member key and value, depth-first, root key `""`.
    /// `None` drops object members and writes `null` for array slots.
    Function(Box<dyn FnMut(&str, Value) -> Option<Value> + 'f>),
    /// Only these object members are written, in this order
    AllowList(Vec<String>),
}

impl<'f> Replacer<'f> {
    /// Create a function replacer
    pub fn function(f: impl FnMut(&str, Value) -> Option<Value> + 'f) -> Self {
        Self::Function(Box::new(f))
    }

    /// Create an allow-list replacer
    pub fn allow_list<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllowList(keys.into_iter().map(Into::into).collect())
    }

    /// Interpret a dynamic replacer argument
    ///
    /// `null` means no replacer and an array is an allow-list (non-string
    /// entries are skipped). Anything else is rejected.
    pub fn from_value(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Array(items) => Ok(Some(Self::AllowList(
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
            ))),
            other => Err(Error::stringify_type(format!(
                "replacer must be a function or an array, got {}",
                other.kind()
            ))),
        }
    }
}

impl std::fmt::Debug for Replacer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Replacer::Function"),
            Self::AllowList(keys) => f.debug_tuple("Replacer::AllowList").field(keys).finish(),
        }
    }
}

/// Serialize compactly
pub fn stringify(value: &Value) -> String {
    let mut writer = Writer::new(None, None);
    writer.render_value(value)
}

/// Serialize with indentation
pub fn stringify_pretty(value: &Value, indent: Indent) -> String {
    let mut writer = Writer::new(None, Some(indent));
    writer.render_value(value)
}

/// Serialize with an optional replacer and indentation
///
/// Returns `None` when a function replacer drops the root value.
pub fn stringify_with(
    value: &Value,
    replacer: Option<Replacer<'_>>,
    indent: Option<Indent>,
) -> Option<String> {
    let mut writer = Writer::new(replacer, indent);
    writer.render("", value)
}

/// Serialize with dynamically typed replacer and indent arguments
///
/// Both arguments are validated before anything is written.
pub fn stringify_with_args(value: &Value, replacer: &Value, indent: &Value) -> Result<Option<String>> {
    let replacer = Replacer::from_value(replacer)?;
    Ok(stringify_with(value, replacer, Indent::from_value(indent)))
}

struct Writer<'f> {
    replacer: Option<Replacer<'f>>,
    indent: String,
    gap: String,
}

impl<'f> Writer<'f> {
    fn new(replacer: Option<Replacer<'f>>, indent: Option<Indent>) -> Self {
        Self {
            replacer,
            indent: indent.map(|i| i.unit()).unwrap_or_default(),
            gap: String::new(),
        }
    }

    /// Render a member, applying a function replacer first
    fn render(&mut self, key: &str, value: &Value) -> Option<String> {
        let replaced = match &mut self.replacer {
            Some(Replacer::Function(f)) => Some(f(key, value.clone())),
            _ => None,
        };
        match replaced {
            Some(Some(value)) => Some(self.render_value(&value)),
            Some(None) => None,
            None => Some(self.render_value(value)),
        }
    }

    fn render_value(&mut self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::BigInt(i) => i.to_string(),
            Value::String(s) => quote(s),
            Value::Array(items) => {
                let mind = self.gap.clone();
                self.gap.push_str(&self.indent);
                let mut parts = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    parts.push(
                        self.render(&i.to_string(), item)
                            .unwrap_or_else(|| "null".to_string()),
                    );
                }
                let out = self.wrap('[', ']', &parts, &mind);
                self.gap = mind;
                out
            }
            Value::Object(map) => {
                let mind = self.gap.clone();
                self.gap.push_str(&self.indent);
                let keys: Vec<String> = match &self.replacer {
                    Some(Replacer::AllowList(keys)) => keys.clone(),
                    _ => map.keys().cloned().collect(),
                };
                let separator = if self.gap.is_empty() { ":" } else { ": " };
                let mut parts = Vec::with_capacity(keys.len());
                for key in &keys {
                    let Some(member) = map.get(key) else {
                        continue;
                    };
                    if let Some(text) = self.render(key, member) {
                        parts.push(format!("{}{separator}{text}", quote(key)));
                    }
                }
                let out = self.wrap('{', '}', &parts, &mind);
                self.gap = mind;
                out
            }
        }
    }

    fn wrap(&self, open: char, close: char, parts: &[String], mind: &str) -> String {
        if parts.is_empty() {
            format!("{open}{close}")
        } else if self.gap.is_empty() {
            format!("{open}{}{close}", parts.join(","))
        } else {
            let joined = parts.join(&format!(",\n{}", self.gap));
            format!("{open}\n{}{joined}\n{mind}{close}", self.gap)
        }
    }
}

/// Format a double the way the parser reads it back
///
/// Integral values whose plain form would be longer than the `BigInt`
/// threshold are written with an exponent so they stay doubles.
fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return "null".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        let plain = n.to_string();
        if plain.contains('.') || plain.len() <= BIGINT_THRESHOLD {
            return plain;
        }
    }
    exponent_form(n)
}

fn exponent_form(n: f64) -> String {
    let text = format!("{n:e}");
    match text.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => text,
    }
}

fn must_escape(c: char) -> bool {
    matches!(
        c as u32,
        0x00..=0x1f
            | 0x7f..=0x9f
            | 0xad
            | 0x600..=0x604
            | 0x70f
            | 0x17b4
            | 0x17b5
            | 0x200c..=0x200f
            | 0x2028..=0x202f
            | 0x2060..=0x206f
            | 0xfeff
            | 0xfff0..=0xffff
    )
}

/// Quote and escape a string
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\u{c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            c if must_escape(c) => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
