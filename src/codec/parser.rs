//! Recursive-descent parser
//!
//! Every call builds its own [`Scanner`], so concurrent parses never share
//! position state.

use super::value::{Object, Value, BIGINT_THRESHOLD};
use crate::error::{Error, Result};
use std::str::Chars;

/// Containers nested deeper than this are rejected
const MAX_DEPTH: usize = 512;

/// Parse a text into a value tree
pub fn parse(text: &str) -> Result<Value> {
    let mut scanner = Scanner::new(text);
    let value = scanner.value()?;
    scanner.white();
    if scanner.ch.is_some() {
        return Err(scanner.error("Syntax error"));
    }
    Ok(value)
}

/// Parse a text, then pass every member through `reviver` bottom-up
///
/// The reviver receives the member key (array indices as decimal strings,
/// `""` for the root) and the already-revived value. Returning `None`
/// deletes an object member; array slots become `null`. The result is
/// `None` when the reviver drops the root.
pub fn parse_with_reviver<R>(text: &str, mut reviver: R) -> Result<Option<Value>>
where
    R: FnMut(&str, Value) -> Option<Value>,
{
    let value = parse(text)?;
    Ok(walk("", value, &mut reviver))
}

fn walk<R>(key: &str, value: Value, reviver: &mut R) -> Option<Value>
where
    R: FnMut(&str, Value) -> Option<Value>,
{
    let value = match value {
        Value::Object(map) => {
            let mut revived = Object::new();
            for (k, v) in map {
                if let Some(v) = walk(&k, v, reviver) {
                    revived.insert(k, v);
                }
            }
            Value::Object(revived)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| walk(&i.to_string(), v, reviver).unwrap_or(Value::Null))
                .collect(),
        ),
        other => other,
    };
    reviver(key, value)
}

// ============================================================================
// Scanner
// ============================================================================

struct Scanner<'a> {
    text: &'a str,
    chars: Chars<'a>,
    /// Current character, `None` at end of input
    ch: Option<char>,
    /// Character offset of `ch`
    at: usize,
    depth: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        let mut chars = text.chars();
        let ch = chars.next();
        Self {
            text,
            chars,
            ch,
            at: 0,
            depth: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::syntax(message, self.at, self.text)
    }

    fn advance(&mut self) -> Option<char> {
        if self.ch.is_some() {
            self.at += 1;
        }
        self.ch = self.chars.next();
        self.ch
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.ch != Some(c) {
            return Err(self.error(format!(
                "Expected '{c}' instead of {}",
                describe(self.ch)
            )));
        }
        self.advance();
        Ok(())
    }

    fn white(&mut self) {
        while matches!(self.ch, Some(c) if c <= ' ') {
            self.advance();
        }
    }

    fn value(&mut self) -> Result<Value> {
        self.white();
        match self.ch {
            Some('{') => self.nested(Self::object),
            Some('[') => self.nested(Self::array),
            Some('"') => self.string().map(Value::String),
            Some('-' | '0'..='9') => self.number(),
            _ => self.word(),
        }
    }

    fn nested(&mut self, parse: fn(&mut Self) -> Result<Value>) -> Result<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("Nesting too deep"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn digits(&mut self, numeral: &mut String) {
        while let Some(c @ '0'..='9') = self.ch {
            numeral.push(c);
            self.advance();
        }
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.at;
        let mut numeral = String::new();
        let mut integral = true;

        if self.ch == Some('-') {
            numeral.push('-');
            self.advance();
        }
        self.digits(&mut numeral);
        if self.ch == Some('.') {
            integral = false;
            numeral.push('.');
            self.advance();
            self.digits(&mut numeral);
        }
        if let Some(e @ ('e' | 'E')) = self.ch {
            integral = false;
            numeral.push(e);
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.ch {
                numeral.push(sign);
                self.advance();
            }
            self.digits(&mut numeral);
        }

        if integral && numeral.len() > BIGINT_THRESHOLD {
            return numeral.parse::<i64>().map(Value::BigInt).map_err(|_| {
                Error::syntax(
                    format!("Bad number: {numeral} is outside the 64-bit range"),
                    start,
                    self.text,
                )
            });
        }

        match numeral.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Value::Number(n)),
            _ => Err(Error::syntax(
                format!("Bad number: {numeral}"),
                start,
                self.text,
            )),
        }
    }

    fn string(&mut self) -> Result<String> {
        if self.ch != Some('"') {
            return Err(self.error(format!("Bad string: {}", describe(self.ch))));
        }
        let mut out = String::new();
        loop {
            match self.advance() {
                None => return Err(self.error("Bad string: unterminated")),
                Some('"') => {
                    self.advance();
                    return Ok(out);
                }
                Some('\\') => match self.advance() {
                    Some('u') => {
                        let unit = self.hex4()?;
                        out.push(self.code_point(unit)?);
                    }
                    Some(c) => match unescape(c) {
                        Some(e) => out.push(e),
                        None => return Err(self.error(format!("Bad string: escape \\{c}"))),
                    },
                    None => return Err(self.error("Bad string: unterminated")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    /// Read the four hex digits after `\u`; leaves `ch` on the last digit
    fn hex4(&mut self) -> Result<u32> {
        let mut unit = 0;
        for _ in 0..4 {
            let digit = self
                .advance()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("Bad string: invalid unicode escape"))?;
            unit = unit * 16 + digit;
        }
        Ok(unit)
    }

    /// Combine a UTF-16 unit with a following low surrogate escape if there
    /// is one. Unpaired surrogates decode to U+FFFD.
    fn code_point(&mut self, unit: u32) -> Result<char> {
        if (0xD800..0xDC00).contains(&unit) {
            let rest = self.chars.as_str();
            let low = rest
                .strip_prefix("\\u")
                .and_then(|hex| hex.get(..4))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .filter(|low| (0xDC00..0xE000).contains(low));
            if let Some(low) = low {
                // backslash, 'u' and four digits
                for _ in 0..6 {
                    self.advance();
                }
                let combined = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                return Ok(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
        }
        Ok(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn word(&mut self) -> Result<Value> {
        let (literal, value) = match self.ch {
            Some('t') => ("true", Value::Bool(true)),
            Some('f') => ("false", Value::Bool(false)),
            Some('n') => ("null", Value::Null),
            other => return Err(self.error(format!("Unexpected {}", describe(other)))),
        };
        for c in literal.chars() {
            self.expect(c)?;
        }
        Ok(value)
    }

    fn array(&mut self) -> Result<Value> {
        let mut items = Vec::new();
        self.expect('[')?;
        self.white();
        if self.ch == Some(']') {
            self.advance();
            return Ok(Value::Array(items));
        }
        while self.ch.is_some() {
            items.push(self.value()?);
            self.white();
            if self.ch == Some(']') {
                self.advance();
                return Ok(Value::Array(items));
            }
            self.expect(',')?;
            self.white();
        }
        Err(self.error("Bad array"))
    }

    fn object(&mut self) -> Result<Value> {
        let mut map = Object::new();
        self.expect('{')?;
        self.white();
        if self.ch == Some('}') {
            self.advance();
            return Ok(Value::Object(map));
        }
        while self.ch.is_some() {
            let key = self.string()?;
            self.white();
            self.expect(':')?;
            // duplicate keys are not an error, the last one wins
            let value = self.value()?;
            map.insert(key, value);
            self.white();
            if self.ch == Some('}') {
                self.advance();
                return Ok(Value::Object(map));
            }
            self.expect(',')?;
            self.white();
        }
        Err(self.error("Bad object"))
    }
}

fn unescape(c: char) -> Option<char> {
    Some(match c {
        '"' => '"',
        '\\' => '\\',
        '/' => '/',
        'b' => '\u{8}',
        'f' => '\u{c}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        _ => return None,
    })
}

fn describe(ch: Option<char>) -> String {
    match ch {
        Some(c) => format!("'{c}'"),
        None => "end of input".to_string(),
    }
}
