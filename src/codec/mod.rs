//! Numeric-safe text codec
//!
//! Supports: objects, arrays, strings, booleans, null, doubles and exact
//! 64-bit integers
//!
//! # Overview
//!
//! Store rows travel as JSON text. A plain JSON reader turns every number
//! into a double and silently corrupts keys and counters above 2^53. This
//! codec keeps any integer numeral longer than 15 characters as
//! [`Value::BigInt`] and writes it back digit for digit.
//!
//! ```
//! use kvpage::codec::{parse, stringify, Value};
//!
//! let value = parse("12345678901234567").unwrap();
//! assert_eq!(value, Value::BigInt(12_345_678_901_234_567));
//! assert_eq!(stringify(&value), "12345678901234567");
//! ```

mod parser;
mod value;
mod writer;

pub use parser::{parse, parse_with_reviver};
pub use value::{Object, Value, BIGINT_THRESHOLD};
pub use writer::{
    stringify, stringify_pretty, stringify_with, stringify_with_args, Indent, Replacer,
    MAX_INDENT,
};

use crate::error::Result;
use serde::de::DeserializeOwned;

/// Parse a text and deserialize it into a typed value
///
/// Goes through [`parse`], so 64-bit integers reach `i64`/`u64` fields
/// without passing through a double.
pub fn decode_as<T: DeserializeOwned>(text: &str) -> Result<T> {
    let value = parse(text)?;
    let json = serde_json::Value::try_from(value)?;
    Ok(serde_json::from_value(json)?)
}
