// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Conversion between kernel attribute text and numeric values
//!
//! The FC transport class renders enumerations as free text (`Online`,
//! `10 Gbit`, `Class 3`). A [`NameTable`] maps those tokens to values.
//! Lookups are case-insensitive prefix matches tried in table order, so
//! the order of a table decides between overlapping prefixes.

use std::borrow::Cow;

use itertools::Itertools;
use thiserror::Error;

/// Ordered `(token, value)` pairs
pub type NameTable = [(&'static str, u32)];

/// Errors raised when attribute text does not match its grammar
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unrecognised token {0:?}")]
    UnknownToken(String),

    #[error("unexpected separator {found:?} in {text:?}")]
    Separator { found: char, text: String },

    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    #[error("expected {expected} words, found {found}")]
    WordCount { expected: usize, found: usize },
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len() && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

fn lookup<'t>(table: &'t NameTable, text: &str) -> Option<&'t (&'static str, u32)> {
    table.iter().find(|(name, _)| starts_with_ignore_case(text, name))
}

/// Step over an item separator: end of text, or `,` and one optional space
fn next_item<'a>(text: &str, rest: &'a str) -> Result<Option<&'a str>, ParseError> {
    match rest.as_bytes().first() {
        None => Ok(None),
        Some(b',') => {
            let rest = &rest[1..];
            Ok(Some(rest.strip_prefix(' ').unwrap_or(rest)))
        }
        Some(_) => Err(ParseError::Separator {
            found: rest.chars().next().unwrap_or_default(),
            text: text.to_owned(),
        }),
    }
}

/// Encode `text` to the value of the first table entry that prefixes it
pub fn encode(table: &NameTable, text: &str) -> Option<u32> {
    lookup(table, text.trim()).map(|(_, value)| *value)
}

/// Decode `value` to the token of the first entry carrying it
pub fn decode(table: &NameTable, value: u32) -> Cow<'static, str> {
    match table.iter().find(|(_, v)| *v == value) {
        Some((name, _)) => Cow::Borrowed(name),
        None => Cow::Owned(format!("Unknown (0x{value:x})")),
    }
}

/// Decode a flag set as a comma-separated list of tokens.
///
/// Bits with no table entry are rendered as a trailing `Unknown` item.
pub fn decode_flags(table: &NameTable, flags: u32) -> String {
    if flags == 0 {
        return decode(table, 0).into_owned();
    }
    let known = table
        .iter()
        .filter(|(_, v)| *v != 0 && flags & v == *v)
        .fold(0, |acc, (_, v)| acc | v);
    let mut names = table
        .iter()
        .filter(|(_, v)| *v != 0 && flags & v == *v)
        .map(|(name, _)| Cow::Borrowed(*name));
    let rest = flags & !known;
    if rest != 0 {
        names.chain(std::iter::once(Cow::Owned(format!("Unknown (0x{rest:x})")))).join(", ")
    } else {
        names.join(", ")
    }
}

/// Parse a comma-separated list of table tokens into the OR of their values.
///
/// `"1 Gbit, 10 Gbit"` yields the 1 and 10 Gbit flags combined.
pub fn decode_bitmask_list(table: &NameTable, text: &str) -> Result<u32, ParseError> {
    let text = text.trim();
    let mut rest = text;
    let mut mask = 0;
    loop {
        let (name, value) = lookup(table, rest).ok_or_else(|| ParseError::UnknownToken(rest.to_owned()))?;
        mask |= value;
        match next_item(text, &rest[name.len()..])? {
            Some(next) => rest = next,
            None => return Ok(mask),
        }
    }
}

/// Parse a class-of-service list such as `"Class 2, Class 3"`.
///
/// Each class number sets the bit of the same number; the `Class ` label
/// is optional. `unspecified` yields an empty set.
pub fn parse_classes(text: &str) -> Result<u32, ParseError> {
    let text = text.trim();
    if text.contains("unspecified") {
        return Ok(0);
    }
    let mut rest = text;
    let mut mask = 0u32;
    loop {
        rest = rest.strip_prefix("Class ").unwrap_or(rest);
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let class = rest[..digits]
            .parse::<u32>()
            .ok()
            .filter(|c| *c < u32::BITS)
            .ok_or_else(|| ParseError::InvalidNumber(rest.to_owned()))?;
        mask |= 1 << class;
        match next_item(text, &rest[digits..])? {
            Some(next) => rest = next,
            None => return Ok(mask),
        }
    }
}

/// Parse exactly `N` whitespace separated `0x`-prefixed words, keeping the
/// low byte of each word in file order.
pub fn parse_hex_words<const N: usize>(text: &str) -> Result<[u8; N], ParseError> {
    let mut bytes = [0u8; N];
    let mut found = 0;
    for word in text.split_whitespace() {
        if found == N {
            return Err(ParseError::WordCount {
                expected: N,
                found: text.split_whitespace().count(),
            });
        }
        let value = word
            .strip_prefix("0x")
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .ok_or_else(|| ParseError::InvalidNumber(word.to_owned()))?;
        bytes[found] = value as u8;
        found += 1;
    }
    if found != N {
        return Err(ParseError::WordCount { expected: N, found });
    }
    Ok(bytes)
}
