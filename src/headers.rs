//! Header normalization and typed column resolution.
//!
//! Instrument exports name the same field in many ways (`Blue BC1 (ng/m^3)`,
//! `blue bc1`, `BlueBC1`). Every header is first mapped to a lower-camel-case
//! canonical name with [`transform_header`]; channel columns are then looked
//! up through [`resolve_channel`], which reports a typed [`ColumnLookup`]
//! instead of silently falling through.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::table::RawTable;

/// Maps a raw header to its canonical field name.
///
/// Parenthetical groups are dropped and whitespace is collapsed. In each
/// token `%` becomes `Percent` and `/`, `.` and `-` are removed. The first
/// token is lower-cased when it starts with an upper-case letter and kept as
/// is otherwise (`10`, `blueATN1`); the remaining tokens are appended with
/// their first letter upper-cased. The output never starts with an
/// upper-case letter, so transforming it again changes nothing.
pub fn transform_header(header: &str) -> String {
    let stripped = strip_parentheticals(header.trim());
    let mut tokens = stripped
        .split_whitespace()
        .map(clean_token)
        .filter(|t| !t.is_empty());

    let mut result = match tokens.next() {
        Some(first) if first.chars().next().is_some_and(char::is_uppercase) => first.to_lowercase(),
        Some(first) => first,
        None => String::new(),
    };
    for token in tokens {
        let mut chars = token.chars();
        if let Some(c) = chars.next() {
            result.extend(c.to_uppercase());
            result.push_str(chars.as_str());
        }
    }
    result
}

fn clean_token(token: &str) -> String {
    token
        .replace('%', "Percent")
        .chars()
        .filter(|c| !matches!(c, '/' | '.' | '-'))
        .collect()
}

/// Replaces every closed `( ... )` group with a single space. An unmatched
/// opening parenthesis is left alone.
fn strip_parentheticals(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find('(') {
        match rest[open..].find(')') {
            Some(close) => {
                out.push_str(&rest[..open]);
                out.push(' ');
                rest = &rest[open + close + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

/// Renames every column of `table` to its canonical name.
///
/// Two headers that normalize to the same name stay as two columns; name
/// lookups resolve to the last one.
pub fn normalize_headers(table: &mut RawTable) {
    table.rename_with(transform_header);
    debug!(headers = ?table.headers(), "Headers normalized");
}

/// One entry of the original → canonical header mapping.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HeaderMapping {
    pub original: String,
    pub canonical: String,
    /// Another header maps to the same canonical name.
    pub collides: bool,
}

pub fn header_mapping(headers: &[String]) -> Vec<HeaderMapping> {
    let canonical: Vec<String> = headers.iter().map(|h| transform_header(h)).collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in &canonical {
        *counts.entry(name.as_str()).or_default() += 1;
    }

    headers
        .iter()
        .zip(&canonical)
        .map(|(original, name)| HeaderMapping {
            original: original.clone(),
            canonical: name.clone(),
            collides: counts.get(name.as_str()).copied().unwrap_or(0) > 1,
        })
        .collect()
}

/// Optical channel of the aethalometer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Wavelength {
    Blue,
    Green,
    Red,
    #[serde(rename = "UV")]
    Uv,
    #[serde(rename = "IR")]
    Ir,
}

impl Wavelength {
    pub const ALL: [Wavelength; 5] = [
        Wavelength::Blue,
        Wavelength::Green,
        Wavelength::Red,
        Wavelength::Uv,
        Wavelength::Ir,
    ];

    /// Lower-case prefix used in canonical column names (`blueATN1`).
    pub fn prefix(self) -> &'static str {
        match self {
            Wavelength::Blue => "blue",
            Wavelength::Green => "green",
            Wavelength::Red => "red",
            Wavelength::Uv => "uv",
            Wavelength::Ir => "ir",
        }
    }
}

impl fmt::Display for Wavelength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Wavelength::Blue => "Blue",
            Wavelength::Green => "Green",
            Wavelength::Red => "Red",
            Wavelength::Uv => "UV",
            Wavelength::Ir => "IR",
        };
        f.write_str(name)
    }
}

impl FromStr for Wavelength {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Wavelength::ALL
            .into_iter()
            .find(|w| w.prefix() == wanted)
            .ok_or_else(|| Error::InvalidWavelength(s.to_string()))
    }
}

/// Outcome of looking up one column by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnLookup {
    Found(String),
    NotFound,
}

/// Finds `canonical` exactly, otherwise the last header accepted by
/// `fallback`.
pub fn resolve_column<F>(headers: &[String], canonical: &str, fallback: F) -> ColumnLookup
where
    F: Fn(&str) -> bool,
{
    if headers.iter().any(|h| h == canonical) {
        return ColumnLookup::Found(canonical.to_string());
    }
    match headers.iter().rev().find(|h| fallback(h)) {
        Some(h) => ColumnLookup::Found(h.clone()),
        None => ColumnLookup::NotFound,
    }
}

/// Resolved ATN/BC column names for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelColumns {
    pub wavelength: Wavelength,
    pub atn: String,
    pub bc: String,
}

/// Resolves the ATN and BC columns of `wavelength` among normalized headers.
///
/// The canonical names are `<prefix>ATN1` and `<prefix>BC1`; failing those,
/// any header containing the prefix, the quantity (`atn` / `bc`) and `1`,
/// compared case-insensitively.
pub fn resolve_channel(headers: &[String], wavelength: Wavelength) -> Result<ChannelColumns> {
    let prefix = wavelength.prefix();
    let matcher = |quantity: &'static str| {
        move |h: &str| {
            let lower = h.to_lowercase();
            lower.contains(prefix) && lower.contains(quantity) && lower.contains('1')
        }
    };

    let atn = resolve_column(headers, &format!("{prefix}ATN1"), matcher("atn"));
    let bc = resolve_column(headers, &format!("{prefix}BC1"), matcher("bc"));

    match (atn, bc) {
        (ColumnLookup::Found(atn), ColumnLookup::Found(bc)) => {
            debug!(%wavelength, atn = %atn, bc = %bc, "Channel columns resolved");
            Ok(ChannelColumns {
                wavelength,
                atn,
                bc,
            })
        }
        (ColumnLookup::NotFound, _) => Err(Error::ColumnNotFound {
            wavelength: wavelength.to_string(),
            kind: "ATN",
        }),
        (_, ColumnLookup::NotFound) => Err(Error::ColumnNotFound {
            wavelength: wavelength.to_string(),
            kind: "BC",
        }),
    }
}
