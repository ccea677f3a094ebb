//! Distinguished name parsing (RFC 4514) and value escaping.

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use dirbind_core::Error as CoreError;

/// Reasons a string is not a well-formed distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The input was blank.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// Two separators with nothing between them, or a trailing separator.
    #[error("distinguished name `{0}` contains an empty component")]
    EmptyComponent(String),
    /// A component has no `=`.
    #[error("distinguished name component `{0}` is not an attribute=value pair")]
    MissingEquals(String),
    /// A component has nothing left of the `=`.
    #[error("distinguished name `{0}` has a component without an attribute type")]
    MissingType(String),
    /// A component has nothing right of the `=`.
    #[error("distinguished name component `{0}` has no value")]
    MissingValue(String),
    /// The input ended with a lone backslash.
    #[error("distinguished name ends inside an escape sequence")]
    DanglingEscape,
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::invalid_dn(err.to_string())
    }
}

/// One `attribute=value` pair of a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Attribute type (e.g. `uid`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for RelativeDistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape_value(&self.value))
    }
}

/// Parsed distinguished name.
///
/// Keeps a canonical string form next to the parsed RDNs. Parsing is strict: empty components
/// (for example doubled separators) are rejected before anything is sent to the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Vec<RelativeDistinguishedName>>,
}

impl DistinguishedName {
    /// Parses a distinguished name.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] for blank input or malformed components.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let input = input.as_ref().trim();
        if input.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let mut parser = PairParser::new(input);
        let mut rdns = Vec::new();
        let mut rdn = Vec::new();
        let mut chars = input.chars();

        while let Some(ch) = chars.next() {
            match ch {
                '\\' => {
                    let escaped = chars.next().ok_or(DistinguishedNameError::DanglingEscape)?;
                    parser.push_escaped(escaped)?;
                }
                '=' if parser.attribute.is_none() => parser.close_attribute()?,
                '+' => rdn.push(parser.finish()?),
                ',' => {
                    rdn.push(parser.finish()?);
                    rdns.push(std::mem::take(&mut rdn));
                }
                _ => parser.push(ch),
            }
        }
        rdn.push(parser.finish()?);
        rdns.push(rdn);

        Ok(Self {
            raw: render(&rdns),
            rdns,
        })
    }

    /// Canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// All attribute/value pairs, leftmost RDN first.
    pub fn components(&self) -> impl Iterator<Item = &RelativeDistinguishedName> + '_ {
        self.rdns.iter().flatten()
    }

    /// Value of the first pair whose attribute type matches (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.components()
            .find(|pair| pair.attribute.eq_ignore_ascii_case(attribute))
            .map(RelativeDistinguishedName::value)
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for DistinguishedName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// Accumulates one `attribute=value` pair while scanning.
struct PairParser<'a> {
    input: &'a str,
    attribute: Option<String>,
    buffer: String,
    /// Length of `buffer` that ends in an escaped character and must survive trimming.
    protected: usize,
}

impl<'a> PairParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            attribute: None,
            buffer: String::new(),
            protected: 0,
        }
    }

    fn push(&mut self, ch: char) {
        if !(ch == ' ' && self.buffer.is_empty()) {
            self.buffer.push(ch);
        }
    }

    fn push_escaped(&mut self, ch: char) -> std::result::Result<(), DistinguishedNameError> {
        if self.attribute.is_none() {
            return Err(DistinguishedNameError::MissingEquals(self.input.to_string()));
        }
        self.buffer.push(ch);
        self.protected = self.buffer.len();
        Ok(())
    }

    fn close_attribute(&mut self) -> std::result::Result<(), DistinguishedNameError> {
        let attribute = self.buffer.trim_end();
        if attribute.is_empty() {
            return Err(DistinguishedNameError::MissingType(self.input.to_string()));
        }
        self.attribute = Some(attribute.to_string());
        self.buffer.clear();
        Ok(())
    }

    fn finish(&mut self) -> std::result::Result<RelativeDistinguishedName, DistinguishedNameError> {
        let end = self.buffer.trim_end().len().max(self.protected);
        let mut value = std::mem::take(&mut self.buffer);
        value.truncate(end);
        self.protected = 0;

        match self.attribute.take() {
            None if value.is_empty() => Err(DistinguishedNameError::EmptyComponent(
                self.input.to_string(),
            )),
            None => Err(DistinguishedNameError::MissingEquals(value)),
            Some(attribute) if value.is_empty() => {
                Err(DistinguishedNameError::MissingValue(attribute))
            }
            Some(attribute) => Ok(RelativeDistinguishedName { attribute, value }),
        }
    }
}

fn render(rdns: &[Vec<RelativeDistinguishedName>]) -> String {
    let mut raw = String::new();
    for (index, rdn) in rdns.iter().enumerate() {
        if index > 0 {
            raw.push(',');
        }
        for (position, pair) in rdn.iter().enumerate() {
            if position > 0 {
                raw.push('+');
            }
            raw.push_str(&pair.to_string());
        }
    }
    raw
}

/// Escapes a value for use inside an RDN (RFC 4514).
#[must_use]
pub fn escape_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    value
        .chars()
        .enumerate()
        .fold(String::with_capacity(value.len()), |mut escaped, (index, ch)| {
            let special = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
                || (index == 0 && matches!(ch, ' ' | '#'))
                || (index == last && ch == ' ');
            if special {
                escaped.push('\\');
            }
            escaped.push(ch);
            escaped
        })
}
