//! Materialized search and read results.

use crate::dn::DistinguishedName;
use crate::session::{result_code, RawEntry, RawSearchResult};
use crate::Result;
use dirbind_core::{codes, Error};
use std::collections::HashSet;

/// Directory entry with its attributes.
///
/// Attributes keep the order the session delivered them in (sorted by name for the `ldap3`
/// backend). Attribute lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: String,
    attributes: Vec<(String, Vec<String>)>,
}

impl Entry {
    /// Creates an entry from a DN and its attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>, attributes: Vec<(String, Vec<String>)>) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// Distinguished name of the entry.
    #[must_use]
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Attribute names in delivery order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.attributes.iter().map(|(name, _)| name.as_str())
    }

    /// Returns all values for the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values.as_slice())
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.value(attribute, 0)
    }

    /// Returns the value at `index`, or `None` when the attribute or index is absent.
    #[must_use]
    pub fn value(&self, attribute: &str, index: usize) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.get(index))
            .map(String::as_str)
    }

    /// Number of values held by the attribute (zero when absent).
    #[must_use]
    pub fn count_values(&self, attribute: &str) -> usize {
        self.values(attribute).map_or(0, <[String]>::len)
    }

    /// Parses the attribute as boolean (`true` / `1`).
    #[must_use]
    pub fn bool_value(&self, attribute: &str) -> bool {
        self.first(attribute)
            .is_some_and(|value| value.eq_ignore_ascii_case("true") || value == "1")
    }
}

/// Ordered entries produced by one search or read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    entries: Vec<Entry>,
}

impl SearchResults {
    /// Result with no entries.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Materializes a raw search result.
    ///
    /// The raw result must carry a success (or size-limit) status and every entry must have a
    /// non-empty, parsable DN that is unique within the result.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error (10121) when the raw result does not satisfy these rules.
    pub fn from_raw(raw: RawSearchResult) -> Result<Self> {
        Self::materialize(raw, false)
    }

    /// Materializes the response to a base-scoped read of the empty DN, whose single entry is
    /// the root DSE and carries an empty DN.
    pub(crate) fn from_root_read(raw: RawSearchResult) -> Result<Self> {
        Self::materialize(raw, true)
    }

    fn materialize(raw: RawSearchResult, allow_root: bool) -> Result<Self> {
        let status = &raw.status;
        if status.rc != result_code::SUCCESS && status.rc != result_code::SIZE_LIMIT_EXCEEDED {
            return Err(invalid_raw(format!(
                "raw result carries a failed status (rc={}): {}",
                status.rc, status.text
            )));
        }

        let mut seen = HashSet::with_capacity(raw.entries.len());
        let mut entries = Vec::with_capacity(raw.entries.len());
        for RawEntry { dn, attributes } in raw.entries {
            if dn.trim().is_empty() {
                if !allow_root {
                    return Err(invalid_raw("raw result contains an entry without a DN"));
                }
            } else {
                DistinguishedName::parse(&dn).map_err(|err| {
                    invalid_raw(format!("raw result entry `{dn}` is invalid: {err}"))
                })?;
            }
            if !seen.insert(dn.to_ascii_lowercase()) {
                return Err(invalid_raw(format!("raw result repeats entry `{dn}`")));
            }
            entries.push(Entry::new(dn, attributes));
        }

        Ok(Self { entries })
    }

    /// Number of entries.
    #[must_use]
    pub fn count_entries(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no entries matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry at `index`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error (10122) when `index` is out of range.
    pub fn entry(&self, index: usize) -> Result<&Entry> {
        self.entries.get(index).ok_or_else(|| {
            Error::invalid_argument(
                codes::ENTRY_OUT_OF_RANGE,
                format!(
                    "entry index {index} out of range ({} entries)",
                    self.entries.len()
                ),
            )
        })
    }

    /// Returns the DN of the entry at `index`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error (10122) when `index` is out of range.
    pub fn dn(&self, index: usize) -> Result<&str> {
        self.entry(index).map(Entry::dn)
    }

    /// Number of values of `attribute` on the entry at `index`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error (10122) when `index` is out of range.
    pub fn count_values(&self, index: usize, attribute: &str) -> Result<usize> {
        self.entry(index).map(|entry| entry.count_values(attribute))
    }

    /// Returns one value, or `None` when the attribute or value index is absent.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error (10122) when `index` is out of range.
    pub fn value(&self, index: usize, attribute: &str, value_index: usize) -> Result<Option<&str>> {
        self.entry(index)
            .map(|entry| entry.value(attribute, value_index))
    }

    /// Returns all values of `attribute` on the entry at `index` (empty when absent).
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error (10122) when `index` is out of range.
    pub fn values(&self, index: usize, attribute: &str) -> Result<&[String]> {
        self.entry(index)
            .map(|entry| entry.values(attribute).unwrap_or_default())
    }

    /// Iterates over the entries in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    /// Consumes the result, returning its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a SearchResults {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn invalid_raw(message: impl Into<String>) -> Error {
    Error::invalid_argument(codes::INVALID_RAW_RESULT, message)
}
