//! In-memory directory used by the integration tests.
//!
//! The directory is seeded from `tests/fixtures/directory.json` and implements the public
//! connector and session traits, answering with the result codes a real server would send.

#![allow(dead_code)]

use async_trait::async_trait;
use dirbind_core::Error;
use dirbind_ldap::{
    result_code, DirectoryConnector, DirectoryModification, DirectorySession, DistinguishedName,
    LdapStatus, RawEntry, RawSearchResult, Result, SearchScope,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const OBJECT_CLASS_VIOLATION: u32 = 65;
const PASSWORD_ATTRIBUTE: &str = "userPassword";

#[derive(Deserialize)]
struct Fixture {
    schema: Vec<String>,
    entries: Vec<FixtureEntry>,
}

#[derive(Deserialize)]
struct FixtureEntry {
    dn: String,
    attributes: BTreeMap<String, Vec<String>>,
}

#[derive(Clone)]
struct StoredEntry {
    dn: String,
    key: String,
    attributes: Vec<(String, Vec<String>)>,
}

impl StoredEntry {
    fn values(&self, attribute: &str) -> Option<&Vec<String>> {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values)
    }
}

struct DirectoryData {
    schema: Vec<String>,
    entries: Vec<StoredEntry>,
}

impl DirectoryData {
    fn allows(&self, attribute: &str) -> bool {
        self.schema
            .iter()
            .any(|name| name.eq_ignore_ascii_case(attribute))
    }

    fn find(&self, key: &str) -> Option<&StoredEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }
}

/// Shared in-memory directory.
#[derive(Clone)]
pub struct FakeDirectory {
    data: Arc<Mutex<DirectoryData>>,
    opens: Arc<AtomicUsize>,
}

impl FakeDirectory {
    /// Loads the directory fixture.
    pub fn from_fixture() -> Self {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("directory.json");
        let contents = fs::read_to_string(&path).unwrap_or_else(|e| {
            panic!("Failed to read directory fixture at {}: {}", path.display(), e)
        });
        let fixture: Fixture = serde_json::from_str(&contents)
            .unwrap_or_else(|e| panic!("Failed to parse directory fixture: {e}"));

        let entries = fixture
            .entries
            .into_iter()
            .map(|entry| StoredEntry {
                key: normalize(&entry.dn).expect("fixture DNs are valid"),
                dn: entry.dn,
                attributes: entry.attributes.into_iter().collect(),
            })
            .collect();

        Self {
            data: Arc::new(Mutex::new(DirectoryData {
                schema: fixture.schema,
                entries,
            })),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Connector that opens sessions against this directory.
    pub fn connector(&self) -> Box<dyn DirectoryConnector> {
        Box::new(FakeConnector {
            directory: self.clone(),
            failure: None,
        })
    }

    /// Connector whose every open attempt fails with `message`.
    pub fn failing_connector(&self, message: &str) -> Box<dyn DirectoryConnector> {
        Box::new(FakeConnector {
            directory: self.clone(),
            failure: Some(message.to_string()),
        })
    }

    /// Number of open attempts seen so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Current values of `attribute` on the entry at `dn`.
    pub fn values(&self, dn: &str, attribute: &str) -> Vec<String> {
        let data = self.data.lock().unwrap();
        normalize(dn)
            .and_then(|key| data.find(&key).and_then(|entry| entry.values(attribute).cloned()))
            .unwrap_or_default()
    }
}

struct FakeConnector {
    directory: FakeDirectory,
    failure: Option<String>,
}

#[async_trait]
impl DirectoryConnector for FakeConnector {
    async fn open(&self) -> Result<Box<dyn DirectorySession>> {
        self.directory.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(Error::connection(message.clone()));
        }
        Ok(Box::new(FakeSession {
            data: Arc::clone(&self.directory.data),
        }))
    }
}

struct FakeSession {
    data: Arc<Mutex<DirectoryData>>,
}

#[async_trait]
impl DirectorySession for FakeSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<LdapStatus> {
        if dn.is_empty() && password.is_empty() {
            return Ok(LdapStatus::success());
        }

        let data = self.data.lock().unwrap();
        let accepted = normalize(dn)
            .and_then(|key| data.find(&key).and_then(|e| e.values(PASSWORD_ATTRIBUTE)))
            .is_some_and(|passwords| !password.is_empty() && passwords.iter().any(|p| p == password));

        Ok(if accepted {
            LdapStatus::success()
        } else {
            LdapStatus::new(result_code::INVALID_CREDENTIALS, "invalid credentials")
        })
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<RawSearchResult> {
        let Some(filter) = parse_filter(filter) else {
            return Ok(RawSearchResult::from_status(LdapStatus::new(
                result_code::FILTER_ERROR,
                "bad search filter",
            )));
        };

        let data = self.data.lock().unwrap();
        let base = if base_dn.is_empty() {
            String::new()
        } else {
            let Some(base) = normalize(base_dn) else {
                return Ok(RawSearchResult::from_status(LdapStatus::new(
                    result_code::INVALID_DN_SYNTAX,
                    "invalid DN",
                )));
            };
            if data.find(&base).is_none() {
                return Ok(RawSearchResult::from_status(LdapStatus::new(
                    result_code::NO_SUCH_OBJECT,
                    "no such object",
                )));
            }
            base
        };

        let entries = data
            .entries
            .iter()
            .filter(|entry| in_scope(&entry.key, &base, scope))
            .filter(|entry| filter.matches(entry))
            .map(|entry| RawEntry {
                dn: entry.dn.clone(),
                attributes: project(entry, attributes),
            })
            .collect();

        Ok(RawSearchResult::with_entries(entries))
    }

    async fn compare(&mut self, dn: &str, attribute: &str, value: &str) -> Result<LdapStatus> {
        let data = self.data.lock().unwrap();
        let Some(entry) = normalize(dn).and_then(|key| data.find(&key)) else {
            return Ok(LdapStatus::new(result_code::NO_SUCH_OBJECT, "no such object"));
        };
        let Some(values) = entry.values(attribute) else {
            return Ok(LdapStatus::new(
                result_code::NO_SUCH_ATTRIBUTE,
                "no such attribute",
            ));
        };

        Ok(if values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
            LdapStatus::new(result_code::COMPARE_TRUE, "")
        } else {
            LdapStatus::new(result_code::COMPARE_FALSE, "")
        })
    }

    async fn modify(
        &mut self,
        dn: &str,
        modifications: &[DirectoryModification],
    ) -> Result<LdapStatus> {
        let mut data = self.data.lock().unwrap();
        let Some(key) = normalize(dn) else {
            return Ok(LdapStatus::new(result_code::INVALID_DN_SYNTAX, "invalid DN"));
        };
        let Some(index) = data.entries.iter().position(|entry| entry.key == key) else {
            return Ok(LdapStatus::new(result_code::NO_SUCH_OBJECT, "no such object"));
        };

        let mut attributes = data.entries[index].attributes.clone();
        for modification in modifications {
            if let Err(status) = apply(&data, &mut attributes, modification) {
                return Ok(status);
            }
        }
        data.entries[index].attributes = attributes;
        Ok(LdapStatus::success())
    }

    async fn unbind(&mut self) -> Result<()> {
        Ok(())
    }
}

fn apply(
    data: &DirectoryData,
    attributes: &mut Vec<(String, Vec<String>)>,
    modification: &DirectoryModification,
) -> std::result::Result<(), LdapStatus> {
    match modification {
        DirectoryModification::Add { attribute, values } => {
            if !data.allows(attribute) {
                return Err(LdapStatus::new(
                    OBJECT_CLASS_VIOLATION,
                    format!("attribute `{attribute}` not allowed"),
                ));
            }
            let index = match position_of(attributes, attribute) {
                Some(index) => index,
                None => {
                    attributes.push((attribute.clone(), Vec::new()));
                    attributes.len() - 1
                }
            };
            for value in values {
                if attributes[index].1.contains(value) {
                    return Err(LdapStatus::new(
                        ATTRIBUTE_OR_VALUE_EXISTS,
                        "attribute or value exists",
                    ));
                }
                attributes[index].1.push(value.clone());
            }
        }
        DirectoryModification::Replace { attribute, values } => {
            if !data.allows(attribute) {
                return Err(LdapStatus::new(
                    result_code::UNDEFINED_ATTRIBUTE_TYPE,
                    format!("undefined attribute type `{attribute}`"),
                ));
            }
            match position_of(attributes, attribute) {
                Some(index) if values.is_empty() => {
                    attributes.remove(index);
                }
                Some(index) => attributes[index].1 = values.clone(),
                None => {
                    return Err(LdapStatus::new(
                        result_code::NO_SUCH_ATTRIBUTE,
                        format!("no such attribute `{attribute}`"),
                    ))
                }
            }
        }
        DirectoryModification::Delete { attribute, values } => {
            let Some(index) = position_of(attributes, attribute) else {
                return Err(LdapStatus::new(
                    result_code::NO_SUCH_ATTRIBUTE,
                    format!("no such attribute `{attribute}`"),
                ));
            };
            if values.is_empty() {
                attributes.remove(index);
            } else {
                for value in values {
                    let existing = &mut attributes[index].1;
                    let Some(at) = existing.iter().position(|v| v == value) else {
                        return Err(LdapStatus::new(
                            result_code::NO_SUCH_ATTRIBUTE,
                            format!("no such value `{value}`"),
                        ));
                    };
                    existing.remove(at);
                }
                if attributes[index].1.is_empty() {
                    attributes.remove(index);
                }
            }
        }
    }
    Ok(())
}

fn position_of(attributes: &[(String, Vec<String>)], name: &str) -> Option<usize> {
    attributes
        .iter()
        .position(|(attribute, _)| attribute.eq_ignore_ascii_case(name))
}

fn normalize(dn: &str) -> Option<String> {
    DistinguishedName::parse(dn)
        .ok()
        .map(|dn| dn.as_str().to_ascii_lowercase())
}

fn in_scope(key: &str, base: &str, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Base => key == base,
        SearchScope::OneLevel => key
            .strip_suffix(base)
            .and_then(|rest| rest.strip_suffix(','))
            .is_some_and(|rdn| !rdn.is_empty() && !rdn.contains(',')),
        SearchScope::Subtree => {
            base.is_empty() || key == base || key.ends_with(&format!(",{base}"))
        }
    }
}

fn project(entry: &StoredEntry, requested: &[String]) -> Vec<(String, Vec<String>)> {
    if requested.iter().any(|attribute| attribute == "1.1") {
        return Vec::new();
    }
    entry
        .attributes
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(PASSWORD_ATTRIBUTE))
        .filter(|(name, _)| {
            requested.is_empty()
                || requested
                    .iter()
                    .any(|attribute| attribute.eq_ignore_ascii_case(name))
        })
        .cloned()
        .collect()
}

enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Present(String),
    Equal(String, String),
}

impl Filter {
    fn matches(&self, entry: &StoredEntry) -> bool {
        match self {
            Self::And(filters) => filters.iter().all(|filter| filter.matches(entry)),
            Self::Or(filters) => filters.iter().any(|filter| filter.matches(entry)),
            Self::Not(filter) => !filter.matches(entry),
            Self::Present(attribute) => entry.values(attribute).is_some(),
            Self::Equal(attribute, value) => entry
                .values(attribute)
                .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value))),
        }
    }
}

fn parse_filter(input: &str) -> Option<Filter> {
    let (filter, rest) = parse_item(input.trim())?;
    rest.is_empty().then_some(filter)
}

fn parse_item(input: &str) -> Option<(Filter, &str)> {
    let body = input.strip_prefix('(')?;
    match body.chars().next()? {
        operator @ ('&' | '|') => {
            let mut rest = &body[1..];
            let mut filters = Vec::new();
            while rest.starts_with('(') {
                let (filter, remaining) = parse_item(rest)?;
                filters.push(filter);
                rest = remaining;
            }
            let rest = rest.strip_prefix(')')?;
            let filter = if operator == '&' {
                Filter::And(filters)
            } else {
                Filter::Or(filters)
            };
            Some((filter, rest))
        }
        '!' => {
            let (filter, rest) = parse_item(&body[1..])?;
            Some((Filter::Not(Box::new(filter)), rest.strip_prefix(')')?))
        }
        _ => {
            let end = body.find(')')?;
            let (attribute, value) = body[..end].split_once('=')?;
            if attribute.is_empty() || value.contains('(') {
                return None;
            }
            let filter = if value == "*" {
                Filter::Present(attribute.to_string())
            } else {
                Filter::Equal(attribute.to_string(), unescape_filter_value(value)?)
            };
            Some((filter, &body[end + 1..]))
        }
    }
}

fn unescape_filter_value(value: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(value.len());
    let raw = value.as_bytes();
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' {
            let hex = value.get(i + 1..i + 3)?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8(bytes).ok()
}
