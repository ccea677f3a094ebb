//! User query templates.
//!
//! A template names where the login goes with either a bracketed `[username]` placeholder or a
//! bare `{username}` token. Several alternatives may be listed, separated by `;`.

use crate::dn::escape_value;

const BRACKETED_PLACEHOLDER: &str = "[username]";
const BARE_PLACEHOLDER: &str = "{username}";

/// Parsed user query template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    alternatives: Vec<String>,
}

impl UserQuery {
    /// Parses a template, returning `None` when it is blank.
    #[must_use]
    pub fn parse(template: &str) -> Option<Self> {
        let alternatives: Vec<String> = template
            .split(';')
            .map(str::trim)
            .filter(|alternative| !alternative.is_empty())
            .map(str::to_string)
            .collect();

        if alternatives.is_empty() {
            None
        } else {
            Some(Self { alternatives })
        }
    }

    /// Template alternatives in configured order.
    #[must_use]
    pub fn alternatives(&self) -> &[String] {
        &self.alternatives
    }

    /// Builds the search filter for `username`.
    ///
    /// Each alternative is wrapped in parentheses if needed; several alternatives are OR-combined.
    #[must_use]
    pub fn search_filter(&self, username: &str) -> String {
        let escaped = escape_filter_value(username);
        let mut filters = self
            .alternatives
            .iter()
            .map(|alternative| wrap_filter(&substitute(alternative, &escaped)))
            .collect::<Vec<_>>();

        if filters.len() == 1 {
            filters.remove(0)
        } else {
            format!("(|{})", filters.concat())
        }
    }

    /// Builds the candidate DNs for `username` when the template describes DNs directly.
    #[must_use]
    pub fn distinguished_names(&self, username: &str) -> Vec<String> {
        let escaped = escape_value(username);
        self.alternatives
            .iter()
            .map(|alternative| substitute(alternative, &escaped))
            .collect()
    }
}

/// Escapes a value for use inside a search filter (RFC 4515).
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    value
        .chars()
        .flat_map(|ch| match ch {
            '*' => "\\2a".chars().collect::<Vec<_>>(),
            '(' => "\\28".chars().collect(),
            ')' => "\\29".chars().collect(),
            '\\' => "\\5c".chars().collect(),
            '\0' => "\\00".chars().collect(),
            _ => vec![ch],
        })
        .collect::<String>()
}

fn substitute(template: &str, value: &str) -> String {
    template
        .replace(BRACKETED_PLACEHOLDER, value)
        .replace(BARE_PLACEHOLDER, value)
}

fn wrap_filter(filter: &str) -> String {
    if filter.starts_with('(') && filter.ends_with(')') {
        filter.to_string()
    } else {
        format!("({filter})")
    }
}
