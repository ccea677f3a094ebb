//! User details read from a directory entry.

use serde::Serialize;

use crate::config::DirectoryConfig;
use crate::dn::DistinguishedName;
use crate::results::Entry;
use crate::Result;

/// Identity attributes of one user entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserDetails {
    /// Distinguished name of the user entry.
    pub dn: DistinguishedName,
    /// Login name (the configured uid attribute).
    pub uid: Option<String>,
    /// Full name (the configured full-name attribute).
    pub full_name: Option<String>,
    /// Primary email address (the configured email attribute).
    pub email: Option<String>,
    /// Every attribute returned for the entry.
    pub attributes: Vec<(String, Vec<String>)>,
}

impl UserDetails {
    /// Builds user details from an entry using the attribute names configured in `config`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-DN error if the entry DN cannot be parsed.
    pub fn from_entry(entry: &Entry, config: &DirectoryConfig) -> Result<Self> {
        let dn = DistinguishedName::parse(entry.dn())?;
        let first = |attribute: &str| entry.first(attribute).map(str::to_owned);

        Ok(Self {
            uid: first(config.uid_attribute()),
            full_name: first(config.fullname_attribute()),
            email: first(config.email_attribute()),
            attributes: entry
                .attribute_names()
                .map(|name| {
                    (
                        name.to_string(),
                        entry.values(name).unwrap_or_default().to_vec(),
                    )
                })
                .collect(),
            dn,
        })
    }

    /// Login name.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// Full name.
    #[must_use]
    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }

    /// Email address.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the preferred display name.
    ///
    /// Falls back from the full name to the uid, then to the value of the entry's leading RDN.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name()
            .or_else(|| self.uid())
            .or_else(|| self.dn.components().next().map(|rdn| rdn.value()))
            .unwrap_or_else(|| self.dn.as_str())
    }

    /// Returns all values of an extra attribute (case-insensitive).
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(attribute, _)| attribute.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DirectoryConfig {
        DirectoryConfig::new("localhost", 389)
            .unwrap()
            .with_attribute_names("sAMAccountName", "displayName", "userPrincipalName")
    }

    #[test]
    fn uses_configured_attribute_names() {
        let entry = Entry::new(
            "cn=John Doe,ou=People,dc=example,dc=com",
            vec![
                ("sAMAccountName".to_string(), vec!["jdoe".to_string()]),
                ("displayName".to_string(), vec!["John Doe".to_string()]),
                (
                    "userPrincipalName".to_string(),
                    vec!["jdoe@example.com".to_string()],
                ),
                (
                    "memberOf".to_string(),
                    vec!["cn=staff,dc=example,dc=com".to_string()],
                ),
            ],
        );

        let details = UserDetails::from_entry(&entry, &config()).unwrap();
        assert_eq!(details.uid(), Some("jdoe"));
        assert_eq!(details.full_name(), Some("John Doe"));
        assert_eq!(details.email(), Some("jdoe@example.com"));
        assert_eq!(details.attribute("memberof").unwrap().len(), 1);
        assert_eq!(details.display_name(), "John Doe");

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["dn"], "cn=John Doe,ou=People,dc=example,dc=com");
        assert_eq!(json["uid"], "jdoe");
    }

    #[test]
    fn display_name_falls_back() {
        let entry = Entry::new(
            "cn=Ann Smith,dc=example,dc=com",
            vec![("sAMAccountName".to_string(), vec!["asmith".to_string()])],
        );
        let details = UserDetails::from_entry(&entry, &config()).unwrap();
        assert_eq!(details.display_name(), "asmith");

        let bare = UserDetails::from_entry(
            &Entry::new("cn=Ann Smith,dc=example,dc=com", Vec::new()),
            &config(),
        )
        .unwrap();
        assert_eq!(bare.display_name(), "Ann Smith");
    }
}
