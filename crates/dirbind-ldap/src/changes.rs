//! Attribute change sets for add, replace and delete requests.

use crate::session::DirectoryModification;

/// Kind of modification a change set is applied as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOperation {
    /// Add values to attributes.
    Add,
    /// Replace all values of attributes.
    Replace,
    /// Delete values (or whole attributes when no values are listed).
    Delete,
}

impl ModifyOperation {
    /// Lowercase operation name used in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Delete => "delete",
        }
    }
}

/// Attribute names mapped to the values a mutation applies.
///
/// Attributes keep their insertion order; values are deduplicated per attribute. For deletes an
/// attribute with no values removes the whole attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeChangeSet {
    changes: Vec<(String, Vec<String>)>,
}

impl AttributeChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds values for an attribute, returning the updated set.
    #[must_use]
    pub fn with<I, V>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.insert(attribute, values);
        self
    }

    /// Marks an attribute for removal as a whole (meaningful for deletes).
    ///
    /// Values queued earlier for the attribute are discarded; values inserted afterwards narrow
    /// the request to those values again.
    #[must_use]
    pub fn remove_attribute(mut self, attribute: impl Into<String>) -> Self {
        let index = self.position(attribute.into());
        self.changes[index].1.clear();
        self
    }

    /// Adds values for an attribute.
    ///
    /// Values for an attribute already in the set are merged into its existing entry.
    pub fn insert<I, V>(&mut self, attribute: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let index = self.position(attribute.into());
        let existing = &mut self.changes[index].1;
        for value in values {
            let value = value.into();
            if !existing.contains(&value) {
                existing.push(value);
            }
        }
    }

    /// Index of the attribute's entry, appending an empty one when absent.
    fn position(&mut self, attribute: String) -> usize {
        match self
            .changes
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(&attribute))
        {
            Some(index) => index,
            None => {
                self.changes.push((attribute, Vec::new()));
                self.changes.len() - 1
            }
        }
    }

    /// Number of attributes in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true when the set names no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Iterates over attributes and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.changes
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Renders the set as modifications of one kind.
    #[must_use]
    pub fn to_modifications(&self, operation: ModifyOperation) -> Vec<DirectoryModification> {
        self.changes
            .iter()
            .map(|(attribute, values)| {
                let attribute = attribute.clone();
                let values = values.clone();
                match operation {
                    ModifyOperation::Add => DirectoryModification::Add { attribute, values },
                    ModifyOperation::Replace => {
                        DirectoryModification::Replace { attribute, values }
                    }
                    ModifyOperation::Delete => DirectoryModification::Delete { attribute, values },
                }
            })
            .collect()
    }
}

impl<K, I, V> FromIterator<(K, I)> for AttributeChangeSet
where
    K: Into<String>,
    I: IntoIterator<Item = V>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut set = Self::new();
        for (attribute, values) in iter {
            set.insert(attribute, values);
        }
        set
    }
}
