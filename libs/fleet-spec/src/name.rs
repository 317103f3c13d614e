//! Bot names and the workload identities derived from them.

use std::fmt;

/// Maximum bot name length.
pub const MAX_NAME_LENGTH: usize = 40;

/// Maximum workload identity length.
///
/// The identity names the StatefulSet, whose pods carry a
/// `controller-revision-hash` label of `{identity}-{10 char hash}`; label
/// values are limited to 63 characters.
pub const MAX_IDENTITY_LENGTH: usize = 52;

/// A validated bot name (slug).
///
/// `[A-Za-z0-9_-]`, 1-40 characters, starting and ending alphanumeric.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BotName(String);

impl BotName {
    pub fn parse(name: &str) -> Result<Self, String> {
        validate_slug(name, MAX_NAME_LENGTH)?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case, hyphenated form used inside resource names.
    pub fn segment(&self) -> String {
        self.0.to_ascii_lowercase().replace('_', "-")
    }

    /// Stable workload identity for this bot within a fleet.
    pub fn identity(&self, fleet: &str) -> String {
        format!("{}-{}", fleet.to_ascii_lowercase().replace('_', "-"), self.segment())
    }
}

impl fmt::Display for BotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BotName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for BotName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

/// Check a derived identity: it names a Service (DNS-1035 label), so it
/// must start with a letter, and it must fit [`MAX_IDENTITY_LENGTH`].
pub fn validate_identity(identity: &str) -> Result<(), String> {
    if identity.len() > MAX_IDENTITY_LENGTH {
        return Err(format!(
            "'{identity}' is {} characters, over the limit of {MAX_IDENTITY_LENGTH}",
            identity.len()
        ));
    }
    if !identity.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(format!("'{identity}' must start with a letter"));
    }
    Ok(())
}

/// Check a slug: `[A-Za-z0-9_-]`, alphanumeric at both ends, bounded length.
pub fn validate_slug(value: &str, max_len: usize) -> Result<(), String> {
    if value.is_empty() {
        return Err("cannot be empty".to_string());
    }
    if value.len() > max_len {
        return Err(format!("exceeds maximum length of {max_len} characters"));
    }

    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(format!("invalid character '{c}'"));
    }

    let first = value.chars().next();
    let last = value.chars().last();
    if !first.is_some_and(|c| c.is_ascii_alphanumeric())
        || !last.is_some_and(|c| c.is_ascii_alphanumeric())
    {
        return Err("must start and end with a letter or digit".to_string());
    }

    Ok(())
}
