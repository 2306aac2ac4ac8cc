use std::{borrow::Borrow, fmt, str::FromStr};

/// Identifies the owner of a group of network sets, e.g. the name of the cluster whose pods are
/// being watched.
///
/// Scopes are RFC 1123 labels so that they never contain the `.` separator used in
/// [`NetworkSetId`]s.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Scope(String);

/// The name of a network set, both in the store and in the external API.
///
/// Ids are formatted as `{scope}.{namespace}.{name}`. Neither scopes nor Kubernetes namespaces may
/// contain dots, so distinct triples always produce distinct ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkSetId(String);

#[derive(Debug, thiserror::Error)]
#[error("invalid scope {0:?}: must be a lowercase RFC 1123 label of at most 63 characters")]
pub struct InvalidScope(String);

// === impl Scope ===

impl Scope {
    const MAX_LEN: usize = 63;

    pub fn new(scope: impl Into<String>) -> Result<Self, InvalidScope> {
        let scope = scope.into();
        let valid_chars = scope
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        let valid_ends = !scope.starts_with('-') && !scope.ends_with('-');
        if scope.is_empty() || scope.len() > Self::MAX_LEN || !valid_chars || !valid_ends {
            return Err(InvalidScope(scope));
        }
        Ok(Self(scope))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Scope {
    type Err = InvalidScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// === impl NetworkSetId ===

impl NetworkSetId {
    pub fn new(scope: &Scope, namespace: &str, name: &str) -> Self {
        Self(format!("{}.{}.{}", scope, namespace, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Ids read back from the external API are taken verbatim.
impl From<String> for NetworkSetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for NetworkSetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for NetworkSetId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NetworkSetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
