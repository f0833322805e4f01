//! Backend identities

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Symbolic name of one configured backend
///
/// Several identities can coexist in one process, each with its own
/// configuration, pools and subscription connection. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BackendId(Arc<str>);

impl BackendId {
    /// Name of the identity used when none is given
    pub const DEFAULT: &'static str = "default";

    /// Create an identity from a name
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The identity's name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the default identity
    pub fn is_default(&self) -> bool {
        &*self.0 == Self::DEFAULT
    }
}

impl Default for BackendId {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for BackendId {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<BackendId> for String {
    fn from(id: BackendId) -> Self {
        id.0.to_string()
    }
}

impl From<&BackendId> for BackendId {
    fn from(id: &BackendId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for BackendId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for BackendId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_identity() {
        let id = BackendId::default();
        assert_eq!(id.as_str(), "default");
        assert!(id.is_default());
        assert!(!BackendId::from("one").is_default());
    }

    #[test]
    fn test_identity_equality() {
        assert_eq!(BackendId::from("one"), BackendId::from("one".to_string()));
        assert_ne!(BackendId::from("one"), BackendId::from("two"));
    }

    #[test]
    fn test_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(BackendId::from("one"), 1);
        assert_eq!(map.get("one"), Some(&1));
        assert_eq!(map.get("two"), None);
    }

    #[test]
    fn test_serde_as_string() {
        let id = BackendId::from("sessions");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"sessions\"");
        let back: BackendId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
