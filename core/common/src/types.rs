//! Common types used throughout Concur.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a store (vault) on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(i64);

impl StoreId {
    /// Create a new StoreId.
    ///
    /// # Errors
    /// - Returns error if id is not positive
    pub fn new(id: i64) -> crate::Result<Self> {
        if id <= 0 {
            return Err(crate::Error::InvalidInput(format!(
                "StoreId must be positive, got {}",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner value.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A logical path within a vault, independent of the underlying filesystem.
///
/// Paths are slash-separated and relative to the vault root, e.g.
/// `notes/daily/today.md`. The root is the empty path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VaultPath {
    components: Vec<String>,
}

impl VaultPath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Create a path from string components.
    ///
    /// # Preconditions
    /// - Components must not contain path separators
    /// - Components must not be empty, `.` or `..`
    ///
    /// # Errors
    /// - Returns error if any component is invalid
    pub fn from_components(components: Vec<String>) -> crate::Result<Self> {
        for comp in &components {
            Self::check_component(comp)?;
        }
        Ok(Self { components })
    }

    fn check_component(comp: &str) -> crate::Result<()> {
        if comp.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Path component cannot be empty".to_string(),
            ));
        }
        if comp == "." || comp == ".." {
            return Err(crate::Error::InvalidInput(format!(
                "Path component cannot be '{}'",
                comp
            )));
        }
        if comp.contains('/') || comp.contains('\\') {
            return Err(crate::Error::InvalidInput(
                "Path component cannot contain separators".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a path string into VaultPath.
    ///
    /// Uses '/' as separator. Leading and trailing separators are ignored,
    /// empty inner components (`a//b`) are rejected.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let path = path.trim_start_matches('/').trim_end_matches('/');
        if path.is_empty() {
            return Ok(Self::root());
        }

        let components: Vec<String> = path.split('/').map(String::from).collect();
        Self::from_components(components)
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the file/directory name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Extension of the last component, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let name = self.name()?;
        match name.rfind('.') {
            Some(0) | None => None,
            Some(pos) => Some(&name[pos + 1..]),
        }
    }

    /// Join this path with a child component.
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        Self::check_component(child)?;
        let mut components = self.components.clone();
        components.push(child.to_string());
        Ok(Self { components })
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Whether any component is hidden (starts with a dot).
    pub fn is_hidden(&self) -> bool {
        self.components.iter().any(|c| c.starts_with('.'))
    }

    /// Convert to the slash-separated string form used on the wire.
    pub fn to_string_path(&self) -> String {
        self.components.join("/")
    }
}

impl fmt::Display for VaultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_path())
    }
}

impl TryFrom<String> for VaultPath {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<VaultPath> for String {
    fn from(path: VaultPath) -> Self {
        path.to_string_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_store_id_creation() {
        let id = StoreId::new(7).unwrap();
        assert_eq!(id.get(), 7);
        assert_eq!(id.to_string(), "7");
    }

    #[test]
    fn test_store_id_non_positive_fails() {
        assert!(StoreId::new(0).is_err());
        assert!(StoreId::new(-3).is_err());
    }

    #[test]
    fn test_vault_path_root() {
        let path = VaultPath::parse("").unwrap();
        assert!(path.is_root());
        assert_eq!(path.to_string_path(), "");
        assert!(path.parent().is_none());
    }

    #[test]
    fn test_vault_path_parse() {
        let path = VaultPath::parse("notes/daily/today.md").unwrap();
        assert_eq!(path.components(), &["notes", "daily", "today.md"]);
        assert_eq!(path.to_string_path(), "notes/daily/today.md");
        assert_eq!(path.extension(), Some("md"));
    }

    #[test]
    fn test_vault_path_leading_slash_ignored() {
        let path = VaultPath::parse("/notes/a.md").unwrap();
        assert_eq!(path.to_string(), "notes/a.md");
    }

    #[test]
    fn test_vault_path_rejects_traversal() {
        assert!(VaultPath::parse("../etc/passwd").is_err());
        assert!(VaultPath::parse("notes/./a.md").is_err());
        assert!(VaultPath::parse("notes//a.md").is_err());
    }

    #[test]
    fn test_vault_path_join() {
        let path = VaultPath::root().join("notes").unwrap().join("a.md").unwrap();
        assert_eq!(path.to_string_path(), "notes/a.md");
        assert!(path.join("..").is_err());
    }

    #[test]
    fn test_vault_path_parent() {
        let path = VaultPath::parse("notes/sub/a.md").unwrap();
        let parent = path.parent().unwrap();
        assert_eq!(parent.to_string_path(), "notes/sub");
        assert!(VaultPath::parse("a.md").unwrap().parent().unwrap().is_root());
    }

    #[test]
    fn test_vault_path_hidden() {
        assert!(VaultPath::parse(".concur/state.json").unwrap().is_hidden());
        assert!(!VaultPath::parse("notes/a.md").unwrap().is_hidden());
        assert_eq!(VaultPath::parse(".gitignore").unwrap().extension(), None);
    }

    #[test]
    fn test_vault_path_serde_as_string() {
        let path = VaultPath::parse("notes/a.md").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"notes/a.md\"");
        let bad: std::result::Result<VaultPath, _> = serde_json::from_str("\"../x\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn prop_parse_display_is_stable(parts in prop::collection::vec("[a-zA-Z0-9_ -]{1,12}", 0..6)) {
            let joined = parts.join("/");
            let path = VaultPath::parse(&joined).unwrap();
            prop_assert_eq!(path.components().len(), parts.len());
            let reparsed = VaultPath::parse(&path.to_string_path()).unwrap();
            prop_assert_eq!(reparsed, path);
        }
    }
}
