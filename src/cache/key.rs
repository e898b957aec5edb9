//! Cache keys derived from request paths.

use std::fmt;

/// The key an artifact is stored under.
///
/// Derived from the request path by dropping its single leading `/`; the
/// rest is kept verbatim, so keys are case-sensitive and identical paths
/// always produce identical keys.
///
/// ```
/// use symproxy::cache::SymbolKey;
///
/// let key = SymbolKey::from_path("/ntdll.pdb/1A2B3C4D5E/ntdll.pdb");
/// assert_eq!(key.as_str(), "ntdll.pdb/1A2B3C4D5E/ntdll.pdb");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolKey(String);

impl SymbolKey {
    pub fn from_path(path: &str) -> Self {
        Self(path.strip_prefix('/').unwrap_or(path).to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SymbolKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_only_one_leading_slash() {
        assert_eq!(SymbolKey::from_path("//a/b").as_str(), "/a/b");
        assert_eq!(SymbolKey::from_path("a/b").as_str(), "a/b");
    }

    #[test]
    fn keys_are_case_sensitive() {
        assert_ne!(
            SymbolKey::from_path("/ntdll.pdb/ABC/ntdll.pdb"),
            SymbolKey::from_path("/NTDLL.pdb/ABC/ntdll.pdb")
        );
    }
}
