//! # Path Arithmetic
//!
//! Slash-delimited path helpers shared by every backend, plus the rooting
//! translation used by delegating endpoints.
//!
//! ## Rooting
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Logical namespace ⇄ delegate namespace                 │
//! │                                                                         │
//! │   endpoint caller                      delegate service                 │
//! │   ───────────────                      ────────────────                 │
//! │   "docs/a.txt"   ── rooted() ──────►   "ws/personal/docs/a.txt"         │
//! │   "docs/a.txt"   ◄─ unrooted() ─────   "ws/personal/docs/a.txt"         │
//! │                                                                         │
//! │   Law: unrooted(rooted(p)) == p for every clean relative p              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The empty string denotes the root of a namespace.

use crate::HIDDEN_MARKER;

// =============================================================================
// Free Functions
// =============================================================================

/// Lexically cleans a slash-delimited path.
///
/// Empty and `.` segments are dropped, `..` removes the previous segment. A
/// leading `/` is preserved. A relative path that cleans to nothing becomes
/// the empty string rather than `.`.
pub fn clean(p: &str) -> String {
    let absolute = p.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();

    for segment in p.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.last().is_some_and(|s| *s != "..") {
                    stack.pop();
                } else if !absolute {
                    stack.push("..");
                }
            }
            s => stack.push(s),
        }
    }

    let joined = stack.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Joins two paths and cleans the result.
pub fn join(base: &str, rel: &str) -> String {
    match (base.is_empty(), rel.is_empty()) {
        (true, _) => clean(rel),
        (_, true) => clean(base),
        _ => clean(&format!("{}/{}", base, rel)),
    }
}

/// Returns the last segment of a path.
pub fn base_name(p: &str) -> &str {
    let trimmed = p.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}

/// Returns everything before the last segment ("" for top-level entries).
pub fn parent(p: &str) -> &str {
    let trimmed = p.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(i) => &trimmed[..i],
        None => "",
    }
}

/// True when the last segment is the reserved hidden marker name.
pub fn is_hidden_marker(p: &str) -> bool {
    base_name(p) == HIDDEN_MARKER
}

/// Path of the hidden marker leaf owned by a collection.
pub fn marker_path(collection: &str) -> String {
    join(collection, HIDDEN_MARKER)
}

/// True when `p` equals `prefix` or lives below it.
pub fn is_within(p: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    p == prefix
        || p.strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/') || prefix.ends_with('/'))
}

/// Rejects paths that climb above their namespace root.
pub fn ensure_contained(p: &str) -> Result<(), crate::ValidationError> {
    let cleaned = clean(p);
    if cleaned == ".." || cleaned.starts_with("../") {
        return Err(crate::ValidationError::invalid_path(
            p,
            "escapes the namespace root",
        ));
    }
    Ok(())
}

// =============================================================================
// Namespace Root
// =============================================================================

/// Translation between an endpoint's logical namespace and the absolute
/// namespace of the service it delegates to.
///
/// Delegate namespaces are relative, so the stored prefix never starts with
/// a separator and delegate paths are compared without their leading one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamespaceRoot {
    root: String,
}

impl NamespaceRoot {
    /// Creates a root from a (possibly unclean or absolute) prefix.
    pub fn new(root: impl AsRef<str>) -> Self {
        NamespaceRoot {
            root: clean(root.as_ref()).trim_start_matches('/').to_string(),
        }
    }

    /// The cleaned prefix.
    pub fn as_str(&self) -> &str {
        &self.root
    }

    /// Prefixes a logical path with the root.
    pub fn rooted(&self, p: &str) -> String {
        join(&self.root, p)
    }

    /// Strips the root from a delegate path and trims leading separators.
    ///
    /// The root is only stripped at a segment boundary: with root `ab`, the
    /// path `abc/d` is left alone.
    pub fn unrooted(&self, p: &str) -> String {
        let p = p.trim_start_matches('/');
        let rest = if self.root.is_empty() {
            p
        } else if p == self.root {
            ""
        } else {
            match p.strip_prefix(self.root.as_str()) {
                Some(r) if r.starts_with('/') || self.root.ends_with('/') => r,
                _ => p,
            }
        };
        rest.trim_start_matches('/').to_string()
    }
}

impl std::fmt::Display for NamespaceRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean() {
        assert_eq!(clean(""), "");
        assert_eq!(clean("a//b/./c/"), "a/b/c");
        assert_eq!(clean("a/b/../c"), "a/c");
        assert_eq!(clean("/a/../.."), "/");
        assert_eq!(clean("../a"), "../a");
        assert_eq!(clean("a/.."), "");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "a/b"), "a/b");
        assert_eq!(join("root", ""), "root");
        assert_eq!(join("root", "/a"), "root/a");
        assert_eq!(join("/data", "x/y"), "/data/x/y");
    }

    #[test]
    fn test_base_and_parent() {
        assert_eq!(base_name("a/b/c.txt"), "c.txt");
        assert_eq!(base_name("c.txt"), "c.txt");
        assert_eq!(parent("a/b/c.txt"), "a/b");
        assert_eq!(parent("c.txt"), "");
        assert_eq!(parent("/c.txt"), "/");
    }

    #[test]
    fn test_hidden_marker() {
        assert!(is_hidden_marker("docs/.strata"));
        assert!(is_hidden_marker(".strata"));
        assert!(!is_hidden_marker("docs/strata"));
        assert_eq!(marker_path("docs"), "docs/.strata");
        assert_eq!(marker_path(""), ".strata");
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("a/b", ""));
        assert!(is_within("a/b", "a"));
        assert!(is_within("a", "a"));
        assert!(!is_within("ab/c", "a"));
    }

    #[test]
    fn test_ensure_contained() {
        assert!(ensure_contained("a/../b").is_ok());
        assert!(ensure_contained("a/../../b").is_err());
    }

    #[test]
    fn test_rooting() {
        let root = NamespaceRoot::new("/ws/personal/");
        assert_eq!(root.as_str(), "ws/personal");
        assert_eq!(root.rooted("a/b"), "ws/personal/a/b");
        assert_eq!(root.unrooted("ws/personal/a/b"), "a/b");
        assert_eq!(root.unrooted("/ws/personal/a/b"), "a/b");
        assert_eq!(root.unrooted("/ws/personal"), "");
        assert_eq!(NamespaceRoot::new("/").as_str(), "");
    }

    #[test]
    fn test_unrooted_only_strips_at_segment_boundary() {
        let root = NamespaceRoot::new("ab");
        assert_eq!(root.unrooted("abc/d"), "abc/d");
        assert_eq!(root.unrooted("ab/c/d"), "c/d");
    }

    #[test]
    fn test_empty_root() {
        let root = NamespaceRoot::default();
        assert_eq!(root.rooted("a/b"), "a/b");
        assert_eq!(root.unrooted("/a/b"), "a/b");
    }
}
