//! Property-based tests for strata-core.
//!
//! Tests invariants of path rooting that must hold for all inputs.

use proptest::prelude::*;
use strata_core::path::{self, NamespaceRoot};

fn segment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_ -]{1,8}"
}

fn relative_path() -> impl Strategy<Value = String> {
    prop::collection::vec(segment(), 0..5).prop_map(|segments| segments.join("/"))
}

// ============================================================================
// Rooting Property Tests
// ============================================================================

proptest! {
    /// Property: stripping the root exactly inverts prefixing it
    #[test]
    fn prop_rooting_round_trip(root in relative_path(), p in relative_path()) {
        prop_assume!(root.is_empty() || !p.starts_with(&root));
        let ns = NamespaceRoot::new(&root);
        prop_assert_eq!(ns.unrooted(&ns.rooted(&p)), p);
    }
}

proptest! {
    /// Property: absolute roots round-trip the same way
    #[test]
    fn prop_absolute_root_round_trip(root in relative_path(), p in relative_path()) {
        let ns = NamespaceRoot::new(format!("/{}", root));
        prop_assert_eq!(ns.unrooted(&ns.rooted(&p)), p);
    }
}

proptest! {
    /// Property: cleaning is idempotent
    #[test]
    fn prop_clean_idempotent(p in "[a-z./]{0,24}") {
        let once = path::clean(&p);
        prop_assert_eq!(path::clean(&once), once);
    }
}

proptest! {
    /// Property: a marker path is always recognized as a marker
    #[test]
    fn prop_marker_path_is_marker(p in relative_path()) {
        let marker = path::marker_path(&p);
        prop_assert!(path::is_hidden_marker(&marker));
        prop_assert_eq!(path::parent(&marker), p.as_str());
    }
}
