//! Property-based tests for path normalization.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::error::{Error, PathErrorKind};
    use crate::path::{clean, normalize_and_validate, rel, NormalizedPath};
    use proptest::prelude::*;

    fn segment() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => "[a-z0-9_]{1,8}",
            1 => Just(".".to_string()),
            1 => Just("..".to_string()),
            1 => Just(String::new()),
        ]
    }

    fn raw_path() -> impl Strategy<Value = String> {
        (prop::collection::vec(segment(), 0..8), prop::bool::ANY).prop_map(|(segments, backslash)| {
            let joined = segments.join(if backslash { "\\" } else { "/" });
            joined.trim_start_matches(['/', '\\']).to_string()
        })
    }

    // ============================================================================
    // normalize_and_validate property tests
    // ============================================================================

    proptest! {
        /// Property: normalizing a normalized path is the identity
        #[test]
        fn normalize_is_idempotent(raw in raw_path()) {
            if let Ok(once) = normalize_and_validate(&raw) {
                let twice = normalize_and_validate(once.as_str()).unwrap();
                prop_assert_eq!(once, twice);
            }
        }

        /// Property: a normalized path never has empty, `.` or `..` segments
        #[test]
        fn normalized_segments_are_clean(raw in raw_path()) {
            if let Ok(path) = normalize_and_validate(&raw) {
                prop_assert!(!path.as_str().starts_with('/'));
                prop_assert!(!path.as_str().contains('\\'));
                for segment in path.components() {
                    prop_assert!(!segment.is_empty());
                    prop_assert_ne!(segment, ".");
                    prop_assert_ne!(segment, "..");
                }
            }
        }

        /// Property: the only rejection reason for relative input is escaping
        #[test]
        fn relative_input_fails_only_by_escaping(raw in raw_path()) {
            match normalize_and_validate(&raw) {
                Ok(_) => {}
                Err(Error::Path { kind, .. }) => prop_assert_eq!(kind, PathErrorKind::Escapes),
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }

        /// Property: prefixing with `../` always escapes the root
        #[test]
        fn leading_parent_escapes(name in "[a-z]{1,8}") {
            let raw = format!("../{}", name);
            let escaped = matches!(
                normalize_and_validate(&raw),
                Err(Error::Path { kind: PathErrorKind::Escapes, .. })
            );
            prop_assert!(escaped);
        }

        /// Property: absolute input is always rejected as absolute
        #[test]
        fn absolute_input_is_rejected(raw in raw_path()) {
            let absolute = format!("/{}", raw);
            let rejected = matches!(
                normalize_and_validate(&absolute),
                Err(Error::Path { kind: PathErrorKind::Absolute, .. })
            );
            prop_assert!(rejected);
        }
    }

    // ============================================================================
    // rel property tests
    // ============================================================================

    proptest! {
        /// Property: joining a base with rel(base, target) recovers the target
        #[test]
        fn rel_round_trips_through_join(
            base in prop::collection::vec("[a-z]{1,4}", 0..4),
            tail in prop::collection::vec("[a-z]{1,4}", 0..4),
        ) {
            let base_path = if base.is_empty() { ".".to_string() } else { base.join("/") };
            let mut target = base.clone();
            target.extend(tail);
            let target_path = if target.is_empty() { ".".to_string() } else { target.join("/") };

            let relative = rel(&base_path, &target_path).unwrap();
            let base_normalized = normalize_and_validate(&base_path).unwrap();
            prop_assert_eq!(
                base_normalized.join(&relative),
                normalize_and_validate(&target_path).unwrap()
            );
        }

        /// Property: clean is idempotent
        #[test]
        fn clean_is_idempotent(raw in raw_path()) {
            let once = clean(&raw);
            prop_assert_eq!(clean(&once), once.clone());
        }

        /// Property: stripping a path from itself yields the root
        #[test]
        fn strip_prefix_of_self_is_root(raw in "[a-z]{1,4}(/[a-z]{1,4}){0,3}") {
            let path = normalize_and_validate(&raw).unwrap();
            prop_assert_eq!(path.strip_prefix(&path), Some(NormalizedPath::root()));
        }
    }
}
