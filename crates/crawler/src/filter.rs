//! 선택 필터
//!
//! 저장소는 대표 태그가 존재하고 그 크기가 0보다 클 때만 검사 대상입니다.

use dofinder_core::types::TagMetadata;

/// 태그 목록에서 대표 태그를 찾습니다.
pub fn canonical_tag<'a>(tags: &'a [TagMetadata], canonical: &str) -> Option<&'a TagMetadata> {
    tags.iter().find(|t| t.tag == canonical)
}

/// 대표 태그가 존재하고 크기가 0보다 크면 `true`.
pub fn is_eligible(tags: &[TagMetadata], canonical: &str) -> bool {
    canonical_tag(tags, canonical).is_some_and(TagMetadata::has_content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tag(name: &str, size: i64) -> TagMetadata {
        TagMetadata {
            tag: name.to_owned(),
            size_bytes: size,
            last_updated: None,
        }
    }

    #[test]
    fn latest_with_content_is_eligible() {
        assert!(is_eligible(&[tag("1.0", 10), tag("latest", 12345)], "latest"));
    }

    #[test]
    fn missing_canonical_tag_is_not_eligible() {
        assert!(!is_eligible(&[tag("1.0", 10)], "latest"));
        assert!(!is_eligible(&[], "latest"));
    }

    #[test]
    fn empty_canonical_tag_is_not_eligible() {
        assert!(!is_eligible(&[tag("latest", 0)], "latest"));
    }

    #[test]
    fn tag_match_is_exact() {
        assert!(!is_eligible(&[tag("latest-alpine", 10)], "latest"));
        assert!(!is_eligible(&[tag("Latest", 10)], "latest"));
    }

    fn arb_tag() -> impl Strategy<Value = TagMetadata> {
        (
            prop_oneof![Just("latest".to_owned()), "[a-z0-9.]{1,8}"],
            -5i64..100_000,
        )
            .prop_map(|(name, size)| tag(&name, size))
    }

    proptest! {
        #[test]
        fn eligible_iff_canonical_present_with_positive_size(
            tags in proptest::collection::vec(arb_tag(), 0..12)
        ) {
            let expected = tags
                .iter()
                .find(|t| t.tag == "latest")
                .is_some_and(|t| t.size_bytes > 0);
            prop_assert_eq!(is_eligible(&tags, "latest"), expected);
        }
    }
}
