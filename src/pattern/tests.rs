use super::{CompiledPattern, Segment};
use crate::error::PatternError;

fn compile(template: &str) -> CompiledPattern {
    CompiledPattern::compile(template).unwrap()
}

#[test]
fn test_required_variable_binds_segment() {
    let p = compile("user/<username>");
    let captures = p.matches("user/alice").unwrap();
    assert_eq!(captures.get("username"), Some("alice"));
    assert_eq!(captures.len(), 1);
}

#[test]
fn test_required_variable_missing_fails() {
    let p = compile("user/<username>");
    assert!(p.matches("user/").is_none());
    assert!(p.matches("user").is_none());
}

#[test]
fn test_optional_default_applies_when_absent() {
    let p = compile("news/[page=0]");
    assert_eq!(p.matches("news").unwrap().get("page"), Some("0"));
    assert_eq!(p.matches("news/").unwrap().get("page"), Some("0"));
    assert_eq!(p.matches("news/5").unwrap().get("page"), Some("5"));
}

#[test]
fn test_optional_without_default_is_omitted() {
    let p = compile("user/<username>/posts/[page]");
    let captures = p.matches("user/alice/posts").unwrap();
    assert_eq!(captures.get("username"), Some("alice"));
    assert!(!captures.contains("page"));

    let captures = p.matches("user/alice/posts/3").unwrap();
    assert_eq!(captures.get("page"), Some("3"));
}

#[test]
fn test_leftover_segments_fail() {
    let p = compile("news/[page=0]");
    assert!(p.matches("news/5/6").is_none());
    let p = compile("about");
    assert!(p.matches("about/team").is_none());
}

#[test]
fn test_literal_comparison_is_case_sensitive() {
    let p = compile("about");
    assert!(p.matches("about").is_some());
    assert!(p.matches("About").is_none());
}

#[test]
fn test_empty_match_is_distinct_from_no_match() {
    let p = compile("about");
    let captures = p.matches("/about/").unwrap();
    assert!(captures.is_empty());
    assert!(p.matches("contact").is_none());
}

#[test]
fn test_root_pattern_matches_only_root() {
    let p = compile("/");
    assert!(p.segments().is_empty());
    assert!(p.matches("/").is_some());
    assert!(p.matches("").is_some());
    assert!(p.matches("/x").is_none());
}

#[test]
fn test_query_string_is_ignored() {
    let p = compile("news/[page=0]");
    let captures = p.matches("news/2?sort=asc").unwrap();
    assert_eq!(captures.get("page"), Some("2"));
}

#[test]
fn test_segment_order_preserved() {
    let p = compile("a/<x>/b/[y=1]");
    assert_eq!(
        p.segments(),
        &[
            Segment::Literal("a".into()),
            Segment::Required("x".into()),
            Segment::Literal("b".into()),
            Segment::Optional {
                name: "y".into(),
                default: Some("1".into())
            },
        ]
    );
    assert_eq!(p.segments()[3].to_string(), "[y=1]");
}

#[test]
fn test_optional_in_middle_consumes_when_present() {
    let p = compile("archive/[year]/list");
    assert_eq!(
        p.matches("archive/2024/list").unwrap().get("year"),
        Some("2024")
    );
    // no backtracking: "list" is taken as the optional, then the literal is missing
    assert!(p.matches("archive/list").is_none());
}

#[test]
fn test_compile_rejects_bad_templates() {
    assert!(matches!(
        CompiledPattern::compile("user/<name"),
        Err(PatternError::Unterminated { .. })
    ));
    assert!(matches!(
        CompiledPattern::compile("news/[page"),
        Err(PatternError::Unterminated { .. })
    ));
    assert!(matches!(
        CompiledPattern::compile("user/<>"),
        Err(PatternError::EmptyName { .. })
    ));
    assert!(matches!(
        CompiledPattern::compile("news/[=3]"),
        Err(PatternError::EmptyName { .. })
    ));
    assert!(matches!(
        CompiledPattern::compile("user/<na me>"),
        Err(PatternError::InvalidName { .. })
    ));
    assert!(matches!(
        CompiledPattern::compile("a/<id>/b/[id]"),
        Err(PatternError::DuplicateName { .. })
    ));
}

#[test]
fn test_has_variables() {
    assert!(!compile("static/page").has_variables());
    assert!(compile("news/[page=0]").has_variables());
}

#[test]
fn test_to_map_copies_all_captures() {
    let p = compile("<a>/<b>");
    let map = p.matches("1/2").unwrap().to_map();
    assert_eq!(map.get("a").map(String::as_str), Some("1"));
    assert_eq!(map.get("b").map(String::as_str), Some("2"));
}
