//! Unit tests for plugin identity derivation.

use rstest::rstest;

use super::*;

#[test]
fn identifier_is_deterministic() {
    let first = plugin_id("https://github.com/trellis-plugins/weather");
    let second = plugin_id("https://github.com/trellis-plugins/weather");
    assert_eq!(first, second);
}

#[rstest]
#[case::plain("https://github.com/trellis-plugins/weather")]
#[case::empty("")]
#[case::long("https://example.com/a/very/long/path/that/keeps/going/and/going.git")]
fn identifier_is_fixed_length_hex(#[case] source: &str) {
    let id = plugin_id(source);
    assert_eq!(id.as_str().len(), 32);
    assert!(
        id.as_str()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()),
        "expected lowercase hex: {id}"
    );
}

#[rstest]
#[case::trailing_slash("https://example.com/repo/")]
#[case::surrounding_whitespace("  https://example.com/repo \n")]
fn normalisation_ignores_cosmetic_differences(#[case] variant: &str) {
    assert_eq!(plugin_id(variant), plugin_id("https://example.com/repo"));
}

#[test]
fn distinct_sources_have_distinct_identifiers() {
    assert_ne!(
        plugin_id("https://example.com/one"),
        plugin_id("https://example.com/two")
    );
}

#[test]
fn from_source_matches_free_function() {
    let url = "https://example.com/repo";
    assert_eq!(PluginId::from_source(url), plugin_id(url));
}

#[test]
fn identifier_serialises_as_plain_string() {
    let id = PluginId::new("p1");
    let json = serde_json::to_string(&id).expect("serialise id");
    assert_eq!(json, "\"p1\"");
}

#[test]
fn identifier_is_leading_half_of_sha256_digest() {
    assert_eq!(plugin_id("").as_str(), "e3b0c44298fc1c149afbf4c8996fb924");
    assert_eq!(plugin_id("abc").as_str(), "ba7816bf8f01cfea414140de5dae2223");
}
