mod common;

use common::Doc;
use retrofit::grep::{Pattern, PatternError, grep};
use retrofit::{DecodeOptions, decode, profile};

fn pattern(s: &str) -> Pattern {
    s.parse().unwrap()
}

fn sample() -> Vec<retrofit::DecodedMessage> {
    let doc = Doc::new()
        .definition(0, 20, &[(253, 4, 0x86), (3, 1, 0x02)])
        .data(0, &[1, 0, 0, 0, 120])
        .data(0, &[2, 0, 0, 0, 150])
        .data(0, &[3, 0, 0, 0, 150])
        .definition(1, 4242, &[(9, 1, 0x02)])
        .data(1, &[7])
        .build();

    decode(&doc, &profile::minimal(), &DecodeOptions::default()).unwrap()
}

#[test]
fn matches_fields_by_name() {
    let messages = sample();
    let matches = grep(&messages, &[pattern("record:heart_rate")], -1, false);

    assert_eq!(matches.len(), 3);
    assert_eq!(matches[0].index, 0);
    assert_eq!(matches[0].field.unwrap().number, 3);
}

#[test]
fn matches_fields_by_number() {
    let messages = sample();

    // Undocumented messages are reachable by bare numbers.
    let matches = grep(&messages, &[pattern("4242:9")], -1, false);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].index, 3);
}

#[test]
fn value_patterns_compare_numerically() {
    let messages = sample();

    let matches = grep(&messages, &[pattern("record:heart_rate=150")], -1, false);
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].index, 1);
    assert_eq!(matches[1].index, 2);

    let matches = grep(&messages, &[pattern("20:3=120.0")], -1, false);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].index, 0);
}

#[test]
fn match_limit_truncates_in_stream_order() {
    let messages = sample();

    let matches = grep(&messages, &[pattern("record:heart_rate")], 2, false);
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].index, 0);
    assert_eq!(matches[1].index, 1);

    let matches = grep(&messages, &[pattern("record:heart_rate")], 0, false);
    assert!(matches.is_empty());
}

#[test]
fn inverted_matches_yield_the_rest() {
    let messages = sample();

    let matches = grep(&messages, &[pattern("record:heart_rate")], -1, true);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].index, 3);
    assert!(matches[0].field.is_none());
}

#[test]
fn several_patterns_match_alternatives() {
    let messages = sample();

    let patterns = [pattern("record:heart_rate=120"), pattern("4242:9")];
    let matches = grep(&messages, &patterns, -1, false);
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].index, 0);
    assert_eq!(matches[1].index, 3);
}

#[test]
fn patterns_without_a_field_are_rejected() {
    let err = "record".parse::<Pattern>().unwrap_err();
    assert!(matches!(err, PatternError::MissingField(_)));
}
