mod common;

use common::Doc;
use retrofit::header::Expected;
use retrofit::write::RebuildError;
use retrofit::{
    DecodeOptions, FileHeader, RebuildOptions, RecoverOptions, Sink, Span, batch, decode, profile,
    rebuild, recover,
};

#[test]
fn empty_documents_round_trip() {
    let doc = Doc::new().build();

    let recovery = recover(&doc, &profile::minimal(), &RecoverOptions::default()).unwrap();
    assert_eq!(recovery.kept, vec![Span::new(0, 12)]);
    assert!(recovery.messages.is_empty());

    let rebuilt = rebuild(&doc, &recovery.kept, &RebuildOptions::default()).unwrap();
    assert_eq!(rebuilt, doc);
}

fn fixing() -> RebuildOptions {
    RebuildOptions {
        fix_header: true,
        fix_checksum: true,
        ..Default::default()
    }
}

#[test]
fn prepends_a_header_over_bare_records() {
    let doc = Doc::new().timestamped(0, 20).record(0, 1).build();
    let records = &doc[12..doc.len() - 2];

    let out = rebuild(
        records,
        &[Span::new(0, records.len())],
        &RebuildOptions {
            add_header: true,
            fix_checksum: true,
            ..Default::default()
        },
    )
    .unwrap();

    let header = FileHeader::parse(&out, false).unwrap();
    assert_eq!(header.header_size, 14);
    assert_eq!(header.data_size as usize, records.len());

    let messages = decode(&out, &profile::minimal(), &DecodeOptions::default()).unwrap();
    assert_eq!(messages.len(), 1);
}

#[test]
fn rewrites_the_header_with_overrides() {
    let doc = Doc::new().timestamped(0, 20).record(0, 1).build();

    let out = rebuild(
        &doc,
        &[Span::new(0, doc.len() - 2)],
        &RebuildOptions {
            expected: Expected {
                protocol_version: Some(0x20),
                profile_version: Some(2100),
                ..Default::default()
            },
            ..fixing()
        },
    )
    .unwrap();

    let header = FileHeader::parse(&out, false).unwrap();
    assert_eq!(header.protocol_version, 0x20);
    assert_eq!(header.profile_version, 2100);
    assert_eq!(header.data_size, doc.len() as u32 - 14);
}

#[test]
fn recomputing_the_trailer_restores_a_corrupted_one() {
    let pristine = Doc::new().timestamped(0, 20).record(0, 1).build();
    let mut corrupted = pristine.clone();
    let last = corrupted.len() - 1;
    corrupted[last] ^= 0xFF;

    let out = rebuild(
        &corrupted,
        &[Span::new(0, corrupted.len() - 2)],
        &RebuildOptions {
            fix_checksum: true,
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(out, pristine);
}

#[test]
fn dropped_records_fail_validation_without_a_header_fix() {
    let doc = Doc::new()
        .timestamped(0, 20)
        .record(0, 1)
        .record(0, 2)
        .build();

    // Excise the second record but leave the stale declared size.
    let kept = [Span::new(0, doc.len() - 7)];
    let err = rebuild(&doc, &kept, &RebuildOptions::default()).unwrap_err();
    assert!(matches!(err, RebuildError::Invalid(_)));

    let out = rebuild(&doc, &kept, &fixing()).unwrap();
    let messages = decode(&out, &profile::minimal(), &DecodeOptions::default()).unwrap();
    assert_eq!(messages.len(), 1);
}

#[test]
fn out_of_bounds_spans_are_rejected() {
    let doc = Doc::new().build();
    let err = rebuild(
        &doc,
        &[Span::new(0, doc.len() + 1)],
        &RebuildOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, RebuildError::OutOfBounds(_)));
}

#[test]
fn sinks_encode_hex_raw_and_discard() {
    let out = vec![0xAB, 0xCD, 0x01];

    let mut hex = Vec::new();
    Sink::Hex.write(&out, &mut hex).unwrap();
    assert_eq!(hex, b"abcd01\n");

    let mut raw = Vec::new();
    Sink::Raw.write(&out, &mut raw).unwrap();
    assert_eq!(raw, out);

    let mut discard = Vec::new();
    Sink::Discard.write(&out, &mut discard).unwrap();
    assert!(discard.is_empty());
}

#[test]
fn parses_slice_lists() {
    assert_eq!(
        Span::parse_list("0:12,17:40").unwrap(),
        vec![Span::new(0, 12), Span::new(17, 40)],
    );

    assert!(Span::parse_list("12").is_err());
    assert!(Span::parse_list("a:b").is_err());
    assert_eq!(format!("{}", Span::new(17, 40)), "17:40");
}

#[test]
fn batches_decode_in_parallel_preserving_order() {
    let buffers: Vec<Vec<u8>> = (1..=8)
        .map(|n| {
            let mut doc = Doc::new().timestamped(0, 20);
            for ts in 1..=n {
                doc = doc.record(0, ts);
            }
            doc.build()
        })
        .collect();

    let counts = batch::map(buffers, 4, |buf| {
        decode(&buf, &profile::minimal(), &DecodeOptions::default())
            .unwrap()
            .len()
    });

    assert_eq!(counts, (1..=8).collect::<Vec<_>>());
}
