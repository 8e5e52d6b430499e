mod common;

use common::Doc;
use proptest::prelude::*;
use retrofit::{RebuildOptions, RecoverOptions, Span, profile, rebuild, recover};

fn excising() -> RecoverOptions {
    RecoverOptions {
        min_sync_count: 5,
        max_fwd_len: 10,
        max_back_count: 0,
        ..Default::default()
    }
}

proptest! {
    #[test]
    fn clean_documents_round_trip(heart_rates in prop::collection::vec(0u8..=254, 1..40)) {
        let mut doc = Doc::new().definition(0, 20, &[(253, 4, 0x86), (3, 1, 0x02)]);
        for (i, hr) in heart_rates.iter().enumerate() {
            let mut payload = (i as u32 + 1).to_le_bytes().to_vec();
            payload.push(*hr);
            doc = doc.data(0, &payload);
        }
        let buf = doc.build();

        let recovery = recover(&buf, &profile::minimal(), &RecoverOptions::default()).unwrap();
        prop_assert_eq!(recovery.gaps, 0);
        prop_assert_eq!(recovery.messages.len(), heart_rates.len());

        let rebuilt = rebuild(&buf, &recovery.kept, &RebuildOptions::default()).unwrap();
        prop_assert_eq!(rebuilt, buf);
    }

    #[test]
    fn single_corruptions_are_excised_exactly(
        before in 5usize..15,
        after in 5usize..15,
        garbage_len in 1usize..=10,
    ) {
        let mut doc = Doc::new().timestamped(0, 20);
        for ts in 1..=before {
            doc = doc.record(0, ts as u32);
        }
        let garbage_at = doc.mark();
        doc = doc.garbage(&vec![0x0F; garbage_len]);
        for ts in before + 1..=before + after {
            doc = doc.record(0, ts as u32);
        }
        let buf = doc.build();

        let recovery = recover(&buf, &profile::minimal(), &excising()).unwrap();
        prop_assert_eq!(
            &recovery.dropped,
            &vec![Span::new(garbage_at, garbage_at + garbage_len)],
        );
        prop_assert_eq!(recovery.messages.len(), before + after);

        // Idempotence: a repaired document yields no further drops.
        let repaired = rebuild(
            &buf,
            &recovery.kept,
            &RebuildOptions {
                fix_header: true,
                fix_checksum: true,
                ..Default::default()
            },
        )
        .unwrap();
        let again = recover(&repaired, &profile::minimal(), &excising()).unwrap();
        prop_assert_eq!(again.gaps, 0);
        prop_assert!(again.dropped.is_empty());
        prop_assert_eq!(again.messages.len(), before + after);
    }

    #[test]
    fn accepted_streams_stay_monotonic(
        deltas in prop::collection::vec(0u32..=5, 10..30),
        garbage_len in 1usize..=8,
        position in 3usize..8,
    ) {
        let mut doc = Doc::new().timestamped(0, 20);
        let mut ts = 100u32;
        for (i, delta) in deltas.iter().enumerate() {
            if i == position {
                doc = doc.garbage(&vec![0x0F; garbage_len]);
            }
            ts += delta;
            doc = doc.record(0, ts);
        }
        let buf = doc.build();

        let options = RecoverOptions {
            min_sync_count: 3,
            max_fwd_len: 10,
            max_back_count: 0,
            max_delta_t: Some(5.0),
            ..Default::default()
        };
        let recovery = recover(&buf, &profile::minimal(), &options).unwrap();

        let timestamps = common::timestamps(&recovery.messages);
        for pair in timestamps.windows(2) {
            let delta = pair[1] as i64 - pair[0] as i64;
            prop_assert!((0..=5).contains(&delta), "Δt {} out of range", delta);
        }
    }
}
