//! Searching corrupted buffers for the longest decodable record stream.
//!
//! Decoding proceeds forward while records decode cleanly and timestamps
//! stay monotonic. On a failure a gap is opened, and its resolution
//! searches a bounded neighborhood: retract up to [`max_back_count`]
//! already-accepted messages, skip up to [`max_fwd_len`] bytes forward,
//! and resume wherever at least [`min_sync_count`] consecutive messages
//! decode validly again. Candidates are tried smallest-disruption-first:
//! by total bytes discarded, preferring forward skips over retracting
//! trusted messages.
//!
//! [`max_back_count`]: RecoverOptions::max_back_count
//! [`max_fwd_len`]: RecoverOptions::max_fwd_len
//! [`min_sync_count`]: RecoverOptions::min_sync_count

use std::collections::VecDeque;

use log::{debug, warn};
use thiserror::Error;

use crate::Span;
use crate::header::{FileHeader, HeaderError};
use crate::message::{self, DecodedMessage, MessageError};
use crate::profile::Profile;
use crate::token::{Token, TokenError, TokenReader};

/// Parameters bounding the recovery search.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoverOptions {
    /// Consecutive valid messages required to declare resynchronization.
    pub min_sync_count: usize,
    /// Upper bound on a single record's plausible length.
    pub max_record_len: Option<usize>,
    /// Gaps tolerated across the whole file.
    pub max_drop_count: usize,
    /// Accepted messages that may be retracted while resolving one gap.
    pub max_back_count: usize,
    /// Bytes that may be skipped forward within one gap.
    pub max_fwd_len: usize,
    /// Maximum seconds between consecutive timestamps; also requires them
    /// to be non-decreasing. Unset disables the check.
    pub max_delta_t: Option<f64>,
    /// Decode record contents while scanning. Disable to synchronize on
    /// token structure alone.
    pub force: bool,
}

impl Default for RecoverOptions {
    fn default() -> Self {
        Self {
            min_sync_count: 3,
            max_record_len: None,
            max_drop_count: 1,
            max_back_count: 3,
            max_fwd_len: 200,
            max_delta_t: None,
            force: true,
        }
    }
}

/// An error recovering a buffer.
#[derive(Debug, Error)]
pub enum RecoverError {
    /// The header could not be parsed.
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// The gap budget was exhausted before the end of the record section.
    #[error("Gap budget of {budget} exhausted with an unresolved gap at offset {offset}.")]
    GapBudgetExceeded { budget: usize, offset: usize },
    /// No resynchronization point within the search bounds.
    #[error("No resynchronization within {max_back_count} messages back and {max_fwd_len} bytes forward of offset {offset}.")]
    NoSync {
        offset: usize,
        max_back_count: usize,
        max_fwd_len: usize,
    },
    /// Caller-supplied slices are unordered, overlapping, or out of
    /// bounds.
    #[error("Slice {0} is unordered, overlapping, or out of bounds.")]
    BadSlices(Span),
}

/// The outcome of a recovery pass.
#[derive(Debug, Clone)]
pub struct Recovery {
    /// The parsed header; `None` in slices mode over headerless data.
    pub header: Option<FileHeader>,
    /// Byte ranges kept, in order. Their concatenation is the repaired
    /// header and record section; the trailer is rebuilt by the writer.
    pub kept: Vec<Span>,
    /// Byte ranges excluded, for reporting.
    pub dropped: Vec<Span>,
    /// Messages decoded from the kept ranges, when decoding contents.
    pub messages: Vec<DecodedMessage>,
    /// Gaps consumed from the budget.
    pub gaps: usize,
}

/// A resumable scan state, captured after an accepted message.
#[derive(Debug, Clone)]
struct Checkpoint<'a> {
    reader: TokenReader<'a>,
    messages: usize,
}

#[derive(Debug, Error)]
enum StepError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Message(#[from] MessageError),
    /// Timestamps regressed or jumped beyond the permitted delta.
    #[error("Timestamp {next} out of range of {prev} (at offset {offset}).")]
    Time { prev: u32, next: u32, offset: usize },
}

enum Step {
    Definition,
    Data(Option<DecodedMessage>),
}

/// Recover the longest valid record stream from a buffer.
///
/// Returns the kept and dropped byte ranges and the surviving messages,
/// or fails when the gap budget is exhausted or a gap has no
/// resynchronization point within the search bounds.
pub fn recover(
    r: &[u8],
    profile: &dyn Profile,
    options: &RecoverOptions,
) -> Result<Recovery, RecoverError> {
    let header = FileHeader::parse(r, true)?;
    let header_len = header.header_size as usize;

    // Establish the record section bounds, trusting the declared data
    // size only when it agrees with the buffer.
    let declared_end = header_len + header.data_size as usize;
    let end = if declared_end + 2 == r.len() {
        declared_end
    } else {
        warn!(
            "Declared data size {} disagrees with the {} byte buffer.",
            header.data_size,
            r.len(),
        );
        r.len().saturating_sub(2).max(header_len)
    };

    let mut reader =
        TokenReader::new(r, header_len, end).with_max_record_len(options.max_record_len);

    let mut kept = vec![Span::new(0, header_len)];
    let mut dropped: Vec<Span> = Vec::new();
    let mut messages: Vec<DecodedMessage> = Vec::new();
    let mut gaps = 0;

    // Scan states after each of the last `max_back_count` accepted
    // messages, oldest first, seeded with the state before the first.
    let mut checkpoints: VecDeque<Checkpoint> = VecDeque::new();
    checkpoints.push_back(Checkpoint {
        reader: reader.clone(),
        messages: 0,
    });

    loop {
        let at = reader.position();
        let time_base = reader.last_timestamp();

        match step(&mut reader, profile, options) {
            Ok(None) => break,
            Ok(Some(item)) => {
                extend_kept(&mut kept, at, reader.position());

                if let Step::Data(message) = item {
                    messages.extend(message);
                    checkpoints.push_back(Checkpoint {
                        reader: reader.clone(),
                        messages: messages.len(),
                    });
                    while checkpoints.len() > options.max_back_count + 1 {
                        checkpoints.pop_front();
                    }
                }
            }
            Err(err) => {
                reader.rewind(at, time_base);
                debug!("Decoding failed at offset {at}: {err}");

                if gaps == options.max_drop_count {
                    return Err(RecoverError::GapBudgetExceeded {
                        budget: options.max_drop_count,
                        offset: at,
                    });
                }

                let Some((b, s)) = resolve_gap(&reader, &checkpoints, at, profile, options) else {
                    return Err(RecoverError::NoSync {
                        offset: at,
                        max_back_count: options.max_back_count,
                        max_fwd_len: options.max_fwd_len,
                    });
                };

                let (base, base_messages) = if b == 0 {
                    (reader.clone(), messages.len())
                } else {
                    let checkpoint = &checkpoints[checkpoints.len() - 1 - b];
                    (checkpoint.reader.clone(), checkpoint.messages)
                };

                let gap = Span::new(base.position(), at + s);
                warn!(
                    "Dropped bytes {gap} ({} messages retracted).",
                    messages.len() - base_messages,
                );

                messages.truncate(base_messages);
                if b > 0 {
                    checkpoints.truncate(checkpoints.len() - b);
                }
                retract_kept(&mut kept, gap.start);
                merge_dropped(&mut dropped, gap);
                gaps += 1;

                reader = base;
                reader.seek(gap.end);
            }
        }
    }

    kept.retain(|span| !span.is_empty());

    Ok(Recovery {
        header: Some(header),
        kept,
        dropped,
        messages,
        gaps,
    })
}

/// Take caller-supplied spans verbatim as the kept set, skipping the
/// search entirely.
///
/// Spans must be ordered, non-overlapping, and within the buffer. The
/// header is parsed opportunistically; headerless data is accepted, for
/// repairs that prepend one.
pub fn recover_slices(r: &[u8], slices: &[Span]) -> Result<Recovery, RecoverError> {
    let mut at = 0;
    for span in slices {
        if span.end <= span.start || span.start < at || span.end > r.len() {
            return Err(RecoverError::BadSlices(*span));
        }
        at = span.end;
    }

    let mut dropped = Vec::new();
    let mut at = 0;
    for span in slices {
        if span.start > at {
            dropped.push(Span::new(at, span.start));
        }
        at = span.end;
    }
    if at < r.len() {
        dropped.push(Span::new(at, r.len()));
    }

    Ok(Recovery {
        header: FileHeader::parse(r, true).ok(),
        kept: slices.to_vec(),
        dropped,
        messages: Vec::new(),
        gaps: 0,
    })
}

/// Search the gap neighborhood for a resynchronization point.
///
/// Candidate pairs retract `b` messages and skip `s` bytes forward of the
/// failure offset; they are tried by increasing total discarded bytes,
/// ties broken by smaller `b`. Returns the first pair from which decoding
/// resynchronizes.
fn resolve_gap(
    reader: &TokenReader,
    checkpoints: &VecDeque<Checkpoint>,
    failed_at: usize,
    profile: &dyn Profile,
    options: &RecoverOptions,
) -> Option<(usize, usize)> {
    let mut candidates = Vec::new();

    for b in 0..=options.max_back_count {
        let base = if b == 0 {
            reader
        } else if checkpoints.len() > b {
            &checkpoints[checkpoints.len() - 1 - b].reader
        } else {
            break;
        };

        let retracted = failed_at - base.position();
        for s in 0..=options.max_fwd_len {
            if failed_at + s > reader.end() {
                break;
            }
            candidates.push((retracted + s, b, s));
        }
    }

    candidates.sort_unstable();

    // A candidate that only reaches a clean end of buffer, without fully
    // resynchronizing, is kept in reserve: dropping a torn tail is valid,
    // but never preferred over a true resynchronization.
    let mut clean_tail = None;

    for (_, b, s) in candidates {
        let base = if b == 0 {
            reader
        } else {
            &checkpoints[checkpoints.len() - 1 - b].reader
        };

        match trial(base, failed_at + s, profile, options) {
            Trial::Synced => {
                debug!("Resynchronized after retracting {b} messages and skipping {s} bytes.");
                return Some((b, s));
            }
            Trial::CleanTail => clean_tail = clean_tail.or(Some((b, s))),
            Trial::Failed => {}
        }
    }

    clean_tail
}

enum Trial {
    /// Enough consecutive messages decoded to declare resynchronization.
    Synced,
    /// Reached the end of the record section without an error, but short
    /// of the synchronization count.
    CleanTail,
    Failed,
}

/// Attempt to resume decoding from an offset, given a base scan state.
///
/// [`min_sync_count`] consecutive messages must decode validly and
/// monotonically.
///
/// [`min_sync_count`]: RecoverOptions::min_sync_count
fn trial(
    base: &TokenReader,
    resume: usize,
    profile: &dyn Profile,
    options: &RecoverOptions,
) -> Trial {
    let mut reader = base.clone();
    reader.seek(resume);

    let mut synced = 0;
    while synced < options.min_sync_count {
        match step(&mut reader, profile, options) {
            Ok(None) => return Trial::CleanTail,
            Ok(Some(Step::Definition)) => {}
            Ok(Some(Step::Data(_))) => synced += 1,
            Err(_) => return Trial::Failed,
        }
    }

    Trial::Synced
}

/// Decode one token, enforcing the time invariant on data records.
fn step(
    reader: &mut TokenReader,
    profile: &dyn Profile,
    options: &RecoverOptions,
) -> Result<Option<Step>, StepError> {
    let at = reader.position();
    let time_base = reader.last_timestamp();

    let Some(token) = reader.next_token() else {
        return Ok(None);
    };

    match token? {
        Token::Definition(_) => Ok(Some(Step::Definition)),
        Token::Data(data) => {
            if let (Some(max), Some(prev), Some(next)) =
                (options.max_delta_t, time_base, data.timestamp)
            {
                let delta = next as f64 - prev as f64;
                if !(0.0..=max).contains(&delta) {
                    return Err(StepError::Time {
                        prev,
                        next,
                        offset: at,
                    });
                }
            }

            let message = match reader.definitions().get(data.local) {
                Some(definition) if options.force => {
                    Some(message::decode(&data, definition, profile)?)
                }
                _ => None,
            };

            Ok(Some(Step::Data(message)))
        }
    }
}

/// Extend the kept set over an accepted token.
fn extend_kept(kept: &mut Vec<Span>, start: usize, end: usize) {
    match kept.last_mut() {
        Some(last) if last.end == start => last.end = end,
        _ => kept.push(Span::new(start, end)),
    }
}

/// Shrink the kept set back to an offset, re-opening retracted spans.
fn retract_kept(kept: &mut Vec<Span>, to: usize) {
    while let Some(last) = kept.last_mut() {
        if last.start >= to {
            kept.pop();
        } else {
            last.end = last.end.min(to);
            break;
        }
    }
}

/// Record a dropped span, absorbing any earlier spans it contains.
fn merge_dropped(dropped: &mut Vec<Span>, gap: Span) {
    dropped.retain(|span| !(gap.start <= span.start && span.end <= gap.end));
    dropped.push(gap);
}
