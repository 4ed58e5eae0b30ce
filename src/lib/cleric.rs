//! Re-target alignments from one reference to another.
//!
//! Given a pairwise alignment of the reference the reads were mapped to (the source) and a new
//! reference (the destination), every read's CIGAR is replayed column by column over the
//! gapped alignment and rewritten against the destination. Matches become `=`/`X` against the
//! destination sequence and NM is recomputed.

use anyhow::Result;
use noodles::core::Position;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;

use crate::align::{Scoring, align_pair};
use crate::errors::MinorseqError;
use crate::sam::{expand_cigar, record_name, to_cigar};

/// A CIGAR run.
pub type Run = (Kind, usize);

/// Gapped source and destination references plus the position maps between them.
#[derive(Debug, Clone)]
pub struct Cleric {
    source: Vec<u8>,
    dest: Vec<u8>,
    dest_gapless: Vec<u8>,
    /// Ungapped source position to gapped column.
    ref_to_source: Vec<usize>,
    /// Gapped column to ungapped destination position.
    source_to_ref: Vec<Option<usize>>,
}

/// Outcome of re-targeting one CIGAR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retargeted {
    /// 0-based start on the destination.
    pub start: usize,
    pub runs: Vec<Run>,
    pub edit_distance: usize,
}

fn gapless(seq: &[u8]) -> Vec<u8> {
    seq.iter().copied().filter(|&b| b != b'-').collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Op(Kind),
    /// First sentinel after the last operation.
    End,
    /// Second sentinel; flushes the final run.
    Flush,
}

impl Cleric {
    /// Build from two equal-length gapped sequences.
    ///
    /// # Errors
    /// Returns an error if the gapped sequences differ in length.
    pub fn from_gapped(source: &[u8], dest: &[u8]) -> Result<Self> {
        if source.len() != dest.len() {
            return Err(MinorseqError::InvalidParameter {
                parameter: "aln".to_string(),
                reason: format!(
                    "aligned sequences differ in length ({} vs {})",
                    source.len(),
                    dest.len()
                ),
            }
            .into());
        }

        let ref_to_source =
            source.iter().enumerate().filter(|(_, b)| **b != b'-').map(|(i, _)| i).collect();
        let mut next = 0;
        let source_to_ref = dest
            .iter()
            .map(|&b| {
                (b != b'-').then(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect();

        Ok(Self {
            source: source.to_ascii_uppercase(),
            dest: dest.to_ascii_uppercase(),
            dest_gapless: gapless(dest).to_ascii_uppercase(),
            ref_to_source,
            source_to_ref,
        })
    }

    /// Align `source` and `dest` with the default scoring and build from the result.
    ///
    /// # Errors
    /// Returns an error if the alignment yields inconsistent gapped strings.
    pub fn from_sequences(source: &[u8], dest: &[u8]) -> Result<Self> {
        let aln = align_pair(
            &source.to_ascii_uppercase(),
            &dest.to_ascii_uppercase(),
            &Scoring::default(),
        );
        Self::from_gapped(aln.target.as_bytes(), aln.query.as_bytes())
    }

    #[must_use]
    pub fn source_aligned(&self) -> &[u8] {
        &self.source
    }

    #[must_use]
    pub fn dest_aligned(&self) -> &[u8] {
        &self.dest
    }

    /// The destination reference without gaps.
    #[must_use]
    pub fn dest_gapless(&self) -> &[u8] {
        &self.dest_gapless
    }

    /// Rewrite `record` onto the destination reference, which becomes reference 0.
    ///
    /// Returns `Ok(None)` for unplaced records and for records whose new CIGAR is empty.
    ///
    /// # Errors
    /// Returns an error if the CIGAR walks off the reference alignment or the read.
    pub fn retarget_record(&self, record: &RecordBuf) -> Result<Option<RecordBuf>> {
        if record.flags().is_unmapped() {
            return Ok(None);
        }
        let Some(start) = record.alignment_start() else { return Ok(None) };

        let name = record_name(record);
        let ops = expand_cigar(record);
        let retargeted =
            self.retarget(&name, usize::from(start) - 1, &ops, record.sequence().as_ref())?;
        if retargeted.runs.is_empty() {
            return Ok(None);
        }

        let mut out = record.clone();
        *out.cigar_mut() = to_cigar(&retargeted.runs);
        *out.reference_sequence_id_mut() = Some(0);
        *out.alignment_start_mut() = Position::new(retargeted.start + 1);
        let nm = i32::try_from(retargeted.edit_distance).unwrap_or(i32::MAX);
        out.data_mut().insert(Tag::EDIT_DISTANCE, Value::from(nm));
        Ok(Some(out))
    }

    /// Re-target an expanded CIGAR starting at 0-based source position `start`.
    ///
    /// # Errors
    /// Returns [`MinorseqError::InvalidCigar`] if the operations run past the reference
    /// alignment or the read sequence.
    pub fn retarget(
        &self,
        read_name: &str,
        start: usize,
        ops: &[Kind],
        sequence: &[u8],
    ) -> Result<Retargeted> {
        let (new_start, runs) = self.replay(read_name, start, ops)?;
        let runs = trim_right_flank(trim_left_flank(runs));
        self.refine(read_name, new_start, &runs, sequence)
    }

    fn out_of_range(read_name: &str, what: &str) -> anyhow::Error {
        MinorseqError::InvalidCigar {
            read_name: read_name.to_string(),
            reason: format!("alignment runs past the end of the {what}"),
        }
        .into()
    }

    /// Walk the operations over the gapped alignment and emit destination runs.
    fn replay(&self, read_name: &str, start: usize, ops: &[Kind]) -> Result<(usize, Vec<Run>)> {
        let mut col = *self
            .ref_to_source
            .get(start)
            .ok_or_else(|| Self::out_of_range(read_name, "source reference"))?;

        let source_gap = |col: usize| {
            self.source
                .get(col)
                .map(|&b| b == b'-')
                .ok_or_else(|| Self::out_of_range(read_name, "source reference"))
        };
        let dest_gap = |col: usize| {
            self.dest
                .get(col)
                .map(|&b| b == b'-')
                .ok_or_else(|| Self::out_of_range(read_name, "destination reference"))
        };

        let tokens: Vec<Token> = ops
            .iter()
            .map(|&k| Token::Op(k))
            .chain([Token::End, Token::Flush])
            .collect();

        let mut runs = Vec::new();
        let mut previous: Option<Run> = None;
        let mut current: Option<Run> = None;
        let mut started = false;
        let mut new_start = 0;
        let mut i = 0;

        while i < tokens.len() {
            let mut at_end = false;
            let mut flush = false;

            let state = match tokens[i] {
                Token::Op(Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch) => {
                    if !started {
                        if source_gap(col)? {
                            col += 1;
                            continue;
                        }
                        let state = if let Some(pos) = self.source_to_ref[col] {
                            new_start = pos;
                            started = true;
                            Kind::SequenceMatch
                        } else {
                            Kind::SoftClip
                        };
                        i += 1;
                        col += 1;
                        Some(state)
                    } else {
                        match (source_gap(col)?, dest_gap(col)?) {
                            (true, true) => {
                                col += 1;
                                continue;
                            }
                            (true, false) => {
                                col += 1;
                                Some(Kind::Deletion)
                            }
                            (false, true) => {
                                col += 1;
                                i += 1;
                                Some(Kind::Insertion)
                            }
                            (false, false) => {
                                col += 1;
                                i += 1;
                                Some(Kind::SequenceMatch)
                            }
                        }
                    }
                }
                Token::Op(Kind::Insertion) => {
                    if !started {
                        if source_gap(col)? {
                            col += 1;
                            continue;
                        }
                        i += 1;
                        Some(Kind::SoftClip)
                    } else {
                        match (source_gap(col)?, dest_gap(col)?) {
                            (true, true) => {
                                col += 1;
                                continue;
                            }
                            (true, false) => {
                                col += 1;
                                i += 1;
                                Some(Kind::SequenceMatch)
                            }
                            _ => {
                                i += 1;
                                Some(Kind::Insertion)
                            }
                        }
                    }
                }
                Token::Op(Kind::Deletion | Kind::Skip) => {
                    if !started {
                        if !source_gap(col)? {
                            i += 1;
                        }
                        col += 1;
                        continue;
                    }
                    match (source_gap(col)?, dest_gap(col)?) {
                        (true, true) => {
                            col += 1;
                            continue;
                        }
                        (true, false) => {
                            col += 1;
                            Some(Kind::Deletion)
                        }
                        (false, true) => {
                            col += 1;
                            i += 1;
                            Some(Kind::Pad)
                        }
                        (false, false) => {
                            col += 1;
                            i += 1;
                            Some(Kind::Deletion)
                        }
                    }
                }
                Token::Op(Kind::SoftClip) => {
                    i += 1;
                    Some(Kind::SoftClip)
                }
                Token::Op(Kind::HardClip) => {
                    i += 1;
                    Some(Kind::HardClip)
                }
                Token::Op(Kind::Pad) => {
                    if !started {
                        i += 1;
                        continue;
                    }
                    i += 1;
                    match (source_gap(col)?, dest_gap(col)?) {
                        (true, false) => {
                            col += 1;
                            Some(Kind::Deletion)
                        }
                        _ => Some(Kind::Pad),
                    }
                }
                Token::End => {
                    i += 1;
                    at_end = true;
                    None
                }
                Token::Flush => {
                    i += 1;
                    flush = true;
                    None
                }
            };

            if flush {
                runs.extend(previous.take());
            }

            if state == current.map(|(kind, _)| kind) {
                if let Some((_, len)) = current.as_mut() {
                    *len += 1;
                }
                continue;
            }

            // an insertion running into the end of the read is a clip
            if let Some((kind, _)) = current.as_mut() {
                if state.is_none() && at_end && *kind == Kind::Insertion {
                    *kind = Kind::SoftClip;
                }
            }
            fold_adjacent_indels(&mut previous, &mut current);
            runs.extend(previous.take());
            previous = current;
            current = state.map(|kind| (kind, 1));
        }

        Ok((new_start, runs))
    }

    /// Split `=` runs into `=`/`X` against the destination and compute the edit distance.
    fn refine(
        &self,
        read_name: &str,
        start: usize,
        runs: &[Run],
        sequence: &[u8],
    ) -> Result<Retargeted> {
        let mut read_pos = 0;
        let mut ref_pos = start;
        let mut edit_distance = 0;
        let mut refined: Vec<Run> = Vec::with_capacity(runs.len());

        for &(kind, len) in runs {
            match kind {
                Kind::SequenceMatch => {
                    let bases = sequence
                        .get(read_pos..read_pos + len)
                        .ok_or_else(|| Self::out_of_range(read_name, "read"))?;
                    let reference = self
                        .dest_gapless
                        .get(ref_pos..ref_pos + len)
                        .ok_or_else(|| Self::out_of_range(read_name, "destination reference"))?;
                    for (b, r) in bases.iter().zip(reference) {
                        if b.eq_ignore_ascii_case(r) {
                            push_run(&mut refined, Kind::SequenceMatch, 1);
                        } else {
                            edit_distance += 1;
                            push_run(&mut refined, Kind::SequenceMismatch, 1);
                        }
                    }
                    read_pos += len;
                    ref_pos += len;
                }
                Kind::Insertion => {
                    edit_distance += len;
                    push_run(&mut refined, kind, len);
                    read_pos += len;
                }
                Kind::Deletion => {
                    edit_distance += len;
                    push_run(&mut refined, kind, len);
                    ref_pos += len;
                }
                Kind::SoftClip => {
                    push_run(&mut refined, kind, len);
                    read_pos += len;
                }
                Kind::HardClip | Kind::Pad => push_run(&mut refined, kind, len),
                other => {
                    return Err(MinorseqError::InvalidCigar {
                        read_name: read_name.to_string(),
                        reason: format!("unexpected operation {other:?} after re-targeting"),
                    }
                    .into());
                }
            }
        }

        Ok(Retargeted { start, runs: refined, edit_distance })
    }
}

fn push_run(runs: &mut Vec<Run>, kind: Kind, len: usize) {
    match runs.last_mut() {
        Some((last, n)) if *last == kind => *n += len,
        _ => runs.push((kind, len)),
    }
}

/// Fold a deletion run followed by an insertion run (or the reverse) into matches.
fn fold_adjacent_indels(previous: &mut Option<Run>, current: &mut Option<Run>) {
    let (Some((prev_kind, prev_len)), Some((cur_kind, cur_len))) = (*previous, *current) else {
        return;
    };
    let matched = prev_len.min(cur_len);
    match (prev_kind, cur_kind) {
        (Kind::Deletion, Kind::Insertion) => {
            if prev_len == cur_len {
                *previous = None;
                *current = Some((Kind::SequenceMatch, matched));
            } else if prev_len > cur_len {
                *previous = Some((Kind::Deletion, prev_len - matched));
                *current = Some((Kind::SequenceMatch, matched));
            } else {
                *previous = Some((Kind::SequenceMatch, matched));
                *current = Some((Kind::Insertion, cur_len - matched));
            }
        }
        (Kind::Insertion, Kind::Deletion) => {
            if prev_len == cur_len {
                *previous = None;
                *current = Some((Kind::SequenceMatch, matched));
            } else if cur_len > prev_len {
                *previous = Some((Kind::SequenceMatch, matched));
                *current = Some((Kind::Deletion, cur_len - matched));
            } else {
                *previous = Some((Kind::Insertion, prev_len - matched));
                *current = Some((Kind::SequenceMatch, matched));
            }
        }
        _ => {}
    }
}

/// Merge adjacent matches and absorb indels that follow a leading clip.
fn trim_left_flank(mut runs: Vec<Run>) -> Vec<Run> {
    let mut i = 0;
    while i + 1 < runs.len() {
        let (left, right) = (runs[i], runs[i + 1]);
        match (left.0, right.0) {
            (Kind::SequenceMatch, Kind::SequenceMatch) | (Kind::SoftClip, Kind::Insertion) => {
                runs[i].1 += right.1;
                runs.remove(i + 1);
            }
            (Kind::SoftClip | Kind::HardClip, Kind::Deletion | Kind::Pad) => {
                runs.remove(i + 1);
            }
            (Kind::HardClip, Kind::Insertion) => {
                runs[i + 1].0 = Kind::SoftClip;
                i += 1;
            }
            _ => i += 1,
        }
    }
    runs
}

/// Absorb indels that precede a trailing clip, scanning back to the last match.
fn trim_right_flank(mut runs: Vec<Run>) -> Vec<Run> {
    let mut next = runs.len().checked_sub(2);
    while let Some(i) = next {
        let (left, right) = (runs[i], runs[i + 1]);
        if left.0 == Kind::SequenceMatch {
            break;
        }
        match (left.0, right.0) {
            (Kind::Insertion, Kind::SoftClip) => {
                runs[i] = (Kind::SoftClip, left.1 + right.1);
                runs.remove(i + 1);
            }
            (Kind::Deletion | Kind::Pad, Kind::SoftClip | Kind::HardClip) => {
                runs[i] = right;
                runs.remove(i + 1);
            }
            (Kind::Insertion, Kind::HardClip) => runs[i].0 = Kind::SoftClip,
            _ => {}
        }
        next = i.checked_sub(1);
    }
    runs
}
