//! Pairwise alignment of two reference sequences.
//!
//! A Gotoh affine-gap alignment in which every query base must be aligned while the target's
//! leading and trailing overhangs are free. Overhangs are reported with the `P` transcript
//! operation and a gap in the query.

/// Scoring scheme for [`align_pair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scoring {
    pub match_score: i32,
    pub mismatch: i32,
    /// Score of the first base of a gap.
    pub gap_open: i32,
    /// Score of every further base of a gap.
    pub gap_extend: i32,
}

impl Default for Scoring {
    fn default() -> Self {
        Self { match_score: 2, mismatch: -2, gap_open: -3, gap_extend: -1 }
    }
}

/// Two equal-length gapped strings and the transcript relating them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairwiseAlignment {
    pub target: String,
    pub query: String,
    /// One of `=`, `X`, `I` (query base over a target gap), `D` (target base over a query
    /// gap) or `P` (unaligned target overhang) per column.
    pub transcript: String,
    pub score: i32,
}

const NEG_INF: i32 = i32::MIN / 4;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Diagonal,
    TargetGap,
    QueryGap,
}

impl State {
    fn bits(self) -> u8 {
        match self {
            State::Diagonal => 0,
            State::TargetGap => 1,
            State::QueryGap => 2,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            1 => State::TargetGap,
            2 => State::QueryGap,
            _ => State::Diagonal,
        }
    }
}

fn best_of(diagonal: i32, target_gap: i32, query_gap: i32) -> (i32, State) {
    let mut best = (diagonal, State::Diagonal);
    if target_gap > best.0 {
        best = (target_gap, State::TargetGap);
    }
    if query_gap > best.0 {
        best = (query_gap, State::QueryGap);
    }
    best
}

/// Align `query` against `target` with `scoring`.
///
/// # Examples
///
/// ```
/// use minorseq_lib::align::{Scoring, align_pair};
///
/// let aln = align_pair(b"GGACGTGG", b"ACGT", &Scoring::default());
/// assert_eq!(aln.target, "GGACGTGG");
/// assert_eq!(aln.query, "--ACGT--");
/// assert_eq!(aln.transcript, "PP====PP");
/// ```
#[must_use]
pub fn align_pair(target: &[u8], query: &[u8], scoring: &Scoring) -> PairwiseAlignment {
    let n = target.len();
    let m = query.len();
    let width = n + 1;

    // Rows index the query, columns the target. `diag` holds scores ending in an aligned pair,
    // `tgap` a query base over a target gap, `qgap` a target base over a query gap.
    let mut diag_prev = vec![0; width];
    let mut tgap_prev = vec![NEG_INF; width];
    let mut qgap_prev = vec![NEG_INF; width];
    let mut trace = vec![0u8; (m + 1) * width];

    for i in 1..=m {
        let mut diag = vec![NEG_INF; width];
        let mut tgap = vec![NEG_INF; width];
        let mut qgap = vec![NEG_INF; width];

        // a query prefix aligned to nothing is a run of target gaps
        let (score, from) = if i == 1 {
            (diag_prev[0] + scoring.gap_open, State::Diagonal)
        } else {
            (tgap_prev[0] + scoring.gap_extend, State::TargetGap)
        };
        tgap[0] = score;
        trace[i * width] = from.bits() << 2;

        for j in 1..=n {
            let pair =
                if query[i - 1] == target[j - 1] { scoring.match_score } else { scoring.mismatch };
            let (best, d_from) = best_of(diag_prev[j - 1], tgap_prev[j - 1], qgap_prev[j - 1]);
            diag[j] = best + pair;

            let (best, t_from) = best_of(
                diag_prev[j] + scoring.gap_open,
                tgap_prev[j] + scoring.gap_extend,
                qgap_prev[j] + scoring.gap_open,
            );
            tgap[j] = best;

            let (best, q_from) = best_of(
                diag[j - 1] + scoring.gap_open,
                tgap[j - 1] + scoring.gap_open,
                qgap[j - 1] + scoring.gap_extend,
            );
            qgap[j] = best;

            trace[i * width + j] = d_from.bits() | (t_from.bits() << 2) | (q_from.bits() << 4);
        }

        diag_prev = diag;
        tgap_prev = tgap;
        qgap_prev = qgap;
    }

    // best end column in the last row; the target suffix after it is a free overhang
    let mut end = (NEG_INF, 0, State::Diagonal);
    for j in 0..=n {
        let (score, state) = if m == 0 {
            (0, State::Diagonal)
        } else {
            best_of(diag_prev[j], tgap_prev[j], qgap_prev[j])
        };
        if score > end.0 {
            end = (score, j, state);
        }
    }
    let (score, end_col, mut state) = end;

    let mut target_aln = Vec::with_capacity(n + m);
    let mut query_aln = Vec::with_capacity(n + m);
    let mut transcript = Vec::with_capacity(n + m);

    for j in (end_col..n).rev() {
        target_aln.push(target[j]);
        query_aln.push(b'-');
        transcript.push(b'P');
    }

    let (mut i, mut j) = (m, end_col);
    while i > 0 {
        let cell = trace[i * width + j];
        match state {
            State::Diagonal => {
                target_aln.push(target[j - 1]);
                query_aln.push(query[i - 1]);
                transcript.push(if target[j - 1] == query[i - 1] { b'=' } else { b'X' });
                state = State::from_bits(cell);
                i -= 1;
                j -= 1;
            }
            State::TargetGap => {
                target_aln.push(b'-');
                query_aln.push(query[i - 1]);
                transcript.push(b'I');
                state = State::from_bits(cell >> 2);
                i -= 1;
            }
            State::QueryGap => {
                target_aln.push(target[j - 1]);
                query_aln.push(b'-');
                transcript.push(b'D');
                state = State::from_bits(cell >> 4);
                j -= 1;
            }
        }
    }

    for k in (0..j).rev() {
        target_aln.push(target[k]);
        query_aln.push(b'-');
        transcript.push(b'P');
    }

    target_aln.reverse();
    query_aln.reverse();
    transcript.reverse();

    PairwiseAlignment {
        target: String::from_utf8_lossy(&target_aln).into_owned(),
        query: String::from_utf8_lossy(&query_aln).into_owned(),
        transcript: String::from_utf8_lossy(&transcript).into_owned(),
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ungapped(s: &str) -> String {
        s.chars().filter(|&c| c != '-').collect()
    }

    #[rstest]
    #[case("AAAACGTACGTAAAA", "CGTACGT", "AAAACGTACGTAAAA", "----CGTACGT----", "PPPP=======PPPP")]
    #[case("ACGTTGCA", "ACGTATGCA", "ACGT-TGCA", "ACGTATGCA", "====I====")]
    #[case("ACGTAACCGGTT", "ACGTCCGGTT", "ACGTAACCGGTT", "ACGT--CCGGTT", "====DD======")]
    #[case("ACGTACGT", "ACGAACGT", "ACGTACGT", "ACGAACGT", "===X====")]
    fn test_alignments(
        #[case] target: &str,
        #[case] query: &str,
        #[case] target_aln: &str,
        #[case] query_aln: &str,
        #[case] transcript: &str,
    ) {
        let aln = align_pair(target.as_bytes(), query.as_bytes(), &Scoring::default());
        assert_eq!(aln.target, target_aln);
        assert_eq!(aln.query, query_aln);
        assert_eq!(aln.transcript, transcript);
    }

    #[test]
    fn test_gapped_strings_restore_inputs() {
        let target = b"TTGACCTGAAGGCTACGATCGGGA";
        let query = b"GACCTCAAGGCTTACGATC";
        let aln = align_pair(target, query, &Scoring::default());
        assert_eq!(aln.target.len(), aln.query.len());
        assert_eq!(aln.transcript.len(), aln.query.len());
        assert_eq!(ungapped(&aln.target).as_bytes(), target);
        assert_eq!(ungapped(&aln.query).as_bytes(), query);
    }

    #[test]
    fn test_affine_gaps_prefer_one_long_gap() {
        // two separate single-base gaps would score lower than one gap of two
        let aln = align_pair(b"AAAGGCCCTTT", b"AAACCCTTT", &Scoring::default());
        assert_eq!(aln.transcript.matches('D').count(), 2);
        assert!(aln.transcript.contains("DD"));
    }

    #[test]
    fn test_empty_query() {
        let aln = align_pair(b"ACG", b"", &Scoring::default());
        assert_eq!(aln.query, "---");
        assert_eq!(aln.transcript, "PPP");
        assert_eq!(aln.score, 0);
    }

    #[test]
    fn test_query_overhang_becomes_insertion() {
        let aln = align_pair(b"CGTACGT", b"TTCGTACGT", &Scoring::default());
        assert_eq!(aln.query, "TTCGTACGT");
        assert_eq!(aln.target, "--CGTACGT");
        assert_eq!(aln.transcript, "II=======");
    }
}
