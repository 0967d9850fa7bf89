//! Scalar affine-gap local alignment kernels.
//!
//! `local_score` is the scalar twin of the striped SIMD kernels: same
//! recurrence, same tie handling, same second-best bookkeeping, so the
//! two paths must return identical results for identical inputs. It is
//! both the fallback on machines without SIMD and the reference side of
//! the parity tests. `traceback` is the full-matrix variant that emits a
//! CIGAR; it runs only for candidates that survive score filtering.

use super::{LocalHit, SwScores};
use crate::align::cigar::Cigar;

const NEG: i32 = i32::MIN / 2;

/// Score-only local alignment of `query` against `target`.
///
/// Returns the best score with its inclusive end coordinates and the best
/// score ending at least `mask_len` target positions away from the
/// optimum (the region second-best used by the MAPQ estimator). Ties
/// resolve to the lowest target position, then the lowest query position.
pub fn local_score(
    scores: &SwScores,
    query: &[u8],
    target: &[u8],
    mask_len: usize,
) -> LocalHit {
    if query.is_empty() || target.is_empty() {
        return LocalHit::default();
    }
    let q = query.len();
    let oe = scores.gap_open + scores.gap_extend;
    let ext = scores.gap_extend;

    let mut h_row = vec![0i32; q];
    let mut e_row = vec![NEG; q];
    let mut col_max = Vec::with_capacity(target.len());

    let mut best = 0i32;
    let mut best_i = 0usize;
    let mut best_j = 0usize;

    for (i, &t) in target.iter().enumerate() {
        let mut f = NEG;
        let mut diag = 0i32;
        let mut cb = 0i32;
        let mut cb_j = 0usize;
        for (j, &qc) in query.iter().enumerate() {
            let e = e_row[j];
            let mut h = diag + scores.substitution(qc, t);
            if h < e {
                h = e;
            }
            if h < f {
                h = f;
            }
            if h < 0 {
                h = 0;
            }
            diag = h_row[j];
            h_row[j] = h;
            let open = h - oe;
            e_row[j] = (e - ext).max(open);
            f = (f - ext).max(open);
            if h > cb {
                cb = h;
                cb_j = j;
            }
        }
        col_max.push(cb);
        if cb > best {
            best = cb;
            best_i = i;
            best_j = cb_j;
        }
    }

    let score2 = second_best(&col_max, best_i, mask_len);
    LocalHit {
        score: best,
        score2,
        ref_end: best_i as i32,
        read_end: best_j as i32,
    }
}

/// Best column maximum outside `mask_len` positions of the optimum's
/// column; shared with the SIMD kernels so the definition cannot drift.
pub(super) fn second_best(col_max: &[i32], best_i: usize, mask_len: usize) -> i32 {
    let mut score2 = 0i32;
    for (i, &m) in col_max.iter().enumerate() {
        if i.abs_diff(best_i) > mask_len && m > score2 {
            score2 = m;
        }
    }
    score2
}

/// A traceback alignment: inclusive begin/end coordinates on both
/// sequences plus the CIGAR (soft clips cover the unaligned query ends,
/// so its read-consuming length equals the query length).
#[derive(Debug, Clone)]
pub struct TracebackAln {
    pub score: i32,
    pub ref_beg: i32,
    pub ref_end: i32,
    pub read_beg: i32,
    pub read_end: i32,
    pub cigar: Cigar,
}

// Per-cell direction bits for the affine traceback.
const H_FROM_DIAG: u8 = 1;
const H_FROM_E: u8 = 2;
const H_FROM_F: u8 = 3;
const H_SRC_MASK: u8 = 3;
const E_EXTENDS: u8 = 4;
const F_EXTENDS: u8 = 8;

/// Full local alignment with CIGAR. Returns `None` when nothing scores
/// above zero. Same scoring scheme and tie order as `local_score`.
pub fn traceback(scores: &SwScores, query: &[u8], target: &[u8]) -> Option<TracebackAln> {
    if query.is_empty() || target.is_empty() {
        return None;
    }
    let q = query.len();
    let t = target.len();
    let oe = scores.gap_open + scores.gap_extend;
    let ext = scores.gap_extend;

    let mut h_row = vec![0i32; q];
    let mut e_row = vec![NEG; q];
    let mut dir = vec![0u8; q * t];

    let mut best = 0i32;
    let mut best_i = 0usize;
    let mut best_j = 0usize;

    for i in 0..t {
        let mut f = NEG;
        let mut diag = 0i32;
        for j in 0..q {
            let mut cell = 0u8;
            let e = e_row[j];
            let sub = diag + scores.substitution(query[j], target[i]);

            let mut h = 0i32;
            if sub > h {
                h = sub;
                cell = H_FROM_DIAG;
            }
            if e > h {
                h = e;
                cell = H_FROM_E;
            }
            if f > h {
                h = f;
                cell = H_FROM_F;
            }

            diag = h_row[j];
            h_row[j] = h;

            let open = h - oe;
            if e - ext >= open {
                e_row[j] = e - ext;
                cell |= E_EXTENDS;
            } else {
                e_row[j] = open;
            }
            if f - ext >= open {
                f -= ext;
                cell |= F_EXTENDS;
            } else {
                f = open;
            }
            dir[i * q + j] = cell;

            if h > best {
                best = h;
                best_i = i;
                best_j = j;
            }
        }
    }

    if best <= 0 {
        return None;
    }

    // Walk back from the optimum through the packed direction bits.
    let mut cigar = Cigar::new();
    let mut i = best_i as i32;
    let mut j = best_j as i32;
    loop {
        let cell = dir[i as usize * q + j as usize];
        match cell & H_SRC_MASK {
            H_FROM_DIAG => {
                cigar.push(1, b'M');
                i -= 1;
                j -= 1;
                if i < 0 || j < 0 {
                    break;
                }
                if dir[i as usize * q + j as usize] & H_SRC_MASK == 0 {
                    break;
                }
            }
            H_FROM_E => {
                // Gap consuming the target: deletion from the read's
                // view. The provenance flag of E(i, j) lives one target
                // row up, where the value was produced.
                loop {
                    cigar.push(1, b'D');
                    i -= 1;
                    if i < 0 || dir[i as usize * q + j as usize] & E_EXTENDS == 0 {
                        break;
                    }
                }
                if i < 0 {
                    break;
                }
            }
            H_FROM_F => {
                // Gap consuming the query: insertion; provenance one
                // query column back.
                loop {
                    cigar.push(1, b'I');
                    j -= 1;
                    if j < 0 || dir[i as usize * q + j as usize] & F_EXTENDS == 0 {
                        break;
                    }
                }
                if j < 0 {
                    break;
                }
            }
            _ => break,
        }
    }

    // The walk stopped on the first cell of the alignment.
    let read_beg = (j + 1).max(0);
    let ref_beg = (i + 1).max(0);

    cigar.reverse();
    let mut full = Cigar::new();
    full.push(read_beg as u32, b'S');
    for &(len, op) in cigar.ops() {
        full.push(len, op);
    }
    full.push((q as i32 - 1 - best_j as i32).max(0) as u32, b'S');
    full.compact();

    Some(TracebackAln {
        score: best,
        ref_beg,
        ref_end: best_i as i32,
        read_beg,
        read_end: best_j as i32,
        cigar: full,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::encode;

    fn scores() -> SwScores {
        SwScores::default()
    }

    #[test]
    fn exact_match_scores_full_length() {
        let q = encode(b"ACGTACGTAC");
        let hit = local_score(&scores(), &q, &q, 5);
        assert_eq!(hit.score, 10);
        assert_eq!(hit.ref_end, 9);
        assert_eq!(hit.read_end, 9);
        let tb = traceback(&scores(), &q, &q).unwrap();
        assert_eq!(tb.score, 10);
        assert_eq!(tb.cigar.to_string(), "10M");
    }

    #[test]
    fn embedded_match_is_located_and_clipped() {
        let target = encode(b"TTTTTACGTACGTATTTTT");
        let query = encode(b"ACGTACGTA");
        let hit = local_score(&scores(), &query, &target, 2);
        assert_eq!(hit.score, 9);
        assert_eq!(hit.ref_end, 13);
        let tb = traceback(&scores(), &query, &target).unwrap();
        assert_eq!(tb.score, 9);
        assert_eq!(tb.ref_beg, 5);
        assert_eq!(tb.cigar.to_string(), "9M");
        assert_eq!(tb.cigar.read_len(), query.len() as u32);
    }

    #[test]
    fn mismatch_in_the_middle_costs_five() {
        let target = encode(b"ACGTACGTACGTACGT");
        let query = encode(b"ACGTACCTACGTACGT");
        let hit = local_score(&scores(), &query, &target, 4);
        // Best is either side of the mismatch (7 or 8 matches) or the
        // full length through it: 15 matches - 4 = 11.
        assert_eq!(hit.score, 11);
        let tb = traceback(&scores(), &query, &target).unwrap();
        assert_eq!(tb.score, 11);
        assert_eq!(tb.cigar.read_len(), query.len() as u32);
    }

    #[test]
    fn deletion_produces_a_d_run() {
        let target = encode(b"AAAACCCCGGGGTTACGTACGTTTTT");
        let query = encode(b"AAAACCCCGGGGACGTACGTTTTT"); // TT deleted from the read
        let tb = traceback(&scores(), &query, &target).unwrap();
        assert_eq!(tb.cigar.read_len(), query.len() as u32);
        assert_eq!(tb.cigar.to_string(), "12M2D12M");
        // 24 matched bases minus open + 2 extends for the 2-base deletion.
        assert_eq!(tb.score, 24 - (6 + 2));
    }

    #[test]
    fn insertion_produces_an_i_run() {
        let target = encode(b"AAAACCCCGGGGACGTACGTTTTT");
        let query = encode(b"AAAACCCCGGGGTTACGTACGTTTTT"); // TT inserted in the read
        let tb = traceback(&scores(), &query, &target).unwrap();
        assert_eq!(tb.cigar.read_len(), query.len() as u32);
        assert_eq!(tb.cigar.to_string(), "12M2I12M");
        assert_eq!(tb.score, 24 - (6 + 2));
    }

    #[test]
    fn second_best_respects_the_mask_window() {
        // Two copies of the same 8-mer far apart.
        let target = encode(b"ACGTACGTTTTTTTTTTTTTTTTTTTTTACGTACGT");
        let query = encode(b"ACGTACGT");
        let hit = local_score(&scores(), &query, &target, 4);
        assert_eq!(hit.score, 8);
        assert_eq!(hit.score2, 8, "distant duplicate must surface as score2");
        // With a mask window covering the whole target there is no
        // eligible second best.
        let hit = local_score(&scores(), &query, &target, target.len());
        assert_eq!(hit.score2, 0);
    }

    #[test]
    fn ambiguous_bases_take_the_ambiguity_penalty() {
        let target = encode(b"ACGTNACGT");
        let query = encode(b"ACGTNACGT");
        let hit = local_score(&scores(), &query, &target, 3);
        // 8 matches, N-vs-N costs the ambiguity penalty.
        assert_eq!(hit.score, 8 - 1);
    }

    #[test]
    fn ties_resolve_to_the_lowest_target_coordinate() {
        let target = encode(b"ACGTACGTACGT");
        let query = encode(b"ACGT");
        let hit = local_score(&scores(), &query, &target, 0);
        assert_eq!(hit.score, 4);
        assert_eq!(hit.ref_end, 3, "first occurrence wins the tie");
    }
}
