//! Suffix-array construction strategies.
//!
//! Three interchangeable sorters sit behind the [`SuffixSorter`] trait:
//! a stable comparison-sort baseline, linear-time induced sorting (SA-IS),
//! and SA-IS with its data-parallel phases on rayon. Strategy choice is a
//! performance decision only — all three must produce an identical suffix
//! array for the same text, and the index tests hold them to that.
//!
//! The returned array covers `[0, n]`: the virtual sentinel suffix sorts
//! first, so `sa[0] == n` always.

use clap::ValueEnum;
use rayon::prelude::*;

/// A suffix-array construction strategy over the symbol-coded text
/// (codes `0..=4`; the sentinel is virtual and supplied here).
pub trait SuffixSorter: Sync {
    fn name(&self) -> &'static str;

    /// Build the suffix array of `codes` plus the virtual sentinel.
    /// The result has length `codes.len() + 1` and is a bijection over
    /// `[0, codes.len()]`.
    fn suffix_array(&self, codes: &[u8]) -> Vec<u32>;
}

/// Which sorter to use at index construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SorterKind {
    /// Stable comparison sort of suffix indices. O(n log n) comparisons,
    /// each potentially O(n); the simple reference strategy.
    Stable,
    /// Linear-time induced sorting.
    Sais,
    /// Induced sorting with parallel classification and histogram phases.
    ParSais,
}

impl SorterKind {
    pub fn build(self) -> Box<dyn SuffixSorter> {
        match self {
            SorterKind::Stable => Box::new(StableSorter),
            SorterKind::Sais => Box::new(SaisSorter),
            SorterKind::ParSais => Box::new(ParSaisSorter),
        }
    }
}

/// Baseline: stable sort of `[0, n]` by suffix comparison. The empty
/// (sentinel) suffix compares smallest through the natural slice order.
pub struct StableSorter;

impl SuffixSorter for StableSorter {
    fn name(&self) -> &'static str {
        "stable"
    }

    fn suffix_array(&self, codes: &[u8]) -> Vec<u32> {
        let n = codes.len();
        let mut sa: Vec<u32> = (0..=n as u32).collect();
        sa.sort_by(|&a, &b| codes[a as usize..].cmp(&codes[b as usize..]));
        sa
    }
}

/// Linear-time SA-IS.
pub struct SaisSorter;

impl SuffixSorter for SaisSorter {
    fn name(&self) -> &'static str {
        "sais"
    }

    fn suffix_array(&self, codes: &[u8]) -> Vec<u32> {
        let text = sentinel_terminated(codes);
        sais(&text, 6, false)
    }
}

/// SA-IS with the embarrassingly parallel phases (suffix-type
/// classification, bucket histogram) run on rayon. The induce scans are
/// inherently sequential and shared with [`SaisSorter`], so the two
/// cannot diverge.
pub struct ParSaisSorter;

impl SuffixSorter for ParSaisSorter {
    fn name(&self) -> &'static str {
        "par-sais"
    }

    fn suffix_array(&self, codes: &[u8]) -> Vec<u32> {
        let text = sentinel_terminated(codes);
        sais(&text, 6, true)
    }
}

/// Shift codes up by one and append the sentinel as the unique smallest
/// character, the usual SA-IS framing.
fn sentinel_terminated(codes: &[u8]) -> Vec<u32> {
    let mut text = Vec::with_capacity(codes.len() + 1);
    text.extend(codes.iter().map(|&c| u32::from(c) + 1));
    text.push(0);
    text
}

const EMPTY: u32 = u32::MAX;

/// SA-IS over `text`, which must end with a unique smallest sentinel 0.
/// `parallel` enables the rayon phases at this level; recursion always
/// runs sequentially (reduced problems are geometrically smaller).
fn sais(text: &[u32], alphabet: usize, parallel: bool) -> Vec<u32> {
    let n = text.len();
    debug_assert!(n > 0 && text[n - 1] == 0);
    if n == 1 {
        return vec![0];
    }

    let is_s = if parallel {
        classify_parallel(text)
    } else {
        classify(text)
    };
    let is_lms = |i: usize| i > 0 && is_s[i] && !is_s[i - 1];

    let histogram: Vec<u32> = if parallel {
        text.par_chunks(1 << 16)
            .map(|chunk| {
                let mut h = vec![0u32; alphabet];
                for &c in chunk {
                    h[c as usize] += 1;
                }
                h
            })
            .reduce(
                || vec![0u32; alphabet],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            )
    } else {
        let mut h = vec![0u32; alphabet];
        for &c in text {
            h[c as usize] += 1;
        }
        h
    };

    let bucket_heads = |h: &[u32]| {
        let mut heads = vec![0u32; alphabet];
        let mut acc = 0u32;
        for (c, &cnt) in h.iter().enumerate() {
            heads[c] = acc;
            acc += cnt;
        }
        heads
    };
    let bucket_tails = |h: &[u32]| {
        let mut tails = vec![0u32; alphabet];
        let mut acc = 0u32;
        for (c, &cnt) in h.iter().enumerate() {
            acc += cnt;
            tails[c] = acc;
        }
        tails
    };

    // One full induce round: seed LMS suffixes at bucket tails in the
    // given order, induce L-types left-to-right, then S-types right-to-left.
    let induce = |sa: &mut [u32], lms: &[u32]| {
        sa.fill(EMPTY);
        let mut tails = bucket_tails(&histogram);
        for &p in lms.iter().rev() {
            let c = text[p as usize] as usize;
            tails[c] -= 1;
            sa[tails[c] as usize] = p;
        }
        let mut heads = bucket_heads(&histogram);
        for i in 0..n {
            let j = sa[i];
            if j != EMPTY && j > 0 && !is_s[(j - 1) as usize] {
                let c = text[(j - 1) as usize] as usize;
                sa[heads[c] as usize] = j - 1;
                heads[c] += 1;
            }
        }
        let mut tails = bucket_tails(&histogram);
        for i in (0..n).rev() {
            let j = sa[i];
            if j != EMPTY && j > 0 && is_s[(j - 1) as usize] {
                let c = text[(j - 1) as usize] as usize;
                tails[c] -= 1;
                sa[tails[c] as usize] = j - 1;
            }
        }
    };

    let lms_positions: Vec<u32> = if parallel {
        (0..n)
            .into_par_iter()
            .filter(|&i| is_lms(i))
            .map(|i| i as u32)
            .collect()
    } else {
        (0..n).filter(|&i| is_lms(i)).map(|i| i as u32).collect()
    };

    let mut sa = vec![EMPTY; n];

    // Round 1 sorts the LMS substrings.
    induce(&mut sa, &lms_positions);

    let sorted_lms: Vec<u32> = sa
        .iter()
        .copied()
        .filter(|&p| is_lms(p as usize))
        .collect();

    // Name LMS substrings in sorted order; equal substrings share a name.
    let mut name_of = vec![EMPTY; n];
    let mut name = 0u32;
    let mut prev = EMPTY;
    for &p in &sorted_lms {
        if prev != EMPTY && !lms_substrings_equal(text, &is_s, prev as usize, p as usize) {
            name += 1;
        }
        name_of[p as usize] = name;
        prev = p;
    }
    let distinct_names = (name + 1) as usize;

    let lms_order: Vec<u32> = if distinct_names == lms_positions.len() {
        sorted_lms
    } else {
        // Reduced problem: LMS names in text order, recursively sorted.
        // The sentinel's LMS substring is strictly smallest, so the
        // reduced string again ends with its unique 0.
        let reduced: Vec<u32> = lms_positions
            .iter()
            .map(|&p| name_of[p as usize])
            .collect();
        let sub_sa = sais(&reduced, distinct_names, false);
        sub_sa
            .iter()
            .map(|&i| lms_positions[i as usize])
            .collect()
    };

    // Round 2 induces the final order from the sorted LMS suffixes.
    induce(&mut sa, &lms_order);
    sa
}

/// Sequential suffix-type classification: `is_s[i]` iff suffix `i` sorts
/// before suffix `i + 1`.
fn classify(text: &[u32]) -> Vec<bool> {
    let n = text.len();
    let mut is_s = vec![false; n];
    is_s[n - 1] = true;
    for i in (0..n - 1).rev() {
        is_s[i] = text[i] < text[i + 1] || (text[i] == text[i + 1] && is_s[i + 1]);
    }
    is_s
}

/// Blockwise parallel classification. Block-boundary types are resolved
/// first by scanning right to the nearest strict inequality; blocks then
/// fill independently.
fn classify_parallel(text: &[u32]) -> Vec<bool> {
    const BLOCK: usize = 1 << 16;
    let n = text.len();
    if n <= BLOCK {
        return classify(text);
    }

    let block_count = n.div_ceil(BLOCK);
    // Type of the first position of each block, derived without the
    // preceding blocks: scan right until text[i] != text[i+1].
    let mut boundary = vec![false; block_count + 1];
    boundary[block_count] = true; // virtual block after the sentinel
    for b in (0..block_count).rev() {
        let i = b * BLOCK;
        boundary[b] = type_by_scan(text, i);
    }

    let mut is_s = vec![false; n];
    is_s
        .par_chunks_mut(BLOCK)
        .enumerate()
        .for_each(|(b, chunk)| {
            let start = b * BLOCK;
            let end = (start + chunk.len()).min(n);
            let mut next_type = if end == n {
                true
            } else {
                boundary[b + 1]
            };
            // The last cell of the chunk either is the global sentinel or
            // depends on the first cell of the next block.
            for off in (0..chunk.len()).rev() {
                let i = start + off;
                let t = if i == n - 1 {
                    true
                } else if text[i] < text[i + 1] {
                    true
                } else if text[i] > text[i + 1] {
                    false
                } else {
                    next_type
                };
                chunk[off] = t;
                next_type = t;
            }
        });
    is_s
}

/// Resolve the suffix type at `i` by scanning right to the first strict
/// inequality; the sentinel terminates every scan.
fn type_by_scan(text: &[u32], mut i: usize) -> bool {
    let n = text.len();
    while i + 1 < n {
        if text[i] < text[i + 1] {
            return true;
        }
        if text[i] > text[i + 1] {
            return false;
        }
        i += 1;
    }
    true
}

/// Equality of the LMS substrings starting at `a` and `b` (symbols and
/// types must agree up to and including the next LMS position).
fn lms_substrings_equal(text: &[u32], is_s: &[bool], a: usize, b: usize) -> bool {
    if a == b {
        return true;
    }
    let n = text.len();
    // The sentinel's substring is unique.
    if a == n - 1 || b == n - 1 {
        return false;
    }
    let is_lms = |i: usize| i > 0 && is_s[i] && !is_s[i - 1];
    let mut i = 0;
    loop {
        let a_end = is_lms(a + i) && i > 0;
        let b_end = is_lms(b + i) && i > 0;
        if a_end && b_end {
            return true;
        }
        if a_end != b_end || text[a + i] != text[b + i] {
            return false;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::encode;

    fn check_valid(codes: &[u8], sa: &[u32]) {
        let n = codes.len();
        assert_eq!(sa.len(), n + 1);
        assert_eq!(sa[0], n as u32, "sentinel suffix must sort first");
        // Bijection over [0, n].
        let mut seen = vec![false; n + 1];
        for &p in sa {
            assert!(!seen[p as usize]);
            seen[p as usize] = true;
        }
        // Suffixes non-decreasing under SA order.
        for w in sa.windows(2) {
            assert!(
                codes[w[0] as usize..] < codes[w[1] as usize..],
                "suffixes out of order at {w:?}"
            );
        }
    }

    fn all_sorters_agree(codes: &[u8]) {
        let stable = StableSorter.suffix_array(codes);
        let sais = SaisSorter.suffix_array(codes);
        let par = ParSaisSorter.suffix_array(codes);
        check_valid(codes, &stable);
        assert_eq!(stable, sais, "sais diverged from the stable baseline");
        assert_eq!(stable, par, "par-sais diverged from the stable baseline");
    }

    #[test]
    fn sorters_agree_on_simple_texts() {
        all_sorters_agree(&encode(b"ACGTACGTACGT"));
        all_sorters_agree(&encode(b"AAAAAAAA"));
        all_sorters_agree(&encode(b"A"));
        all_sorters_agree(&encode(b"GATTACA"));
        all_sorters_agree(&encode(b"TTAGGACCANNACGT"));
    }

    #[test]
    fn sorters_agree_on_repetitive_text() {
        // Forces the recursive reduced problem in SA-IS.
        let mut s = Vec::new();
        for _ in 0..40 {
            s.extend_from_slice(b"ACAC");
        }
        s.extend_from_slice(b"GT");
        all_sorters_agree(&encode(&s));
    }

    #[test]
    fn sorters_agree_on_pseudorandom_text() {
        // Deterministic LCG so the case is reproducible.
        let mut state = 0x2545_f491u32;
        let mut s = Vec::with_capacity(700);
        for _ in 0..700 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            s.push(b"ACGT"[(state >> 16) as usize % 4]);
        }
        all_sorters_agree(&encode(&s));
    }

    #[test]
    fn known_suffix_array_for_banana_like_text() {
        // CAGAGA, sorted suffixes:
        // "" < A(5) < AGA(3) < AGAGA(1) < CAGAGA(0) < GA(4) < GAGA(2)
        let codes = encode(b"CAGAGA");
        let sa = SaisSorter.suffix_array(&codes);
        check_valid(&codes, &sa);
        assert_eq!(sa, vec![6, 5, 3, 1, 0, 4, 2]);
    }
}
