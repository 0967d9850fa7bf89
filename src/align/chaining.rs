//! Anchor chaining and candidate-window admission.
//!
//! Anchors group by reference diagonal: hits whose implied read start
//! lands within a seed length of an existing chain join it, everything
//! else opens a new one. Chains rank by how many anchors support them.
//! Before a chain is allowed to spend a dynamic-programming extension,
//! its reference window must pass a k-mer census: enough of the read's
//! k-mers have to occur in the window, and the admission floor ratchets
//! up behind the best candidate seen so far, so hopeless windows are
//! dropped before the expensive kernel runs.

use super::seeding::Anchor;
use crate::encoding::kmer_hash;
use crate::index::Reference;
use crate::opts::AlignOpt;
use std::collections::BTreeMap;

/// A group of co-diagonal anchors supporting one candidate region.
#[derive(Debug, Clone)]
pub struct Chain {
    pub anchors: Vec<Anchor>,
}

impl Chain {
    pub fn first(&self) -> &Anchor {
        &self.anchors[0]
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

/// Group one strand's anchors into diagonal chains. Chains come back
/// ranked by anchor count, ties broken by leftmost reference position.
pub fn chain_anchors(anchors: &[Anchor], seed_len: u32) -> Vec<Chain> {
    let slack = i64::from(seed_len);
    let mut bins: BTreeMap<i64, Vec<Anchor>> = BTreeMap::new();
    for &anchor in anchors {
        let diag = anchor.diagonal();
        let mut joined = false;
        for (_, bin) in bins.range_mut(diag - slack..=diag + slack) {
            bin.push(anchor);
            joined = true;
        }
        if !joined {
            bins.insert(diag, vec![anchor]);
        }
    }

    let mut chains: Vec<Chain> = bins
        .into_values()
        .map(|mut anchors| {
            anchors.sort_by_key(|a| (a.ref_pos, a.read_off, a.len));
            Chain { anchors }
        })
        .collect();
    chains.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then(a.first().ref_pos.cmp(&b.first().ref_pos))
            .then(b.first().forward.cmp(&a.first().forward))
    });
    chains
}

/// Reusable k-mer presence table (4^k cells, worker-local scratch).
#[derive(Debug)]
pub struct KmerCensus {
    k: usize,
    table: Vec<bool>,
}

impl KmerCensus {
    pub fn new(k: usize) -> Self {
        debug_assert!((1..=15).contains(&k));
        Self {
            k,
            table: vec![false; 1usize << (2 * k)],
        }
    }

    /// K-mers of a read at stride `k - 1` (adjacent k-mers overlap by one
    /// base); windows containing an ambiguous base are skipped.
    pub fn read_kmers(&self, codes: &[u8]) -> Vec<u32> {
        let k = self.k;
        if codes.len() < k {
            return Vec::new();
        }
        let mut kmers = Vec::with_capacity(codes.len() / (k - 1).max(1) + 1);
        let mut i = 0;
        while i + k <= codes.len() {
            if let Some(h) = kmer_hash(&codes[i..i + k]) {
                kmers.push(h);
            }
            i += (k - 1).max(1);
        }
        kmers
    }

    /// How many of `kmers` occur in the window.
    pub fn count(&mut self, window: &[u8], kmers: &[u32]) -> u32 {
        self.table.fill(false);
        if window.len() >= self.k {
            for i in 0..=window.len() - self.k {
                if let Some(h) = kmer_hash(&window[i..i + self.k]) {
                    self.table[h as usize] = true;
                }
            }
        }
        kmers.iter().filter(|&&h| self.table[h as usize]).count() as u32
    }
}

/// A window admitted to dynamic-programming extension.
#[derive(Debug, Clone, Copy)]
pub struct SwCandidate {
    /// Global start of the reference window.
    pub window_start: u32,
    /// Window length actually available (clamped at chromosome edges).
    pub window_len: u32,
    pub forward: bool,
    /// K-mer census of the window against the read.
    pub find_cnt: u32,
}

/// Run the census over each chain's window and admit survivors.
///
/// `floor` starts at the caller's admission threshold and ratchets to
/// `best_census - max_find_cnt_diff` as stronger candidates appear; the
/// final floor is returned for downstream use (mate rescue continues
/// ratcheting from it). Candidates come back ordered by census strength.
pub fn select_candidates(
    chains: &[Chain],
    read_len: usize,
    kmers_fwd: &[u32],
    kmers_rev: &[u32],
    census: &mut KmerCensus,
    mut floor: u32,
    opt: &AlignOpt,
    reference: &Reference,
) -> (Vec<SwCandidate>, u32) {
    let extend = i64::from(opt.extend);
    let mut candidates = Vec::new();

    for chain in chains {
        let anchor = chain.first();
        let read_pos = anchor.diagonal();
        let front_pad = if i64::from(anchor.read_off) <= extend / 2 {
            i64::from(anchor.read_off) * 2
        } else {
            extend
        };
        let sw_pos = read_pos - front_pad;
        let (window_start, window) =
            reference.window(anchor.ref_pos, sw_pos, read_len + 2 * opt.extend as usize);
        if window.is_empty() {
            continue;
        }

        let kmers = if anchor.forward { kmers_fwd } else { kmers_rev };
        let find_cnt = census.count(&window, kmers);
        if find_cnt < floor {
            continue;
        }
        floor = floor.max(find_cnt.saturating_sub(opt.max_find_cnt_diff));

        candidates.push(SwCandidate {
            window_start,
            window_len: window.len() as u32,
            forward: anchor.forward,
            find_cnt,
        });
    }

    candidates.sort_by(|a, b| {
        b.find_cnt
            .cmp(&a.find_cnt)
            .then(a.window_start.cmp(&b.window_start))
            .then(b.forward.cmp(&a.forward))
    });
    (candidates, floor)
}
