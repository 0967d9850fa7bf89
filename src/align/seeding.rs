//! Seed extraction: turn a read into anchors via backward search.
//!
//! A read is split at ambiguous bases into fragments, and each fragment
//! is walked from its 3' end: a seed of at least `seed_len` symbols is
//! matched backward through the FM-index, extending further left while
//! the interval is still wider than `max_hit_cnt`. Successive seeds
//! overlap by `seed_overlap`. A seed that stays over the hit ceiling
//! after consuming its whole fragment is classified repetitive: it emits
//! no anchors, but its length feeds the repeat fraction that later
//! depresses mapping quality. The same procedure runs on the reverse
//! complement, so both orientations are covered.
//!
//! For a fixed (read, reference, parameters) triple the anchor set is
//! exactly reproducible: the walk is deterministic and hits surface in
//! suffix-array order.

use crate::index::GenomeIndex;
use crate::index::Interval;
use crate::opts::AlignOpt;

/// A seed occurrence resolved to a reference position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    /// Global text position of the seed's first base.
    pub ref_pos: u32,
    /// Offset of the seed within the (strand-oriented) read.
    pub read_off: u32,
    /// Seed length in bases.
    pub len: u32,
    /// True when the seed came from the forward-oriented read.
    pub forward: bool,
    /// Occurrence count of the seed in the reference.
    pub hits: u32,
}

impl Anchor {
    /// Diagonal of this anchor: the implied read-start position on the
    /// reference.
    #[inline]
    pub fn diagonal(&self) -> i64 {
        i64::from(self.ref_pos) - i64::from(self.read_off)
    }
}

/// Seeds of one read orientation.
#[derive(Debug, Default)]
pub struct StrandSeeds {
    pub anchors: Vec<Anchor>,
    /// Bases covered by seeds too repetitive to anchor.
    pub repeat_len: usize,
}

#[derive(Debug)]
struct SeedSpan {
    read_off: usize,
    len: usize,
    interval: Interval,
}

/// Split at ambiguous bases; only fragments long enough to seed survive.
fn fragments(codes: &[u8], min_len: usize) -> Vec<(usize, usize)> {
    let mut frags = Vec::new();
    let mut start = None;
    for (i, &c) in codes.iter().chain(std::iter::once(&4u8)).enumerate() {
        if c >= 4 {
            if let Some(s) = start.take() {
                if i - s >= min_len {
                    frags.push((s, i));
                }
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    frags
}

/// Walk one fragment from its 3' end, emitting seed spans.
fn collect_spans(
    idx: &GenomeIndex,
    codes: &[u8],
    frag: (usize, usize),
    opt: &AlignOpt,
    spans: &mut Vec<SeedSpan>,
) -> usize {
    let (frag_start, frag_end) = frag;
    let seed_len = opt.seed_len as usize;
    let overlap = opt.seed_overlap as usize;
    let max_hits = opt.max_hit_cnt;
    let mut repeat_len = 0usize;

    let mut end = frag_end - frag_start;
    let frag_codes = &codes[frag_start..frag_end];

    while end >= seed_len {
        let mut interval = idx.fm().full_interval();
        let mut i = end;
        let mut good = false;
        while i > 0 {
            let next = idx.fm().extend_back(interval, frag_codes[i - 1]);
            if next.is_empty() {
                break;
            }
            interval = next;
            i -= 1;
            if end - i >= seed_len && interval.len() <= max_hits {
                good = true;
                break;
            }
        }
        let matched = end - i;

        if good {
            spans.push(SeedSpan {
                read_off: frag_start + i,
                len: matched,
                interval,
            });
            end = i + overlap;
        } else if matched >= seed_len {
            // The seed stayed over the hit ceiling at every usable
            // length: repetitive territory. Track it for the repeat
            // fraction and keep walking left of it; when the whole
            // fragment prefix was consumed there is nowhere left to go.
            repeat_len += matched;
            if i == 0 {
                break;
            }
            end = i + overlap;
        } else {
            // Mismatch close to the 3' end; step past it.
            end -= matched.saturating_sub(overlap).max(1);
        }
    }

    // A short tail can still seed if it matches end-to-end.
    if end >= seed_len.saturating_sub(overlap) && end > 0 && end < seed_len {
        let hit = idx.fm().search(&frag_codes[..end]);
        if hit.matched == end && !hit.interval.is_empty() && hit.interval.len() <= max_hits {
            spans.push(SeedSpan {
                read_off: frag_start,
                len: end,
                interval: hit.interval,
            });
        }
    }

    repeat_len
}

/// Seed one orientation of a read.
pub fn seed_strand(idx: &GenomeIndex, codes: &[u8], forward: bool, opt: &AlignOpt) -> StrandSeeds {
    let mut spans = Vec::new();
    let mut repeat_len = 0usize;
    for frag in fragments(codes, opt.seed_len as usize) {
        repeat_len += collect_spans(idx, codes, frag, opt, &mut spans);
    }

    // Prefer rare, long seeds; the tail order keeps the result
    // independent of insertion order.
    spans.sort_by(|a, b| {
        a.interval
            .len()
            .cmp(&b.interval.len())
            .then(b.len.cmp(&a.len))
            .then(a.read_off.cmp(&b.read_off))
    });

    let mut anchors = Vec::new();
    for span in spans.iter().take(opt.max_seed_cnt as usize) {
        let hits = span.interval.len();
        for pos in idx.placements(span.interval, span.len as u32, opt.max_hit_cnt as usize) {
            anchors.push(Anchor {
                ref_pos: pos,
                read_off: span.read_off as u32,
                len: span.len as u32,
                forward,
                hits,
            });
        }
    }
    StrandSeeds {
        anchors,
        repeat_len,
    }
}
