//! Mate rescue: recover an unplaced mate by searching near its
//! partner's alignments.
//!
//! Seeding is bypassed entirely — the window implied by the partner's
//! position and the pairing distance goes straight to the extension
//! engine on the expected (opposite) strand, gated by the same k-mer
//! census as ordinary candidates. Anything recovered here is flagged
//! `rescued`, which later caps its mapping quality.

use super::chaining::KmerCensus;
use super::extension::{ExtensionEngine, QueryProfile};
use super::mapq::opt_subopt_count;
use super::pipeline::Aln;
use crate::index::Reference;
use crate::opts::AlignOpt;

/// Everything the rescue pass needs to know about the mate it is trying
/// to place.
pub struct RescueTarget<'a> {
    pub profile_fwd: &'a QueryProfile,
    pub profile_rev: &'a QueryProfile,
    pub kmers_fwd: &'a [u32],
    pub kmers_rev: &'a [u32],
    pub read_len: usize,
}

/// Attempt rescue of one mate near its partner's alignments.
///
/// `partner` holds the partner's finalized alignments (descending by
/// score); `existing` the target mate's own alignments, used to skip
/// windows already represented. The admission `floor` continues the
/// candidate-selection ratchet of the target mate.
pub fn rescue_mate(
    reference: &Reference,
    engine: &ExtensionEngine,
    partner: &[Aln],
    existing: &[Aln],
    target: &RescueTarget<'_>,
    census: &mut KmerCensus,
    mut floor: u32,
    opt: &AlignOpt,
) -> Vec<Aln> {
    if partner.is_empty() {
        return Vec::new();
    }
    let scores: Vec<i32> = partner.iter().map(|a| a.score).collect();
    let (_, _, sub_cnt) = opt_subopt_count(&scores, 5);
    let attempts = ((sub_cnt + 1) as usize).min(opt.max_rescue_cnt as usize);
    log::debug!("mate rescue: {attempts} attempt(s)");

    let pair_dist = i64::from(opt.pair_dist);
    let extend = i64::from(opt.extend);
    let window_len = opt.extend as usize + target.read_len + opt.pair_dist as usize;
    let mask_len = target.read_len / 2;

    let mut rescued = Vec::new();
    let mut min_score = opt.sw_threshold;
    for anchor in partner.iter().take(attempts) {
        let pos1 = i64::from(anchor.pos);
        let already = existing
            .iter()
            .any(|a| (i64::from(a.pos) - pos1).abs() <= pair_dist);
        if already {
            continue;
        }

        // The mate is expected downstream on the opposite strand when
        // the partner is forward, upstream otherwise.
        let sw_pos = if anchor.forward {
            pos1 - extend
        } else {
            pos1 - pair_dist
        };
        let (window_start, window) = reference.window(anchor.pos, sw_pos, window_len);
        if window.len() < target.read_len / 2 {
            continue;
        }

        let kmers = if anchor.forward {
            target.kmers_rev
        } else {
            target.kmers_fwd
        };
        let find_cnt = census.count(&window, kmers);
        if find_cnt < floor {
            continue;
        }
        floor = floor.max(find_cnt.saturating_sub(opt.max_find_cnt_diff));

        let profile = if anchor.forward {
            target.profile_rev
        } else {
            target.profile_fwd
        };
        let hit = engine.score(profile, &window, mask_len);
        if hit.score < min_score {
            continue;
        }

        let ref_end = window_start as i64 + i64::from(hit.ref_end);
        let pos = (ref_end - i64::from(hit.read_end)).max(0) as u32;
        log::debug!(
            "rescued mate at {pos} (score {}, window {window_start})",
            hit.score
        );
        rescued.push(Aln {
            pos,
            score: hit.score,
            score2: hit.score2,
            forward: !anchor.forward,
            read_end: hit.read_end as u32,
            ref_end: ref_end as u32,
            find_cnt,
            rescued: true,
            ..Aln::unmapped()
        });
        min_score = min_score.max(hit.score - opt.max_sw_diff);
    }
    rescued
}
