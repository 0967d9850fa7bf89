//! Per-read and per-pair alignment orchestration.
//!
//! One read end flows seeding → chaining → exact-match fast path →
//! census-gated extension → finalization; a pair additionally runs mate
//! rescue, pair enumeration and the paired/unpaired decision. CIGARs are
//! deferred: only the alignments actually reported get a traceback.
//!
//! Candidate ordering is deterministic everywhere: equal scores resolve
//! to the lower reference coordinate, then forward strand first.

use super::chaining::{chain_anchors, select_candidates, Chain, KmerCensus};
use super::cigar::Cigar;
use super::extension::{ExtensionEngine, QueryProfile};
use super::mapq::{
    approx_mapq_se, mapq_pe, opt_subopt_count, MapqInput, RESCUED_MAPQ_CAP,
};
use super::pairing::{pair_candidates, InsertModel, PairCandidate};
use super::rescue::{rescue_mate, RescueTarget};
use super::seeding::{seed_strand, Anchor};
use crate::encoding::reverse_complement;
use crate::index::GenomeIndex;
use crate::opts::AlignOpt;

/// One reported alignment of a read end.
#[derive(Debug, Clone)]
pub struct Aln {
    /// 0-based global text position of the alignment start.
    pub pos: u32,
    /// Local alignment score; 0 means unmapped.
    pub score: i32,
    /// Second-best score within the winning region.
    pub score2: i32,
    /// Best score among the other candidate regions.
    pub sub_score: i32,
    /// True when the read aligned in its input orientation.
    pub forward: bool,
    /// Inclusive end offset on the (oriented) read.
    pub read_end: u32,
    /// Inclusive end position on the global text.
    pub ref_end: u32,
    /// K-mer census of the winning window.
    pub find_cnt: u32,
    /// Alignment span, max of read and reference extent.
    pub align_len: u32,
    pub mapq: u8,
    /// Placed by mate rescue rather than independent seeding.
    pub rescued: bool,
    pub cigar: Cigar,
}

impl Aln {
    pub fn unmapped() -> Self {
        Self {
            pos: 0,
            score: 0,
            score2: 0,
            sub_score: 0,
            forward: true,
            read_end: 0,
            ref_end: 0,
            find_cnt: 0,
            align_len: 0,
            mapq: 0,
            rescued: false,
            cigar: Cigar::new(),
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.score > 0
    }
}

/// Two mates reported together.
#[derive(Debug, Clone)]
pub struct AlnPair {
    pub first: Aln,
    pub second: Aln,
}

impl AlnPair {
    pub fn unmapped() -> Self {
        Self {
            first: Aln::unmapped(),
            second: Aln::unmapped(),
        }
    }

    pub fn dist(&self) -> u32 {
        self.first.pos.abs_diff(self.second.pos)
    }

    pub fn score(&self) -> i32 {
        self.first.score + self.second.score
    }
}

/// Worker-local scratch reused across reads.
#[derive(Debug)]
pub struct Scratch {
    census: KmerCensus,
}

impl Scratch {
    pub fn new(opt: &AlignOpt) -> Self {
        Self {
            census: KmerCensus::new(opt.kmer_size as usize),
        }
    }
}

/// Everything derived for one read end before pairing decisions.
struct ReadState {
    read: Vec<u8>,
    rread: Vec<u8>,
    profile_fwd: QueryProfile,
    profile_rev: QueryProfile,
    kmers_fwd: Vec<u32>,
    kmers_rev: Vec<u32>,
    alns: Vec<Aln>,
    frac_rep: f32,
    floor: u32,
}

/// The alignment pipeline over one immutable index.
pub struct Aligner<'a> {
    idx: &'a GenomeIndex,
    opt: &'a AlignOpt,
    engine: ExtensionEngine,
    model: InsertModel,
}

impl<'a> Aligner<'a> {
    pub fn new(idx: &'a GenomeIndex, opt: &'a AlignOpt, engine: ExtensionEngine) -> Self {
        let model = InsertModel::from_opt(opt);
        Self {
            idx,
            opt,
            engine,
            model,
        }
    }

    pub fn index(&self) -> &'a GenomeIndex {
        self.idx
    }

    pub fn set_model(&mut self, model: InsertModel) {
        self.model = model;
    }

    pub fn model(&self) -> &InsertModel {
        &self.model
    }

    pub fn engine(&self) -> &ExtensionEngine {
        &self.engine
    }

    /// Align one unpaired read (symbol codes).
    pub fn map_single(&self, read: &[u8], scratch: &mut Scratch) -> Aln {
        let state = self.analyze_read(read, scratch);
        if state.alns.is_empty() {
            return Aln::unmapped();
        }
        self.best_single(&state)
    }

    /// Align a read pair (symbol codes).
    pub fn map_pair(&self, read1: &[u8], read2: &[u8], scratch: &mut Scratch) -> AlnPair {
        let mut s1 = self.analyze_read(read1, scratch);
        let mut s2 = self.analyze_read(read2, scratch);

        if s1.alns.is_empty() && s2.alns.is_empty() {
            return AlnPair::unmapped();
        }

        // Mate rescue in both directions, then re-finalize.
        let target1 = RescueTarget {
            profile_fwd: &s1.profile_fwd,
            profile_rev: &s1.profile_rev,
            kmers_fwd: &s1.kmers_fwd,
            kmers_rev: &s1.kmers_rev,
            read_len: s1.read.len(),
        };
        let rescues1 = rescue_mate(
            self.idx.reference(),
            &self.engine,
            &s2.alns,
            &s1.alns,
            &target1,
            &mut scratch.census,
            s1.floor,
            self.opt,
        );
        let target2 = RescueTarget {
            profile_fwd: &s2.profile_fwd,
            profile_rev: &s2.profile_rev,
            kmers_fwd: &s2.kmers_fwd,
            kmers_rev: &s2.kmers_rev,
            read_len: s2.read.len(),
        };
        let rescues2 = rescue_mate(
            self.idx.reference(),
            &self.engine,
            &s1.alns,
            &s2.alns,
            &target2,
            &mut scratch.census,
            s2.floor,
            self.opt,
        );
        if !rescues1.is_empty() {
            s1.alns.extend(rescues1);
            finalize(&mut s1.alns, self.opt.max_sw_diff);
        }
        if !rescues2.is_empty() {
            s2.alns.extend(rescues2);
            finalize(&mut s2.alns, self.opt.max_sw_diff);
        }

        if s2.alns.is_empty() {
            return AlnPair {
                first: self.best_single(&s1),
                second: Aln::unmapped(),
            };
        }
        if s1.alns.is_empty() {
            return AlnPair {
                first: Aln::unmapped(),
                second: self.best_single(&s2),
            };
        }

        let pairs = pair_candidates(&s1.alns, &s2.alns, self.opt.pair_dist);
        if pairs.is_empty() {
            return AlnPair {
                first: self.best_single(&s1),
                second: self.best_single(&s2),
            };
        }
        self.best_pair(&s1, &s2, &pairs)
    }

    /// Seed, chain, fast-path and extend one read end.
    fn analyze_read(&self, read: &[u8], scratch: &mut Scratch) -> ReadState {
        let rread = reverse_complement(read);
        let len = read.len();

        let fwd = seed_strand(self.idx, read, true, self.opt);
        let rev = seed_strand(self.idx, &rread, false, self.opt);
        let frac_rep = if len == 0 {
            0.0
        } else {
            (fwd.repeat_len + rev.repeat_len) as f32 / (2 * len) as f32
        };

        let mut chains = chain_anchors(&fwd.anchors, self.opt.seed_len);
        chains.extend(chain_anchors(&rev.anchors, self.opt.seed_len));
        chains.sort_by(|a, b| {
            b.len()
                .cmp(&a.len())
                .then(a.first().ref_pos.cmp(&b.first().ref_pos))
                .then(b.first().forward.cmp(&a.first().forward))
        });

        let kmers_fwd = scratch.census.read_kmers(read);
        let kmers_rev = scratch.census.read_kmers(&rread);

        // Exact-match fast path along each chain's diagonal.
        let mut alns: Vec<Aln> = Vec::new();
        let mut leftover: Vec<Chain> = Vec::new();
        for chain in chains {
            match self.diagonal_alignment(chain.first(), read, &rread, kmers_fwd.len() as u32) {
                Some(aln) => alns.push(aln),
                None => leftover.push(chain),
            }
        }
        leftover.truncate(self.opt.max_em_cnt as usize);

        // Census-gated candidate selection for the surviving chains.
        // With an exact match in hand, only well-supported chains may
        // still add (indel) candidates, and the census floor starts just
        // below a full census.
        let had_exact = !alns.is_empty();
        let filtered: Vec<Chain> = if had_exact {
            let min_support = (self.opt.max_seed_cnt as usize / 2).max(1);
            leftover
                .into_iter()
                .filter(|c| c.len() >= min_support)
                .collect()
        } else {
            leftover
        };
        let floor0 = if had_exact {
            (kmers_fwd.len() as u32).saturating_sub(self.opt.max_find_cnt_diff)
        } else {
            self.opt.min_find_cnt
        };
        let (mut candidates, floor) = select_candidates(
            &filtered,
            len,
            &kmers_fwd,
            &kmers_rev,
            &mut scratch.census,
            floor0,
            self.opt,
            self.idx.reference(),
        );
        candidates.truncate(self.opt.max_sw_cnt as usize);

        let profile_fwd = self.engine.profile(read);
        let profile_rev = self.engine.profile(&rread);

        let mut min_score = self.opt.sw_threshold;
        for cand in &candidates {
            let window = self.idx.reference().codes(
                cand.window_start as usize,
                (cand.window_start + cand.window_len) as usize,
            );
            let profile = if cand.forward {
                &profile_fwd
            } else {
                &profile_rev
            };
            let hit = self.engine.score(profile, &window, len / 2);
            if hit.score < min_score {
                continue;
            }
            let ref_end = i64::from(cand.window_start) + i64::from(hit.ref_end);
            let pos = (ref_end - i64::from(hit.read_end)).max(0) as u32;
            alns.push(Aln {
                pos,
                score: hit.score,
                score2: hit.score2,
                forward: cand.forward,
                read_end: hit.read_end as u32,
                ref_end: ref_end as u32,
                find_cnt: cand.find_cnt,
                ..Aln::unmapped()
            });
            min_score = min_score.max(hit.score - self.opt.max_sw_diff);
        }

        finalize(&mut alns, self.opt.max_sw_diff);
        ReadState {
            read: read.to_vec(),
            rread,
            profile_fwd,
            profile_rev,
            kmers_fwd,
            kmers_rev,
            alns,
            frac_rep,
            floor,
        }
    }

    /// Exact-match fast path: compare the read against the reference
    /// along the chain's diagonal, recognizing perfect matches, a single
    /// interior mismatch, and small end clips without running the DP.
    fn diagonal_alignment(
        &self,
        anchor: &Anchor,
        read: &[u8],
        rread: &[u8],
        kmer_cnt: u32,
    ) -> Option<Aln> {
        let codes = if anchor.forward { read } else { rread };
        let len = codes.len();
        let read_pos = anchor.diagonal();
        let (chrom_start, chrom_end) = self.idx.reference().chrom_span(anchor.ref_pos)?;
        if read_pos < i64::from(chrom_start) || read_pos + len as i64 > i64::from(chrom_end) {
            return None;
        }
        let start = read_pos as usize;
        let window = self.idx.reference().codes(start, start + len);
        let (score, cigar) = diagonal_score(codes, &window)?;

        let pos = read_pos as u32 + cigar.leading_clip();
        let span = cigar.ref_len();
        Some(Aln {
            pos,
            score,
            forward: anchor.forward,
            read_end: len as u32 - 1,
            ref_end: pos + span.saturating_sub(1),
            find_cnt: kmer_cnt,
            align_len: span,
            cigar,
            ..Aln::unmapped()
        })
    }

    /// Deferred CIGAR: rebuild the winning alignment with a scalar
    /// traceback over a window anchored at its known end.
    fn set_cigar(&self, aln: &mut Aln, codes: &[u8]) {
        if !aln.cigar.is_empty() {
            return;
        }
        let len = codes.len();
        if aln.score >= len as i32 {
            aln.cigar = Cigar::full_match(len as u32);
            aln.align_len = len as u32;
            return;
        }

        let sw_start = i64::from(aln.ref_end) - len as i64 - i64::from(self.opt.extend);
        let (window_start, window) = self.idx.reference().window(
            aln.ref_end,
            sw_start,
            len + self.opt.extend as usize + 1,
        );
        match self.engine.traceback(codes, &window) {
            Some(tb) => {
                aln.pos = window_start + tb.ref_beg as u32;
                aln.score = tb.score;
                aln.ref_end = window_start + tb.ref_end as u32;
                aln.read_end = tb.read_end as u32;
                aln.align_len = (tb.ref_end - tb.ref_beg + 1)
                    .max(tb.read_end - tb.read_beg + 1) as u32;
                aln.cigar = tb.cigar;
            }
            None => {
                // Nothing scored in the window; report the read unmapped
                // rather than fabricate coordinates.
                *aln = Aln::unmapped();
            }
        }
    }

    /// Best single-end report: CIGAR plus single-end mapping quality.
    fn best_single(&self, state: &ReadState) -> Aln {
        let mut aln = state.alns[0].clone();
        let codes = if aln.forward { &state.read } else { &state.rread };
        self.set_cigar(&mut aln, codes);
        if !aln.is_mapped() {
            return aln;
        }
        let scores: Vec<i32> = state.alns.iter().map(|a| a.score).collect();
        let (opt_score, sub_score, sub_count) = opt_subopt_count(&scores, 5);
        let mapq = approx_mapq_se(MapqInput {
            score: opt_score,
            score2: aln.score2,
            sub_score,
            align_len: aln.align_len as i32,
            sub_count,
            frac_rep: state.frac_rep,
        });
        aln.mapq = cap_rescued(mapq, aln.rescued) as u8;
        aln.sub_score = sub_score;
        aln
    }

    /// Paired report: choose between the best pair and independent
    /// placements, then score confidence accordingly.
    fn best_pair(&self, s1: &ReadState, s2: &ReadState, pairs: &[PairCandidate]) -> AlnPair {
        let scores1: Vec<i32> = s1.alns.iter().map(|a| a.score).collect();
        let scores2: Vec<i32> = s2.alns.iter().map(|a| a.score).collect();
        let (opt1, sub1, cnt1) = opt_subopt_count(&scores1, 5);
        let (opt2, sub2, cnt2) = opt_subopt_count(&scores2, 5);
        let pair_scores: Vec<i32> = pairs.iter().map(|p| p.score).collect();
        let (opt_p, sub_p, cnt_p) = opt_subopt_count(&pair_scores, 5);

        let score_un = opt1 + opt2 - self.opt.pen_unpaired;
        let paired = opt_p > score_un;
        let (mut aln1, mut aln2) = if paired {
            (
                s1.alns[pairs[0].first].clone(),
                s2.alns[pairs[0].second].clone(),
            )
        } else {
            (s1.alns[0].clone(), s2.alns[0].clone())
        };

        let codes1 = if aln1.forward { &s1.read } else { &s1.rread };
        let codes2 = if aln2.forward { &s2.read } else { &s2.rread };
        self.set_cigar(&mut aln1, codes1);
        self.set_cigar(&mut aln2, codes2);

        let input1 = MapqInput {
            score: aln1.score,
            score2: aln1.score2,
            sub_score: sub1,
            align_len: aln1.align_len as i32,
            sub_count: cnt1,
            frac_rep: s1.frac_rep,
        };
        let input2 = MapqInput {
            score: aln2.score,
            score2: aln2.score2,
            sub_score: sub2,
            align_len: aln2.align_len as i32,
            sub_count: cnt2,
            frac_rep: s2.frac_rep,
        };
        if paired {
            let (m1, m2) = mapq_pe(input1, input2, score_un, opt_p, sub_p, cnt_p);
            let pen = self
                .model
                .penalty(aln1.pos.abs_diff(aln2.pos));
            aln1.mapq = cap_rescued((m1 - pen).max(0), aln1.rescued) as u8;
            aln2.mapq = cap_rescued((m2 - pen).max(0), aln2.rescued) as u8;
        } else {
            aln1.mapq = cap_rescued(approx_mapq_se(input1), aln1.rescued) as u8;
            aln2.mapq = cap_rescued(approx_mapq_se(input2), aln2.rescued) as u8;
        }
        aln1.sub_score = if aln1.score == opt1 { sub1 } else { opt1 };
        aln2.sub_score = if aln2.score == opt2 { sub2 } else { opt2 };
        AlnPair {
            first: aln1,
            second: aln2,
        }
    }
}

/// Cap the quality of rescued placements; their position was steered by
/// the partner rather than found independently.
fn cap_rescued(mapq: i32, rescued: bool) -> i32 {
    if rescued {
        mapq.min(RESCUED_MAPQ_CAP)
    } else {
        mapq
    }
}

/// Deduplicate and rank alignments, then drop everything more than
/// `max_sw_diff` below the best. The documented tie-break: equal scores
/// order by lower reference coordinate, forward strand first.
pub(crate) fn finalize(alns: &mut Vec<Aln>, max_sw_diff: i32) {
    if alns.len() > 1 {
        alns.sort_by(|a, b| {
            a.pos
                .cmp(&b.pos)
                .then(b.forward.cmp(&a.forward))
                .then(b.score.cmp(&a.score))
                .then(a.cigar.ops().len().cmp(&b.cigar.ops().len()))
        });
        alns.dedup_by(|cur, prev| cur.pos == prev.pos && cur.forward == prev.forward);
        alns.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.pos.cmp(&b.pos))
                .then(b.forward.cmp(&a.forward))
        });
    }
    if let Some(best) = alns.first().map(|a| a.score) {
        alns.retain(|a| a.score >= best - max_sw_diff);
    }
}

/// Diagonal comparison fast path (no DP): a perfect match, a single
/// interior mismatch with intact 5-base ends, or intact middle with
/// small end clips. Anything else falls through to the extension engine.
fn diagonal_score(read: &[u8], window: &[u8]) -> Option<(i32, Cigar)> {
    let len = read.len();
    if window.len() != len || len < 11 {
        return None;
    }
    let full = len as i32;
    let (read_beg, read_rest) = read.split_at(5);
    let (read_mid, read_end) = read_rest.split_at(len - 10);
    let (ref_beg, ref_rest) = window.split_at(5);
    let (ref_mid, ref_end) = ref_rest.split_at(len - 10);

    if read_mid != ref_mid {
        if read_beg != ref_beg || read_end != ref_end {
            return None;
        }
        if !single_mismatch(read_mid, ref_mid) {
            return None;
        }
        // One interior mismatch: report full-length M at a 5-point cost.
        return Some((full - 5, Cigar::full_match(len as u32)));
    }

    if read_beg == ref_beg && read_end == ref_end {
        return Some((full, Cigar::full_match(len as u32)));
    }

    // Middle intact; clip the mismatched end bases.
    let (beg_score, beg_clip) = clip_begin(read_beg, ref_beg);
    let (end_score, end_keep) = clip_end(read_end, ref_end);
    let score = (len as i32 - 10) + beg_score + end_score;
    if score < full - 5 {
        return None;
    }
    let mut cigar = Cigar::new();
    cigar.push(beg_clip, b'S');
    cigar.push(5 - beg_clip, b'M');
    cigar.push(len as u32 - 10, b'M');
    cigar.push(end_keep, b'M');
    cigar.push(5 - end_keep, b'S');
    cigar.compact();
    Some((score, cigar))
}

/// Exactly one mismatching position between equal-length slices.
fn single_mismatch(a: &[u8], b: &[u8]) -> bool {
    let mut iter = a.iter().zip(b).enumerate().filter(|(_, (x, y))| x != y);
    match iter.next() {
        Some(_) => iter.next().is_none(),
        None => false,
    }
}

/// Score and clip length of a 5-base leading segment: everything up to
/// and including the last mismatch is clipped.
fn clip_begin(read: &[u8], win: &[u8]) -> (i32, u32) {
    for idx in (0..5).rev() {
        if read[idx] != win[idx] {
            return (4 - idx as i32, idx as u32 + 1);
        }
    }
    (5, 0)
}

/// Score and kept length of a 5-base trailing segment: everything from
/// the first mismatch on is clipped.
fn clip_end(read: &[u8], win: &[u8]) -> (i32, u32) {
    for idx in 0..5 {
        if read[idx] != win[idx] {
            return (idx as i32, idx as u32);
        }
    }
    (5, 5)
}
