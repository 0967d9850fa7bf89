//! Paired-end scoring: the empirical insert-size model and candidate
//! pair enumeration.

use super::pipeline::Aln;
use crate::opts::AlignOpt;

/// Minimum concordant samples before estimation overrides the
/// configured model.
const MIN_ESTIMATE_SAMPLES: usize = 16;

/// Samples outside this many deviations are trimmed per round.
const TRIM_SIGMA: f64 = 4.0;

/// Gaussian-ish insert-size model.
#[derive(Debug, Clone)]
pub struct InsertModel {
    pub mean: f64,
    pub dev: f64,
}

impl InsertModel {
    pub fn from_opt(opt: &AlignOpt) -> Self {
        Self {
            mean: f64::from(opt.insert_mean),
            dev: f64::from(opt.insert_var).max(1.0),
        }
    }

    /// Re-estimate from observed insert sizes of confidently mapped
    /// unique pairs. Outliers are trimmed and the moments recomputed
    /// until the sample set stabilizes, capped at `max_rounds`
    /// iterations; too few samples keep the configured model.
    pub fn estimate(samples: &[i64], fallback: &InsertModel, max_rounds: u32) -> Self {
        if samples.len() < MIN_ESTIMATE_SAMPLES {
            log::debug!(
                "insert-size estimation skipped: only {} samples",
                samples.len()
            );
            return fallback.clone();
        }
        let mut active: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        let mut mean = 0.0;
        let mut dev = 1.0;
        for round in 0..max_rounds.max(1) {
            let n = active.len() as f64;
            mean = active.iter().sum::<f64>() / n;
            dev = (active.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n)
                .sqrt()
                .max(1.0);
            let before = active.len();
            active.retain(|&s| (s - mean).abs() <= TRIM_SIGMA * dev);
            if active.len() == before || active.len() < MIN_ESTIMATE_SAMPLES {
                log::debug!(
                    "insert-size model converged after {} rounds: mean {:.1}, dev {:.1}",
                    round + 1,
                    mean,
                    dev
                );
                break;
            }
        }
        Self { mean, dev }
    }

    /// Mapping-quality debit for an implausible insert distance: the
    /// squared deviation in model units.
    pub fn penalty(&self, dist: u32) -> i32 {
        let sigmas = (f64::from(dist) - self.mean) / self.dev;
        (sigmas * sigmas) as i32
    }
}

/// A candidate pairing of `alns1[first]` with `alns2[second]`.
#[derive(Debug, Clone, Copy)]
pub struct PairCandidate {
    pub first: usize,
    pub second: usize,
    pub score: i32,
}

/// Enumerate opposite-strand pairs within `pair_dist`, ranked by
/// combined score (ties: leftmost pair first). Two-pointer sweep over
/// position-sorted views, O(n log n + pairs).
pub fn pair_candidates(alns1: &[Aln], alns2: &[Aln], pair_dist: u32) -> Vec<PairCandidate> {
    let mut by_pos1: Vec<usize> = (0..alns1.len()).collect();
    let mut by_pos2: Vec<usize> = (0..alns2.len()).collect();
    by_pos1.sort_by_key(|&i| alns1[i].pos);
    by_pos2.sort_by_key(|&j| alns2[j].pos);

    let dist = i64::from(pair_dist);
    let mut pairs = Vec::new();
    let mut lo = 0usize;
    let mut hi = 0usize;
    for &i in &by_pos1 {
        let pos1 = i64::from(alns1[i].pos);
        while lo < by_pos2.len() && i64::from(alns2[by_pos2[lo]].pos) < pos1 - dist {
            lo += 1;
        }
        while hi < by_pos2.len() && i64::from(alns2[by_pos2[hi]].pos) <= pos1 + dist {
            hi += 1;
        }
        for &j in &by_pos2[lo..hi] {
            if alns1[i].forward != alns2[j].forward {
                pairs.push(PairCandidate {
                    first: i,
                    second: j,
                    score: alns1[i].score + alns2[j].score,
                });
            }
        }
    }

    pairs.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(alns1[a.first].pos.cmp(&alns1[b.first].pos))
            .then(alns2[a.second].pos.cmp(&alns2[b.second].pos))
    });
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::pipeline::Aln;

    fn aln(pos: u32, score: i32, forward: bool) -> Aln {
        Aln {
            pos,
            score,
            forward,
            ..Aln::unmapped()
        }
    }

    #[test]
    fn pairs_require_opposite_strands_within_distance() {
        let alns1 = vec![aln(1000, 90, true), aln(50_000, 80, true)];
        let alns2 = vec![
            aln(1400, 85, false), // pairs with the first
            aln(1300, 85, true),  // same strand: no
            aln(9000, 99, false), // too far from both
        ];
        let pairs = pair_candidates(&alns1, &alns2, 1000);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].first, pairs[0].second), (0, 0));
        assert_eq!(pairs[0].score, 175);
    }

    #[test]
    fn pairs_rank_by_combined_score() {
        let alns1 = vec![aln(1000, 60, true), aln(2000, 90, true)];
        let alns2 = vec![aln(1100, 60, false), aln(2100, 90, false)];
        let pairs = pair_candidates(&alns1, &alns2, 5000);
        assert_eq!(pairs[0].score, 180);
        assert!(pairs.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn estimation_trims_outliers_and_respects_the_round_cap() {
        let fallback = InsertModel {
            mean: 550.0,
            dev: 150.0,
        };
        let mut samples: Vec<i64> = (0..40).map(|i| 480 + (i % 9) * 10).collect();
        samples.push(100_000); // wild outlier
        let model = InsertModel::estimate(&samples, &fallback, 128);
        assert!((model.mean - 520.0).abs() < 40.0, "mean {:.1}", model.mean);
        assert!(model.dev < 100.0);

        // Zero-round cap still produces a usable model.
        let capped = InsertModel::estimate(&samples, &fallback, 1);
        assert!(capped.dev >= 1.0);

        // Too few samples: keep the configured model.
        let kept = InsertModel::estimate(&[500, 510], &fallback, 8);
        assert!((kept.mean - 550.0).abs() < f64::EPSILON);
    }

    #[test]
    fn insert_penalty_grows_quadratically() {
        let model = InsertModel {
            mean: 500.0,
            dev: 100.0,
        };
        assert_eq!(model.penalty(500), 0);
        assert_eq!(model.penalty(600), 1);
        assert_eq!(model.penalty(700), 4);
        assert_eq!(model.penalty(900), 16);
    }
}
