//! Mapping-quality estimation.
//!
//! Confidence comes from the margin between the best and second-best
//! candidates, shrinks with the repeat content of the seeds that produced
//! the winner, and is clamped to [0, 60]. Rescued mates carry an
//! additional, lower ceiling: their placement was steered by the partner
//! rather than found independently.

/// Upper bound of every reported mapping quality.
pub const MAPQ_MAX: i32 = 60;

/// Ceiling applied to alignments recovered by mate rescue.
pub const RESCUED_MAPQ_CAP: i32 = 30;

/// From a descending score list, extract the best score, the runner-up,
/// and how many scores sit within `diff` of the runner-up.
pub fn opt_subopt_count(scores: &[i32], diff: i32) -> (i32, i32, i32) {
    match scores {
        [] => (0, 0, 0),
        [only] => (*only, 0, 0),
        [opt, sub, rest @ ..] => {
            let floor = sub - diff;
            let mut count = 1;
            for &s in rest {
                if s < floor {
                    break;
                }
                count += 1;
            }
            (*opt, *sub, count)
        }
    }
}

/// Inputs of the single-end estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapqInput {
    /// Best local score of the reported alignment.
    pub score: i32,
    /// Second-best score within the same region.
    pub score2: i32,
    /// Best score among the other regions.
    pub sub_score: i32,
    /// Alignment length in bases.
    pub align_len: i32,
    /// Number of alignments at or near the global second-best.
    pub sub_count: i32,
    /// Fraction of the read covered by repetitive seeds.
    pub frac_rep: f32,
}

/// Single-end mapping quality.
pub fn approx_mapq_se(input: MapqInput) -> i32 {
    let MapqInput {
        score,
        score2,
        sub_score,
        align_len,
        sub_count,
        frac_rep,
    } = input;

    let mut sub = if sub_score != 0 { sub_score } else { 20 };
    if score2 > sub {
        sub = score2;
    }
    if sub >= score {
        return 0;
    }

    let len = f64::from(align_len.max(1));
    let identity = 1.0 - (len - f64::from(score)) / 5.0 / len;
    let mut scale = if align_len < 50 {
        1.0
    } else {
        3.912 / len.ln()
    };
    scale *= identity * identity;

    let mut mapq = (6.02 * f64::from(score - sub) * scale * scale + 0.499) as i32;
    if sub_count > 0 {
        mapq -= (4.343 * f64::from(sub_count + 1).ln() + 0.499) as i32;
    }
    mapq = mapq.clamp(0, MAPQ_MAX);
    (f64::from(mapq) * (1.0 - f64::from(frac_rep)) + 0.499) as i32
}

/// Mapping quality implied by a bare score difference.
pub fn raw_mapq(diff: i32) -> i32 {
    (6.02 * f64::from(diff) + 0.499) as i32
}

/// Paired-end mapping quality for both mates.
///
/// `score_un` is the best combined score of reporting the mates
/// independently (already charged the unpaired penalty); `opt`, `subopt`
/// and `sub_count` describe the paired score distribution.
pub fn mapq_pe(
    first: MapqInput,
    second: MapqInput,
    score_un: i32,
    opt: i32,
    subopt: i32,
    sub_count: i32,
) -> (i32, i32) {
    let subopt = subopt.max(score_un);
    let mut q_pe = raw_mapq(opt - subopt);
    if sub_count > 0 {
        q_pe -= (4.343 * f64::from(sub_count + 1).ln() + 0.499) as i32;
    }
    q_pe = q_pe.clamp(0, MAPQ_MAX);
    q_pe = (f64::from(q_pe) * (1.0 - 0.5 * f64::from(first.frac_rep + second.frac_rep)) + 0.499)
        as i32;

    let lift = |q_se: i32| -> i32 {
        if q_se > q_pe {
            q_se
        } else if q_pe < q_se + 40 {
            q_pe
        } else {
            q_se + 40
        }
    };
    let mut q0 = lift(approx_mapq_se(first));
    let mut q1 = lift(approx_mapq_se(second));

    q0 = q0.min(raw_mapq(first.score - first.score2));
    q1 = q1.min(raw_mapq(second.score - second.score2));

    (q0.min(MAPQ_MAX), q1.min(MAPQ_MAX))
}
