//! Striped SIMD local-alignment score kernels (x86_64).
//!
//! The query profile is laid out in Farrar stripes: vector `k` holds the
//! substitution scores for query positions `k`, `k + seg_len`,
//! `k + 2*seg_len`, …, so the awkward column-shifted diagonal becomes a
//! single element shift per target symbol, with the classic lazy-F loop
//! repairing vertical-gap carries. Scores are 16-bit lanes; the engine
//! routes oversized queries to the scalar kernel before values could
//! approach saturation.
//!
//! Padding lanes (query positions past the read) carry a large negative
//! profile so they never seed an alignment, and a kill mask removes them
//! from the per-column maximum. Vertical gaps cannot leak back out of the
//! padding because padded positions are always the tail of the stripe
//! order.
//!
//! Both kernels must return exactly what `scalar::local_score` returns
//! for the same inputs; the parity tests in `tests/` hold them to that.

#![allow(clippy::missing_safety_doc)]

#[cfg(target_arch = "x86_64")]
use super::scalar::second_best;
use super::{LocalHit, SwScores};
use crate::encoding::ALPHABET;

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

const NEG16: i16 = i16::MIN / 2;

/// Striped substitution profile for one query and lane count.
#[derive(Debug, Clone)]
pub struct StripedProfile {
    query_len: usize,
    lanes: usize,
    seg_len: usize,
    /// `[ALPHABET][seg_len][lanes]` substitution scores; padding lanes
    /// hold `NEG16`.
    data: Vec<i16>,
    /// `[seg_len][lanes]`: 0 for real query positions, `i16::MIN` for
    /// padding (saturating add pushes padded H below zero).
    kill: Vec<i16>,
}

impl StripedProfile {
    pub fn build(scores: &SwScores, query: &[u8], lanes: usize) -> Self {
        debug_assert!(lanes == 8 || lanes == 16);
        let seg_len = query.len().div_ceil(lanes).max(1);
        let mut data = vec![0i16; ALPHABET * seg_len * lanes];
        let mut kill = vec![0i16; seg_len * lanes];
        for sym in 0..ALPHABET {
            for k in 0..seg_len {
                for l in 0..lanes {
                    let j = k + l * seg_len;
                    data[(sym * seg_len + k) * lanes + l] = if j < query.len() {
                        scores.substitution(query[j], sym as u8) as i16
                    } else {
                        NEG16
                    };
                }
            }
        }
        for k in 0..seg_len {
            for l in 0..lanes {
                if k + l * seg_len >= query.len() {
                    kill[k * lanes + l] = i16::MIN;
                }
            }
        }
        Self {
            query_len: query.len(),
            lanes,
            seg_len,
            data,
            kill,
        }
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn query_len(&self) -> usize {
        self.query_len
    }

    /// Lowest query position holding `value` in a saved H column, or the
    /// column's maximum position when the value is absent (defensive;
    /// the best column always contains its own maximum).
    fn min_query_pos_with(&self, column: &[i16], value: i16) -> usize {
        let mut best_j = self.query_len.saturating_sub(1);
        let mut found = false;
        for k in 0..self.seg_len {
            for l in 0..self.lanes {
                let j = k + l * self.seg_len;
                if j < self.query_len && column[k * self.lanes + l] == value && (!found || j < best_j)
                {
                    best_j = j;
                    found = true;
                }
            }
        }
        best_j
    }
}

/// SSE2 kernel: 8 lanes of i16.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
pub unsafe fn local_score_sse2(
    scores: &SwScores,
    profile: &StripedProfile,
    target: &[u8],
    mask_len: usize,
) -> LocalHit {
    debug_assert_eq!(profile.lanes, 8);
    if profile.query_len == 0 || target.is_empty() {
        return LocalHit::default();
    }
    let seg = profile.seg_len;
    let v_oe = _mm_set1_epi16((scores.gap_open + scores.gap_extend) as i16);
    let v_ext = _mm_set1_epi16(scores.gap_extend as i16);
    let v_zero = _mm_setzero_si128();
    let v_neg = _mm_set1_epi16(NEG16);

    let mut h_store = vec![v_zero; seg];
    let mut h_load = vec![v_zero; seg];
    let mut e_col = vec![v_neg; seg];
    let mut saved = vec![v_zero; seg];

    let mut col_max = Vec::with_capacity(target.len());
    let mut best = 0i32;
    let mut best_i = 0usize;

    for (i, &tc) in target.iter().enumerate() {
        let prof = profile
            .data
            .as_ptr()
            .add((tc as usize * seg) * profile.lanes);
        let kill = profile.kill.as_ptr();

        let mut v_f = v_neg;
        let mut v_h = _mm_slli_si128::<2>(h_store[seg - 1]);
        std::mem::swap(&mut h_load, &mut h_store);
        let mut v_cmax = v_zero;

        for k in 0..seg {
            let p = _mm_loadu_si128(prof.add(k * 8) as *const __m128i);
            v_h = _mm_adds_epi16(v_h, p);
            let e = e_col[k];
            v_h = _mm_max_epi16(v_h, e);
            v_h = _mm_max_epi16(v_h, v_f);
            v_h = _mm_max_epi16(v_h, v_zero);
            h_store[k] = v_h;

            let kv = _mm_loadu_si128(kill.add(k * 8) as *const __m128i);
            v_cmax = _mm_max_epi16(v_cmax, _mm_adds_epi16(v_h, kv));

            let hoe = _mm_subs_epi16(v_h, v_oe);
            e_col[k] = _mm_max_epi16(_mm_subs_epi16(e, v_ext), hoe);
            v_f = _mm_max_epi16(_mm_subs_epi16(v_f, v_ext), hoe);
            v_h = h_load[k];
        }

        // Lazy-F: propagate vertical gap carries across stripes until no
        // lane can still raise an H.
        'lazy: for _ in 0..8 {
            v_f = _mm_slli_si128::<2>(v_f);
            for k in 0..seg {
                let mut hv = _mm_max_epi16(h_store[k], v_f);
                h_store[k] = hv;
                let kv = _mm_loadu_si128(kill.add(k * 8) as *const __m128i);
                v_cmax = _mm_max_epi16(v_cmax, _mm_adds_epi16(hv, kv));
                hv = _mm_subs_epi16(hv, v_oe);
                v_f = _mm_subs_epi16(v_f, v_ext);
                if _mm_movemask_epi8(_mm_cmpgt_epi16(v_f, hv)) == 0 {
                    break 'lazy;
                }
            }
        }

        let cm = i32::from(hmax_epi16_128(v_cmax)).max(0);
        col_max.push(cm);
        if cm > best {
            best = cm;
            best_i = i;
            saved.copy_from_slice(&h_store);
        }
    }

    let mut column = vec![0i16; seg * 8];
    for (k, v) in saved.iter().enumerate() {
        _mm_storeu_si128(column.as_mut_ptr().add(k * 8) as *mut __m128i, *v);
    }
    finish(profile, &col_max, best, best_i, mask_len, &column)
}

/// AVX2 kernel: 16 lanes of i16.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
pub unsafe fn local_score_avx2(
    scores: &SwScores,
    profile: &StripedProfile,
    target: &[u8],
    mask_len: usize,
) -> LocalHit {
    debug_assert_eq!(profile.lanes, 16);
    if profile.query_len == 0 || target.is_empty() {
        return LocalHit::default();
    }
    let seg = profile.seg_len;
    let v_oe = _mm256_set1_epi16((scores.gap_open + scores.gap_extend) as i16);
    let v_ext = _mm256_set1_epi16(scores.gap_extend as i16);
    let v_zero = _mm256_setzero_si256();
    let v_neg = _mm256_set1_epi16(NEG16);

    let mut h_store = vec![v_zero; seg];
    let mut h_load = vec![v_zero; seg];
    let mut e_col = vec![v_neg; seg];
    let mut saved = vec![v_zero; seg];

    let mut col_max = Vec::with_capacity(target.len());
    let mut best = 0i32;
    let mut best_i = 0usize;

    for (i, &tc) in target.iter().enumerate() {
        let prof = profile
            .data
            .as_ptr()
            .add((tc as usize * seg) * profile.lanes);
        let kill = profile.kill.as_ptr();

        let mut v_f = v_neg;
        let mut v_h = shift_left_epi16_256(h_store[seg - 1]);
        std::mem::swap(&mut h_load, &mut h_store);
        let mut v_cmax = v_zero;

        for k in 0..seg {
            let p = _mm256_loadu_si256(prof.add(k * 16) as *const __m256i);
            v_h = _mm256_adds_epi16(v_h, p);
            let e = e_col[k];
            v_h = _mm256_max_epi16(v_h, e);
            v_h = _mm256_max_epi16(v_h, v_f);
            v_h = _mm256_max_epi16(v_h, v_zero);
            h_store[k] = v_h;

            let kv = _mm256_loadu_si256(kill.add(k * 16) as *const __m256i);
            v_cmax = _mm256_max_epi16(v_cmax, _mm256_adds_epi16(v_h, kv));

            let hoe = _mm256_subs_epi16(v_h, v_oe);
            e_col[k] = _mm256_max_epi16(_mm256_subs_epi16(e, v_ext), hoe);
            v_f = _mm256_max_epi16(_mm256_subs_epi16(v_f, v_ext), hoe);
            v_h = h_load[k];
        }

        'lazy: for _ in 0..16 {
            v_f = shift_left_epi16_256(v_f);
            for k in 0..seg {
                let mut hv = _mm256_max_epi16(h_store[k], v_f);
                h_store[k] = hv;
                let kv = _mm256_loadu_si256(kill.add(k * 16) as *const __m256i);
                v_cmax = _mm256_max_epi16(v_cmax, _mm256_adds_epi16(hv, kv));
                hv = _mm256_subs_epi16(hv, v_oe);
                v_f = _mm256_subs_epi16(v_f, v_ext);
                if _mm256_movemask_epi8(_mm256_cmpgt_epi16(v_f, hv)) == 0 {
                    break 'lazy;
                }
            }
        }

        let cm = i32::from(hmax_epi16_256(v_cmax)).max(0);
        col_max.push(cm);
        if cm > best {
            best = cm;
            best_i = i;
            saved.copy_from_slice(&h_store);
        }
    }

    let mut column = vec![0i16; seg * 16];
    for (k, v) in saved.iter().enumerate() {
        _mm256_storeu_si256(column.as_mut_ptr().add(k * 16) as *mut __m256i, *v);
    }
    finish(profile, &col_max, best, best_i, mask_len, &column)
}

/// Shared epilogue: recover the lowest query end achieving the optimum
/// from the saved best column, and compute the masked second-best.
#[cfg(target_arch = "x86_64")]
fn finish(
    profile: &StripedProfile,
    col_max: &[i32],
    best: i32,
    best_i: usize,
    mask_len: usize,
    column: &[i16],
) -> LocalHit {
    if best <= 0 {
        return LocalHit::default();
    }
    let read_end = profile.min_query_pos_with(column, best as i16);
    LocalHit {
        score: best,
        score2: second_best(col_max, best_i, mask_len),
        ref_end: best_i as i32,
        read_end: read_end as i32,
    }
}

/// Horizontal max of eight i16 lanes.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
#[inline]
unsafe fn hmax_epi16_128(v: __m128i) -> i16 {
    let m = _mm_max_epi16(v, _mm_srli_si128::<8>(v));
    let m = _mm_max_epi16(m, _mm_srli_si128::<4>(m));
    let m = _mm_max_epi16(m, _mm_srli_si128::<2>(m));
    _mm_extract_epi16::<0>(m) as i16
}

/// Horizontal max of sixteen i16 lanes.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
unsafe fn hmax_epi16_256(v: __m256i) -> i16 {
    let lo = _mm256_castsi256_si128(v);
    let hi = _mm256_extracti128_si256::<1>(v);
    hmax_epi16_128(_mm_max_epi16(lo, hi))
}

/// Shift a 256-bit vector left by one i16 element across the lane
/// boundary (the 128-bit `slli` shifts lanes independently, so the low
/// lane's top element is carried into the high lane explicitly).
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
unsafe fn shift_left_epi16_256(v: __m256i) -> __m256i {
    let carried = _mm256_permute2x128_si256::<0x28>(v, v);
    _mm256_alignr_epi8::<14>(v, carried)
}
