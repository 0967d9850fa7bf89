//! Alignment extension engine.
//!
//! One interface over interchangeable local-alignment kernels: striped
//! SIMD score kernels picked by a one-time CPU capability probe, and a
//! scalar kernel that is always available and must agree with them
//! exactly. Scoring runs on whichever kernel the probe selected; CIGARs
//! are produced by the scalar traceback for surviving candidates only,
//! so they are byte-identical across engines by construction.

pub mod scalar;
#[cfg(target_arch = "x86_64")]
pub mod striped;

pub use scalar::TracebackAln;

/// Affine-gap scoring scheme. A gap of length `k` costs
/// `gap_open + k * gap_extend`; any comparison touching an ambiguous
/// base costs `ambig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwScores {
    pub match_score: i32,
    pub mismatch: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
    pub ambig: i32,
}

impl Default for SwScores {
    fn default() -> Self {
        Self {
            match_score: 1,
            mismatch: 4,
            gap_open: 6,
            gap_extend: 1,
            ambig: 1,
        }
    }
}

impl SwScores {
    #[inline(always)]
    pub fn substitution(&self, a: u8, b: u8) -> i32 {
        if a >= 4 || b >= 4 {
            -self.ambig
        } else if a == b {
            self.match_score
        } else {
            -self.mismatch
        }
    }
}

/// Score-only kernel result: best local score, the best score ending
/// outside the mask window (region second-best), and the inclusive end
/// coordinates of the optimum on both sequences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalHit {
    pub score: i32,
    pub score2: i32,
    pub ref_end: i32,
    pub read_end: i32,
}

/// Which kernel the engine dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Scalar,
    Sse2,
    Avx2,
}

impl EngineKind {
    pub fn lanes(self) -> usize {
        match self {
            EngineKind::Scalar => 1,
            EngineKind::Sse2 => 8,
            EngineKind::Avx2 => 16,
        }
    }
}

/// Queries long enough that 16-bit lanes could saturate are routed to
/// the scalar kernel instead. With unit match score this is far beyond
/// any short read.
const I16_SCORE_CEILING: i32 = 30_000;

/// A query prepared for the engine: its codes plus, when a SIMD kernel
/// is active, the striped substitution profile.
#[derive(Debug, Clone)]
pub struct QueryProfile {
    codes: Vec<u8>,
    #[cfg(target_arch = "x86_64")]
    striped: Option<striped::StripedProfile>,
}

impl QueryProfile {
    pub fn codes(&self) -> &[u8] {
        &self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// The extension engine: scoring scheme plus selected kernel.
#[derive(Debug, Clone)]
pub struct ExtensionEngine {
    kind: EngineKind,
    scores: SwScores,
}

impl ExtensionEngine {
    /// Probe CPU capabilities once at startup and pick the widest
    /// available kernel.
    pub fn probe(scores: SwScores) -> Self {
        let kind = Self::probe_kind();
        log::info!("extension engine: {:?} ({} lanes)", kind, kind.lanes());
        Self { kind, scores }
    }

    #[cfg(target_arch = "x86_64")]
    fn probe_kind() -> EngineKind {
        if is_x86_feature_detected!("avx2") {
            EngineKind::Avx2
        } else {
            // SSE2 is part of the x86_64 baseline.
            EngineKind::Sse2
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn probe_kind() -> EngineKind {
        EngineKind::Scalar
    }

    /// The mandatory scalar fallback, also used by the parity tests.
    pub fn scalar(scores: SwScores) -> Self {
        Self {
            kind: EngineKind::Scalar,
            scores,
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn scores(&self) -> &SwScores {
        &self.scores
    }

    /// Prepare a query for repeated scoring calls.
    pub fn profile(&self, codes: &[u8]) -> QueryProfile {
        #[cfg(target_arch = "x86_64")]
        {
            let striped = match self.kind {
                EngineKind::Scalar => None,
                _ if codes.len() as i32 * self.scores.match_score.max(1) > I16_SCORE_CEILING => {
                    None
                }
                kind => Some(striped::StripedProfile::build(
                    &self.scores,
                    codes,
                    kind.lanes(),
                )),
            };
            QueryProfile {
                codes: codes.to_vec(),
                striped,
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            QueryProfile {
                codes: codes.to_vec(),
            }
        }
    }

    /// Score the query against a target window. `mask_len` is the
    /// half-width of the window around the optimum excluded from the
    /// second-best (conventionally half the read length).
    pub fn score(&self, profile: &QueryProfile, target: &[u8], mask_len: usize) -> LocalHit {
        #[cfg(target_arch = "x86_64")]
        if let Some(striped) = &profile.striped {
            // SAFETY: the probe verified the feature for this kind.
            return match self.kind {
                EngineKind::Avx2 => unsafe {
                    striped::local_score_avx2(&self.scores, striped, target, mask_len)
                },
                EngineKind::Sse2 => unsafe {
                    striped::local_score_sse2(&self.scores, striped, target, mask_len)
                },
                EngineKind::Scalar => {
                    scalar::local_score(&self.scores, &profile.codes, target, mask_len)
                }
            };
        }
        scalar::local_score(&self.scores, &profile.codes, target, mask_len)
    }

    /// Full alignment with CIGAR for a surviving candidate. Always the
    /// scalar traceback, whatever kernel scored the candidate.
    pub fn traceback(&self, query: &[u8], target: &[u8]) -> Option<TracebackAln> {
        scalar::traceback(&self.scores, query, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::encode;

    #[test]
    fn probe_selects_a_kernel_with_scalar_always_possible() {
        let probed = ExtensionEngine::probe(SwScores::default());
        let scalar = ExtensionEngine::scalar(SwScores::default());
        assert_eq!(scalar.kind(), EngineKind::Scalar);
        assert!(probed.kind().lanes() >= 1);
    }

    #[test]
    fn probed_engine_matches_scalar_on_simple_windows() {
        let scores = SwScores::default();
        let probed = ExtensionEngine::probe(scores);
        let fallback = ExtensionEngine::scalar(scores);
        let query = encode(b"ACGTACGTACCGTTACGT");
        let target = encode(b"TTTACGTACGTACCGTTACGTTTTACGT");
        let hit = probed.score(&probed.profile(&query), &target, query.len() / 2);
        let want = fallback.score(&fallback.profile(&query), &target, query.len() / 2);
        assert_eq!(hit, want);
    }

    #[test]
    fn oversized_queries_fall_back_to_scalar_scoring() {
        let scores = SwScores {
            match_score: 300,
            ..SwScores::default()
        };
        let engine = ExtensionEngine::probe(scores);
        let query = encode(&b"ACGT".repeat(50));
        let profile = engine.profile(&query);
        let target = query.clone();
        let hit = engine.score(&profile, &target, 10);
        assert_eq!(hit.score, 200 * 300);
    }
}
