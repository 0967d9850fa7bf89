//! Alignment parameters.
//!
//! `AlignOpt` is the immutable configuration snapshot of one alignment
//! run; every stage reads from it and nothing mutates it after startup.
//! Defaults carry the tuned values for paired-end short reads around
//! 150 bp with a typical sequencing insert distribution.

use crate::index::SorterKind;
use clap::Args;

/// Immutable per-run alignment parameters.
#[derive(Debug, Clone)]
pub struct AlignOpt {
    // Insert-size model.
    /// Expected insert size mean.
    pub insert_mean: u32,
    /// Expected insert size deviation.
    pub insert_var: u32,
    /// Maximum mate distance considered pairable.
    pub pair_dist: u32,

    // Per-read work caps.
    /// Reference occurrences retained per seed.
    pub max_hit_cnt: u32,
    /// Iteration cap for insert-size re-estimation.
    pub max_em_cnt: u32,
    /// Dynamic-programming extensions per read.
    pub max_sw_cnt: u32,
    /// Mate-rescue attempts per pair.
    pub max_rescue_cnt: u32,
    /// Seed spans kept per read orientation.
    pub max_seed_cnt: u32,

    // Seeding.
    /// Minimum seed length.
    pub seed_len: u32,
    /// Overlap between successive seeds.
    pub seed_overlap: u32,
    /// Reference flank added around a candidate window.
    pub extend: u32,
    /// Minimum score to report an alignment.
    pub sw_threshold: i32,
    /// K-mer size of the census admission filter.
    pub kmer_size: u32,
    /// Minimum k-mer census to admit a candidate window.
    pub min_find_cnt: u32,
    /// Census slack below the best candidate still admitted.
    pub max_find_cnt_diff: u32,
    /// Score slack below the best alignment still reported.
    pub max_sw_diff: i32,
    /// Penalty charged when mates are reported independently.
    pub pen_unpaired: i32,
}

impl Default for AlignOpt {
    fn default() -> Self {
        let insert_mean = 550;
        let insert_var = 150;
        Self {
            insert_mean,
            insert_var,
            pair_dist: insert_mean + 4 * insert_var + 50,

            max_hit_cnt: 512,
            max_em_cnt: 128,
            max_sw_cnt: 32,
            max_rescue_cnt: 128,
            max_seed_cnt: 4,

            seed_len: 19,
            seed_overlap: 4,
            extend: 100,
            sw_threshold: 30,
            kmer_size: 8,
            min_find_cnt: 4,
            max_find_cnt_diff: 4,
            max_sw_diff: 30,
            pen_unpaired: 19,
        }
    }
}

impl AlignOpt {
    /// Check parameter consistency; returns every problem at once.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.seed_len < 4 {
            errors.push(format!("seed_len must be >= 4, got {}", self.seed_len));
        }
        if self.seed_overlap >= self.seed_len {
            errors.push(format!(
                "seed_overlap ({}) must be smaller than seed_len ({})",
                self.seed_overlap, self.seed_len
            ));
        }
        if self.max_hit_cnt == 0 {
            errors.push("max_hit_cnt must be >= 1".to_string());
        }
        if self.max_seed_cnt == 0 {
            errors.push("max_seed_cnt must be >= 1".to_string());
        }
        if !(1..=15).contains(&self.kmer_size) {
            errors.push(format!("kmer_size must be in 1..=15, got {}", self.kmer_size));
        }
        if self.sw_threshold < 1 {
            errors.push(format!(
                "sw_threshold must be >= 1, got {}",
                self.sw_threshold
            ));
        }
        if self.insert_var == 0 {
            errors.push("insert_var must be >= 1".to_string());
        }
        if self.pair_dist == 0 {
            errors.push("pair_dist must be >= 1".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn log_parameters(&self) {
        log::debug!("seed_len: {}", self.seed_len);
        log::debug!("seed_overlap: {}", self.seed_overlap);
        log::debug!("kmer_size: {}", self.kmer_size);
        log::debug!("max_hit_cnt: {}", self.max_hit_cnt);
        log::debug!("max_seed_cnt: {}", self.max_seed_cnt);
        log::debug!("max_sw_cnt: {}", self.max_sw_cnt);
        log::debug!("max_em_cnt: {}", self.max_em_cnt);
        log::debug!("max_rescue_cnt: {}", self.max_rescue_cnt);
        log::debug!("min_find_cnt: {}", self.min_find_cnt);
        log::debug!("max_find_cnt_diff: {}", self.max_find_cnt_diff);
        log::debug!("sw_threshold: {}", self.sw_threshold);
        log::debug!("max_sw_diff: {}", self.max_sw_diff);
        log::debug!("extend: {}", self.extend);
        log::debug!("pen_unpaired: {}", self.pen_unpaired);
        log::debug!("insert_mean: {}", self.insert_mean);
        log::debug!("insert_var: {}", self.insert_var);
        log::debug!("pair_dist: {}", self.pair_dist);
    }
}

/// CLI surface of the `map` subcommand's algorithm options.
#[derive(Debug, Clone, Args)]
pub struct MapCliOptions {
    /// Minimum seed length
    #[arg(short = 'k', long, value_name = "INT", default_value_t = 19)]
    pub seed_len: u32,

    /// Overlap between successive seeds
    #[arg(long, value_name = "INT", default_value_t = 4)]
    pub seed_overlap: u32,

    /// Skip seeds with more than INT reference occurrences
    #[arg(short = 'c', long, value_name = "INT", default_value_t = 512)]
    pub max_hit_cnt: u32,

    /// Candidate seed spans kept per read orientation
    #[arg(long, value_name = "INT", default_value_t = 4)]
    pub max_seed_cnt: u32,

    /// Cap on dynamic-programming extensions per read
    #[arg(long, value_name = "INT", default_value_t = 32)]
    pub max_sw_cnt: u32,

    /// Cap on mate-rescue attempts per pair
    #[arg(long, value_name = "INT", default_value_t = 128)]
    pub max_rescue_cnt: u32,

    /// Iteration cap for insert-size re-estimation
    #[arg(long, value_name = "INT", default_value_t = 128)]
    pub max_em_cnt: u32,

    /// K-mer size of the window admission filter
    #[arg(long, value_name = "INT", default_value_t = 8)]
    pub kmer_size: u32,

    /// Minimum k-mer census to admit a candidate window
    #[arg(long, value_name = "INT", default_value_t = 4)]
    pub min_find_cnt: u32,

    /// Census slack below the best candidate still admitted
    #[arg(long, value_name = "INT", default_value_t = 4)]
    pub max_find_cnt_diff: u32,

    /// Minimum alignment score to report
    #[arg(short = 'T', long, value_name = "INT", default_value_t = 30)]
    pub sw_threshold: i32,

    /// Score slack below the best alignment still reported
    #[arg(long, value_name = "INT", default_value_t = 30)]
    pub max_sw_diff: i32,

    /// Penalty for reporting mates independently
    #[arg(short = 'U', long, value_name = "INT", default_value_t = 19)]
    pub pen_unpaired: i32,

    /// Mean of the insert-size distribution
    #[arg(long, value_name = "INT", default_value_t = 550)]
    pub insert_mean: u32,

    /// Deviation of the insert-size distribution
    #[arg(long, value_name = "INT", default_value_t = 150)]
    pub insert_var: u32,

    /// Maximum mate distance considered pairable
    /// (default: insert_mean + 4 * insert_var + 50)
    #[arg(long, value_name = "INT")]
    pub pair_dist: Option<u32>,

    /// Re-estimate the insert-size model from the first batch
    #[arg(long)]
    pub estimate_insert: bool,

    /// Force the scalar extension kernel (skip the SIMD probe)
    #[arg(long)]
    pub scalar_extension: bool,

    /// Number of worker threads (default: all available cores)
    #[arg(short = 't', long, value_name = "INT")]
    pub threads: Option<usize>,

    /// Reads processed per scheduler batch
    #[arg(long, value_name = "INT", default_value_t = 512)]
    pub batch_size: usize,
}

impl MapCliOptions {
    pub fn to_align_opt(&self) -> AlignOpt {
        AlignOpt {
            insert_mean: self.insert_mean,
            insert_var: self.insert_var,
            pair_dist: self
                .pair_dist
                .unwrap_or(self.insert_mean + 4 * self.insert_var + 50),
            max_hit_cnt: self.max_hit_cnt,
            max_em_cnt: self.max_em_cnt,
            max_sw_cnt: self.max_sw_cnt,
            max_rescue_cnt: self.max_rescue_cnt,
            max_seed_cnt: self.max_seed_cnt,
            seed_len: self.seed_len,
            seed_overlap: self.seed_overlap,
            extend: AlignOpt::default().extend,
            sw_threshold: self.sw_threshold,
            kmer_size: self.kmer_size,
            min_find_cnt: self.min_find_cnt,
            max_find_cnt_diff: self.max_find_cnt_diff,
            max_sw_diff: self.max_sw_diff,
            pen_unpaired: self.pen_unpaired,
        }
    }
}

/// CLI surface of the `index` subcommand.
#[derive(Debug, Clone, Args)]
pub struct IndexCliOptions {
    /// Suffix-array construction strategy
    #[arg(long, value_enum, default_value = "sais")]
    pub sorter: SorterKind,

    /// Suffix-array sampling interval
    #[arg(long, value_name = "INT", default_value_t = 8)]
    pub sa_interval: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_documented_values() {
        let opt = AlignOpt::default();
        assert_eq!(opt.seed_len, 19);
        assert_eq!(opt.seed_overlap, 4);
        assert_eq!(opt.max_hit_cnt, 512);
        assert_eq!(opt.max_em_cnt, 128);
        assert_eq!(opt.max_sw_cnt, 32);
        assert_eq!(opt.max_rescue_cnt, 128);
        assert_eq!(opt.max_seed_cnt, 4);
        assert_eq!(opt.extend, 100);
        assert_eq!(opt.sw_threshold, 30);
        assert_eq!(opt.kmer_size, 8);
        assert_eq!(opt.min_find_cnt, 4);
        assert_eq!(opt.max_find_cnt_diff, 4);
        assert_eq!(opt.max_sw_diff, 30);
        assert_eq!(opt.pen_unpaired, 19);
        assert_eq!(opt.insert_mean, 550);
        assert_eq!(opt.insert_var, 150);
        assert_eq!(opt.pair_dist, 550 + 4 * 150 + 50);
        assert!(opt.validate().is_ok());
    }

    #[test]
    fn validate_collects_every_problem() {
        let opt = AlignOpt {
            seed_len: 3,
            seed_overlap: 10,
            kmer_size: 16,
            ..AlignOpt::default()
        };
        let errors = opt.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("seed_len")));
        assert!(errors.iter().any(|e| e.contains("seed_overlap")));
        assert!(errors.iter().any(|e| e.contains("kmer_size")));
    }
}
