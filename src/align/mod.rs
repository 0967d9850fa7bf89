//! The seed-and-extend alignment pipeline.

pub mod chaining;
pub mod cigar;
pub mod extension;
pub mod mapq;
pub mod pairing;
pub mod pipeline;
pub mod rescue;
pub mod seeding;

pub use cigar::Cigar;
pub use extension::{EngineKind, ExtensionEngine, SwScores};
pub use pipeline::{Aligner, Aln, AlnPair, Scratch};
