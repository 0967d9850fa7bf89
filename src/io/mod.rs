//! Input/output boundary: FASTA references in, FASTQ reads in, shaped
//! SAM records out.

pub mod fasta;
pub mod fastq;
pub mod sam;

pub use fastq::{FastqReader, PairedReader, ReadRecord};
pub use sam::SamRecord;
