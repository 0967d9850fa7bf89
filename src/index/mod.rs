//! Index construction and query: packed reference, suffix sorting, BWT,
//! FM-index, and the chromosome-aware genome index with persistence.

pub mod bwt;
pub mod fm;
pub mod genome;
pub mod reference;
pub mod sorter;

pub use fm::{FmIndex, Interval, SearchHit};
pub use genome::GenomeIndex;
pub use reference::{ChromBound, Reference};
pub use sorter::{SorterKind, SuffixSorter};
