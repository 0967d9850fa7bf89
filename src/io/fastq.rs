//! Read input: FASTQ records (plain or gzip), single or paired.

use super::fasta::open_maybe_gz;
use anyhow::{bail, Context, Result};
use bio::io::fastq;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// One sequencing read as it arrived (ASCII bases and qualities).
#[derive(Debug, Clone)]
pub struct ReadRecord {
    pub name: String,
    pub seq: Vec<u8>,
    pub qual: String,
}

/// FASTQ reader with gzip auto-detection.
pub struct FastqReader {
    path: PathBuf,
    records: fastq::Records<BufReader<Box<dyn Read + Send>>>,
}

impl FastqReader {
    pub fn open(path: &Path) -> Result<Self> {
        let inner = open_maybe_gz(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            records: fastq::Reader::new(inner).records(),
        })
    }

    pub fn next_record(&mut self) -> Result<Option<ReadRecord>> {
        match self.records.next() {
            None => Ok(None),
            Some(record) => {
                let record = record
                    .with_context(|| format!("reading FASTQ {}", self.path.display()))?;
                Ok(Some(ReadRecord {
                    name: record
                        .id()
                        .split_whitespace()
                        .next()
                        .unwrap_or("")
                        .to_string(),
                    seq: record.seq().to_vec(),
                    qual: String::from_utf8_lossy(record.qual()).into_owned(),
                }))
            }
        }
    }
}

/// Two FASTQ streams advanced in lockstep.
pub struct PairedReader {
    first: FastqReader,
    second: FastqReader,
}

impl PairedReader {
    pub fn open(first: &Path, second: &Path) -> Result<Self> {
        Ok(Self {
            first: FastqReader::open(first)?,
            second: FastqReader::open(second)?,
        })
    }

    /// The next mate pair; a stream ending before its partner is an
    /// input error, not an EOF.
    pub fn next_pair(&mut self) -> Result<Option<(ReadRecord, ReadRecord)>> {
        match (self.first.next_record()?, self.second.next_record()?) {
            (Some(a), Some(b)) => Ok(Some((a, b))),
            (None, None) => Ok(None),
            (Some(a), None) => bail!("read {} has no mate in the second file", a.name),
            (None, Some(b)) => bail!("read {} has no mate in the first file", b.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_fastq(path: &Path, records: &[(&str, &str, &str)]) {
        let mut f = File::create(path).unwrap();
        for (name, seq, qual) in records {
            writeln!(f, "@{name}\n{seq}\n+\n{qual}").unwrap();
        }
    }

    #[test]
    fn paired_streams_advance_in_lockstep() {
        let dir = std::env::temp_dir().join("cobalt-fastq-test");
        std::fs::create_dir_all(&dir).unwrap();
        let p1 = dir.join("r1.fq");
        let p2 = dir.join("r2.fq");
        write_fastq(&p1, &[("pair1/1", "ACGT", "IIII"), ("pair2/1", "GGGG", "IIII")]);
        write_fastq(&p2, &[("pair1/2", "TTTT", "IIII"), ("pair2/2", "CCCC", "IIII")]);

        let mut reader = PairedReader::open(&p1, &p2).unwrap();
        let (a, b) = reader.next_pair().unwrap().unwrap();
        assert_eq!(a.name, "pair1/1");
        assert_eq!(b.seq, b"TTTT");
        assert!(reader.next_pair().unwrap().is_some());
        assert!(reader.next_pair().unwrap().is_none());
        std::fs::remove_file(&p1).unwrap();
        std::fs::remove_file(&p2).unwrap();
    }

    #[test]
    fn unbalanced_pair_files_are_an_error() {
        let dir = std::env::temp_dir().join("cobalt-fastq-test");
        std::fs::create_dir_all(&dir).unwrap();
        let p1 = dir.join("u1.fq");
        let p2 = dir.join("u2.fq");
        write_fastq(&p1, &[("a/1", "ACGT", "IIII"), ("b/1", "ACGT", "IIII")]);
        write_fastq(&p2, &[("a/2", "ACGT", "IIII")]);

        let mut reader = PairedReader::open(&p1, &p2).unwrap();
        assert!(reader.next_pair().unwrap().is_some());
        assert!(reader.next_pair().is_err());
        std::fs::remove_file(&p1).unwrap();
        std::fs::remove_file(&p2).unwrap();
    }
}
