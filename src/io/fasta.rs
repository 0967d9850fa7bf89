//! Reference FASTA input (plain or gzip), decoded straight to symbol
//! codes for index construction.

use crate::encoding;
use anyhow::{bail, Context, Result};
use bio::io::fasta;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Open a file, transparently decoding gzip by extension.
pub(crate) fn open_maybe_gz(path: &Path) -> Result<Box<dyn Read + Send>> {
    let file =
        File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let gz = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    Ok(if gz {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    })
}

/// Read every record of a reference FASTA as `(name, codes)`, in file
/// order. Record names are trimmed at the first whitespace.
pub fn read_reference(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let reader = fasta::Reader::new(open_maybe_gz(path)?);
    let mut records = Vec::new();
    for record in reader.records() {
        let record =
            record.with_context(|| format!("reading FASTA {}", path.display()))?;
        let name = record
            .id()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        if name.is_empty() {
            bail!("FASTA record without a name in {}", path.display());
        }
        records.push((name, encoding::encode(record.seq())));
    }
    if records.is_empty() {
        bail!("no sequences in {}", path.display());
    }
    log::info!(
        "read {} reference sequence(s) from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_plain_fasta_with_trimmed_names() {
        let dir = std::env::temp_dir().join("cobalt-fasta-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ref.fa");
        let mut f = File::create(&path).unwrap();
        writeln!(f, ">chr1 some description\nACGTacgt\nNNAC").unwrap();
        writeln!(f, ">chr2\nTTTT").unwrap();
        drop(f);

        let records = read_reference(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "chr1");
        assert_eq!(records[0].1, encoding::encode(b"ACGTACGTNNAC"));
        assert_eq!(records[1].0, "chr2");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_a_context_rich_error() {
        let err = read_reference(Path::new("/nonexistent/ref.fa")).unwrap_err();
        assert!(err.to_string().contains("ref.fa"));
    }
}
