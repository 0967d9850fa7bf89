//! Genome index: the FM-index plus chromosome metadata, and its
//! persistent snapshot.
//!
//! The snapshot is a gzip-framed little-endian binary: an explicit magic
//! and format version up front, the chromosome table, the packed text,
//! the packed BWT and the sampled suffix array behind it. The gzip frame
//! contributes a stream CRC, so truncation or bit rot is caught on load
//! in addition to the structural validation below. A mismatched magic or
//! version, a failed CRC, or an inconsistent payload is a fatal load
//! error.

use super::bwt::Bwt;
use super::fm::{FmIndex, Interval, SearchHit};
use super::reference::{ChromBound, Reference, TEXT_CELL_BITS};
use super::sorter::SuffixSorter;
use crate::packed::{BitRank, PackedArray};
use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const SNAPSHOT_MAGIC: &[u8; 8] = b"CBALIDX\0";
const SNAPSHOT_VERSION: u32 = 2;

/// The immutable index shared by every alignment task: packed reference
/// text, chromosome table, and FM-index. No method takes `&mut self`
/// after construction, so concurrent readers need no locking.
#[derive(Debug)]
pub struct GenomeIndex {
    reference: Reference,
    fm: FmIndex,
}

impl GenomeIndex {
    /// Build the index with the given sorter strategy and suffix-array
    /// sampling interval. The coordinate-width check already happened in
    /// [`Reference::from_records`]; here the produced suffix array is
    /// verified to be a permutation before the BWT is derived — a sorter
    /// that breaks this invariant is a fatal construction error.
    pub fn build(reference: Reference, sorter: &dyn SuffixSorter, sa_intv: u32) -> Result<Self> {
        if sa_intv == 0 {
            bail!("suffix-array sampling interval must be at least 1");
        }
        let codes = reference.unpack();
        log::info!(
            "building suffix array over {} bases with the {} sorter",
            codes.len(),
            sorter.name()
        );
        let sa = sorter.suffix_array(&codes);
        verify_permutation(&sa, codes.len())?;
        log::info!("deriving BWT and occurrence checkpoints (sa_intv={sa_intv})");
        let fm = FmIndex::from_sa(&codes, &sa, sa_intv);
        Ok(Self { reference, fm })
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn fm(&self) -> &FmIndex {
        &self.fm
    }

    pub fn bounds(&self) -> &[ChromBound] {
        self.reference.bounds()
    }

    /// Backward-search a pattern; see [`FmIndex::search`].
    pub fn search(&self, pattern: &[u8]) -> SearchHit {
        self.fm.search(pattern)
    }

    /// Occurrence positions for an interval that stay inside a single
    /// chromosome over `span` bases; boundary-crossing hits are dropped,
    /// matching the half-open chromosome ranges exactly.
    pub fn placements(&self, interval: Interval, span: u32, limit: usize) -> Vec<u32> {
        self.fm
            .occurrences(interval, limit)
            .into_iter()
            .filter(|&pos| self.reference.within_one_chrom(pos, span))
            .collect()
    }

    /// Translate a global position; see [`Reference::resolve`].
    pub fn resolve(&self, pos: u32) -> Option<(usize, u32)> {
        self.reference.resolve(pos)
    }

    /// Write the versioned snapshot.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("creating index snapshot {}", path.display()))?;
        let mut w = GzEncoder::new(BufWriter::new(file), Compression::fast());

        w.write_all(SNAPSHOT_MAGIC)?;
        write_u32(&mut w, SNAPSHOT_VERSION)?;
        write_u32(&mut w, self.fm.sa_intv())?;

        // Chromosome table.
        let bounds = self.reference.bounds();
        write_u32(&mut w, bounds.len() as u32)?;
        for b in bounds {
            write_u32(&mut w, b.name.len() as u32)?;
            w.write_all(b.name.as_bytes())?;
            write_u32(&mut w, b.start)?;
            write_u32(&mut w, b.len)?;
        }

        // Packed text and BWT.
        write_u64(&mut w, self.reference.len() as u64)?;
        write_words(&mut w, self.reference.packed_text().words())?;
        write_u32(&mut w, self.fm.bwt().rows())?;
        write_u32(&mut w, self.fm.bwt().primary())?;
        write_words(&mut w, self.fm.bwt().packed().words())?;

        // Sampled suffix array and its row marks.
        write_u64(&mut w, self.fm.sampled().len() as u64)?;
        for &v in self.fm.sampled() {
            write_u32(&mut w, v)?;
        }
        write_words(&mut w, self.fm.mark().words())?;

        w.finish()?.flush()?;
        log::info!("wrote index snapshot to {}", path.display());
        Ok(())
    }

    /// Load and validate a snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening index snapshot {}", path.display()))?;
        let mut payload = Vec::new();
        GzDecoder::new(BufReader::new(file))
            .read_to_end(&mut payload)
            .with_context(|| format!("decompressing index snapshot {}", path.display()))?;
        let mut r = payload.as_slice();

        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).context("reading snapshot magic")?;
        if &magic != SNAPSHOT_MAGIC {
            bail!("not a cobalt index snapshot: bad magic");
        }
        let version = read_u32(&mut r)?;
        if version != SNAPSHOT_VERSION {
            bail!("index snapshot version {version} is not supported (expected {SNAPSHOT_VERSION})");
        }
        let sa_intv = read_u32(&mut r)?;
        if sa_intv == 0 {
            bail!("corrupt snapshot: zero sampling interval");
        }

        let bound_count = read_u32(&mut r)? as usize;
        let mut bounds = Vec::with_capacity(bound_count);
        let mut cursor = 0u32;
        for _ in 0..bound_count {
            let name_len = read_u32(&mut r)? as usize;
            let mut name = vec![0u8; name_len];
            r.read_exact(&mut name).context("reading chromosome name")?;
            let name = String::from_utf8(name).context("chromosome name is not UTF-8")?;
            let start = read_u32(&mut r)?;
            let len = read_u32(&mut r)?;
            if start != cursor {
                bail!("corrupt snapshot: chromosome ranges are not contiguous");
            }
            cursor = start
                .checked_add(len)
                .context("corrupt snapshot: chromosome range overflow")?;
            bounds.push(ChromBound { name, start, len });
        }

        let text_len = read_u64(&mut r)? as usize;
        if cursor as u64 != text_len as u64 {
            bail!("corrupt snapshot: chromosome table does not cover the text");
        }
        let text_words = read_words(&mut r)?;
        let text = PackedArray::from_parts(TEXT_CELL_BITS, text_len, text_words)
            .context("corrupt snapshot: packed text size mismatch")?;

        let rows = read_u32(&mut r)?;
        let primary = read_u32(&mut r)?;
        if rows == 0 || rows as u64 != text_len as u64 + 1 {
            bail!("corrupt snapshot: BWT row count does not match the text");
        }
        if primary >= rows {
            bail!("corrupt snapshot: primary row out of range");
        }
        let bwt_words = read_words(&mut r)?;
        let bwt_data = PackedArray::from_parts(TEXT_CELL_BITS, rows as usize, bwt_words)
            .context("corrupt snapshot: packed BWT size mismatch")?;

        let sampled_len = read_u64(&mut r)? as usize;
        if sampled_len == 0 {
            bail!("corrupt snapshot: empty suffix-array sample");
        }
        let mut sampled = Vec::with_capacity(sampled_len);
        for _ in 0..sampled_len {
            let v = read_u32(&mut r)?;
            if u64::from(v) > text_len as u64 {
                bail!("corrupt snapshot: suffix-array sample out of range");
            }
            sampled.push(v);
        }
        let mark_words = read_words(&mut r)?;
        let mark = BitRank::from_bits(rows as usize, mark_words)
            .context("corrupt snapshot: sample-mark bitvector size mismatch")?;
        if mark.rank1(rows as usize) as usize != sampled_len {
            bail!("corrupt snapshot: sample marks disagree with the sample count");
        }
        if !r.is_empty() {
            bail!("corrupt snapshot: trailing bytes after payload");
        }

        let bwt = Bwt::from_parts(rows, primary, bwt_data);
        let fm = FmIndex::from_loaded(bwt, sa_intv, sampled, mark);
        let reference = Reference::from_parts(text, bounds);
        log::info!(
            "loaded index snapshot: {} chromosomes, {} bases",
            reference.bounds().len(),
            reference.len()
        );
        Ok(Self { reference, fm })
    }
}

fn verify_permutation(sa: &[u32], text_len: usize) -> Result<()> {
    if sa.len() != text_len + 1 {
        bail!(
            "suffix array has {} entries for a text of {} bases",
            sa.len(),
            text_len
        );
    }
    let mut seen = vec![false; sa.len()];
    for &p in sa {
        let slot = seen
            .get_mut(p as usize)
            .with_context(|| format!("suffix array entry {p} out of range"))?;
        if *slot {
            bail!("suffix array entry {p} is duplicated");
        }
        *slot = true;
    }
    Ok(())
}

fn write_u32(w: &mut impl Write, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u64(w: &mut impl Write, v: u64) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_words(w: &mut impl Write, words: &[u64]) -> std::io::Result<()> {
    write_u64(w, words.len() as u64)?;
    for &word in words {
        write_u64(w, word)?;
    }
    Ok(())
}

fn read_u32(r: &mut &[u8]) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).context("truncated snapshot")?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut &[u8]) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).context("truncated snapshot")?;
    Ok(u64::from_le_bytes(buf))
}

fn read_words(r: &mut &[u8]) -> Result<Vec<u64>> {
    let count = read_u64(r)? as usize;
    if count > r.len() / 8 + 1 {
        bail!("corrupt snapshot: implausible word count {count}");
    }
    let mut words = Vec::with_capacity(count);
    for _ in 0..count {
        words.push(read_u64(r)?);
    }
    Ok(words)
}
