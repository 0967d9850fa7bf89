//! SAM record shaping.
//!
//! The pipeline works in 0-based global text coordinates; this layer
//! translates to chromosome coordinates and emits 1-based SAM POS/PNEXT
//! (the only place the 1-based convention exists). Records are shaped to
//! be directly serializable: flags, CIGAR text, mate fields, template
//! length, and the AS/XS score tags plus an `rs:i:1` marker on rescued
//! mates.

use crate::align::pipeline::{Aln, AlnPair};
use crate::encoding;
use crate::index::GenomeIndex;
use crate::io::fastq::ReadRecord;
use crate::opts::AlignOpt;
use std::fmt;

/// SAM FLAG bits.
pub mod flags {
    pub const PAIRED: u16 = 0x1;
    pub const PROPER_PAIR: u16 = 0x2;
    pub const UNMAPPED: u16 = 0x4;
    pub const MATE_UNMAPPED: u16 = 0x8;
    pub const REVERSE: u16 = 0x10;
    pub const MATE_REVERSE: u16 = 0x20;
    pub const FIRST_IN_PAIR: u16 = 0x40;
    pub const SECOND_IN_PAIR: u16 = 0x80;
}

/// One alignment line, ready to print.
#[derive(Debug, Clone)]
pub struct SamRecord {
    pub qname: String,
    pub flag: u16,
    pub rname: String,
    /// 1-based leftmost position; 0 when unmapped.
    pub pos: u64,
    pub mapq: u8,
    pub cigar: String,
    pub rnext: String,
    pub pnext: u64,
    pub tlen: i64,
    pub seq: String,
    pub qual: String,
    pub tags: Vec<String>,
}

impl fmt::Display for SamRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.qname,
            self.flag,
            self.rname,
            self.pos,
            self.mapq,
            self.cigar,
            self.rnext,
            self.pnext,
            self.tlen,
            self.seq,
            self.qual
        )?;
        for tag in &self.tags {
            write!(f, "\t{tag}")?;
        }
        Ok(())
    }
}

/// SAM header: one @SQ per chromosome plus the program line.
pub fn header(idx: &GenomeIndex, command_line: &str) -> String {
    let mut out = String::from("@HD\tVN:1.6\tSO:unsorted\n");
    for bound in idx.bounds() {
        out.push_str(&format!("@SQ\tSN:{}\tLN:{}\n", bound.name, bound.len));
    }
    out.push_str(&format!(
        "@PG\tID:cobalt\tPN:cobalt\tVN:{}\tCL:{}\n",
        env!("CARGO_PKG_VERSION"),
        command_line
    ));
    out
}

/// Chromosome name and 1-based local position of an alignment.
fn placement(idx: &GenomeIndex, aln: &Aln) -> Option<(String, u64)> {
    let (chrom, offset) = idx.resolve(aln.pos)?;
    Some((idx.bounds()[chrom].name.clone(), u64::from(offset) + 1))
}

/// Oriented sequence and quality for output: reverse-strand alignments
/// print the reverse complement with reversed qualities.
fn oriented(read: &ReadRecord, forward: bool) -> (String, String) {
    if forward {
        (
            String::from_utf8_lossy(&read.seq).into_owned(),
            read.qual.clone(),
        )
    } else {
        let rc = encoding::decode(&encoding::reverse_complement(&encoding::encode(&read.seq)));
        (
            String::from_utf8_lossy(&rc).into_owned(),
            read.qual.chars().rev().collect(),
        )
    }
}

fn score_tags(aln: &Aln) -> Vec<String> {
    let mut tags = vec![
        format!("AS:i:{}", aln.score),
        format!("XS:i:{}", aln.sub_score),
    ];
    if aln.rescued {
        tags.push("rs:i:1".to_string());
    }
    tags
}

/// Shape a single-end alignment.
pub fn single_record(idx: &GenomeIndex, read: &ReadRecord, aln: &Aln) -> SamRecord {
    let mut flag = 0u16;
    let (rname, pos) = if aln.is_mapped() {
        match placement(idx, aln) {
            Some(p) => p,
            None => ("*".to_string(), 0),
        }
    } else {
        ("*".to_string(), 0)
    };
    if !aln.is_mapped() {
        flag |= flags::UNMAPPED;
    }
    if aln.is_mapped() && !aln.forward {
        flag |= flags::REVERSE;
    }
    let (seq, qual) = oriented(read, aln.forward || !aln.is_mapped());
    SamRecord {
        qname: read.name.clone(),
        flag,
        rname,
        pos,
        mapq: aln.mapq,
        cigar: aln.cigar.to_string(),
        rnext: "*".to_string(),
        pnext: 0,
        tlen: 0,
        seq,
        qual,
        tags: if aln.is_mapped() {
            score_tags(aln)
        } else {
            Vec::new()
        },
    }
}

/// Shape both mates of a pair.
pub fn pair_records(
    idx: &GenomeIndex,
    read1: &ReadRecord,
    read2: &ReadRecord,
    pair: &AlnPair,
    opt: &AlignOpt,
) -> (SamRecord, SamRecord) {
    let a1 = &pair.first;
    let a2 = &pair.second;

    let mut flag1 = flags::PAIRED | flags::FIRST_IN_PAIR;
    let mut flag2 = flags::PAIRED | flags::SECOND_IN_PAIR;
    if a1.is_mapped() && !a1.forward {
        flag1 |= flags::REVERSE;
        flag2 |= flags::MATE_REVERSE;
    }
    if a2.is_mapped() && !a2.forward {
        flag2 |= flags::REVERSE;
        flag1 |= flags::MATE_REVERSE;
    }

    let p1 = a1.is_mapped().then(|| placement(idx, a1)).flatten();
    let p2 = a2.is_mapped().then(|| placement(idx, a2)).flatten();
    if p1.is_none() {
        flag1 |= flags::UNMAPPED;
        flag2 |= flags::MATE_UNMAPPED;
    }
    if p2.is_none() {
        flag2 |= flags::UNMAPPED;
        flag1 |= flags::MATE_UNMAPPED;
    }

    let (rname1, pos1) = p1.clone().unwrap_or(("*".to_string(), 0));
    let (rname2, pos2) = p2.clone().unwrap_or(("*".to_string(), 0));

    // Mate fields and template length.
    let mut rnext1 = rname2.clone();
    let mut rnext2 = rname1.clone();
    let mut tlen1 = 0i64;
    let mut tlen2 = 0i64;
    if let (Some((n1, s1)), Some((n2, s2))) = (&p1, &p2) {
        if n1 == n2 {
            rnext1 = "=".to_string();
            rnext2 = "=".to_string();
            let end1 = *s1 as i64 + i64::from(a1.cigar.ref_len()) - 1;
            let end2 = *s2 as i64 + i64::from(a2.cigar.ref_len()) - 1;
            let span = end1.max(end2) - (*s1 as i64).min(*s2 as i64) + 1;
            tlen1 = if s1 <= s2 { span } else { -span };
            tlen2 = -tlen1;
            if a1.forward != a2.forward && span.unsigned_abs() <= u64::from(opt.pair_dist) {
                flag1 |= flags::PROPER_PAIR;
                flag2 |= flags::PROPER_PAIR;
            }
        }
    }

    let (seq1, qual1) = oriented(read1, a1.forward || !a1.is_mapped());
    let (seq2, qual2) = oriented(read2, a2.forward || !a2.is_mapped());

    let record1 = SamRecord {
        qname: read1.name.clone(),
        flag: flag1,
        rname: rname1,
        pos: pos1,
        mapq: a1.mapq,
        cigar: a1.cigar.to_string(),
        rnext: rnext1,
        pnext: pos2,
        tlen: tlen1,
        seq: seq1,
        qual: qual1,
        tags: if a1.is_mapped() { score_tags(a1) } else { Vec::new() },
    };
    let record2 = SamRecord {
        qname: read2.name.clone(),
        flag: flag2,
        rname: rname2,
        pos: pos2,
        mapq: a2.mapq,
        cigar: a2.cigar.to_string(),
        rnext: rnext2,
        pnext: pos1,
        tlen: tlen2,
        seq: seq2,
        qual: qual2,
        tags: if a2.is_mapped() { score_tags(a2) } else { Vec::new() },
    };
    (record1, record2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::cigar::Cigar;
    use crate::encoding::encode;
    use crate::index::sorter::SaisSorter;
    use crate::index::Reference;

    fn toy_index() -> GenomeIndex {
        let r = Reference::from_records(vec![
            ("chr1".to_string(), encode(&b"ACGT".repeat(100))),
            ("chr2".to_string(), encode(&b"TTGC".repeat(100))),
        ])
        .unwrap();
        GenomeIndex::build(r, &SaisSorter, 8).unwrap()
    }

    fn read(name: &str, seq: &[u8]) -> ReadRecord {
        ReadRecord {
            name: name.to_string(),
            seq: seq.to_vec(),
            qual: "I".repeat(seq.len()),
        }
    }

    fn mapped(pos: u32, forward: bool, len: u32) -> Aln {
        Aln {
            pos,
            score: len as i32,
            forward,
            mapq: 60,
            align_len: len,
            cigar: Cigar::full_match(len),
            ..Aln::unmapped()
        }
    }

    #[test]
    fn proper_pair_gets_flags_and_tlen() {
        let idx = toy_index();
        let opt = AlignOpt::default();
        let pair = AlnPair {
            first: mapped(100, true, 20),
            second: mapped(300, false, 20),
        };
        let (r1, r2) = pair_records(
            &idx,
            &read("p/1", b"ACGTACGTACGTACGTACGT"),
            &read("p/2", b"ACGTACGTACGTACGTACGT"),
            &pair,
            &opt,
        );
        assert_eq!(r1.flag & flags::PROPER_PAIR, flags::PROPER_PAIR);
        assert_eq!(r1.rname, "chr1");
        assert_eq!(r1.pos, 101, "SAM positions are 1-based");
        assert_eq!(r1.rnext, "=");
        assert_eq!(r1.tlen, 220);
        assert_eq!(r2.tlen, -220);
        assert_eq!(r2.flag & flags::REVERSE, flags::REVERSE);
        assert_eq!(r1.flag & flags::MATE_REVERSE, flags::MATE_REVERSE);
        // Reverse mate prints the reverse complement.
        assert_eq!(r2.seq, "ACGTACGTACGTACGTACGT".chars().rev().map(|c| match c {
            'A' => 'T', 'C' => 'G', 'G' => 'C', 'T' => 'A', other => other,
        }).collect::<String>());
    }

    #[test]
    fn unmapped_mate_is_marked_on_both_records() {
        let idx = toy_index();
        let opt = AlignOpt::default();
        let pair = AlnPair {
            first: mapped(100, true, 20),
            second: Aln::unmapped(),
        };
        let (r1, r2) = pair_records(
            &idx,
            &read("q/1", b"ACGTACGTACGTACGTACGT"),
            &read("q/2", b"ACGTACGTACGTACGTACGT"),
            &pair,
            &opt,
        );
        assert_eq!(r1.flag & flags::MATE_UNMAPPED, flags::MATE_UNMAPPED);
        assert_eq!(r2.flag & flags::UNMAPPED, flags::UNMAPPED);
        assert_eq!(r2.rname, "*");
        assert_eq!(r2.cigar, "*");
        assert_eq!(r2.pos, 0);
        assert!(r2.tags.is_empty());
    }

    #[test]
    fn rescued_mate_carries_the_marker_tag() {
        let idx = toy_index();
        let opt = AlignOpt::default();
        let mut second = mapped(300, false, 20);
        second.rescued = true;
        let pair = AlnPair {
            first: mapped(100, true, 20),
            second,
        };
        let (_, r2) = pair_records(
            &idx,
            &read("r/1", b"ACGTACGTACGTACGTACGT"),
            &read("r/2", b"ACGTACGTACGTACGTACGT"),
            &pair,
            &opt,
        );
        assert!(r2.tags.iter().any(|t| t == "rs:i:1"));
    }

    #[test]
    fn record_line_is_tab_separated_sam() {
        let idx = toy_index();
        let aln = mapped(4, true, 8);
        let rec = single_record(&idx, &read("s", b"ACGTACGT"), &aln);
        let line = rec.to_string();
        let fields: Vec<&str> = line.split('\t').collect();
        assert!(fields.len() >= 11);
        assert_eq!(fields[0], "s");
        assert_eq!(fields[2], "chr1");
        assert_eq!(fields[3], "5");
        assert_eq!(fields[5], "8M");
    }
}
