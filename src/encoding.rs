// DNA base codec shared by the index and the alignment pipeline.
//
// Bases are held as small integer codes throughout the crate:
// A=0, C=1, G=2, T=3, anything ambiguous=4. The FM-index alphabet is the
// four concrete bases plus the ambiguity code; the text sentinel is
// virtual and never appears in encoded sequences.

/// Number of distinct symbol codes in an encoded sequence (A,C,G,T + ambiguous).
pub const ALPHABET: usize = 5;

/// Code used for any base that is not an unambiguous A/C/G/T.
pub const AMBIG: u8 = 4;

/// Encode a single ASCII base. Case-insensitive; anything outside ACGT
/// (N, IUPAC ambiguity codes, stray characters) maps to `AMBIG`.
#[inline(always)]
pub fn base_to_code(base: u8) -> u8 {
    match base {
        b'A' | b'a' => 0,
        b'C' | b'c' => 1,
        b'G' | b'g' => 2,
        b'T' | b't' => 3,
        _ => AMBIG,
    }
}

/// Decode a symbol code back to an ASCII base.
#[inline(always)]
pub fn code_to_base(code: u8) -> u8 {
    match code {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        3 => b'T',
        _ => b'N',
    }
}

/// Complement of a symbol code; ambiguity is its own complement.
#[inline(always)]
pub fn complement(code: u8) -> u8 {
    if code < 4 { 3 - code } else { AMBIG }
}

/// Encode an ASCII sequence into symbol codes.
pub fn encode(seq: &[u8]) -> Vec<u8> {
    seq.iter().map(|&b| base_to_code(b)).collect()
}

/// Decode symbol codes into an ASCII sequence.
pub fn decode(codes: &[u8]) -> Vec<u8> {
    codes.iter().map(|&c| code_to_base(c)).collect()
}

/// Reverse complement of an encoded sequence.
pub fn reverse_complement(codes: &[u8]) -> Vec<u8> {
    codes.iter().rev().map(|&c| complement(c)).collect()
}

/// Pack `k` symbol codes into a 2-bit hash. Returns `None` if the window
/// contains an ambiguous base, so callers naturally skip such k-mers.
#[inline]
pub fn kmer_hash(codes: &[u8]) -> Option<u32> {
    debug_assert!(codes.len() <= 16);
    let mut h = 0u32;
    for &c in codes {
        if c >= 4 {
            return None;
        }
        h = (h << 2) | u32::from(c);
    }
    Some(h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let seq = b"ACGTacgtNnX";
        let codes = encode(seq);
        assert_eq!(codes, vec![0, 1, 2, 3, 0, 1, 2, 3, 4, 4, 4]);
        assert_eq!(decode(&codes), b"ACGTACGTNNN");
    }

    #[test]
    fn reverse_complement_basics() {
        let codes = encode(b"AACGT");
        assert_eq!(reverse_complement(&codes), encode(b"ACGTT"));
        // Ambiguity survives in place.
        assert_eq!(reverse_complement(&encode(b"AN")), encode(b"NT"));
        // Double reversal is the identity.
        let rc = reverse_complement(&codes);
        assert_eq!(reverse_complement(&rc), codes);
    }

    #[test]
    fn kmer_hash_packs_two_bits_per_base() {
        assert_eq!(kmer_hash(&encode(b"AAAA")), Some(0));
        assert_eq!(kmer_hash(&encode(b"ACGT")), Some(0b00_01_10_11));
        assert_eq!(kmer_hash(&encode(b"ACNT")), None);
    }
}
