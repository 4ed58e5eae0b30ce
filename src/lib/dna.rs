//! Nucleotide and codon utilities.
//!
//! Pileup counts use a fixed nucleotide order `A C G T - N` (tags 0 to 5). Codons are
//! translated with the standard genetic code, with `*` for stop codons.

/// Number of nucleotide tags, including gap and `N`.
pub const NUM_NUCLEOTIDES: usize = 6;

/// Nucleotides in tag order.
pub const NUCLEOTIDES: [u8; NUM_NUCLEOTIDES] = [b'A', b'C', b'G', b'T', b'-', b'N'];

/// Tag of the gap character `-`.
pub const GAP_TAG: usize = 4;

/// Tag of a nucleotide: `A C G T - N` map to `0..=5`.
#[must_use]
pub fn nucleotide_to_tag(base: u8) -> Option<usize> {
    match base {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        b'-' => Some(4),
        b'N' => Some(5),
        _ => None,
    }
}

/// Nucleotide of a tag, `?` for out-of-range tags.
#[must_use]
pub fn tag_to_nucleotide(tag: usize) -> u8 {
    NUCLEOTIDES.get(tag).copied().unwrap_or(b'?')
}

/// Standard genetic code in TCAG order: index = 16*first + 4*second + third.
const GENETIC_CODE: &[u8; 64] =
    b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

fn tcag_index(base: u8) -> Option<usize> {
    match base {
        b'T' => Some(0),
        b'C' => Some(1),
        b'A' => Some(2),
        b'G' => Some(3),
        _ => None,
    }
}

/// Amino acid one-letter code for a codon, `*` for stop codons.
///
/// Returns `None` for anything that is not three upper-case `ACGT` bases.
///
/// # Examples
///
/// ```
/// use minorseq_lib::dna::translate_codon;
///
/// assert_eq!(translate_codon(b"ATG"), Some(b'M'));
/// assert_eq!(translate_codon(b"TAA"), Some(b'*'));
/// assert_eq!(translate_codon(b"A-G"), None);
/// ```
#[must_use]
pub fn translate_codon(codon: &[u8]) -> Option<u8> {
    let [a, b, c] = codon else { return None };
    let index = 16 * tcag_index(*a)? + 4 * tcag_index(*b)? + tcag_index(*c)?;
    Some(GENETIC_CODE[index])
}

/// True if `codon` translates under the standard genetic code.
#[must_use]
pub fn is_coding_codon(codon: &[u8]) -> bool {
    translate_codon(codon).is_some()
}

/// Translate a codon given as a string, returning the amino acid as a `char`.
#[must_use]
pub fn amino_acid(codon: &str) -> Option<char> {
    translate_codon(codon.as_bytes()).map(char::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_tag_round_trip() {
        for (tag, &base) in NUCLEOTIDES.iter().enumerate() {
            assert_eq!(nucleotide_to_tag(base), Some(tag));
            assert_eq!(tag_to_nucleotide(tag), base);
        }
        assert_eq!(nucleotide_to_tag(b' '), None);
        assert_eq!(nucleotide_to_tag(b'a'), None);
        assert_eq!(tag_to_nucleotide(6), b'?');
    }

    #[rstest]
    #[case("TTT", 'F')]
    #[case("ATG", 'M')]
    #[case("TGG", 'W')]
    #[case("TAA", '*')]
    #[case("TAG", '*')]
    #[case("TGA", '*')]
    #[case("AAA", 'K')]
    #[case("AAC", 'N')]
    #[case("GCT", 'A')]
    #[case("CGA", 'R')]
    #[case("AGA", 'R')]
    #[case("ATA", 'I')]
    #[case("GGG", 'G')]
    #[case("CAT", 'H')]
    fn test_translate(#[case] codon: &str, #[case] expected: char) {
        assert_eq!(amino_acid(codon), Some(expected));
    }

    #[rstest]
    #[case("AC")]
    #[case("ACGT")]
    #[case("A-G")]
    #[case("ANG")]
    #[case("acg")]
    #[case("A G")]
    fn test_non_coding(#[case] codon: &str) {
        assert!(!is_coding_codon(codon.as_bytes()));
    }

    #[test]
    fn test_all_sixty_four_codons_translate() {
        let bases = [b'A', b'C', b'G', b'T'];
        let mut stops = 0;
        for a in bases {
            for b in bases {
                for c in bases {
                    let aa = translate_codon(&[a, b, c]).unwrap();
                    if aa == b'*' {
                        stops += 1;
                    }
                }
            }
        }
        assert_eq!(stops, 3);
    }
}
