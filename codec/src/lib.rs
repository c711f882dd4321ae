//! Base-26 body codec and checksum for ledger identities.
//!
//! An identity is 60 uppercase letters: a 56-character body that encodes a
//! 32-byte key, followed by a 4-character checksum of that key.
//!
//! # Body layout
//!
//! The body is four groups of 14 characters. Each group encodes one little-endian
//! `u64` of the key (group `i` covers bytes `8*i..8*i+8`). Within a group the
//! characters are base-26 digits (`'A' = 0`) stored least-significant first, so
//! decoding accumulates from the group's last character down to its first.
//!
//! # Checksum
//!
//! KangarooTwelve (empty customization) over the 32 key bytes, truncated to
//! 3 bytes, read little-endian and masked to 18 bits, then emitted as four
//! base-26 digits, least-significant first.
//!
//! Everything here is pure and allocation-light; it is safe to call from any
//! number of worker threads.

use k12::KangarooTwelve;
use k12::digest::{ExtendableOutput, Update};

use sieve_types::{
    BODY_LEN, CHECKSUM_LEN, Candidate, CandidateFormatError, Checksum, Identity, KEY_LEN,
    PublicKey,
};

const GROUPS: usize = 4;
const GROUP_LEN: usize = BODY_LEN / GROUPS;
const CHECKSUM_MASK: u32 = 0x3_FFFF;

/// A candidate together with everything derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedIdentity {
    pub body: Candidate,
    pub public_key: PublicKey,
    pub identity: Identity,
}

/// Decode a 56-character body into its 32-byte key.
///
/// Input is canonicalized first (trimmed, uppercased). Groups whose value exceeds
/// `u64::MAX` wrap; the ledger never issues such bodies.
pub fn decode_body(candidate: &str) -> Result<PublicKey, CandidateFormatError> {
    let body = Candidate::parse(candidate)?;
    Ok(decode_candidate(&body))
}

/// Decode an already validated body.
#[must_use]
pub fn decode_candidate(body: &Candidate) -> PublicKey {
    let digits = body.as_bytes();
    let mut key = [0u8; KEY_LEN];
    for group in 0..GROUPS {
        let chunk = &digits[group * GROUP_LEN..(group + 1) * GROUP_LEN];
        let value = chunk.iter().rev().fold(0u64, |acc, &c| {
            acc.wrapping_mul(26).wrapping_add(u64::from(c - b'A'))
        });
        key[group * 8..(group + 1) * 8].copy_from_slice(&value.to_le_bytes());
    }
    PublicKey::from_bytes(key)
}

/// Expand a key back into its 56-character body.
#[must_use]
pub fn encode_body(key: &PublicKey) -> String {
    let bytes = key.as_bytes();
    let mut body = String::with_capacity(BODY_LEN);
    for group in 0..GROUPS {
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[group * 8..(group + 1) * 8]);
        let mut value = u64::from_le_bytes(word);
        for _ in 0..GROUP_LEN {
            body.push(char::from(b'A' + (value % 26) as u8));
            value /= 26;
        }
    }
    body
}

/// Compute the four checksum characters of a key.
#[must_use]
pub fn compute_checksum(key: &PublicKey) -> Checksum {
    let mut digest = [0u8; 3];
    let mut hasher = KangarooTwelve::default();
    hasher.update(key.as_bytes());
    hasher.finalize_xof_into(&mut digest);

    let mut value = u32::from_le_bytes([digest[0], digest[1], digest[2], 0]) & CHECKSUM_MASK;
    let mut digits = [0u8; CHECKSUM_LEN];
    for digit in &mut digits {
        *digit = (value % 26) as u8;
        value /= 26;
    }
    Checksum::from_digits(digits)
}

/// Concatenate a body and its checksum.
#[must_use]
pub fn assemble(body: &Candidate, checksum: &Checksum) -> Identity {
    Identity::from_parts(body, checksum)
}

/// Canonicalize, decode, checksum and assemble a raw candidate.
pub fn derive_identity(raw: &str) -> Result<DerivedIdentity, CandidateFormatError> {
    let body = Candidate::parse(raw)?;
    let public_key = decode_candidate(&body);
    let identity = assemble(&body, &compute_checksum(&public_key));
    Ok(DerivedIdentity {
        body,
        public_key,
        identity,
    })
}

/// True when the identity's checksum matches its body.
#[must_use]
pub fn verify_identity(identity: &Identity) -> bool {
    match decode_body(identity.body()) {
        Ok(key) => compute_checksum(&key).as_str() == identity.checksum(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // Identities issued by the ledger's reference tooling.
    const KNOWN_IDENTITIES: &[&str] = &[
        "BLHDHZCECZJITFHDWNIVWPRHVQNCWOFUEUXHNFRTKELDDQGPKKWAMMGDARKA",
        "BUICAHKIBLQWQAIONARLYROQGMRAYEAOECSZCPMTEHUIFXLKGTMAPJFDCHQI",
        "CFBMEMZOIDEXQAUXYYSZIURADQLAPWPMNJXQSNVQZAHYVOPYUKKJBJUCTVJL",
        "CODEDBUUDDYHECBVSUONSSWTOJRCLZSWHFHZIUWVFGNWVCKIWJCSDSWGQAAI",
        "FAEEIVWNINMPFAAWUUYMCJXMSFCAGDJNFDRCEHBFPGFCCEKUWTMCBHXBNSVL",
    ];

    #[test]
    fn checksum_matches_ledger_issued_identities() {
        for raw in KNOWN_IDENTITIES {
            let derived = derive_identity(&raw[..BODY_LEN]).expect("valid body");
            assert_eq!(derived.identity.as_str(), *raw);
        }
    }

    #[test]
    fn zero_key_identity() {
        let derived = derive_identity(&"A".repeat(BODY_LEN)).unwrap();
        assert_eq!(derived.public_key, PublicKey::from_bytes([0u8; KEY_LEN]));
        assert_eq!(
            derived.identity.as_str(),
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAFXIB"
        );
    }

    #[test]
    fn first_character_is_least_significant_digit() {
        let mut body = "A".repeat(BODY_LEN);
        body.replace_range(0..1, "B");
        let key = decode_body(&body).unwrap();
        assert_eq!(key.as_bytes()[0], 1);

        let mut body = "A".repeat(BODY_LEN);
        body.replace_range(1..2, "B");
        let key = decode_body(&body).unwrap();
        assert_eq!(key.as_bytes()[0], 26);

        let mut body = "A".repeat(BODY_LEN);
        body.replace_range(14..15, "C");
        let key = decode_body(&body).unwrap();
        assert_eq!(key.as_bytes()[8], 2);
    }

    #[test]
    fn decode_then_encode_reproduces_body() {
        for raw in KNOWN_IDENTITIES {
            let body = &raw[..BODY_LEN];
            let key = decode_body(body).unwrap();
            assert_eq!(encode_body(&key), body);
        }

        for _ in 0..256 {
            let key = PublicKey::from_bytes(rand::random());
            let body = encode_body(&key);
            assert_eq!(decode_body(&body).unwrap(), key);
            assert_eq!(encode_body(&decode_body(&body).unwrap()), body);
        }
    }

    #[test]
    fn checksum_is_deterministic() {
        let key = decode_body(&KNOWN_IDENTITIES[0][..BODY_LEN]).unwrap();
        assert_eq!(compute_checksum(&key), compute_checksum(&key));
    }

    #[test]
    fn lowercase_input_is_canonicalized() {
        let lower = KNOWN_IDENTITIES[1][..BODY_LEN].to_ascii_lowercase();
        let derived = derive_identity(&lower).unwrap();
        assert_eq!(derived.identity.as_str(), KNOWN_IDENTITIES[1]);
    }

    #[test]
    fn malformed_bodies_are_typed_failures() {
        let mut raw = KNOWN_IDENTITIES[0][..BODY_LEN].to_string();
        raw.replace_range(3..4, "-");
        assert_eq!(
            decode_body(&raw).unwrap_err(),
            CandidateFormatError::NonAlphabetic {
                position: 3,
                found: '-'
            }
        );
        assert!(matches!(
            derive_identity("SHORT"),
            Err(CandidateFormatError::WrongLength { actual: 5, .. })
        ));
    }

    #[test]
    fn verify_identity_detects_checksum_tampering() {
        let good = Identity::parse(KNOWN_IDENTITIES[2]).unwrap();
        assert!(verify_identity(&good));

        let mut tampered = KNOWN_IDENTITIES[2].to_string();
        tampered.replace_range(59..60, "A");
        let tampered = Identity::parse(&tampered).unwrap();
        assert!(!verify_identity(&tampered));
    }
}
