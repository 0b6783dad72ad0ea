//! Credential hasher
//!
//! Stored password hashes were produced by a fixed iterated SHA-512 scheme and
//! must keep verifying, so the loop below is reproduced exactly: each round
//! appends the original salted input to the running hex accumulator and hashes
//! the result. It is not PBKDF2 and must not be changed into it.

use sha2::{Digest, Sha512};

/// Number of digest rounds
pub const HASH_ROUNDS: usize = 1000;

/// Hash an already-salted input (`salt + password`).
///
/// Returns 128 lowercase hex characters. Total for every input, including `""`.
pub fn hash_pass(salted_input: &str) -> String {
    let mut acc = String::new();
    for _ in 0..HASH_ROUNDS {
        acc.push_str(salted_input);
        acc = format!("{:x}", Sha512::digest(acc.as_bytes()));
    }
    acc
}

/// Hash `password` with the user's stored `salt`.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut salted = String::with_capacity(salt.len() + password.len());
    salted.push_str(salt);
    salted.push_str(password);
    hash_pass(&salted)
}

/// Check a password against a stored digest.
///
/// The comparison does not short-circuit on the first differing byte.
pub fn verify_password(salt: &str, password: &str, expected_hash: &str) -> bool {
    let computed = hash_password(salt, password);
    digests_equal(computed.as_bytes(), expected_hash.as_bytes())
}

fn digests_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    // Digests produced by the legacy implementation
    const SALTPASSWORD: &str = "cb1f112ea384ac88d77687a932d5823d7f6f3760ab561f9c091914e5ee3502f54e31f3875985bb5223eb8dbc273ffc43f372dbeefd5fc47565b214400e7e7302";
    const EMPTY: &str = "65fa18a9042a5bad398320d907f1e14bdebfc5861fe855e1161a288b917dc8e8f3d4e1fff7a9d723251f3a677f5fa965899acaf908231b9379b0f6e2db5113d1";
    const NACL_HUNTER2: &str = "08b7b44dea1bdff009205915c0333f5f01f9700945fdcd713edeb5a36a43a40424a849a4b7c7061a8d95af5d148d68914d777145845f3b73c073a91bad8c0d1c";

    #[test]
    fn test_known_digests() {
        assert_eq!(hash_pass("saltpassword"), SALTPASSWORD);
        assert_eq!(hash_pass(""), EMPTY);
        assert_eq!(hash_password("NaCl", "hunter2"), NACL_HUNTER2);
    }

    #[test]
    fn test_output_shape() {
        let digest = hash_pass("anything");
        assert_eq!(digest.len(), 128);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_deterministic_and_injective_over_corpus() {
        let corpus = [
            "",
            "a",
            "b",
            "ab",
            "ba",
            "password",
            "Password",
            "password ",
            "saltpassword",
            "salt:password",
            "ünïcødé",
            "0000000000000000",
        ];

        let mut seen = HashSet::new();
        for input in corpus {
            let digest = hash_pass(input);
            assert_eq!(digest, hash_pass(input), "not deterministic for {:?}", input);
            assert!(seen.insert(digest), "collision for {:?}", input);
        }
    }

    #[test]
    fn test_salt_is_a_prefix_not_a_separate_field() {
        // salt + password is plain concatenation
        assert_eq!(hash_password("salt", "password"), hash_pass("saltpassword"));
        assert_eq!(hash_password("sal", "tpassword"), hash_pass("saltpassword"));
    }

    #[test]
    fn test_verify_password() {
        assert!(verify_password("salt", "password", SALTPASSWORD));
        assert!(!verify_password("salt", "Password", SALTPASSWORD));
        assert!(!verify_password("salt", "password", &SALTPASSWORD[..64]));
        assert!(!verify_password("pepper", "password", SALTPASSWORD));
    }
}
