//! Random identifiers drawn from the operating system RNG

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

const TOKEN_ID_BYTES: usize = 32;
const SALT_BYTES: usize = 16;
const SESSION_ID_BYTES: usize = 32;
const RESET_CODE_LEN: usize = 8;
const SIGNING_SECRET_BYTES: usize = 48;

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// API token primary key. Not sequential, so it reveals nothing when embedded in a claim.
pub fn generate_token_id() -> String {
    hex::encode(random_bytes::<TOKEN_ID_BYTES>())
}

pub fn generate_salt() -> String {
    hex::encode(random_bytes::<SALT_BYTES>())
}

/// Opaque session cookie value
pub fn generate_session_id() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<SESSION_ID_BYTES>())
}

/// Single-use password reset code sent by mail
pub fn generate_reset_code() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(RESET_CODE_LEN)
        .map(char::from)
        .collect()
}

/// Throwaway signing secret for development runs without one configured
pub fn generate_signing_secret() -> String {
    URL_SAFE_NO_PAD.encode(random_bytes::<SIGNING_SECRET_BYTES>())
}
