//! crates/attendance_core/src/token.rs
//!
//! QR token generation: `PP-<base36 millis>-<8 base36 chars from the OS CSPRNG>`.
//! The timestamp keeps tokens short and spread out over time; the random part
//! makes the next token unpredictable from the previous one.

use chrono::Utc;
use rand::rngs::OsRng;
use rand::Rng;

/// Bounded retries for a fresh token when storage reports a collision.
pub const MAX_TOKEN_ATTEMPTS: usize = 5;

const TOKEN_PREFIX: &str = "PP";
const RANDOM_LEN: usize = 8;
const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub fn generate_token() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = OsRng;
    let random: String = (0..RANDOM_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}-{}-{}", TOKEN_PREFIX, to_base36(millis), random)
}

/// A new token guaranteed to differ from `previous`.
pub fn generate_distinct(previous: &str) -> String {
    loop {
        let token = generate_token();
        if token != previous {
            return token;
        }
    }
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
