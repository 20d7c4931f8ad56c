//! One-time backup code generation and hashing.

use rand::Rng;

use crate::token::hash_token;

/// Unambiguous lowercase characters (no `0`, `1`, `i`, `l`, `o`).
const ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";
const GROUP_LEN: usize = 5;

/// Generate `count` codes shaped `xxxxx-xxxxx`.
pub fn generate_backup_codes(count: usize) -> Vec<String> {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| {
            let mut group = || -> String {
                (0..GROUP_LEN)
                    .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
                    .collect()
            };
            let first = group();
            format!("{first}-{}", group())
        })
        .collect()
}

/// Strip separators and whitespace, lowercase.
pub fn normalize_backup_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Hash stored for a backup code.
pub fn hash_backup_code(code: &str) -> String {
    hash_token(&normalize_backup_code(code))
}
