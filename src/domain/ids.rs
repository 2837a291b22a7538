//! Identifier generation using a cryptographically strong RNG, grounded in
//! the teacher's `protocol::room_codes` generator.

use rand::RngExt;

/// Confusable-free alphabet used for room ids (excludes 0/O/1/I).
const ROOM_ID_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
const ROOM_ID_LEN: usize = 8;
const CONN_ID_BYTES: usize = 8;
const RESUME_TOKEN_BYTES: usize = 24;

/// Generate an 8-char room id from the confusable-free alphabet.
#[must_use]
pub fn generate_room_id() -> String {
    let mut rng = rand::rng();
    (0..ROOM_ID_LEN)
        .map(|_| {
            let idx = rng.random_range(0..ROOM_ID_ALPHABET.len());
            #[allow(clippy::indexing_slicing)]
            let ch = ROOM_ID_ALPHABET[idx] as char;
            ch
        })
        .collect()
}

/// Generate a 16 hex-char conn id from 8 random bytes.
#[must_use]
pub fn generate_conn_id() -> String {
    random_hex_string(CONN_ID_BYTES)
}

/// Generate an opaque, URL-safe resume token with at least 24 bytes of
/// entropy (hex-encoded, so always URL-safe without further escaping).
#[must_use]
pub fn generate_resume_token() -> String {
    random_hex_string(RESUME_TOKEN_BYTES)
}

fn random_hex_string(num_bytes: usize) -> String {
    let mut rng = rand::rng();
    (0..num_bytes)
        .map(|_| format!("{:02x}", rng.random_range(0u16..256) as u8))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn room_id_uses_confusable_free_alphabet() {
        let id = generate_room_id();
        assert_eq!(id.len(), ROOM_ID_LEN);
        assert!(id.bytes().all(|b| ROOM_ID_ALPHABET.contains(&b)));
    }

    #[test]
    fn conn_id_is_16_hex_chars() {
        let id = generate_conn_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn resume_token_is_48_hex_chars() {
        let token = generate_resume_token();
        assert_eq!(token.len(), 48);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_ids_are_not_trivially_colliding() {
        let ids: HashSet<String> = (0..200).map(|_| generate_conn_id()).collect();
        assert!(ids.len() > 190);
    }
}
