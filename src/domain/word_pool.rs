//! Fixed secret-word pool, ported from
//! `examples/original_source/impostor/domain/word_pool.py`.

use rand::RngExt;

pub const WORDS: &[&str] = &[
    "apple", "river", "castle", "forest", "banana", "mountain", "desert", "ocean", "piano",
    "rocket", "garden", "island",
];

/// Pick one word uniformly at random using a cryptographic RNG.
#[must_use]
pub fn pick_secret_word() -> &'static str {
    let mut rng = rand::rng();
    let idx = rng.random_range(0..WORDS.len());
    #[allow(clippy::indexing_slicing)]
    WORDS[idx]
}

/// Case-fold, collapse internal whitespace, and trim — used to compare an
/// impostor's guess against the stored secret word.
#[must_use]
pub fn normalize_word(word: &str) -> String {
    word.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_secret_word_is_from_pool() {
        for _ in 0..50 {
            assert!(WORDS.contains(&pick_secret_word()));
        }
    }

    #[test]
    fn normalize_word_folds_case_and_whitespace() {
        assert_eq!(normalize_word("  Banana  "), "banana");
        assert_eq!(normalize_word("Rocket  Ship"), "rocket ship");
    }
}
