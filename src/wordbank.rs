//! Stateless word bank helper (component G). Pure with respect to the RNG
//! it is handed: given a category and a count it returns random words; given
//! a word it builds and progressively reveals the masked hint.

use std::collections::HashSet;

use rand::prelude::*;

const MIXED: &[&str] = &[
    "pizza", "owl", "anchor", "guitar", "rocket", "castle", "dolphin", "umbrella", "volcano",
    "sandwich", "lighthouse", "octopus", "elephant", "bicycle", "telescope", "waterfall",
    "butterfly", "mountain", "pyramid", "snowman",
];

const ANIMALS: &[&str] = &[
    "elephant", "giraffe", "penguin", "kangaroo", "dolphin", "octopus", "hedgehog", "flamingo",
    "raccoon", "squirrel",
];

const FOOD: &[&str] = &[
    "pizza", "sandwich", "pancake", "avocado", "croissant", "spaghetti", "popcorn", "burrito",
    "pretzel", "waffle",
];

fn category_words(category: &str) -> &'static [&'static str] {
    match category {
        "animals" => ANIMALS,
        "food" => FOOD,
        "mixed" => MIXED,
        _ => MIXED,
    }
}

/// Draw `n` distinct random words from `category`, falling back to `mixed`
/// if the category is unknown or has fewer than `n` words.
pub fn draw_words(category: &str, n: usize, rng: &mut impl Rng) -> Vec<String> {
    let mut words = category_words(category);
    if words.len() < n {
        words = MIXED;
    }
    words
        .choose_multiple(rng, n)
        .map(|s| s.to_string())
        .collect()
}

/// Build the initial all-hidden hint: each letter becomes `_`, each space is
/// preserved as a double-space word separator, tokens joined by single
/// spaces.
pub fn mask_word(word: &str) -> String {
    render_hint(word, &HashSet::new())
}

/// Reveal one uniformly random still-masked letter position in `word`,
/// given the set of positions already revealed. Returns the updated hint
/// string and revealed-position set. No-op if every letter is revealed.
///
/// Positions index `word`'s non-space characters only, left to right.
pub fn reveal_random_char(
    word: &str,
    revealed: &HashSet<usize>,
    rng: &mut impl Rng,
) -> (String, HashSet<usize>) {
    let letters: Vec<char> = word.chars().filter(|c| *c != ' ').collect();
    let candidates: Vec<usize> = (0..letters.len()).filter(|i| !revealed.contains(i)).collect();

    let mut revealed = revealed.clone();
    if let Some(&pick) = candidates.choose(rng) {
        revealed.insert(pick);
    }

    (render_hint(word, &revealed), revealed)
}

fn render_hint(word: &str, revealed: &HashSet<usize>) -> String {
    let mut letter_idx = 0usize;
    let tokens: Vec<String> = word
        .split(' ')
        .map(|token| {
            token
                .chars()
                .map(|c| {
                    let shown = if revealed.contains(&letter_idx) {
                        c.to_string()
                    } else {
                        "_".to_string()
                    };
                    letter_idx += 1;
                    shown
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    tokens.join("  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn draw_words_returns_n_distinct() {
        let mut rng = StepRng::new(0, 1);
        let words = draw_words("mixed", 3, &mut rng);
        assert_eq!(words.len(), 3);
        let unique: HashSet<_> = words.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn unknown_category_falls_back_to_mixed() {
        let mut rng = thread_rng();
        let words = draw_words("nonexistent", 3, &mut rng);
        assert_eq!(words.len(), 3);
        for w in &words {
            assert!(MIXED.contains(&w.as_str()));
        }
    }

    #[test]
    fn mask_word_hides_all_letters() {
        assert_eq!(mask_word("cat"), "_ _ _");
        assert_eq!(mask_word("hot dog"), "_ _ _  _ _ _");
    }

    #[test]
    fn reveal_random_char_progressively_reveals() {
        let mut rng = thread_rng();
        let word = "cat";
        let initial_hint = mask_word(word);
        let mut revealed = HashSet::new();
        let (hint1, revealed1) = reveal_random_char(word, &revealed, &mut rng);
        assert_eq!(revealed1.len(), 1);
        assert_ne!(hint1, initial_hint);
        revealed = revealed1;
        let (_, revealed2) = reveal_random_char(word, &revealed, &mut rng);
        assert_eq!(revealed2.len(), 2);
    }

    #[test]
    fn reveal_random_char_is_noop_when_fully_revealed() {
        let mut rng = thread_rng();
        let word = "hi";
        let revealed: HashSet<usize> = (0..2).collect();
        let (hint2, revealed2) = reveal_random_char(word, &revealed, &mut rng);
        assert_eq!(revealed2, revealed);
        assert_eq!(hint2, render_hint(word, &revealed));
    }
}
