//! Character trigrams and the similarity used for fuzzy name matching.
//!
//! Strings are padded with two leading spaces and one trailing space before
//! splitting, so short names still produce trigrams and word starts weigh
//! more than word ends. Similarity is the Sørensen–Dice coefficient of the
//! two trigram sets: `2 * |A ∩ B| / (|A| + |B|)`.

use std::collections::BTreeSet;

/// Three consecutive characters of a folded name.
pub type Trigram = [char; 3];

/// Padded trigrams of an already case-folded string.
pub fn padded_trigrams(value: &str) -> BTreeSet<Trigram> {
    let chars = [' ', ' ']
        .into_iter()
        .chain(value.chars())
        .chain(std::iter::once(' '))
        .collect::<Vec<_>>();
    chars
        .windows(3)
        .map(|window| [window[0], window[1], window[2]])
        .collect()
}

/// Unpadded trigrams; every string containing `value` contains all of them.
pub fn inner_trigrams(value: &str) -> BTreeSet<Trigram> {
    let chars = value.chars().collect::<Vec<_>>();
    chars
        .windows(3)
        .map(|window| [window[0], window[1], window[2]])
        .collect()
}

/// Dice coefficient between two trigram sets, in `[0, 1]`.
pub fn dice(left: &BTreeSet<Trigram>, right: &BTreeSet<Trigram>) -> f64 {
    let total = left.len() + right.len();
    if total == 0 {
        return 0.0;
    }
    let shared = left.intersection(right).count();
    2.0 * shared as f64 / total as f64
}

/// Trigram similarity of two case-folded strings.
pub fn similarity(left: &str, right: &str) -> f64 {
    dice(&padded_trigrams(left), &padded_trigrams(right))
}
