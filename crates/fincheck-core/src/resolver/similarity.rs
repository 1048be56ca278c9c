use std::collections::HashSet;

/// Jaccard similarity of the character-bigram sets of `left` and `right`.
///
/// Strings too short to have a bigram compare equal only to themselves.
pub fn bigram_jaccard(left: &str, right: &str) -> f64 {
    let left_bigrams = bigrams(left);
    let right_bigrams = bigrams(right);

    if left_bigrams.is_empty() || right_bigrams.is_empty() {
        return if left == right { 1.0 } else { 0.0 };
    }

    let shared = left_bigrams.intersection(&right_bigrams).count();
    let union = left_bigrams.union(&right_bigrams).count();
    shared as f64 / union as f64
}

fn bigrams(text: &str) -> HashSet<(char, char)> {
    let chars = text.chars().collect::<Vec<_>>();
    chars.windows(2).map(|pair| (pair[0], pair[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(bigram_jaccard("microsoft", "microsoft"), 1.0);
    }

    #[test]
    fn single_typo_stays_above_acceptance_threshold() {
        let score = bigram_jaccard("microsoft", "microsofft");
        assert!(score > 0.8, "score was {score}");
    }

    #[test]
    fn unrelated_names_score_low() {
        assert!(bigram_jaccard("tesla", "walmart") < 0.2);
        assert_eq!(bigram_jaccard("a", "b"), 0.0);
        assert_eq!(bigram_jaccard("v", "v"), 1.0);
    }
}
