use std::collections::HashSet;

/// Fixed similarity cut-off above which two titles are treated as the same
/// story (spec.md §4.3).
pub const THRESHOLD: f64 = 80.0;

fn normalize(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn digit_runs(s: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, c) in s.char_indices() {
        if c.is_ascii_digit() {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(st) = start.take() {
            runs.push(&s[st..i]);
        }
    }
    if let Some(st) = start {
        runs.push(&s[st..]);
    }
    runs
}

fn token_sort(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn jaccard_bigram(a: &str, b: &str) -> f64 {
    fn bigrams(s: &str) -> HashSet<(char, char)> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() < 2 {
            return HashSet::new();
        }
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    }
    let a_bi = bigrams(a);
    let b_bi = bigrams(b);
    if a_bi.is_empty() && b_bi.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    let intersection = a_bi.intersection(&b_bi).count();
    let union = a_bi.union(&b_bi).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Fuzzy-similarity score in `[0, 100]` between two raw titles, following
/// the decision chain in spec.md §4.3: number guard, token-sort exact match,
/// token-sort Jaro-Winkler, then a fallback over three string metrics.
pub fn score(title_a: &str, title_b: &str) -> f64 {
    let a = normalize(title_a);
    let b = normalize(title_b);

    let digits_a = digit_runs(&a);
    let digits_b = digit_runs(&b);
    if !digits_a.is_empty() && !digits_b.is_empty() && digits_a != digits_b {
        return 0.0;
    }

    let sorted_a = token_sort(&a);
    let sorted_b = token_sort(&b);
    if sorted_a == sorted_b {
        return 100.0;
    }

    let jw_sorted = strsim::jaro_winkler(&sorted_a, &sorted_b);
    if jw_sorted >= 0.80 {
        return jw_sorted * 100.0;
    }

    let jw_original = strsim::jaro_winkler(&a, &b);
    let max_len = a.chars().count().max(b.chars().count()).max(1);
    let levenshtein_ratio = 1.0 - (strsim::levenshtein(&a, &b) as f64 / max_len as f64);
    let jaccard = jaccard_bigram(&a, &b);

    jw_original.max(levenshtein_ratio).max(jaccard) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_titles_score_100() {
        assert_eq!(score("Big breaking story", "Big breaking story"), 100.0);
    }

    #[test]
    fn token_reordering_scores_100() {
        assert_eq!(score("breaking news today", "today news breaking"), 100.0);
    }

    #[test]
    fn differing_number_sequences_score_0() {
        assert_eq!(score("12 killed in blast", "20 killed in blast"), 0.0);
    }

    #[test]
    fn same_number_sequences_do_not_trigger_guard() {
        let s = score("12 dead after storm hits coast", "12 dead after storm strikes coast");
        assert!(s > THRESHOLD, "expected > {THRESHOLD}, got {s}");
    }

    #[test]
    fn unrelated_titles_score_low() {
        let s = score("Stock markets rally on earnings", "Local bakery wins pastry award");
        assert!(s < THRESHOLD, "expected < {THRESHOLD}, got {s}");
    }

    #[test]
    fn near_duplicate_phrasing_scores_above_threshold() {
        let s = score(
            "Prime minister announces new budget plan",
            "PM announces new budget plan",
        );
        assert!(s > 40.0);
    }
}
