//! Name normalization and fuzzy ranking.
//!
//! Item names and owner names are matched against search queries in their
//! normalized form: lowercase, keeping only `a-z`, `0-9` and spaces.

/// Rank returned when a query does not match a target.
pub const NO_MATCH: i32 = -1;

/// Lowercase and strip everything except ASCII alphanumerics and spaces.
pub fn normalize_name(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ')
        .collect()
}

/// Fuzzy rank of `query` against `target`.
///
/// The query matches when its characters appear in order (not necessarily
/// contiguous) in the target. The rank is the Levenshtein distance between
/// the two, so an exact match ranks 0 and closer matches rank lower. Returns
/// [`NO_MATCH`] when the query's characters do not appear in order.
pub fn fuzzy_rank(query: &str, target: &str) -> i32 {
    if !is_subsequence(query, target) {
        return NO_MATCH;
    }
    i32::try_from(strsim::levenshtein(query, target)).unwrap_or(i32::MAX)
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut hay = haystack.chars();
    needle.chars().all(|n| hay.any(|h| h == n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize_name("Thunderfury, Blessed Blade!"), "thunderfury blessed blade");
        assert_eq!(normalize_name("A"), "a");
        assert_eq!(normalize_name("Élixir of 100% Power"), "lixir of 100 power");
    }

    #[test]
    fn exact_match_ranks_zero() {
        assert_eq!(fuzzy_rank("peacebloom", "peacebloom"), 0);
    }

    #[test]
    fn in_order_characters_match() {
        let rank = fuzzy_rank("pcblm", "peacebloom");
        assert_eq!(rank, 5);
        assert_eq!(fuzzy_rank("peacebloo", "peacebloom"), 1);
    }

    #[test]
    fn out_of_order_is_no_match() {
        assert_eq!(fuzzy_rank("moolb", "peacebloom"), NO_MATCH);
        assert_eq!(fuzzy_rank("x", ""), NO_MATCH);
    }
}
