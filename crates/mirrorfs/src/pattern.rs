//! Wildcard matching for directory enumeration.
//!
//! `*` matches any run of characters, including the empty run; `?`
//! matches exactly one. Matching is case-insensitive and anchored:
//! the whole name must match the whole pattern.

/// Does `name` match the wildcard `pattern`?
pub fn is_match(name: &str, pattern: &str) -> bool {
    let name: Vec<char> = name.chars().flat_map(char::to_lowercase).collect();
    let pattern: Vec<char> = pattern.chars().flat_map(char::to_lowercase).collect();

    let (mut n, mut p) = (0, 0);
    // Positions to resume from when a literal run fails after a star.
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            n += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, n));
            p += 1;
        } else if let Some((sp, sn)) = star {
            // Let the last star swallow one more character and retry.
            p = sp + 1;
            n = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_match_is_exact() {
        assert!(is_match("notes.txt", "notes.txt"));
        assert!(!is_match("notes.txt", "notes.tx"));
        assert!(!is_match("notes.tx", "notes.txt"));
    }

    #[test]
    fn star_matches_any_run() {
        assert!(is_match("notes.txt", "*"));
        assert!(is_match("notes.txt", "*.txt"));
        assert!(is_match("notes.txt", "n*t"));
        assert!(is_match(".hidden", "*"));
        assert!(is_match("", "*"));
        assert!(!is_match("notes.txt", "*.log"));
    }

    #[test]
    fn star_may_match_empty() {
        assert!(is_match("ab", "a*b"));
        assert!(is_match("ab", "*ab*"));
    }

    #[test]
    fn question_mark_is_exactly_one() {
        assert!(is_match("a.rs", "?.rs"));
        assert!(is_match("tab", "ta?"));
        assert!(!is_match("ab.rs", "?.rs"));
        assert!(!is_match("ta", "ta?"));
    }

    #[test]
    fn case_insensitive() {
        assert!(is_match("README.MD", "readme.md"));
        assert!(is_match("photo.JPG", "*.jpg"));
    }

    #[test]
    fn mixed_wildcards_backtrack() {
        assert!(is_match("abcbcd", "a*bc?"));
        assert!(is_match("xaylmz", "x?y*z"));
        assert!(!is_match("xaylm", "x?y*z"));
    }
}
