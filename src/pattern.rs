//! Glob-style pattern matching
//!
//! Supports `*` (any run of characters, including empty) and `?` (exactly one
//! character). Used by the scan verbs (FIND, SEARCH, HSEARCH, ...) and by the
//! collection `find` operation.

/// Match `text` against a glob `pattern`.
///
/// An empty pattern matches only the empty string; a bare `*` matches
/// everything.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    // Iterative backtracking over the last star seen; classic two-pointer
    // wildcard walk, no recursion.
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            // Give the star one more character and retry
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_patterns() {
        assert!(glob_match("abc", "abc"));
        assert!(!glob_match("abc", "abd"));
        assert!(glob_match("", ""));
        assert!(!glob_match("", "x"));
    }

    #[test]
    fn star_patterns() {
        assert!(glob_match("*", ""));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("user:*", "user:42"));
        assert!(glob_match("*suffix", "has suffix"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
    }

    #[test]
    fn question_patterns() {
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("??", "ab"));
    }

    #[test]
    fn backtracking_across_repeats() {
        assert!(glob_match("*ab", "aab"));
        assert!(glob_match("a*ab", "aaab"));
        assert!(!glob_match("a*ab", "aacb"));
    }
}
