//! Glob Patterns
//!
//! `keys` and `clear` take glob-style patterns: `*` matches any run of
//! characters, `?` matches a single character, `\` escapes the next
//! character. Each backend matches them with a different native mechanism, so
//! the pattern carries its own translations:
//!
//! - memory: the recursive matcher in this module
//! - Redis: the raw glob, which `KEYS` understands natively
//! - Mongo: an anchored regex with every literal escaped
//! - Postgres: a `LIKE` pattern with `%`/`_`/`\` escaped, used with
//!   `ESCAPE '\'`
//!
//! Escaping literals before translation is what keeps a key such as
//! `user_1.score` from matching as a wildcard or acting as an injection
//! vector in the translated form.

/// A glob pattern supporting `*`, `?`, and `\` escapes.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
}

impl GlobPattern {
    /// Wrap a raw glob pattern.
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
        }
    }

    /// The raw glob, as Redis consumes it.
    pub fn as_glob(&self) -> &str {
        &self.pattern
    }

    /// Test whether `text` matches the pattern.
    pub fn matches(&self, text: &str) -> bool {
        Self::matches_recursive(self.pattern.as_bytes(), text.as_bytes())
    }

    fn matches_recursive(pattern: &[u8], text: &[u8]) -> bool {
        if pattern.is_empty() {
            return text.is_empty();
        }

        match pattern[0] {
            b'*' => {
                // Try matching zero or more characters
                for i in 0..=text.len() {
                    if Self::matches_recursive(&pattern[1..], &text[i..]) {
                        return true;
                    }
                }
                false
            }
            b'?' => !text.is_empty() && Self::matches_recursive(&pattern[1..], &text[1..]),
            b'\\' => {
                if pattern.len() > 1 && !text.is_empty() && pattern[1] == text[0] {
                    Self::matches_recursive(&pattern[2..], &text[1..])
                } else {
                    false
                }
            }
            c => {
                !text.is_empty() && c == text[0] && Self::matches_recursive(&pattern[1..], &text[1..])
            }
        }
    }

    /// Translate to an anchored regex for backends that match with `$regex`.
    pub fn to_regex(&self) -> String {
        let mut out = String::with_capacity(self.pattern.len() + 2);
        out.push('^');
        let mut chars = self.pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' => out.push_str(".*"),
                '?' => out.push('.'),
                '\\' => {
                    if let Some(next) = chars.next() {
                        push_regex_literal(&mut out, next);
                    }
                }
                other => push_regex_literal(&mut out, other),
            }
        }
        out.push('$');
        out
    }

    /// Translate to a `LIKE` pattern, to be used with `ESCAPE '\'`.
    pub fn to_like(&self) -> String {
        let mut out = String::with_capacity(self.pattern.len());
        let mut chars = self.pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' => out.push('%'),
                '?' => out.push('_'),
                '\\' => {
                    if let Some(next) = chars.next() {
                        push_like_literal(&mut out, next);
                    }
                }
                other => push_like_literal(&mut out, other),
            }
        }
        out
    }
}

fn push_regex_literal(out: &mut String, c: char) {
    if matches!(
        c,
        '.' | '+' | '*' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\'
    ) {
        out.push('\\');
    }
    out.push(c);
}

fn push_like_literal(out: &mut String, c: char) {
    if matches!(c, '%' | '_' | '\\') {
        out.push('\\');
    }
    out.push(c);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_matching() {
        let pattern = GlobPattern::new("h*llo");
        assert!(pattern.matches("hello"));
        assert!(pattern.matches("hllo"));
        assert!(pattern.matches("heeeello"));
        assert!(!pattern.matches("world"));

        let pattern = GlobPattern::new("h?llo");
        assert!(pattern.matches("hello"));
        assert!(!pattern.matches("hllo"));
        assert!(!pattern.matches("heello"));

        let pattern = GlobPattern::new("*");
        assert!(pattern.matches(""));
        assert!(pattern.matches("anything"));
    }

    #[test]
    fn test_escaped_wildcard() {
        let pattern = GlobPattern::new(r"score\*");
        assert!(pattern.matches("score*"));
        assert!(!pattern.matches("scoreboard"));
    }

    #[test]
    fn test_to_regex_escapes_literals() {
        let pattern = GlobPattern::new("user.?.v*");
        assert_eq!(pattern.to_regex(), r"^user\..\.v.*$");
    }

    #[test]
    fn test_to_like_escapes_literals() {
        let pattern = GlobPattern::new("user_1:*");
        assert_eq!(pattern.to_like(), r"user\_1:%");

        let pattern = GlobPattern::new("pct%?");
        assert_eq!(pattern.to_like(), r"pct\%_");
    }

    #[test]
    fn test_translations_agree_with_matcher() {
        // The three representations must select the same keys.
        let keys = ["lb:daily", "lb:weekly", "lbx", "session_1"];
        let pattern = GlobPattern::new("lb:*");
        let matched: Vec<_> = keys.iter().filter(|k| pattern.matches(k)).collect();
        assert_eq!(matched, vec![&"lb:daily", &"lb:weekly"]);
    }
}
