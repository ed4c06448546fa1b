use crate::Error;
use regex::Regex;

/// Selects suites and tests by a `suite/test` regular expression.
///
/// Both halves match case-insensitively and anywhere in the name. Slashes inside `[...]` or
/// `(...)` do not split the pattern.
#[derive(Debug, Clone)]
pub struct TestMatcher {
    suite: Regex,
    test: Option<Regex>,
    pattern: String,
}

impl TestMatcher {
    pub fn parse(pattern: &str) -> Result<Self, Error> {
        let parts = split_regexp(pattern);
        let suite = Regex::new(&format!("(?i:{})", parts[0]))?;
        let test = if parts.len() > 1 {
            Some(Regex::new(&format!("(?i:{})", parts[1..].join("/")))?)
        } else {
            None
        };
        Ok(Self {
            suite,
            test,
            pattern: pattern.to_string(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the suite matches and, for a non-empty test name, the test matches too.
    pub fn matches(&self, suite: &str, test: &str) -> bool {
        if !self.suite.is_match(suite) {
            return false;
        }
        match &self.test {
            Some(re) if !test.is_empty() => re.is_match(test),
            _ => true,
        }
    }
}

/// Splits `s` into `/`-separated parts, ignoring separators nested in brackets or parentheses
/// and escaped characters.
fn split_regexp(s: &str) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut parts = vec![];
    let mut start = 0;
    let mut brackets = 0usize;
    let mut parens = 0isize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => brackets += 1,
            b']' => brackets = brackets.saturating_sub(1),
            b'(' if brackets == 0 => parens += 1,
            b')' if brackets == 0 => parens -= 1,
            b'\\' => i += 1,
            b'/' if brackets == 0 && parens == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&s[start.min(s.len())..]);
    parts
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split() {
        assert_eq!(split_regexp("a/b/c"), vec!["a", "b", "c"]);
        assert_eq!(split_regexp("a[/]b/c"), vec!["a[/]b", "c"]);
        assert_eq!(split_regexp("(x/y)/z"), vec!["(x/y)", "z"]);
        assert_eq!(split_regexp(r"a\/b"), vec![r"a\/b"]);
        assert_eq!(split_regexp("suite"), vec!["suite"]);
        assert_eq!(split_regexp(""), vec![""]);
    }

    #[test]
    fn suite_only() {
        let m = TestMatcher::parse("engine").unwrap();
        assert!(m.matches("Engine API", "anything"));
        assert!(m.matches("my-engine", ""));
        assert!(!m.matches("sync", "engine"));
    }

    #[test]
    fn suite_and_test() {
        let m = TestMatcher::parse("transition/invalid.*terminal").unwrap();
        assert!(m.matches("Transition", "Invalid Terminal Block"));
        assert!(!m.matches("Transition", "Re-org to higher TD"));
        assert!(m.matches("transition", ""));
        assert!(!m.matches("merge", "invalid terminal"));
    }

    #[test]
    fn nested_test_pattern() {
        let m = TestMatcher::parse("s/a/b").unwrap();
        assert!(m.matches("s", "xa/by"));
        assert!(!m.matches("s", "ab"));
    }

    #[test]
    fn invalid_pattern() {
        assert!(matches!(
            TestMatcher::parse("(unclosed"),
            Err(Error::InvalidPattern(_))
        ));
    }
}
