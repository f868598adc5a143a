//! Wildcard matcher used by every listing query.
//!
//! A pattern is literal text plus `*` (any run of characters, possibly empty)
//! and `?` (exactly one character), compared case-insensitively against a
//! canonical name. Matching is done segment by segment on `/`, so a wildcard
//! never matches across a separator. A trailing segment made only of `*`
//! also swallows any deeper segments: `*` matches every name and `sys/*`
//! matches every device of domain `sys`.

use std::fmt;

const SEPARATOR: char = '/';

/// A compiled wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    source: String,
    segments: Vec<Vec<char>>,
    open_tail: bool,
}

impl Pattern {
    /// Compile a pattern. Every string is a valid pattern.
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let source = pattern.to_ascii_lowercase();
        let segments: Vec<Vec<char>> = source
            .split(SEPARATOR)
            .map(|segment| segment.chars().collect())
            .collect();
        let open_tail = segments.last().is_some_and(|last| last.as_slice() == ['*']);
        Self {
            source,
            segments,
            open_tail,
        }
    }

    /// The pattern matching every name.
    #[must_use]
    pub fn any() -> Self {
        Self::new("*")
    }

    /// Whether the pattern contains no wildcard at all.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        !self.source.contains(['*', '?'])
    }

    /// Longest wildcard-free prefix, usable to narrow a key scan.
    #[must_use]
    pub fn literal_prefix(&self) -> &str {
        let end = self.source.find(['*', '?']).unwrap_or(self.source.len());
        &self.source[..end]
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Test a candidate name against this pattern, ignoring case.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        let lowered = candidate.to_ascii_lowercase();
        let parts: Vec<&str> = lowered.split(SEPARATOR).collect();

        if self.open_tail {
            let fixed = self.segments.len() - 1;
            if parts.len() < self.segments.len() {
                return false;
            }
            return self.segments[..fixed]
                .iter()
                .zip(&parts)
                .all(|(pattern, part)| match_segment(pattern, part));
        }

        parts.len() == self.segments.len()
            && self
                .segments
                .iter()
                .zip(&parts)
                .all(|(pattern, part)| match_segment(pattern, part))
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl From<&str> for Pattern {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Glob match of one segment, with single-point backtracking on `*`.
fn match_segment(pattern: &[char], text: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, consumed)) => {
                    p = star + 1;
                    t = consumed + 1;
                    backtrack = Some((star, consumed + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_match_any_run_including_empty() {
        let pattern = Pattern::new("a*b");
        assert!(pattern.matches("aXb"));
        assert!(pattern.matches("ab"));
        assert!(pattern.matches("aXYZb"));
        assert!(!pattern.matches("aXc"));
    }

    #[test]
    fn should_match_exactly_one_character_with_question_mark() {
        let pattern = Pattern::new("dev?");
        assert!(pattern.matches("dev1"));
        assert!(!pattern.matches("dev"));
        assert!(!pattern.matches("dev12"));
    }

    #[test]
    fn should_match_case_insensitively() {
        assert!(Pattern::new("SYS/DataBase/*").matches("sys/database/2"));
        assert!(Pattern::new("sys/database/2").matches("Sys/DATABASE/2"));
    }

    #[test]
    fn should_not_cross_segment_boundaries() {
        let pattern = Pattern::new("s*s/database/2");
        assert!(pattern.matches("sys/database/2"));
        assert!(!Pattern::new("sys*/2").matches("sys/database/2"));
        assert!(!Pattern::new("*/2").matches("sys/database/2"));
    }

    #[test]
    fn should_match_every_name_with_lone_star() {
        let pattern = Pattern::any();
        assert!(pattern.matches("sys/database/2"));
        assert!(pattern.matches("DataBaseds/2"));
        assert!(pattern.matches("single"));
    }

    #[test]
    fn should_absorb_deeper_segments_with_trailing_star() {
        let pattern = Pattern::new("sys/*");
        assert!(pattern.matches("sys/database/2"));
        assert!(pattern.matches("sys/tg_test/1"));
        assert!(!pattern.matches("sys"));
        assert!(!pattern.matches("test/dev/1"));
    }

    #[test]
    fn should_match_star_per_segment_depth() {
        let pattern = Pattern::new("*/dev/*");
        assert!(pattern.matches("test/dev/1"));
        assert!(pattern.matches("lab/dev/42"));
        assert!(!pattern.matches("test/motor/1"));
    }

    #[test]
    fn should_backtrack_over_multiple_stars() {
        let pattern = Pattern::new("*a*b*c");
        assert!(pattern.matches("xxaYYbZZc"));
        assert!(pattern.matches("abc"));
        assert!(!pattern.matches("acb"));
    }

    #[test]
    fn should_report_literal_prefix() {
        assert_eq!(Pattern::new("Sys/data*").literal_prefix(), "sys/data");
        assert_eq!(Pattern::new("*").literal_prefix(), "");
        assert_eq!(Pattern::new("test/dev/1").literal_prefix(), "test/dev/1");
        assert!(Pattern::new("test/dev/1").is_literal());
        assert!(!Pattern::new("test/d?v/1").is_literal());
    }
}
