//! Wildcard pattern matching for module ids.
//!
//! A single pure function used by the ACL engine and registry filters.
//! `*` matches any run of characters, **including dots**, so `public.*`
//! matches `public.search.web` as well as `public.echo`.

/// Matches a module id against a `*`-wildcard pattern.
///
/// - `"*"` matches anything, including the empty string.
/// - Patterns without `*` match by equality.
/// - Otherwise the pattern splits on `*` into literal segments: the first
///   and last segments anchor the start/end of the value unless the
///   pattern begins/ends with `*`; intermediate segments must appear in
///   order.
///
/// # Example
///
/// ```
/// use apcore_types::match_pattern;
///
/// assert!(match_pattern("*", "anything.at.all"));
/// assert!(match_pattern("public.*", "public.search.web"));
/// assert!(match_pattern("*.admin.*", "svc.admin.delete"));
/// assert!(!match_pattern("public.*", "internal.search"));
/// ```
#[must_use]
pub fn match_pattern(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == value;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0usize;

    if !pattern.starts_with('*') {
        let first = segments[0];
        if !value.starts_with(first) {
            return false;
        }
        pos = first.len();
    }

    for segment in &segments[1..] {
        if segment.is_empty() {
            continue;
        }
        match value[pos..].find(segment) {
            Some(idx) => pos = pos + idx + segment.len(),
            None => return false,
        }
    }

    if !pattern.ends_with('*') {
        let last = segments[segments.len() - 1];
        if !value.ends_with(last) {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_everything() {
        assert!(match_pattern("*", ""));
        assert!(match_pattern("*", "a"));
        assert!(match_pattern("*", "a.b.c"));
    }

    #[test]
    fn literal_equality() {
        assert!(match_pattern("greet.hello", "greet.hello"));
        assert!(!match_pattern("greet.hello", "greet.hellox"));
        assert!(!match_pattern("greet.hello", "greet"));
    }

    #[test]
    fn prefix_wildcard() {
        assert!(match_pattern("public.*", "public.echo"));
        assert!(match_pattern("public.*", "public.search.web"));
        assert!(!match_pattern("public.*", "public"));
        assert!(!match_pattern("public.*", "private.echo"));
    }

    #[test]
    fn suffix_wildcard() {
        assert!(match_pattern("*.delete", "admin.delete"));
        assert!(match_pattern("*.delete", "svc.admin.delete"));
        assert!(!match_pattern("*.delete", "admin.delete.soft"));
    }

    #[test]
    fn infix_wildcard() {
        assert!(match_pattern("a*c", "abc"));
        assert!(match_pattern("a*c", "ac"));
        assert!(match_pattern("a*c", "a.very.long.c"));
        assert!(!match_pattern("a*c", "cba"));
    }

    #[test]
    fn multiple_wildcards_in_order() {
        assert!(match_pattern("a*b*c", "a1b2c"));
        assert!(match_pattern("a*b*c", "abc"));
        assert!(!match_pattern("a*b*c", "acb"));
        assert!(match_pattern("*a*b*", "xaxbx"));
        assert!(!match_pattern("*a*b*", "xbxax"));
    }

    #[test]
    fn star_spans_dots() {
        assert!(match_pattern("public.*", "public.a.b.c.d"));
        assert!(match_pattern("*", "."));
    }

    #[test]
    fn empty_value_against_anchored_pattern() {
        assert!(!match_pattern("a*", ""));
        assert!(match_pattern("*", ""));
        assert!(match_pattern("**", ""));
    }

    #[test]
    fn deterministic() {
        for _ in 0..3 {
            assert!(match_pattern("a*z", "a.middle.z"));
        }
    }
}
