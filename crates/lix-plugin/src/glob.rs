//! Minimal path globbing for plugin selection.
//!
//! `*` matches within one path segment, `?` one non-separator character,
//! `**` any number of characters across segments (`**/` may match no
//! directory at all).

/// Whether `path` matches `pattern`.
pub fn glob_match(pattern: &str, path: &str) -> bool {
    matches(pattern.as_bytes(), path.as_bytes())
}

fn matches(pattern: &[u8], path: &[u8]) -> bool {
    match pattern {
        [] => path.is_empty(),
        [b'*', b'*', rest @ ..] => {
            if let [b'/', after @ ..] = rest {
                if matches(after, path) {
                    return true;
                }
            }
            (0..=path.len()).any(|i| matches(rest, &path[i..]))
        }
        [b'*', rest @ ..] => {
            for i in 0..=path.len() {
                if matches(rest, &path[i..]) {
                    return true;
                }
                if path.get(i) == Some(&b'/') {
                    break;
                }
            }
            false
        }
        [b'?', rest @ ..] => match path {
            [c, tail @ ..] if *c != b'/' => matches(rest, tail),
            _ => false,
        },
        [c, rest @ ..] => match path {
            [p, tail @ ..] if p == c => matches(rest, tail),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_star_spans_directories() {
        assert!(glob_match("**/*.md", "/readme.md"));
        assert!(glob_match("**/*.md", "readme.md"));
        assert!(glob_match("**/*.md", "/docs/guide/intro.md"));
        assert!(!glob_match("**/*.md", "/docs/intro.mdx"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        assert!(glob_match("/docs/*.txt", "/docs/a.txt"));
        assert!(!glob_match("/docs/*.txt", "/docs/sub/a.txt"));
        assert!(glob_match("*", "file"));
        assert!(!glob_match("*", "dir/file"));
    }

    #[test]
    fn test_question_mark() {
        assert!(glob_match("/a?.json", "/ab.json"));
        assert!(!glob_match("/a?.json", "/a/.json"));
        assert!(!glob_match("/a?.json", "/a.json"));
    }
}
