//! Shell-style glob matching for exclusion patterns.
//!
//! Supports `*` (any run of characters except `/`), `?` (one character
//! except `/`), bracket classes such as `[abc]`, `[a-z]` and `[!0-9]`, and
//! `\` to escape the next character. A malformed class never matches.

/// Returns true if `name` matches `pattern` in full.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = name.chars().collect();
    let (mut pi, mut si) = (0usize, 0usize);
    // Backtrack point: pattern index after the last `*` and the input index it was tried at.
    let mut star: Option<(usize, usize)> = None;

    while si < s.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi + 1, si));
                    pi += 1;
                    continue;
                }
                '?' if s[si] != '/' => {
                    pi += 1;
                    si += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(&p, pi, s[si]) {
                        if matched {
                            pi = next;
                            si += 1;
                            continue;
                        }
                    } else {
                        return false;
                    }
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == s[si] {
                        pi += 2;
                        si += 1;
                        continue;
                    }
                }
                c if c != '?' && c == s[si] => {
                    pi += 1;
                    si += 1;
                    continue;
                }
                _ => {}
            }
        }

        // Mismatch: let the last `*` absorb one more character, never a separator.
        match star {
            Some((star_pi, star_si)) if s[star_si] != '/' => {
                star = Some((star_pi, star_si + 1));
                pi = star_pi;
                si = star_si + 1;
            }
            _ => return false,
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

/// Matches `c` against the bracket class starting at `p[start] == '['`.
///
/// Returns whether it matched and the pattern index after the class, or
/// `None` if the class is unterminated.
fn match_class(p: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = matches!(p.get(i), Some('!') | Some('^'));
    if negate {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    loop {
        let lo = *p.get(i)?;
        if lo == ']' && !first {
            i += 1;
            break;
        }
        first = false;

        let lo = if lo == '\\' {
            i += 1;
            *p.get(i)?
        } else {
            lo
        };
        i += 1;

        if p.get(i) == Some(&'-') && p.get(i + 1).is_some_and(|&h| h != ']') {
            let mut hi = p[i + 1];
            i += 2;
            if hi == '\\' {
                hi = *p.get(i)?;
                i += 1;
            }
            if lo <= c && c <= hi {
                matched = true;
            }
        } else if lo == c {
            matched = true;
        }
    }

    Some((matched != negate && c != '/', i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal() {
        assert!(glob_match(".DS_Store", ".DS_Store"));
        assert!(!glob_match(".DS_Store", "DS_Store"));
        assert!(!glob_match("abc", "abcd"));
    }

    #[test]
    fn star() {
        assert!(glob_match("*.tmp", "file.tmp"));
        assert!(glob_match("*.tmp", ".tmp"));
        assert!(!glob_match("*.tmp", "file.tmp.bak"));
        assert!(glob_match("*~", "notes.txt~"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
    }

    #[test]
    fn star_does_not_cross_separator() {
        assert!(!glob_match("*.log", "dir/app.log"));
        assert!(glob_match("*/*.log", "dir/app.log"));
        assert!(glob_match("build/*", "build/out.o"));
        assert!(!glob_match("build/*", "build/sub/out.o"));
    }

    #[test]
    fn question_mark() {
        assert!(glob_match("file?.txt", "file1.txt"));
        assert!(!glob_match("file?.txt", "file10.txt"));
        assert!(!glob_match("a?b", "a/b"));
    }

    #[test]
    fn classes() {
        assert!(glob_match("img[0-9].png", "img7.png"));
        assert!(!glob_match("img[0-9].png", "imgx.png"));
        assert!(glob_match("[!a]*", "bcd"));
        assert!(!glob_match("[!a]*", "abc"));
        assert!(glob_match("[^a]*", "bcd"));
        assert!(glob_match("[]x]", "]"));
        assert!(glob_match("[abc]", "b"));
    }

    #[test]
    fn unterminated_class_never_matches() {
        assert!(!glob_match("[abc", "a"));
        assert!(!glob_match("x[", "x["));
    }

    #[test]
    fn escapes() {
        assert!(glob_match("\\*", "*"));
        assert!(!glob_match("\\*", "a"));
        assert!(glob_match("a\\?", "a?"));
    }
}
